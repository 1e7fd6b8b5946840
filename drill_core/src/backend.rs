//! Typed backend calls over a [`Transport`].
//!
//! Wire types live here so the rest of the crate only sees domain values.
//! Any non-2xx status becomes [`Error::Sync`]; any body that does not match
//! the expected shape becomes [`Error::Decode`].

use crate::transport::{Endpoint, Method, Request, Response, Transport};
use crate::{
    BackendId, Difficulty, Drill, DrillGroup, EditableDrill, Error, FilterPreferences, Result,
    TrainingStyle,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Wire Types
// ============================================================================

/// A catalog drill as the backend describes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteDrill {
    pub id: BackendId,
    pub title: String,
    pub skill: String,
    #[serde(default)]
    pub sub_skills: Vec<String>,
    pub sets: u32,
    pub reps: u32,
    pub duration: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    pub training_style: TrainingStyle,
    pub difficulty: Difficulty,
    pub video_url: Option<String>,
}

impl From<RemoteDrill> for Drill {
    fn from(remote: RemoteDrill) -> Self {
        Drill {
            local_id: Drill::local_id_for_backend(remote.id),
            backend_id: Some(remote.id),
            title: remote.title,
            skill: remote.skill,
            sub_skills: remote.sub_skills,
            sets: remote.sets,
            reps: remote.reps,
            duration: remote.duration,
            description: remote.description,
            instructions: remote.instructions,
            tips: remote.tips,
            equipment: remote.equipment,
            training_style: remote.training_style,
            difficulty: remote.difficulty,
            video_url: remote.video_url,
        }
    }
}

impl RemoteDrill {
    /// Wire form of a drill known to the backend.
    pub fn from_drill(drill: &Drill) -> Option<Self> {
        Some(Self {
            id: drill.backend_id?,
            title: drill.title.clone(),
            skill: drill.skill.clone(),
            sub_skills: drill.sub_skills.clone(),
            sets: drill.sets,
            reps: drill.reps,
            duration: drill.duration,
            description: drill.description.clone(),
            instructions: drill.instructions.clone(),
            tips: drill.tips.clone(),
            equipment: drill.equipment.clone(),
            training_style: drill.training_style,
            difficulty: drill.difficulty,
            video_url: drill.video_url.clone(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteGroup {
    pub id: BackendId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub drills: Vec<RemoteDrill>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteLikedGroup {
    pub id: BackendId,
    #[serde(default)]
    pub drills: Vec<RemoteDrill>,
}

/// Body of group create/update calls.
///
/// Drills are referenced by backend id; customised drills that only exist
/// locally stay local.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupPayload {
    pub name: String,
    pub description: String,
    pub drill_ids: Vec<BackendId>,
}

impl GroupPayload {
    pub fn from_group(group: &DrillGroup) -> Self {
        let drill_ids: Vec<BackendId> = group.drills.iter().filter_map(|d| d.backend_id).collect();
        let skipped = group.drills.len() - drill_ids.len();
        if skipped > 0 {
            tracing::debug!(
                "Group {:?} has {} local-only drills not sent to backend",
                group.name,
                skipped
            );
        }
        Self {
            name: group.name.clone(),
            description: group.description.clone(),
            drill_ids,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDrillPayload {
    pub drill_id: BackendId,
    pub sets_done: u32,
    pub total_sets: u32,
    pub total_reps: u32,
    pub total_duration: u32,
    pub is_completed: bool,
}

impl SessionDrillPayload {
    pub fn from_session(session: &[EditableDrill]) -> Vec<Self> {
        session
            .iter()
            .filter_map(|e| {
                Some(Self {
                    drill_id: e.drill.backend_id?,
                    sets_done: e.sets_done,
                    total_sets: e.total_sets,
                    total_reps: e.total_reps,
                    total_duration: e.total_duration,
                    is_completed: e.is_completed,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: BackendId,
}

#[derive(Debug, Deserialize)]
struct LikedCheck {
    is_liked: bool,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct BackendClient {
    transport: Arc<dyn Transport>,
}

impl BackendClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let method = request.method;
        let path = request.endpoint.path();
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(Error::Sync {
                status: response.status,
                message: format!(
                    "{:?} {}: {}",
                    method,
                    path,
                    String::from_utf8_lossy(&response.body)
                ),
            });
        }
        tracing::debug!("{:?} {} -> {}", method, path, response.status);
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: &Response) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| Error::Decode(e.to_string()))
    }

    pub async fn fetch_groups(&self) -> Result<Vec<RemoteGroup>> {
        let response = self.call(Request::get(Endpoint::DrillGroups)).await?;
        Self::decode(&response)
    }

    /// `None` when the user has no liked group on the backend yet.
    pub async fn fetch_liked_group(&self) -> Result<Option<RemoteLikedGroup>> {
        match self.call(Request::get(Endpoint::LikedGroup)).await {
            Ok(response) => Self::decode(&response).map(Some),
            Err(Error::Sync { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_group(&self, payload: &GroupPayload) -> Result<BackendId> {
        let request = Request::with_body(Method::Post, Endpoint::DrillGroups, payload)?;
        let response = self.call(request).await?;
        Ok(Self::decode::<Created>(&response)?.id)
    }

    pub async fn update_group(&self, id: BackendId, payload: &GroupPayload) -> Result<()> {
        let request = Request::with_body(Method::Put, Endpoint::DrillGroup(id), payload)?;
        self.call(request).await?;
        Ok(())
    }

    /// Deleting a group the backend no longer has counts as done.
    pub async fn delete_group(&self, id: BackendId) -> Result<()> {
        match self.call(Request::delete(Endpoint::DrillGroup(id))).await {
            Ok(_) | Err(Error::Sync { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn create_liked_group(&self, payload: &GroupPayload) -> Result<BackendId> {
        let request = Request::with_body(Method::Post, Endpoint::LikedGroup, payload)?;
        let response = self.call(request).await?;
        Ok(Self::decode::<Created>(&response)?.id)
    }

    pub async fn update_liked_group(&self, id: BackendId, payload: &GroupPayload) -> Result<()> {
        let request = Request::with_body(Method::Put, Endpoint::LikedGroupById(id), payload)?;
        self.call(request).await?;
        Ok(())
    }

    pub async fn check_liked(&self, drill_id: BackendId) -> Result<bool> {
        let response = self
            .call(Request::get(Endpoint::LikedDrillCheck(drill_id)))
            .await?;
        Ok(Self::decode::<LikedCheck>(&response)?.is_liked)
    }

    pub async fn sync_session(&self, drills: &[SessionDrillPayload]) -> Result<()> {
        let request = Request::with_body(Method::Put, Endpoint::SessionDrills, drills)?;
        self.call(request).await?;
        Ok(())
    }

    pub async fn sync_preferences(&self, preferences: &FilterPreferences) -> Result<()> {
        let request = Request::with_body(Method::Put, Endpoint::Preferences, preferences)?;
        self.call(request).await?;
        Ok(())
    }
}
