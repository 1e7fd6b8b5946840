//! Core domain types for the drill session engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Drills and their session-scoped editable wrappers
//! - Drill groups (saved groups and the per-user liked group)
//! - Filter preferences

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Namespace for local identifiers derived from backend drill identifiers.
const DRILL_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_4d0e_9a3b_4f7e_b2d8_1e5a_7c90_3f21);

/// Namespace for per-user liked group identifiers.
const LIKED_GROUP_NAMESPACE: Uuid = Uuid::from_u128(0x2b8e_91c4_57d3_4a06_8f1e_c3a9_64b7_d012);

/// Server-assigned identifier.
pub type BackendId = i64;

// ============================================================================
// Drill Types
// ============================================================================

/// Training style a drill is suited for
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStyle {
    MediumIntensity,
    HighIntensity,
    GameDay,
    RestDay,
}

/// Difficulty tier
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// Key used to recognise the same drill across re-fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrillKey {
    Backend(BackendId),
    Local(Uuid),
}

/// A training drill.
///
/// Drills are values: editing one produces a new `Drill`. Two drills are the
/// same entity iff their local identifiers match, regardless of content.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Drill {
    pub local_id: Uuid,
    pub backend_id: Option<BackendId>,
    pub title: String,
    pub skill: String,
    #[serde(default)]
    pub sub_skills: Vec<String>,
    pub sets: u32,
    pub reps: u32,
    /// Minutes
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

impl PartialEq for Drill {
    fn eq(&self, other: &Self) -> bool {
        self.local_id == other.local_id
    }
}

impl Eq for Drill {}

impl Hash for Drill {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local_id.hash(state);
    }
}

impl Drill {
    /// Local identifier for a drill known to the backend.
    ///
    /// Deterministic so that fetching the same catalog entry twice yields the
    /// same entity.
    pub fn local_id_for_backend(backend_id: BackendId) -> Uuid {
        Uuid::new_v5(&DRILL_NAMESPACE, &backend_id.to_be_bytes())
    }

    /// Membership key: the backend id when known, otherwise the local id.
    pub fn key(&self) -> DrillKey {
        match self.backend_id {
            Some(id) => DrillKey::Backend(id),
            None => DrillKey::Local(self.local_id),
        }
    }

    /// A customised copy with a fresh local identity.
    pub fn with_prescription(&self, sets: u32, reps: u32, duration: u32) -> Drill {
        Drill {
            local_id: Uuid::new_v4(),
            backend_id: None,
            sets,
            reps,
            duration,
            ..self.clone()
        }
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// A drill placed in the active session, with progress.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditableDrill {
    pub drill: Drill,
    pub sets_done: u32,
    pub total_sets: u32,
    pub total_reps: u32,
    pub total_duration: u32,
    pub is_completed: bool,
}

impl EditableDrill {
    /// Wrap a drill with zero progress and its default prescription.
    pub fn new(drill: Drill) -> Self {
        Self {
            total_sets: drill.sets,
            total_reps: drill.reps,
            total_duration: drill.duration,
            sets_done: 0,
            is_completed: false,
            drill,
        }
    }

    pub fn id(&self) -> Uuid {
        self.drill.local_id
    }

    pub fn has_remaining_sets(&self) -> bool {
        self.sets_done < self.total_sets
    }
}

impl PartialEq for EditableDrill {
    fn eq(&self, other: &Self) -> bool {
        self.drill == other.drill
    }
}

impl Eq for EditableDrill {}

// ============================================================================
// Group Types
// ============================================================================

/// A named collection of drills.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DrillGroup {
    pub local_id: Uuid,
    pub backend_id: Option<BackendId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub drills: Vec<Drill>,
}

impl DrillGroup {
    /// A new local-only group.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            backend_id: None,
            name: name.into(),
            description: description.into(),
            drills: Vec::new(),
        }
    }

    /// The empty liked group for a user.
    pub fn liked_for(user_id: &str) -> Self {
        Self {
            local_id: liked_group_id(user_id),
            backend_id: None,
            name: "Liked Drills".into(),
            description: "Drills you've liked".into(),
            drills: Vec::new(),
        }
    }

    pub fn contains(&self, drill: &Drill) -> bool {
        self.drills.iter().any(|d| d == drill)
    }

    pub fn contains_key(&self, key: DrillKey) -> bool {
        self.drills.iter().any(|d| d.key() == key)
    }

    /// Append unless already a member. Returns whether the group changed.
    pub fn insert(&mut self, drill: Drill) -> bool {
        if self.contains(&drill) {
            return false;
        }
        self.drills.push(drill);
        true
    }

    /// Remove by local identity. Returns whether the group changed.
    pub fn remove(&mut self, drill: &Drill) -> bool {
        let before = self.drills.len();
        self.drills.retain(|d| d != drill);
        self.drills.len() != before
    }

    /// Like `insert`, but membership is by `DrillKey` so a re-fetched
    /// catalog drill matches the copy already held.
    pub fn insert_by_key(&mut self, drill: Drill) -> bool {
        if self.contains_key(drill.key()) {
            return false;
        }
        self.drills.push(drill);
        true
    }

    pub fn remove_by_key(&mut self, key: DrillKey) -> bool {
        let before = self.drills.len();
        self.drills.retain(|d| d.key() != key);
        self.drills.len() != before
    }
}

/// Stable per-user identifier of the liked group.
pub fn liked_group_id(user_id: &str) -> Uuid {
    Uuid::new_v5(&LIKED_GROUP_NAMESPACE, user_id.as_bytes())
}

// ============================================================================
// Filter Preferences
// ============================================================================

/// The user's drill filter choices. Replaced wholesale on change.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FilterPreferences {
    /// Minutes available
    pub time_budget: Option<u32>,
    #[serde(default)]
    pub equipment: BTreeSet<String>,
    pub training_style: Option<TrainingStyle>,
    pub location: Option<String>,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub skills: BTreeSet<String>,
}

impl FilterPreferences {
    /// Whether a drill fits these preferences.
    ///
    /// Empty sets and unset fields do not filter.
    pub fn matches(&self, drill: &Drill) -> bool {
        if let Some(budget) = self.time_budget {
            if drill.duration > budget {
                return false;
            }
        }
        if !self.equipment.is_empty()
            && !drill.equipment.iter().all(|e| self.equipment.contains(e))
        {
            return false;
        }
        if let Some(style) = self.training_style {
            if drill.training_style != style {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if drill.difficulty != difficulty {
                return false;
            }
        }
        if !self.skills.is_empty()
            && !self.skills.contains(&drill.skill)
            && !drill.sub_skills.iter().any(|s| self.skills.contains(s))
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Catalog-style drill with a backend id.
    pub fn drill(backend_id: BackendId, title: &str) -> Drill {
        Drill {
            local_id: Drill::local_id_for_backend(backend_id),
            backend_id: Some(backend_id),
            title: title.into(),
            skill: "passing".into(),
            sub_skills: vec!["short_passing".into()],
            sets: 3,
            reps: 10,
            duration: 10,
            description: String::new(),
            instructions: vec![],
            tips: vec![],
            equipment: vec!["ball".into()],
            training_style: TrainingStyle::MediumIntensity,
            difficulty: Difficulty::Beginner,
            video_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::drill;
    use super::*;

    #[test]
    fn test_drill_equality_is_by_local_id() {
        let a = drill(1, "Wall Passes");
        let mut b = a.clone();
        b.title = "Renamed".into();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.local_id = Uuid::new_v4();
        assert_ne!(a, c);
    }

    #[test]
    fn test_backend_local_ids_are_deterministic() {
        assert_eq!(Drill::local_id_for_backend(7), Drill::local_id_for_backend(7));
        assert_ne!(Drill::local_id_for_backend(7), Drill::local_id_for_backend(8));
    }

    #[test]
    fn test_customised_drill_is_a_new_entity() {
        let base = drill(1, "Wall Passes");
        let custom = base.with_prescription(5, 20, 15);
        assert_ne!(base, custom);
        assert_eq!(custom.sets, 5);
        assert_eq!(custom.backend_id, None);
        assert_eq!(custom.key(), DrillKey::Local(custom.local_id));
    }

    #[test]
    fn test_liked_group_id_is_stable_per_user() {
        assert_eq!(liked_group_id("alice"), liked_group_id("alice"));
        assert_ne!(liked_group_id("alice"), liked_group_id("bob"));
        assert_eq!(DrillGroup::liked_for("alice").local_id, liked_group_id("alice"));
    }

    #[test]
    fn test_group_insert_skips_members() {
        let mut group = DrillGroup::new("Warmups", "");
        assert!(group.insert(drill(1, "A")));
        assert!(!group.insert(drill(1, "A")));
        assert_eq!(group.drills.len(), 1);
        assert!(group.remove(&drill(1, "A")));
        assert!(!group.remove(&drill(1, "A")));
    }

    #[test]
    fn test_keyed_insert_matches_refetched_drill() {
        let mut group = DrillGroup::liked_for("alice");
        let original = drill(1, "A");
        let mut refetched = original.clone();
        refetched.local_id = Uuid::new_v4();

        assert!(group.insert_by_key(original));
        assert!(!group.insert_by_key(refetched.clone()));
        assert_eq!(group.drills.len(), 1);
        assert!(group.remove_by_key(refetched.key()));
        assert!(group.drills.is_empty());
    }

    #[test]
    fn test_preferences_filtering() {
        let d = drill(1, "Wall Passes");
        let mut prefs = FilterPreferences::default();
        assert!(prefs.matches(&d));

        prefs.time_budget = Some(5);
        assert!(!prefs.matches(&d));
        prefs.time_budget = Some(15);
        assert!(prefs.matches(&d));

        prefs.equipment.insert("cone".into());
        assert!(!prefs.matches(&d));
        prefs.equipment.insert("ball".into());
        assert!(prefs.matches(&d));

        prefs.skills.insert("short_passing".into());
        assert!(prefs.matches(&d));
        prefs.difficulty = Some(Difficulty::Advanced);
        assert!(!prefs.matches(&d));
    }
}
