//! Saved groups, the liked group, and backend reconciliation of both.

use super::{SavedGroupsSnapshot, SessionManager, StateEvent};
use crate::cache::store_json;
use crate::capabilities::DrillGroupManagement;
use crate::changes::Category;
use crate::ids::GroupSlot;
use crate::{Drill, DrillGroup, Error, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// Liked membership is by catalog identity, saved groups by local identity.
fn insert_member(group: &mut DrillGroup, category: Category, drill: &Drill) -> bool {
    match category {
        Category::LikedGroup => group.insert_by_key(drill.clone()),
        _ => group.insert(drill.clone()),
    }
}

fn remove_member(group: &mut DrillGroup, category: Category, drill: &Drill) -> bool {
    match category {
        Category::LikedGroup => group.remove_by_key(drill.key()),
        _ => group.remove(drill),
    }
}

fn group_event(category: Category) -> StateEvent {
    match category {
        Category::LikedGroup => StateEvent::LikedChanged,
        _ => StateEvent::GroupsChanged,
    }
}

#[async_trait]
impl DrillGroupManagement for SessionManager {
    fn create_group(&self, name: &str, description: &str) -> Uuid {
        let group = DrillGroup::new(name, description);
        let group_id = group.local_id;
        let mut state = self.lock_state();
        state.saved_groups.push(group);
        self.touch(&mut state, Category::SavedGroups);
        drop(state);

        tracing::debug!("Created local group {:?} ({})", name, group_id);
        self.emit(StateEvent::GroupsChanged);
        group_id
    }

    fn delete_group(&self, group_id: Uuid) -> Result<()> {
        let mut state = self.lock_state();
        let pos = state
            .saved_groups
            .iter()
            .position(|g| g.local_id == group_id)
            .ok_or(Error::GroupNotFound(group_id))?;
        state.saved_groups.remove(pos);

        let slot = GroupSlot::Saved(group_id);
        let mut reconciler = self.lock_reconciler();
        // A create still in flight is handled when its id comes back
        if let Some(backend_id) = reconciler.backend_id(slot) {
            state.pending_deletions.push(backend_id);
            reconciler.forget(slot);
        }
        drop(reconciler);

        self.touch(&mut state, Category::SavedGroups);
        drop(state);
        self.emit(StateEvent::GroupsChanged);
        Ok(())
    }

    fn add_drill_to_group(&self, drill: &Drill, group_id: Uuid) -> Result<()> {
        let mut state = self.lock_state();
        let (group, category) = state
            .group_mut(group_id)
            .ok_or(Error::GroupNotFound(group_id))?;
        if !insert_member(group, category, drill) {
            return Ok(());
        }
        self.touch(&mut state, category);
        drop(state);
        self.emit(group_event(category));
        Ok(())
    }

    fn remove_drill_from_group(&self, drill: &Drill, group_id: Uuid) -> Result<()> {
        let mut state = self.lock_state();
        let (group, category) = state
            .group_mut(group_id)
            .ok_or(Error::GroupNotFound(group_id))?;
        if !remove_member(group, category, drill) {
            return Ok(());
        }
        self.touch(&mut state, category);
        drop(state);
        self.emit(group_event(category));
        Ok(())
    }

    fn is_drill_in_group(&self, drill: &Drill, group_id: Uuid) -> Result<bool> {
        let state = self.lock_state();
        if state.liked.local_id == group_id {
            return Ok(state.liked.contains_key(drill.key()));
        }
        state
            .group(group_id)
            .map(|g| g.contains(drill))
            .ok_or(Error::GroupNotFound(group_id))
    }

    fn toggle_like(&self, drill: &Drill) -> bool {
        let key = drill.key();
        let mut state = self.lock_state();
        let liked = !state.liked.remove_by_key(key) && state.liked.insert_by_key(drill.clone());
        self.touch(&mut state, Category::LikedGroup);
        drop(state);
        self.emit(StateEvent::LikedChanged);
        liked
    }

    fn is_liked(&self, drill: &Drill) -> bool {
        self.lock_state().liked.contains_key(drill.key())
    }

    async fn check_liked_status(&self, drill: &Drill) -> bool {
        let (epoch, user_id, local) = {
            let state = self.lock_state();
            (
                state.epoch,
                state.user_id.clone(),
                state.liked.contains_key(drill.key()),
            )
        };

        let Some(backend_id) = drill.backend_id else {
            return local;
        };
        let user_id = match user_id {
            Some(user_id) if self.remote_allowed(&user_id) => user_id,
            _ => return local,
        };

        let remote = match self.backend.check_liked(backend_id).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!("Liked check for drill {} failed: {}", backend_id, e);
                return local;
            }
        };

        let mut state = self.lock_state();
        if state.epoch != epoch {
            tracing::debug!("Discarding liked check that finished after logout");
            return state.liked.contains_key(drill.key());
        }

        // Unsynced local edits are newer than anything the backend reports
        let key = drill.key();
        if state.tracker.is_dirty(Category::LikedGroup)
            || state.tracker.is_in_flight(Category::LikedGroup)
        {
            tracing::debug!("Keeping unsynced liked state for drill {}", backend_id);
            return state.liked.contains_key(key);
        }

        // Match the backend without marking dirty: this is its own state
        let changed = if remote {
            state.liked.insert_by_key(drill.clone())
        } else {
            state.liked.remove_by_key(key)
        };
        if changed {
            let written = store_json(
                self.cache.as_ref(),
                &user_id,
                Category::LikedGroup.into(),
                &state.liked,
            );
            if let Err(e) = written {
                tracing::warn!("Failed to cache liked group after check: {}", e);
            }
        }
        drop(state);
        if changed {
            self.emit(StateEvent::LikedChanged);
        }
        remote
    }

    async fn load_groups_from_backend(&self) -> Result<()> {
        let (epoch, user_id) = {
            let state = self.lock_state();
            (state.epoch, state.user_id.clone())
        };
        let user_id = user_id.ok_or(Error::NotLoggedIn)?;

        let remote_groups = self.backend.fetch_groups().await?;
        let remote_liked = self.backend.fetch_liked_group().await?;

        let mut state = self.lock_state();
        if state.epoch != epoch {
            tracing::debug!("Discarding group load that finished after logout");
            return Ok(());
        }

        let mut reconciler = self.lock_reconciler();
        let mut mappings = Vec::with_capacity(remote_groups.len());
        let groups: Vec<DrillGroup> = remote_groups
            .into_iter()
            .map(|remote| {
                let local_id = reconciler
                    .local_id_for(remote.id)
                    .unwrap_or_else(Uuid::new_v4);
                mappings.push((local_id, remote.id));
                DrillGroup {
                    local_id,
                    backend_id: Some(remote.id),
                    name: remote.name,
                    description: remote.description,
                    drills: remote.drills.into_iter().map(Drill::from).collect(),
                }
            })
            .collect();

        let mut liked = DrillGroup::liked_for(&user_id);
        let liked_backend_id = remote_liked.as_ref().map(|l| l.id);
        if let Some(remote) = remote_liked {
            liked.backend_id = Some(remote.id);
            liked.drills = remote.drills.into_iter().map(Drill::from).collect();
        }

        reconciler.replace_all(mappings, liked_backend_id);
        drop(reconciler);

        state.saved_groups = groups;
        state.pending_deletions.clear();
        state.liked = liked;

        let cache = self.cache.as_ref();
        let saved = SavedGroupsSnapshot {
            groups: state.saved_groups.clone(),
            pending_deletions: Vec::new(),
        };
        let written = store_json(cache, &user_id, Category::SavedGroups.into(), &saved)
            .and_then(|_| store_json(cache, &user_id, Category::LikedGroup.into(), &state.liked));
        if let Err(e) = written {
            tracing::warn!("Failed to cache groups loaded from backend: {}", e);
        }
        self.persist_identifiers(&user_id);

        tracing::info!(
            "Loaded {} groups and {} liked drills from backend",
            state.saved_groups.len(),
            state.liked.drills.len()
        );
        drop(state);
        self.emit(StateEvent::GroupsChanged);
        self.emit(StateEvent::LikedChanged);
        Ok(())
    }

    fn saved_groups(&self) -> Vec<DrillGroup> {
        self.lock_state().saved_groups.clone()
    }

    fn liked_group(&self) -> DrillGroup {
        self.lock_state().liked.clone()
    }
}
