//! Narrow interfaces the session manager exposes to front ends.
//!
//! Each trait covers one capability so callers can depend on just the part
//! they use. [`crate::SessionManager`] implements all of them.

use crate::manager::FlushReport;
use crate::{Drill, DrillGroup, EditableDrill, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// Staging area for drills the user is picking.
pub trait DrillSelection {
    /// Select if unselected, unselect if selected (by local id).
    fn toggle_selection(&self, drill: &Drill);

    fn is_selected(&self, drill: &Drill) -> bool;

    fn selected_drills(&self) -> Vec<Drill>;

    fn clear_selection(&self);
}

/// The ordered drills of the active session and their progress.
pub trait SessionDrillManagement {
    /// Append drills not already in the session, then clear the selection.
    fn add_to_session(&self, drills: &[Drill]);

    /// Move the entries at `from` so they sit before the entry that was at
    /// `to`. Fails with `InvalidRange` without touching the session.
    fn move_drill(&self, from: &[usize], to: usize) -> Result<()>;

    /// Remove by identity. Absent drills are ignored.
    fn delete_drill_from_session(&self, drill: &EditableDrill);

    fn session_has_incomplete_work(&self) -> bool;

    /// Drills in the session not yet marked completed.
    fn sessions_remaining_count(&self) -> usize;

    /// Count one more finished set. Returns the updated entry.
    fn record_set_done(&self, drill_id: Uuid) -> Option<EditableDrill>;

    fn set_completed(&self, drill_id: Uuid, completed: bool) -> Option<EditableDrill>;

    /// Adjust this session's prescription for one drill.
    fn update_prescription(
        &self,
        drill_id: Uuid,
        sets: u32,
        reps: u32,
        duration: u32,
    ) -> Option<EditableDrill>;

    fn clear_session(&self);

    fn session_drills(&self) -> Vec<EditableDrill>;
}

/// Saved groups and the liked group.
#[async_trait]
pub trait DrillGroupManagement {
    /// Create an empty, local-only saved group.
    fn create_group(&self, name: &str, description: &str) -> Uuid;

    fn delete_group(&self, group_id: Uuid) -> Result<()>;

    fn add_drill_to_group(&self, drill: &Drill, group_id: Uuid) -> Result<()>;

    fn remove_drill_from_group(&self, drill: &Drill, group_id: Uuid) -> Result<()>;

    fn is_drill_in_group(&self, drill: &Drill, group_id: Uuid) -> Result<bool>;

    /// Like or unlike. Returns whether the drill is liked afterwards.
    fn toggle_like(&self, drill: &Drill) -> bool;

    fn is_liked(&self, drill: &Drill) -> bool;

    /// Ask the backend whether the drill is liked, falling back to local
    /// state when it cannot answer.
    async fn check_liked_status(&self, drill: &Drill) -> bool;

    /// Replace groups with the backend's copy.
    async fn load_groups_from_backend(&self) -> Result<()>;

    fn saved_groups(&self) -> Vec<DrillGroup>;

    fn liked_group(&self) -> DrillGroup;
}

/// Cache lifecycle and flushing.
#[async_trait]
pub trait CacheManagement {
    /// Activate the provider's current user and load their cache.
    fn login(&self) -> Result<String>;

    /// Drop all state and purge the user's cache. Nothing is flushed.
    fn logout(&self) -> Result<()>;

    /// Like logout, but the user stays active with empty state.
    fn clear_user_data(&self) -> Result<()>;

    /// Run a flush cycle now.
    async fn flush(&self) -> FlushReport;

    /// Run a flush cycle if the auto-save deadline has passed.
    async fn tick(&self) -> Option<FlushReport>;

    /// Re-arm auto-save if anything is still unsaved.
    fn app_foregrounded(&self);
}
