//! The flush cycle and auto-save driver.
//!
//! A flush claims the dirty categories, copies their data under the state
//! lock, writes each one to the cache and then (when the user is
//! authenticated) pushes it to the backend. Only categories that made it all
//! the way through are marked clean, and only if nothing touched them while
//! the flush was running.

use super::{SavedGroupsSnapshot, SessionManager, StateEvent};
use crate::backend::{GroupPayload, SessionDrillPayload};
use crate::cache::{store_json, CacheKey};
use crate::capabilities::CacheManagement;
use crate::changes::{Category, FlushTicket};
use crate::ids::{wait_for_create, GroupSlot, Resolution};
use crate::{BackendId, DrillGroup, EditableDrill, Error, FilterPreferences, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Outcome of one flush cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct FlushReport {
    pub user_id: Option<String>,
    /// Categories claimed by this cycle, in flush order
    pub attempted: Vec<Category>,
    /// Written to the cache
    pub persisted: Vec<Category>,
    /// Accepted by the backend
    pub synced: Vec<Category>,
    /// Left dirty for a later cycle
    pub failed: Vec<Category>,
    /// The user logged out while the cycle ran; nothing was recorded
    pub discarded: bool,
    pub finished_at: DateTime<Utc>,
}

impl FlushReport {
    fn new(user_id: Option<String>, attempted: Vec<Category>) -> Self {
        Self {
            user_id,
            attempted,
            persisted: Vec::new(),
            synced: Vec::new(),
            failed: Vec::new(),
            discarded: false,
            finished_at: Utc::now(),
        }
    }

    /// True when there was nothing to flush.
    pub fn is_idle(&self) -> bool {
        self.attempted.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.discarded && self.failed.is_empty()
    }
}

/// Data copied out of the working state for one cycle.
struct FlushSnapshot {
    user_id: String,
    epoch: u64,
    ticket: FlushTicket,
    session: Option<Vec<EditableDrill>>,
    saved: Option<SavedGroupsSnapshot>,
    liked: Option<DrillGroup>,
    preferences: Option<FilterPreferences>,
}

fn cancelled() -> Error {
    Error::Other("flush cancelled by logout".into())
}

impl SessionManager {
    fn is_current(&self, epoch: u64) -> bool {
        self.lock_state().epoch == epoch
    }

    fn take_snapshot(&self) -> Option<FlushSnapshot> {
        let mut state = self.lock_state();
        let user_id = state.user_id.clone()?;
        state.scheduler.cancel();
        let ticket = state.tracker.begin_flush();
        if ticket.is_empty() {
            return None;
        }

        Some(FlushSnapshot {
            user_id,
            epoch: state.epoch,
            session: ticket
                .contains(Category::SessionDrills)
                .then(|| state.session.clone()),
            saved: ticket
                .contains(Category::SavedGroups)
                .then(|| SavedGroupsSnapshot {
                    groups: state.saved_groups.clone(),
                    pending_deletions: state.pending_deletions.clone(),
                }),
            liked: ticket
                .contains(Category::LikedGroup)
                .then(|| state.liked.clone()),
            preferences: ticket
                .contains(Category::Preferences)
                .then(|| state.preferences.clone()),
            ticket,
        })
    }

    /// Write one category to the cache. Holds the state lock so a logout
    /// cannot purge the namespace between the epoch check and the write.
    fn persist_category(&self, snapshot: &FlushSnapshot, category: Category) -> Result<()> {
        let state = self.lock_state();
        if state.epoch != snapshot.epoch {
            return Err(cancelled());
        }

        let cache = self.cache.as_ref();
        let user_id = snapshot.user_id.as_str();
        let key = CacheKey::from(category);
        let written = match category {
            Category::SessionDrills => snapshot
                .session
                .as_ref()
                .map(|session| store_json(cache, user_id, key, session)),
            Category::SavedGroups => snapshot
                .saved
                .as_ref()
                .map(|saved| store_json(cache, user_id, key, saved)),
            Category::LikedGroup => snapshot
                .liked
                .as_ref()
                .map(|liked| store_json(cache, user_id, key, liked)),
            Category::Preferences => snapshot
                .preferences
                .as_ref()
                .map(|prefs| store_json(cache, user_id, key, prefs)),
        };
        written.unwrap_or(Ok(()))?;

        if matches!(category, Category::SavedGroups | Category::LikedGroup) {
            self.persist_identifiers(user_id);
        }
        tracing::debug!("Cached {} for {}", category.as_str(), user_id);
        Ok(())
    }

    async fn sync_category(&self, snapshot: &FlushSnapshot, category: Category) -> Result<()> {
        match category {
            Category::SessionDrills => {
                let session = snapshot.session.as_deref().unwrap_or_default();
                self.backend
                    .sync_session(&SessionDrillPayload::from_session(session))
                    .await
            }
            Category::SavedGroups => match &snapshot.saved {
                Some(saved) => self.sync_saved_groups(snapshot, saved).await,
                None => Ok(()),
            },
            Category::LikedGroup => match &snapshot.liked {
                Some(liked) => self.sync_group(snapshot, GroupSlot::Liked, liked).await,
                None => Ok(()),
            },
            Category::Preferences => match &snapshot.preferences {
                Some(preferences) => self.backend.sync_preferences(preferences).await,
                None => Ok(()),
            },
        }
    }

    /// Issue queued deletes, then create or update every saved group.
    /// Keeps going after a failure and reports the first one.
    async fn sync_saved_groups(
        &self,
        snapshot: &FlushSnapshot,
        saved: &SavedGroupsSnapshot,
    ) -> Result<()> {
        let mut first_error = None;

        let mut deleted = Vec::new();
        for &backend_id in &saved.pending_deletions {
            if !self.is_current(snapshot.epoch) {
                return Err(cancelled());
            }
            match self.backend.delete_group(backend_id).await {
                Ok(()) => deleted.push(backend_id),
                Err(e) => {
                    tracing::warn!("Failed to delete backend group {}: {}", backend_id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if !deleted.is_empty() {
            self.forget_deletions(snapshot, &deleted);
        }

        for group in &saved.groups {
            let slot = GroupSlot::Saved(group.local_id);
            if let Err(e) = self.sync_group(snapshot, slot, group).await {
                tracing::warn!("Failed to sync group {:?}: {}", group.name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop completed deletes from state and from the cached copy.
    fn forget_deletions(&self, snapshot: &FlushSnapshot, deleted: &[BackendId]) {
        let mut state = self.lock_state();
        if state.epoch != snapshot.epoch {
            return;
        }
        state.pending_deletions.retain(|id| !deleted.contains(id));
        let saved = SavedGroupsSnapshot {
            groups: state.saved_groups.clone(),
            pending_deletions: state.pending_deletions.clone(),
        };
        let key = CacheKey::from(Category::SavedGroups);
        if let Err(e) = store_json(self.cache.as_ref(), &snapshot.user_id, key, &saved) {
            tracing::warn!("Failed to cache saved groups after deletes: {}", e);
        }
    }

    /// Create or update one group through the reconciler.
    async fn sync_group(
        &self,
        snapshot: &FlushSnapshot,
        slot: GroupSlot,
        group: &DrillGroup,
    ) -> Result<()> {
        let payload = GroupPayload::from_group(group);
        loop {
            if !self.is_current(snapshot.epoch) {
                return Err(cancelled());
            }
            let resolution = self.lock_reconciler().resolve(slot);
            match resolution {
                Resolution::Update(backend_id) => {
                    return match slot {
                        GroupSlot::Liked => {
                            self.backend.update_liked_group(backend_id, &payload).await
                        }
                        GroupSlot::Saved(_) => self.backend.update_group(backend_id, &payload).await,
                    };
                }
                Resolution::Pending(receiver) => {
                    tracing::debug!("Waiting for in-flight create of {:?}", slot);
                    wait_for_create(receiver).await;
                }
                Resolution::Create => {
                    let started = self.lock_reconciler().begin_create(slot);
                    if !started {
                        continue;
                    }
                    let created = match slot {
                        GroupSlot::Liked => self.backend.create_liked_group(&payload).await,
                        GroupSlot::Saved(_) => self.backend.create_group(&payload).await,
                    };
                    return match created {
                        Ok(backend_id) => {
                            self.record_backend_id(snapshot, slot, backend_id);
                            Ok(())
                        }
                        Err(e) => {
                            self.lock_reconciler().abandon_create(slot);
                            Err(e)
                        }
                    };
                }
            }
        }
    }

    /// Store the id returned by a create. A saved group deleted while its
    /// create was in flight gets queued for deletion instead.
    fn record_backend_id(&self, snapshot: &FlushSnapshot, slot: GroupSlot, backend_id: BackendId) {
        let mut state = self.lock_state();
        if state.epoch != snapshot.epoch {
            tracing::debug!("Dropping backend id {} created before logout", backend_id);
            return;
        }

        let mut reconciler = self.lock_reconciler();
        reconciler.record(slot, backend_id);
        let orphaned = match slot {
            GroupSlot::Liked => {
                state.liked.backend_id = Some(backend_id);
                false
            }
            GroupSlot::Saved(local_id) => {
                match state.saved_groups.iter_mut().find(|g| g.local_id == local_id) {
                    Some(group) => {
                        group.backend_id = Some(backend_id);
                        false
                    }
                    None => {
                        reconciler.forget(slot);
                        true
                    }
                }
            }
        };
        drop(reconciler);

        if orphaned {
            tracing::debug!("Group deleted during create, queueing delete of {}", backend_id);
            state.pending_deletions.push(backend_id);
            self.touch(&mut state, Category::SavedGroups);
        }
        self.persist_identifiers(&snapshot.user_id);
    }

    fn finish(
        &self,
        snapshot: FlushSnapshot,
        succeeded: &[Category],
        mut report: FlushReport,
    ) -> FlushReport {
        let mut state = self.lock_state();
        report.finished_at = Utc::now();
        if state.epoch != snapshot.epoch {
            report.discarded = true;
            drop(state);
            tracing::debug!("Discarding flush that finished after logout");
            return report;
        }

        let redirtied = state.tracker.finish_flush(&snapshot.ticket, succeeded);
        state.last_flush_at = Some(report.finished_at);
        if !redirtied.is_empty() && state.scheduler.deadline().is_none() {
            state.scheduler.arm(self.clock.now());
        }
        drop(state);

        tracing::info!(
            "Flushed {} of {} categories for {} ({} synced, {} failed)",
            succeeded.len(),
            report.attempted.len(),
            snapshot.user_id,
            report.synced.len(),
            report.failed.len()
        );
        self.wake.notify_one();
        self.emit(StateEvent::Flushed(report.clone()));
        report
    }

    async fn run_flush(&self) -> FlushReport {
        let Some(snapshot) = self.take_snapshot() else {
            return FlushReport::new(self.current_user(), Vec::new());
        };

        let attempted: Vec<Category> = snapshot.ticket.categories().collect();
        let remote = self.remote_allowed(&snapshot.user_id);
        let mut report = FlushReport::new(Some(snapshot.user_id.clone()), attempted.clone());
        let mut succeeded = Vec::new();

        for category in attempted {
            if !self.is_current(snapshot.epoch) {
                break;
            }
            if let Err(e) = self.persist_category(&snapshot, category) {
                tracing::warn!("Failed to cache {}: {}", category.as_str(), e);
                report.failed.push(category);
                continue;
            }
            report.persisted.push(category);

            if !remote {
                succeeded.push(category);
                continue;
            }
            match self.sync_category(&snapshot, category).await {
                Ok(()) => {
                    report.synced.push(category);
                    succeeded.push(category);
                }
                Err(e) => {
                    tracing::warn!("Failed to sync {}: {}", category.as_str(), e);
                    report.failed.push(category);
                }
            }
        }

        self.finish(snapshot, &succeeded, report)
    }

    /// Run auto-save in the background: sleep until the debounce deadline,
    /// then flush. The task ends once the manager is dropped.
    pub fn spawn_auto_save(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let wake = self.wake.clone();
        tokio::spawn(async move {
            loop {
                let delay = match manager.upgrade() {
                    Some(m) => m
                        .pending_deadline()
                        .map(|deadline| deadline.saturating_duration_since(m.clock.now())),
                    None => break,
                };
                match delay {
                    Some(delay) => {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = wake.notified() => continue,
                        }
                    }
                    None => wake.notified().await,
                }

                let Some(m) = manager.upgrade() else { break };
                m.tick().await;
            }
            tracing::debug!("Auto-save task stopped");
        })
    }
}

#[async_trait]
impl CacheManagement for SessionManager {
    fn login(&self) -> Result<String> {
        self.login_user()
    }

    fn logout(&self) -> Result<()> {
        self.logout_user()
    }

    fn clear_user_data(&self) -> Result<()> {
        self.clear_user()
    }

    async fn flush(&self) -> FlushReport {
        self.run_flush().await
    }

    async fn tick(&self) -> Option<FlushReport> {
        let due = self.lock_state().scheduler.take_due(self.clock.now());
        if !due {
            return None;
        }
        Some(self.run_flush().await)
    }

    fn app_foregrounded(&self) {
        let mut state = self.lock_state();
        if !state.tracker.has_dirty() {
            return;
        }
        state.scheduler.arm(self.clock.now());
        drop(state);
        self.wake.notify_one();
    }
}
