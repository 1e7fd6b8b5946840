//! Session, drill and group state owner.
//!
//! [`SessionManager`] holds the working copy for the logged-in user. Every
//! mutation runs under one lock, marks its category dirty and re-arms the
//! auto-save deadline. Flushing copies dirty data under that lock and does
//! its I/O after releasing it, so edits keep flowing while a flush waits on
//! the network.
//!
//! Logout bumps an epoch; any flush or backend answer that started under an
//! older epoch is dropped when it comes back.

mod flush;
mod groups;
mod session;

pub use flush::FlushReport;

use crate::auth::AuthProvider;
use crate::backend::BackendClient;
use crate::cache::{load_active_user, load_json, store_active_user, store_json, CacheKey, CacheStore};
use crate::changes::{Category, ChangeTracker};
use crate::config::Config;
use crate::ids::{GroupSlot, IdentifierMap, Reconciler};
use crate::scheduler::{AutoSaveScheduler, Clock, SystemClock};
use crate::transport::Transport;
use crate::{BackendId, Drill, DrillGroup, EditableDrill, Error, FilterPreferences, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

/// Capacity of the change notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Change notifications for whatever presents the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateEvent {
    SelectionChanged,
    SessionChanged,
    GroupsChanged,
    LikedChanged,
    PreferencesChanged,
    Flushed(FlushReport),
    UserChanged(Option<String>),
    Cleared,
}

/// Cached form of the saved-groups category.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct SavedGroupsSnapshot {
    #[serde(default)]
    pub groups: Vec<DrillGroup>,
    /// Backend groups removed locally, awaiting a delete call
    #[serde(default)]
    pub pending_deletions: Vec<BackendId>,
}

pub(crate) struct WorkingState {
    pub user_id: Option<String>,
    pub selection: Vec<Drill>,
    pub session: Vec<EditableDrill>,
    pub saved_groups: Vec<DrillGroup>,
    pub pending_deletions: Vec<BackendId>,
    pub liked: DrillGroup,
    pub preferences: FilterPreferences,
    pub tracker: ChangeTracker,
    pub scheduler: AutoSaveScheduler,
    pub epoch: u64,
    pub last_flush_at: Option<DateTime<Utc>>,
}

impl WorkingState {
    fn empty(user_id: Option<String>, preferences: FilterPreferences) -> Self {
        let liked = DrillGroup::liked_for(user_id.as_deref().unwrap_or_default());
        Self {
            user_id,
            selection: Vec::new(),
            session: Vec::new(),
            saved_groups: Vec::new(),
            pending_deletions: Vec::new(),
            liked,
            preferences,
            tracker: ChangeTracker::new(),
            scheduler: AutoSaveScheduler::new(),
            epoch: 0,
            last_flush_at: None,
        }
    }

    /// Drop every collection and all tracking, keeping scheduler settings
    /// and bumping the epoch.
    fn reset(&mut self, user_id: Option<String>, preferences: FilterPreferences) {
        let scheduler = std::mem::take(&mut self.scheduler);
        let epoch = self.epoch + 1;
        *self = Self::empty(user_id, preferences);
        self.scheduler = scheduler;
        self.scheduler.cancel();
        self.epoch = epoch;
    }

    pub fn group_mut(&mut self, group_id: Uuid) -> Option<(&mut DrillGroup, Category)> {
        if self.liked.local_id == group_id {
            return Some((&mut self.liked, Category::LikedGroup));
        }
        self.saved_groups
            .iter_mut()
            .find(|g| g.local_id == group_id)
            .map(|g| (g, Category::SavedGroups))
    }

    pub fn group(&self, group_id: Uuid) -> Option<&DrillGroup> {
        if self.liked.local_id == group_id {
            return Some(&self.liked);
        }
        self.saved_groups.iter().find(|g| g.local_id == group_id)
    }
}

/// The stateful façade over session drills, groups and preferences.
pub struct SessionManager {
    state: Mutex<WorkingState>,
    reconciler: Mutex<Reconciler>,
    cache: Arc<dyn CacheStore>,
    backend: BackendClient,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    remote_enabled: bool,
    initial_preferences: FilterPreferences,
    events: broadcast::Sender<StateEvent>,
    wake: Arc<Notify>,
}

impl SessionManager {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(WorkingState::empty(None, FilterPreferences::default())),
            reconciler: Mutex::new(Reconciler::new()),
            cache,
            backend: BackendClient::new(transport),
            auth,
            clock: Arc::new(SystemClock),
            remote_enabled: true,
            initial_preferences: FilterPreferences::default(),
            events,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Build with auto-save, sync and preference defaults from `config`.
    pub fn from_config(
        config: &Config,
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let mut manager = Self::new(cache, transport, auth)
            .with_remote_sync(config.sync.remote_enabled)
            .with_initial_preferences(config.preferences.initial_preferences());
        {
            let state = manager.state.get_mut().unwrap_or_else(PoisonError::into_inner);
            state.scheduler = AutoSaveScheduler::new()
                .with_debounce_delay(config.autosave.debounce())
                .with_enabled(config.autosave.enabled);
        }
        manager
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.scheduler = std::mem::take(&mut state.scheduler).with_debounce_delay(delay);
        self
    }

    pub fn with_remote_sync(mut self, enabled: bool) -> Self {
        self.remote_enabled = enabled;
        self
    }

    pub fn with_initial_preferences(mut self, preferences: FilterPreferences) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .preferences = preferences.clone();
        self.initial_preferences = preferences;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------------
    // Internals shared by the capability impls
    // ------------------------------------------------------------------------

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, WorkingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_reconciler(&self) -> MutexGuard<'_, Reconciler> {
        self.reconciler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a category dirty and push the auto-save deadline back.
    pub(crate) fn touch(&self, state: &mut WorkingState, category: Category) {
        state.tracker.mark_dirty(category);
        state.scheduler.arm(self.clock.now());
        self.wake.notify_one();
    }

    pub(crate) fn emit(&self, event: StateEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn remote_allowed(&self, user_id: &str) -> bool {
        self.remote_enabled
            && self.auth.is_authenticated()
            && self.auth.current_user().as_deref() == Some(user_id)
    }

    fn persist_identifiers(&self, user_id: &str) {
        let map = self.lock_reconciler().to_map();
        if let Err(e) = store_json(self.cache.as_ref(), user_id, CacheKey::Identifiers, &map) {
            tracing::warn!("Failed to cache identifier map: {}", e);
        }
    }

    // ------------------------------------------------------------------------
    // Read-only accessors
    // ------------------------------------------------------------------------

    pub fn current_user(&self) -> Option<String> {
        self.lock_state().user_id.clone()
    }

    pub fn filter_preferences(&self) -> FilterPreferences {
        self.lock_state().preferences.clone()
    }

    pub fn group(&self, group_id: Uuid) -> Option<DrillGroup> {
        self.lock_state().group(group_id).cloned()
    }

    /// Backend identifier recorded for a saved group or the liked group.
    pub fn backend_id_for(&self, group_id: Uuid) -> Option<BackendId> {
        let liked_id = self.lock_state().liked.local_id;
        let slot = if group_id == liked_id {
            GroupSlot::Liked
        } else {
            GroupSlot::Saved(group_id)
        };
        self.lock_reconciler().backend_id(slot)
    }

    pub fn is_dirty(&self, category: Category) -> bool {
        self.lock_state().tracker.is_dirty(category)
    }

    pub fn dirty_categories(&self) -> Vec<Category> {
        self.lock_state().tracker.dirty_categories()
    }

    /// When the pending auto-save fires, if one is armed.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.lock_state().scheduler.deadline()
    }

    pub fn last_flush_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_flush_at
    }

    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    pub fn set_filter_preferences(&self, preferences: FilterPreferences) {
        let mut state = self.lock_state();
        if state.preferences == preferences {
            return;
        }
        state.preferences = preferences;
        self.touch(&mut state, Category::Preferences);
        drop(state);
        self.emit(StateEvent::PreferencesChanged);
    }

    // ------------------------------------------------------------------------
    // User lifecycle
    // ------------------------------------------------------------------------

    fn activate_user(&self, user_id: &str) -> Result<()> {
        let mut state = self.lock_state();
        if state.user_id.as_deref() == Some(user_id) {
            return Ok(());
        }

        let cache = self.cache.as_ref();
        if let Some(previous) = load_active_user(cache) {
            if previous != user_id {
                tracing::info!("Cache belongs to a different user, purging it");
                cache.clear_user_cache(&previous)?;
            }
        }
        store_active_user(cache, user_id)?;

        let preferences = load_json(cache, user_id, Category::Preferences.into())
            .unwrap_or_else(|| self.initial_preferences.clone());
        state.reset(Some(user_id.to_string()), preferences);

        let identifiers: IdentifierMap =
            load_json(cache, user_id, CacheKey::Identifiers).unwrap_or_default();
        let reconciler = Reconciler::from_map(identifiers);

        state.session = load_json(cache, user_id, Category::SessionDrills.into()).unwrap_or_default();

        let saved: SavedGroupsSnapshot =
            load_json(cache, user_id, Category::SavedGroups.into()).unwrap_or_default();
        state.saved_groups = saved.groups;
        state.pending_deletions = saved.pending_deletions;
        for group in &mut state.saved_groups {
            group.backend_id = reconciler.backend_id(GroupSlot::Saved(group.local_id));
        }

        let mut liked: DrillGroup = load_json(cache, user_id, Category::LikedGroup.into())
            .unwrap_or_else(|| DrillGroup::liked_for(user_id));
        liked.local_id = crate::liked_group_id(user_id);
        liked.backend_id = reconciler.backend_id(GroupSlot::Liked);
        state.liked = liked;

        *self.lock_reconciler() = reconciler;

        tracing::info!(
            "Logged in: {} session drills, {} saved groups, {} liked drills",
            state.session.len(),
            state.saved_groups.len(),
            state.liked.drills.len()
        );
        Ok(())
    }

    /// Empty the working state and purge the user's cache. Never flushes.
    fn discard_user_state(&self, keep_user: bool) -> Result<()> {
        let mut state = self.lock_state();
        let user_id = state.user_id.clone();
        let next_user = if keep_user { user_id.clone() } else { None };
        state.reset(next_user, self.initial_preferences.clone());
        self.lock_reconciler().clear();

        if let Some(user_id) = &user_id {
            self.cache.clear_user_cache(user_id)?;
            tracing::info!("Discarded local state for {}", user_id);
        }
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Lets the auto-save task notice the manager is gone
        self.wake.notify_one();
    }
}

impl SessionManager {
    pub(crate) fn login_user(&self) -> Result<String> {
        let user_id = self.auth.current_user().ok_or(Error::NotLoggedIn)?;
        self.activate_user(&user_id)?;
        self.emit(StateEvent::UserChanged(Some(user_id.clone())));
        Ok(user_id)
    }

    pub(crate) fn logout_user(&self) -> Result<()> {
        let result = self.discard_user_state(false);
        self.emit(StateEvent::UserChanged(None));
        result
    }

    pub(crate) fn clear_user(&self) -> Result<()> {
        let result = self.discard_user_state(true);
        self.emit(StateEvent::Cleared);
        result
    }
}
