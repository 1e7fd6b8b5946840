//! Local-to-backend identifier reconciliation for groups.
//!
//! A group without a mapping is local-only and must go through a create call
//! before anything can reference it by backend id. While a create is in
//! flight the group resolves to [`Resolution::Pending`], and callers wait on
//! the returned receiver instead of issuing a second create.

use crate::BackendId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;
use uuid::Uuid;

/// Which group an identifier belongs to.
///
/// The liked group's backend id lives in its own slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupSlot {
    Saved(Uuid),
    Liked,
}

/// How an outbound call for a group must be made.
#[derive(Debug)]
pub enum Resolution {
    /// Known to the backend: update by id
    Update(BackendId),
    /// Local-only: create and record the returned id
    Create,
    /// A create is in flight; wait for it, then resolve again
    Pending(watch::Receiver<Option<BackendId>>),
}

/// Serialized form kept in the user's cache.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentifierMap {
    #[serde(default)]
    pub groups: BTreeMap<Uuid, BackendId>,
    pub liked: Option<BackendId>,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    groups: HashMap<Uuid, BackendId>,
    liked: Option<BackendId>,
    creating: HashMap<GroupSlot, watch::Sender<Option<BackendId>>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: IdentifierMap) -> Self {
        Self {
            groups: map.groups.into_iter().collect(),
            liked: map.liked,
            creating: HashMap::new(),
        }
    }

    pub fn to_map(&self) -> IdentifierMap {
        IdentifierMap {
            groups: self.groups.iter().map(|(k, v)| (*k, *v)).collect(),
            liked: self.liked,
        }
    }

    pub fn backend_id(&self, slot: GroupSlot) -> Option<BackendId> {
        match slot {
            GroupSlot::Saved(local_id) => self.groups.get(&local_id).copied(),
            GroupSlot::Liked => self.liked,
        }
    }

    /// Reverse lookup for saved groups.
    pub fn local_id_for(&self, backend_id: BackendId) -> Option<Uuid> {
        self.groups
            .iter()
            .find(|(_, id)| **id == backend_id)
            .map(|(local, _)| *local)
    }

    pub fn resolve(&self, slot: GroupSlot) -> Resolution {
        if let Some(id) = self.backend_id(slot) {
            return Resolution::Update(id);
        }
        match self.creating.get(&slot) {
            Some(sender) => Resolution::Pending(sender.subscribe()),
            None => Resolution::Create,
        }
    }

    /// Mark a create as in flight. Returns false when the slot is already
    /// mapped or already being created.
    pub fn begin_create(&mut self, slot: GroupSlot) -> bool {
        if self.backend_id(slot).is_some() || self.creating.contains_key(&slot) {
            return false;
        }
        let (sender, _) = watch::channel(None);
        self.creating.insert(slot, sender);
        true
    }

    /// Record the id returned by a create and wake any waiters.
    pub fn record(&mut self, slot: GroupSlot, backend_id: BackendId) {
        match slot {
            GroupSlot::Saved(local_id) => {
                self.groups.insert(local_id, backend_id);
            }
            GroupSlot::Liked => self.liked = Some(backend_id),
        }
        if let Some(sender) = self.creating.remove(&slot) {
            let _ = sender.send(Some(backend_id));
        }
        tracing::debug!("Mapped {:?} to backend id {}", slot, backend_id);
    }

    /// Give up on an in-flight create. Waiters see the channel close and
    /// resolve again.
    pub fn abandon_create(&mut self, slot: GroupSlot) {
        self.creating.remove(&slot);
    }

    pub fn forget(&mut self, slot: GroupSlot) {
        match slot {
            GroupSlot::Saved(local_id) => {
                self.groups.remove(&local_id);
            }
            GroupSlot::Liked => self.liked = None,
        }
    }

    /// Replace all mappings with what the backend reported.
    pub fn replace_all(
        &mut self,
        groups: impl IntoIterator<Item = (Uuid, BackendId)>,
        liked: Option<BackendId>,
    ) {
        self.groups = groups.into_iter().collect();
        self.liked = liked;
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.liked = None;
        self.creating.clear();
    }
}

/// Wait for a pending create. `None` if it was abandoned.
pub async fn wait_for_create(mut receiver: watch::Receiver<Option<BackendId>>) -> Option<BackendId> {
    match receiver.wait_for(Option::is_some).await {
        Ok(value) => *value,
        Err(_) => None,
    }
}
