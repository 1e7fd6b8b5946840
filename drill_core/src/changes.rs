//! Dirty-category tracking between flushes.
//!
//! Each category carries a generation counter bumped by every mutation. A
//! flush takes a [`FlushTicket`] recording the generations it copied; when it
//! completes, a category only goes clean if nothing bumped it in between.

use serde::{Deserialize, Serialize};

/// Independently flushed slices of the working state.
///
/// Declaration order is the flush order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SessionDrills,
    SavedGroups,
    LikedGroup,
    Preferences,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::SessionDrills,
        Category::SavedGroups,
        Category::LikedGroup,
        Category::Preferences,
    ];

    fn index(self) -> usize {
        match self {
            Category::SessionDrills => 0,
            Category::SavedGroups => 1,
            Category::LikedGroup => 2,
            Category::Preferences => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::SessionDrills => "session_drills",
            Category::SavedGroups => "saved_groups",
            Category::LikedGroup => "liked_group",
            Category::Preferences => "preferences",
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct CategoryState {
    generation: u64,
    clean_at: u64,
    in_flight: bool,
}

impl CategoryState {
    fn is_dirty(&self) -> bool {
        self.generation > self.clean_at
    }
}

/// Categories claimed by one flush, with the generation each was copied at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushTicket {
    entries: Vec<(Category, u64)>,
}

impl FlushTicket {
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    pub fn contains(&self, category: Category) -> bool {
        self.entries.iter().any(|(c, _)| *c == category)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tracks which categories changed since their last successful flush.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    states: [CategoryState; 4],
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&mut self, category: Category) {
        let state = &mut self.states[category.index()];
        state.generation += 1;
        tracing::trace!("Marked {} dirty (generation {})", category.as_str(), state.generation);
    }

    pub fn is_dirty(&self, category: Category) -> bool {
        self.states[category.index()].is_dirty()
    }

    pub fn is_in_flight(&self, category: Category) -> bool {
        self.states[category.index()].in_flight
    }

    pub fn has_dirty(&self) -> bool {
        self.states.iter().any(CategoryState::is_dirty)
    }

    pub fn dirty_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.is_dirty(*c))
            .collect()
    }

    /// Claim every dirty category that is not already being flushed.
    pub fn begin_flush(&mut self) -> FlushTicket {
        let mut entries = Vec::new();
        for category in Category::ALL {
            let state = &mut self.states[category.index()];
            if state.is_dirty() && !state.in_flight {
                state.in_flight = true;
                entries.push((category, state.generation));
            }
        }
        FlushTicket { entries }
    }

    /// Release a ticket. Categories in `succeeded` go clean unless they were
    /// mutated after the ticket was taken.
    ///
    /// Returns the succeeded categories that are still dirty because of such
    /// a mutation.
    pub fn finish_flush(&mut self, ticket: &FlushTicket, succeeded: &[Category]) -> Vec<Category> {
        let mut redirtied = Vec::new();
        for (category, generation) in &ticket.entries {
            let state = &mut self.states[category.index()];
            state.in_flight = false;
            if succeeded.contains(category) {
                state.clean_at = state.clean_at.max(*generation);
                if state.is_dirty() {
                    redirtied.push(*category);
                }
            }
        }
        redirtied
    }

    /// Forget everything, including in-flight claims.
    pub fn reset(&mut self) {
        self.states = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_clean() {
        let tracker = ChangeTracker::new();
        assert!(!tracker.has_dirty());
        assert!(tracker.dirty_categories().is_empty());
    }

    #[test]
    fn test_flush_clears_snapshotted_categories() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_dirty(Category::SavedGroups);
        tracker.mark_dirty(Category::SessionDrills);

        let ticket = tracker.begin_flush();
        assert_eq!(
            ticket.categories().collect::<Vec<_>>(),
            vec![Category::SessionDrills, Category::SavedGroups]
        );

        let redirtied =
            tracker.finish_flush(&ticket, &[Category::SessionDrills, Category::SavedGroups]);
        assert!(redirtied.is_empty());
        assert!(!tracker.has_dirty());
    }

    #[test]
    fn test_mutation_during_flush_stays_dirty() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_dirty(Category::SessionDrills);
        let ticket = tracker.begin_flush();

        tracker.mark_dirty(Category::SessionDrills);
        let redirtied = tracker.finish_flush(&ticket, &[Category::SessionDrills]);

        assert_eq!(redirtied, vec![Category::SessionDrills]);
        assert!(tracker.is_dirty(Category::SessionDrills));
    }

    #[test]
    fn test_failed_category_stays_dirty() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_dirty(Category::LikedGroup);
        tracker.mark_dirty(Category::Preferences);
        let ticket = tracker.begin_flush();

        tracker.finish_flush(&ticket, &[Category::Preferences]);
        assert!(tracker.is_dirty(Category::LikedGroup));
        assert!(!tracker.is_dirty(Category::Preferences));
        assert!(!tracker.is_in_flight(Category::LikedGroup));
    }

    #[test]
    fn test_in_flight_category_excluded_from_second_ticket() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_dirty(Category::SavedGroups);
        let first = tracker.begin_flush();

        tracker.mark_dirty(Category::SavedGroups);
        tracker.mark_dirty(Category::Preferences);
        let second = tracker.begin_flush();

        assert!(first.contains(Category::SavedGroups));
        assert!(!second.contains(Category::SavedGroups));
        assert!(second.contains(Category::Preferences));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = ChangeTracker::new();
        tracker.mark_dirty(Category::SavedGroups);
        let _ticket = tracker.begin_flush();
        tracker.reset();
        assert!(!tracker.has_dirty());
        assert!(!tracker.is_in_flight(Category::SavedGroups));
    }
}
