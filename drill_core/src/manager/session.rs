//! Selection and session-sequence operations.

use super::{SessionManager, StateEvent};
use crate::capabilities::{DrillSelection, SessionDrillManagement};
use crate::changes::Category;
use crate::{Drill, EditableDrill, Error, Result};
use uuid::Uuid;

impl DrillSelection for SessionManager {
    fn toggle_selection(&self, drill: &Drill) {
        let mut state = self.lock_state();
        if let Some(pos) = state.selection.iter().position(|d| d == drill) {
            state.selection.remove(pos);
        } else {
            state.selection.push(drill.clone());
        }
        drop(state);
        self.emit(StateEvent::SelectionChanged);
    }

    fn is_selected(&self, drill: &Drill) -> bool {
        self.lock_state().selection.contains(drill)
    }

    fn selected_drills(&self) -> Vec<Drill> {
        self.lock_state().selection.clone()
    }

    fn clear_selection(&self) {
        self.lock_state().selection.clear();
        self.emit(StateEvent::SelectionChanged);
    }
}

impl SessionManager {
    /// Apply `f` to one session entry and mark the session dirty.
    fn update_entry(
        &self,
        drill_id: Uuid,
        f: impl FnOnce(&mut EditableDrill),
    ) -> Option<EditableDrill> {
        let mut state = self.lock_state();
        let entry = state.session.iter_mut().find(|e| e.id() == drill_id)?;
        f(entry);
        let updated = entry.clone();
        self.touch(&mut state, Category::SessionDrills);
        drop(state);
        self.emit(StateEvent::SessionChanged);
        Some(updated)
    }
}

impl SessionDrillManagement for SessionManager {
    fn add_to_session(&self, drills: &[Drill]) {
        let mut state = self.lock_state();
        let mut added = 0;
        for drill in drills {
            if state.session.iter().any(|e| &e.drill == drill) {
                continue;
            }
            state.session.push(EditableDrill::new(drill.clone()));
            added += 1;
        }
        state.selection.clear();
        if added > 0 {
            self.touch(&mut state, Category::SessionDrills);
        }
        drop(state);

        tracing::debug!("Added {} of {} drills to session", added, drills.len());
        if added > 0 {
            self.emit(StateEvent::SessionChanged);
        }
        self.emit(StateEvent::SelectionChanged);
    }

    fn move_drill(&self, from: &[usize], to: usize) -> Result<()> {
        let mut state = self.lock_state();
        let len = state.session.len();
        if to > len {
            return Err(Error::InvalidRange { index: to, len });
        }
        if let Some(&index) = from.iter().find(|&&i| i >= len) {
            return Err(Error::InvalidRange { index, len });
        }

        let mut indices = from.to_vec();
        indices.sort_unstable();
        indices.dedup();
        if indices.is_empty() {
            return Ok(());
        }

        // Target position once the moved entries are out of the way
        let insert_at = to - indices.iter().filter(|&&i| i < to).count();
        let mut moving: Vec<EditableDrill> = indices
            .iter()
            .rev()
            .map(|&i| state.session.remove(i))
            .collect();
        moving.reverse();
        state.session.splice(insert_at..insert_at, moving);

        self.touch(&mut state, Category::SessionDrills);
        drop(state);
        self.emit(StateEvent::SessionChanged);
        Ok(())
    }

    fn delete_drill_from_session(&self, drill: &EditableDrill) {
        let mut state = self.lock_state();
        let before = state.session.len();
        state.session.retain(|e| e != drill);
        if state.session.len() == before {
            return;
        }
        self.touch(&mut state, Category::SessionDrills);
        drop(state);
        self.emit(StateEvent::SessionChanged);
    }

    fn session_has_incomplete_work(&self) -> bool {
        self.lock_state()
            .session
            .iter()
            .any(EditableDrill::has_remaining_sets)
    }

    fn sessions_remaining_count(&self) -> usize {
        self.lock_state()
            .session
            .iter()
            .filter(|e| !e.is_completed)
            .count()
    }

    fn record_set_done(&self, drill_id: Uuid) -> Option<EditableDrill> {
        self.update_entry(drill_id, |entry| {
            if entry.sets_done < entry.total_sets {
                entry.sets_done += 1;
            }
            if entry.sets_done >= entry.total_sets {
                entry.is_completed = true;
            }
        })
    }

    fn set_completed(&self, drill_id: Uuid, completed: bool) -> Option<EditableDrill> {
        self.update_entry(drill_id, |entry| entry.is_completed = completed)
    }

    fn update_prescription(
        &self,
        drill_id: Uuid,
        sets: u32,
        reps: u32,
        duration: u32,
    ) -> Option<EditableDrill> {
        self.update_entry(drill_id, |entry| {
            entry.total_sets = sets;
            entry.total_reps = reps;
            entry.total_duration = duration;
            entry.sets_done = entry.sets_done.min(sets);
            entry.is_completed = sets > 0 && entry.sets_done == sets;
        })
    }

    fn clear_session(&self) {
        let mut state = self.lock_state();
        if state.session.is_empty() {
            return;
        }
        state.session.clear();
        self.touch(&mut state, Category::SessionDrills);
        drop(state);
        self.emit(StateEvent::SessionChanged);
    }

    fn session_drills(&self) -> Vec<EditableDrill> {
        self.lock_state().session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use super::*;
    use crate::types::fixtures::drill;

    fn titles(manager: &SessionManager) -> Vec<String> {
        manager
            .session_drills()
            .into_iter()
            .map(|e| e.drill.title)
            .collect()
    }

    #[test]
    fn test_toggle_selection_is_its_own_inverse() {
        let h = harness(false);
        let a = drill(1, "A");
        let b = drill(2, "B");
        h.manager.toggle_selection(&a);
        let before = h.manager.selected_drills();

        h.manager.toggle_selection(&b);
        assert!(h.manager.is_selected(&b));
        h.manager.toggle_selection(&b);

        assert!(!h.manager.is_selected(&b));
        assert_eq!(h.manager.selected_drills(), before);
    }

    #[test]
    fn test_add_to_session_skips_duplicates_and_clears_selection() {
        let h = harness(false);
        let a = drill(1, "A");
        let b = drill(2, "B");
        h.manager.toggle_selection(&a);
        h.manager.add_to_session(&[a.clone(), b.clone(), a.clone()]);
        h.manager.add_to_session(&[b.clone()]);

        assert_eq!(titles(&h.manager), vec!["A", "B"]);
        assert!(h.manager.selected_drills().is_empty());
        let entry = &h.manager.session_drills()[0];
        assert_eq!(entry.sets_done, 0);
        assert_eq!(entry.total_sets, a.sets);
        assert!(h.manager.is_dirty(Category::SessionDrills));
    }

    #[test]
    fn test_add_then_delete_sequences() {
        let h = harness(false);
        let drills: Vec<_> = (1..=5).map(|i| drill(i, &format!("D{}", i))).collect();
        h.manager.add_to_session(&drills[..3]);
        h.manager.add_to_session(&drills[2..]);
        for entry in h.manager.session_drills() {
            if entry.drill == drills[1] || entry.drill == drills[3] {
                h.manager.delete_drill_from_session(&entry);
            }
        }
        // Deleting again is a no-op
        h.manager
            .delete_drill_from_session(&EditableDrill::new(drills[1].clone()));

        assert_eq!(titles(&h.manager), vec!["D1", "D3", "D5"]);
    }

    #[test]
    fn test_move_drill_forward_and_back() {
        let h = harness(false);
        let drills: Vec<_> = ["A", "B", "C", "D"]
            .iter()
            .enumerate()
            .map(|(i, t)| drill(i as i64 + 1, t))
            .collect();
        h.manager.add_to_session(&drills);

        h.manager.move_drill(&[0], 2).unwrap();
        assert_eq!(titles(&h.manager), vec!["B", "A", "C", "D"]);

        h.manager.move_drill(&[3], 0).unwrap();
        assert_eq!(titles(&h.manager), vec!["D", "B", "A", "C"]);

        h.manager.move_drill(&[0, 2], 4).unwrap();
        assert_eq!(titles(&h.manager), vec!["B", "C", "D", "A"]);
    }

    #[test]
    fn test_move_drill_out_of_range_leaves_session_unchanged() {
        let h = harness(false);
        h.manager.add_to_session(&[drill(1, "A"), drill(2, "B")]);

        let err = h.manager.move_drill(&[0], 3).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { index: 3, len: 2 }));
        let err = h.manager.move_drill(&[5], 0).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { index: 5, len: 2 }));

        assert_eq!(titles(&h.manager), vec!["A", "B"]);
    }

    #[test]
    fn test_move_drill_preserves_entries() {
        let h = harness(false);
        let drills: Vec<_> = (1..=6).map(|i| drill(i, &format!("D{}", i))).collect();
        h.manager.add_to_session(&drills);

        for to in 0..=6 {
            for from in 0..6 {
                h.manager.move_drill(&[from, (from + 2) % 6], to).unwrap();
                let mut ids: Vec<_> = h
                    .manager
                    .session_drills()
                    .iter()
                    .map(|e| e.drill.backend_id)
                    .collect();
                ids.sort();
                assert_eq!(ids, (1..=6).map(Some).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_progress_tracking() {
        let h = harness(false);
        let a = drill(1, "A"); // 3 sets
        let b = drill(2, "B");
        h.manager.add_to_session(&[a.clone(), b.clone()]);
        assert!(h.manager.session_has_incomplete_work());
        assert_eq!(h.manager.sessions_remaining_count(), 2);

        for _ in 0..5 {
            h.manager.record_set_done(a.local_id);
        }
        let entry = h.manager.session_drills()[0].clone();
        assert_eq!(entry.sets_done, 3);
        assert!(entry.is_completed);
        assert_eq!(h.manager.sessions_remaining_count(), 1);

        h.manager.set_completed(b.local_id, true);
        assert_eq!(h.manager.sessions_remaining_count(), 0);
        // Marked complete but sets still outstanding
        assert!(h.manager.session_has_incomplete_work());

        h.manager.update_prescription(b.local_id, 0, 0, 0);
        assert!(!h.manager.session_has_incomplete_work());
        assert!(h.manager.record_set_done(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_clear_session() {
        let h = harness(false);
        h.manager.add_to_session(&[drill(1, "A")]);
        h.manager.clear_session();
        assert!(h.manager.session_drills().is_empty());
    }
}
