//! Default catalog of drills.
//!
//! The backend is the real source of drills. This built-in set mirrors a
//! slice of it (same backend ids) for offline use and tests.

use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// An ordered list of drills.
#[derive(Clone, Debug)]
pub struct Catalog {
    pub drills: Vec<Drill>,
}

impl Catalog {
    pub fn by_backend_id(&self, backend_id: BackendId) -> Option<&Drill> {
        self.drills.iter().find(|d| d.backend_id == Some(backend_id))
    }

    /// Drills matching the given preferences, in catalog order.
    pub fn filter<'a>(&'a self, preferences: &'a FilterPreferences) -> impl Iterator<Item = &'a Drill> {
        self.drills.iter().filter(move |d| preferences.matches(d))
    }

    /// Validate the catalog for consistency
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut local_ids = HashSet::new();
        let mut backend_ids = HashSet::new();

        for drill in &self.drills {
            if !local_ids.insert(drill.local_id) {
                errors.push(format!("Duplicate local id for drill {:?}", drill.title));
            }
            if let Some(id) = drill.backend_id {
                if !backend_ids.insert(id) {
                    errors.push(format!("Duplicate backend id {}", id));
                }
                if drill.local_id != Drill::local_id_for_backend(id) {
                    errors.push(format!(
                        "Drill {:?} local id does not match backend id {}",
                        drill.title, id
                    ));
                }
            }
            if drill.sets == 0 {
                errors.push(format!("Drill {:?} has no sets", drill.title));
            }
            if drill.title.trim().is_empty() {
                errors.push("Drill with empty title".to_string());
            }
        }

        errors
    }
}

#[allow(clippy::too_many_arguments)]
fn catalog_drill(
    backend_id: BackendId,
    title: &str,
    skill: &str,
    sub_skills: &[&str],
    (sets, reps, duration): (u32, u32, u32),
    equipment: &[&str],
    training_style: TrainingStyle,
    difficulty: Difficulty,
    description: &str,
) -> Drill {
    Drill {
        local_id: Drill::local_id_for_backend(backend_id),
        backend_id: Some(backend_id),
        title: title.into(),
        skill: skill.into(),
        sub_skills: sub_skills.iter().map(|s| s.to_string()).collect(),
        sets,
        reps,
        duration,
        description: description.into(),
        instructions: Vec::new(),
        tips: Vec::new(),
        equipment: equipment.iter().map(|s| s.to_string()).collect(),
        training_style,
        difficulty,
        video_url: None,
    }
}

/// Builds the default catalog.
///
/// Prefer [`get_default_catalog`] outside tests.
pub fn build_default_catalog() -> Catalog {
    use Difficulty::*;
    use TrainingStyle::*;

    let mut drills = vec![
        catalog_drill(
            101,
            "Wall Passes",
            "passing",
            &["short_passing", "first_touch"],
            (4, 20, 10),
            &["ball", "wall"],
            MediumIntensity,
            Beginner,
            "Alternate-foot passes against a wall, controlling each return.",
        ),
        catalog_drill(
            102,
            "Cone Weave",
            "dribbling",
            &["close_control", "ball_mastery"],
            (3, 6, 8),
            &["ball", "cones"],
            MediumIntensity,
            Beginner,
            "Dribble through a line of cones using both feet.",
        ),
        catalog_drill(
            103,
            "Finishing Circuit",
            "shooting",
            &["finishing", "power"],
            (4, 8, 15),
            &["ball", "goal"],
            HighIntensity,
            Intermediate,
            "Receive, turn and finish from three angles.",
        ),
        catalog_drill(
            104,
            "Toe Taps",
            "dribbling",
            &["ball_mastery"],
            (3, 30, 5),
            &["ball"],
            MediumIntensity,
            Beginner,
            "Alternate soles on top of the ball at speed.",
        ),
        catalog_drill(
            105,
            "Aerial Control",
            "first_touch",
            &["aerial_control"],
            (3, 10, 10),
            &["ball"],
            MediumIntensity,
            Intermediate,
            "Kill high balls dead with thigh, chest and instep.",
        ),
        catalog_drill(
            106,
            "Shuttle Sprints",
            "fitness",
            &["speed", "agility"],
            (6, 1, 12),
            &["cones"],
            HighIntensity,
            Intermediate,
            "Sprint between cones at 5, 10 and 15 metres.",
        ),
        catalog_drill(
            107,
            "1v1 Moves Ladder",
            "dribbling",
            &["feints", "change_of_direction"],
            (4, 5, 12),
            &["ball", "cones"],
            HighIntensity,
            Advanced,
            "Chain two feints before exploding past a cone defender.",
        ),
        catalog_drill(
            108,
            "Mobility Flow",
            "recovery",
            &["mobility"],
            (1, 1, 10),
            &[],
            RestDay,
            Beginner,
            "Hips, ankles and hamstrings flow for recovery days.",
        ),
    ];

    drills[0].tips = vec!["Lock your ankle on contact".into()];
    drills[0].instructions = vec![
        "Stand two metres from the wall".into(),
        "Pass with the inside of the foot".into(),
        "Control with the opposite foot".into(),
    ];

    Catalog { drills }
}
