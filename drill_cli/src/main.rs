use clap::{Parser, Subcommand};
use drill_core::*;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "drills")]
#[command(about = "Plan and track soccer training drills", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Whose cache to use
    #[arg(long, global = true, default_value = "local")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog drills matching your filter preferences
    Catalog {
        /// Ignore filter preferences
        #[arg(long)]
        all: bool,
    },

    /// Add catalog drills to the session
    Add {
        /// Catalog drill ids
        #[arg(required = true)]
        ids: Vec<BackendId>,
    },

    /// Show the current session
    Session,

    /// Record a finished set for a session entry
    Done {
        /// Session position (1-based)
        position: usize,

        /// Mark the whole drill completed
        #[arg(long)]
        all: bool,
    },

    /// Reorder session entries
    Move {
        /// Session positions to move (1-based)
        #[arg(required = true)]
        positions: Vec<usize>,

        /// Position to move them in front of (one past the end to append)
        #[arg(long)]
        to: usize,
    },

    /// Remove an entry from the session
    Remove {
        /// Session position (1-based)
        position: usize,
    },

    /// Like or unlike a catalog drill
    Like {
        /// Catalog drill id
        id: BackendId,
    },

    /// List liked drills
    Liked,

    /// Manage saved drill groups
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Show or change filter preferences
    Prefs {
        /// Longest drill to show, in minutes
        #[arg(long)]
        max_minutes: Option<u32>,

        /// beginner, intermediate or advanced
        #[arg(long)]
        difficulty: Option<String>,

        /// Equipment you have (repeatable)
        #[arg(long)]
        equipment: Vec<String>,

        /// Reset to defaults
        #[arg(long)]
        clear: bool,
    },

    /// Forget everything stored for the user
    Logout,
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create an empty group
    Create {
        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Add catalog drills to a group
    Add {
        /// Group name or id
        group: String,

        #[arg(required = true)]
        ids: Vec<BackendId>,
    },

    /// List groups and their drills
    List,

    /// Delete a group
    Delete {
        /// Group name or id
        group: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    drill_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let cache_root = cli
        .data_dir
        .map(|dir| dir.join("cache"))
        .unwrap_or_else(|| config.data.cache_dir());
    std::fs::create_dir_all(&cache_root)?;
    tracing::debug!("Using cache at {:?}", cache_root);

    let catalog = get_default_catalog();
    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::Other("Invalid catalog".into()));
    }

    // No backend here: every flush lands in the cache only
    let manager = SessionManager::from_config(
        &config,
        Arc::new(FileCache::new(cache_root)),
        Arc::new(OfflineTransport),
        Arc::new(StaticAuth::offline(cli.user)),
    );
    manager.login()?;

    if let Commands::Logout = cli.command {
        manager.logout()?;
        println!("✓ Local data cleared");
        return Ok(());
    }

    match cli.command {
        Commands::Catalog { all } => cmd_catalog(&manager, catalog, all),
        Commands::Add { ids } => cmd_add(&manager, catalog, &ids)?,
        Commands::Session => print_session(&manager),
        Commands::Done { position, all } => cmd_done(&manager, position, all)?,
        Commands::Move { positions, to } => cmd_move(&manager, &positions, to)?,
        Commands::Remove { position } => cmd_remove(&manager, position)?,
        Commands::Like { id } => cmd_like(&manager, catalog, id)?,
        Commands::Liked => cmd_liked(&manager),
        Commands::Group { command } => cmd_group(&manager, catalog, command)?,
        Commands::Prefs {
            max_minutes,
            difficulty,
            equipment,
            clear,
        } => cmd_prefs(&manager, max_minutes, difficulty, equipment, clear)?,
        Commands::Logout => {}
    }

    let report = manager.flush().await;
    tracing::debug!("Saved {:?}", report.persisted);
    if !report.is_complete() {
        return Err(Error::Other(format!(
            "Failed to save {:?}",
            report.failed
        )));
    }
    Ok(())
}

fn catalog_drill(catalog: &Catalog, id: BackendId) -> Result<&Drill> {
    catalog
        .by_backend_id(id)
        .ok_or_else(|| Error::Other(format!("Unknown drill id {}", id)))
}

/// Session entry at a 1-based position.
fn session_entry(manager: &SessionManager, position: usize) -> Result<EditableDrill> {
    let session = manager.session_drills();
    position
        .checked_sub(1)
        .and_then(|index| session.get(index).cloned())
        .ok_or(Error::InvalidRange {
            index: position,
            len: session.len(),
        })
}

fn find_group(manager: &SessionManager, group: &str) -> Result<DrillGroup> {
    let groups = manager.saved_groups();
    let by_id = Uuid::parse_str(group)
        .ok()
        .and_then(|id| groups.iter().find(|g| g.local_id == id));
    by_id
        .or_else(|| groups.iter().find(|g| g.name == group))
        .cloned()
        .ok_or_else(|| Error::Other(format!("No group named {:?}", group)))
}

fn cmd_catalog(manager: &SessionManager, catalog: &Catalog, all: bool) {
    let preferences = if all {
        FilterPreferences::default()
    } else {
        manager.filter_preferences()
    };
    for drill in catalog.filter(&preferences) {
        let marker = if manager.is_liked(drill) { "♥" } else { " " };
        println!(
            "{} {:>4}  {:<20} {:<12} {:>2} min  {:?}",
            marker,
            drill.backend_id.unwrap_or_default(),
            drill.title,
            drill.skill,
            drill.duration,
            drill.difficulty
        );
    }
}

fn cmd_add(manager: &SessionManager, catalog: &Catalog, ids: &[BackendId]) -> Result<()> {
    for &id in ids {
        let drill = catalog_drill(catalog, id)?;
        if !manager.is_selected(drill) {
            manager.toggle_selection(drill);
        }
    }
    let selected = manager.selected_drills();
    manager.add_to_session(&selected);
    println!("✓ Session has {} drills", manager.session_drills().len());
    Ok(())
}

fn print_session(manager: &SessionManager) {
    let session = manager.session_drills();
    if session.is_empty() {
        println!("Session is empty.");
        return;
    }
    for (i, entry) in session.iter().enumerate() {
        let status = if entry.is_completed { "✓" } else { " " };
        println!(
            "{} {}. {:<20} {}/{} sets x {} reps, {} min",
            status,
            i + 1,
            entry.drill.title,
            entry.sets_done,
            entry.total_sets,
            entry.total_reps,
            entry.total_duration
        );
    }
    println!(
        "\n{} of {} drills remaining",
        manager.sessions_remaining_count(),
        session.len()
    );
}

fn cmd_done(manager: &SessionManager, position: usize, all: bool) -> Result<()> {
    let entry = session_entry(manager, position)?;
    let updated = if all {
        manager.set_completed(entry.id(), true)
    } else {
        manager.record_set_done(entry.id())
    };
    if let Some(updated) = updated {
        println!(
            "✓ {}: {}/{} sets",
            updated.drill.title, updated.sets_done, updated.total_sets
        );
    }
    if !manager.session_has_incomplete_work() {
        println!("Session complete!");
    }
    Ok(())
}

fn cmd_move(manager: &SessionManager, positions: &[usize], to: usize) -> Result<()> {
    let len = manager.session_drills().len();
    let mut from = Vec::with_capacity(positions.len());
    for &position in positions {
        let index = position
            .checked_sub(1)
            .ok_or(Error::InvalidRange { index: position, len })?;
        from.push(index);
    }
    let to = to.checked_sub(1).ok_or(Error::InvalidRange { index: to, len })?;
    manager.move_drill(&from, to)?;
    print_session(manager);
    Ok(())
}

fn cmd_remove(manager: &SessionManager, position: usize) -> Result<()> {
    let entry = session_entry(manager, position)?;
    manager.delete_drill_from_session(&entry);
    println!("✓ Removed {}", entry.drill.title);
    Ok(())
}

fn cmd_like(manager: &SessionManager, catalog: &Catalog, id: BackendId) -> Result<()> {
    let drill = catalog_drill(catalog, id)?;
    if manager.toggle_like(drill) {
        println!("♥ Liked {}", drill.title);
    } else {
        println!("Unliked {}", drill.title);
    }
    Ok(())
}

fn cmd_liked(manager: &SessionManager) {
    let liked = manager.liked_group();
    if liked.drills.is_empty() {
        println!("No liked drills yet.");
        return;
    }
    for drill in &liked.drills {
        println!("♥ {}", drill.title);
    }
}

fn cmd_group(manager: &SessionManager, catalog: &Catalog, command: GroupCommands) -> Result<()> {
    match command {
        GroupCommands::Create { name, description } => {
            let id = manager.create_group(&name, &description);
            println!("✓ Created group {} ({})", name, id);
        }
        GroupCommands::Add { group, ids } => {
            let group = find_group(manager, &group)?;
            for id in ids {
                let drill = catalog_drill(catalog, id)?;
                manager.add_drill_to_group(drill, group.local_id)?;
            }
            let count = manager
                .group(group.local_id)
                .map(|g| g.drills.len())
                .unwrap_or_default();
            println!("✓ {} has {} drills", group.name, count);
        }
        GroupCommands::List => {
            let groups = manager.saved_groups();
            if groups.is_empty() {
                println!("No groups yet.");
            }
            for group in groups {
                println!("{} ({})", group.name, group.local_id);
                for drill in &group.drills {
                    println!("  - {}", drill.title);
                }
            }
        }
        GroupCommands::Delete { group } => {
            let group = find_group(manager, &group)?;
            manager.delete_group(group.local_id)?;
            println!("✓ Deleted {}", group.name);
        }
    }
    Ok(())
}

fn parse_difficulty(value: &str) -> Result<Difficulty> {
    match value.to_lowercase().as_str() {
        "beginner" => Ok(Difficulty::Beginner),
        "intermediate" => Ok(Difficulty::Intermediate),
        "advanced" => Ok(Difficulty::Advanced),
        _ => Err(Error::Other(format!("Unknown difficulty: {}", value))),
    }
}

fn cmd_prefs(
    manager: &SessionManager,
    max_minutes: Option<u32>,
    difficulty: Option<String>,
    equipment: Vec<String>,
    clear: bool,
) -> Result<()> {
    let mut preferences = if clear {
        FilterPreferences::default()
    } else {
        manager.filter_preferences()
    };
    if let Some(minutes) = max_minutes {
        preferences.time_budget = Some(minutes);
    }
    if let Some(difficulty) = difficulty {
        preferences.difficulty = Some(parse_difficulty(&difficulty)?);
    }
    if !equipment.is_empty() {
        preferences.equipment = equipment.into_iter().collect();
    }
    manager.set_filter_preferences(preferences.clone());

    println!("Filter preferences:");
    match preferences.time_budget {
        Some(minutes) => println!("  Max minutes: {}", minutes),
        None => println!("  Max minutes: any"),
    }
    match preferences.difficulty {
        Some(difficulty) => println!("  Difficulty: {:?}", difficulty),
        None => println!("  Difficulty: any"),
    }
    if preferences.equipment.is_empty() {
        println!("  Equipment: any");
    } else {
        let equipment: Vec<_> = preferences.equipment.iter().map(String::as_str).collect();
        println!("  Equipment: {}", equipment.join(", "));
    }
    Ok(())
}
