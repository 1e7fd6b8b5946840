//! End-to-end tests for the session manager against a scripted backend.

use drill_core::testing::MockTransport;
use drill_core::transport::{Endpoint, Method, Response};
use drill_core::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Setup {
    manager: Arc<SessionManager>,
    transport: Arc<MockTransport>,
    auth: Arc<StaticAuth>,
    clock: Arc<ManualClock>,
}

fn setup(cache: Arc<dyn CacheStore>, user: &str) -> Setup {
    drill_core::logging::init_test();
    let transport = Arc::new(MockTransport::new());
    let auth = Arc::new(StaticAuth::authenticated(user));
    let clock = Arc::new(ManualClock::new());
    let manager = SessionManager::new(cache, transport.clone(), auth.clone())
        .with_clock(clock.clone())
        .with_debounce_delay(Duration::from_secs(3));
    let manager = Arc::new(manager);
    manager.login().expect("login");
    Setup {
        manager,
        transport,
        auth,
        clock,
    }
}

fn catalog_drill(id: BackendId) -> Drill {
    get_default_catalog()
        .by_backend_id(id)
        .expect("catalog drill")
        .clone()
}

#[tokio::test]
async fn test_group_create_then_update_through_auto_save() {
    let s = setup(Arc::new(MemoryCache::new()), "alice");
    s.transport.respond(
        Method::Post,
        Endpoint::DrillGroups,
        Response::json(201, &json!({ "id": 42 })),
    );

    let group_id = s.manager.create_group("Warmups", "before games");
    s.manager
        .add_drill_to_group(&catalog_drill(101), group_id)
        .unwrap();

    s.clock.advance(Duration::from_secs(3));
    let report = s.manager.tick().await.expect("auto-save due");
    assert_eq!(report.synced, vec![Category::SavedGroups]);
    assert_eq!(s.manager.backend_id_for(group_id), Some(42));

    s.manager
        .add_drill_to_group(&catalog_drill(104), group_id)
        .unwrap();
    s.clock.advance(Duration::from_secs(3));
    s.manager.tick().await.expect("auto-save due");

    assert_eq!(
        s.transport
            .requests_to(Method::Post, Endpoint::DrillGroups)
            .len(),
        1
    );
    let updates = s.transport.requests_to(Method::Put, Endpoint::DrillGroup(42));
    assert_eq!(updates.len(), 1);
    let body = updates[0].body.as_ref().unwrap();
    assert_eq!(body["name"], "Warmups");
    assert_eq!(body["drill_ids"], json!([101, 104]));
}

#[tokio::test]
async fn test_session_and_preferences_sync_in_order() {
    let s = setup(Arc::new(MemoryCache::new()), "alice");
    s.transport.respond(
        Method::Post,
        Endpoint::LikedGroup,
        Response::json(201, &json!({ "id": 3 })),
    );

    let mut prefs = s.manager.filter_preferences();
    prefs.difficulty = Some(Difficulty::Beginner);
    s.manager.set_filter_preferences(prefs);
    s.manager.toggle_like(&catalog_drill(105));
    s.manager.add_to_session(&[catalog_drill(101), catalog_drill(102)]);

    let report = s.manager.flush().await;

    assert_eq!(
        report.synced,
        vec![
            Category::SessionDrills,
            Category::LikedGroup,
            Category::Preferences
        ]
    );
    let endpoints: Vec<Endpoint> = s.transport.requests().iter().map(|r| r.endpoint).collect();
    assert_eq!(
        endpoints,
        vec![
            Endpoint::SessionDrills,
            Endpoint::LikedGroup,
            Endpoint::Preferences
        ]
    );
    let session = s.transport.requests_to(Method::Put, Endpoint::SessionDrills);
    let body = session[0].body.as_ref().unwrap();
    assert_eq!(body[0]["drill_id"], 101);
    assert_eq!(body[1]["drill_id"], 102);
}

#[tokio::test]
async fn test_logout_purges_and_relogin_sees_nothing() {
    let cache = Arc::new(MemoryCache::new());
    let s = setup(cache.clone(), "alice");
    s.manager.add_to_session(&[catalog_drill(101)]);
    s.manager.flush().await;
    assert!(cache.entry_count("alice") > 0);

    s.manager.add_to_session(&[catalog_drill(102)]);
    s.manager.logout().unwrap();
    s.transport.clear_requests();

    assert_eq!(cache.entry_count("alice"), 0);
    assert!(s.manager.pending_deadline().is_none());
    assert!(s.manager.current_user().is_none());

    s.clock.advance(Duration::from_secs(10));
    assert!(s.manager.tick().await.is_none());
    assert!(s.transport.requests().is_empty());

    s.manager.login().unwrap();
    assert!(s.manager.session_drills().is_empty());
    assert!(s.manager.saved_groups().is_empty());
}

#[tokio::test]
async fn test_clear_user_data_keeps_user_logged_in() {
    let cache = Arc::new(MemoryCache::new());
    let s = setup(cache.clone(), "alice");
    s.manager.add_to_session(&[catalog_drill(101)]);
    s.manager.flush().await;

    s.manager.clear_user_data().unwrap();

    assert_eq!(s.manager.current_user().as_deref(), Some("alice"));
    assert!(s.manager.session_drills().is_empty());
    assert_eq!(cache.entry_count("alice"), 0);
}

#[tokio::test]
async fn test_switching_user_purges_previous_cache() {
    let cache = Arc::new(MemoryCache::new());
    let s = setup(cache.clone(), "alice");
    s.manager.add_to_session(&[catalog_drill(101)]);
    s.manager.flush().await;

    s.manager.logout().unwrap();
    s.auth.sign_in("bob", true);
    s.manager.login().unwrap();
    assert!(s.manager.session_drills().is_empty());
    s.manager.add_to_session(&[catalog_drill(104)]);
    s.manager.flush().await;

    assert_eq!(cache.entry_count("alice"), 0);
    assert!(cache.entry_count("bob") > 0);
}

#[tokio::test]
async fn test_login_as_other_user_purges_leftover_cache() {
    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(FileCache::new(temp_dir.path()));
    let session_key = CacheKey::from(Category::SessionDrills);
    {
        let s = setup(cache.clone(), "alice");
        s.manager.add_to_session(&[catalog_drill(101)]);
        s.manager.flush().await;
    }
    assert!(cache.get("alice", session_key).unwrap().is_some());

    // New process, different account, no logout in between
    let s = setup(cache.clone(), "bob");

    assert!(s.manager.session_drills().is_empty());
    assert!(cache.get("alice", session_key).unwrap().is_none());
    assert!(cache.get("alice", CacheKey::Identifiers).unwrap().is_none());
}

#[tokio::test]
async fn test_file_cache_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let group_id;
    {
        let s = setup(Arc::new(FileCache::new(temp_dir.path())), "alice");
        s.transport.respond(
            Method::Post,
            Endpoint::DrillGroups,
            Response::json(201, &json!({ "id": 7 })),
        );
        s.transport.respond(
            Method::Post,
            Endpoint::LikedGroup,
            Response::json(201, &json!({ "id": 3 })),
        );
        s.manager.add_to_session(&[catalog_drill(101), catalog_drill(106)]);
        s.manager.record_set_done(catalog_drill(106).local_id);
        group_id = s.manager.create_group("Speed", "");
        s.manager
            .add_drill_to_group(&catalog_drill(106), group_id)
            .unwrap();
        s.manager.toggle_like(&catalog_drill(108));
        let report = s.manager.flush().await;
        assert!(report.is_complete());
    }

    let s = setup(Arc::new(FileCache::new(temp_dir.path())), "alice");
    let session = s.manager.session_drills();
    assert_eq!(session.len(), 2);
    assert_eq!(session[1].sets_done, 1);
    let group = s.manager.group(group_id).expect("group restored");
    assert_eq!(group.backend_id, Some(7));
    assert!(s.manager.is_liked(&catalog_drill(108)));
    assert!(s.manager.dirty_categories().is_empty());

    // Restored mapping means the next sync is an update
    s.manager
        .add_drill_to_group(&catalog_drill(102), group_id)
        .unwrap();
    s.manager.flush().await;
    assert_eq!(
        s.transport
            .requests_to(Method::Put, Endpoint::DrillGroup(7))
            .len(),
        1
    );
    assert!(s
        .transport
        .requests_to(Method::Post, Endpoint::DrillGroups)
        .is_empty());
}

#[tokio::test]
async fn test_corrupted_cache_entry_loads_as_default() {
    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(FileCache::new(temp_dir.path()));
    {
        let s = setup(cache.clone(), "alice");
        s.manager.add_to_session(&[catalog_drill(101)]);
        s.manager.create_group("Keep me", "");
        s.manager.flush().await;
    }

    cache
        .set("alice", Category::SessionDrills.into(), b"{ not json")
        .unwrap();

    let s = setup(cache, "alice");
    assert!(s.manager.session_drills().is_empty());
    assert_eq!(s.manager.saved_groups().len(), 1);
}

#[tokio::test]
async fn test_unreachable_backend_defers_sync() {
    let s = setup(Arc::new(MemoryCache::new()), "alice");
    s.transport.set_offline(true);
    let group_id = s.manager.create_group("Later", "");

    let report = s.manager.flush().await;
    assert_eq!(report.persisted, vec![Category::SavedGroups]);
    assert_eq!(report.failed, vec![Category::SavedGroups]);
    assert_eq!(s.manager.backend_id_for(group_id), None);

    s.transport.set_offline(false);
    s.transport.respond(
        Method::Post,
        Endpoint::DrillGroups,
        Response::json(201, &json!({ "id": 5 })),
    );
    s.manager.app_foregrounded();
    s.clock.advance(Duration::from_secs(3));
    let report = s.manager.tick().await.expect("re-armed");

    assert_eq!(report.synced, vec![Category::SavedGroups]);
    assert_eq!(s.manager.backend_id_for(group_id), Some(5));
}

#[tokio::test]
async fn test_load_groups_from_backend_is_repeatable() {
    let s = setup(Arc::new(MemoryCache::new()), "alice");
    s.transport.respond(
        Method::Get,
        Endpoint::DrillGroups,
        Response::json(
            200,
            &json!([{
                "id": 12,
                "name": "Passing",
                "description": "",
                "drills": [{
                    "id": 101,
                    "title": "Wall Passes",
                    "skill": "passing",
                    "sets": 4,
                    "reps": 20,
                    "duration": 10,
                    "training_style": "medium_intensity",
                    "difficulty": "beginner",
                    "video_url": null
                }]
            }]),
        ),
    );
    s.transport
        .respond(Method::Get, Endpoint::LikedGroup, Response::new(404, "not found"));

    s.manager.load_groups_from_backend().await.unwrap();
    let first = s.manager.saved_groups();
    s.manager.load_groups_from_backend().await.unwrap();
    let second = s.manager.saved_groups();

    assert_eq!(first, second);
    assert_eq!(first[0].drills[0], catalog_drill(101));
    assert!(s.manager.liked_group().drills.is_empty());
    assert!(s.manager.liked_group().backend_id.is_none());
    assert!(s.manager.dirty_categories().is_empty());
}
