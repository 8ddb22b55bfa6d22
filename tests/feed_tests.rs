use actix_web::{test, web, App};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use wax_social::api::{self, AppState};
use wax_social::auth::AuthService;
use wax_social::lookup::LookupService;
use wax_social::models::{User, Vinyl};
use wax_social::notify::Notifier;
use wax_social::push::PushService;
use wax_social::realtime::RealtimeHub;
use wax_social::store::Store;

/// Helper to create AppState with all required components
fn create_app_state(store: Arc<Store>, auth_service: Arc<AuthService>) -> AppState {
    AppState {
        store: store.clone(),
        auth_service: auth_service.clone(),
        notifier: Arc::new(Notifier::new(
            store.clone(),
            PushService::disabled(),
            RealtimeHub::new(),
        )),
        realtime: RealtimeHub::new(),
        lookup: Arc::new(LookupService::new(None, None)),
    }
}

/// Helper to create a test user and return their auth token
fn create_test_user_with_token(
    store: &Arc<Store>,
    auth_service: &Arc<AuthService>,
    username: &str,
) -> (User, String) {
    let password_hash = auth_service.hash_password("testpass123").unwrap();

    let mut user = User {
        id: String::new(),
        username: username.to_string(),
        email: format!("{}@test.com", username),
        password_hash,
        display_name: username.to_string(),
        bio: String::new(),
        avatar_url: String::new(),
        is_public: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    store.create_user(&mut user).unwrap();
    let token = auth_service.generate_token(&user.id).unwrap();
    (user, token)
}

/// Helper to create a vinyl directly in the store
fn create_test_vinyl(store: &Arc<Store>, user_id: &str, title: &str) -> String {
    let mut vinyl = Vinyl {
        id: String::new(),
        user_id: user_id.to_string(),
        artist: "Various".to_string(),
        title: title.to_string(),
        year: None,
        barcode: None,
        format: "vinyl".to_string(),
        cover_url: String::new(),
        notes: String::new(),
        gifted_by: None,
        shared_with: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.create_vinyl(&mut vinyl).unwrap();
    vinyl.id
}

#[actix_web::test]
async fn test_feed_contains_followed_accounts_only() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, _) = create_test_user_with_token(&store, &auth_service, "alice");
    let (_bob, bob_token) = create_test_user_with_token(&store, &auth_service, "bob");
    let (carol, _) = create_test_user_with_token(&store, &auth_service, "carol");

    create_test_vinyl(&store, &alice.id, "Followed Record");
    create_test_vinyl(&store, &carol.id, "Unfollowed Record");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/followers/follow/{}", alice.id))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/followers/feed/recent")
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();

    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let data = body["data"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["title"], "Followed Record");
    assert_eq!(data[0]["username"], "alice");
    assert_eq!(data[0]["has_liked"], false);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["has_more"], false);
}

#[actix_web::test]
async fn test_feed_reflects_like_state_and_counts() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, _) = create_test_user_with_token(&store, &auth_service, "alice");
    let (_bob, bob_token) = create_test_user_with_token(&store, &auth_service, "bob");
    let vinyl_id = create_test_vinyl(&store, &alice.id, "Liked Record");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/followers/follow/{}", alice.id))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/interactions/likes/{}", vinyl_id))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/interactions/comments/{}", vinyl_id))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .set_json(json!({ "content": "Spinning this now" }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/followers/feed/recent")
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();

    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let data = body["data"]["data"].as_array().unwrap();
    assert_eq!(data[0]["has_liked"], true);
    assert_eq!(data[0]["like_count"], 1);
    assert_eq!(data[0]["comment_count"], 1);
}

#[actix_web::test]
async fn test_feed_pagination_disjoint_and_complete() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, _) = create_test_user_with_token(&store, &auth_service, "alice");
    let (_bob, bob_token) = create_test_user_with_token(&store, &auth_service, "bob");

    for i in 0..25 {
        create_test_vinyl(&store, &alice.id, &format!("Record {}", i));
    }

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/followers/follow/{}", alice.id))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();
    test::call_service(&app, req).await;

    let mut seen = HashSet::new();
    let mut offset = 0;
    loop {
        let req = test::TestRequest::get()
            .uri(&format!("/api/followers/feed/recent?limit=10&offset={}", offset))
            .insert_header(("Authorization", format!("Bearer {}", bob_token)))
            .to_request();

        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let data = body["data"]["data"].as_array().unwrap().clone();
        assert_eq!(body["data"]["total"], 25);

        for item in &data {
            let id = item["id"].as_str().unwrap().to_string();
            // Disjoint slices: nothing repeats across pages
            assert!(seen.insert(id), "duplicate item across pages");
        }

        if body["data"]["has_more"] == false {
            assert!(data.len() <= 10);
            break;
        }
        assert_eq!(data.len(), 10);
        offset += 10;
    }

    // Contiguous: all 25 items covered, no gaps
    assert_eq!(seen.len(), 25);
}

#[actix_web::test]
async fn test_feed_newest_first() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, _) = create_test_user_with_token(&store, &auth_service, "alice");
    let (_bob, bob_token) = create_test_user_with_token(&store, &auth_service, "bob");

    create_test_vinyl(&store, &alice.id, "Older");
    std::thread::sleep(std::time::Duration::from_millis(5));
    create_test_vinyl(&store, &alice.id, "Newer");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/followers/follow/{}", alice.id))
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/followers/feed/recent")
        .insert_header(("Authorization", format!("Bearer {}", bob_token)))
        .to_request();

    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let data = body["data"]["data"].as_array().unwrap();
    assert_eq!(data[0]["title"], "Newer");
    assert_eq!(data[1]["title"], "Older");
}

/// End-to-end flow across registration, following, cataloguing, liking and
/// notification delivery.
#[actix_web::test]
async fn test_end_to_end_follow_like_notify() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes),
    )
    .await;

    // A (public) and B register
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": "anna",
            "email": "anna@test.com",
            "password": "testpass123"
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let anna_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    let anna_token = body["data"]["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": "ben",
            "email": "ben@test.com",
            "password": "testpass123"
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let ben_token = body["data"]["token"].as_str().unwrap().to_string();

    // B follows A: accepted immediately because A is public
    let req = test::TestRequest::post()
        .uri(&format!("/api/followers/follow/{}", anna_id))
        .insert_header(("Authorization", format!("Bearer {}", ben_token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "accepted");

    // A adds a record
    let req = test::TestRequest::post()
        .uri("/api/vinyls")
        .insert_header(("Authorization", format!("Bearer {}", anna_token)))
        .set_json(json!({ "artist": "Broadcast", "title": "Tender Buttons" }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let vinyl_id = body["data"]["id"].as_str().unwrap().to_string();

    // B's feed includes it, unliked
    let req = test::TestRequest::get()
        .uri("/api/followers/feed/recent")
        .insert_header(("Authorization", format!("Bearer {}", ben_token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let data = body["data"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"], vinyl_id.as_str());
    assert_eq!(data[0]["has_liked"], false);

    // B likes it
    let req = test::TestRequest::post()
        .uri(&format!("/api/interactions/likes/{}", vinyl_id))
        .insert_header(("Authorization", format!("Bearer {}", ben_token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["liked"], true);

    // Feed reflects the like
    let req = test::TestRequest::get()
        .uri("/api/followers/feed/recent")
        .insert_header(("Authorization", format!("Bearer {}", ben_token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["data"][0]["has_liked"], true);

    // A has one unread VINYL_LIKE plus the earlier NEW_FOLLOWER
    let req = test::TestRequest::get()
        .uri("/api/notifications")
        .insert_header(("Authorization", format!("Bearer {}", anna_token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let notifications = body["data"]["notifications"].as_array().unwrap();
    let likes: Vec<_> = notifications
        .iter()
        .filter(|n| n["type"] == "VINYL_LIKE")
        .collect();
    assert_eq!(likes.len(), 1);
    assert_eq!(likes[0]["is_read"], false);
    assert_eq!(likes[0]["reference_id"], vinyl_id.as_str());
}
