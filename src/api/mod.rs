use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{user_id_from_token, AuthService, AuthUser};
use crate::lookup::LookupService;
use crate::models::*;
use crate::notify::Notifier;
use crate::realtime::{self, RealtimeHub};
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
    pub notifier: Arc<Notifier>,
    pub realtime: RealtimeHub,
    pub lookup: Arc<LookupService>,
}

/// Catalogue and profile stats are visible when the owner is public, the
/// requester is the owner, or an accepted edge requester -> owner exists.
fn catalogue_visible(store: &Store, owner: &User, requester_id: &str) -> Result<bool, StoreError> {
    if owner.is_public || owner.id == requester_id {
        return Ok(true);
    }
    store.is_following_accepted(requester_id, &owner.id)
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> impl Responder {
    if body.username.trim().is_empty() || body.email.trim().is_empty() || body.password.is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Username, email and password are required"));
    }

    let password_hash = match state.auth_service.hash_password(&body.password) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to hash password"))
        }
    };

    let mut user = User {
        id: String::new(),
        username: body.username.trim().to_string(),
        email: body.email.trim().to_string(),
        password_hash,
        display_name: body
            .display_name
            .clone()
            .unwrap_or_else(|| body.username.trim().to_string()),
        bio: String::new(),
        avatar_url: String::new(),
        is_public: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.create_user(&mut user) {
        Ok(_) => {}
        Err(StoreError::Conflict(_)) => {
            return HttpResponse::Conflict()
                .json(ApiResponse::<()>::error("Username or email already taken"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to create user: {}", e)));
        }
    }

    let token = match state.auth_service.generate_token(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Created().json(ApiResponse::success(LoginResponse { token, user }))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let user = match state.store.get_user_by_username(&body.username) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
        }
        Err(_) => {
            return HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Database error"));
        }
    };

    let valid = state
        .auth_service
        .verify_password(&body.password, &user.password_hash)
        .unwrap_or(false);

    if !valid {
        return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
    }

    let token = match state.auth_service.generate_token(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(LoginResponse { token, user }))
}

pub async fn get_current_user(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.get_user(&auth_user.user_id) {
        Ok(user) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(_) => HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found")),
    }
}

pub async fn update_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    let mut user = match state.store.get_user(&auth_user.user_id) {
        Ok(u) => u,
        Err(_) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found"));
        }
    };

    if let Some(ref display_name) = body.display_name {
        user.display_name = display_name.clone();
    }
    if let Some(ref bio) = body.bio {
        user.bio = bio.clone();
    }
    if let Some(ref avatar_url) = body.avatar_url {
        user.avatar_url = avatar_url.clone();
    }
    if let Some(is_public) = body.is_public {
        user.is_public = is_public;
    }

    match state.store.update_user(&mut user) {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to update profile: {}", e))),
    }
}

// ==================== User Endpoints ====================

pub async fn get_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    let user = match state.store.get_user(&id) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get user: {}", e)));
        }
    };

    let visible = match catalogue_visible(&state.store, &user, &auth_user.user_id) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check visibility: {}", e)));
        }
    };

    let (vinyl_count, follower_count, following_count) = if visible {
        let vinyls = state.store.count_vinyls(&user.id).unwrap_or(0);
        let followers = state.store.count_followers(&user.id).unwrap_or(0);
        let following = state.store.count_following(&user.id).unwrap_or(0);
        (Some(vinyls), Some(followers), Some(following))
    } else {
        (None, None, None)
    };

    HttpResponse::Ok().json(ApiResponse::success(ProfileResponse {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        bio: user.bio,
        avatar_url: user.avatar_url,
        is_public: user.is_public,
        visible,
        vinyl_count,
        follower_count,
        following_count,
    }))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

pub async fn search_users(
    state: web::Data<AppState>,
    _auth_user: AuthUser,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let q = query.q.as_deref().unwrap_or("").trim().to_string();
    if q.is_empty() {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error("Missing search query"));
    }

    match state.store.search_users(&q, 20) {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to search users: {}", e))),
    }
}

// ==================== Vinyl Endpoints ====================

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_vinyls(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(50).min(100);
    let offset = query.offset.unwrap_or(0).max(0);

    match state.store.list_vinyls(&auth_user.user_id, limit, offset) {
        Ok(vinyls) => HttpResponse::Ok().json(ApiResponse::success(vinyls)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list vinyls: {}", e))),
    }
}

pub async fn get_vinyl(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    let vinyl = match state.store.get_vinyl(&id) {
        Ok(v) => v,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get vinyl: {}", e)));
        }
    };

    match vinyl_visible(&state.store, &vinyl, &auth_user.user_id) {
        Ok(true) => HttpResponse::Ok().json(ApiResponse::success(vinyl)),
        Ok(false) => {
            HttpResponse::Forbidden().json(ApiResponse::<()>::error("This collection is private"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to check visibility: {}", e))),
    }
}

fn vinyl_visible(store: &Store, vinyl: &Vinyl, requester_id: &str) -> Result<bool, StoreError> {
    let owner = store.get_user(&vinyl.user_id)?;
    catalogue_visible(store, &owner, requester_id)
}

pub async fn create_vinyl(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<CreateVinylRequest>,
) -> impl Responder {
    if body.artist.trim().is_empty() || body.title.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Artist and title are required"));
    }
    if !VINYL_FORMATS.contains(&body.format.as_str()) {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error(format!("Invalid format: {}", body.format)));
    }

    let mut vinyl = Vinyl {
        id: String::new(),
        user_id: auth_user.user_id.clone(),
        artist: body.artist.trim().to_string(),
        title: body.title.trim().to_string(),
        year: body.year,
        barcode: body.barcode.clone(),
        format: body.format.clone(),
        cover_url: body.cover_url.clone(),
        notes: body.notes.clone(),
        gifted_by: body.gifted_by.clone(),
        shared_with: body.shared_with.clone(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.create_vinyl(&mut vinyl) {
        Ok(_) => HttpResponse::Created().json(ApiResponse::success(vinyl)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to create vinyl: {}", e))),
    }
}

pub async fn update_vinyl(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdateVinylRequest>,
) -> impl Responder {
    let id = path.into_inner();
    let mut vinyl = match state.store.get_vinyl(&id) {
        Ok(v) => v,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get vinyl: {}", e)));
        }
    };

    // Ownership masked as not-found so foreign ids are not probeable
    if vinyl.user_id != auth_user.user_id {
        return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
    }

    if let Some(ref format) = body.format {
        if !VINYL_FORMATS.contains(&format.as_str()) {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error(format!("Invalid format: {}", format)));
        }
        vinyl.format = format.clone();
    }
    if let Some(ref artist) = body.artist {
        vinyl.artist = artist.clone();
    }
    if let Some(ref title) = body.title {
        vinyl.title = title.clone();
    }
    if let Some(year) = body.year {
        vinyl.year = Some(year);
    }
    if let Some(ref barcode) = body.barcode {
        vinyl.barcode = Some(barcode.clone());
    }
    if let Some(ref cover_url) = body.cover_url {
        vinyl.cover_url = cover_url.clone();
    }
    if let Some(ref notes) = body.notes {
        vinyl.notes = notes.clone();
    }
    if let Some(ref gifted_by) = body.gifted_by {
        vinyl.gifted_by = Some(gifted_by.clone());
    }
    if let Some(ref shared_with) = body.shared_with {
        vinyl.shared_with = Some(shared_with.clone());
    }

    match state.store.update_vinyl(&mut vinyl) {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::success(vinyl)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to update vinyl: {}", e))),
    }
}

pub async fn delete_vinyl(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    match state.store.get_vinyl(&id) {
        Ok(vinyl) => {
            if vinyl.user_id != auth_user.user_id {
                return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
            }
        }
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get vinyl: {}", e)));
        }
    }

    match state.store.delete_vinyl(&id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete vinyl: {}", e))),
    }
}

pub async fn list_user_vinyls(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let owner_id = path.into_inner();
    let owner = match state.store.get_user(&owner_id) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get user: {}", e)));
        }
    };

    match catalogue_visible(&state.store, &owner, &auth_user.user_id) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("This collection is private"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check visibility: {}", e)));
        }
    }

    let limit = query.limit.unwrap_or(50).min(100);
    let offset = query.offset.unwrap_or(0).max(0);

    match state.store.list_vinyls(&owner.id, limit, offset) {
        Ok(vinyls) => HttpResponse::Ok().json(ApiResponse::success(vinyls)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list vinyls: {}", e))),
    }
}

// ==================== Follower Endpoints ====================

pub async fn follow_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let target_id = path.into_inner();

    if target_id == auth_user.user_id {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error("Cannot follow yourself"));
    }

    let target = match state.store.get_user(&target_id) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get user: {}", e)));
        }
    };

    // An edge in either state blocks a new request
    match state.store.get_follow(&auth_user.user_id, &target_id) {
        Ok(_) => {
            return HttpResponse::Conflict()
                .json(ApiResponse::<()>::error("Follow request already exists"));
        }
        Err(StoreError::NotFound(_)) => {}
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check follow: {}", e)));
        }
    }

    let status = if target.is_public {
        FollowStatus::Accepted
    } else {
        FollowStatus::Pending
    };

    let mut follow = Follow {
        id: String::new(),
        follower_id: auth_user.user_id.clone(),
        following_id: target_id.clone(),
        status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.create_follow(&mut follow) {
        Ok(_) => {}
        Err(StoreError::Conflict(_)) => {
            return HttpResponse::Conflict()
                .json(ApiResponse::<()>::error("Follow request already exists"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to create follow: {}", e)));
        }
    }

    let kind = match status {
        FollowStatus::Accepted => NotificationKind::NewFollower,
        FollowStatus::Pending => NotificationKind::FollowRequest,
    };
    state
        .notifier
        .dispatch(&target_id, &auth_user.user_id, kind, Some(auth_user.user_id.clone()))
        .await;

    HttpResponse::Created().json(ApiResponse::success(follow))
}

pub async fn accept_follow(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let follower_id = path.into_inner();

    // Scoped by the authenticated id; zero rows affected is a silent no-op
    match state.store.accept_follow(&follower_id, &auth_user.user_id) {
        Ok(rows) => {
            if rows > 0 {
                state
                    .notifier
                    .dispatch(
                        &follower_id,
                        &auth_user.user_id,
                        NotificationKind::FollowAccepted,
                        Some(auth_user.user_id.clone()),
                    )
                    .await;
            }
            HttpResponse::Ok()
                .json(ApiResponse::success(serde_json::json!({ "accepted": rows > 0 })))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to accept follow: {}", e))),
    }
}

pub async fn reject_follow(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let follower_id = path.into_inner();

    match state.store.delete_follow(&follower_id, &auth_user.user_id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to reject follow: {}", e))),
    }
}

pub async fn unfollow_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let target_id = path.into_inner();

    match state.store.delete_follow(&auth_user.user_id, &target_id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to unfollow: {}", e))),
    }
}

pub async fn is_following(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let other_id = path.into_inner();

    let status = match state.store.get_follow(&auth_user.user_id, &other_id) {
        Ok(follow) => follow.status.as_str().to_string(),
        Err(StoreError::NotFound(_)) => "none".to_string(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check follow: {}", e)));
        }
    };

    let followed_by = match state.store.is_following_accepted(&other_id, &auth_user.user_id) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check follow: {}", e)));
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(FollowStatusResponse { status, followed_by }))
}

pub async fn pending_requests(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.list_pending_requests(&auth_user.user_id) {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list requests: {}", e))),
    }
}

pub async fn list_followers(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let owner_id = path.into_inner();
    match follow_listing(&state.store, &owner_id, &auth_user.user_id, true) {
        Ok(response) => response,
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list followers: {}", e))),
    }
}

pub async fn list_following(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let owner_id = path.into_inner();
    match follow_listing(&state.store, &owner_id, &auth_user.user_id, false) {
        Ok(response) => response,
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list following: {}", e))),
    }
}

fn follow_listing(
    store: &Store,
    owner_id: &str,
    requester_id: &str,
    followers: bool,
) -> Result<HttpResponse, StoreError> {
    let owner = match store.get_user(owner_id) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found")));
        }
        Err(e) => return Err(e),
    };

    if !catalogue_visible(store, &owner, requester_id)? {
        return Ok(
            HttpResponse::Forbidden().json(ApiResponse::<()>::error("This profile is private"))
        );
    }

    let users = if followers {
        store.list_followers(owner_id)?
    } else {
        store.list_following(owner_id)?
    };
    Ok(HttpResponse::Ok().json(ApiResponse::success(users)))
}

pub async fn recent_feed(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(20).clamp(1, 50);
    let offset = query.offset.unwrap_or(0).max(0);

    let data = match state.store.recent_feed(&auth_user.user_id, limit, offset) {
        Ok(items) => items,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to load feed: {}", e)));
        }
    };

    let total = match state.store.count_feed(&auth_user.user_id) {
        Ok(count) => count,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to load feed: {}", e)));
        }
    };

    let has_more = offset + (data.len() as i64) < total;

    HttpResponse::Ok().json(ApiResponse::success(FeedResponse { data, has_more, total }))
}

// ==================== Interaction Endpoints ====================

pub async fn toggle_like(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let vinyl_id = path.into_inner();

    let vinyl = match state.store.get_vinyl(&vinyl_id) {
        Ok(v) => v,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get vinyl: {}", e)));
        }
    };

    match vinyl_visible(&state.store, &vinyl, &auth_user.user_id) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("This collection is private"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check visibility: {}", e)));
        }
    }

    let already_liked = match state.store.has_liked(&auth_user.user_id, &vinyl.id) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check like: {}", e)));
        }
    };

    let liked = if already_liked {
        match state.store.delete_like(&auth_user.user_id, &vinyl.id) {
            Ok(_) => false,
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error(format!("Failed to remove like: {}", e)));
            }
        }
    } else {
        let mut like = Like {
            id: String::new(),
            user_id: auth_user.user_id.clone(),
            vinyl_id: vinyl.id.clone(),
            created_at: Utc::now(),
        };
        match state.store.create_like(&mut like) {
            Ok(_) => {}
            Err(StoreError::Conflict(_)) => {
                return HttpResponse::Conflict().json(ApiResponse::<()>::error("Already liked"));
            }
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error(format!("Failed to create like: {}", e)));
            }
        }

        state
            .notifier
            .dispatch(
                &vinyl.user_id,
                &auth_user.user_id,
                NotificationKind::VinylLike,
                Some(vinyl.id.clone()),
            )
            .await;
        true
    };

    let like_count = state.store.count_likes(&vinyl.id).unwrap_or(0);

    HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "liked": liked,
        "like_count": like_count
    })))
}

pub async fn list_comments(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let vinyl_id = path.into_inner();

    let vinyl = match state.store.get_vinyl(&vinyl_id) {
        Ok(v) => v,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get vinyl: {}", e)));
        }
    };

    match vinyl_visible(&state.store, &vinyl, &auth_user.user_id) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("This collection is private"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check visibility: {}", e)));
        }
    }

    match state.store.list_comments(&vinyl.id, &auth_user.user_id) {
        Ok(comments) => HttpResponse::Ok().json(ApiResponse::success(comments)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list comments: {}", e))),
    }
}

pub async fn add_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<AddCommentRequest>,
) -> impl Responder {
    let vinyl_id = path.into_inner();
    let content = body.content.trim().to_string();

    if content.is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Comment content is required"));
    }

    let vinyl = match state.store.get_vinyl(&vinyl_id) {
        Ok(v) => v,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Vinyl not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get vinyl: {}", e)));
        }
    };

    match vinyl_visible(&state.store, &vinyl, &auth_user.user_id) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("This collection is private"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check visibility: {}", e)));
        }
    }

    // One level of threading: the parent must be a comment on the same vinyl
    if let Some(ref parent_id) = body.parent_id {
        match state.store.get_comment(parent_id) {
            Ok(parent) if parent.vinyl_id == vinyl.id => {}
            Ok(_) | Err(StoreError::NotFound(_)) => {
                return HttpResponse::BadRequest()
                    .json(ApiResponse::<()>::error("Invalid parent comment"));
            }
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error(format!("Failed to check parent: {}", e)));
            }
        }
    }

    let author = match state.store.get_user(&auth_user.user_id) {
        Ok(u) => u,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get user: {}", e)));
        }
    };

    let mut comment = Comment {
        id: String::new(),
        vinyl_id: vinyl.id.clone(),
        user_id: auth_user.user_id.clone(),
        parent_id: body.parent_id.clone(),
        content,
        created_at: Utc::now(),
    };

    if let Err(e) = state.store.create_comment(&mut comment) {
        return HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to create comment: {}", e)));
    }

    state
        .notifier
        .dispatch(
            &vinyl.user_id,
            &auth_user.user_id,
            NotificationKind::VinylComment,
            Some(vinyl.id.clone()),
        )
        .await;

    HttpResponse::Created().json(ApiResponse::success(CommentView {
        id: comment.id,
        vinyl_id: comment.vinyl_id,
        user_id: comment.user_id,
        parent_id: comment.parent_id,
        content: comment.content,
        username: author.username,
        display_name: author.display_name,
        avatar_url: author.avatar_url,
        like_count: 0,
        has_liked: false,
        created_at: comment.created_at,
    }))
}

pub async fn delete_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    let comment = match state.store.get_comment(&id) {
        Ok(c) => c,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Comment not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get comment: {}", e)));
        }
    };

    // Only the author may delete; the vinyl owner gets no override here
    if comment.user_id != auth_user.user_id {
        return HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Cannot delete another user's comment"));
    }

    match state.store.delete_comment(&id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete comment: {}", e))),
    }
}

pub async fn toggle_comment_like(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let comment_id = path.into_inner();

    let comment = match state.store.get_comment(&comment_id) {
        Ok(c) => c,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Comment not found"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get comment: {}", e)));
        }
    };

    // Resolve the parent vinyl for visibility and the notification deep link
    let vinyl = match state.store.get_vinyl(&comment.vinyl_id) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get vinyl: {}", e)));
        }
    };

    match vinyl_visible(&state.store, &vinyl, &auth_user.user_id) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("This collection is private"));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check visibility: {}", e)));
        }
    }

    let already_liked = match state.store.has_liked_comment(&auth_user.user_id, &comment.id) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to check like: {}", e)));
        }
    };

    let liked = if already_liked {
        match state.store.delete_comment_like(&auth_user.user_id, &comment.id) {
            Ok(_) => false,
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error(format!("Failed to remove like: {}", e)));
            }
        }
    } else {
        let mut like = CommentLike {
            id: String::new(),
            user_id: auth_user.user_id.clone(),
            comment_id: comment.id.clone(),
            created_at: Utc::now(),
        };
        match state.store.create_comment_like(&mut like) {
            Ok(_) => {}
            Err(StoreError::Conflict(_)) => {
                return HttpResponse::Conflict().json(ApiResponse::<()>::error("Already liked"));
            }
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error(format!("Failed to create like: {}", e)));
            }
        }

        // The comment author gets the notification, not the vinyl owner
        state
            .notifier
            .dispatch(
                &comment.user_id,
                &auth_user.user_id,
                NotificationKind::CommentLike,
                Some(vinyl.id.clone()),
            )
            .await;
        true
    };

    let like_count = state.store.count_comment_likes(&comment.id).unwrap_or(0);

    HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "liked": liked,
        "like_count": like_count
    })))
}

// ==================== Notification Endpoints ====================

pub async fn list_notifications(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(50).min(100);
    let offset = query.offset.unwrap_or(0).max(0);

    let notifications = match state.store.list_notifications(&auth_user.user_id, limit, offset) {
        Ok(n) => n,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to list notifications: {}", e)));
        }
    };

    let total = state.store.count_notifications(&auth_user.user_id).unwrap_or(0);
    let unread = state
        .store
        .count_unread_notifications(&auth_user.user_id)
        .unwrap_or(0);

    HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "notifications": notifications,
        "total": total,
        "unread": unread
    })))
}

pub async fn unread_count(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.count_unread_notifications(&auth_user.user_id) {
        Ok(count) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "count": count })))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to count notifications: {}", e))),
    }
}

pub async fn mark_notification_read(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    match state.store.mark_notification_read(&id, &auth_user.user_id) {
        Ok(0) => HttpResponse::NotFound().json(ApiResponse::<()>::error("Notification not found")),
        Ok(_) => HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "read": true }))),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to mark read: {}", e))),
    }
}

pub async fn mark_all_notifications_read(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> impl Responder {
    match state.store.mark_all_notifications_read(&auth_user.user_id) {
        Ok(rows) => HttpResponse::Ok()
            .json(ApiResponse::success(serde_json::json!({ "marked_read": rows }))),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to mark read: {}", e))),
    }
}

pub async fn delete_notification(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    match state.store.delete_notification(&id, &auth_user.user_id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Notification not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete notification: {}", e))),
    }
}

pub async fn subscribe_push(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<SubscribeRequest>,
) -> impl Responder {
    if body.endpoint.trim().is_empty()
        || body.keys.p256dh.trim().is_empty()
        || body.keys.auth.trim().is_empty()
    {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Endpoint and keys are required"));
    }

    let mut sub = PushSubscription {
        id: String::new(),
        user_id: auth_user.user_id.clone(),
        endpoint: body.endpoint.clone(),
        p256dh: body.keys.p256dh.clone(),
        auth: body.keys.auth.clone(),
        created_at: Utc::now(),
    };

    match state.store.upsert_push_subscription(&mut sub) {
        Ok(_) => HttpResponse::Created().json(ApiResponse::success(sub)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to subscribe: {}", e))),
    }
}

// ==================== Lookup Endpoint ====================

pub async fn lookup_barcode(
    state: web::Data<AppState>,
    _auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let barcode = path.into_inner();
    if barcode.trim().is_empty() {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error("Barcode is required"));
    }

    match state.lookup.lookup_barcode(barcode.trim()).await {
        Ok(Some(result)) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Ok(None) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("No release found for barcode"))
        }
        Err(e) => {
            log::error!("Barcode lookup failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Lookup failed"))
        }
    }
}

// ==================== Realtime Endpoint ====================

#[derive(Deserialize)]
pub struct RealtimeQuery {
    token: String,
}

pub async fn realtime_entry(
    state: web::Data<AppState>,
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<RealtimeQuery>,
) -> actix_web::Result<HttpResponse> {
    let user_id = user_id_from_token(&state.auth_service, &query.token)?;

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    actix_web::rt::spawn(realtime::run_session(
        state.realtime.clone(),
        user_id,
        session,
        msg_stream,
    ));

    Ok(response)
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))

        // Auth routes (no auth required)
        .route("/api/auth/register", web::post().to(register))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/me", web::get().to(get_current_user))

        // Users
        .route("/api/users/me", web::put().to(update_profile))
        .route("/api/users/search", web::get().to(search_users))
        .route("/api/users/{id}", web::get().to(get_profile))
        .route("/api/users/{id}/vinyls", web::get().to(list_user_vinyls))
        .route("/api/users/{id}/followers", web::get().to(list_followers))
        .route("/api/users/{id}/following", web::get().to(list_following))

        // Vinyls
        .route("/api/vinyls", web::get().to(list_vinyls))
        .route("/api/vinyls", web::post().to(create_vinyl))
        .route("/api/vinyls/{id}", web::get().to(get_vinyl))
        .route("/api/vinyls/{id}", web::put().to(update_vinyl))
        .route("/api/vinyls/{id}", web::delete().to(delete_vinyl))

        // Followers
        .route("/api/followers/follow/{id}", web::post().to(follow_user))
        .route("/api/followers/accept/{id}", web::post().to(accept_follow))
        .route("/api/followers/reject/{id}", web::post().to(reject_follow))
        .route("/api/followers/unfollow/{id}", web::delete().to(unfollow_user))
        .route("/api/followers/is-following/{id}", web::get().to(is_following))
        .route("/api/followers/pending", web::get().to(pending_requests))
        .route("/api/followers/feed/recent", web::get().to(recent_feed))

        // Interactions
        .route("/api/interactions/likes/{id}", web::post().to(toggle_like))
        .route("/api/interactions/comments/{id}", web::get().to(list_comments))
        .route("/api/interactions/comments/{id}", web::post().to(add_comment))
        .route("/api/interactions/comments/{id}", web::delete().to(delete_comment))
        .route("/api/interactions/comments/{id}/like", web::post().to(toggle_comment_like))

        // Notifications
        .route("/api/notifications", web::get().to(list_notifications))
        .route("/api/notifications/unread-count", web::get().to(unread_count))
        .route("/api/notifications/read-all", web::put().to(mark_all_notifications_read))
        .route("/api/notifications/subscribe", web::post().to(subscribe_push))
        .route("/api/notifications/{id}/read", web::put().to(mark_notification_read))
        .route("/api/notifications/{id}", web::delete().to(delete_notification))

        // Barcode lookup
        .route("/api/lookup/barcode/{code}", web::get().to(lookup_barcode))

        // Realtime channel
        .route("/api/realtime", web::get().to(realtime_entry));
}
