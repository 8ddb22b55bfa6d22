use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User is an account that owns a record collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vinyl is a cataloged physical release (vinyl record or CD) owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vinyl {
    pub id: String,
    pub user_id: String,
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,
    pub barcode: Option<String>,
    pub format: String,
    pub cover_url: String,
    pub notes: String,
    /// Set when the release was a gift from another user.
    pub gifted_by: Option<String>,
    /// Set when the release is co-owned with another user.
    pub shared_with: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Accepted release formats.
pub const VINYL_FORMATS: &[&str] = &["vinyl", "cd"];

/// Follow is a directed edge from follower to followed account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    pub status: FollowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FollowStatus {
    Pending,
    Accepted,
}

impl FollowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowStatus::Pending => "pending",
            FollowStatus::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FollowStatus::Pending),
            "accepted" => Some(FollowStatus::Accepted),
            _ => None,
        }
    }
}

/// Like is a toggle: the row's existence is the liked state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub vinyl_id: String,
    pub created_at: DateTime<Utc>,
}

/// Comment belongs to a vinyl; parent_id gives one level of threading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub vinyl_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Comment joined with author display fields and the caller's like state.
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: String,
    pub vinyl_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub like_count: i64,
    pub has_liked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentLike {
    pub id: String,
    pub user_id: String,
    pub comment_id: String,
    pub created_at: DateTime<Utc>,
}

/// Closed set of notification types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    FollowRequest,
    NewFollower,
    FollowAccepted,
    VinylLike,
    VinylComment,
    CommentLike,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FollowRequest => "FOLLOW_REQUEST",
            NotificationKind::NewFollower => "NEW_FOLLOWER",
            NotificationKind::FollowAccepted => "FOLLOW_ACCEPTED",
            NotificationKind::VinylLike => "VINYL_LIKE",
            NotificationKind::VinylComment => "VINYL_COMMENT",
            NotificationKind::CommentLike => "COMMENT_LIKE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FOLLOW_REQUEST" => Some(NotificationKind::FollowRequest),
            "NEW_FOLLOWER" => Some(NotificationKind::NewFollower),
            "FOLLOW_ACCEPTED" => Some(NotificationKind::FollowAccepted),
            "VINYL_LIKE" => Some(NotificationKind::VinylLike),
            "VINYL_COMMENT" => Some(NotificationKind::VinylComment),
            "COMMENT_LIKE" => Some(NotificationKind::CommentLike),
            _ => None,
        }
    }
}

/// Notification row. reference_id points at a vinyl, comment, or user
/// depending on the kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub reference_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification joined with sender display fields for listing.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    pub id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub reference_id: Option<String>,
    pub is_read: bool,
    pub sender_username: String,
    pub sender_display_name: String,
    pub sender_avatar_url: String,
    pub created_at: DateTime<Utc>,
}

/// Browser push endpoint with its encryption keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub p256dh: String,
    #[serde(skip_serializing)]
    pub auth: String,
    pub created_at: DateTime<Utc>,
}

/// Payload delivered on both the push and realtime channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

/// Feed entry: a vinyl joined with owner display fields and counts.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub id: String,
    pub user_id: String,
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,
    pub format: String,
    pub cover_url: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub has_liked: bool,
    pub created_at: DateTime<Utc>,
}

/// Minimal user info for follower/search listings.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub is_public: bool,
}

/// Profile with stats; counts are omitted when the profile is not visible
/// to the requester.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: String,
    pub is_public: bool,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vinyl_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following_count: Option<i64>,
}

// Request/Response types for API

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVinylRequest {
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,
    pub barcode: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub notes: String,
    pub gifted_by: Option<String>,
    pub shared_with: Option<String>,
}

fn default_format() -> String {
    "vinyl".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateVinylRequest {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub barcode: Option<String>,
    pub format: Option<String>,
    pub cover_url: Option<String>,
    pub notes: Option<String>,
    pub gifted_by: Option<String>,
    pub shared_with: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub content: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscribeKeys,
}

#[derive(Debug, Serialize)]
pub struct FollowStatusResponse {
    /// "none", "pending", or "accepted".
    pub status: String,
    /// Whether the other account follows the caller (accepted only).
    pub followed_by: bool,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub data: Vec<FeedItem>,
    pub has_more: bool,
    pub total: i64,
}

/// Release metadata returned by the barcode lookup proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarcodeLookupResult {
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_kind_round_trip() {
        for kind in [
            NotificationKind::FollowRequest,
            NotificationKind::NewFollower,
            NotificationKind::FollowAccepted,
            NotificationKind::VinylLike,
            NotificationKind::VinylComment,
            NotificationKind::CommentLike,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::parse("SOMETHING_ELSE"), None);
    }

    #[test]
    fn test_follow_status_round_trip() {
        assert_eq!(FollowStatus::parse("pending"), Some(FollowStatus::Pending));
        assert_eq!(FollowStatus::parse("accepted"), Some(FollowStatus::Accepted));
        assert_eq!(FollowStatus::parse("blocked"), None);
    }

    #[test]
    fn test_user_never_serializes_password_hash() {
        let user = User {
            id: "u1".to_string(),
            username: "mara".to_string(),
            email: "mara@example.com".to_string(),
            password_hash: "hash_value".to_string(),
            display_name: "Mara".to_string(),
            bio: String::new(),
            avatar_url: String::new(),
            is_public: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("hash_value"));
        assert!(!json.contains("password_hash"));
    }
}
