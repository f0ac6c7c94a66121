use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{Pagination, empty_as_none};

/// Role
///
/// The RBAC ladder. Variants are declared lowest first so that `Ord` gives the
/// hierarchy `Reader < Author < Editor < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Reader,
    Author,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Author => "author",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    /// True when this role sits at or above `required` in the hierarchy.
    pub fn at_least(self, required: Role) -> bool {
        self >= required
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "reader" => Ok(Role::Reader),
            "author" => Ok(Role::Author),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// User
///
/// Canonical identity record from the `users` table. The password hash never leaves
/// the process.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    #[schema(ignore)]
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub asgardeo_user_id: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// UserProfile
///
/// Optional extension row from `user_profiles`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct UserProfile {
    pub website: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub social_links: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<serde_json::Value>,
}

/// ProfileView
///
/// A user together with their profile extension, returned by `GET /api/users/profile`.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileView {
    #[serde(flatten)]
    pub user: User,
    #[serde(flatten)]
    pub profile: UserProfile,
}

/// AuthUserView
///
/// The compact, camelCase user object embedded in auth responses.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthUserView {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
}

impl From<&User> for AuthUserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            avatar_url: user.avatar_url.clone(),
            email_verified: user.email_verified,
        }
    }
}

/// NewUser
///
/// Insert payload shared by registration, SSO provisioning and admin seeding.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub asgardeo_user_id: Option<String>,
}

// --- Request Payloads ---

/// RegisterRequest
///
/// Input payload for `POST /api/auth/register`. New accounts always get the `reader`
/// role. Missing fields surface as validation errors rather than parse errors.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 3, max = 30, message = "Username must be 3-30 characters"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// AsgardeoLoginRequest
///
/// Carries the ID token issued by the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AsgardeoLoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "ID token is required"))]
    pub id_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

/// UpdateProfileRequest
///
/// Self-service profile edit. Empty strings clear the optional URL fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub last_name: String,
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(url(message = "Invalid website URL"))]
    pub website: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub social_links: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<serde_json::Value>,
}

/// UpdateUserRequest
///
/// Editor/admin edit of another account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
}

/// UserListQuery
///
/// Query parameters accepted by `GET /api/users`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<Role>,
    /// Matches email, username, first or last name.
    pub search: Option<String>,
}

// --- Response Envelopes ---

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub message: String,
    pub user: AuthUserView,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileResponse {
    pub user: ProfileView,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct UsersResponse {
    pub users: Vec<User>,
    pub pagination: Pagination,
}
