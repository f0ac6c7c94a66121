use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{Category, Pagination, Tag, empty_as_none};

/// PostStatus
///
/// Publication state of a post. See `lifecycle` for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Scheduled,
    Archived,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Archived => "archived",
        }
    }
}

impl TryFrom<String> for PostStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "scheduled" => Ok(PostStatus::Scheduled),
            "archived" => Ok(PostStatus::Archived),
            other => Err(format!("unknown post status '{other}'")),
        }
    }
}

/// Post
///
/// A row of the `posts` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub featured_image_url: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: PostStatus,
    #[ts(type = "string | null")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// PostSummary
///
/// A post joined with its author's display fields, as returned by listings.
#[derive(Debug, Clone, Serialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct PostSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub post: Post,
    pub author_username: Option<String>,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
}

/// PostDetail
///
/// A single post with its author and taxonomy, returned by the detail endpoints.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct PostDetail {
    #[serde(flatten)]
    pub summary: PostSummary,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

/// PostVersion
///
/// An immutable content snapshot from `post_versions`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct PostVersion {
    pub id: Uuid,
    pub post_id: Uuid,
    pub version_number: i32,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub created_by: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// NewPost
///
/// Insert payload assembled by the create and draft handlers once the slug is resolved.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub featured_image_url: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

/// PostChanges
///
/// Partial update applied by `PUT /api/posts/{id}`; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub featured_image_url: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

impl PostChanges {
    /// True when applying the update to `current` alters a field captured by version
    /// snapshots. Resending an unchanged value does not count.
    pub fn changes_content(&self, current: &Post) -> bool {
        self.title.as_ref().is_some_and(|title| *title != current.title)
            || self.content.as_ref().is_some_and(|content| *content != current.content)
            || self
                .excerpt
                .as_ref()
                .is_some_and(|excerpt| current.excerpt.as_ref() != Some(excerpt))
    }
}

/// PostStatusChange
///
/// The columns rewritten by a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostStatusChange {
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

// --- Request Payloads ---

/// CreatePostRequest
///
/// Input payload for `POST /api/posts`. `status` defaults to draft; `scheduled`
/// requires `scheduledAt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreatePostRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(url(message = "Invalid featured image URL"))]
    pub featured_image_url: Option<String>,
    #[validate(length(max = 255))]
    pub meta_title: Option<String>,
    #[validate(length(max = 500))]
    pub meta_description: Option<String>,
    pub status: Option<PostStatus>,
    #[ts(type = "string | null")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

/// UpdatePostRequest
///
/// Partial update. `categoryIds` / `tagIds`, when present, replace the full set. A
/// `status` runs the matching lifecycle transition after the edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: Option<String>,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[validate(url(message = "Invalid featured image URL"))]
    pub featured_image_url: Option<String>,
    #[validate(length(max = 255))]
    pub meta_title: Option<String>,
    #[validate(length(max = 500))]
    pub meta_description: Option<String>,
    pub status: Option<PostStatus>,
    /// Required with `status: "scheduled"`.
    #[ts(type = "string | null")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub category_ids: Option<Vec<Uuid>>,
    pub tag_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ScheduleRequest {
    #[ts(type = "string")]
    pub scheduled_at: DateTime<Utc>,
}

/// SaveDraftRequest
///
/// Autosave payload for `POST /api/posts/drafts`. Without `postId` a new draft is
/// created; with it the existing draft is overwritten.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaveDraftRequest {
    pub post_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
}

/// PostListQuery
///
/// Query parameters accepted by `GET /api/posts`. `category` and `tag` take slugs.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<PostStatus>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub author: Option<Uuid>,
    /// One of `created_at`, `updated_at`, `published_at`, `title`.
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

/// PostFilter
///
/// Repository-level filter resolved from `PostListQuery` and the caller's identity.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub search: Option<String>,
    pub category_slug: Option<String>,
    pub tag_slug: Option<String>,
    pub category_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    /// When set, non-published posts are only listed if authored by this user.
    pub visible_to: Option<Uuid>,
    /// Restrict to published posts regardless of `status`.
    pub published_only: bool,
    pub sort_by: PostSort,
    pub sort_order: super::SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    PublishedAt,
    Title,
}

impl PostSort {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("updated_at") | Some("updatedAt") => PostSort::UpdatedAt,
            Some("published_at") | Some("publishedAt") => PostSort::PublishedAt,
            Some("title") => PostSort::Title,
            _ => PostSort::CreatedAt,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            PostSort::CreatedAt => "p.created_at",
            PostSort::UpdatedAt => "p.updated_at",
            PostSort::PublishedAt => "p.published_at",
            PostSort::Title => "p.title",
        }
    }
}

// --- Response Envelopes ---

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct PostResponse {
    pub post: PostDetail,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct PostsResponse {
    pub posts: Vec<PostSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct DraftsResponse {
    pub drafts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DraftSavedResponse {
    pub message: String,
    pub post_id: Uuid,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct VersionsResponse {
    pub versions: Vec<PostVersion>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct VersionResponse {
    pub version: PostVersion,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct RestoreResponse {
    pub message: String,
    pub post: Post,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ScheduledPostsResponse {
    pub scheduled_posts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct PublishDueResponse {
    pub message: String,
    pub count: usize,
    pub posts: Vec<Post>,
}
