//! Persistence contracts and their Postgres implementation.
//!
//! Each service owns one async trait; `Repository` bundles them so the application
//! state can hold a single `Arc<dyn Repository>`. Handlers only see the traits, which
//! lets tests swap in an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RepoError;
use crate::models::{
    BlogSettings, Category, Comment, CommentFilter, CommentStatus, CommentView, CreateCategoryRequest,
    CreateTagRequest, Liker, MediaFile, MediaFilter, MediaStats, MediaThumbnail, ModerationAction,
    ModerationRecord, NewComment, NewMediaFile, NewPost, NewThumbnail, NewUser, Page, Post,
    PostChanges, PostFilter, PostStatusChange, PostSummary, PostVersion, ProfileView, Role, Tag,
    TaxonomyFilter, UpdateCategoryRequest, UpdateMediaRequest, UpdateProfileRequest,
    UpdateTagRequest, UpdateUserRequest, User,
};

mod comments;
mod media;
mod posts;
mod settings;
mod taxonomy;
mod users;

pub type RepoResult<T> = Result<T, RepoError>;

/// UserRepository
///
/// Accounts, profile extensions and login sessions.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_asgardeo_id(&self, subject: &str) -> RepoResult<Option<User>>;
    /// True when either the email or the username is already registered.
    async fn user_exists(&self, email: &str, username: &str) -> RepoResult<bool>;
    async fn username_taken(&self, username: &str) -> RepoResult<bool>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    /// Attaches an SSO subject to an existing account and marks its email verified.
    async fn link_asgardeo_account(&self, id: Uuid, subject: &str) -> RepoResult<User>;
    async fn list_users(
        &self,
        role: Option<Role>,
        search: Option<String>,
        page: Page,
    ) -> RepoResult<(Vec<User>, i64)>;
    async fn get_profile(&self, user_id: Uuid) -> RepoResult<Option<ProfileView>>;
    async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> RepoResult<Option<ProfileView>>;
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()>;
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;

    async fn create_session(
        &self,
        user_id: Uuid,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()>;
    /// True while the session exists and has not expired.
    async fn session_active(&self, token_id: Uuid) -> RepoResult<bool>;
    async fn delete_sessions(&self, user_id: Uuid) -> RepoResult<u64>;
}

/// PostRepository
///
/// Posts, their taxonomy links and version history. Every multi-statement write runs
/// in a single transaction.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn list_posts(&self, filter: PostFilter, page: Page) -> RepoResult<(Vec<PostSummary>, i64)>;
    async fn get_post(&self, id: Uuid) -> RepoResult<Option<PostSummary>>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<PostSummary>>;
    /// True when `slug` belongs to a post other than `exclude`.
    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> RepoResult<bool>;
    /// Inserts the post, links its taxonomy and records version 1.
    async fn create_post(
        &self,
        post: NewPost,
        category_ids: Vec<Uuid>,
        tag_ids: Vec<Uuid>,
    ) -> RepoResult<Post>;
    /// Applies a partial update. A new version is recorded when the update touches
    /// title, content or excerpt. Taxonomy sets, when given, replace the existing links.
    async fn update_post(
        &self,
        id: Uuid,
        changes: PostChanges,
        category_ids: Option<Vec<Uuid>>,
        tag_ids: Option<Vec<Uuid>>,
        editor: Uuid,
    ) -> RepoResult<Option<Post>>;
    async fn delete_post(&self, id: Uuid) -> RepoResult<bool>;
    async fn set_post_status(&self, id: Uuid, change: PostStatusChange) -> RepoResult<Option<Post>>;
    async fn list_drafts(&self, author_id: Uuid) -> RepoResult<Vec<Post>>;

    async fn list_versions(&self, post_id: Uuid) -> RepoResult<Vec<PostVersion>>;
    async fn get_version(&self, post_id: Uuid, number: i32) -> RepoResult<Option<PostVersion>>;
    /// Snapshots the post's current title/content/excerpt as the next version.
    async fn create_version(&self, post_id: Uuid, created_by: Uuid) -> RepoResult<Option<PostVersion>>;
    /// Copies version `number` back into the post and records it as a new version.
    async fn restore_version(
        &self,
        post_id: Uuid,
        number: i32,
        restored_by: Uuid,
    ) -> RepoResult<Option<Post>>;

    async fn list_due_posts(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>>;
    /// Publishes every scheduled post whose time has come, in one statement.
    async fn publish_due_posts(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>>;
}

/// TaxonomyRepository
///
/// Categories and tags with their post counts.
#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    async fn list_categories(&self, filter: TaxonomyFilter) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>>;
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>>;
    async fn create_category(&self, req: CreateCategoryRequest, slug: String) -> RepoResult<Category>;
    async fn update_category(
        &self,
        id: Uuid,
        req: UpdateCategoryRequest,
    ) -> RepoResult<Option<Category>>;
    async fn delete_category(&self, id: Uuid) -> RepoResult<bool>;

    async fn list_tags(&self, filter: TaxonomyFilter) -> RepoResult<Vec<Tag>>;
    async fn get_tag(&self, id: Uuid) -> RepoResult<Option<Tag>>;
    async fn get_tag_by_slug(&self, slug: &str) -> RepoResult<Option<Tag>>;
    async fn create_tag(&self, req: CreateTagRequest, slug: String) -> RepoResult<Tag>;
    async fn update_tag(&self, id: Uuid, req: UpdateTagRequest) -> RepoResult<Option<Tag>>;
    async fn delete_tag(&self, id: Uuid) -> RepoResult<bool>;

    async fn categories_for_post(&self, post_id: Uuid) -> RepoResult<Vec<Category>>;
    async fn tags_for_post(&self, post_id: Uuid) -> RepoResult<Vec<Tag>>;
}

/// CommentRepository
///
/// Threaded comments, likes and the moderation log. `liker` identifies the caller so
/// that views can report `is_liked`.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn list_comments(
        &self,
        filter: CommentFilter,
        liker: Option<Liker>,
        page: Page,
    ) -> RepoResult<(Vec<CommentView>, i64)>;
    async fn get_comment(&self, id: Uuid, liker: Option<Liker>) -> RepoResult<Option<CommentView>>;
    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: Uuid, content: String) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool>;
    async fn set_comment_status(&self, id: Uuid, status: CommentStatus) -> RepoResult<Option<Comment>>;
    async fn like_count(&self, id: Uuid) -> RepoResult<i64>;
    /// Adds the like when absent, removes it when present. Returns the new liked state.
    async fn toggle_like(&self, id: Uuid, liker: Liker) -> RepoResult<bool>;
    async fn record_moderation(
        &self,
        comment_id: Uuid,
        moderator_id: Uuid,
        action: ModerationAction,
        reason: Option<String>,
    ) -> RepoResult<()>;
    async fn moderation_history(&self, comment_id: Uuid) -> RepoResult<Vec<ModerationRecord>>;
}

/// MediaRepository
///
/// Metadata of stored objects; the bytes themselves live behind `StorageService`.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn list_media(&self, filter: MediaFilter, page: Page) -> RepoResult<(Vec<MediaFile>, i64)>;
    async fn get_media(&self, id: Uuid) -> RepoResult<Option<MediaFile>>;
    async fn create_media(&self, file: NewMediaFile) -> RepoResult<MediaFile>;
    async fn update_media(&self, id: Uuid, req: UpdateMediaRequest) -> RepoResult<Option<MediaFile>>;
    async fn delete_media(&self, id: Uuid) -> RepoResult<bool>;
    async fn media_stats(&self) -> RepoResult<MediaStats>;
    async fn list_thumbnails(&self, media_id: Uuid) -> RepoResult<Vec<MediaThumbnail>>;
    /// Replaces all thumbnails of a file with the given set.
    async fn replace_thumbnails(
        &self,
        media_id: Uuid,
        thumbnails: Vec<NewThumbnail>,
    ) -> RepoResult<Vec<MediaThumbnail>>;
}

/// SettingsRepository
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Returns the settings row, inserting the defaults first when it is missing.
    async fn get_settings(&self) -> RepoResult<BlogSettings>;
    async fn update_settings(
        &self,
        title: String,
        description: Option<String>,
        updated_by: Uuid,
    ) -> RepoResult<BlogSettings>;
}

/// Repository
///
/// The union of every service contract. Implemented automatically for any type that
/// implements all of them.
pub trait Repository:
    UserRepository
    + PostRepository
    + TaxonomyRepository
    + CommentRepository
    + MediaRepository
    + SettingsRepository
{
}

impl<T> Repository for T where
    T: UserRepository
        + PostRepository
        + TaxonomyRepository
        + CommentRepository
        + MediaRepository
        + SettingsRepository
{
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of every repository trait, backed by one `PgPool`.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Escapes `%`, `_` and `\` so user input is matched literally inside `ILIKE`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern(" 100%_off "), "%100\\%\\_off%");
    }
}
