#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use blog_cms::{
    AppConfig, AppState, MockStorageService, auth, create_router,
    error::RepoError,
    models::*,
    repository::{
        CommentRepository, MediaRepository, PostRepository, RepoResult, RepositoryState,
        SettingsRepository, TaxonomyRepository, UserRepository,
    },
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;
use uuid::Uuid;

// --- IN-MEMORY REPOSITORY ---

// Mirrors the Postgres implementation closely enough for handler tests: unique
// constraints surface as `RepoError::Conflict` and deletes cascade like the
// foreign keys in the migration.

#[derive(Default)]
struct Store {
    users: Vec<User>,
    profiles: HashMap<Uuid, UserProfile>,
    sessions: HashMap<Uuid, (Uuid, DateTime<Utc>)>,
    posts: Vec<Post>,
    post_categories: Vec<(Uuid, Uuid)>,
    post_tags: Vec<(Uuid, Uuid)>,
    versions: Vec<PostVersion>,
    categories: Vec<Category>,
    tags: Vec<Tag>,
    comments: Vec<Comment>,
    likes: Vec<(Uuid, Liker)>,
    moderation: Vec<ModerationRecord>,
    media: Vec<MediaFile>,
    thumbnails: Vec<MediaThumbnail>,
    settings: Option<BlogSettings>,
}

#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }

    /// Number of version snapshots recorded for a post.
    pub fn version_count(&self, post_id: Uuid) -> usize {
        self.store().versions.iter().filter(|v| v.post_id == post_id).count()
    }

    /// Forces a post into `scheduled` with a due time in the past.
    pub fn backdate_schedule(&self, post_id: Uuid, at: DateTime<Utc>) {
        let mut store = self.store();
        if let Some(post) = store.posts.iter_mut().find(|p| p.id == post_id) {
            post.status = PostStatus::Scheduled;
            post.scheduled_at = Some(at);
        }
    }

    pub fn session_count(&self, user_id: Uuid) -> usize {
        self.store().sessions.values().filter(|(owner, _)| *owner == user_id).count()
    }
}

fn ordered(ord: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    (items, total)
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle))
}

fn search_term(search: &Option<String>) -> Option<&str> {
    search.as_deref().filter(|s| !s.trim().is_empty())
}

impl Store {
    fn summary(&self, post: &Post) -> PostSummary {
        let author = self.users.iter().find(|u| u.id == post.author_id);
        PostSummary {
            post: post.clone(),
            author_username: author.map(|u| u.username.clone()),
            author_first_name: author.and_then(|u| u.first_name.clone()),
            author_last_name: author.and_then(|u| u.last_name.clone()),
        }
    }

    /// Mirrors the `categories.parent_id` foreign key.
    fn category_exists(&self, id: Option<Uuid>) -> bool {
        id.is_none_or(|id| self.categories.iter().any(|c| c.id == id))
    }

    fn category(&self, category: &Category) -> Category {
        let mut category = category.clone();
        category.post_count = self
            .post_categories
            .iter()
            .filter(|(_, id)| *id == category.id)
            .count() as i64;
        category
    }

    fn tag(&self, tag: &Tag) -> Tag {
        let mut tag = tag.clone();
        tag.post_count = self.post_tags.iter().filter(|(_, id)| *id == tag.id).count() as i64;
        tag
    }

    fn snapshot(&mut self, post_id: Uuid, created_by: Uuid) -> Option<PostVersion> {
        let post = self.posts.iter().find(|p| p.id == post_id)?.clone();
        let next = self
            .versions
            .iter()
            .filter(|v| v.post_id == post_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let version = PostVersion {
            id: Uuid::new_v4(),
            post_id,
            version_number: next,
            title: post.title,
            content: post.content,
            excerpt: post.excerpt,
            created_by: Some(created_by),
            created_at: Utc::now(),
        };
        self.versions.push(version.clone());
        Some(version)
    }

    fn replace_taxonomy(&mut self, post_id: Uuid, categories: Option<&[Uuid]>, tags: Option<&[Uuid]>) {
        if let Some(ids) = categories {
            self.post_categories.retain(|(post, _)| *post != post_id);
            for id in ids {
                if self.categories.iter().any(|c| c.id == *id) && !self.post_categories.contains(&(post_id, *id)) {
                    self.post_categories.push((post_id, *id));
                }
            }
        }
        if let Some(ids) = tags {
            self.post_tags.retain(|(post, _)| *post != post_id);
            for id in ids {
                if self.tags.iter().any(|t| t.id == *id) && !self.post_tags.contains(&(post_id, *id)) {
                    self.post_tags.push((post_id, *id));
                }
            }
        }
    }

    fn post_matches(&self, post: &Post, filter: &PostFilter) -> bool {
        if filter.published_only {
            if post.status != PostStatus::Published {
                return false;
            }
        } else if let Some(viewer) = filter.visible_to {
            if post.status != PostStatus::Published && post.author_id != viewer {
                return false;
            }
        }
        if filter.status.is_some_and(|status| status != post.status) {
            return false;
        }
        if filter.author_id.is_some_and(|author| author != post.author_id) {
            return false;
        }
        if let Some(term) = search_term(&filter.search) {
            let hit = contains_ci(Some(&post.title), term)
                || contains_ci(Some(&post.content), term)
                || contains_ci(post.excerpt.as_deref(), term);
            if !hit {
                return false;
            }
        }
        let in_category = |category_id: Uuid| self.post_categories.contains(&(post.id, category_id));
        let in_tag = |tag_id: Uuid| self.post_tags.contains(&(post.id, tag_id));
        if let Some(slug) = &filter.category_slug {
            let linked = self
                .categories
                .iter()
                .any(|c| &c.slug == slug && in_category(c.id));
            if !linked {
                return false;
            }
        }
        if filter.category_id.is_some_and(|id| !in_category(id)) {
            return false;
        }
        if let Some(slug) = &filter.tag_slug {
            if !self.tags.iter().any(|t| &t.slug == slug && in_tag(t.id)) {
                return false;
            }
        }
        if filter.tag_id.is_some_and(|id| !in_tag(id)) {
            return false;
        }
        true
    }

    fn comment_view(&self, comment: &Comment, liker: Option<&Liker>) -> CommentView {
        let likes: Vec<&Liker> = self
            .likes
            .iter()
            .filter(|(id, _)| *id == comment.id)
            .map(|(_, liker)| liker)
            .collect();
        CommentView {
            comment: comment.clone(),
            author_username: comment
                .author_id
                .and_then(|id| self.users.iter().find(|u| u.id == id))
                .map(|u| u.username.clone()),
            like_count: likes.len() as i64,
            is_liked: liker.is_some_and(|liker| likes.contains(&liker)),
        }
    }

    /// Removes a comment with its replies, likes and moderation records.
    fn remove_comment(&mut self, id: Uuid) -> bool {
        let Some(index) = self.comments.iter().position(|c| c.id == id) else {
            return false;
        };
        self.comments.remove(index);
        let replies: Vec<Uuid> = self
            .comments
            .iter()
            .filter(|c| c.parent_id == Some(id))
            .map(|c| c.id)
            .collect();
        for reply in replies {
            self.remove_comment(reply);
        }
        self.likes.retain(|(comment, _)| *comment != id);
        self.moderation.retain(|record| record.comment_id != id);
        true
    }

    fn remove_post(&mut self, id: Uuid) -> bool {
        let before = self.posts.len();
        self.posts.retain(|p| p.id != id);
        if self.posts.len() == before {
            return false;
        }
        self.post_categories.retain(|(post, _)| *post != id);
        self.post_tags.retain(|(post, _)| *post != id);
        self.versions.retain(|v| v.post_id != id);
        let comments: Vec<Uuid> = self
            .comments
            .iter()
            .filter(|c| c.post_id == id)
            .map(|c| c.id)
            .collect();
        for comment in comments {
            self.remove_comment(comment);
        }
        true
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.store().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.store().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_asgardeo_id(&self, subject: &str) -> RepoResult<Option<User>> {
        Ok(self
            .store()
            .users
            .iter()
            .find(|u| u.asgardeo_user_id.as_deref() == Some(subject))
            .cloned())
    }

    async fn user_exists(&self, email: &str, username: &str) -> RepoResult<bool> {
        Ok(self
            .store()
            .users
            .iter()
            .any(|u| u.email == email || u.username == username))
    }

    async fn username_taken(&self, username: &str) -> RepoResult<bool> {
        Ok(self.store().users.iter().any(|u| u.username == username))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.store();
        if store.users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::Conflict("users_email_key".into()));
        }
        if store.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict("users_username_key".into()));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            avatar_url: None,
            bio: None,
            is_active: true,
            email_verified: user.email_verified,
            asgardeo_user_id: user.asgardeo_user_id,
            created_at: now,
            updated_at: now,
        };
        store.users.push(created.clone());
        Ok(created)
    }

    async fn link_asgardeo_account(&self, id: Uuid, subject: &str) -> RepoResult<User> {
        let mut store = self.store();
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::NotFound)?;
        user.asgardeo_user_id = Some(subject.to_string());
        user.email_verified = true;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list_users(
        &self,
        role: Option<Role>,
        search: Option<String>,
        page: Page,
    ) -> RepoResult<(Vec<User>, i64)> {
        let store = self.store();
        let mut users: Vec<User> = store
            .users
            .iter()
            .filter(|u| role.is_none_or(|role| u.role == role))
            .filter(|u| match search_term(&search) {
                Some(term) => {
                    contains_ci(Some(&u.email), term)
                        || contains_ci(Some(&u.username), term)
                        || contains_ci(u.first_name.as_deref(), term)
                        || contains_ci(u.last_name.as_deref(), term)
                }
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(users, page))
    }

    async fn get_profile(&self, user_id: Uuid) -> RepoResult<Option<ProfileView>> {
        let store = self.store();
        Ok(store.users.iter().find(|u| u.id == user_id).map(|user| ProfileView {
            user: user.clone(),
            profile: store.profiles.get(&user_id).cloned().unwrap_or_default(),
        }))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> RepoResult<Option<ProfileView>> {
        let mut store = self.store();
        let Some(user) = store.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        user.first_name = Some(req.first_name);
        user.last_name = Some(req.last_name);
        user.bio = req.bio;
        user.avatar_url = req.avatar_url;
        user.updated_at = Utc::now();
        let user = user.clone();

        let profile = UserProfile {
            website: req.website,
            social_links: req.social_links,
            preferences: req.preferences,
        };
        store.profiles.insert(user_id, profile.clone());
        Ok(Some(ProfileView { user, profile }))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()> {
        let mut store = self.store();
        if let Some(user) = store.users.iter_mut().find(|u| u.id == user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>> {
        let mut store = self.store();
        let Some(user) = store.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.first_name = Some(req.first_name);
        user.last_name = Some(req.last_name);
        user.role = req.role;
        user.is_active = req.is_active;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store();
        let before = store.users.len();
        store.users.retain(|u| u.id != id);
        if store.users.len() == before {
            return Ok(false);
        }
        store.profiles.remove(&id);
        store.sessions.retain(|_, (owner, _)| *owner != id);
        let posts: Vec<Uuid> = store
            .posts
            .iter()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect();
        for post in posts {
            store.remove_post(post);
        }
        store.media.retain(|m| m.uploaded_by != id);
        Ok(true)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.store().sessions.insert(token_id, (user_id, expires_at));
        Ok(())
    }

    async fn session_active(&self, token_id: Uuid) -> RepoResult<bool> {
        Ok(self
            .store()
            .sessions
            .get(&token_id)
            .is_some_and(|(_, expires_at)| *expires_at > Utc::now()))
    }

    async fn delete_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut store = self.store();
        let before = store.sessions.len();
        store.sessions.retain(|_, (owner, _)| *owner != user_id);
        Ok((before - store.sessions.len()) as u64)
    }
}

#[async_trait]
impl PostRepository for MemoryRepository {
    async fn list_posts(&self, filter: PostFilter, page: Page) -> RepoResult<(Vec<PostSummary>, i64)> {
        let store = self.store();
        let mut posts: Vec<PostSummary> = store
            .posts
            .iter()
            .filter(|p| store.post_matches(p, &filter))
            .map(|p| store.summary(p))
            .collect();
        posts.sort_by(|a, b| {
            let ord = match filter.sort_by {
                PostSort::CreatedAt => a.post.created_at.cmp(&b.post.created_at),
                PostSort::UpdatedAt => a.post.updated_at.cmp(&b.post.updated_at),
                PostSort::PublishedAt => a.post.published_at.cmp(&b.post.published_at),
                PostSort::Title => a.post.title.cmp(&b.post.title),
            };
            ordered(ord, filter.sort_order)
        });
        Ok(paginate(posts, page))
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<PostSummary>> {
        let store = self.store();
        Ok(store.posts.iter().find(|p| p.id == id).map(|p| store.summary(p)))
    }

    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<PostSummary>> {
        let store = self.store();
        Ok(store.posts.iter().find(|p| p.slug == slug).map(|p| store.summary(p)))
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> RepoResult<bool> {
        Ok(self
            .store()
            .posts
            .iter()
            .any(|p| p.slug == slug && Some(p.id) != exclude))
    }

    async fn create_post(
        &self,
        post: NewPost,
        category_ids: Vec<Uuid>,
        tag_ids: Vec<Uuid>,
    ) -> RepoResult<Post> {
        let mut store = self.store();
        if store.posts.iter().any(|p| p.slug == post.slug) {
            return Err(RepoError::Conflict("posts_slug_key".into()));
        }
        let now = Utc::now();
        let created = Post {
            id: Uuid::new_v4(),
            author_id: post.author_id,
            title: post.title,
            slug: post.slug,
            content: post.content,
            excerpt: post.excerpt,
            featured_image_url: post.featured_image_url,
            meta_title: post.meta_title,
            meta_description: post.meta_description,
            status: post.status,
            scheduled_at: post.scheduled_at,
            published_at: post.published_at,
            created_at: now,
            updated_at: now,
        };
        store.posts.push(created.clone());
        store.replace_taxonomy(created.id, Some(&category_ids), Some(&tag_ids));
        store.snapshot(created.id, created.author_id);
        Ok(created)
    }

    async fn update_post(
        &self,
        id: Uuid,
        changes: PostChanges,
        category_ids: Option<Vec<Uuid>>,
        tag_ids: Option<Vec<Uuid>>,
        editor: Uuid,
    ) -> RepoResult<Option<Post>> {
        let mut store = self.store();
        if let Some(slug) = &changes.slug {
            if store.posts.iter().any(|p| &p.slug == slug && p.id != id) {
                return Err(RepoError::Conflict("posts_slug_key".into()));
            }
        }
        let Some(post) = store.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        let changes_content = changes.changes_content(post);
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(slug) = changes.slug {
            post.slug = slug;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        if changes.excerpt.is_some() {
            post.excerpt = changes.excerpt;
        }
        if changes.featured_image_url.is_some() {
            post.featured_image_url = changes.featured_image_url;
        }
        if changes.meta_title.is_some() {
            post.meta_title = changes.meta_title;
        }
        if changes.meta_description.is_some() {
            post.meta_description = changes.meta_description;
        }
        post.updated_at = Utc::now();
        let updated = post.clone();

        store.replace_taxonomy(id, category_ids.as_deref(), tag_ids.as_deref());
        if changes_content {
            store.snapshot(id, editor);
        }
        Ok(Some(updated))
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.store().remove_post(id))
    }

    async fn set_post_status(&self, id: Uuid, change: PostStatusChange) -> RepoResult<Option<Post>> {
        let mut store = self.store();
        let Some(post) = store.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        post.status = change.status;
        post.scheduled_at = change.scheduled_at;
        post.published_at = post.published_at.or(change.published_at);
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn list_drafts(&self, author_id: Uuid) -> RepoResult<Vec<Post>> {
        let mut drafts: Vec<Post> = self
            .store()
            .posts
            .iter()
            .filter(|p| p.author_id == author_id && p.status == PostStatus::Draft)
            .cloned()
            .collect();
        drafts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(drafts)
    }

    async fn list_versions(&self, post_id: Uuid) -> RepoResult<Vec<PostVersion>> {
        let mut versions: Vec<PostVersion> = self
            .store()
            .versions
            .iter()
            .filter(|v| v.post_id == post_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn get_version(&self, post_id: Uuid, number: i32) -> RepoResult<Option<PostVersion>> {
        Ok(self
            .store()
            .versions
            .iter()
            .find(|v| v.post_id == post_id && v.version_number == number)
            .cloned())
    }

    async fn create_version(&self, post_id: Uuid, created_by: Uuid) -> RepoResult<Option<PostVersion>> {
        Ok(self.store().snapshot(post_id, created_by))
    }

    async fn restore_version(
        &self,
        post_id: Uuid,
        number: i32,
        restored_by: Uuid,
    ) -> RepoResult<Option<Post>> {
        let mut store = self.store();
        let Some(version) = store
            .versions
            .iter()
            .find(|v| v.post_id == post_id && v.version_number == number)
            .cloned()
        else {
            return Ok(None);
        };
        let Some(post) = store.posts.iter_mut().find(|p| p.id == post_id) else {
            return Ok(None);
        };
        post.title = version.title;
        post.content = version.content;
        post.excerpt = version.excerpt;
        post.updated_at = Utc::now();
        let restored = post.clone();
        store.snapshot(post_id, restored_by);
        Ok(Some(restored))
    }

    async fn list_due_posts(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>> {
        let mut due: Vec<Post> = self
            .store()
            .posts
            .iter()
            .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|p| p.scheduled_at);
        Ok(due)
    }

    async fn publish_due_posts(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>> {
        let mut store = self.store();
        let mut published = Vec::new();
        for post in store.posts.iter_mut() {
            if post.status == PostStatus::Scheduled && post.scheduled_at.is_some_and(|at| at <= now) {
                post.status = PostStatus::Published;
                post.published_at = post.published_at.or(Some(now));
                post.scheduled_at = None;
                post.updated_at = Utc::now();
                published.push(post.clone());
            }
        }
        Ok(published)
    }
}

fn sort_taxonomy<T>(
    items: &mut [T],
    filter: &TaxonomyFilter,
    key: impl Fn(&T) -> (&str, DateTime<Utc>, i64),
) {
    items.sort_by(|a, b| {
        let (a_name, a_created, a_count) = key(a);
        let (b_name, b_created, b_count) = key(b);
        let ord = match filter.sort_by {
            TaxonomySort::Name => a_name.cmp(b_name),
            TaxonomySort::CreatedAt => a_created.cmp(&b_created),
            TaxonomySort::PostCount => a_count.cmp(&b_count),
        };
        ordered(ord, filter.sort_order).then_with(|| a_name.cmp(b_name))
    });
}

fn limit<T>(items: Vec<T>, limit: Option<i64>) -> Vec<T> {
    match limit {
        Some(limit) => items.into_iter().take(limit as usize).collect(),
        None => items,
    }
}

#[async_trait]
impl TaxonomyRepository for MemoryRepository {
    async fn list_categories(&self, filter: TaxonomyFilter) -> RepoResult<Vec<Category>> {
        let store = self.store();
        let mut categories: Vec<Category> = store
            .categories
            .iter()
            .filter(|c| match search_term(&filter.search) {
                Some(term) => contains_ci(Some(&c.name), term) || contains_ci(c.description.as_deref(), term),
                None => true,
            })
            .map(|c| store.category(c))
            .collect();
        sort_taxonomy(&mut categories, &filter, |c| (c.name.as_str(), c.created_at, c.post_count));
        Ok(limit(categories, filter.limit))
    }

    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        let store = self.store();
        Ok(store.categories.iter().find(|c| c.id == id).map(|c| store.category(c)))
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let store = self.store();
        Ok(store.categories.iter().find(|c| c.slug == slug).map(|c| store.category(c)))
    }

    async fn create_category(&self, req: CreateCategoryRequest, slug: String) -> RepoResult<Category> {
        let mut store = self.store();
        if store.categories.iter().any(|c| c.name == req.name) {
            return Err(RepoError::Conflict("categories_name_key".into()));
        }
        if store.categories.iter().any(|c| c.slug == slug) {
            return Err(RepoError::Conflict("categories_slug_key".into()));
        }
        if !store.category_exists(req.parent_id) {
            return Err(RepoError::InvalidReference("categories_parent_id_fkey".into()));
        }
        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            name: req.name,
            slug,
            description: req.description,
            color: req.color,
            parent_id: req.parent_id,
            post_count: 0,
            created_at: now,
            updated_at: now,
        };
        store.categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, req: UpdateCategoryRequest) -> RepoResult<Option<Category>> {
        let mut store = self.store();
        let clash = store.categories.iter().any(|c| {
            c.id != id && (req.name.as_ref() == Some(&c.name) || req.slug.as_ref() == Some(&c.slug))
        });
        if clash {
            return Err(RepoError::Conflict("categories_slug_key".into()));
        }
        if !store.category_exists(req.parent_id) {
            return Err(RepoError::InvalidReference("categories_parent_id_fkey".into()));
        }
        let Some(category) = store.categories.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            category.name = name;
        }
        if let Some(slug) = req.slug {
            category.slug = slug;
        }
        if req.description.is_some() {
            category.description = req.description;
        }
        if req.color.is_some() {
            category.color = req.color;
        }
        if req.parent_id.is_some() {
            category.parent_id = req.parent_id;
        }
        category.updated_at = Utc::now();
        let updated = category.clone();
        Ok(Some(store.category(&updated)))
    }

    async fn delete_category(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store();
        let before = store.categories.len();
        store.categories.retain(|c| c.id != id);
        store.post_categories.retain(|(_, category)| *category != id);
        for category in store.categories.iter_mut() {
            if category.parent_id == Some(id) {
                category.parent_id = None;
            }
        }
        Ok(store.categories.len() < before)
    }

    async fn list_tags(&self, filter: TaxonomyFilter) -> RepoResult<Vec<Tag>> {
        let store = self.store();
        let mut tags: Vec<Tag> = store
            .tags
            .iter()
            .filter(|t| match search_term(&filter.search) {
                Some(term) => contains_ci(Some(&t.name), term) || contains_ci(t.description.as_deref(), term),
                None => true,
            })
            .map(|t| store.tag(t))
            .collect();
        sort_taxonomy(&mut tags, &filter, |t| (t.name.as_str(), t.created_at, t.post_count));
        Ok(limit(tags, filter.limit))
    }

    async fn get_tag(&self, id: Uuid) -> RepoResult<Option<Tag>> {
        let store = self.store();
        Ok(store.tags.iter().find(|t| t.id == id).map(|t| store.tag(t)))
    }

    async fn get_tag_by_slug(&self, slug: &str) -> RepoResult<Option<Tag>> {
        let store = self.store();
        Ok(store.tags.iter().find(|t| t.slug == slug).map(|t| store.tag(t)))
    }

    async fn create_tag(&self, req: CreateTagRequest, slug: String) -> RepoResult<Tag> {
        let mut store = self.store();
        if store.tags.iter().any(|t| t.name == req.name || t.slug == slug) {
            return Err(RepoError::Conflict("tags_slug_key".into()));
        }
        let now = Utc::now();
        let tag = Tag {
            id: Uuid::new_v4(),
            name: req.name,
            slug,
            description: req.description,
            post_count: 0,
            created_at: now,
            updated_at: now,
        };
        store.tags.push(tag.clone());
        Ok(tag)
    }

    async fn update_tag(&self, id: Uuid, req: UpdateTagRequest) -> RepoResult<Option<Tag>> {
        let mut store = self.store();
        let clash = store.tags.iter().any(|t| {
            t.id != id && (req.name.as_ref() == Some(&t.name) || req.slug.as_ref() == Some(&t.slug))
        });
        if clash {
            return Err(RepoError::Conflict("tags_slug_key".into()));
        }
        let Some(tag) = store.tags.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            tag.name = name;
        }
        if let Some(slug) = req.slug {
            tag.slug = slug;
        }
        if req.description.is_some() {
            tag.description = req.description;
        }
        tag.updated_at = Utc::now();
        let updated = tag.clone();
        Ok(Some(store.tag(&updated)))
    }

    async fn delete_tag(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store();
        let before = store.tags.len();
        store.tags.retain(|t| t.id != id);
        store.post_tags.retain(|(_, tag)| *tag != id);
        Ok(store.tags.len() < before)
    }

    async fn categories_for_post(&self, post_id: Uuid) -> RepoResult<Vec<Category>> {
        let store = self.store();
        let mut categories: Vec<Category> = store
            .categories
            .iter()
            .filter(|c| store.post_categories.contains(&(post_id, c.id)))
            .map(|c| store.category(c))
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn tags_for_post(&self, post_id: Uuid) -> RepoResult<Vec<Tag>> {
        let store = self.store();
        let mut tags: Vec<Tag> = store
            .tags
            .iter()
            .filter(|t| store.post_tags.contains(&(post_id, t.id)))
            .map(|t| store.tag(t))
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}

#[async_trait]
impl CommentRepository for MemoryRepository {
    async fn list_comments(
        &self,
        filter: CommentFilter,
        liker: Option<Liker>,
        page: Page,
    ) -> RepoResult<(Vec<CommentView>, i64)> {
        let store = self.store();
        let mut comments: Vec<CommentView> = store
            .comments
            .iter()
            .filter(|c| c.status == filter.status)
            .filter(|c| filter.post_id.is_none_or(|id| c.post_id == id))
            .filter(|c| filter.parent_id.is_none_or(|id| c.parent_id == Some(id)))
            .filter(|c| filter.author_id.is_none_or(|id| c.author_id == Some(id)))
            .map(|c| store.comment_view(c, liker.as_ref()))
            .collect();
        comments.sort_by(|a, b| {
            let ord = match filter.sort_by {
                CommentSort::CreatedAt => a.comment.created_at.cmp(&b.comment.created_at),
                CommentSort::UpdatedAt => a.comment.updated_at.cmp(&b.comment.updated_at),
                CommentSort::LikeCount => a.like_count.cmp(&b.like_count),
            };
            ordered(ord, filter.sort_order)
        });
        Ok(paginate(comments, page))
    }

    async fn get_comment(&self, id: Uuid, liker: Option<Liker>) -> RepoResult<Option<CommentView>> {
        let store = self.store();
        Ok(store
            .comments
            .iter()
            .find(|c| c.id == id)
            .map(|c| store.comment_view(c, liker.as_ref())))
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        let now = Utc::now();
        let created = Comment {
            id: Uuid::new_v4(),
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            author_id: comment.author_id,
            author_name: comment.author_name,
            author_email: comment.author_email,
            author_website: comment.author_website,
            content: comment.content,
            status: comment.status,
            ip_address: comment.ip_address,
            user_agent: comment.user_agent,
            is_anonymous: comment.is_anonymous,
            created_at: now,
            updated_at: now,
        };
        self.store().comments.push(created.clone());
        Ok(created)
    }

    async fn update_comment(&self, id: Uuid, content: String) -> RepoResult<Option<Comment>> {
        let mut store = self.store();
        let Some(comment) = store.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        comment.content = content;
        comment.updated_at = Utc::now();
        Ok(Some(comment.clone()))
    }

    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.store().remove_comment(id))
    }

    async fn set_comment_status(&self, id: Uuid, status: CommentStatus) -> RepoResult<Option<Comment>> {
        let mut store = self.store();
        let Some(comment) = store.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        comment.status = status;
        comment.updated_at = Utc::now();
        Ok(Some(comment.clone()))
    }

    async fn like_count(&self, id: Uuid) -> RepoResult<i64> {
        Ok(self.store().likes.iter().filter(|(comment, _)| *comment == id).count() as i64)
    }

    async fn toggle_like(&self, id: Uuid, liker: Liker) -> RepoResult<bool> {
        let mut store = self.store();
        let entry = (id, liker);
        if let Some(index) = store.likes.iter().position(|like| *like == entry) {
            store.likes.remove(index);
            Ok(false)
        } else {
            store.likes.push(entry);
            Ok(true)
        }
    }

    async fn record_moderation(
        &self,
        comment_id: Uuid,
        moderator_id: Uuid,
        action: ModerationAction,
        reason: Option<String>,
    ) -> RepoResult<()> {
        let mut store = self.store();
        let moderator_username = store
            .users
            .iter()
            .find(|u| u.id == moderator_id)
            .map(|u| u.username.clone());
        store.moderation.push(ModerationRecord {
            id: Uuid::new_v4(),
            comment_id,
            moderator_id: Some(moderator_id),
            moderator_username,
            action: action.as_str().to_string(),
            reason,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn moderation_history(&self, comment_id: Uuid) -> RepoResult<Vec<ModerationRecord>> {
        let mut records: Vec<ModerationRecord> = self
            .store()
            .moderation
            .iter()
            .filter(|r| r.comment_id == comment_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[async_trait]
impl MediaRepository for MemoryRepository {
    async fn list_media(&self, filter: MediaFilter, page: Page) -> RepoResult<(Vec<MediaFile>, i64)> {
        let store = self.store();
        let mut files: Vec<MediaFile> = store
            .media
            .iter()
            .filter(|m| {
                if filter.public_only {
                    m.is_public
                } else if let Some(viewer) = filter.visible_to {
                    m.is_public || m.uploaded_by == viewer
                } else {
                    true
                }
            })
            .filter(|m| filter.file_type.is_none_or(|t| m.file_type == t))
            .filter(|m| filter.uploaded_by.is_none_or(|u| m.uploaded_by == u))
            .filter(|m| match search_term(&filter.search) {
                Some(term) => {
                    contains_ci(Some(&m.original_filename), term)
                        || contains_ci(m.alt_text.as_deref(), term)
                        || contains_ci(m.caption.as_deref(), term)
                }
                None => true,
            })
            .cloned()
            .collect();
        files.sort_by(|a, b| {
            let ord = match filter.sort_by {
                MediaSort::CreatedAt => a.created_at.cmp(&b.created_at),
                MediaSort::FileSize => a.file_size.cmp(&b.file_size),
                MediaSort::OriginalFilename => a.original_filename.cmp(&b.original_filename),
            };
            ordered(ord, filter.sort_order)
        });
        Ok(paginate(files, page))
    }

    async fn get_media(&self, id: Uuid) -> RepoResult<Option<MediaFile>> {
        Ok(self.store().media.iter().find(|m| m.id == id).cloned())
    }

    async fn create_media(&self, file: NewMediaFile) -> RepoResult<MediaFile> {
        let now = Utc::now();
        let created = MediaFile {
            id: Uuid::new_v4(),
            filename: file.filename,
            original_filename: file.original_filename,
            file_path: file.file_path,
            file_size: file.file_size,
            mime_type: file.mime_type,
            file_type: file.file_type,
            width: file.width,
            height: file.height,
            uploaded_by: file.uploaded_by,
            alt_text: file.alt_text,
            caption: file.caption,
            is_public: file.is_public,
            created_at: now,
            updated_at: now,
        };
        self.store().media.push(created.clone());
        Ok(created)
    }

    async fn update_media(&self, id: Uuid, req: UpdateMediaRequest) -> RepoResult<Option<MediaFile>> {
        let mut store = self.store();
        let Some(file) = store.media.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if req.alt_text.is_some() {
            file.alt_text = req.alt_text;
        }
        if req.caption.is_some() {
            file.caption = req.caption;
        }
        if let Some(is_public) = req.is_public {
            file.is_public = is_public;
        }
        file.updated_at = Utc::now();
        Ok(Some(file.clone()))
    }

    async fn delete_media(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store();
        let before = store.media.len();
        store.media.retain(|m| m.id != id);
        store.thumbnails.retain(|t| t.media_file_id != id);
        Ok(store.media.len() < before)
    }

    async fn media_stats(&self) -> RepoResult<MediaStats> {
        let store = self.store();
        let count = |file_type: FileType| store.media.iter().filter(|m| m.file_type == file_type).count() as i64;
        Ok(MediaStats {
            total_files: store.media.len() as i64,
            total_size: store.media.iter().map(|m| m.file_size).sum(),
            image_count: count(FileType::Image),
            video_count: count(FileType::Video),
            audio_count: count(FileType::Audio),
            document_count: count(FileType::Document),
        })
    }

    async fn list_thumbnails(&self, media_id: Uuid) -> RepoResult<Vec<MediaThumbnail>> {
        let mut thumbnails: Vec<MediaThumbnail> = self
            .store()
            .thumbnails
            .iter()
            .filter(|t| t.media_file_id == media_id)
            .cloned()
            .collect();
        thumbnails.sort_by_key(|t| t.width);
        Ok(thumbnails)
    }

    async fn replace_thumbnails(
        &self,
        media_id: Uuid,
        thumbnails: Vec<NewThumbnail>,
    ) -> RepoResult<Vec<MediaThumbnail>> {
        let mut store = self.store();
        store.thumbnails.retain(|t| t.media_file_id != media_id);
        let now = Utc::now();
        let created: Vec<MediaThumbnail> = thumbnails
            .into_iter()
            .map(|t| MediaThumbnail {
                id: Uuid::new_v4(),
                media_file_id: t.media_file_id,
                thumbnail_path: t.thumbnail_path,
                width: t.width,
                height: t.height,
                size: t.size,
                created_at: now,
            })
            .collect();
        store.thumbnails.extend(created.iter().cloned());
        Ok(created)
    }
}

#[async_trait]
impl SettingsRepository for MemoryRepository {
    async fn get_settings(&self) -> RepoResult<BlogSettings> {
        let mut store = self.store();
        let settings = store.settings.get_or_insert_with(|| BlogSettings {
            id: BLOG_SETTINGS_ID,
            blog_title: DEFAULT_BLOG_TITLE.to_string(),
            blog_description: Some(DEFAULT_BLOG_DESCRIPTION.to_string()),
            updated_by: None,
            updated_at: Utc::now(),
        });
        Ok(settings.clone())
    }

    async fn update_settings(
        &self,
        title: String,
        description: Option<String>,
        updated_by: Uuid,
    ) -> RepoResult<BlogSettings> {
        let settings = BlogSettings {
            id: BLOG_SETTINGS_ID,
            blog_title: title,
            blog_description: description,
            updated_by: Some(updated_by),
            updated_at: Utc::now(),
        };
        self.store().settings = Some(settings.clone());
        Ok(settings)
    }
}

// --- APP HARNESS ---

pub const TEST_PASSWORD: &str = "password123";

/// A router wired to fresh in-memory state. Requests go through the full middleware
/// stack via `oneshot`.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepository>,
    pub storage: MockStorageService,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(MockStorageService::new())
    }

    pub fn with_storage(storage: MockStorageService) -> Self {
        let repo = Arc::new(MemoryRepository::default());
        let config = AppConfig::default();
        let state = AppState {
            repo: repo.clone() as RepositoryState,
            storage: Arc::new(storage.clone()),
            config: config.clone(),
        };
        Self {
            router: create_router(state),
            repo,
            storage,
            config,
        }
    }

    /// Inserts an account without a password; sign it in with `token_for`.
    pub async fn seed_user(&self, role: Role) -> User {
        self.insert_user(role, None).await
    }

    /// Inserts an account whose password is `TEST_PASSWORD`.
    pub async fn seed_user_with_password(&self, role: Role) -> User {
        let hash = auth::hash_password(TEST_PASSWORD).unwrap();
        self.insert_user(role, Some(hash)).await
    }

    async fn insert_user(&self, role: Role, password_hash: Option<String>) -> User {
        let tag = Uuid::new_v4().simple().to_string()[..10].to_string();
        self.repo
            .create_user(NewUser {
                email: format!("{tag}@example.com"),
                username: format!("{}_{tag}", role.as_str()),
                password_hash,
                first_name: Some("Test".to_string()),
                last_name: Some("User".to_string()),
                role,
                email_verified: true,
                asgardeo_user_id: None,
            })
            .await
            .unwrap()
    }

    pub async fn token_for(&self, user: &User) -> String {
        let repo: RepositoryState = self.repo.clone();
        auth::start_session(&repo, &self.config, user).await.unwrap()
    }

    /// Seeds a user with `role` and opens a session for it.
    pub async fn sign_in(&self, role: Role) -> (User, String) {
        let user = self.seed_user(role).await;
        let token = self.token_for(&user).await;
        (user, token)
    }

    pub async fn call(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Sends a JSON request and returns the status with the parsed body
    /// (`Value::Null` for empty or non-JSON bodies).
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.call(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(Method::DELETE, uri, token, None).await
    }

    /// Creates a post through the API as the token's owner and returns its JSON.
    pub async fn create_post(&self, token: &str, body: Value) -> Value {
        let (status, json) = self.post("/api/posts", Some(token), body).await;
        assert_eq!(status, StatusCode::CREATED, "create post failed: {json}");
        json["post"].clone()
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub fn error_message(body: &Value) -> &str {
    body["error"]["message"].as_str().unwrap_or_default()
}

/// Builds a `multipart/form-data` body. Files are `(field, filename, content_type, bytes)`.
pub fn multipart_body(boundary: &str, fields: &[(&str, &str)], files: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    for (name, filename, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
