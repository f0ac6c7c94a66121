use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    error::{AppError, AppResult, ErrorBody},
    handlers::unique_post_slug,
    lifecycle::{self, Transition},
    models::{
        CreatePostRequest, DraftSavedResponse, DraftsResponse, MessageResponse, NewPost, Page,
        Pagination, Post, PostChanges, PostDetail, PostFilter, PostListQuery, PostResponse,
        PostSort, PostStatus, PostSummary, PostVersion, PostsResponse, PublishDueResponse,
        RestoreResponse, Role, SaveDraftRequest, ScheduleRequest, ScheduledPostsResponse,
        SortOrder, UpdatePostRequest, VersionResponse, VersionsResponse,
    },
    scheduler,
    validation::Validated,
};

fn post_not_found() -> AppError {
    AppError::not_found("Post")
}

/// Published posts are public; everything else only for the author and editors.
fn can_view(viewer: Option<&AuthUser>, post: &Post) -> bool {
    post.is_published() || viewer.is_some_and(|user| user.can_manage(post.author_id))
}

async fn with_taxonomy(state: &AppState, summary: PostSummary) -> AppResult<PostDetail> {
    let categories = state.repo.categories_for_post(summary.post.id).await?;
    let tags = state.repo.tags_for_post(summary.post.id).await?;
    Ok(PostDetail {
        summary,
        categories,
        tags,
    })
}

async fn load_detail(state: &AppState, id: Uuid) -> AppResult<PostDetail> {
    let summary = state.repo.get_post(id).await?.ok_or_else(post_not_found)?;
    with_taxonomy(state, summary).await
}

/// Loads a post and checks that the caller may modify it.
async fn managed_post(state: &AppState, user: &AuthUser, id: Uuid, action: &str) -> AppResult<Post> {
    let summary = state.repo.get_post(id).await?.ok_or_else(post_not_found)?;
    if !user.can_manage(summary.post.author_id) {
        return Err(AppError::Forbidden(format!("Not authorized to {action} this post")));
    }
    Ok(summary.post)
}

/// list_posts
///
/// [Public Route] Paged post listing. Anonymous callers only see published posts,
/// signed-in readers and authors additionally see their own, editors see everything.
#[utoipa::path(
    get,
    path = "/api/posts",
    params(PostListQuery),
    responses((status = 200, description = "Posts", body = PostsResponse))
)]
pub async fn list_posts(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<PostsResponse>> {
    let page = Page::new(query.page, query.limit);

    let mut filter = PostFilter {
        status: query.status,
        search: query.search,
        category_slug: query.category.filter(|s| !s.is_empty()),
        tag_slug: query.tag.filter(|s| !s.is_empty()),
        author_id: query.author,
        sort_by: PostSort::parse(query.sort_by.as_deref()),
        sort_order: SortOrder::parse(query.sort_order.as_deref()),
        ..PostFilter::default()
    };
    match &viewer {
        None => filter.published_only = true,
        Some(user) if user.role.at_least(Role::Editor) => {}
        Some(user) => filter.visible_to = Some(user.id),
    }

    let (posts, total) = state.repo.list_posts(filter, page).await?;
    Ok(Json(PostsResponse {
        posts,
        pagination: Pagination::new(page, total),
    }))
}

/// get_post
///
/// [Public Route] A post with its categories and tags. Unpublished posts answer 404
/// to anyone but their author and editors.
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = PostResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_post(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostResponse>> {
    let summary = state.repo.get_post(id).await?.ok_or_else(post_not_found)?;
    if !can_view(viewer.as_ref(), &summary.post) {
        return Err(post_not_found());
    }
    Ok(Json(PostResponse {
        post: with_taxonomy(&state, summary).await?,
    }))
}

/// get_post_by_slug
///
/// [Public Route] Same visibility rules as `get_post`.
#[utoipa::path(
    get,
    path = "/api/posts/slug/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Found", body = PostResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_post_by_slug(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<PostResponse>> {
    let summary = state
        .repo
        .get_post_by_slug(&slug)
        .await?
        .ok_or_else(post_not_found)?;
    if !can_view(viewer.as_ref(), &summary.post) {
        return Err(post_not_found());
    }
    Ok(Json(PostResponse {
        post: with_taxonomy(&state, summary).await?,
    }))
}

/// create_post
///
/// [Authenticated Route] Authors and above. The slug is taken from the request or the
/// title and made unique; version 1 is recorded with the post.
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = PostResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 403, description = "Readers cannot write posts", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    Validated(payload): Validated<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostResponse>)> {
    user.require(Role::Author)?;

    let status = lifecycle::initial_state(payload.status, payload.scheduled_at, Utc::now())?;
    let slug = unique_post_slug(&state.repo, payload.slug.as_deref(), &payload.title, None).await?;

    let post = state
        .repo
        .create_post(
            NewPost {
                author_id: user.id,
                title: payload.title,
                slug,
                content: payload.content,
                excerpt: payload.excerpt,
                featured_image_url: payload.featured_image_url,
                meta_title: payload.meta_title,
                meta_description: payload.meta_description,
                status: status.status,
                scheduled_at: status.scheduled_at,
                published_at: status.published_at,
            },
            payload.category_ids,
            payload.tag_ids,
        )
        .await?;

    tracing::info!(post_id = %post.id, author_id = %user.id, status = post.status.as_str(), "Post created");
    let detail = load_detail(&state, post.id).await?;
    Ok((StatusCode::CREATED, Json(PostResponse { post: detail })))
}

/// update_post
///
/// [Authenticated Route] Owner or editor. Changing title, content or excerpt records
/// a new version. A `status` is validated before anything is written and applied as a
/// lifecycle transition after the edit.
#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = PostResponse),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdatePostRequest>,
) -> AppResult<Json<PostResponse>> {
    let existing = managed_post(&state, &user, id, "update").await?;

    let now = Utc::now();
    let status_change = match payload.status {
        Some(status) if status != existing.status || status == PostStatus::Scheduled => {
            let transition = lifecycle::transition_to(status, payload.scheduled_at)?;
            Some(lifecycle::apply(existing.published_at, transition, now)?)
        }
        _ => None,
    };

    let slug = match payload.slug.as_deref() {
        Some(requested) if requested != existing.slug => {
            let title = payload.title.as_deref().unwrap_or(&existing.title);
            Some(unique_post_slug(&state.repo, Some(requested), title, Some(id)).await?)
        }
        _ => None,
    };

    let changes = PostChanges {
        title: payload.title,
        slug,
        content: payload.content,
        excerpt: payload.excerpt,
        featured_image_url: payload.featured_image_url,
        meta_title: payload.meta_title,
        meta_description: payload.meta_description,
    };

    state
        .repo
        .update_post(id, changes, payload.category_ids, payload.tag_ids, user.id)
        .await?
        .ok_or_else(post_not_found)?;

    if let Some(change) = status_change {
        let updated = state
            .repo
            .set_post_status(id, change)
            .await?
            .ok_or_else(post_not_found)?;
        tracing::info!(
            post_id = %id,
            from = existing.status.as_str(),
            to = updated.status.as_str(),
            "Post status changed"
        );
    }

    Ok(Json(PostResponse {
        post: load_detail(&state, id).await?,
    }))
}

/// delete_post
///
/// [Authenticated Route] Owner or editor. Versions, taxonomy links and comments go
/// with the post.
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    managed_post(&state, &user, id, "delete").await?;
    if !state.repo.delete_post(id).await? {
        return Err(post_not_found());
    }
    tracing::info!(post_id = %id, deleted_by = %user.id, "Post deleted");
    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

async fn transition(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    transition: Transition,
) -> AppResult<Json<PostResponse>> {
    let post = managed_post(state, user, id, "change the status of").await?;
    let change = lifecycle::apply(post.published_at, transition, Utc::now())?;

    let updated = state
        .repo
        .set_post_status(id, change)
        .await?
        .ok_or_else(post_not_found)?;
    tracing::info!(
        post_id = %id,
        from = post.status.as_str(),
        to = updated.status.as_str(),
        "Post status changed"
    );

    Ok(Json(PostResponse {
        post: load_detail(state, id).await?,
    }))
}

/// publish_post
///
/// [Authenticated Route] Owner or editor. Stamps `published_at` on first publish.
#[utoipa::path(
    post,
    path = "/api/posts/{id}/publish",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 200, description = "Published", body = PostResponse)),
    security(("bearer_auth" = []))
)]
pub async fn publish_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostResponse>> {
    transition(&state, &user, id, Transition::Publish).await
}

/// unpublish_post
///
/// [Authenticated Route] Owner or editor. Moves the post back to draft.
#[utoipa::path(
    post,
    path = "/api/posts/{id}/unpublish",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 200, description = "Back to draft", body = PostResponse)),
    security(("bearer_auth" = []))
)]
pub async fn unpublish_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostResponse>> {
    transition(&state, &user, id, Transition::Unpublish).await
}

/// archive_post
#[utoipa::path(
    post,
    path = "/api/posts/{id}/archive",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 200, description = "Archived", body = PostResponse)),
    security(("bearer_auth" = []))
)]
pub async fn archive_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostResponse>> {
    transition(&state, &user, id, Transition::Archive).await
}

/// schedule_post
///
/// [Authenticated Route] Owner or editor. `scheduledAt` must lie in the future.
#[utoipa::path(
    post,
    path = "/api/posts/{id}/schedule",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = ScheduleRequest,
    responses(
        (status = 200, description = "Scheduled", body = PostResponse),
        (status = 400, description = "Time not in the future", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn schedule_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScheduleRequest>,
) -> AppResult<Json<PostResponse>> {
    transition(&state, &user, id, Transition::Schedule(payload.scheduled_at)).await
}

/// list_drafts
///
/// [Authenticated Route] The caller's own drafts, most recently edited first.
#[utoipa::path(
    get,
    path = "/api/posts/drafts",
    responses((status = 200, description = "Drafts", body = DraftsResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_drafts(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DraftsResponse>> {
    let drafts = state.repo.list_drafts(user.id).await?;
    Ok(Json(DraftsResponse { drafts }))
}

/// save_draft
///
/// [Authenticated Route] Autosave. Creates a new draft, or overwrites the title,
/// content and excerpt of the draft named by `postId`.
#[utoipa::path(
    post,
    path = "/api/posts/drafts",
    request_body = SaveDraftRequest,
    responses(
        (status = 200, description = "Saved", body = DraftSavedResponse),
        (status = 404, description = "Draft not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_draft(
    user: AuthUser,
    State(state): State<AppState>,
    Validated(payload): Validated<SaveDraftRequest>,
) -> AppResult<Json<DraftSavedResponse>> {
    user.require(Role::Author)?;

    let post_id = match payload.post_id {
        Some(id) => {
            managed_post(&state, &user, id, "update").await?;
            let changes = PostChanges {
                title: Some(payload.title),
                content: Some(payload.content),
                excerpt: payload.excerpt,
                ..PostChanges::default()
            };
            state
                .repo
                .update_post(id, changes, None, None, user.id)
                .await?
                .ok_or_else(post_not_found)?
                .id
        }
        None => {
            let slug = unique_post_slug(&state.repo, None, &payload.title, None).await?;
            let post = state
                .repo
                .create_post(
                    NewPost {
                        author_id: user.id,
                        title: payload.title,
                        slug,
                        content: payload.content,
                        excerpt: payload.excerpt,
                        featured_image_url: None,
                        meta_title: None,
                        meta_description: None,
                        status: PostStatus::Draft,
                        scheduled_at: None,
                        published_at: None,
                    },
                    Vec::new(),
                    Vec::new(),
                )
                .await?;
            post.id
        }
    };

    Ok(Json(DraftSavedResponse {
        message: "Draft saved successfully".to_string(),
        post_id,
    }))
}

/// list_versions
///
/// [Authenticated Route] Owner or editor. Newest version first.
#[utoipa::path(
    get,
    path = "/api/posts/{id}/versions",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 200, description = "Versions", body = VersionsResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_versions(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VersionsResponse>> {
    managed_post(&state, &user, id, "view the history of").await?;
    let versions = state.repo.list_versions(id).await?;
    Ok(Json(VersionsResponse { versions }))
}

/// create_version
///
/// [Authenticated Route] Owner or editor. Snapshots the current content without
/// changing the post.
#[utoipa::path(
    post,
    path = "/api/posts/{id}/versions",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 201, description = "Snapshot recorded", body = VersionResponse)),
    security(("bearer_auth" = []))
)]
pub async fn create_version(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<VersionResponse>)> {
    managed_post(&state, &user, id, "update").await?;
    let version = state
        .repo
        .create_version(id, user.id)
        .await?
        .ok_or_else(post_not_found)?;
    Ok((StatusCode::CREATED, Json(VersionResponse { version })))
}

async fn find_version(state: &AppState, id: Uuid, number: i32) -> AppResult<PostVersion> {
    state
        .repo
        .get_version(id, number)
        .await?
        .ok_or_else(|| AppError::not_found("Version"))
}

/// get_version
#[utoipa::path(
    get,
    path = "/api/posts/{id}/versions/{version}",
    params(
        ("id" = Uuid, Path, description = "Post ID"),
        ("version" = i32, Path, description = "Version number")
    ),
    responses(
        (status = 200, description = "Found", body = VersionResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_version(
    user: AuthUser,
    State(state): State<AppState>,
    Path((id, number)): Path<(Uuid, i32)>,
) -> AppResult<Json<VersionResponse>> {
    managed_post(&state, &user, id, "view the history of").await?;
    let version = find_version(&state, id, number).await?;
    Ok(Json(VersionResponse { version }))
}

/// restore_version
///
/// [Authenticated Route] Owner or editor. Copies the snapshot back into the post and
/// records the result as a new version.
#[utoipa::path(
    post,
    path = "/api/posts/{id}/versions/{version}/restore",
    params(
        ("id" = Uuid, Path, description = "Post ID"),
        ("version" = i32, Path, description = "Version number")
    ),
    responses(
        (status = 200, description = "Restored", body = RestoreResponse),
        (status = 404, description = "Version not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn restore_version(
    user: AuthUser,
    State(state): State<AppState>,
    Path((id, number)): Path<(Uuid, i32)>,
) -> AppResult<Json<RestoreResponse>> {
    managed_post(&state, &user, id, "update").await?;
    find_version(&state, id, number).await?;

    let post = state
        .repo
        .restore_version(id, number, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("Version"))?;

    tracing::info!(post_id = %id, version = number, "Post restored from version");
    Ok(Json(RestoreResponse {
        message: format!("Post restored to version {number}"),
        post,
    }))
}

/// scheduled_ready
///
/// [Admin Route] Scheduled posts whose time has come but that are not yet published.
#[utoipa::path(
    get,
    path = "/api/posts/scheduled/ready",
    responses((status = 200, description = "Due posts", body = ScheduledPostsResponse)),
    security(("bearer_auth" = []))
)]
pub async fn scheduled_ready(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<ScheduledPostsResponse>> {
    user.require(Role::Editor)?;
    let scheduled_posts = state.repo.list_due_posts(Utc::now()).await?;
    Ok(Json(ScheduledPostsResponse { scheduled_posts }))
}

/// publish_scheduled
///
/// [Admin Route] Publishes every due scheduled post. Meant for an external cron when
/// the in-process scheduler is disabled.
#[utoipa::path(
    post,
    path = "/api/posts/scheduled/publish",
    responses((status = 200, description = "Published", body = PublishDueResponse)),
    security(("bearer_auth" = []))
)]
pub async fn publish_scheduled(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<PublishDueResponse>> {
    user.require(Role::Editor)?;
    let posts = scheduler::publish_due(&state.repo).await?;
    Ok(Json(PublishDueResponse {
        message: format!("Published {} scheduled posts", posts.len()),
        count: posts.len(),
        posts,
    }))
}
