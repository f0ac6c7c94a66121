use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, ClientIp, MaybeAuthUser},
    error::{AppError, AppResult, ErrorBody},
    models::{
        Comment, CommentFilter, CommentListQuery, CommentResponse, CommentSort, CommentStatus,
        CommentsResponse, CreateCommentRequest, LikeCountResponse, LikeToggleResponse, Liker,
        MessageResponse, ModerateCommentRequest, ModerateResponse, ModerationAction,
        ModerationResponse, NewComment, Page, Pagination, Role, SortOrder, UpdateCommentRequest,
    },
    validation::Validated,
};

const DEFAULT_COMMENT_PAGE_SIZE: i64 = 20;

fn comment_not_found() -> AppError {
    AppError::not_found("Comment")
}

fn liker_for(viewer: Option<&AuthUser>, ip: ClientIp) -> Liker {
    match viewer {
        Some(user) => Liker::User(user.id),
        None => Liker::Ip(ip.0),
    }
}

/// Comment authors and editors may edit or delete a comment. Anonymous comments
/// belong to nobody.
fn may_modify(user: &AuthUser, comment: &Comment) -> bool {
    comment.author_id == Some(user.id) || user.role.at_least(Role::Editor)
}

/// list_comments
///
/// [Public Route] Paged comments with like counts. Only editors may list statuses
/// other than `approved`; everyone else always gets approved comments.
#[utoipa::path(
    get,
    path = "/api/comments",
    params(CommentListQuery),
    responses((status = 200, description = "Comments", body = CommentsResponse))
)]
pub async fn list_comments(
    MaybeAuthUser(viewer): MaybeAuthUser,
    ip: ClientIp,
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> AppResult<Json<CommentsResponse>> {
    let page = Page::new(query.page, Some(query.limit.unwrap_or(DEFAULT_COMMENT_PAGE_SIZE)));
    let is_editor = viewer
        .as_ref()
        .is_some_and(|user| user.role.at_least(Role::Editor));

    let status = match query.status {
        Some(status) if is_editor => status,
        _ => CommentStatus::Approved,
    };
    let filter = CommentFilter {
        post_id: query.post_id,
        parent_id: query.parent_id,
        status,
        author_id: query.author_id,
        sort_by: CommentSort::parse(query.sort_by.as_deref()),
        sort_order: SortOrder::parse(query.sort_order.as_deref()),
    };

    let liker = liker_for(viewer.as_ref(), ip);
    let (comments, total) = state.repo.list_comments(filter, Some(liker), page).await?;
    Ok(Json(CommentsResponse {
        comments,
        pagination: Pagination::new(page, total),
    }))
}

/// get_comment
///
/// [Public Route] Comments awaiting moderation are only visible to their author and
/// editors.
#[utoipa::path(
    get,
    path = "/api/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Found", body = CommentResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_comment(
    MaybeAuthUser(viewer): MaybeAuthUser,
    ip: ClientIp,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CommentResponse>> {
    let liker = liker_for(viewer.as_ref(), ip);
    let comment = state
        .repo
        .get_comment(id, Some(liker))
        .await?
        .ok_or_else(comment_not_found)?;

    let visible = comment.comment.status == CommentStatus::Approved
        || viewer
            .as_ref()
            .is_some_and(|user| may_modify(user, &comment.comment));
    if !visible {
        return Err(comment_not_found());
    }
    Ok(Json(CommentResponse { comment }))
}

/// like_count
#[utoipa::path(
    get,
    path = "/api/comments/{id}/likes",
    params(("id" = Uuid, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Like count", body = LikeCountResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn like_count(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LikeCountResponse>> {
    if state.repo.get_comment(id, None).await?.is_none() {
        return Err(comment_not_found());
    }
    let like_count = state.repo.like_count(id).await?;
    Ok(Json(LikeCountResponse { like_count }))
}

/// toggle_like
///
/// [Public Route] Likes or unlikes a comment. Signed-in callers are tracked by user
/// id, anonymous callers by client IP.
#[utoipa::path(
    post,
    path = "/api/comments/{id}/like",
    params(("id" = Uuid, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Toggled", body = LikeToggleResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn toggle_like(
    MaybeAuthUser(viewer): MaybeAuthUser,
    ip: ClientIp,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LikeToggleResponse>> {
    if state.repo.get_comment(id, None).await?.is_none() {
        return Err(comment_not_found());
    }

    let liked = state
        .repo
        .toggle_like(id, liker_for(viewer.as_ref(), ip))
        .await?;
    let message = if liked { "Comment liked" } else { "Comment unliked" };
    Ok(Json(LikeToggleResponse {
        message: message.to_string(),
        liked,
    }))
}

/// create_comment
///
/// [Authenticated Route] The post must exist and be visible to the caller; a reply's
/// parent must belong to the same post. Comments by editors are approved at once,
/// all others wait for moderation.
#[utoipa::path(
    post,
    path = "/api/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Created", body = CommentResponse),
        (status = 400, description = "Invalid parent", body = ErrorBody),
        (status = 404, description = "Post not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_comment(
    user: AuthUser,
    ip: ClientIp,
    headers: HeaderMap,
    State(state): State<AppState>,
    Validated(payload): Validated<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentResponse>)> {
    let post = state
        .repo
        .get_post(payload.post_id)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?
        .post;
    if !post.is_published() && !user.can_manage(post.author_id) {
        return Err(AppError::not_found("Post"));
    }

    if let Some(parent_id) = payload.parent_id {
        let parent = state
            .repo
            .get_comment(parent_id, None)
            .await?
            .ok_or_else(|| AppError::BadRequest("Parent comment not found".to_string()))?;
        if parent.comment.post_id != payload.post_id {
            return Err(AppError::BadRequest(
                "Parent comment belongs to a different post".to_string(),
            ));
        }
    }

    let status = if user.role.at_least(Role::Editor) {
        CommentStatus::Approved
    } else {
        CommentStatus::Pending
    };
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let created = state
        .repo
        .create_comment(NewComment {
            post_id: payload.post_id,
            parent_id: payload.parent_id,
            author_id: Some(user.id),
            author_name: payload.author_name.or_else(|| Some(user.username.clone())),
            author_email: payload.author_email.or_else(|| Some(user.email.clone())),
            author_website: payload.author_website,
            content: payload.content,
            status,
            ip_address: Some(ip.0),
            user_agent,
            is_anonymous: false,
        })
        .await?;

    tracing::info!(
        comment_id = %created.id,
        post_id = %created.post_id,
        status = created.status.as_str(),
        "Comment created"
    );
    let comment = state
        .repo
        .get_comment(created.id, Some(Liker::User(user.id)))
        .await?
        .ok_or_else(comment_not_found)?;
    Ok((StatusCode::CREATED, Json(CommentResponse { comment })))
}

/// update_comment
///
/// [Authenticated Route] Comment author or editor.
#[utoipa::path(
    put,
    path = "/api/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment ID")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = CommentResponse),
        (status = 403, description = "Not the author", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateCommentRequest>,
) -> AppResult<Json<CommentResponse>> {
    let existing = state
        .repo
        .get_comment(id, None)
        .await?
        .ok_or_else(comment_not_found)?;
    if !may_modify(&user, &existing.comment) {
        return Err(AppError::Forbidden(
            "Not authorized to update this comment".to_string(),
        ));
    }

    state
        .repo
        .update_comment(id, payload.content)
        .await?
        .ok_or_else(comment_not_found)?;
    let comment = state
        .repo
        .get_comment(id, Some(Liker::User(user.id)))
        .await?
        .ok_or_else(comment_not_found)?;
    Ok(Json(CommentResponse { comment }))
}

/// delete_comment
///
/// [Authenticated Route] Comment author or editor. Replies and likes go with it.
#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the author", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let existing = state
        .repo
        .get_comment(id, None)
        .await?
        .ok_or_else(comment_not_found)?;
    if !may_modify(&user, &existing.comment) {
        return Err(AppError::Forbidden(
            "Not authorized to delete this comment".to_string(),
        ));
    }

    state.repo.delete_comment(id).await?;
    Ok(Json(MessageResponse::new("Comment deleted successfully")))
}

/// moderate_comment
///
/// [Admin Route] Records the decision, then applies it: approve, reject and spam set
/// the status, delete removes the comment (and with it its moderation log).
#[utoipa::path(
    post,
    path = "/api/comments/{id}/moderate",
    params(("id" = Uuid, Path, description = "Comment ID")),
    request_body = ModerateCommentRequest,
    responses(
        (status = 200, description = "Moderated", body = ModerateResponse),
        (status = 403, description = "Not an editor", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn moderate_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<ModerateCommentRequest>,
) -> AppResult<Json<ModerateResponse>> {
    user.require(Role::Editor)?;
    if state.repo.get_comment(id, None).await?.is_none() {
        return Err(comment_not_found());
    }

    state
        .repo
        .record_moderation(id, user.id, payload.action, payload.reason)
        .await?;

    let comment = match payload.action.resulting_status() {
        Some(status) => Some(
            state
                .repo
                .set_comment_status(id, status)
                .await?
                .ok_or_else(comment_not_found)?,
        ),
        None => {
            state.repo.delete_comment(id).await?;
            None
        }
    };

    tracing::info!(
        comment_id = %id,
        moderator_id = %user.id,
        action = payload.action.as_str(),
        "Comment moderated"
    );
    let message = if payload.action == ModerationAction::Delete {
        "Comment deleted successfully"
    } else {
        "Comment moderated successfully"
    };
    Ok(Json(ModerateResponse {
        message: message.to_string(),
        comment,
    }))
}

/// moderation_history
#[utoipa::path(
    get,
    path = "/api/comments/{id}/moderation",
    params(("id" = Uuid, Path, description = "Comment ID")),
    responses((status = 200, description = "Moderation log", body = ModerationResponse)),
    security(("bearer_auth" = []))
)]
pub async fn moderation_history(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ModerationResponse>> {
    user.require(Role::Editor)?;
    let moderation = state.repo.moderation_history(id).await?;
    Ok(Json(ModerationResponse { moderation }))
}
