//! Category and tag endpoints. Both taxonomies are flat lists managed by editors;
//! reads are public.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult, ErrorBody, RepoError},
    lifecycle::slugify,
    models::{
        CategoriesResponse, CategoryResponse, CreateCategoryRequest, CreateTagRequest,
        MessageResponse, Page, Pagination, PostFilter, PostListQuery, PostSort, PostsResponse,
        Role, SortOrder, TagResponse, TagsResponse, TaxonomyKind, TaxonomyListQuery,
        UpdateCategoryRequest, UpdateTagRequest,
    },
    validation::Validated,
};

/// Turns a unique-index violation into a readable 409.
fn duplicate(kind: TaxonomyKind) -> impl FnOnce(RepoError) -> AppError {
    move |err| match err {
        RepoError::Conflict(_) => AppError::Conflict(format!(
            "{} with this name or slug already exists",
            kind.label()
        )),
        other => other.into(),
    }
}

/// A parent category must already exist.
async fn check_parent(state: &AppState, parent_id: Option<Uuid>) -> AppResult<()> {
    if let Some(parent_id) = parent_id {
        if state.repo.get_category(parent_id).await?.is_none() {
            return Err(AppError::BadRequest("Parent category not found".to_string()));
        }
    }
    Ok(())
}

fn normalize_slug(slug: Option<String>) -> Option<String> {
    slug.map(|s| slugify(&s))
}

async fn published_in(
    state: &AppState,
    filter: PostFilter,
    query: PostListQuery,
) -> AppResult<Json<PostsResponse>> {
    let page = Page::new(query.page, query.limit);
    let filter = PostFilter {
        published_only: true,
        sort_by: PostSort::parse(query.sort_by.as_deref().or(Some("published_at"))),
        sort_order: SortOrder::parse(query.sort_order.as_deref()),
        ..filter
    };
    let (posts, total) = state.repo.list_posts(filter, page).await?;
    Ok(Json(PostsResponse {
        posts,
        pagination: Pagination::new(page, total),
    }))
}

// --- Categories ---

/// list_categories
///
/// [Public Route] All categories with their post counts.
#[utoipa::path(
    get,
    path = "/api/categories",
    params(TaxonomyListQuery),
    responses((status = 200, description = "Categories", body = CategoriesResponse))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<TaxonomyListQuery>,
) -> AppResult<Json<CategoriesResponse>> {
    let categories = state.repo.list_categories(query.into()).await?;
    Ok(Json(CategoriesResponse { categories }))
}

#[utoipa::path(
    get,
    path = "/api/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Found", body = CategoryResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CategoryResponse>> {
    let category = state
        .repo
        .get_category(id)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;
    Ok(Json(CategoryResponse { category }))
}

#[utoipa::path(
    get,
    path = "/api/categories/slug/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 200, description = "Found", body = CategoryResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_category_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<CategoryResponse>> {
    let category = state
        .repo
        .get_category_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;
    Ok(Json(CategoryResponse { category }))
}

/// create_category
///
/// [Admin Route] The slug defaults to the slugified name.
#[utoipa::path(
    post,
    path = "/api/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Created", body = CategoryResponse),
        (status = 400, description = "Unknown parent", body = ErrorBody),
        (status = 409, description = "Duplicate name or slug", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_category(
    user: AuthUser,
    State(state): State<AppState>,
    Validated(payload): Validated<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<CategoryResponse>)> {
    user.require(Role::Editor)?;
    check_parent(&state, payload.parent_id).await?;

    let slug = slugify(payload.slug.as_deref().unwrap_or(&payload.name));
    let category = state
        .repo
        .create_category(payload, slug)
        .await
        .map_err(duplicate(TaxonomyKind::Category))?;

    tracing::info!(category_id = %category.id, slug = %category.slug, "Category created");
    Ok((StatusCode::CREATED, Json(CategoryResponse { category })))
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Updated", body = CategoryResponse),
        (status = 400, description = "Self or unknown parent", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Duplicate name or slug", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Validated(mut payload): Validated<UpdateCategoryRequest>,
) -> AppResult<Json<CategoryResponse>> {
    user.require(Role::Editor)?;
    if payload.parent_id == Some(id) {
        return Err(AppError::BadRequest(
            "A category cannot be its own parent".to_string(),
        ));
    }
    check_parent(&state, payload.parent_id).await?;

    payload.slug = normalize_slug(payload.slug);
    let category = state
        .repo
        .update_category(id, payload)
        .await
        .map_err(duplicate(TaxonomyKind::Category))?
        .ok_or_else(|| AppError::not_found("Category"))?;
    Ok(Json(CategoryResponse { category }))
}

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    user.require(Role::Editor)?;
    if !state.repo.delete_category(id).await? {
        return Err(AppError::not_found("Category"));
    }
    Ok(Json(MessageResponse::new("Category deleted successfully")))
}

/// category_posts
///
/// [Public Route] Published posts filed under the category, newest first.
#[utoipa::path(
    get,
    path = "/api/categories/{id}/posts",
    params(("id" = Uuid, Path, description = "Category ID"), PostListQuery),
    responses(
        (status = 200, description = "Posts", body = PostsResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn category_posts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<PostsResponse>> {
    if state.repo.get_category(id).await?.is_none() {
        return Err(AppError::not_found("Category"));
    }
    let filter = PostFilter {
        category_id: Some(id),
        ..PostFilter::default()
    };
    published_in(&state, filter, query).await
}

// --- Tags ---

#[utoipa::path(
    get,
    path = "/api/tags",
    params(TaxonomyListQuery),
    responses((status = 200, description = "Tags", body = TagsResponse))
)]
pub async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<TaxonomyListQuery>,
) -> AppResult<Json<TagsResponse>> {
    let tags = state.repo.list_tags(query.into()).await?;
    Ok(Json(TagsResponse { tags }))
}

#[utoipa::path(
    get,
    path = "/api/tags/{id}",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "Found", body = TagResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TagResponse>> {
    let tag = state
        .repo
        .get_tag(id)
        .await?
        .ok_or_else(|| AppError::not_found("Tag"))?;
    Ok(Json(TagResponse { tag }))
}

#[utoipa::path(
    get,
    path = "/api/tags/slug/{slug}",
    params(("slug" = String, Path, description = "Tag slug")),
    responses(
        (status = 200, description = "Found", body = TagResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_tag_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<TagResponse>> {
    let tag = state
        .repo
        .get_tag_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("Tag"))?;
    Ok(Json(TagResponse { tag }))
}

/// create_tag
///
/// [Admin Route] The slug defaults to the slugified name.
#[utoipa::path(
    post,
    path = "/api/tags",
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Created", body = TagResponse),
        (status = 409, description = "Duplicate name or slug", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_tag(
    user: AuthUser,
    State(state): State<AppState>,
    Validated(payload): Validated<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<TagResponse>)> {
    user.require(Role::Editor)?;

    let slug = slugify(payload.slug.as_deref().unwrap_or(&payload.name));
    let tag = state
        .repo
        .create_tag(payload, slug)
        .await
        .map_err(duplicate(TaxonomyKind::Tag))?;

    tracing::info!(tag_id = %tag.id, slug = %tag.slug, "Tag created");
    Ok((StatusCode::CREATED, Json(TagResponse { tag })))
}

#[utoipa::path(
    put,
    path = "/api/tags/{id}",
    params(("id" = Uuid, Path, description = "Tag ID")),
    request_body = UpdateTagRequest,
    responses(
        (status = 200, description = "Updated", body = TagResponse),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Duplicate name or slug", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_tag(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Validated(mut payload): Validated<UpdateTagRequest>,
) -> AppResult<Json<TagResponse>> {
    user.require(Role::Editor)?;

    payload.slug = normalize_slug(payload.slug);
    let tag = state
        .repo
        .update_tag(id, payload)
        .await
        .map_err(duplicate(TaxonomyKind::Tag))?
        .ok_or_else(|| AppError::not_found("Tag"))?;
    Ok(Json(TagResponse { tag }))
}

#[utoipa::path(
    delete,
    path = "/api/tags/{id}",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_tag(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    user.require(Role::Editor)?;
    if !state.repo.delete_tag(id).await? {
        return Err(AppError::not_found("Tag"));
    }
    Ok(Json(MessageResponse::new("Tag deleted successfully")))
}

/// tag_posts
///
/// [Public Route] Published posts carrying the tag, newest first.
#[utoipa::path(
    get,
    path = "/api/tags/{id}/posts",
    params(("id" = Uuid, Path, description = "Tag ID"), PostListQuery),
    responses(
        (status = 200, description = "Posts", body = PostsResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn tag_posts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<PostsResponse>> {
    if state.repo.get_tag(id).await?.is_none() {
        return Err(AppError::not_found("Tag"));
    }
    let filter = PostFilter {
        tag_id: Some(id),
        ..PostFilter::default()
    };
    published_in(&state, filter, query).await
}
