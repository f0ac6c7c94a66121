use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    error::{AppError, AppResult, ErrorBody},
    imaging,
    models::{
        FileResponse, FileType, FilesResponse, MAX_UPLOAD_BYTES, MAX_UPLOAD_FILES, MediaFile,
        MediaFileView, MediaFilter, MediaListQuery, MediaSort, MediaThumbnail, MediaThumbnailView, MessageResponse,
        NewMediaFile, NewThumbnail, Page, Pagination, Role, ServeQuery, SortOrder, StatsResponse,
        ThumbnailsResponse, UpdateMediaRequest, UploadForm, UploadResponse, is_allowed_mime,
    },
    validation::{self, Validated},
};

const DEFAULT_MEDIA_PAGE_SIZE: i64 = 20;
const SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);
const PUBLIC_CACHE_CONTROL: &str = "public, max-age=31536000";
const PRIVATE_CACHE_CONTROL: &str = "private, no-store";

fn media_not_found() -> AppError {
    AppError::not_found("Media file")
}

fn can_view(viewer: Option<&AuthUser>, file: &MediaFile) -> bool {
    file.is_public || viewer.is_some_and(|user| user.can_manage(file.uploaded_by))
}

/// Objects of public files get their permanent URL, those of private ones a
/// short-lived signed URL.
async fn object_url(state: &AppState, key: &str, is_public: bool) -> AppResult<String> {
    if is_public {
        Ok(state.storage.public_url(key))
    } else {
        Ok(state.storage.signed_url(key, SIGNED_URL_TTL).await?)
    }
}

async fn to_view(state: &AppState, file: MediaFile) -> AppResult<MediaFileView> {
    let url = object_url(state, &file.file_path, file.is_public).await?;
    Ok(MediaFileView { file, url })
}

/// Thumbnails share the visibility of the file they were rendered from.
async fn thumbnail_views(
    state: &AppState,
    file: &MediaFile,
    thumbnails: Vec<MediaThumbnail>,
) -> AppResult<Vec<MediaThumbnailView>> {
    let mut views = Vec::with_capacity(thumbnails.len());
    for thumbnail in thumbnails {
        let url = object_url(state, &thumbnail.thumbnail_path, file.is_public).await?;
        views.push(MediaThumbnailView { thumbnail, url });
    }
    Ok(views)
}

async fn find_media(state: &AppState, id: Uuid) -> AppResult<MediaFile> {
    state.repo.get_media(id).await?.ok_or_else(media_not_found)
}

async fn managed_media(state: &AppState, user: &AuthUser, id: Uuid, action: &str) -> AppResult<MediaFile> {
    let file = find_media(state, id).await?;
    if !user.can_manage(file.uploaded_by) {
        return Err(AppError::Forbidden(format!("Not authorized to {action} this file")));
    }
    Ok(file)
}

fn blocking_failed(err: tokio::task::JoinError) -> AppError {
    AppError::Internal(format!("image task failed: {err}"))
}

/// Picks the stored extension: the client's, when it is plain alphanumeric, else one
/// derived from the MIME type.
fn extension_for(original: &str, mime: &str) -> String {
    let from_name = original
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name.unwrap_or_else(|| {
        match mime {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/ogg" | "audio/ogg" => "ogg",
            "audio/mpeg" => "mp3",
            "audio/wav" => "wav",
            "application/pdf" => "pdf",
            "text/plain" => "txt",
            "application/zip" => "zip",
            _ => "bin",
        }
        .to_string()
    })
}

/// list_media
///
/// [Public Route] Paged media library. Anonymous callers see public files, signed-in
/// users additionally their own uploads, editors everything.
#[utoipa::path(
    get,
    path = "/api/media",
    params(MediaListQuery),
    responses((status = 200, description = "Files", body = FilesResponse))
)]
pub async fn list_media(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Query(query): Query<MediaListQuery>,
) -> AppResult<Json<FilesResponse>> {
    let page = Page::new(query.page, Some(query.limit.unwrap_or(DEFAULT_MEDIA_PAGE_SIZE)));

    let mut filter = MediaFilter {
        file_type: query.file_type,
        uploaded_by: query.uploaded_by,
        search: query.search.filter(|s| !s.trim().is_empty()),
        sort_by: MediaSort::parse(query.sort_by.as_deref()),
        sort_order: SortOrder::parse(query.sort_order.as_deref()),
        ..MediaFilter::default()
    };
    match &viewer {
        None => filter.public_only = true,
        Some(user) if user.role.at_least(Role::Editor) => {}
        Some(user) => filter.visible_to = Some(user.id),
    }

    let (rows, total) = state.repo.list_media(filter, page).await?;
    let mut files = Vec::with_capacity(rows.len());
    for row in rows {
        files.push(to_view(&state, row).await?);
    }

    Ok(Json(FilesResponse {
        files,
        pagination: Pagination::new(page, total),
    }))
}

/// media_stats
///
/// [Public Route] File counts per type and total bytes stored.
#[utoipa::path(
    get,
    path = "/api/media/stats",
    responses((status = 200, description = "Library statistics", body = StatsResponse))
)]
pub async fn media_stats(
    State(state): State<AppState>,
) -> AppResult<Json<StatsResponse>> {
    let stats = state.repo.media_stats().await?;
    Ok(Json(StatsResponse { stats }))
}

/// get_media
#[utoipa::path(
    get,
    path = "/api/media/{id}",
    params(("id" = Uuid, Path, description = "Media file ID")),
    responses(
        (status = 200, description = "Found", body = FileResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_media(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<FileResponse>> {
    let file = find_media(&state, id).await?;
    if !can_view(viewer.as_ref(), &file) {
        return Err(media_not_found());
    }
    Ok(Json(FileResponse {
        file: to_view(&state, file).await?,
    }))
}

/// list_thumbnails
#[utoipa::path(
    get,
    path = "/api/media/{id}/thumbnails",
    params(("id" = Uuid, Path, description = "Media file ID")),
    responses(
        (status = 200, description = "Thumbnails, smallest first", body = ThumbnailsResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn list_thumbnails(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ThumbnailsResponse>> {
    let file = find_media(&state, id).await?;
    if !can_view(viewer.as_ref(), &file) {
        return Err(media_not_found());
    }

    let stored = state.repo.list_thumbnails(id).await?;
    let thumbnails = thumbnail_views(&state, &file, stored).await?;
    Ok(Json(ThumbnailsResponse { thumbnails }))
}

/// serve_media
///
/// [Public Route] Streams the stored bytes with the file's content type. Public files
/// may be cached for a year; private ones are never stored by caches. `?download=true`
/// adds an attachment disposition. Private files answer 404 to anyone but the
/// uploader and editors.
#[utoipa::path(
    get,
    path = "/api/media/{id}/serve",
    params(("id" = Uuid, Path, description = "Media file ID"), ServeQuery),
    responses(
        (status = 200, description = "Raw file content"),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn serve_media(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ServeQuery>,
) -> AppResult<Response> {
    let file = find_media(&state, id).await?;
    if !can_view(viewer.as_ref(), &file) {
        return Err(media_not_found());
    }

    let bytes = state.storage.get_object(&file.file_path).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &file.mime_type)
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CACHE_CONTROL,
            if file.is_public { PUBLIC_CACHE_CONTROL } else { PRIVATE_CACHE_CONTROL },
        );
    if query.download.unwrap_or(false) {
        let name = file.original_filename.replace(['"', '\\', '\r', '\n'], "_");
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        );
    }

    builder
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

struct IncomingFile {
    original_filename: String,
    mime_type: String,
    bytes: Vec<u8>,
}

/// Drains the multipart stream into the uploaded files and the shared form fields,
/// enforcing the count, size and MIME limits as it goes.
async fn read_upload(mut multipart: Multipart) -> AppResult<(Vec<IncomingFile>, UploadForm)> {
    let mut files = Vec::new();
    let mut form = UploadForm {
        is_public: true,
        ..UploadForm::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                if files.len() >= MAX_UPLOAD_FILES {
                    return Err(AppError::BadRequest(format!(
                        "Too many files (max {MAX_UPLOAD_FILES})"
                    )));
                }
                let original_filename = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !is_allowed_mime(&mime_type) {
                    return Err(AppError::BadRequest(format!(
                        "File type {mime_type} is not allowed"
                    )));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
                if bytes.len() > MAX_UPLOAD_BYTES {
                    return Err(AppError::BadRequest(format!(
                        "File {original_filename} exceeds the 50MB limit"
                    )));
                }
                files.push(IncomingFile {
                    original_filename,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            "altText" | "caption" | "isPublic" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read field {name}: {e}")))?;
                let value = value.trim().to_string();
                match name.as_str() {
                    "altText" => form.alt_text = Some(value).filter(|v| !v.is_empty()),
                    "caption" => form.caption = Some(value).filter(|v| !v.is_empty()),
                    _ => form.is_public = !value.eq_ignore_ascii_case("false"),
                }
            }
            _ => {}
        }
    }

    Ok((files, form))
}

/// upload_media
///
/// [Authenticated Route] Authors and above. Multipart field `files` (up to 10, 50MB
/// each) plus optional `altText`, `caption` and `isPublic` applied to the whole batch.
/// Image dimensions are recorded when the format can be probed.
#[utoipa::path(
    post,
    path = "/api/media/upload",
    request_body(content_type = "multipart/form-data", description = "files[], altText, caption, isPublic"),
    responses(
        (status = 201, description = "Stored", body = UploadResponse),
        (status = 400, description = "No files, too many, too large or disallowed type", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_media(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    user.require(Role::Author)?;

    let (incoming, form) = read_upload(multipart).await?;
    if incoming.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }
    validation::check(&form)?;

    let mut files = Vec::with_capacity(incoming.len());
    for upload in incoming {
        let file_type = FileType::from_mime(&upload.mime_type);
        let id = Uuid::new_v4();
        let filename = format!("{id}.{}", extension_for(&upload.original_filename, &upload.mime_type));
        let key = format!("media/{filename}");
        let file_size = upload.bytes.len() as i64;

        let (bytes, dims) = if file_type == FileType::Image {
            tokio::task::spawn_blocking(move || {
                let dims = imaging::dimensions(&upload.bytes);
                (upload.bytes, dims)
            })
            .await
            .map_err(blocking_failed)?
        } else {
            (upload.bytes, None)
        };

        state.storage.put_object(&key, bytes, &upload.mime_type).await?;

        let record = NewMediaFile {
            filename,
            original_filename: upload.original_filename,
            file_path: key.clone(),
            file_size,
            mime_type: upload.mime_type,
            file_type,
            width: dims.map(|(w, _)| w as i32),
            height: dims.map(|(_, h)| h as i32),
            uploaded_by: user.id,
            alt_text: form.alt_text.clone(),
            caption: form.caption.clone(),
            is_public: form.is_public,
        };
        let created = match state.repo.create_media(record).await {
            Ok(created) => created,
            Err(e) => {
                if let Err(cleanup) = state.storage.delete_object(&key).await {
                    tracing::warn!(key = %key, "Failed to remove orphaned object: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        tracing::info!(media_id = %created.id, key = %key, size = file_size, "Media uploaded");
        files.push(to_view(&state, created).await?);
    }

    Ok((StatusCode::CREATED, Json(UploadResponse { files })))
}

/// update_media
///
/// [Authenticated Route] Uploader or editor. Edits alt text, caption and visibility.
#[utoipa::path(
    put,
    path = "/api/media/{id}",
    params(("id" = Uuid, Path, description = "Media file ID")),
    request_body = UpdateMediaRequest,
    responses(
        (status = 200, description = "Updated", body = FileResponse),
        (status = 403, description = "Not the uploader", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_media(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateMediaRequest>,
) -> AppResult<Json<FileResponse>> {
    managed_media(&state, &user, id, "update").await?;
    let file = state
        .repo
        .update_media(id, payload)
        .await?
        .ok_or_else(media_not_found)?;
    Ok(Json(FileResponse {
        file: to_view(&state, file).await?,
    }))
}

/// delete_media
///
/// [Authenticated Route] Uploader or editor. Removes the stored object, its
/// thumbnails and the metadata row.
#[utoipa::path(
    delete,
    path = "/api/media/{id}",
    params(("id" = Uuid, Path, description = "Media file ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the uploader", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_media(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let file = managed_media(&state, &user, id, "delete").await?;

    for thumbnail in state.repo.list_thumbnails(id).await? {
        state.storage.delete_object(&thumbnail.thumbnail_path).await?;
    }
    state.storage.delete_object(&file.file_path).await?;
    state.repo.delete_media(id).await?;

    tracing::info!(media_id = %id, deleted_by = %user.id, "Media deleted");
    Ok(Json(MessageResponse::new("Media file deleted successfully")))
}

/// generate_thumbnails
///
/// [Authenticated Route] Uploader or editor, images only. Renders small, medium and
/// large JPEGs (bounded by 150, 300 and 600 pixels) and replaces any earlier set.
#[utoipa::path(
    post,
    path = "/api/media/{id}/thumbnails",
    params(("id" = Uuid, Path, description = "Media file ID")),
    responses(
        (status = 200, description = "Generated", body = ThumbnailsResponse),
        (status = 400, description = "Not an image", body = ErrorBody),
        (status = 403, description = "Not the uploader", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_thumbnails(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ThumbnailsResponse>> {
    let file = managed_media(&state, &user, id, "generate thumbnails for").await?;
    if file.file_type != FileType::Image {
        return Err(AppError::BadRequest(
            "Thumbnails can only be generated for images".to_string(),
        ));
    }

    let source = state.storage.get_object(&file.file_path).await?;
    let rendered = tokio::task::spawn_blocking(move || imaging::render_thumbnails(&source))
        .await
        .map_err(blocking_failed)?
        .map_err(|e| AppError::BadRequest(format!("Could not process image: {e}")))?;

    let mut records = Vec::with_capacity(rendered.len());
    for thumb in rendered {
        let key = format!("thumbnails/{}_{}.jpg", file.id, thumb.size.as_str());
        state.storage.put_object(&key, thumb.bytes, "image/jpeg").await?;
        records.push(NewThumbnail {
            media_file_id: file.id,
            thumbnail_path: key,
            width: thumb.width as i32,
            height: thumb.height as i32,
            size: thumb.size,
        });
    }

    let stored = state.repo.replace_thumbnails(id, records).await?;
    let thumbnails = thumbnail_views(&state, &file, stored).await?;

    tracing::info!(media_id = %id, "Thumbnails generated");
    Ok(Json(ThumbnailsResponse { thumbnails }))
}
