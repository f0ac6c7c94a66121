use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{MediaRepository, PostgresRepository, RepoResult, like_pattern};
use crate::models::{
    MediaFile, MediaFilter, MediaStats, MediaThumbnail, NewMediaFile, NewThumbnail, Page,
    UpdateMediaRequest,
};

const MEDIA_COLUMNS: &str = "id, filename, original_filename, file_path, file_size, mime_type, \
     file_type, width, height, uploaded_by, alt_text, caption, is_public, created_at, updated_at";

const THUMBNAIL_COLUMNS: &str = "id, media_file_id, thumbnail_path, width, height, size, created_at";

fn push_media_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &MediaFilter) {
    builder.push(" WHERE 1 = 1");
    if filter.public_only {
        builder.push(" AND is_public = TRUE");
    } else if let Some(viewer) = filter.visible_to {
        builder
            .push(" AND (is_public = TRUE OR uploaded_by = ")
            .push_bind(viewer)
            .push(")");
    }
    if let Some(file_type) = filter.file_type {
        builder.push(" AND file_type = ").push_bind(file_type.as_str());
    }
    if let Some(uploader) = filter.uploaded_by {
        builder.push(" AND uploaded_by = ").push_bind(uploader);
    }
    if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(term);
        builder
            .push(" AND (original_filename ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR alt_text ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR caption ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl MediaRepository for PostgresRepository {
    async fn list_media(&self, filter: MediaFilter, page: Page) -> RepoResult<(Vec<MediaFile>, i64)> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {MEDIA_COLUMNS} FROM media_files"));
        push_media_filters(&mut builder, &filter);
        builder
            .push(format!(
                " ORDER BY {} {}, id",
                filter.sort_by.column(),
                filter.sort_order.as_sql()
            ))
            .push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let files = builder
            .build_query_as::<MediaFile>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM media_files");
        push_media_filters(&mut count, &filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        Ok((files, total))
    }

    async fn get_media(&self, id: Uuid) -> RepoResult<Option<MediaFile>> {
        let file = sqlx::query_as::<_, MediaFile>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_files WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(file)
    }

    async fn create_media(&self, file: NewMediaFile) -> RepoResult<MediaFile> {
        let created = sqlx::query_as::<_, MediaFile>(&format!(
            r#"
            INSERT INTO media_files (filename, original_filename, file_path, file_size, mime_type,
                                     file_type, width, height, uploaded_by, alt_text, caption, is_public)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {MEDIA_COLUMNS}
            "#
        ))
        .bind(&file.filename)
        .bind(&file.original_filename)
        .bind(&file.file_path)
        .bind(file.file_size)
        .bind(&file.mime_type)
        .bind(file.file_type.as_str())
        .bind(file.width)
        .bind(file.height)
        .bind(file.uploaded_by)
        .bind(&file.alt_text)
        .bind(&file.caption)
        .bind(file.is_public)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_media(&self, id: Uuid, req: UpdateMediaRequest) -> RepoResult<Option<MediaFile>> {
        let updated = sqlx::query_as::<_, MediaFile>(&format!(
            r#"
            UPDATE media_files
            SET alt_text = COALESCE($2, alt_text),
                caption = COALESCE($3, caption),
                is_public = COALESCE($4, is_public),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MEDIA_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&req.alt_text)
        .bind(&req.caption)
        .bind(req.is_public)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_media(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM media_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn media_stats(&self) -> RepoResult<MediaStats> {
        let stats = sqlx::query_as::<_, MediaStats>(
            r#"
            SELECT COUNT(*) AS total_files,
                   COALESCE(SUM(file_size), 0)::BIGINT AS total_size,
                   COUNT(*) FILTER (WHERE file_type = 'image') AS image_count,
                   COUNT(*) FILTER (WHERE file_type = 'video') AS video_count,
                   COUNT(*) FILTER (WHERE file_type = 'audio') AS audio_count,
                   COUNT(*) FILTER (WHERE file_type = 'document') AS document_count
            FROM media_files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn list_thumbnails(&self, media_id: Uuid) -> RepoResult<Vec<MediaThumbnail>> {
        let thumbnails = sqlx::query_as::<_, MediaThumbnail>(&format!(
            "SELECT {THUMBNAIL_COLUMNS} FROM media_thumbnails WHERE media_file_id = $1 ORDER BY width"
        ))
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(thumbnails)
    }

    async fn replace_thumbnails(
        &self,
        media_id: Uuid,
        thumbnails: Vec<NewThumbnail>,
    ) -> RepoResult<Vec<MediaThumbnail>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM media_thumbnails WHERE media_file_id = $1")
            .bind(media_id)
            .execute(&mut *tx)
            .await?;

        let mut created = Vec::with_capacity(thumbnails.len());
        for thumb in thumbnails {
            let row = sqlx::query_as::<_, MediaThumbnail>(&format!(
                r#"
                INSERT INTO media_thumbnails (media_file_id, thumbnail_path, width, height, size)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {THUMBNAIL_COLUMNS}
                "#
            ))
            .bind(thumb.media_file_id)
            .bind(&thumb.thumbnail_path)
            .bind(thumb.width)
            .bind(thumb.height)
            .bind(thumb.size.as_str())
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }
}
