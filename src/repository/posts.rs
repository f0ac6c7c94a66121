use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{PostRepository, PostgresRepository, RepoResult, like_pattern};
use crate::models::{
    NewPost, Page, Post, PostChanges, PostFilter, PostStatus, PostStatusChange, PostSummary,
    PostVersion,
};

const POST_COLUMNS: &str = "id, author_id, title, slug, content, excerpt, featured_image_url, \
     meta_title, meta_description, status, scheduled_at, published_at, created_at, updated_at";

const SUMMARY_SELECT: &str = r#"
    SELECT p.id, p.author_id, p.title, p.slug, p.content, p.excerpt, p.featured_image_url,
           p.meta_title, p.meta_description, p.status, p.scheduled_at, p.published_at,
           p.created_at, p.updated_at,
           u.username AS author_username,
           u.first_name AS author_first_name,
           u.last_name AS author_last_name
    FROM posts p
    LEFT JOIN users u ON u.id = p.author_id
"#;

const VERSION_COLUMNS: &str =
    "id, post_id, version_number, title, content, excerpt, created_by, created_at";

/// Locks the post row for the rest of the transaction. Returns false when it does not exist.
async fn lock_post(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> RepoResult<bool> {
    let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

/// Records the post's current title/content/excerpt as the next version number.
/// The caller must hold the row lock taken by `lock_post`.
async fn insert_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
    created_by: Uuid,
) -> RepoResult<PostVersion> {
    let version = sqlx::query_as::<_, PostVersion>(&format!(
        r#"
        INSERT INTO post_versions (post_id, version_number, title, content, excerpt, created_by)
        SELECT p.id,
               COALESCE((SELECT MAX(v.version_number) FROM post_versions v WHERE v.post_id = p.id), 0) + 1,
               p.title, p.content, p.excerpt, $2
        FROM posts p
        WHERE p.id = $1
        RETURNING {VERSION_COLUMNS}
        "#
    ))
    .bind(post_id)
    .bind(created_by)
    .fetch_one(&mut **tx)
    .await?;
    Ok(version)
}

/// Replaces the category and/or tag links of a post. Unknown ids are ignored.
async fn replace_taxonomy(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
    category_ids: Option<&[Uuid]>,
    tag_ids: Option<&[Uuid]>,
) -> RepoResult<()> {
    if let Some(ids) = category_ids {
        sqlx::query("DELETE FROM post_categories WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            "INSERT INTO post_categories (post_id, category_id) \
             SELECT $1, id FROM categories WHERE id = ANY($2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?;
    }
    if let Some(ids) = tag_ids {
        sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            "INSERT INTO post_tags (post_id, tag_id) \
             SELECT $1, id FROM tags WHERE id = ANY($2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn push_post_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    builder.push(" WHERE 1 = 1");

    if filter.published_only {
        builder
            .push(" AND p.status = ")
            .push_bind(PostStatus::Published.as_str());
    } else if let Some(viewer) = filter.visible_to {
        builder
            .push(" AND (p.status = ")
            .push_bind(PostStatus::Published.as_str())
            .push(" OR p.author_id = ")
            .push_bind(viewer)
            .push(")");
    }

    if let Some(status) = filter.status {
        builder.push(" AND p.status = ").push_bind(status.as_str());
    }
    if let Some(author) = filter.author_id {
        builder.push(" AND p.author_id = ").push_bind(author);
    }
    if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(term);
        builder
            .push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.content ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.excerpt ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(slug) = &filter.category_slug {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM post_categories pc JOIN categories c ON c.id = pc.category_id \
                 WHERE pc.post_id = p.id AND c.slug = ",
            )
            .push_bind(slug.clone())
            .push(")");
    }
    if let Some(id) = filter.category_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM post_categories pc WHERE pc.post_id = p.id AND pc.category_id = ")
            .push_bind(id)
            .push(")");
    }
    if let Some(slug) = &filter.tag_slug {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id \
                 WHERE pt.post_id = p.id AND t.slug = ",
            )
            .push_bind(slug.clone())
            .push(")");
    }
    if let Some(id) = filter.tag_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ")
            .push_bind(id)
            .push(")");
    }
}

#[async_trait]
impl PostRepository for PostgresRepository {
    /// list_posts
    ///
    /// Builds the listing query with `QueryBuilder` so every user-provided value is bound,
    /// never interpolated. Sort columns come from a closed enum.
    async fn list_posts(&self, filter: PostFilter, page: Page) -> RepoResult<(Vec<PostSummary>, i64)> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(SUMMARY_SELECT);
        push_post_filters(&mut builder, &filter);
        builder
            .push(format!(
                " ORDER BY {} {} NULLS LAST, p.id",
                filter.sort_by.column(),
                filter.sort_order.as_sql()
            ))
            .push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let posts = builder
            .build_query_as::<PostSummary>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM posts p");
        push_post_filters(&mut count, &filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        Ok((posts, total))
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<PostSummary>> {
        let post = sqlx::query_as::<_, PostSummary>(&format!("{SUMMARY_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<PostSummary>> {
        let post = sqlx::query_as::<_, PostSummary>(&format!("{SUMMARY_SELECT} WHERE p.slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> RepoResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_post(
        &self,
        post: NewPost,
        category_ids: Vec<Uuid>,
        tag_ids: Vec<Uuid>,
    ) -> RepoResult<Post> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (author_id, title, slug, content, excerpt, featured_image_url,
                               meta_title, meta_description, status, scheduled_at, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(post.author_id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.featured_image_url)
        .bind(&post.meta_title)
        .bind(&post.meta_description)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .fetch_one(&mut *tx)
        .await?;

        replace_taxonomy(&mut tx, created.id, Some(category_ids.as_slice()), Some(tag_ids.as_slice()))
            .await?;
        insert_snapshot(&mut tx, created.id, post.author_id).await?;

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Ok(None);
        };
        let changes_content = changes.changes_content(&current);

        let updated = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                slug = COALESCE($3, slug),
                content = COALESCE($4, content),
                excerpt = COALESCE($5, excerpt),
                featured_image_url = COALESCE($6, featured_image_url),
                meta_title = COALESCE($7, meta_title),
                meta_description = COALESCE($8, meta_description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.slug)
        .bind(&changes.content)
        .bind(&changes.excerpt)
        .bind(&changes.featured_image_url)
        .bind(&changes.meta_title)
        .bind(&changes.meta_description)
        .fetch_one(&mut *tx)
        .await?;

        replace_taxonomy(&mut tx, id, category_ids.as_deref(), tag_ids.as_deref()).await?;
        if changes_content {
            insert_snapshot(&mut tx, id, editor).await?;
        }

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// set_post_status
    ///
    /// Writes a lifecycle transition in one statement. `published_at` is only ever
    /// filled in, never cleared or moved.
    async fn set_post_status(&self, id: Uuid, change: PostStatusChange) -> RepoResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET status = $2,
                scheduled_at = $3,
                published_at = COALESCE(published_at, $4),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(change.status.as_str())
        .bind(change.scheduled_at)
        .bind(change.published_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn list_drafts(&self, author_id: Uuid) -> RepoResult<Vec<Post>> {
        let drafts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE author_id = $1 AND status = 'draft' ORDER BY updated_at DESC"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(drafts)
    }

    async fn list_versions(&self, post_id: Uuid) -> RepoResult<Vec<PostVersion>> {
        let versions = sqlx::query_as::<_, PostVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM post_versions WHERE post_id = $1 ORDER BY version_number DESC"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(versions)
    }

    async fn get_version(&self, post_id: Uuid, number: i32) -> RepoResult<Option<PostVersion>> {
        let version = sqlx::query_as::<_, PostVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM post_versions WHERE post_id = $1 AND version_number = $2"
        ))
        .bind(post_id)
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    async fn create_version(&self, post_id: Uuid, created_by: Uuid) -> RepoResult<Option<PostVersion>> {
        let mut tx = self.pool.begin().await?;
        if !lock_post(&mut tx, post_id).await? {
            return Ok(None);
        }
        let version = insert_snapshot(&mut tx, post_id, created_by).await?;
        tx.commit().await?;
        Ok(Some(version))
    }

    async fn restore_version(
        &self,
        post_id: Uuid,
        number: i32,
        restored_by: Uuid,
    ) -> RepoResult<Option<Post>> {
        let mut tx = self.pool.begin().await?;
        if !lock_post(&mut tx, post_id).await? {
            return Ok(None);
        }

        let restored = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts p
            SET title = v.title, content = v.content, excerpt = v.excerpt, updated_at = NOW()
            FROM post_versions v
            WHERE p.id = $1 AND v.post_id = p.id AND v.version_number = $2
            RETURNING p.id, p.author_id, p.title, p.slug, p.content, p.excerpt, p.featured_image_url,
                      p.meta_title, p.meta_description, p.status, p.scheduled_at, p.published_at,
                      p.created_at, p.updated_at
            "#,
        )
        .bind(post_id)
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(post) = restored else {
            return Ok(None);
        };

        insert_snapshot(&mut tx, post_id, restored_by).await?;
        tx.commit().await?;
        Ok(Some(post))
    }

    async fn list_due_posts(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE status = 'scheduled' AND scheduled_at <= $1 \
             ORDER BY scheduled_at ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// publish_due_posts
    ///
    /// A single `UPDATE … RETURNING`, so concurrent triggers (endpoint and cron job)
    /// can never publish the same post twice.
    async fn publish_due_posts(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET status = 'published',
                published_at = COALESCE(published_at, $1),
                scheduled_at = NULL,
                updated_at = NOW()
            WHERE status = 'scheduled' AND scheduled_at <= $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}
