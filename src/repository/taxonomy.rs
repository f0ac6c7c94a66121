use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{PostgresRepository, RepoResult, TaxonomyRepository, like_pattern};
use crate::models::{
    Category, CreateCategoryRequest, CreateTagRequest, Tag, TaxonomyFilter, UpdateCategoryRequest,
    UpdateTagRequest,
};

const CATEGORY_SELECT: &str = r#"
    SELECT * FROM (
        SELECT c.id, c.name, c.slug, c.description, c.color, c.parent_id, c.created_at, c.updated_at,
               (SELECT COUNT(*) FROM post_categories pc WHERE pc.category_id = c.id) AS post_count
        FROM categories c
    ) t
"#;

const TAG_SELECT: &str = r#"
    SELECT * FROM (
        SELECT g.id, g.name, g.slug, g.description, g.created_at, g.updated_at,
               (SELECT COUNT(*) FROM post_tags pt WHERE pt.tag_id = g.id) AS post_count
        FROM tags g
    ) t
"#;

/// Appends the shared search / order / limit clauses to a taxonomy listing.
fn push_listing(builder: &mut QueryBuilder<'_, Postgres>, filter: &TaxonomyFilter) {
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        builder
            .push(" WHERE (t.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR t.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    builder.push(format!(
        " ORDER BY t.{} {}, t.name ASC",
        filter.sort_by.column(),
        filter.sort_order.as_sql()
    ));
    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ").push_bind(limit);
    }
}

#[async_trait]
impl TaxonomyRepository for PostgresRepository {
    async fn list_categories(&self, filter: TaxonomyFilter) -> RepoResult<Vec<Category>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(CATEGORY_SELECT);
        push_listing(&mut builder, &filter);
        let categories = builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(&format!("{CATEGORY_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(&format!("{CATEGORY_SELECT} WHERE t.slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    /// create_category
    ///
    /// Duplicate names or slugs violate the unique indexes and come back as
    /// `RepoError::Conflict`.
    async fn create_category(&self, req: CreateCategoryRequest, slug: String) -> RepoResult<Category> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO categories (name, slug, description, color, parent_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(req.name.trim())
        .bind(&slug)
        .bind(&req.description)
        .bind(&req.color)
        .bind(req.parent_id)
        .fetch_one(&self.pool)
        .await?;

        self.get_category(id).await?.ok_or(crate::error::RepoError::NotFound)
    }

    async fn update_category(
        &self,
        id: Uuid,
        req: UpdateCategoryRequest,
    ) -> RepoResult<Option<Category>> {
        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE categories
            SET name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                color = COALESCE($5, color),
                parent_id = COALESCE($6, parent_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.slug)
        .bind(&req.description)
        .bind(&req.color)
        .bind(req.parent_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.get_category(id).await,
            None => Ok(None),
        }
    }

    async fn delete_category(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tags(&self, filter: TaxonomyFilter) -> RepoResult<Vec<Tag>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(TAG_SELECT);
        push_listing(&mut builder, &filter);
        let tags = builder.build_query_as::<Tag>().fetch_all(&self.pool).await?;
        Ok(tags)
    }

    async fn get_tag(&self, id: Uuid) -> RepoResult<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>(&format!("{TAG_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tag)
    }

    async fn get_tag_by_slug(&self, slug: &str) -> RepoResult<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>(&format!("{TAG_SELECT} WHERE t.slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tag)
    }

    async fn create_tag(&self, req: CreateTagRequest, slug: String) -> RepoResult<Tag> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO tags (name, slug, description) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(req.name.trim())
        .bind(&slug)
        .bind(&req.description)
        .fetch_one(&self.pool)
        .await?;

        self.get_tag(id).await?.ok_or(crate::error::RepoError::NotFound)
    }

    async fn update_tag(&self, id: Uuid, req: UpdateTagRequest) -> RepoResult<Option<Tag>> {
        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE tags
            SET name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.slug)
        .bind(&req.description)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.get_tag(id).await,
            None => Ok(None),
        }
    }

    async fn delete_tag(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn categories_for_post(&self, post_id: Uuid) -> RepoResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "{CATEGORY_SELECT} WHERE t.id IN (SELECT category_id FROM post_categories WHERE post_id = $1) \
             ORDER BY t.name"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn tags_for_post(&self, post_id: Uuid) -> RepoResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(&format!(
            "{TAG_SELECT} WHERE t.id IN (SELECT tag_id FROM post_tags WHERE post_id = $1) ORDER BY t.name"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }
}
