use async_trait::async_trait;
use uuid::Uuid;

use super::{PostgresRepository, RepoResult, SettingsRepository};
use crate::models::{BLOG_SETTINGS_ID, BlogSettings, DEFAULT_BLOG_DESCRIPTION, DEFAULT_BLOG_TITLE};

#[async_trait]
impl SettingsRepository for PostgresRepository {
    /// get_settings
    ///
    /// Seeds the default row on first read. `ON CONFLICT DO NOTHING` keeps concurrent
    /// first reads from racing.
    async fn get_settings(&self) -> RepoResult<BlogSettings> {
        sqlx::query(
            r#"
            INSERT INTO blog_settings (id, blog_title, blog_description)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(BLOG_SETTINGS_ID)
        .bind(DEFAULT_BLOG_TITLE)
        .bind(DEFAULT_BLOG_DESCRIPTION)
        .execute(&self.pool)
        .await?;

        let settings = sqlx::query_as::<_, BlogSettings>(
            "SELECT id, blog_title, blog_description, updated_by, updated_at FROM blog_settings WHERE id = $1",
        )
        .bind(BLOG_SETTINGS_ID)
        .fetch_one(&self.pool)
        .await?;
        Ok(settings)
    }

    async fn update_settings(
        &self,
        title: String,
        description: Option<String>,
        updated_by: Uuid,
    ) -> RepoResult<BlogSettings> {
        let settings = sqlx::query_as::<_, BlogSettings>(
            r#"
            INSERT INTO blog_settings (id, blog_title, blog_description, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE
            SET blog_title = EXCLUDED.blog_title,
                blog_description = EXCLUDED.blog_description,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING id, blog_title, blog_description, updated_by, updated_at
            "#,
        )
        .bind(BLOG_SETTINGS_ID)
        .bind(title)
        .bind(description)
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(settings)
    }
}
