use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{CommentRepository, PostgresRepository, RepoResult};
use crate::models::{
    Comment, CommentFilter, CommentStatus, CommentView, Liker, ModerationAction, ModerationRecord,
    NewComment, Page,
};

const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author_id, author_name, author_email, \
     author_website, content, status, ip_address, user_agent, is_anonymous, created_at, updated_at";

/// Starts a `CommentView` select. Likes are attributed to a user id when signed in,
/// otherwise to the anonymous client's IP.
fn view_select(liker: Option<&Liker>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        r#"
        SELECT c.id, c.post_id, c.parent_id, c.author_id, c.author_name, c.author_email,
               c.author_website, c.content, c.status, c.ip_address, c.user_agent, c.is_anonymous,
               c.created_at, c.updated_at,
               u.username AS author_username,
               (SELECT COUNT(*) FROM comment_likes cl WHERE cl.comment_id = c.id) AS like_count,
        "#,
    );

    match liker {
        Some(Liker::User(user_id)) => {
            builder
                .push("EXISTS(SELECT 1 FROM comment_likes cl WHERE cl.comment_id = c.id AND cl.user_id = ")
                .push_bind(*user_id)
                .push(") AS is_liked");
        }
        Some(Liker::Ip(ip)) => {
            builder
                .push(
                    "EXISTS(SELECT 1 FROM comment_likes cl WHERE cl.comment_id = c.id \
                     AND cl.user_id IS NULL AND cl.ip_address = ",
                )
                .push_bind(ip.clone())
                .push(") AS is_liked");
        }
        None => {
            builder.push("FALSE AS is_liked");
        }
    }

    builder.push(" FROM comments c LEFT JOIN users u ON u.id = c.author_id");
    builder
}

fn push_comment_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CommentFilter) {
    builder
        .push(" WHERE c.status = ")
        .push_bind(filter.status.as_str());
    if let Some(post_id) = filter.post_id {
        builder.push(" AND c.post_id = ").push_bind(post_id);
    }
    if let Some(parent_id) = filter.parent_id {
        builder.push(" AND c.parent_id = ").push_bind(parent_id);
    }
    if let Some(author_id) = filter.author_id {
        builder.push(" AND c.author_id = ").push_bind(author_id);
    }
}

#[async_trait]
impl CommentRepository for PostgresRepository {
    async fn list_comments(
        &self,
        filter: CommentFilter,
        liker: Option<Liker>,
        page: Page,
    ) -> RepoResult<(Vec<CommentView>, i64)> {
        let mut builder = view_select(liker.as_ref());
        push_comment_filters(&mut builder, &filter);
        builder
            .push(format!(
                " ORDER BY {} {}, c.id",
                filter.sort_by.column(),
                filter.sort_order.as_sql()
            ))
            .push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let comments = builder
            .build_query_as::<CommentView>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM comments c");
        push_comment_filters(&mut count, &filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        Ok((comments, total))
    }

    async fn get_comment(&self, id: Uuid, liker: Option<Liker>) -> RepoResult<Option<CommentView>> {
        let mut builder = view_select(liker.as_ref());
        builder.push(" WHERE c.id = ").push_bind(id);
        let comment = builder
            .build_query_as::<CommentView>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        let created = sqlx::query_as::<_, Comment>(&format!(
            r#"
            INSERT INTO comments (post_id, parent_id, author_id, author_name, author_email,
                                  author_website, content, status, ip_address, user_agent, is_anonymous)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COMMENT_COLUMNS}
            "#
        ))
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(comment.author_id)
        .bind(&comment.author_name)
        .bind(&comment.author_email)
        .bind(&comment.author_website)
        .bind(&comment.content)
        .bind(comment.status.as_str())
        .bind(&comment.ip_address)
        .bind(&comment.user_agent)
        .bind(comment.is_anonymous)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_comment(&self, id: Uuid, content: String) -> RepoResult<Option<Comment>> {
        let updated = sqlx::query_as::<_, Comment>(&format!(
            "UPDATE comments SET content = $2, updated_at = NOW() WHERE id = $1 RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_comment_status(&self, id: Uuid, status: CommentStatus) -> RepoResult<Option<Comment>> {
        let updated = sqlx::query_as::<_, Comment>(&format!(
            "UPDATE comments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn like_count(&self, id: Uuid) -> RepoResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comment_likes WHERE comment_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// toggle_like
    ///
    /// Deletes the caller's like if one exists, otherwise inserts it. Both steps run in
    /// one transaction.
    async fn toggle_like(&self, id: Uuid, liker: Liker) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        let (user_id, ip_address) = match liker {
            Liker::User(user_id) => (Some(user_id), None),
            Liker::Ip(ip) => (None, Some(ip)),
        };

        let removed = sqlx::query(
            r#"
            DELETE FROM comment_likes
            WHERE comment_id = $1
              AND (($2::uuid IS NOT NULL AND user_id = $2)
                   OR ($2::uuid IS NULL AND user_id IS NULL AND ip_address = $3))
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&ip_address)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            sqlx::query("INSERT INTO comment_likes (comment_id, user_id, ip_address) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(user_id)
                .bind(&ip_address)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(removed == 0)
    }

    async fn record_moderation(
        &self,
        comment_id: Uuid,
        moderator_id: Uuid,
        action: ModerationAction,
        reason: Option<String>,
    ) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO comment_moderation (comment_id, moderator_id, action, reason) VALUES ($1, $2, $3, $4)",
        )
        .bind(comment_id)
        .bind(moderator_id)
        .bind(action.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn moderation_history(&self, comment_id: Uuid) -> RepoResult<Vec<ModerationRecord>> {
        let records = sqlx::query_as::<_, ModerationRecord>(
            r#"
            SELECT cm.id, cm.comment_id, cm.moderator_id, u.username AS moderator_username,
                   cm.action, cm.reason, cm.created_at
            FROM comment_moderation cm
            LEFT JOIN users u ON u.id = cm.moderator_id
            WHERE cm.comment_id = $1
            ORDER BY cm.created_at DESC
            "#,
        )
        .bind(comment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
