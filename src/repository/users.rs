use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{PostgresRepository, RepoResult, UserRepository, like_pattern};
use crate::models::{
    NewUser, Page, ProfileView, Role, UpdateProfileRequest, UpdateUserRequest, User, UserProfile,
};

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, role, \
     avatar_url, bio, is_active, email_verified, asgardeo_user_id, created_at, updated_at";

impl PostgresRepository {
    async fn load_profile(&self, user: User) -> RepoResult<ProfileView> {
        let profile = sqlx::query_as::<_, UserProfile>(
            "SELECT website, social_links, preferences FROM user_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or_default();

        Ok(ProfileView { user, profile })
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_asgardeo_id(&self, subject: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE asgardeo_user_id = $1"
        ))
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_exists(&self, email: &str, username: &str) -> RepoResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn username_taken(&self, username: &str) -> RepoResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    /// create_user
    ///
    /// Inserts an account. Email and username uniqueness violations surface as
    /// `RepoError::Conflict`.
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, password_hash, first_name, last_name, role,
                               email_verified, asgardeo_user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.email_verified)
        .bind(&user.asgardeo_user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn link_asgardeo_account(&self, id: Uuid, subject: &str) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET asgardeo_user_id = $2, email_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(subject)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    /// list_users
    ///
    /// Paged listing with optional role filter and case-insensitive search over
    /// email, username and names.
    async fn list_users(
        &self,
        role: Option<Role>,
        search: Option<String>,
        page: Page,
    ) -> RepoResult<(Vec<User>, i64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, role: Option<Role>, search: &Option<String>) {
            builder.push(" WHERE 1 = 1");
            if let Some(role) = role {
                builder.push(" AND role = ").push_bind(role.as_str());
            }
            if let Some(term) = search.as_deref().filter(|s| !s.trim().is_empty()) {
                let pattern = like_pattern(term);
                builder
                    .push(" AND (email ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR username ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR first_name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR last_name ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filters(&mut builder, role, &search);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let users = builder.build_query_as::<User>().fetch_all(&self.pool).await?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count, role, &search);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        Ok((users, total))
    }

    async fn get_profile(&self, user_id: Uuid) -> RepoResult<Option<ProfileView>> {
        match self.get_user(user_id).await? {
            Some(user) => Ok(Some(self.load_profile(user).await?)),
            None => Ok(None),
        }
    }

    /// update_profile
    ///
    /// Writes the account columns and upserts the `user_profiles` extension row in one
    /// transaction.
    async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> RepoResult<Option<ProfileView>> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, bio = $4, avatar_url = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(&req.bio)
        .bind(&req.avatar_url)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            return Ok(None);
        };

        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (user_id, website, social_links, preferences)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET website = EXCLUDED.website,
                social_links = EXCLUDED.social_links,
                preferences = EXCLUDED.preferences,
                updated_at = NOW()
            RETURNING website, social_links, preferences
            "#,
        )
        .bind(user_id)
        .bind(&req.website)
        .bind(&req.social_links)
        .bind(&req.preferences)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(ProfileView { user, profile }))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, role = $4, is_active = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(req.role.as_str())
        .bind(req.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        sqlx::query("INSERT INTO user_sessions (user_id, token_id, expires_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(token_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn session_active(&self, token_id: Uuid) -> RepoResult<bool> {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_sessions WHERE token_id = $1 AND expires_at > NOW())",
        )
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(active)
    }

    async fn delete_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
