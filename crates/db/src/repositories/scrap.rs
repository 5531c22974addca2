use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;

use scrapbook_core::domain::scrap::{ConversationId, UserId};

use super::{RepositoryError, ScrapRepository, ScrapStore, UserTokenRepository};
use crate::DbPool;

pub struct SqlScrapStore {
    pool: DbPool,
}

impl SqlScrapStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserTokenRepository for SqlScrapStore {
    async fn save_user_token(
        &self,
        user_id: &UserId,
        token: SecretString,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_token (user_id, token, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET token = excluded.token, updated_at = excluded.updated_at",
        )
        .bind(user_id.as_str())
        .bind(token.expose_secret())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_token(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SecretString>, RepositoryError> {
        let row = sqlx::query("SELECT token FROM user_token WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            row.try_get::<String, _>("token")
                .map(SecretString::from)
                .map_err(|e| RepositoryError::Decode(e.to_string()))
        })
        .transpose()
    }
}

#[async_trait::async_trait]
impl ScrapRepository for SqlScrapStore {
    async fn save_scrap(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO scrap (user_id, conversation_id, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id.as_str())
        .bind(conversation_id.as_str())
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_scraps(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Option<Vec<String>>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT body FROM scrap WHERE user_id = ? AND conversation_id = ? ORDER BY seq ASC",
        )
        .bind(user_id.as_str())
        .bind(conversation_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("body").map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

#[async_trait::async_trait]
impl ScrapStore for SqlScrapStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
