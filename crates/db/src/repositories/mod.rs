use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use scrapbook_core::domain::scrap::{ConversationId, UserId};

pub mod memory;
pub mod scrap;

pub use memory::InMemoryScrapStore;
pub use scrap::SqlScrapStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait UserTokenRepository: Send + Sync {
    /// Inserts or replaces the access token issued to `user_id` at install time.
    async fn save_user_token(
        &self,
        user_id: &UserId,
        token: SecretString,
    ) -> Result<(), RepositoryError>;

    async fn get_user_token(&self, user_id: &UserId)
        -> Result<Option<SecretString>, RepositoryError>;
}

#[async_trait]
pub trait ScrapRepository: Send + Sync {
    /// Appends `text` to the list for the pair, creating the list on first use.
    async fn save_scrap(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<(), RepositoryError>;

    /// Scraps for the pair in insertion order; `None` if the pair never saved one.
    async fn list_scraps(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Option<Vec<String>>, RepositoryError>;
}

/// Everything the bot keeps: install tokens and scraps.
#[async_trait]
pub trait ScrapStore: UserTokenRepository + ScrapRepository {
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> Result<(), RepositoryError>;
}
