use std::collections::HashMap;

use secrecy::SecretString;
use tokio::sync::RwLock;

use scrapbook_core::domain::scrap::{ConversationId, ScrapKey, UserId};

use super::{RepositoryError, ScrapRepository, ScrapStore, UserTokenRepository};

/// Process-lifetime store. Each map sits behind its own lock, so an append and a
/// read on the same key never interleave.
#[derive(Default)]
pub struct InMemoryScrapStore {
    tokens: RwLock<HashMap<UserId, SecretString>>,
    scraps: RwLock<HashMap<ScrapKey, Vec<String>>>,
}

impl InMemoryScrapStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserTokenRepository for InMemoryScrapStore {
    async fn save_user_token(
        &self,
        user_id: &UserId,
        token: SecretString,
    ) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(user_id.clone(), token);
        Ok(())
    }

    async fn get_user_token(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SecretString>, RepositoryError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(user_id).cloned())
    }
}

#[async_trait::async_trait]
impl ScrapRepository for InMemoryScrapStore {
    async fn save_scrap(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<(), RepositoryError> {
        let mut scraps = self.scraps.write().await;
        scraps
            .entry(ScrapKey::new(user_id.clone(), conversation_id.clone()))
            .or_default()
            .push(text.to_owned());
        Ok(())
    }

    async fn list_scraps(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Option<Vec<String>>, RepositoryError> {
        let scraps = self.scraps.read().await;
        let key = ScrapKey::new(user_id.clone(), conversation_id.clone());
        Ok(scraps.get(&key).cloned())
    }
}

#[async_trait::async_trait]
impl ScrapStore for InMemoryScrapStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use secrecy::ExposeSecret;

    use scrapbook_core::domain::scrap::{ConversationId, UserId};

    use crate::repositories::{InMemoryScrapStore, ScrapRepository, UserTokenRepository};

    #[tokio::test]
    async fn last_saved_token_wins() {
        let store = InMemoryScrapStore::new();
        let user = UserId::from("u:alice");

        store.save_user_token(&user, "token-1".to_string().into()).await.expect("save token");
        store.save_user_token(&user, "token-2".to_string().into()).await.expect("save token");

        let token = store.get_user_token(&user).await.expect("get token").expect("token present");
        assert_eq!(token.expose_secret(), "token-2");
    }

    #[tokio::test]
    async fn unknown_user_has_no_token() {
        let store = InMemoryScrapStore::new();

        let token = store.get_user_token(&UserId::from("u:nobody")).await.expect("get token");
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn scraps_keep_append_order() {
        let store = InMemoryScrapStore::new();
        let user = UserId::from("u:alice");
        let chat = ConversationId::from("g:team");

        store.save_scrap(&user, &chat, "first").await.expect("save");
        store.save_scrap(&user, &chat, "second").await.expect("save");

        let scraps = store.list_scraps(&user, &chat).await.expect("list");
        assert_eq!(scraps, Some(vec!["first".to_string(), "second".to_string()]));
    }

    #[tokio::test]
    async fn unknown_pair_lists_nothing() {
        let store = InMemoryScrapStore::new();

        let scraps = store
            .list_scraps(&UserId::from("u:alice"), &ConversationId::from("g:team"))
            .await
            .expect("list should not fail for unknown pairs");
        assert_eq!(scraps, None);
    }

    #[tokio::test]
    async fn scraps_are_scoped_to_user_and_conversation() {
        let store = InMemoryScrapStore::new();
        let alice = UserId::from("u:alice");
        let bob = UserId::from("u:bob");
        let team = ConversationId::from("g:team");
        let direct = ConversationId::from("u:bob");

        store.save_scrap(&alice, &team, "alice in team").await.expect("save");
        store.save_scrap(&bob, &team, "bob in team").await.expect("save");
        store.save_scrap(&alice, &direct, "alice to bob").await.expect("save");

        assert_eq!(
            store.list_scraps(&alice, &team).await.expect("list"),
            Some(vec!["alice in team".to_string()])
        );
        assert_eq!(
            store.list_scraps(&bob, &team).await.expect("list"),
            Some(vec!["bob in team".to_string()])
        );
        assert_eq!(
            store.list_scraps(&alice, &direct).await.expect("list"),
            Some(vec!["alice to bob".to_string()])
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_all_kept() {
        let store = Arc::new(InMemoryScrapStore::new());
        let user = UserId::from("u:alice");
        let chat = ConversationId::from("g:team");

        let mut handles = Vec::new();
        for index in 0..32 {
            let store = Arc::clone(&store);
            let user = user.clone();
            let chat = chat.clone();
            handles.push(tokio::spawn(async move {
                store.save_scrap(&user, &chat, &format!("scrap-{index}")).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("save");
        }

        let scraps = store.list_scraps(&user, &chat).await.expect("list").expect("present");
        assert_eq!(scraps.len(), 32);
    }
}
