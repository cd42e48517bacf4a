use ns_client::Session;
use ns_core::{AuthToken, Credentials, NewsApi, Registration, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::mutation::TopicMutations;
use crate::store::{QueryStore, StoreConfig};

/// Ties the gateway, the shared cache and the session together.
///
/// The cache never outlives the session it was filled under: logging in,
/// logging out and a 401 teardown all reset it.
#[derive(Clone)]
pub struct QueryClient {
    api: Arc<dyn NewsApi>,
    store: QueryStore,
    session: Session,
}

impl QueryClient {
    pub fn new(api: Arc<dyn NewsApi>, session: Session, config: StoreConfig) -> Self {
        Self {
            api,
            store: QueryStore::new(config),
            session,
        }
    }

    pub fn api(&self) -> &Arc<dyn NewsApi> {
        &self.api
    }

    pub fn store(&self) -> &QueryStore {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn topic_mutations(&self) -> TopicMutations {
        TopicMutations::new(self.api.clone(), self.store.clone())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthToken> {
        let token = self
            .api
            .login(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.start(&token);
        Ok(token)
    }

    pub async fn register(&self, email: &str, password: &str, name: Option<&str>) -> Result<AuthToken> {
        let token = self
            .api
            .register(&Registration {
                email: email.to_string(),
                password: password.to_string(),
                name: name.map(str::to_string),
            })
            .await?;
        self.start(&token);
        Ok(token)
    }

    /// Swaps in the new session. Views mounted across the switch are
    /// reloaded under the new token.
    fn start(&self, token: &AuthToken) {
        self.store.clear();
        self.session.begin(token);
        self.store.refetch_mounted();
    }

    pub fn logout(&self) {
        self.session.logout();
        self.store.clear();
    }

    /// Clears the cache whenever the session ends, including the teardown
    /// the gateway performs on a 401. The task ends with the session.
    pub fn watch_session(&self) -> JoinHandle<()> {
        let mut events = self.session.subscribe();
        let store = self.store.clone();
        tokio::spawn(async move {
            while events.changed().await.is_ok() {
                let state = *events.borrow_and_update();
                if state.requires_login() {
                    info!("🧹 Session ended ({:?}), dropping cached queries", state);
                    store.clear();
                } else {
                    debug!("🔑 Session state {:?}", state);
                }
            }
        })
    }

    pub fn requires_login(&self) -> bool {
        !self.session.is_authenticated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries;
    use ns_client::{InMemoryApi, SessionState};
    use ns_core::Error;
    use std::time::Duration;

    async fn client() -> (Arc<InMemoryApi>, QueryClient) {
        let session = Session::new();
        let api = Arc::new(InMemoryApi::seeded(session.clone()).await);
        let client = QueryClient::new(api.clone(), session, StoreConfig::default());
        (api, client)
    }

    #[tokio::test]
    async fn test_login_starts_session() {
        let (_, client) = client().await;
        assert!(client.requires_login());
        assert_eq!(
            client.login("demo@example.com", "nope").await.unwrap_err(),
            Error::Unauthorized
        );
        client.login("demo@example.com", "demo").await.unwrap();
        assert!(!client.requires_login());

        let topics = client.store().fetch(queries::topics(client.api())).await.unwrap();
        assert_eq!(topics.len(), 1);

        client.logout();
        assert!(client.store().is_empty());
        assert!(client.requires_login());
    }

    #[tokio::test]
    async fn test_register_then_use() {
        let (_, client) = client().await;
        client.register("new@example.com", "pw", Some("New")).await.unwrap();
        assert!(client.session().is_authenticated());
        assert!(matches!(
            client.register("new@example.com", "pw", None).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_mounted_view_reloads_after_login() {
        let (api, client) = client().await;
        client.login("demo@example.com", "demo").await.unwrap();
        let mut observer = client.store().observe(queries::topics(client.api()));
        assert_eq!(observer.settled().await.unwrap().data.unwrap().len(), 1);

        client.logout();
        assert!(observer.current().data.is_none());

        client.login("demo@example.com", "demo").await.unwrap();
        let state = observer.settled().await.unwrap();
        assert_eq!(state.data.unwrap().len(), 1);
        assert_eq!(api.calls("list_topics"), 2);
    }

    #[tokio::test]
    async fn test_teardown_clears_cache() {
        let (api, client) = client().await;
        client.login("demo@example.com", "demo").await.unwrap();
        let watcher = client.watch_session();
        client.store().fetch(queries::topics(client.api())).await.unwrap();
        assert_eq!(client.store().len(), 1);

        api.revoke_tokens().await;
        let err = client.store().fetch(queries::source(client.api(), 1)).await.unwrap_err();
        assert_eq!(err, Error::Unauthorized);
        assert_eq!(client.session().state(), SessionState::Expired);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !client.store().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        watcher.abort();
    }
}
