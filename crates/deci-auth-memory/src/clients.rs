use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use deci_auth::AuthResult;
use deci_auth::storage::ClientStorage;
use deci_auth::types::Client;

/// A fixed set of clients layered over another client store.
///
/// Lookups hit the static set first and fall through to `inner` for any
/// other id, so configuration-defined clients always win.
pub struct StaticClients {
    clients: HashMap<String, Client>,
    inner: Arc<dyn ClientStorage>,
}

impl StaticClients {
    pub fn new(clients: impl IntoIterator<Item = Client>, inner: Arc<dyn ClientStorage>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
            inner,
        }
    }

    /// Ids of the static clients.
    pub fn client_ids(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

#[async_trait]
impl ClientStorage for StaticClients {
    async fn get_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        if let Some(client) = self.clients.get(client_id) {
            return Ok(Some(client.clone()));
        }
        self.inner.get_client(client_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    fn client(id: &str, name: &str) -> Client {
        Client::new(id, None, name, vec!["http://127.0.0.1:5555/callback".to_string()])
    }

    #[tokio::test]
    async fn test_static_clients_take_precedence() {
        let inner = Arc::new(MemoryStorage::with_clients([
            client("example-app", "Stored"),
            client("other", "Other"),
        ]));
        let clients = StaticClients::new([client("example-app", "Static")], inner);

        let found = clients.get_client("example-app").await.unwrap().unwrap();
        assert_eq!(found.name, "Static");

        let found = clients.get_client("other").await.unwrap().unwrap();
        assert_eq!(found.name, "Other");

        assert!(clients.get_client("missing").await.unwrap().is_none());
        assert_eq!(clients.client_ids().collect::<Vec<_>>(), vec!["example-app"]);
    }
}
