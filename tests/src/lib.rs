use std::net::Ipv4Addr;
use std::sync::Arc;

use quorum_types::ParticipantId;
use quorum_utils::mock::{MockEngine, MockServer};
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

#[cfg(test)]
mod tests;

/// A mock threshold service listening on a local port.
pub struct MockService {
    engine: Arc<MockEngine>,
    url: Url,
    task: JoinHandle<std::io::Result<()>>,
}

impl MockService {
    pub async fn start(engine: MockEngine) -> Self {
        let port = portpicker::pick_unused_port().expect("an unused port");
        let server = MockServer::new(Arc::new(engine));
        let engine = server.engine().clone();
        let task = server
            .spawn((Ipv4Addr::LOCALHOST, port))
            .await
            .expect("mock server binds");
        let url: Url = format!("http://127.0.0.1:{port}/").parse().unwrap();
        debug!(%url, "mock service started");
        Self { engine, url, task }
    }

    pub fn engine(&self) -> &MockEngine {
        &self.engine
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn participant_url(&self, id: ParticipantId) -> Url {
        MockServer::participant_url(&self.url, id).unwrap()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.task.abort()
    }
}
