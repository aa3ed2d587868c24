use async_trait::async_trait;
use futures_channel::mpsc::{self, UnboundedSender};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Node;
use tokio::sync::Mutex;

use crate::source::{Error, NodeCache};

/// In-memory node cache for tests.
#[derive(Default)]
pub struct FakeNodeCache {
    nodes: Mutex<Vec<Node>>,
    failure: Mutex<Option<String>>,
    subscribers: Mutex<Vec<UnboundedSender<()>>>,
}

impl FakeNodeCache {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            ..Default::default()
        }
    }

    pub async fn set_nodes(&self, nodes: Vec<Node>) {
        *self.nodes.lock().await = nodes;
    }

    pub async fn fail_with(&self, reason: &str) {
        self.failure.lock().await.replace(reason.to_string());
    }

    pub async fn notify(&self) {
        for subscriber in self.subscribers.lock().await.iter() {
            let _ = subscriber.unbounded_send(());
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[async_trait]
impl NodeCache for FakeNodeCache {
    async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        if let Some(reason) = self.failure.lock().await.as_ref() {
            return Err(Error::Upstream(anyhow::anyhow!("{}", reason)));
        }

        Ok(self.nodes.lock().await.clone())
    }

    async fn subscribe(&self) -> BoxStream<'static, ()> {
        let (sender, receiver) = mpsc::unbounded();

        self.subscribers.lock().await.push(sender);

        receiver.boxed()
    }
}
