use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::UnboundedSender;
use futures_channel::{mpsc, oneshot};
use futures_util::future::{AbortHandle, Abortable};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::Store;
use kube::runtime::watcher::Event;
use kube::runtime::{reflector, watcher};
use kube::Api;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, info_span, instrument, Instrument};

use crate::source::{Error, NodeCache};

type Subscribers = Arc<Mutex<Vec<UnboundedSender<()>>>>;

/// Node cache backed by a kube watcher and reflector store, running on its own
/// task until the cache is dropped.
pub struct KubeNodeCache {
    store: Store<Node>,
    subscribers: Subscribers,
    abort_handle: AbortHandle,
}

impl KubeNodeCache {
    /// Starts watching nodes and waits until the initial node list is stored.
    #[instrument(err, skip(api))]
    pub async fn new(api: Api<Node>) -> Result<Self, Error> {
        let writer = Writer::default();
        let store = writer.as_reader();
        let subscribers = Subscribers::default();

        let (synced_sender, synced_receiver) = oneshot::channel();
        let (abort_handle, abort_registration) = AbortHandle::new_pair();

        tokio::spawn(
            Abortable::new(
                watch_nodes(api, writer, subscribers.clone(), synced_sender),
                abort_registration,
            )
            .instrument(info_span!("watch nodes")),
        );

        synced_receiver
            .await
            .map_err(|_| Error::Upstream(anyhow::anyhow!("node watcher stopped before sync")))??;

        info!("node cache synced");

        Ok(Self {
            store,
            subscribers,
            abort_handle,
        })
    }
}

impl Drop for KubeNodeCache {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

#[async_trait]
impl NodeCache for KubeNodeCache {
    async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        Ok(self
            .store
            .state()
            .into_iter()
            .map(|node| Node::clone(&node))
            .collect())
    }

    async fn subscribe(&self) -> BoxStream<'static, ()> {
        let (sender, receiver) = mpsc::unbounded();

        self.subscribers.lock().await.push(sender);

        receiver.boxed()
    }
}

async fn watch_nodes(
    api: Api<Node>,
    writer: Writer<Node>,
    subscribers: Subscribers,
    synced_sender: oneshot::Sender<Result<(), Error>>,
) {
    let node_stream = reflector(writer, watcher(api, ListParams::default()));
    futures_util::pin_mut!(node_stream);

    let mut synced_sender = Some(synced_sender);

    while let Some(event) = node_stream.next().await {
        let event = match event {
            Err(err) => {
                error!(%err, "watch nodes failed");

                // the initial list failure is reported to the creator instead of retried
                if let Some(synced_sender) = synced_sender.take() {
                    let _ = synced_sender.send(Err(err.into()));

                    return;
                }

                time::sleep(Duration::from_secs(3)).await;

                continue;
            }

            Ok(event) => event,
        };

        match &event {
            Event::Applied(node) | Event::Deleted(node) => {
                info!(name = ?node.metadata.name, "node changed");
            }

            Event::Restarted(nodes) => {
                info!(node_count = nodes.len(), "node list restarted");

                if let Some(synced_sender) = synced_sender.take() {
                    let _ = synced_sender.send(Ok(()));
                }
            }
        }

        subscribers
            .lock()
            .await
            .retain(|subscriber| subscriber.unbounded_send(()).is_ok());
    }

    error!("node watch stream finished, it should not happened");
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn cache_from_writer(writer: &Writer<Node>) -> KubeNodeCache {
        KubeNodeCache {
            store: writer.as_reader(),
            subscribers: Subscribers::default(),
            abort_handle: AbortHandle::new_pair().0,
        }
    }

    fn names(nodes: &[Node]) -> Vec<String> {
        let mut names = nodes
            .iter()
            .filter_map(|node| node.metadata.name.clone())
            .collect::<Vec<_>>();
        names.sort();

        names
    }

    #[tokio::test]
    async fn list_nodes_reads_store() {
        let mut writer = Writer::default();
        let cache = cache_from_writer(&writer);

        assert!(cache.list_nodes().await.unwrap().is_empty());

        writer.apply_watcher_event(&Event::Restarted(vec![node("node1"), node("node2")]));

        assert_eq!(names(&cache.list_nodes().await.unwrap()), ["node1", "node2"]);

        writer.apply_watcher_event(&Event::Deleted(node("node1")));
        writer.apply_watcher_event(&Event::Applied(node("node3")));

        assert_eq!(names(&cache.list_nodes().await.unwrap()), ["node2", "node3"]);
    }
}
