use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Node;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::endpoint::{Endpoint, RecordType, Targets, Ttl};
use crate::selector::Selector;
use crate::source::{
    Error, EventHandler, Source, CONTROLLER_ANNOTATION_KEY, CONTROLLER_ANNOTATION_VALUE,
    TTL_ANNOTATION_KEY,
};
use crate::template::{FqdnTemplate, TemplateData};

const NODE_EXTERNAL_IP: &str = "ExternalIP";
const NODE_INTERNAL_IP: &str = "InternalIP";

/// A read-only view of the cluster nodes, kept up to date by someone else.
#[async_trait]
pub trait NodeCache: Send + Sync + 'static {
    /// Snapshot of the nodes currently known.
    async fn list_nodes(&self) -> Result<Vec<Node>, Error>;

    /// Stream yielding once for every observed node change.
    async fn subscribe(&self) -> BoxStream<'static, ()>;
}

#[async_trait]
impl<C: NodeCache + ?Sized> NodeCache for Arc<C> {
    async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        (**self).list_nodes().await
    }

    async fn subscribe(&self) -> BoxStream<'static, ()> {
        (**self).subscribe().await
    }
}

#[derive(Default)]
struct HandlerRegistry {
    handlers: Vec<EventHandler>,
    /// Set once the dispatcher task runs.
    subscribed: bool,
}

/// Produces one `A` endpoint per node that passes the ownership, annotation and
/// label checks.
pub struct NodeSource<C> {
    cache: C,
    controller: String,
    annotation_filter: Selector,
    fqdn_template: Option<FqdnTemplate>,
    label_selector: Selector,
    registry: Arc<Mutex<HandlerRegistry>>,
}

impl<C: NodeCache> NodeSource<C> {
    pub fn new(
        cache: C,
        annotation_filter: &str,
        fqdn_template: &str,
        label_selector: Selector,
    ) -> Result<Self, Error> {
        let fqdn_template = if fqdn_template.is_empty() {
            None
        } else {
            Some(fqdn_template.parse::<FqdnTemplate>()?)
        };

        let annotation_filter = annotation_filter.parse::<Selector>()?;

        Ok(Self {
            cache,
            controller: CONTROLLER_ANNOTATION_VALUE.to_string(),
            annotation_filter,
            fqdn_template,
            label_selector,
            registry: Arc::new(Default::default()),
        })
    }

    /// Only nodes without a controller annotation, or annotated with this
    /// identity, are processed.
    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = controller.into();

        self
    }

    pub async fn handler_count(&self) -> usize {
        self.registry.lock().await.handlers.len()
    }

    fn node_endpoint(&self, node: &Node) -> Result<Option<Endpoint>, Error> {
        let empty = BTreeMap::new();
        let name = node.metadata.name.as_deref().unwrap_or_default();
        let annotations = node.metadata.annotations.as_ref().unwrap_or(&empty);
        let labels = node.metadata.labels.as_ref().unwrap_or(&empty);

        if let Some(controller) = annotations.get(CONTROLLER_ANNOTATION_KEY) {
            if *controller != self.controller {
                debug!(
                    %name,
                    %controller,
                    expect_controller = %self.controller,
                    "skip node managed by another controller"
                );

                return Ok(None);
            }
        }

        if !self.annotation_filter.matches(annotations) {
            debug!(
                %name,
                annotation_filter = %self.annotation_filter,
                "skip node not matching annotation filter"
            );

            return Ok(None);
        }

        if !self.label_selector.matches(labels) {
            debug!(
                %name,
                label_selector = %self.label_selector,
                "skip node not matching label selector"
            );

            return Ok(None);
        }

        let dns_name = match &self.fqdn_template {
            None => name.to_string(),
            Some(template) => template.expand(&TemplateData {
                name,
                namespace: node.metadata.namespace.as_deref().unwrap_or_default(),
            }),
        };

        let targets = node_targets(node).ok_or_else(|| Error::AddressUnavailable {
            node: name.to_string(),
        })?;

        let ttl = ttl_from_annotations(name, annotations);

        debug!(%name, %dns_name, %targets, ?ttl, "create node endpoint");

        Ok(Some(
            Endpoint::new(dns_name, RecordType::A, targets)
                .with_ttl(ttl)
                .with_labels(labels.clone()),
        ))
    }
}

#[async_trait]
impl<C: NodeCache> Source for NodeSource<C> {
    #[instrument(err, skip(self))]
    async fn endpoints(&self) -> Result<Vec<Endpoint>, Error> {
        let nodes = self.cache.list_nodes().await?;

        let mut endpoints = Vec::with_capacity(nodes.len());
        for node in &nodes {
            if let Some(endpoint) = self.node_endpoint(node)? {
                endpoints.push(endpoint);
            }
        }

        info!(
            node_count = nodes.len(),
            endpoint_count = endpoints.len(),
            "get node endpoints done"
        );

        Ok(endpoints)
    }

    async fn add_event_handler(&self, handler: EventHandler) {
        let mut registry = self.registry.lock().await;
        registry.handlers.push(handler);

        if registry.subscribed {
            return;
        }

        // the lock is held until the dispatcher runs, a cancelled registration
        // leaves the next one to subscribe
        let changes = self.cache.subscribe().await;
        let dispatch_registry = self.registry.clone();

        tokio::spawn(
            async move {
                futures_util::pin_mut!(changes);

                while changes.next().await.is_some() {
                    let handlers = dispatch_registry.lock().await.handlers.clone();

                    debug!(handler_count = handlers.len(), "node changed, notify handlers");

                    for handler in handlers {
                        handler();
                    }
                }

                warn!("node change stream stopped");
            }
            .instrument(info_span!("dispatch node events")),
        );

        registry.subscribed = true;
    }
}

/// ExternalIP addresses win, InternalIP addresses are the fallback.
fn node_targets(node: &Node) -> Option<Targets> {
    let addresses = node
        .status
        .as_ref()
        .and_then(|status| status.addresses.as_deref())
        .unwrap_or_default();

    [NODE_EXTERNAL_IP, NODE_INTERNAL_IP]
        .into_iter()
        .map(|address_type| {
            addresses
                .iter()
                .filter(|address| address.type_ == address_type)
                .map(|address| address.address.clone())
                .collect::<Targets>()
        })
        .find(|targets| !targets.is_empty())
}

fn ttl_from_annotations(name: &str, annotations: &BTreeMap<String, String>) -> Ttl {
    let ttl = match annotations.get(TTL_ANNOTATION_KEY) {
        None => return Ttl::unconfigured(),
        Some(ttl) => ttl,
    };

    match ttl.parse::<i64>() {
        Ok(seconds) if (0..=i64::from(i32::MAX)).contains(&seconds) => Ttl::new(seconds),

        Ok(seconds) => {
            warn!(%name, seconds, "ttl annotation out of range, ignore it");

            Ttl::unconfigured()
        }

        Err(err) => {
            warn!(%name, %ttl, %err, "parse ttl annotation failed, ignore it");

            Ttl::unconfigured()
        }
    }
}
