use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

pub use cache::KubeNodeCache;
pub use error::Error;
pub use node::{NodeCache, NodeSource};
pub use suppress_ipv6::SuppressIpv6Source;

use crate::endpoint::Endpoint;

mod cache;
mod error;
mod node;
mod suppress_ipv6;

#[cfg(test)]
pub(crate) mod fake;

/// Annotation naming the controller responsible for a resource. Resources
/// carrying another controller's name are ignored.
pub const CONTROLLER_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/controller";

/// The controller identity used when none is configured.
pub const CONTROLLER_ANNOTATION_VALUE: &str = "dns-controller";

/// Annotation overriding the record TTL, in seconds.
pub const TTL_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/ttl";

/// Callback fired whenever the underlying resources change. It carries no
/// data, receivers are expected to call [`Source::endpoints`] again.
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

#[async_trait]
pub trait Source: Send + Sync {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, Error>;

    async fn add_event_handler(&self, handler: EventHandler);
}

#[async_trait]
impl<S, T> Source for T
where
    T: Deref<Target = S> + Send + Sync,
    S: Source + ?Sized,
{
    async fn endpoints(&self) -> Result<Vec<Endpoint>, Error> {
        self.deref().endpoints().await
    }

    async fn add_event_handler(&self, handler: EventHandler) {
        self.deref().add_event_handler(handler).await
    }
}
