use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::{Endpoint, Targets};
use crate::source::{Error, EventHandler, Source};

/// Keeps only IPv4 targets of the wrapped source, dropping endpoints which
/// have none left.
pub struct SuppressIpv6Source<S> {
    unfiltered: S,
}

impl<S> SuppressIpv6Source<S> {
    pub fn new(original: S) -> Self {
        Self {
            unfiltered: original,
        }
    }
}

/// IPv4-mapped IPv6 addresses such as `::ffff:1.2.3.4` count as IPv4.
fn is_ipv4(target: &str) -> bool {
    match target.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => true,
        Ok(IpAddr::V6(addr)) => addr.to_ipv4_mapped().is_some(),
        Err(_) => false,
    }
}

fn ipv4_targets(targets: &Targets) -> Targets {
    targets
        .iter()
        .filter(|target| {
            let keep = is_ipv4(target);
            if !keep {
                debug!(%target, "suppressed target, not an IPv4 address");
            }

            keep
        })
        .cloned()
        .collect()
}

#[async_trait]
impl<S: Source> Source for SuppressIpv6Source<S> {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, Error> {
        let endpoints = self.unfiltered.endpoints().await?;

        Ok(endpoints
            .into_iter()
            .filter_map(|endpoint| {
                let targets = ipv4_targets(&endpoint.targets);
                if targets.is_empty() {
                    debug!(dns_name = %endpoint.dns_name, "suppressed endpoint, no IPv4 targets");

                    return None;
                }

                Some(Endpoint {
                    targets,
                    ..endpoint
                })
            })
            .collect())
    }

    async fn add_event_handler(&self, handler: EventHandler) {
        self.unfiltered.add_event_handler(handler).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::iter::FromIterator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::endpoint::{RecordType, Ttl};

    #[derive(Default)]
    struct StaticSource {
        endpoints: Vec<Endpoint>,
        fail: bool,
        handlers: Mutex<Vec<EventHandler>>,
    }

    #[async_trait]
    impl Source for StaticSource {
        async fn endpoints(&self) -> Result<Vec<Endpoint>, Error> {
            if self.fail {
                return Err(Error::Upstream(anyhow::anyhow!("list nodes timeout")));
            }

            Ok(self.endpoints.clone())
        }

        async fn add_event_handler(&self, handler: EventHandler) {
            self.handlers.lock().await.push(handler);
        }
    }

    fn endpoint(dns_name: &str, targets: &[&str]) -> Endpoint {
        Endpoint::new(dns_name, RecordType::A, Targets::from_iter(targets.iter().copied()))
    }

    #[tokio::test]
    async fn filter_targets() {
        let original = endpoint("node1", &["1.2.3.4", "::1", "not-an-ip", "5.6.7.8"])
            .with_ttl(Ttl::new(10))
            .with_labels(BTreeMap::from([("a".to_string(), "b".to_string())]));

        let source = SuppressIpv6Source::new(StaticSource {
            endpoints: vec![original.clone()],
            ..Default::default()
        });

        let endpoints = source.endpoints().await.unwrap();

        assert_eq!(
            endpoints,
            vec![Endpoint {
                targets: Targets::from_iter(["1.2.3.4", "5.6.7.8"]),
                ..original
            }]
        );
    }

    #[tokio::test]
    async fn keep_ipv4_mapped_targets() {
        let source = SuppressIpv6Source::new(StaticSource {
            endpoints: vec![
                endpoint("node1", &["::ffff:1.2.3.4", "5.6.7.8", "::1"]),
                endpoint("node2", &["::ffff:0:1.2.3.4", "64:ff9b::1.2.3.4"]),
            ],
            ..Default::default()
        });

        let endpoints = source.endpoints().await.unwrap();

        assert_eq!(
            endpoints,
            vec![endpoint("node1", &["::ffff:1.2.3.4", "5.6.7.8"])]
        );
    }

    #[tokio::test]
    async fn drop_endpoint_without_ipv4_targets() {
        let source = SuppressIpv6Source::new(StaticSource {
            endpoints: vec![
                endpoint("node1", &["::1", "2001:db8::1"]),
                endpoint("node2", &["1.2.3.4", "::1", "not-an-ip"]),
                endpoint("node3", &["node3.example.org"]),
            ],
            ..Default::default()
        });

        let endpoints = source.endpoints().await.unwrap();

        assert_eq!(endpoints, vec![endpoint("node2", &["1.2.3.4"])]);
    }

    #[tokio::test]
    async fn original_endpoints_unchanged() {
        let inner = Arc::new(StaticSource {
            endpoints: vec![endpoint("node1", &["1.2.3.4", "::1"])],
            ..Default::default()
        });

        let source = SuppressIpv6Source::new(inner.clone());

        source.endpoints().await.unwrap();

        assert_eq!(
            inner.endpoints().await.unwrap(),
            vec![endpoint("node1", &["1.2.3.4", "::1"])]
        );
    }

    #[tokio::test]
    async fn error_passes_through() {
        let source = SuppressIpv6Source::new(StaticSource {
            fail: true,
            ..Default::default()
        });

        match source.endpoints().await {
            Err(err @ Error::Upstream(_)) => {
                assert_eq!(err.to_string(), "read nodes failed: list nodes timeout")
            }
            result => panic!("unexpected result {:?}", result),
        }
    }

    #[tokio::test]
    async fn forward_event_handler() {
        let inner = Arc::new(StaticSource::default());
        let source = SuppressIpv6Source::new(SuppressIpv6Source::new(inner.clone()));

        let counter = Arc::new(AtomicUsize::new(0));
        let handler_counter = counter.clone();

        source
            .add_event_handler(Arc::new(move || {
                handler_counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        let handlers = inner.handlers.lock().await;
        assert_eq!(handlers.len(), 1);

        handlers[0]();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn boxed_source_composes() {
        let source: Box<dyn Source> = Box::new(StaticSource {
            endpoints: vec![endpoint("node1", &["::1"]), endpoint("node2", &["10.0.0.2"])],
            ..Default::default()
        });

        let source = SuppressIpv6Source::new(source);

        assert_eq!(
            source.endpoints().await.unwrap(),
            vec![endpoint("node2", &["10.0.0.2"])]
        );
    }
}
