use std::sync::Arc;

use anyhow::Result;
use futures_channel::mpsc;
use futures_util::StreamExt;
use kube::{Api, Client};
use tap::TapFallible;
use tokio::time;
use tracing::{error, info, info_span, instrument, Instrument};

use crate::config::Config;
use crate::source::{Error, KubeNodeCache, NodeCache, NodeSource, Source, SuppressIpv6Source};

/// Builds the node endpoint pipeline described by `config`, with IPv6
/// suppression as the outermost layer when enabled.
pub fn build_source<C: NodeCache>(cache: C, config: &Config) -> Result<Box<dyn Source>, Error> {
    let node_source = NodeSource::new(
        cache,
        &config.annotation_filter,
        &config.fqdn_template,
        config.label_selector.clone(),
    )?
    .with_controller(config.controller.clone());

    if config.suppress_ipv6 {
        Ok(Box::new(SuppressIpv6Source::new(node_source)))
    } else {
        Ok(Box::new(node_source))
    }
}

pub async fn run_controller() -> Result<()> {
    let config = Config::from_env()?;

    info!(?config, "load config done");

    let client = Client::try_default().await?;

    info!("init k8s client");

    let cache = KubeNodeCache::new(Api::all(client)).await?;
    let source = build_source(cache, &config)?;

    info!("init node source");

    let (event_sender, mut event_receiver) = mpsc::unbounded();

    source
        .add_event_handler(Arc::new(move || {
            let _ = event_sender.unbounded_send(());
        }))
        .await;

    let mut resync = time::interval(config.resync_interval);

    loop {
        tokio::select! {
            _ = resync.tick() => {
                info!("resync interval reached");
            }

            event = event_receiver.next() => {
                if event.is_none() {
                    error!("node event channel closed, it should not happened");

                    return Err(anyhow::anyhow!("node event channel closed"));
                }

                // a burst of node changes only needs one sync
                while let Ok(Some(())) = event_receiver.try_next() {}
            }
        }

        if let Err(err) = sync_endpoints(&source)
            .instrument(info_span!("sync endpoints"))
            .await
        {
            error!(%err, "sync endpoints failed, retry on next event");
        }
    }
}

#[instrument(err, skip(source))]
async fn sync_endpoints<S: Source>(source: &S) -> Result<()> {
    let endpoints = source.endpoints().await?;

    for endpoint in &endpoints {
        info!(%endpoint, "desired endpoint");
    }

    let encoded = serde_json::to_string(&endpoints)
        .tap_err(|err| error!(%err, "encode endpoints failed"))?;

    info!(endpoint_count = endpoints.len(), endpoints = %encoded, "derive endpoints done");

    Ok(())
}
