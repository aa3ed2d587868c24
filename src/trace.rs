use std::env;

use anyhow::Result;
use opentelemetry::global;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

const DEFAULT_FILTER: &str = "info";
const DEFAULT_JAEGER_AGENT: &str = "127.0.0.1:6831";

/// Flushes the jaeger exporter when dropped.
pub struct TraceGuard(());

impl Drop for TraceGuard {
    fn drop(&mut self) {
        global::shutdown_tracer_provider();
    }
}

fn jaeger_agent_addr(agent: Option<String>) -> String {
    agent
        .filter(|agent| !agent.is_empty())
        .unwrap_or_else(|| DEFAULT_JAEGER_AGENT.to_string())
}

/// Logs to stderr, filtered by `RUST_LOG`, and exports spans to the jaeger
/// agent at `JAEGER_AGENT`.
pub fn init_tracing() -> Result<TraceGuard> {
    global::set_text_map_propagator(opentelemetry_jaeger::Propagator::new());

    let agent_addr = jaeger_agent_addr(env::var("JAEGER_AGENT").ok());

    let tracer = opentelemetry_jaeger::new_pipeline()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .with_agent_endpoint(agent_addr)
        .install_simple()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer().pretty().with_target(true);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(TraceGuard(()))
}
