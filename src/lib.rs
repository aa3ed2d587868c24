use anyhow::Result;

pub use control::build_source;

pub mod config;
mod control;
pub mod endpoint;
pub mod selector;
pub mod source;
pub mod template;
mod trace;

pub async fn run() -> Result<()> {
    let _trace_guard = trace::init_tracing()?;

    control::run_controller().await
}
