use anyhow::Result;
use devtrack::config::Config;
use tracing::info;

/// Execute the serve command
pub async fn execute(cfg: Config) -> Result<()> {
    info!("Starting devtrack server");
    devtrack::server::start_server(cfg).await
}
