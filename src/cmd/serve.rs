//! API server command: `newhire serve`.

use anyhow::Result;
use newhire::config::WorkplaceConfig;

pub async fn cmd_serve(config: WorkplaceConfig) -> Result<()> {
    tracing::info!(
        port = config.server.port,
        db = %config.database.path.display(),
        dev_mode = config.server.dev_mode,
        "starting The New Hire API"
    );
    newhire::workplace::server::start_server(config).await
}
