use std::sync::Arc;

use lifehub::{
    config, flusher,
    server::{self, ServerState},
    state::AppContext,
    storage::FileQueueStore,
    sync::{HttpApiClient, SyncQueue},
};
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_tracing();
    let config = config::AppConfig::load()?;

    let client = HttpApiClient::new(&config.sync.api_base)?;
    let store = FileQueueStore::new(&config.data_dir);
    let queue = SyncQueue::restore(Arc::new(store), Arc::new(client), config.sync.max_retries)?;
    let ctx = AppContext::new(config, Arc::new(queue));

    let (flusher_handle, flusher_task) = flusher::spawn(ctx.clone());

    let server_state = ServerState::new(ctx.clone(), flusher_handle.clone());
    let server_task = tokio::spawn(async move {
        if let Err(err) = server::serve(server_state).await {
            error!(error = ?err, "server error");
        }
    });

    tokio::signal::ctrl_c().await?;
    ctx.request_shutdown();

    let _ = server_task.await;

    if let Err(err) = flusher_task.await {
        error!(error = ?err, "flusher task join error");
    }

    Ok(())
}
