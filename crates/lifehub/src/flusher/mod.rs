use tokio::{
    select,
    sync::mpsc::{self, Sender},
    task::JoinHandle,
    time::{Instant, interval_at},
};
use tracing::{debug, info};

use crate::state::AppContext;

#[derive(Debug)]
pub enum FlusherCommand {
    RequestFlush,
}

#[derive(Clone)]
pub struct FlusherHandle {
    tx: Sender<FlusherCommand>,
}

impl FlusherHandle {
    pub async fn request_flush(&self) -> anyhow::Result<()> {
        self.tx
            .send(FlusherCommand::RequestFlush)
            .await
            .map_err(|err| anyhow::anyhow!("flusher shutdown: {err}"))
    }
}

/// Background replay loop: flushes the sync queue on a fixed interval and on
/// demand, until shutdown is requested. Mirrors the UI-side behavior of
/// retrying the backlog periodically and immediately when connectivity
/// returns.
pub struct QueueFlusher {
    ctx: AppContext,
    cmd_rx: mpsc::Receiver<FlusherCommand>,
}

impl QueueFlusher {
    pub fn new(ctx: AppContext, cmd_rx: mpsc::Receiver<FlusherCommand>) -> Self {
        Self { ctx, cmd_rx }
    }

    pub async fn run(mut self) {
        let flush_interval = self.ctx.config().sync.flush_interval();
        // First tick after one full interval; startup backlog is the server's
        // explicit flush call, not an implicit pass.
        let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
        let shutdown = self.ctx.shutdown_notifier();

        loop {
            select! {
                _ = ticker.tick() => {
                    self.run_flush().await;
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        FlusherCommand::RequestFlush => {
                            info!("flush requested by subsystem");
                            self.run_flush().await;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("queue flusher shutting down");
                    break;
                }
            }
        }
    }

    async fn run_flush(&self) {
        let queue = self.ctx.queue();
        if queue.is_empty() {
            debug!("no queued mutations to flush");
            return;
        }

        let outcome = queue.flush().await;
        info!(
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            dropped = outcome.dropped,
            "sync flush pass finished"
        );
    }
}

pub fn spawn(ctx: AppContext) -> (FlusherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(32);
    let flusher = QueueFlusher::new(ctx, rx);
    let handle = FlusherHandle { tx: tx.clone() };
    let join = tokio::spawn(async move {
        flusher.run().await;
        drop(tx);
    });
    (handle, join)
}
