//! Composition root: one transfer queue shared by the HTTP server and the
//! operator console.

use std::sync::Arc;
use std::time::Duration;

use webshare_delivery::TransferQueue;
use webshare_server::ShareServer;

use crate::config::Config;
use crate::console::Console;

/// How long open downloads may keep running after shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the share until the operator exits, Ctrl-C, or the server fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let queue = Arc::new(TransferQueue::new());

    let server = ShareServer::new(config.server_config(), Arc::clone(&queue));
    let server_run = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { server_run.run().await });

    // Wait for the server to bind, or for it to give up.
    let port = loop {
        if server_task.is_finished() {
            (&mut server_task).await??;
            anyhow::bail!("server stopped before binding");
        }
        let p = server.port().await;
        if p > 0 {
            break p;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    println!("EM WebShare is ready on port {port}");
    let served = server.config();
    tracing::info!(
        port,
        upload_dir = %served.upload_dir.display(),
        static_dir = ?served.static_dir,
        "share ready"
    );

    let console = Console::new(Arc::clone(&queue));
    tokio::select! {
        result = console.run() => {
            result?;
            tracing::info!("console closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
        result = &mut server_task => {
            result??;
            anyhow::bail!("server stopped unexpectedly");
        }
    }

    server.shutdown();
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut server_task).await {
        Ok(result) => result??,
        Err(_) => {
            tracing::warn!("in-flight transfers still open, abandoning them");
            server_task.abort();
        }
    }

    let abandoned = queue.len();
    if abandoned > 0 {
        tracing::info!(abandoned, "queued entries discarded");
    }
    Ok(())
}
