use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::server::McpServer;

/// Newline-delimited JSON-RPC. Each message is handled on its own task and a
/// single writer task owns the output, so a slow tool call never blocks others.
pub async fn serve<R, W>(server: Arc<McpServer>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut tasks = JoinSet::new();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let server = Arc::clone(&server);
        let tx = tx.clone();
        tasks.spawn(async move {
            if let Some(response) = server.handle_request(&line).await {
                // receiver only goes away once the writer failed
                let _ = tx.send(response);
            }
        });

        while tasks.try_join_next().is_some() {}
    }

    tracing::debug!(pending = tasks.len(), "stdin closed, draining in-flight requests");
    while tasks.join_next().await.is_some() {}
    drop(tx);

    writer_task.await??;
    Ok(())
}

pub async fn serve_stdio(server: Arc<McpServer>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(server, stdin, tokio::io::stdout()).await
}
