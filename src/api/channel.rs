use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::client::{ApiError, Result};
use super::models::DownloadRequest;

/// WebSocket carrying download progress for one task/format selection.
pub struct ProgressChannel {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ProgressChannel {
    /// Connect to `endpoint` and send the format selection right away.
    pub async fn open(endpoint: &str, request: &DownloadRequest) -> Result<Self> {
        let (mut socket, _) = connect_async(endpoint).await?;
        info!(%endpoint, task_id = %request.task_id, format = %request.format, "progress channel open");

        let payload = serde_json::to_string(request)
            .map_err(|e| ApiError::InvalidResponse(format!("JSON encode error: {}", e)))?;
        socket.send(Message::Text(payload)).await?;

        Ok(Self { socket })
    }

    /// Next text payload from the server, or `None` once the channel closed.
    pub async fn next_text(&mut self) -> Option<Result<String>> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "server closed progress channel");
                    return None;
                }
                Ok(other) => debug!(kind = ?other, "ignoring non-text frame"),
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}
