//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{FrameStream, StreamTransport, TransportError};

/// Opens real WebSocket sessions.
///
/// Ping/pong is answered by tungstenite while the stream is polled. Close
/// frames end the stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl StreamTransport for TungsteniteTransport {
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let frames = ws_stream
            .take_while(|msg| std::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                std::future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::Read(e.to_string()))),
                })
            });

        Ok(Box::pin(frames))
    }
}
