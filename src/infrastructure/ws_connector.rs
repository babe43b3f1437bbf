// WebSocket connector for the push transport
use crate::application::push_transport::{InboundFrame, OutboundFrame, PushChannel, PushConnector};
use crate::infrastructure::config::expand_template;
use crate::infrastructure::credentials::Credentials;
use crate::infrastructure::error::{MonitorError, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CHANNEL_CAPACITY: usize = 64;

pub struct WsPushConnector {
    url_template: String,
    credentials: Credentials,
}

impl WsPushConnector {
    pub fn new(url_template: &str, credentials: Credentials) -> Self {
        Self {
            url_template: url_template.to_string(),
            credentials,
        }
    }

    fn resolve_url(&self) -> Result<String> {
        let token = self.credentials.bearer_token()?;
        let mut vars = HashMap::new();
        vars.insert("token".to_string(), urlencoding::encode(&token).into_owned());
        Ok(expand_template(&self.url_template, &vars))
    }
}

#[async_trait]
impl PushConnector for WsPushConnector {
    async fn open(&self) -> Result<PushChannel> {
        let url = self.resolve_url()?;
        // Never log the query string, it carries the credential
        tracing::info!("Opening push connection to {}", url.split('?').next().unwrap_or(&url));

        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| MonitorError::Transport(format!("WebSocket connect failed: {e}")))?;

        let (write, read) = stream.split();
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(write_loop(write, out_rx));
        tokio::spawn(read_loop(read, in_tx));

        Ok(PushChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<InboundFrame>) {
    let closed = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                if tx.send(InboundFrame::Text(text.to_string())).await.is_err() {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => InboundFrame::Closed {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.to_string(),
                    },
                    None => InboundFrame::Closed {
                        code: None,
                        reason: String::new(),
                    },
                };
            }
            Some(Ok(Message::Binary(_))) => tracing::debug!("Ignoring binary push frame"),
            // ping/pong handled by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!("WebSocket receive error: {e}");
                break InboundFrame::Closed {
                    code: None,
                    reason: e.to_string(),
                };
            }
            None => {
                break InboundFrame::Closed {
                    code: None,
                    reason: "stream ended".to_string(),
                };
            }
        }
    };

    let _ = tx.send(closed).await;
    tracing::debug!("WebSocket read loop finished");
}

async fn write_loop(mut write: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<OutboundFrame>) {
    while let Some(frame) = rx.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                if let Err(e) = write.send(Message::text(text)).await {
                    tracing::warn!("WebSocket send failed: {e}");
                    return;
                }
            }
            OutboundFrame::Close => break,
        }
    }

    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    if let Err(e) = write.send(Message::Close(Some(close))).await {
        tracing::debug!("WebSocket close frame not sent: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_carries_encoded_token() {
        let connector = WsPushConnector::new(
            "ws://plant.local/ws/telemetry?token=${token}",
            Credentials::new(Some("a b&c".to_string())),
        );
        assert_eq!(
            connector.resolve_url().unwrap(),
            "ws://plant.local/ws/telemetry?token=a%20b%26c"
        );
    }

    #[tokio::test]
    async fn test_open_without_token_fails_fast() {
        let connector = WsPushConnector::new("ws://127.0.0.1:1/ws?token=${token}", Credentials::new(None));
        assert!(matches!(connector.open().await, Err(MonitorError::MissingCredential)));
    }
}
