use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracker_core::CloseKind;
use tracker_logging::{tracker_debug, tracker_warn};
use url::Url;

use crate::{Connection, Transport, TransportError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Progress streams over WebSocket at `{base_url}/ws/progress/{task_id}`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    base_url: Url,
}

impl WsTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        match base_url.scheme() {
            "ws" | "wss" => Ok(Self { base_url }),
            other => Err(TransportError::InvalidUrl(format!(
                "unsupported scheme {other}, expected ws or wss"
            ))),
        }
    }

    pub fn endpoint(&self, task_id: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["ws", "progress", task_id]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn Connection>, TransportError> {
        let url = self.endpoint(task_id)?;
        tracker_debug!("connecting to {}", url);
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WsStream,
}

#[async_trait::async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return TransportEvent::Text(text),
                    Err(err) => tracker_warn!("dropping non-utf8 binary frame: {}", err),
                },
                Some(Ok(Message::Close(frame))) => {
                    return TransportEvent::Closed(classify_close(frame.as_ref()));
                }
                // Pings are answered by tungstenite on the next read or write.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracker_warn!("websocket error: {}", err);
                    return TransportEvent::Closed(CloseKind::Abnormal);
                }
                None => return TransportEvent::Closed(CloseKind::Abnormal),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(TransportError::Send(err.to_string())),
        }
    }
}

fn classify_close(frame: Option<&CloseFrame<'_>>) -> CloseKind {
    match frame {
        None => CloseKind::RemoteClean,
        Some(frame) if frame.code == CloseCode::Normal => CloseKind::RemoteClean,
        Some(frame) => {
            tracker_debug!("server closed with {:?}: {}", frame.code, frame.reason);
            CloseKind::Abnormal
        }
    }
}
