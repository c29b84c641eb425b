//! WebSocket transport built on tokio-tungstenite
//!
//! Each link runs as its own task that owns the socket. Outbound frames are
//! queued through an unbounded channel so that callers never block; inbound
//! frames and lifecycle changes are reported through the link's
//! [`EventSink`].

use super::{CloseInfo, Connector, EventSink, TransportError, TransportEvent, TransportLink};
use crate::error::redact_credentials;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn, Instrument};
use url::Url;

/// Connector for real network sockets. Supports native WebSocket pings.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn supports_native_ping(&self) -> bool {
        true
    }

    fn open(&self, url: &Url, sink: EventSink) -> Box<dyn TransportLink> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let span = crate::transport_span!(endpoint = %redact_credentials(url.as_str()));
        tokio::spawn(run_link(url.to_string(), commands_rx, sink).instrument(span));
        Box::new(WebSocketLink {
            commands: commands_tx,
        })
    }
}

#[derive(Debug)]
enum LinkCommand {
    Text(String),
    Ping,
    Close,
}

/// Handle to a running socket task
#[derive(Debug)]
pub struct WebSocketLink {
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl TransportLink for WebSocketLink {
    fn send(&self, text: String) -> Result<(), TransportError> {
        self.commands
            .send(LinkCommand::Text(text))
            .map_err(|_| TransportError::LinkClosed)
    }

    fn ping(&self) -> Result<(), TransportError> {
        self.commands
            .send(LinkCommand::Ping)
            .map_err(|_| TransportError::LinkClosed)
    }

    fn close(&self) {
        let _ = self.commands.send(LinkCommand::Close);
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Socket task: connect, then pump frames both ways until either side closes
async fn run_link(
    url: String,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    sink: EventSink,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let detail = redact_credentials(&e.to_string());
            warn!(target: "feed_transport", error = %detail, "WebSocket connect failed");
            sink.emit(TransportEvent::Error(TransportError::ConnectFailed(
                detail.clone(),
            )));
            sink.emit(TransportEvent::Closed(CloseInfo::abnormal(detail)));
            return;
        }
    };

    debug!(target: "feed_transport", "WebSocket open");
    sink.emit(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();

    let close_info = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        let detail = e.to_string();
                        sink.emit(TransportEvent::Error(TransportError::WriteFailed(detail.clone())));
                        break CloseInfo::abnormal(detail);
                    }
                }
                Some(LinkCommand::Ping) => {
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        let detail = e.to_string();
                        sink.emit(TransportEvent::Error(TransportError::WriteFailed(detail.clone())));
                        break CloseInfo::abnormal(detail);
                    }
                }
                Some(LinkCommand::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break CloseInfo::normal("closed by client");
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEvent::Message(text.as_str().to_string()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => sink.emit(TransportEvent::Message(text)),
                    Err(_) => debug!(target: "feed_transport", len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.as_str()),
                        None => CloseInfo::new(super::CLOSE_NO_STATUS, ""),
                    };
                }
                // Ping/Pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let detail = e.to_string();
                    sink.emit(TransportEvent::Error(TransportError::ReadFailed(detail.clone())));
                    break CloseInfo::abnormal(detail);
                }
                None => break CloseInfo::abnormal("stream ended"),
            }
        }
    };

    debug!(target: "feed_transport", close = %close_info, "WebSocket closed");
    sink.emit(TransportEvent::Closed(close_info));
}
