//! WebSocket connector backed by tokio-tungstenite.
//!
//! Each open spawns one task that owns the socket. Outgoing frames reach it over an mpsc
//! channel; everything it observes is reported as [`TransportEvent`]s tagged with the
//! generation it was opened for.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::transport::{Connector, EventSender, Generation, Link, TransportError, TransportEvent, TransportEventKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

pub struct WsLink {
    outgoing: Option<mpsc::UnboundedSender<Message>>,
}

impl Link for WsLink {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.outgoing.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Message::Text(text)).map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        // Dropping the sender tells the socket task to send a close frame and exit.
        self.outgoing = None;
    }
}

impl Connector for WsConnector {
    type Link = WsLink;

    fn open(&mut self, url: &str, generation: Generation, events: EventSender) -> WsLink {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = url.to_string();
        tokio::spawn(run_socket(url, generation, events, rx));
        WsLink { outgoing: Some(tx) }
    }
}

async fn run_socket(
    url: String,
    generation: Generation,
    events: EventSender,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    let emit = |kind| {
        let _ = events.send(TransportEvent { generation, kind });
    };

    let ws = match tokio_tungstenite::connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            log::debug!("connect {} failed: {}", url, e);
            emit(TransportEventKind::Error(e.to_string()));
            emit(TransportEventKind::Closed);
            return;
        }
    };
    emit(TransportEventKind::Opened);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            out = outgoing.recv() => {
                match out {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            emit(TransportEventKind::Error(e.to_string()));
                            break;
                        }
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => emit(TransportEventKind::Frame(text)),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        emit(TransportEventKind::Error(e.to_string()));
                        break;
                    }
                }
            }
        }
    }
    emit(TransportEventKind::Closed);
}
