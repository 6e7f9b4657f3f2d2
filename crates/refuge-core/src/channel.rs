//! WebSocket transport for a chat session
//!
//! One tokio task per session owns the socket. It reports what happens on the
//! wire as [`SessionEvent`]s tagged with the session id and writes whatever the
//! session queues as [`Outbound`] frames. It holds no chat state of its own.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use crate::identity::SessionId;

/// Something that happened on a session's channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    /// One raw text frame from the agent
    Frame(String),
    Failed(String),
    /// Graceful shutdown initiated by the remote peer
    Closed,
}

/// A channel event addressed to the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub event: ChannelEvent,
}

/// Instructions from the session to its transport task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    Close,
}

/// Build `<base>/ws/<session id>` and check it is a WebSocket address
pub fn channel_url(base: &str, session_id: &SessionId) -> Result<Url> {
    let raw = format!("{}/ws/{}", base.trim_end_matches('/'), session_id);
    let url = Url::parse(&raw).with_context(|| format!("Invalid channel address: {}", raw))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(anyhow!("Unsupported channel scheme '{}' (expected ws or wss)", other)),
    }
}

/// Start the transport task and return the handle used to feed it frames.
///
/// Dropping the returned sender has the same effect as sending [`Outbound::Close`].
pub fn spawn(
    url: Url,
    session_id: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> mpsc::UnboundedSender<Outbound> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(url, session_id, events, rx));
    tx
}

async fn run(
    url: Url,
    session_id: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let emit = |event: ChannelEvent| {
        // The receiver only goes away when the app is shutting down
        let _ = events.send(SessionEvent {
            session_id: session_id.clone(),
            event,
        });
    };

    let (ws_stream, _) = match connect_async(url.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Connection failed → {}: {}", session_id.short(), e);
            emit(ChannelEvent::Failed(e.to_string()));
            return;
        }
    };

    info!("Connected → {}", session_id.short());
    emit(ChannelEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    debug!("Frame ← {} ({} bytes)", session_id.short(), text.len());
                    emit(ChannelEvent::Frame(text));
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Remote closed → {}", session_id.short());
                    emit(ChannelEvent::Closed);
                    break;
                }
                // Text only. Pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Channel error → {}: {}", session_id.short(), e);
                    emit(ChannelEvent::Failed(e.to_string()));
                    break;
                }
            },
            outgoing = outbound.recv() => match outgoing {
                Some(Outbound::Frame(text)) => {
                    debug!("Frame → {} ({} bytes)", session_id.short(), text.len());
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        warn!("Send failed → {}: {}", session_id.short(), e);
                        emit(ChannelEvent::Failed(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    info!("Disconnected → {}", session_id.short());
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChatSession, ConnectionState, WELCOME_MESSAGE};
    use crate::transcript::Role;
    use std::time::Duration;
    use tokio::net::TcpListener;

    const REPLY: &str = "**FIRST 2 HOURS**\n- Go to Central Hall\nhttps://x.org/guide.pdf";

    /// Minimal assistant: answers every text frame with a fixed reply
    async fn start_agent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    WsMessage::Text(_) => {
                        ws.send(WsMessage::Text(REPLY.to_string())).await.unwrap();
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        });

        format!("ws://{}", addr)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("event channel closed")
    }

    #[test]
    fn test_channel_url() {
        let id = SessionId::generate();
        let url = channel_url("ws://127.0.0.1:8000/", &id).unwrap();
        assert_eq!(url.as_str(), format!("ws://127.0.0.1:8000/ws/{}", id));
    }

    #[test]
    fn test_channel_url_rejects_http() {
        let id = SessionId::generate();
        assert!(channel_url("http://127.0.0.1:8000", &id).is_err());
    }

    #[tokio::test]
    async fn test_round_trip_against_live_socket() {
        let base = start_agent().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::connect(&base, tx).unwrap();

        let opened = next_event(&mut rx).await;
        assert_eq!(&opened.session_id, session.id());
        session.handle(opened.event);
        assert_eq!(session.state(), &ConnectionState::Open);
        assert_eq!(session.transcript().entries()[0].content, WELCOME_MESSAGE);

        session.send("Where is the nearest shelter?").unwrap();
        let reply = next_event(&mut rx).await;
        assert_eq!(reply.event, ChannelEvent::Frame(REPLY.to_string()));
        session.handle(reply.event);

        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, Role::Agent);
        assert_eq!(last.document_link.as_deref(), Some("https://x.org/guide.pdf"));
        assert!(!session.is_awaiting_reply());

        session.close();
        assert_eq!(session.state(), &ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_ping_is_answered_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(WsMessage::Ping(b"hb".to_vec())).await.unwrap();
            ws.send(WsMessage::Text("hello".to_string())).await.unwrap();

            let mut pongs = 0;
            while let Ok(Some(Ok(msg))) =
                tokio::time::timeout(Duration::from_millis(500), ws.next()).await
            {
                if let WsMessage::Pong(data) = msg {
                    assert_eq!(data, b"hb".to_vec());
                    pongs += 1;
                }
            }
            pongs
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = SessionId::generate();
        let _outbound = spawn(channel_url(&format!("ws://{}", addr), &id).unwrap(), id, tx);

        assert_eq!(next_event(&mut rx).await.event, ChannelEvent::Opened);
        assert_eq!(next_event(&mut rx).await.event, ChannelEvent::Frame("hello".to_string()));
        assert_eq!(server.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_agent_reports_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::connect(&format!("ws://{}", addr), tx).unwrap();

        let event = next_event(&mut rx).await;
        assert!(matches!(event.event, ChannelEvent::Failed(_)));
        session.handle(event.event);
        assert!(matches!(session.state(), ConnectionState::Failed { .. }));
        assert!(session.transcript().is_empty());
    }
}
