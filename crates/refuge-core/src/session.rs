//! Connection session: one chat channel and the transcript it feeds
//!
//! A session moves through `Connecting → Open → Closed`, or into `Failed` on a
//! channel error. `Closed` and `Failed` are terminal: once there, every channel
//! callback is a no-op, so late frames from a closed socket never reach the
//! transcript. Reconnecting means building a new session.

use anyhow::Result;
use log::{debug, info, warn};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::channel::{self, ChannelEvent, Outbound, SessionEvent};
use crate::identity::SessionId;
use crate::transcript::{MessageEntry, Transcript};

/// Synthetic greeting appended when the channel opens. Never sent by the peer.
pub const WELCOME_MESSAGE: &str = "Welcome! How can I help you today?";

/// Synthetic entry appended when a reply does not arrive in time
pub const NO_RESPONSE_MESSAGE: &str =
    "I'm having trouble responding right now. Please try again in a moment.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed { .. } => "failed",
        }
    }
}

/// A state change produced by a channel event or a local call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Why a message was not sent. The UI prevents all of these, so they are
/// guards rather than user-facing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("channel is not open (state: {0})")]
    NotOpen(&'static str),
    #[error("message is empty")]
    EmptyMessage,
    #[error("still waiting for the previous reply")]
    AwaitingReply,
    #[error("channel transport has stopped")]
    ChannelClosed,
}

pub struct ChatSession {
    id: SessionId,
    state: ConnectionState,
    transcript: Transcript,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    /// Set while a sent message waits for its reply
    awaiting_since: Option<Instant>,
}

impl ChatSession {
    /// Session in `Connecting` over an already-started transport
    pub fn new(id: SessionId, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            state: ConnectionState::Connecting,
            transcript: Transcript::new(),
            outbound: Some(outbound),
            awaiting_since: None,
        }
    }

    /// Generate a session id and open a channel to `<ws_base>/ws/<id>`.
    ///
    /// Channel events for this session are delivered to `events`.
    pub fn connect(ws_base: &str, events: mpsc::UnboundedSender<SessionEvent>) -> Result<Self> {
        let id = SessionId::generate();
        let url = channel::channel_url(ws_base, &id)?;
        info!("Opening chat session {} at {}", id.short(), url);

        let outbound = channel::spawn(url, id.clone(), events);
        Ok(Self::new(id, outbound))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_since.is_some()
    }

    /// Whether `event` belongs to this session and may still change it
    pub fn accepts(&self, event: &SessionEvent) -> bool {
        event.session_id == self.id && !self.state.is_terminal()
    }

    /// Apply one channel event. Returns the transition it caused, if any.
    pub fn handle(&mut self, event: ChannelEvent) -> Option<Transition> {
        match event {
            ChannelEvent::Opened => self.on_open(),
            ChannelEvent::Frame(raw) => {
                self.on_receive(&raw);
                None
            }
            ChannelEvent::Failed(reason) => self.on_error(reason),
            ChannelEvent::Closed => self.on_remote_close(),
        }
    }

    pub fn on_open(&mut self) -> Option<Transition> {
        if self.state != ConnectionState::Connecting {
            return None;
        }

        self.transcript.append(MessageEntry::agent(WELCOME_MESSAGE, None));
        Some(self.transition(ConnectionState::Open))
    }

    /// Handle one inbound frame. Returns whether an entry was appended.
    ///
    /// Every non-empty frame becomes its own entry, even when no reply was
    /// pending or several frames answer one message.
    pub fn on_receive(&mut self, raw: &str) -> bool {
        if self.state != ConnectionState::Open {
            debug!("Dropping frame for {} session {}", self.state.label(), self.id.short());
            return false;
        }
        // Heartbeats
        if raw.trim().is_empty() {
            return false;
        }

        self.transcript.append(MessageEntry::from_agent_frame(raw));
        self.awaiting_since = None;
        true
    }

    pub fn on_error(&mut self, reason: impl Into<String>) -> Option<Transition> {
        if self.state.is_terminal() {
            return None;
        }

        let reason = reason.into();
        warn!("Chat session {} failed: {}", self.id.short(), reason);
        Some(self.transition(ConnectionState::Failed { reason }))
    }

    pub fn on_remote_close(&mut self) -> Option<Transition> {
        match self.state {
            ConnectionState::Open => Some(self.transition(ConnectionState::Closed)),
            ConnectionState::Connecting => self.on_error("connection closed before it opened"),
            _ => None,
        }
    }

    /// Send one user message as a single raw text frame
    pub fn send(&mut self, text: &str) -> Result<(), SendError> {
        if self.state != ConnectionState::Open {
            return Err(SendError::NotOpen(self.state.label()));
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        if self.is_awaiting_reply() {
            return Err(SendError::AwaitingReply);
        }

        let delivered = self
            .outbound
            .as_ref()
            .map(|tx| tx.send(Outbound::Frame(text.to_string())).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.on_error("channel transport stopped");
            return Err(SendError::ChannelClosed);
        }

        self.transcript.append(MessageEntry::user(text));
        self.awaiting_since = Some(Instant::now());
        Ok(())
    }

    /// Close the channel. Later callbacks for this session are ignored.
    pub fn close(&mut self) -> Option<Transition> {
        if self.state.is_terminal() {
            return None;
        }

        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Outbound::Close);
        }
        info!("Closing chat session {}", self.id.short());
        Some(self.transition(ConnectionState::Closed))
    }

    /// Give up on a pending reply after `timeout`.
    ///
    /// Appends [`NO_RESPONSE_MESSAGE`] and reopens input. Returns whether it fired.
    pub fn check_reply_timeout(&mut self, now: Instant, timeout: Duration) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }

        match self.awaiting_since {
            Some(since) if now.saturating_duration_since(since) >= timeout => {
                warn!("No reply within {:?} on session {}", timeout, self.id.short());
                self.transcript.append(MessageEntry::agent(NO_RESPONSE_MESSAGE, None));
                self.awaiting_since = None;
                true
            }
            _ => false,
        }
    }

    fn transition(&mut self, to: ConnectionState) -> Transition {
        let from = std::mem::replace(&mut self.state, to.clone());
        if to.is_terminal() {
            self.outbound = None;
            self.awaiting_since = None;
        }
        debug!("Session {}: {} → {}", self.id.short(), from.label(), to.label());
        Transition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Role;

    fn session() -> (ChatSession, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChatSession::new(SessionId::generate(), tx), rx)
    }

    fn open_session() -> (ChatSession, mpsc::UnboundedReceiver<Outbound>) {
        let (mut session, rx) = session();
        session.handle(ChannelEvent::Opened);
        (session, rx)
    }

    #[test]
    fn test_end_to_end_exchange() {
        let (mut session, mut rx) = session();
        assert_eq!(session.state(), &ConnectionState::Connecting);

        let transition = session.handle(ChannelEvent::Opened).unwrap();
        assert_eq!(transition.from, ConnectionState::Connecting);
        assert_eq!(transition.to, ConnectionState::Open);
        assert_eq!(session.transcript().len(), 1);
        let welcome = &session.transcript().entries()[0];
        assert_eq!(welcome.role, Role::Agent);
        assert_eq!(welcome.content, WELCOME_MESSAGE);
        assert!(welcome.document_link.is_none());

        session.send("Where is the nearest shelter?").unwrap();
        assert_eq!(session.transcript().len(), 2);
        let sent = session.transcript().last().unwrap();
        assert_eq!(sent.role, Role::User);
        assert_eq!(sent.content, "Where is the nearest shelter?");
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Frame("Where is the nearest shelter?".to_string())
        );
        assert!(session.is_awaiting_reply());

        session.handle(ChannelEvent::Frame(
            "**FIRST 2 HOURS**\n- Go to Central Hall\nhttps://x.org/guide.pdf".to_string(),
        ));
        assert_eq!(session.transcript().len(), 3);
        let reply = session.transcript().last().unwrap();
        assert_eq!(reply.role, Role::Agent);
        assert_eq!(reply.document_link.as_deref(), Some("https://x.org/guide.pdf"));
        assert!(!reply.content.contains("https://x.org/guide.pdf"));
        assert_eq!(reply.content, "**FIRST 2 HOURS**\n- Go to Central Hall");
        assert!(!session.is_awaiting_reply());
    }

    #[test]
    fn test_send_trims_and_transmits_raw_text() {
        let (mut session, mut rx) = open_session();
        session.send("  need water \n").unwrap();
        assert_eq!(session.transcript().last().unwrap().content, "need water");
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("need water".to_string()));
    }

    #[test]
    fn test_no_appends_after_close() {
        let (mut session, mut rx) = open_session();
        let transition = session.close().unwrap();
        assert_eq!(transition.to, ConnectionState::Closed);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);

        let before = session.transcript().len();
        session.handle(ChannelEvent::Frame("late reply".to_string()));
        session.handle(ChannelEvent::Opened);
        assert!(session.handle(ChannelEvent::Failed("late error".to_string())).is_none());
        assert_eq!(session.transcript().len(), before);
        assert_eq!(session.state(), &ConnectionState::Closed);
    }

    #[test]
    fn test_sessions_are_deterministic() {
        let frames = [
            "**FIRST 2 HOURS**\n- Go to Central Hall",
            "   ",
            "Details: https://x.org/guide.pdf",
        ];

        let run = || {
            let (mut session, _rx) = open_session();
            for frame in frames {
                session.handle(ChannelEvent::Frame(frame.to_string()));
            }
            session.transcript().snapshot()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_send_guards() {
        let (mut session, _rx) = session();
        assert_eq!(session.send("hello"), Err(SendError::NotOpen("connecting")));

        session.handle(ChannelEvent::Opened);
        assert_eq!(session.send("   "), Err(SendError::EmptyMessage));

        session.send("first").unwrap();
        assert_eq!(session.send("second"), Err(SendError::AwaitingReply));
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn test_each_frame_is_its_own_entry() {
        let (mut session, _rx) = open_session();

        // Out of turn: nothing was sent yet
        assert!(session.on_receive("Shelters open at 6pm."));
        session.send("And food?").unwrap();
        assert!(session.on_receive("Food bank: Main St."));
        assert!(session.on_receive("Also: soup kitchen on 5th."));

        let roles: Vec<Role> = session.transcript().entries().iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::Agent, Role::Agent, Role::User, Role::Agent, Role::Agent]
        );
    }

    #[test]
    fn test_empty_frames_are_dropped() {
        let (mut session, _rx) = open_session();
        session.send("hello").unwrap();

        assert!(!session.on_receive(" \n\t "));
        assert_eq!(session.transcript().len(), 2);
        assert!(session.is_awaiting_reply());
    }

    #[test]
    fn test_failure_is_terminal() {
        let (mut session, _rx) = session();
        let transition = session.handle(ChannelEvent::Failed("refused".to_string())).unwrap();
        assert_eq!(transition.from, ConnectionState::Connecting);
        assert_eq!(
            session.state(),
            &ConnectionState::Failed { reason: "refused".to_string() }
        );

        assert!(session.handle(ChannelEvent::Opened).is_none());
        assert!(session.close().is_none());
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_remote_close() {
        let (mut open, _rx) = open_session();
        let transition = open.handle(ChannelEvent::Closed).unwrap();
        assert_eq!(transition.to, ConnectionState::Closed);
        assert_eq!(open.transcript().len(), 1);

        let (mut connecting, _rx) = session();
        connecting.handle(ChannelEvent::Closed);
        assert!(matches!(connecting.state(), ConnectionState::Failed { .. }));
    }

    #[test]
    fn test_stopped_transport_fails_session() {
        let (mut session, rx) = open_session();
        drop(rx);

        assert_eq!(session.send("hello"), Err(SendError::ChannelClosed));
        assert!(matches!(session.state(), ConnectionState::Failed { .. }));
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn test_accepts_only_own_live_events() {
        let (mut session, _rx) = open_session();
        let own = SessionEvent {
            session_id: session.id().clone(),
            event: ChannelEvent::Frame("hi".to_string()),
        };
        let stranger = SessionEvent {
            session_id: SessionId::generate(),
            event: ChannelEvent::Frame("hi".to_string()),
        };

        assert!(session.accepts(&own));
        assert!(!session.accepts(&stranger));
        session.close();
        assert!(!session.accepts(&own));
    }

    #[test]
    fn test_reply_timeout() {
        let (mut session, _rx) = open_session();
        let timeout = Duration::from_secs(30);

        assert!(!session.check_reply_timeout(Instant::now() + timeout, timeout));

        session.send("hello").unwrap();
        assert!(!session.check_reply_timeout(Instant::now(), timeout));
        assert!(session.check_reply_timeout(Instant::now() + timeout, timeout));

        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, Role::Agent);
        assert_eq!(last.content, NO_RESPONSE_MESSAGE);
        assert!(!session.is_awaiting_reply());
        assert!(session.send("again").is_ok());
    }
}
