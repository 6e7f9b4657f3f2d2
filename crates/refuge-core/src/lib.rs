pub mod annotator;
pub mod auth;
pub mod channel;
pub mod config;
pub mod identity;
pub mod session;
pub mod transcript;

// Re-export main types for convenience
pub use annotator::{annotate, classify_line, extract_document_link, AnnotatedLine, LineKind};
pub use auth::{AuthError, Authenticator, GoogleSignIn, SessionContext, User};
pub use channel::{ChannelEvent, SessionEvent};
pub use config::Config;
pub use identity::SessionId;
pub use session::{ChatSession, ConnectionState, SendError, Transition};
pub use transcript::{MessageEntry, Role, Transcript};
