use log::{debug, error, info, warn};
use refuge_core::{
    AuthError, Authenticator, ChatSession, Config, ConnectionState, GoogleSignIn, SendError,
    SessionContext, SessionEvent,
};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::input::TextInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Landing,
    Login,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
    Name,
    /// Where the OAuth redirect URL is pasted back
    Callback,
}

/// Banner shown above the login form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Success(String),
    Info(String),
}

/// What a finished background auth request means for the form
#[derive(Debug)]
pub enum AuthOutcome {
    SignedIn,
    SignedUp,
    Google(GoogleSignIn),
}

pub type AuthTask = tokio::task::JoinHandle<(SessionContext, Result<AuthOutcome, AuthError>)>;

#[derive(Debug, Default)]
pub struct LoginForm {
    pub email: TextInput,
    pub password: TextInput,
    pub name: TextInput,
    pub callback: TextInput,
    pub awaiting_callback: bool,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,

    // Login state
    pub login_mode: LoginMode,
    pub login_field: LoginField,
    pub login: LoginForm,
    pub notice: Option<Notice>,
    pub auth_task: Option<AuthTask>,

    // Chat state
    pub session: Option<ChatSession>,
    pub chat_input: TextInput,
    pub chat_scroll: u16,
    pub follow_chat: bool, // keep the newest entry in view
    pub chat_error: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Collaborators
    pub config: Config,
    pub data_dir: PathBuf,
    pub context: SessionContext,
    pub auth: Authenticator,
    session_events: mpsc::UnboundedSender<SessionEvent>,
}

impl App {
    pub fn new(
        config: Config,
        data_dir: PathBuf,
        context: SessionContext,
        session_events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let auth = Authenticator::from_config(&config, &data_dir);

        Self {
            should_quit: false,
            screen: Screen::Landing,

            login_mode: LoginMode::SignIn,
            login_field: LoginField::Email,
            login: LoginForm::default(),
            notice: None,
            auth_task: None,

            session: None,
            chat_input: TextInput::default(),
            chat_scroll: 0,
            follow_chat: true,
            chat_error: None,

            animation_frame: 0,

            config,
            data_dir,
            context,
            auth,
            session_events,
        }
    }

    // Navigation

    /// "Get started": straight to chat when already signed in
    pub fn get_started(&mut self) {
        if self.context.is_authenticated() {
            self.open_chat();
        } else {
            self.show_login();
        }
    }

    pub fn show_login(&mut self) {
        self.screen = Screen::Login;
        self.login_field = LoginField::Email;
    }

    /// Leaving the form abandons any sign-in still in flight
    pub fn show_landing(&mut self) {
        if let Some(task) = self.auth_task.take() {
            task.abort();
            info!("Sign-in abandoned");
        }
        self.screen = Screen::Landing;
        self.notice = None;
    }

    pub fn is_authenticating(&self) -> bool {
        self.auth_task.is_some()
    }

    // Login form

    /// Fields shown for the current mode, in Tab order
    pub fn login_fields(&self) -> Vec<LoginField> {
        let mut fields = vec![LoginField::Email, LoginField::Password];
        if self.login_mode == LoginMode::SignUp {
            fields.push(LoginField::Name);
        }
        if self.login.awaiting_callback {
            fields.push(LoginField::Callback);
        }
        fields
    }

    pub fn next_login_field(&mut self) {
        let fields = self.login_fields();
        let idx = fields.iter().position(|f| *f == self.login_field).unwrap_or(0);
        self.login_field = fields[(idx + 1) % fields.len()];
    }

    pub fn prev_login_field(&mut self) {
        let fields = self.login_fields();
        let idx = fields.iter().position(|f| *f == self.login_field).unwrap_or(0);
        self.login_field = fields[(idx + fields.len() - 1) % fields.len()];
    }

    pub fn focused_input(&mut self) -> &mut TextInput {
        match self.login_field {
            LoginField::Email => &mut self.login.email,
            LoginField::Password => &mut self.login.password,
            LoginField::Name => &mut self.login.name,
            LoginField::Callback => &mut self.login.callback,
        }
    }

    pub fn toggle_login_mode(&mut self) {
        self.login_mode = match self.login_mode {
            LoginMode::SignIn => LoginMode::SignUp,
            LoginMode::SignUp => LoginMode::SignIn,
        };
        self.notice = None;
        if !self.login_fields().contains(&self.login_field) {
            self.login_field = LoginField::Email;
        }
    }

    /// Enter on the login screen: finish Google, or sign in / sign up
    pub fn submit_login(&mut self) {
        if self.is_authenticating() {
            return;
        }
        if self.login_field == LoginField::Callback {
            self.complete_google();
            return;
        }

        let email = self.login.email.value().trim().to_string();
        let password = self.login.password.value().to_string();
        if email.is_empty() || password.is_empty() {
            self.notice = Some(Notice::Error(
                "Please enter your email and password".to_string(),
            ));
            return;
        }

        self.notice = None;
        let auth = self.auth.clone();
        let mut context = self.context.clone();

        match self.login_mode {
            LoginMode::SignIn => {
                self.auth_task = Some(tokio::spawn(async move {
                    let result = auth
                        .login(&mut context, &email, &password)
                        .await
                        .map(|_| AuthOutcome::SignedIn);
                    (context, result)
                }));
            }
            LoginMode::SignUp => {
                let name = self.login.name.value().trim().to_string();
                self.auth_task = Some(tokio::spawn(async move {
                    let name = (!name.is_empty()).then_some(name);
                    let result = auth
                        .signup(&email, &password, name.as_deref())
                        .await
                        .map(|_| AuthOutcome::SignedUp);
                    (context, result)
                }));
            }
        }
    }

    pub fn start_google(&mut self) {
        if self.is_authenticating() {
            return;
        }

        self.notice = None;
        let auth = self.auth.clone();
        let mut context = self.context.clone();
        self.auth_task = Some(tokio::spawn(async move {
            let result = auth.google(&mut context).await.map(AuthOutcome::Google);
            (context, result)
        }));
    }

    /// Read the token out of a pasted OAuth callback URL (or one given on the CLI)
    pub fn complete_google_with(&mut self, callback_url: &str) {
        match self.auth.complete_google(&mut self.context, callback_url.trim()) {
            Ok(()) => {
                info!("Signed in via Google callback");
                self.login.awaiting_callback = false;
                self.login.callback.clear();
                self.open_chat();
            }
            Err(e) => self.notice = Some(Notice::Error(e.to_string())),
        }
    }

    fn complete_google(&mut self) {
        let callback = self.login.callback.value().to_string();
        self.complete_google_with(&callback);
    }

    pub fn reset_password(&mut self) {
        let email = self.login.email.value().trim().to_string();
        if email.is_empty() {
            self.notice = Some(Notice::Error("Enter your email first".to_string()));
            return;
        }

        self.notice = Some(match self.auth.reset_password(&email) {
            Ok(()) => Notice::Success(format!("A reset link has been sent to {}", email)),
            Err(e) => Notice::Error(e.to_string()),
        });
    }

    /// Collect a finished auth request, if any
    pub async fn poll_auth_task(&mut self) {
        if !self.auth_task.as_ref().is_some_and(|task| task.is_finished()) {
            return;
        }
        let Some(task) = self.auth_task.take() else {
            return;
        };

        match task.await {
            Ok((context, result)) => {
                self.context = context;
                self.apply_auth_result(result);
            }
            Err(e) => {
                error!("Auth task failed: {}", e);
                self.notice = Some(Notice::Error("Something went wrong".to_string()));
            }
        }
    }

    pub fn apply_auth_result(&mut self, result: Result<AuthOutcome, AuthError>) {
        match result {
            Ok(AuthOutcome::SignedIn) | Ok(AuthOutcome::Google(GoogleSignIn::SignedIn(_))) => {
                self.login.password.clear();
                self.notice = None;
                self.open_chat();
            }
            Ok(AuthOutcome::SignedUp) => {
                self.login_mode = LoginMode::SignIn;
                self.login_field = LoginField::Password;
                self.login.password.clear();
                self.login.name.clear();
                self.notice = Some(Notice::Success(
                    "Account created! Please sign in.".to_string(),
                ));
            }
            Ok(AuthOutcome::Google(GoogleSignIn::Redirect(url))) => {
                self.login.awaiting_callback = true;
                self.login_field = LoginField::Callback;
                self.notice = Some(Notice::Info(format!(
                    "Open {} in your browser, then paste the address you land on below",
                    url
                )));
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.notice = Some(Notice::Error(e.to_string()));
            }
        }
    }

    // Chat

    /// Start a brand-new chat session, replacing any previous one
    pub fn open_chat(&mut self) {
        self.close_chat();
        self.screen = Screen::Chat;
        self.chat_scroll = 0;
        self.follow_chat = true;

        match ChatSession::connect(self.config.ws_url(), self.session_events.clone()) {
            Ok(session) => {
                self.chat_error = None;
                self.session = Some(session);
            }
            Err(e) => {
                error!("Could not start chat session: {:#}", e);
                self.chat_error = Some(e.to_string());
            }
        }
    }

    pub fn close_chat(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    /// Manual retry after a failure or disconnect
    pub fn reconnect(&mut self) {
        let finished = self
            .session
            .as_ref()
            .map_or(true, |s| s.state().is_terminal());
        if finished {
            info!("Reconnecting chat");
            self.open_chat();
        }
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!("Dropping channel event with no active session");
            return;
        };
        if !session.accepts(&event) {
            debug!("Dropping stale channel event for {}", event.session_id.short());
            return;
        }

        if let Some(transition) = session.handle(event.event) {
            if let ConnectionState::Failed { reason } = &transition.to {
                self.chat_error = Some(reason.clone());
            }
        }
        self.follow_chat = true;
    }

    /// Whether the input box accepts text right now
    pub fn can_send(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| *s.state() == ConnectionState::Open && !s.is_awaiting_reply())
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_awaiting_reply())
    }

    pub fn send_message(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.send(self.chat_input.value()) {
            Ok(()) => {
                self.chat_input.clear();
                self.follow_chat = true;
            }
            // Guards the UI already enforces; nothing to show
            Err(e @ (SendError::NotOpen(_) | SendError::EmptyMessage | SendError::AwaitingReply)) => {
                debug!("Send suppressed: {}", e);
            }
            Err(SendError::ChannelClosed) => {
                self.chat_error = Some("Connection lost".to_string());
            }
        }
    }

    pub fn logout(&mut self) {
        self.close_chat();
        if let Err(e) = self.context.sign_out() {
            error!("Failed to clear saved session: {:#}", e);
        }
        self.chat_input.clear();
        self.chat_error = None;
        self.login = LoginForm::default();
        self.login_mode = LoginMode::SignIn;
        info!("Signed out");
        self.show_landing();
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.follow_chat = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Renderer re-pins to the bottom once the scroll reaches it again
    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    /// Tick animation frame and check for overdue replies (called by Tick event)
    pub fn tick(&mut self, now: Instant) {
        if self.is_awaiting_reply() || self.is_authenticating() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        if let (Some(session), Some(timeout)) = (self.session.as_mut(), self.config.reply_timeout()) {
            if session.check_reply_timeout(now, timeout) {
                self.follow_chat = true;
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.close_chat();
        if let Some(task) = self.auth_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refuge_core::channel::Outbound;
    use refuge_core::{ChannelEvent, Role, SessionId};
    use std::time::Duration;

    fn app(dir: &std::path::Path) -> (App, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Config {
            // Nothing listens here; sessions stay in Connecting until events are injected
            ws_url: Some("ws://127.0.0.1:9".to_string()),
            reply_timeout_secs: Some(1),
            ..Config::new()
        };
        let context = SessionContext::load(dir).unwrap();
        (App::new(config, dir.to_path_buf(), context, tx), rx)
    }

    /// Chat screen over an in-memory transport; the receiver sees outbound frames
    fn attach_session(app: &mut App) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        app.screen = Screen::Chat;
        app.session = Some(ChatSession::new(SessionId::generate(), tx));
        rx
    }

    fn inject(app: &mut App, event: ChannelEvent) {
        let session_id = app.session.as_ref().unwrap().id().clone();
        app.handle_session_event(SessionEvent { session_id, event });
    }

    #[tokio::test]
    async fn test_get_started_requires_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());

        app.get_started();
        assert_eq!(app.screen, Screen::Login);
        assert!(app.session.is_none());
    }

    #[tokio::test]
    async fn test_chat_flow_and_input_gate() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        let mut outbound = attach_session(&mut app);
        assert!(!app.can_send());

        inject(&mut app, ChannelEvent::Opened);
        assert!(app.can_send());

        app.chat_input.insert_str("Where is the nearest shelter?");
        app.send_message();
        assert_eq!(app.chat_input.value(), "");
        assert!(!app.can_send());
        assert!(matches!(
            outbound.try_recv(),
            Ok(Outbound::Frame(text)) if text == "Where is the nearest shelter?"
        ));

        inject(&mut app, ChannelEvent::Frame("- Central Hall".to_string()));
        assert!(app.can_send());

        let transcript = app.session.as_ref().unwrap().transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.last().unwrap().role, Role::Agent);
    }

    #[tokio::test]
    async fn test_events_from_replaced_session_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        app.open_chat();
        let old_id = app.session.as_ref().unwrap().id().clone();

        app.open_chat();
        inject(&mut app, ChannelEvent::Opened);
        app.handle_session_event(SessionEvent {
            session_id: old_id,
            event: ChannelEvent::Frame("stale".to_string()),
        });

        assert_eq!(app.session.as_ref().unwrap().transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_shows_error_and_reconnect_starts_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        app.open_chat();
        let first_id = app.session.as_ref().unwrap().id().clone();

        inject(&mut app, ChannelEvent::Failed("connection refused".to_string()));
        assert_eq!(app.chat_error.as_deref(), Some("connection refused"));

        app.reconnect();
        let session = app.session.as_ref().unwrap();
        assert_ne!(session.id(), &first_id);
        assert_eq!(session.state(), &ConnectionState::Connecting);
        assert!(app.chat_error.is_none());
    }

    #[tokio::test]
    async fn test_reply_timeout_on_tick() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        let _outbound = attach_session(&mut app);
        inject(&mut app, ChannelEvent::Opened);
        app.chat_input.insert_str("hello");
        app.send_message();

        app.tick(Instant::now() + Duration::from_secs(2));
        assert!(app.can_send());
        assert_eq!(app.session.as_ref().unwrap().transcript().len(), 3);
    }

    #[tokio::test]
    async fn test_logout_returns_to_landing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        app.context
            .persist(Some(refuge_core::User::from_email("amal@example.org")))
            .unwrap();
        app.get_started();
        assert_eq!(app.screen, Screen::Chat);

        app.logout();
        assert_eq!(app.screen, Screen::Landing);
        assert!(app.session.is_none());
        assert!(!app.context.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_form_navigation_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        app.show_login();

        app.next_login_field();
        assert_eq!(app.login_field, LoginField::Password);
        app.next_login_field();
        assert_eq!(app.login_field, LoginField::Email);

        app.toggle_login_mode();
        app.prev_login_field();
        assert_eq!(app.login_field, LoginField::Name);

        app.submit_login();
        assert!(matches!(app.notice, Some(Notice::Error(_))));
        assert!(!app.is_authenticating());
    }

    #[tokio::test]
    async fn test_leaving_login_drops_pending_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        app.show_login();

        let context = app.context.clone();
        app.auth_task = Some(tokio::spawn(async move {
            (context, Ok(AuthOutcome::SignedIn))
        }));
        app.show_landing();
        assert!(!app.is_authenticating());

        tokio::task::yield_now().await;
        app.poll_auth_task().await;
        assert_eq!(app.screen, Screen::Landing);
        assert!(app.session.is_none());
    }

    #[tokio::test]
    async fn test_signup_result_switches_to_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        app.show_login();
        app.toggle_login_mode();

        app.apply_auth_result(Ok(AuthOutcome::SignedUp));
        assert_eq!(app.login_mode, LoginMode::SignIn);
        assert_eq!(
            app.notice,
            Some(Notice::Success("Account created! Please sign in.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_google_redirect_then_callback() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app(dir.path());
        app.show_login();

        app.apply_auth_result(Ok(AuthOutcome::Google(GoogleSignIn::Redirect(
            "http://127.0.0.1:8000/auth/login/google".to_string(),
        ))));
        assert_eq!(app.login_field, LoginField::Callback);

        app.login.callback.insert_str("http://localhost/login?token=abc");
        app.submit_login();
        assert_eq!(app.context.access_token(), Some("abc"));
        assert_eq!(app.screen, Screen::Chat);
    }
}
