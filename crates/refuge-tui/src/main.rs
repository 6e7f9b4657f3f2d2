use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

mod app;
mod handler;
mod input;
mod tui;
mod ui;

use app::App;
use refuge_core::{
    annotate, ChannelEvent, ChatSession, Config, ConnectionState, LineKind, MessageEntry,
    SessionContext,
};
use tui::EventHandler;

const LOG_FILE: &str = "refuge.log";

#[derive(Parser)]
#[command(name = "refuge")]
#[command(about = "Chat with the Refugee First assistant from your terminal")]
#[command(version)]
struct Cli {
    /// Base URL of the auth API
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Base URL of the chat WebSocket
    #[arg(long, global = true)]
    ws_url: Option<String>,
    /// Finish a Google sign-in with the address the browser landed on
    #[arg(long)]
    callback: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and print the reply
    Ask {
        /// Your question
        question: String,
        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
        /// Seconds to wait for the connection and the reply
        #[arg(short, long, default_value = "120")]
        timeout: u64,
    },
    /// Forget the signed-in user on this device
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = Some(url);
    }
    if let Some(url) = cli.ws_url {
        config.ws_url = Some(url);
    }

    let data_dir = Config::data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {:?}", data_dir))?;
    init_logging(&data_dir)?;

    let mut context = SessionContext::load(&data_dir)?;

    match cli.command {
        Some(Commands::Ask { question, json, timeout }) => {
            ask(&config, &context, &question, json, Duration::from_secs(timeout)).await
        }
        Some(Commands::Logout) => {
            context.sign_out()?;
            println!("Signed out.");
            Ok(())
        }
        None => run_tui(config, data_dir, context, cli.callback).await,
    }
}

/// Log to a file in the data dir; stderr belongs to the terminal UI
fn init_logging(data_dir: &Path) -> Result<()> {
    let path = data_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

async fn run_tui(
    config: Config,
    data_dir: std::path::PathBuf,
    context: SessionContext,
    callback: Option<String>,
) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(config, data_dir, context, events.session_sender());
    info!("Refugee First v{} started", env!("CARGO_PKG_VERSION"));

    if let Some(callback) = callback {
        app.show_login();
        app.complete_google_with(&callback);
    }

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    app.shutdown();
    tui::restore()?;

    if let Err(e) = &result {
        error!("Exited with error: {:#}", e);
    }
    result
}

async fn run_loop(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
        app.poll_auth_task().await;
    }
    Ok(())
}

/// Headless one-shot: connect, send `question`, print the first reply
async fn ask(
    config: &Config,
    context: &SessionContext,
    question: &str,
    json: bool,
    timeout: Duration,
) -> Result<()> {
    if !context.is_authenticated() {
        bail!("Not signed in. Run `refuge` to sign in first.");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ChatSession::connect(config.ws_url(), tx)?;

    let reply = tokio::time::timeout(timeout, async {
        while let Some(event) = rx.recv().await {
            if !session.accepts(&event) {
                continue;
            }

            match event.event {
                ChannelEvent::Opened => {
                    session.handle(ChannelEvent::Opened);
                    session.send(question)?;
                }
                ChannelEvent::Frame(raw) => {
                    if session.on_receive(&raw) {
                        return Ok(session.transcript().last().cloned());
                    }
                }
                other => {
                    session.handle(other);
                    if let ConnectionState::Failed { reason } = session.state() {
                        bail!("Connection failed: {}", reason);
                    }
                    bail!("Connection closed before a reply arrived");
                }
            }
        }
        Ok::<Option<MessageEntry>, anyhow::Error>(None)
    })
    .await;

    session.close();

    let entry = match reply {
        Ok(result) => result?.context("No reply received")?,
        Err(_) => bail!("No reply within {}s", timeout.as_secs()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        print_entry(&entry);
    }
    Ok(())
}

fn print_entry(entry: &MessageEntry) {
    for line in annotate(&entry.content) {
        match line.kind {
            LineKind::SectionBanner => println!("== {} ==", line.text),
            LineKind::PhaseBanner => println!("-- {} --", line.text),
            LineKind::ListItem => println!("  • {}", line.text),
            LineKind::Paragraph => println!("{}", line.text),
            LineKind::Blank => println!(),
        }
    }

    if let Some(link) = &entry.document_link {
        println!();
        println!("Download Full Survival Guide (PDF with Maps): {}", link);
    }
}
