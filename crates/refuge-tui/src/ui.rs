use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use refuge_core::{annotate, ConnectionState, LineKind, MessageEntry, Role};

use crate::app::{App, LoginField, LoginMode, Notice, Screen};
use crate::input::TextInput;

const DOCUMENT_LABEL: &str = "Download Full Survival Guide (PDF with Maps)";

/// Wrap text to fit within a given width, returning multiple lines
/// Breaks at word boundaries; a word wider than the line (a URL, say) is cut
/// into width-sized pieces so nothing runs off the edge
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    let pieces = text.split_whitespace().flat_map(|word| {
        let chars: Vec<char> = word.chars().collect();
        chars
            .chunks(width)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<_>>()
    });

    for word in pieces {
        let word_len = word.chars().count();

        if current_len == 0 {
            current_line = word;
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(&word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current_line));
            current_line = word;
            current_len = word_len;
        }
    }

    if !current_line.is_empty() || lines.is_empty() {
        lines.push(current_line);
    }
    lines
}

/// Pre-wrapped lines for one transcript entry, so the row count is exact
fn entry_lines(entry: &MessageEntry, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    match entry.role {
        Role::User => {
            lines.push(Line::from(Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            for row in entry.content.lines().flat_map(|l| wrap_text_to_width(l, width)) {
                lines.push(Line::from(row));
            }
        }
        Role::Agent => {
            lines.push(Line::from(Span::styled(
                "Refugee First:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            for annotated in annotate(&entry.content) {
                lines.extend(annotated_lines(annotated.kind, &annotated.text, width));
            }
            if let Some(link) = &entry.document_link {
                lines.push(Line::default());
                lines.push(Line::from(vec![
                    Span::styled(" PDF ", Style::default().bg(Color::Blue).fg(Color::White).bold()),
                    Span::raw(" "),
                    Span::styled(DOCUMENT_LABEL, Style::default().fg(Color::Blue).bold()),
                ]));
                for row in wrap_text_to_width(link, width) {
                    lines.push(Line::from(Span::styled(
                        row,
                        Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
                    )));
                }
            }
        }
    }

    lines.push(Line::default());
    lines
}

fn annotated_lines(kind: LineKind, text: &str, width: usize) -> Vec<Line<'static>> {
    match kind {
        LineKind::SectionBanner => banner(text, width, Style::default().bg(Color::Red).fg(Color::White)),
        LineKind::PhaseBanner => banner(text, width, Style::default().bg(Color::Yellow).fg(Color::Black)),
        LineKind::ListItem => wrap_text_to_width(text, width.saturating_sub(2))
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let marker = if i == 0 {
                    Span::styled("• ", Style::default().fg(Color::Green).bold())
                } else {
                    Span::raw("  ")
                };
                Line::from(vec![marker, Span::raw(row)])
            })
            .collect(),
        LineKind::Paragraph => wrap_text_to_width(text, width)
            .into_iter()
            .map(Line::from)
            .collect(),
        LineKind::Blank => vec![Line::default()],
    }
}

fn banner(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    wrap_text_to_width(text, width.saturating_sub(2))
        .into_iter()
        .map(|row| Line::from(Span::styled(format!(" {} ", row), style.add_modifier(Modifier::BOLD))))
        .collect()
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Landing => render_landing(frame, body_area),
        Screen::Login => {
            render_landing(frame, body_area);
            render_login(app, frame, body_area);
        }
        Screen::Chat => render_chat(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(
        " Refugee First ",
        Style::default().fg(Color::Cyan).bold(),
    )];

    if let Some(user) = app.context.user() {
        spans.push(Span::styled(
            format!(" {} ", user.display_name()),
            Style::default().fg(Color::White),
        ));
    } else if app.context.access_token().is_some() {
        spans.push(Span::styled(" signed in ", Style::default().fg(Color::White)));
    }

    if let Some(session) = &app.session {
        let color = match session.state() {
            ConnectionState::Connecting => Color::Yellow,
            ConnectionState::Open => Color::Green,
            ConnectionState::Closed => Color::Gray,
            ConnectionState::Failed { .. } => Color::Red,
        };
        spans.push(Span::styled(
            format!(" [{}] ", session.state().label()),
            Style::default().fg(color),
        ));
    }

    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut keys: Vec<(&str, &str)> = match app.screen {
        Screen::Landing => vec![("Enter", "get started"), ("q", "quit")],
        Screen::Login => {
            let toggle = match app.login_mode {
                LoginMode::SignIn => "sign up",
                LoginMode::SignUp => "sign in",
            };
            vec![
                ("Tab", "next field"),
                ("Enter", "submit"),
                ("^T", toggle),
                ("^G", "google"),
                ("^R", "reset password"),
                ("Esc", "back"),
            ]
        }
        Screen::Chat => {
            let mut keys = vec![("Enter", "send"), ("PgUp/PgDn", "scroll")];
            let finished = app.session.as_ref().map_or(true, |s| s.state().is_terminal());
            if finished {
                keys.push(("^R", "reconnect"));
            }
            keys.push(("^L", "sign out"));
            keys
        }
    };
    keys.push(("^C", "quit"));

    let mut hints = Vec::new();
    for (key, label) in keys {
        hints.push(Span::styled(format!(" {} ", key), key_style));
        hints.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_landing(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::default(),
        Line::from(Span::styled(
            "Refugee First",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from("Practical guidance for your first hours, days and weeks."),
        Line::from("Ask about shelter, food, documents, health care or getting around."),
        Line::default(),
        Line::from(Span::styled(
            "Press Enter to get started",
            Style::default().fg(Color::Yellow),
        )),
    ];

    let landing = Paragraph::new(Text::from(lines))
        .alignment(ratatui::layout::Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));

    frame.render_widget(landing, area);
}

fn render_login(app: &App, frame: &mut Frame, area: Rect) {
    let fields = app.login_fields();

    // Title, notice, and a label + input row per field
    let popup_width = 64.min(area.width.saturating_sub(4));
    let popup_height = (fields.len() as u16 * 3 + 6).min(area.height);
    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let title = match app.login_mode {
        LoginMode::SignIn => " Sign in ",
        LoginMode::SignUp => " Create an account ",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let notice = if app.is_authenticating() {
        let dots = ".".repeat(app.animation_frame as usize + 1);
        Line::from(Span::styled(
            format!("Please wait{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else {
        match &app.notice {
            Some(Notice::Error(text)) => Line::from(Span::styled(text.clone(), Style::default().fg(Color::Red))),
            Some(Notice::Success(text)) => Line::from(Span::styled(text.clone(), Style::default().fg(Color::Green))),
            Some(Notice::Info(text)) => Line::from(Span::styled(text.clone(), Style::default().fg(Color::Cyan))),
            None => Line::default(),
        }
    };
    let notice_area = Rect::new(inner.x, inner.y, inner.width, 2.min(inner.height));
    frame.render_widget(Paragraph::new(notice).wrap(Wrap { trim: true }), notice_area);

    let mut y = inner.y + 3;
    for field in fields {
        if y + 1 >= inner.y + inner.height {
            break;
        }

        let (label, input, masked) = match field {
            LoginField::Email => ("Email", &app.login.email, false),
            LoginField::Password => ("Password", &app.login.password, true),
            LoginField::Name => ("Name (optional)", &app.login.name, false),
            LoginField::Callback => ("Callback address", &app.login.callback, false),
        };
        let focused = field == app.login_field;

        let label_style = if focused {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        frame.render_widget(
            Paragraph::new(Span::styled(label, label_style)),
            Rect::new(inner.x, y, inner.width, 1),
        );

        let input_area = Rect::new(inner.x, y + 1, inner.width, 1);
        let cursor_x = render_input_line(frame, input, masked, input_area);
        if focused && !app.is_authenticating() {
            frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
        }

        y += 3;
    }
}

/// Draw one line of an input, scrolled so the cursor stays visible.
/// Returns the cursor column within `area`.
fn render_input_line(frame: &mut Frame, input: &TextInput, masked: bool, area: Rect) -> u16 {
    let (visible, cursor_col) = input.visible(area.width as usize);
    let text = if masked {
        "*".repeat(visible.chars().count())
    } else {
        visible
    };

    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::Cyan)),
        area,
    );
    cursor_col as u16
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let banner = chat_banner(app);
    let banner_height = if banner.is_some() { 1 } else { 0 };

    let [banner_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(banner_height),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    if let Some(banner) = banner {
        frame.render_widget(banner, banner_area);
    }

    let title = app
        .session
        .as_ref()
        .map(|s| format!(" Chat {} ", s.id().short()))
        .unwrap_or_else(|| " Chat ".to_string());
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);

    let inner_width = chat_area.width.saturating_sub(2) as usize;
    let inner_height = chat_area.height.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();
    if let Some(session) = &app.session {
        for entry in session.transcript().entries() {
            lines.extend(entry_lines(entry, inner_width));
        }
    }

    if app.is_awaiting_reply() {
        lines.push(Line::from(Span::styled(
            "Refugee First:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    // Follow the newest entry unless the user scrolled up
    let max_scroll = keep_scrollable_tail(&mut lines, inner_height);
    if app.follow_chat || app.chat_scroll >= max_scroll {
        app.chat_scroll = max_scroll;
        app.follow_chat = true;
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let can_send = app.can_send();
    let input_title = if can_send {
        " Type your message "
    } else if app.is_awaiting_reply() {
        " Waiting for a reply "
    } else {
        " Not connected "
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if can_send { Color::Yellow } else { Color::DarkGray }))
        .title(input_title);
    let input_inner = input_block.inner(input_area);
    frame.render_widget(input_block, input_area);

    let cursor_x = render_input_line(frame, &app.chat_input, false, input_inner);
    frame.set_cursor_position((input_inner.x + cursor_x, input_inner.y));
}

/// Drop the oldest rows beyond what a `u16` scroll offset can reach.
/// Returns the offset that shows the last `height` rows.
fn keep_scrollable_tail(lines: &mut Vec<Line<'_>>, height: u16) -> u16 {
    let excess = lines.len().saturating_sub(usize::from(u16::MAX));
    lines.drain(..excess);
    u16::try_from(lines.len())
        .unwrap_or(u16::MAX)
        .saturating_sub(height)
}

/// One-line status shown above the transcript while not connected
fn chat_banner(app: &App) -> Option<Paragraph<'static>> {
    let error_style = Style::default().bg(Color::Red).fg(Color::White);

    let text = match app.session.as_ref().map(|s| s.state()) {
        Some(ConnectionState::Connecting) => {
            return Some(
                Paragraph::new(" Connecting to the assistant... ")
                    .style(Style::default().bg(Color::Yellow).fg(Color::Black)),
            );
        }
        Some(ConnectionState::Open) => return None,
        Some(ConnectionState::Failed { reason }) => {
            format!(" Connection failed: {}. Press Ctrl+R to reconnect. ", reason)
        }
        Some(ConnectionState::Closed) => {
            " Connection closed. Press Ctrl+R to reconnect. ".to_string()
        }
        None => format!(
            " {}. Press Ctrl+R to try again. ",
            app.chat_error.as_deref().unwrap_or("Not connected")
        ),
    };

    Some(Paragraph::new(text).style(error_style))
}
