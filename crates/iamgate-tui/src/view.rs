//! The two view branches.
//!
//! The view model is recomputed from live facade queries before every
//! render; nothing here caches authentication state.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use iamgate_core::IamService;
use iamgate_core::identity::IdentityClient;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

/// What the view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewModel {
    Anonymous,
    Authenticated {
        /// Display name; empty when the token carries none
        name: String,
        has_default_roles: bool,
    },
}

/// User actions wired to the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Logout,
    Quit,
}

impl ViewModel {
    /// Builds the model from the facade. `role` is the role whose presence
    /// is reported as "Has Default Roles?".
    pub fn from_service<C: IdentityClient>(service: &IamService<C>, role: &str) -> Self {
        if !service.is_authenticated() {
            return ViewModel::Anonymous;
        }
        ViewModel::Authenticated {
            name: service.display_name().unwrap_or_default().to_string(),
            has_default_roles: service.has_role(role),
        }
    }

    /// The single button of the current branch.
    pub fn button(&self) -> (&'static str, Action) {
        match self {
            ViewModel::Anonymous => ("Login", Action::Login),
            ViewModel::Authenticated { .. } => ("Logout", Action::Logout),
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

/// Content lines of the current branch, button last.
pub fn view_lines(model: &ViewModel) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = match model {
        ViewModel::Anonymous => vec![
            Line::from(Span::styled("Hello!", bold.fg(Color::Cyan))),
            Line::from("Please authenticate yourself!"),
        ],
        ViewModel::Authenticated {
            name,
            has_default_roles,
        } => vec![
            Line::from(vec![
                Span::raw("Signed in as "),
                Span::styled(name.clone(), bold),
            ]),
            Line::from(vec![
                Span::raw("Has Default Roles? "),
                Span::styled(yes_no(*has_default_roles), bold),
            ]),
        ],
    };

    let (label, _) = model.button();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("[ {label} ]"),
        Style::default().add_modifier(Modifier::REVERSED),
    )));
    lines
}

/// Renders the view as plain text (one line per row).
pub fn plain_text(model: &ViewModel) -> String {
    view_lines(model)
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the view into `area`.
pub fn render(frame: &mut Frame, area: Rect, model: &ViewModel) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" iamgate ")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [body, footer] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(inner);

    frame.render_widget(Paragraph::new(view_lines(model)), body);

    let (label, _) = model.button();
    let hint = Line::from(Span::styled(
        format!("Enter: {label}  q: Quit"),
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(hint), footer);
}

/// Maps a key press to an action for the current branch.
pub fn action_for_key(model: &ViewModel, key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    match (model, key.code) {
        (_, KeyCode::Char('q') | KeyCode::Esc) => Some(Action::Quit),
        (_, KeyCode::Enter) => Some(model.button().1),
        (ViewModel::Anonymous, KeyCode::Char('l')) => Some(Action::Login),
        (ViewModel::Authenticated { .. }, KeyCode::Char('o')) => Some(Action::Logout),
        _ => None,
    }
}
