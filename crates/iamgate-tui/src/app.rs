//! Mount loop.
//!
//! Every pass runs the handshake, renders the branch it settles on and waits
//! for one action. Login and logout leave the alternate screen while they
//! run, then the view is mounted again.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use iamgate_core::identity::IdentityClient;
use iamgate_core::interrupt::{self, InterruptedError};
use iamgate_core::{IamService, InitOutcome};

use crate::terminal::{self, TerminalSession};
use crate::view::{self, Action, ViewModel};

/// Poll duration while waiting for input.
const IDLE_POLL_DURATION: Duration = Duration::from_millis(100);

/// Settings for the view root.
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// Role reported as "Has Default Roles?"
    pub default_role: String,
}

/// Runs the interactive view until the user quits.
///
/// # Errors
/// Returns an error if the terminal cannot be driven, or
/// [`InterruptedError`] if a login was interrupted.
pub async fn run<C: IdentityClient>(
    service: &mut IamService<C>,
    options: &ViewOptions,
) -> Result<()> {
    terminal::install_panic_hook();
    interrupt::set_restore_hook(|| {
        let _ = terminal::restore_terminal();
    });

    loop {
        interrupt::reset();
        service.initialize().await;
        let model = ViewModel::from_service(service, &options.default_role);

        let action = {
            let mut session = TerminalSession::enter()?;
            wait_for_action(&mut session, &model)?
        };

        match action {
            Action::Quit => return Ok(()),
            Action::Login => {
                let result = service.login().await;
                handle_action_result("login", result)?;
            }
            Action::Logout => {
                let result = service.logout().await;
                handle_action_result("logout", result)?;
            }
        }
    }
}

/// Initializes once and prints the view as plain text.
///
/// # Errors
/// Returns an error if writing to `out` fails.
pub async fn render_once<C: IdentityClient, W: Write>(
    service: &mut IamService<C>,
    options: &ViewOptions,
    out: &mut W,
) -> Result<InitOutcome> {
    let outcome = service.initialize().await;
    let model = ViewModel::from_service(service, &options.default_role);
    writeln!(out, "{}", view::plain_text(&model))?;
    Ok(outcome)
}

/// Failures of view actions are logged only; interrupts end the loop.
fn handle_action_result(action: &str, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.downcast_ref::<InterruptedError>().is_some() => Err(e),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "{action} failed");
            Ok(())
        }
    }
}

fn wait_for_action(session: &mut TerminalSession, model: &ViewModel) -> Result<Action> {
    session
        .terminal
        .draw(|frame| view::render(frame, frame.area(), model))?;

    loop {
        if interrupt::is_interrupted() {
            return Ok(Action::Quit);
        }
        if !event::poll(IDLE_POLL_DURATION)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if let Some(action) = view::action_for_key(model, key) {
                    return Ok(action);
                }
            }
            Event::Resize(_, _) => {
                session
                    .terminal
                    .draw(|frame| view::render(frame, frame.area(), model))?;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use iamgate_core::identity::{InitOptions, OnLoad, PkceMethod};
    use iamgate_core::testing::FakeIdentityClient;

    use super::*;

    fn service(client: FakeIdentityClient) -> IamService<FakeIdentityClient> {
        IamService::new(
            client,
            InitOptions {
                on_load: OnLoad::CheckSso,
                silent_check_sso_redirect_uri: "http://127.0.0.1:8976/silent-check-sso.html"
                    .parse()
                    .unwrap(),
                pkce_method: PkceMethod::S256,
                silent_check_sso_browser: false,
            },
        )
    }

    fn options() -> ViewOptions {
        ViewOptions {
            default_role: "default-roles-myrealm".to_string(),
        }
    }

    #[tokio::test]
    async fn test_render_once_initializes_before_rendering() {
        let mut svc = service(FakeIdentityClient::signed_in(
            "alice",
            &["default-roles-myrealm"],
        ));
        let mut out = Vec::new();

        let outcome = render_once(&mut svc, &options(), &mut out).await.unwrap();

        assert_eq!(outcome, InitOutcome::Authenticated);
        assert_eq!(svc.client().init_calls, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Signed in as alice"));
        assert!(text.contains("Has Default Roles? Yes"));
    }

    #[tokio::test]
    async fn test_render_once_after_failed_handshake() {
        let mut client = FakeIdentityClient::signed_in("alice", &[]);
        client.fail_init = true;
        let mut svc = service(client);
        let mut out = Vec::new();

        let outcome = render_once(&mut svc, &options(), &mut out).await.unwrap();

        assert_eq!(outcome, InitOutcome::Failed);
        assert!(String::from_utf8(out).unwrap().contains("Please authenticate yourself!"));
    }

    #[test]
    fn test_action_failures_are_logged_not_returned() {
        assert!(handle_action_result("login", Err(anyhow::anyhow!("cancelled"))).is_ok());
        assert!(handle_action_result("login", Err(InterruptedError.into())).is_err());
    }
}
