//! Loopback redirect handling for the authorization-code flow.
//!
//! The provider redirects the browser to `http://127.0.0.1:<port><path>`;
//! this module accepts that request, checks `state` and extracts the code.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Path the interactive login redirects to.
pub const LOGIN_CALLBACK_PATH: &str = "/callback";

/// How long a connection may stay silent before it is dropped.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Outcome of an authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    /// The provider answered with an OAuth error (e.g. `login_required`).
    Error {
        error: String,
        description: Option<String>,
    },
}

/// A bound loopback listener waiting for one redirect.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Binds the loopback listener.
    ///
    /// # Errors
    /// Returns an error if the port is not available.
    pub async fn bind(port: u16, path: &str) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("Failed to bind callback listener on 127.0.0.1:{port}"))?;
        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    /// Waits for a redirect carrying `expected_state`.
    ///
    /// Requests for other paths or with a foreign state are answered with an
    /// error page and ignored. Returns `None` when `timeout` elapses.
    pub async fn wait(self, expected_state: &str, timeout: Duration) -> Option<CallbackOutcome> {
        tokio::time::timeout(timeout, self.accept_loop(expected_state))
            .await
            .ok()
    }

    async fn accept_loop(self, expected_state: &str) -> CallbackOutcome {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::debug!(error = %e, "callback accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            if let Some(outcome) = self.handle(stream, expected_state).await {
                return outcome;
            }
        }
    }

    async fn handle(&self, mut stream: TcpStream, expected_state: &str) -> Option<CallbackOutcome> {
        let mut buffer = [0u8; 4096];
        // browsers may preconnect without sending anything
        let Ok(read) = tokio::time::timeout(REQUEST_READ_TIMEOUT, stream.read(&mut buffer)).await
        else {
            tracing::debug!("dropping idle callback connection");
            return None;
        };
        let read = read.unwrap_or(0);
        let request = String::from_utf8_lossy(&buffer[..read]);
        let outcome = extract_outcome_from_request(&request, &self.path, expected_state);

        let response = match &outcome {
            Some(CallbackOutcome::Code(_)) => success_response(),
            Some(CallbackOutcome::Error { .. }) => error_response("Authentication was not completed"),
            None => error_response("Invalid OAuth callback"),
        };
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            tracing::debug!(error = %e, "failed to answer callback request");
        }
        outcome
    }
}

/// Parses the request line of a redirect into an outcome.
pub fn extract_outcome_from_request(
    request: &str,
    expected_path: &str,
    expected_state: &str,
) -> Option<CallbackOutcome> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;

    let url = url::Url::parse(&format!("http://localhost{path}")).ok()?;
    if url.path() != expected_path {
        return None;
    }
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
    };

    if param("state")? != expected_state {
        return None;
    }
    if let Some(error) = param("error") {
        return Some(CallbackOutcome::Error {
            error,
            description: param("error_description"),
        });
    }
    param("code").map(CallbackOutcome::Code)
}

/// Parses a pasted authorization input into code + optional state.
///
/// Accepts a bare code, a full redirect URL, or a `code=...&state=...` query.
pub fn parse_authorization_input(input: &str) -> (Option<String>, Option<String>) {
    let value = input.trim();
    if value.is_empty() {
        return (None, None);
    }

    if let Ok(url) = url::Url::parse(value) {
        let code = url.query_pairs().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v);
        return (code.map(|v| v.to_string()), state.map(|v| v.to_string()));
    }

    if value.contains("code=") {
        let params = url::form_urlencoded::parse(value.trim_start_matches('?').as_bytes())
            .collect::<Vec<_>>();
        let code = params.iter().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = params.iter().find(|(k, _)| k == "state").map(|(_, v)| v);
        return (
            code.map(std::string::ToString::to_string),
            state.map(std::string::ToString::to_string),
        );
    }

    (Some(value.to_string()), None)
}

fn success_response() -> String {
    let body = "<!doctype html><html><head><meta charset=\"utf-8\" /><title>Authentication successful</title></head><body><p>Authentication successful. Return to your terminal to continue.</p></body></html>";
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn error_response(body: &str) -> String {
    format!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}
