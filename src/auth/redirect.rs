use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use url::Url;
use super::errors::{AuthError, Result};

const MAX_HEADER_LINES: usize = 100;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const SIGNED_IN: &str = "You are signed in. You can close this window.";
const SIGN_IN_ERROR: &str = "Authentication error. You may close this window.";
const WAITING: &str = "Waiting for Google authentication...";

/// What a single redirect request carried.
#[derive(Debug, PartialEq, Eq)]
enum Redirect {
    Code(String),
    Error(String),
    Other,
}

/// Loopback HTTP listener receiving the provider's consent redirect.
pub struct RedirectListener {
    listener: TcpListener,
}

impl RedirectListener {
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr).await?;
        tracing::debug!(%addr, "Listening for authorization redirect");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn redirect_uri(&self) -> Result<String> {
        let addr = self.local_addr()?;
        Ok(format!("http://{}:{}", addr.ip(), addr.port()))
    }

    /// Serves redirect requests until one carries a `code` (matching
    /// `expected_state` when given) or an `error`, or until `timeout` elapses.
    pub async fn wait_for_code(self, expected_state: Option<&str>, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, self.accept_loop(expected_state))
            .await
            .map_err(|_| AuthError::Timeout(timeout))?
    }

    /// Each connection is served on its own task so an idle socket (a browser
    /// preconnect, say) never holds up the redirect that carries the code.
    async fn accept_loop(&self, expected_state: Option<&str>) -> Result<String> {
        let expected_state = expected_state.map(str::to_string);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    let expected_state = expected_state.clone();
                    connections.spawn(async move {
                        let served = tokio::time::timeout(
                            CONNECTION_TIMEOUT,
                            handle_connection(stream, expected_state.as_deref()),
                        ).await;
                        (peer, served)
                    });
                }
                Some(joined) = connections.join_next() => {
                    let (peer, served) = match joined {
                        Ok(finished) => finished,
                        Err(err) => {
                            tracing::debug!(error = %err, "Redirect connection task failed");
                            continue;
                        }
                    };
                    match served {
                        Ok(Ok(Redirect::Code(code))) => return Ok(code),
                        Ok(Ok(Redirect::Error(error))) => return Err(AuthError::AuthorizationDenied(error)),
                        Ok(Ok(Redirect::Other)) => {}
                        Ok(Err(err)) => {
                            tracing::debug!(%peer, error = %err, "Dropped malformed redirect request");
                        }
                        Err(_) => {
                            tracing::debug!(%peer, "Dropped idle redirect connection");
                        }
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, expected_state: Option<&str>) -> std::io::Result<Redirect> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain headers so the client sees a clean response.
    for _ in 0..MAX_HEADER_LINES {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let redirect = parse_request_line(&request_line, expected_state);
    let body = match &redirect {
        Redirect::Code(_) => SIGNED_IN,
        Redirect::Error(_) => SIGN_IN_ERROR,
        Redirect::Other => WAITING,
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(redirect)
}

fn parse_request_line(line: &str, expected_state: Option<&str>) -> Redirect {
    let mut parts = line.split_whitespace();
    let (Some(_method), Some(target)) = (parts.next(), parts.next()) else {
        return Redirect::Other;
    };

    let url = match Url::parse("http://127.0.0.1").and_then(|base| base.join(target)) {
        Ok(url) => url,
        Err(_) => return Redirect::Other,
    };

    let mut code = None;
    let mut error = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Redirect::Error(error);
    }

    match (code, expected_state) {
        (Some(code), Some(expected)) if state.as_deref() == Some(expected) => Redirect::Code(code),
        (Some(_), Some(_)) => {
            tracing::warn!("Ignoring authorization redirect with mismatched state");
            Redirect::Other
        }
        (Some(code), None) => Redirect::Code(code),
        (None, _) => Redirect::Other,
    }
}
