//! `qqurl`: curl for the Qumulo REST API.
//!
//! Logs in with the given credentials, issues one request and prints the
//! response body. For `PUT`, `POST` and `PATCH` the request body is read
//! from stdin.
//!
//! ```text
//! qqurl --host 10.0.0.5 --password secret GET /v1/version
//! echo '{"name":"d","action":"CREATE_DIRECTORY"}' | qqurl --password secret POST /v1/files/%2F/entries/
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use libcsi::config::TRANSPORT_CONFIG;
use libcsi::rest::{Connection, Method, ReqwestSender};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host to connect to
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to connect to
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Username to connect as
    #[arg(long, default_value = "admin")]
    username: String,

    /// Password to use
    #[arg(long, default_value = "")]
    password: String,

    /// Enable logging (filtered by RUST_LOG, default debug)
    #[arg(long)]
    logging: bool,

    /// HTTP verb, case-insensitive
    verb: String,

    /// Request URI, e.g. /v1/version
    uri: String,
}

fn takes_body(method: &Method) -> bool {
    [Method::PUT, Method::POST, Method::PATCH].contains(method)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.logging {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let method = Method::from_bytes(cli.verb.to_uppercase().as_bytes())
        .with_context(|| format!("invalid verb {:?}", cli.verb))?;

    let body = if takes_body(&method) {
        let mut body = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut body)
            .await
            .context("reading request body from stdin")?;
        Some(body)
    } else {
        None
    };

    let sender = ReqwestSender::new(&TRANSPORT_CONFIG).context("building HTTP client")?;
    let mut connection = Connection::new(
        cli.host,
        cli.port,
        cli.username,
        cli.password,
        Arc::new(sender),
    );

    debug!(verb = %method, uri = %cli.uri, "sending request");
    let response = connection
        .call(method, &cli.uri, body.as_deref())
        .await
        .with_context(|| format!("request to {} failed", cli.uri))?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&response).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let cli = Cli::try_parse_from(["qqurl", "get", "/v1/version"]).unwrap();
        assert_eq!(cli.host, "localhost");
        assert_eq!(cli.port, 8000);
        assert_eq!(cli.username, "admin");
        assert!(cli.password.is_empty());
        assert!(!cli.logging);
        assert_eq!(cli.verb, "get");
    }

    #[test]
    fn parses_options() {
        let cli = Cli::try_parse_from([
            "qqurl", "--host", "q1", "--port", "443", "--password", "pw", "--logging", "POST",
            "/v1/files/quotas/",
        ])
        .unwrap();
        assert_eq!(cli.host, "q1");
        assert_eq!(cli.port, 443);
        assert!(cli.logging);
        assert_eq!(cli.uri, "/v1/files/quotas/");
    }

    #[test]
    fn body_verbs() {
        assert!(takes_body(&Method::POST));
        assert!(takes_body(&Method::PATCH));
        assert!(!takes_body(&Method::GET));
        assert!(!takes_body(&Method::DELETE));
    }

    #[test]
    fn requires_verb_and_uri() {
        assert!(Cli::try_parse_from(["qqurl", "GET"]).is_err());
    }
}
