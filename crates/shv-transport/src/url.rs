//! Dispatches a `scheme://...` SHV connection URL to the right transport
//! (spec §6.1).
//!
//! | scheme                    | transport                      |
//! |----------------------------|--------------------------------|
//! | `tcp`, `tcps`               | [`Transport::tcp`]/[`Transport::tcp_tls`] |
//! | `ws`, `wss`                  | [`Transport::websocket`] (feature `websocket`) |
//! | `unix`, `localsocket`        | [`Transport::unix`]            |
//! | `serial`, `serialport`, `tty`| [`Transport::serial`]           |
//! | `pipe`                       | [`Transport::pipe`]             |
//!
//! Opening a real serial port or named pipe is platform-specific device
//! setup this crate doesn't do; those three schemes parse fine but
//! `connect`/`listen` reject them — callers wire up the device themselves
//! and hand the resulting stream to `Transport::serial`/`Transport::pipe`
//! directly.

use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::error::{TransportError, UrlError};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectUrl {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    /// `?password=…&user=…&devid=…` etc. (spec §6.1 "Options").
    pub options: std::collections::BTreeMap<String, String>,
}

/// Splits a trailing `?key=val&...` query string off `rest`, returning
/// the remainder and the parsed option map.
fn split_query(rest: &str) -> (&str, std::collections::BTreeMap<String, String>) {
    let mut options = std::collections::BTreeMap::new();
    let Some((body, query)) = rest.split_once('?') else {
        return (rest, options);
    };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((k, v)) => options.insert(k.to_string(), v.to_string()),
            None => options.insert(pair.to_string(), String::new()),
        };
    }
    (body, options)
}

impl ConnectUrl {
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let (scheme, rest) = url.split_once("://").ok_or(UrlError::MissingScheme)?;
        let scheme = scheme.to_ascii_lowercase();
        let (rest, options) = split_query(rest);

        match scheme.as_str() {
            "tcp" | "tcps" | "ws" | "wss" => {
                let (authority, path) = match rest.split_once('/') {
                    Some((authority, path)) => (authority, Some(format!("/{path}"))),
                    None => (rest, None),
                };
                if authority.is_empty() {
                    return Err(UrlError::MissingAuthority);
                }
                let (host, port) = match authority.rsplit_once(':') {
                    Some((host, port)) => {
                        let port: u16 = port.parse().map_err(|_| UrlError::InvalidPort)?;
                        (host.to_string(), Some(port))
                    }
                    None => (authority.to_string(), None),
                };
                Ok(ConnectUrl { scheme, host: Some(host), port, path, options })
            }
            "unix" | "localsocket" | "pipe" => {
                if rest.is_empty() {
                    return Err(UrlError::MissingPath);
                }
                Ok(ConnectUrl { scheme, host: None, port: None, path: Some(rest.to_string()), options })
            }
            "serial" | "serialport" | "tty" => {
                if rest.is_empty() {
                    return Err(UrlError::MissingPath);
                }
                Ok(ConnectUrl { scheme, host: None, port: None, path: Some(rest.to_string()), options })
            }
            other => Err(UrlError::UnknownScheme(other.to_string())),
        }
    }
}

pub async fn connect(url: &str) -> Result<Transport, TransportError> {
    let parsed = ConnectUrl::parse(url)?;
    match parsed.scheme.as_str() {
        "tcp" => {
            let host = parsed.host.ok_or(UrlError::MissingAuthority)?;
            let port = parsed.port.ok_or(UrlError::InvalidPort)?;
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            Ok(Transport::tcp(stream))
        }
        "ws" | "wss" => Err(websocket_connect_unsupported()),
        "unix" | "localsocket" => {
            #[cfg(unix)]
            {
                let path = parsed.path.ok_or(UrlError::MissingPath)?;
                let stream = UnixStream::connect(path).await?;
                Ok(Transport::unix(stream))
            }
            #[cfg(not(unix))]
            {
                Err(TransportError::Url(UrlError::UnknownScheme(parsed.scheme)))
            }
        }
        "tcps" | "serial" | "serialport" | "tty" | "pipe" => {
            Err(TransportError::Url(UrlError::UnknownScheme(parsed.scheme)))
        }
        other => Err(TransportError::Url(UrlError::UnknownScheme(other.to_string()))),
    }
}

#[cfg(feature = "websocket")]
fn websocket_connect_unsupported() -> TransportError {
    TransportError::Url(UrlError::UnknownScheme(
        "ws connect requires an HTTP upgrade handshake outside this crate's URL dispatch; \
         use tokio_tungstenite::connect_async and Transport::websocket directly"
            .to_string(),
    ))
}

#[cfg(not(feature = "websocket"))]
fn websocket_connect_unsupported() -> TransportError {
    TransportError::Url(UrlError::UnknownScheme("ws".to_string()))
}

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    pub async fn accept(&self) -> Result<Transport, TransportError> {
        match self {
            Listener::Tcp(l) => {
                let (stream, _addr) = l.accept().await?;
                Ok(Transport::tcp(stream))
            }
            #[cfg(unix)]
            Listener::Unix(l) => {
                let (stream, _addr) = l.accept().await?;
                Ok(Transport::unix(stream))
            }
        }
    }
}

pub async fn listen(url: &str) -> Result<Listener, TransportError> {
    let parsed = ConnectUrl::parse(url)?;
    match parsed.scheme.as_str() {
        "tcp" => {
            let host = parsed.host.ok_or(UrlError::MissingAuthority)?;
            let port = parsed.port.ok_or(UrlError::InvalidPort)?;
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            Ok(Listener::Tcp(listener))
        }
        "unix" | "localsocket" => {
            #[cfg(unix)]
            {
                let path = parsed.path.ok_or(UrlError::MissingPath)?;
                let _ = std::fs::remove_file(&path);
                let listener = UnixListener::bind(path)?;
                Ok(Listener::Unix(listener))
            }
            #[cfg(not(unix))]
            {
                Err(TransportError::Url(UrlError::UnknownScheme(parsed.scheme)))
            }
        }
        other => Err(TransportError::Url(UrlError::UnknownScheme(other.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_url() {
        let u = ConnectUrl::parse("tcp://localhost:3755").unwrap();
        assert_eq!(u.scheme, "tcp");
        assert_eq!(u.host.as_deref(), Some("localhost"));
        assert_eq!(u.port, Some(3755));
    }

    #[test]
    fn parses_unix_url() {
        let u = ConnectUrl::parse("unix:///tmp/shv.sock").unwrap();
        assert_eq!(u.scheme, "unix");
        assert_eq!(u.path.as_deref(), Some("/tmp/shv.sock"));
    }

    #[test]
    fn parses_ws_url_with_path() {
        let u = ConnectUrl::parse("ws://broker.example:8080/rpc").unwrap();
        assert_eq!(u.host.as_deref(), Some("broker.example"));
        assert_eq!(u.port, Some(8080));
        assert_eq!(u.path.as_deref(), Some("/rpc"));
    }

    #[test]
    fn parses_query_options() {
        let u = ConnectUrl::parse("tcp://localhost:3755?user=alice&password=secret").unwrap();
        assert_eq!(u.port, Some(3755));
        assert_eq!(u.options.get("user").map(String::as_str), Some("alice"));
        assert_eq!(u.options.get("password").map(String::as_str), Some("secret"));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert_eq!(ConnectUrl::parse("localhost:3755"), Err(UrlError::MissingScheme));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert_eq!(
            ConnectUrl::parse("ftp://localhost"),
            Err(UrlError::UnknownScheme("ftp".to_string()))
        );
    }

    #[test]
    fn rejects_bad_port() {
        assert_eq!(ConnectUrl::parse("tcp://localhost:abc"), Err(UrlError::InvalidPort));
    }
}
