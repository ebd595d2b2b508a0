//! One-shot local listener for the OAuth authorization-code redirect.
//!
//! The listener is consumed by [`CallbackListener::wait_for_code`], so the
//! socket is closed when that call returns, whatever the outcome.

use std::io::BufReader as StdBufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TlsFiles;
use crate::error::{Result, YahooError};

const SUCCESS_HTML: &str = "<!doctype html><html><head><title>Authorized</title></head>\
<body><h2>Authorization received.</h2><p>You can close this window.</p></body></html>";
const FAILED_HTML: &str = "<!doctype html><html><head><title>Authorization failed</title></head>\
<body><h2>Authorization failed.</h2><p>You can close this window.</p></body></html>";
const MISMATCH_HTML: &str = "<!doctype html><html><head><title>State mismatch</title></head>\
<body><h2>State mismatch.</h2><p>You can close this window and restart the login.</p></body></html>";

/// Max time a single connection may take for its TLS handshake, and again
/// for its request head.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HEADER_LINES: usize = 100;

/// Query parameters Yahoo appends to the redirect.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }

    /// Decide the outcome of a redirect for the attempt expecting `expected_state`.
    pub fn into_code(self, expected_state: &str) -> Result<String> {
        if self.state.as_deref() != Some(expected_state) {
            return Err(YahooError::StateMismatch);
        }
        if let Some(error) = self.error {
            let error = match self.error_description {
                Some(desc) => format!("{error}: {desc}"),
                None => error,
            };
            return Err(YahooError::AuthorizationDenied { error });
        }
        self.code
            .filter(|c| !c.is_empty())
            .ok_or(YahooError::MissingAuthorizationCode)
    }
}

/// Local endpoint that captures a single authorization redirect.
pub struct CallbackListener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    path: String,
}

impl CallbackListener {
    /// Bind `addr` and serve redirects arriving on `path`.
    pub async fn bind(addr: &str, path: &str, tls: Option<TlsAcceptor>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "Callback listener on {}://{}{}",
            if tls.is_some() { "https" } else { "http" },
            listener.local_addr()?,
            path
        );
        Ok(Self {
            listener,
            tls,
            path: path.to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the redirect and return its authorization code.
    ///
    /// Requests for other paths get a 404 and the wait continues. The first
    /// redirect on the callback path ends the wait whether it carries a code,
    /// an error, or a mismatched state.
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.accept_loop(expected_state)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No authorization callback within {}s", timeout.as_secs());
                Err(YahooError::CallbackTimeout {
                    waited_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn accept_loop(&self, expected_state: &str) -> Result<String> {
        // Connections are served concurrently so a stalled one cannot hold
        // back the redirect. Dropping the set aborts the rest.
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("Callback connection from {}", peer);
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        self.tls.clone(),
                        self.path.clone(),
                        expected_state.to_string(),
                    ));
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    match joined {
                        Ok(Some(result)) => return result,
                        Ok(None) => {}
                        Err(e) => warn!("Callback connection task failed: {}", e),
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    path: String,
    expected_state: String,
) -> Option<Result<String>> {
    let Some(acceptor) = tls else {
        return handle_connection(stream, &path, &expected_state).await;
    };

    match tokio::time::timeout(REQUEST_READ_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => handle_connection(tls_stream, &path, &expected_state).await,
        Ok(Err(e)) => {
            warn!("TLS handshake with {} failed: {}", peer, e);
            None
        }
        Err(_) => {
            debug!("TLS handshake with {} timed out", peer);
            None
        }
    }
}

/// Serve one connection. `None` means the request was not the redirect.
async fn handle_connection<S>(stream: S, path: &str, expected_state: &str) -> Option<Result<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);

    let target = match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut reader)).await {
        Ok(Ok(Some(target))) => target,
        Ok(Ok(None)) => {
            let _ = respond(reader.get_mut(), "400 Bad Request", "Bad request").await;
            return None;
        }
        Ok(Err(e)) => {
            debug!("Failed to read callback request: {}", e);
            return None;
        }
        Err(_) => {
            debug!("Callback connection sent no request in time");
            return None;
        }
    };

    let url = match Url::parse("http://localhost").and_then(|base| base.join(&target)) {
        Ok(url) => url,
        Err(_) => {
            let _ = respond(reader.get_mut(), "400 Bad Request", "Bad request").await;
            return None;
        }
    };

    if url.path() != path {
        debug!("Ignoring request for {}", url.path());
        let _ = respond(reader.get_mut(), "404 Not Found", "Not found").await;
        return None;
    }

    let result = CallbackParams::from_url(&url).into_code(expected_state);
    let (status, body) = match &result {
        Ok(_) => ("200 OK", SUCCESS_HTML),
        Err(YahooError::StateMismatch) => ("400 Bad Request", MISMATCH_HTML),
        Err(_) => ("200 OK", FAILED_HTML),
    };
    if let Err(e) = respond(reader.get_mut(), status, body).await {
        warn!("Failed to answer the callback request: {}", e);
    }

    match &result {
        Ok(_) => info!("Authorization code received"),
        Err(e) => warn!("Authorization callback rejected: {}", e),
    }
    Some(result)
}

/// Read the request line and drain the headers. Returns the request target.
async fn read_request_target<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }

    for _ in 0..MAX_HEADER_LINES {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
        _ => Ok(None),
    }
}

async fn respond<W>(stream: &mut W, status: &str, body: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Build a TLS acceptor from PEM certificate and key files.
pub fn load_tls_acceptor(files: &TlsFiles) -> Result<TlsAcceptor> {
    let tls_error = |message: String| YahooError::Tls { message };

    let cert_file = std::fs::File::open(&files.cert)
        .map_err(|e| tls_error(format!("open cert {}: {e}", files.cert.display())))?;
    let key_file = std::fs::File::open(&files.key)
        .map_err(|e| tls_error(format!("open key {}: {e}", files.key.display())))?;

    let certs = rustls_pemfile::certs(&mut StdBufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("read certs: {e}")))?;
    if certs.is_empty() {
        return Err(tls_error(format!(
            "no certificates found in {}",
            files.cert.display()
        )));
    }
    let key = rustls_pemfile::private_key(&mut StdBufReader::new(key_file))
        .map_err(|e| tls_error(format!("read private key: {e}")))?
        .ok_or_else(|| tls_error(format!("no private key found in {}", files.key.display())))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| tls_error(format!("invalid cert or key: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    async fn get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn listener() -> (CallbackListener, SocketAddr) {
        let listener = CallbackListener::bind("127.0.0.1:0", "/callback", None)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn test_params_from_url() {
        let url = Url::parse("https://localhost/callback?code=abc&state=xyz&extra=1").unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[test]
    fn test_into_code_outcomes() {
        let ok = CallbackParams {
            code: Some("abc".into()),
            state: Some("s1".into()),
            ..Default::default()
        };
        assert_eq!(ok.clone().into_code("s1").unwrap(), "abc");
        assert!(matches!(ok.into_code("s2"), Err(YahooError::StateMismatch)));

        let denied = CallbackParams {
            state: Some("s1".into()),
            error: Some("access_denied".into()),
            ..Default::default()
        };
        assert!(matches!(
            denied.into_code("s1"),
            Err(YahooError::AuthorizationDenied { error }) if error == "access_denied"
        ));

        let empty = CallbackParams {
            state: Some("s1".into()),
            ..Default::default()
        };
        assert!(matches!(
            empty.into_code("s1"),
            Err(YahooError::MissingAuthorizationCode)
        ));
    }

    #[tokio::test]
    async fn test_receives_code_and_closes() {
        let (listener, addr) = listener().await;
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("nonce", Duration::from_secs(5))
                .await
        });

        let response = get(addr, "/callback?code=the-code&state=nonce").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Authorization received"));

        assert_eq!(waiter.await.unwrap().unwrap(), "the-code");
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_other_paths_do_not_end_the_wait() {
        let (listener, addr) = listener().await;
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("nonce", Duration::from_secs(5))
                .await
        });

        let response = get(addr, "/favicon.ico").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        get(addr, "/callback?code=c&state=nonce").await;
        assert_eq!(waiter.await.unwrap().unwrap(), "c");
    }

    #[tokio::test]
    async fn test_state_mismatch_ends_attempt_with_400() {
        let (listener, addr) = listener().await;
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("nonce", Duration::from_secs(5))
                .await
        });

        let response = get(addr, "/callback?code=c&state=forged").await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(matches!(
            waiter.await.unwrap(),
            Err(YahooError::StateMismatch)
        ));
    }

    #[tokio::test]
    async fn test_error_redirect_is_denied() {
        let (listener, addr) = listener().await;
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("nonce", Duration::from_secs(5))
                .await
        });

        let response = get(addr, "/callback?error=access_denied&state=nonce").await;
        assert!(response.contains("Authorization failed"));
        assert!(matches!(
            waiter.await.unwrap(),
            Err(YahooError::AuthorizationDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_connection_does_not_block_the_redirect() {
        let (listener, addr) = listener().await;
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("nonce", Duration::from_secs(3))
                .await
        });

        // Connects and never sends a request, like a browser preconnect
        let _idle = TcpStream::connect(addr).await.unwrap();

        let response = get(addr, "/callback?code=c&state=nonce").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(waiter.await.unwrap().unwrap(), "c");
    }

    #[tokio::test]
    async fn test_tls_redirect_behind_silent_connection() {
        use rustls::pki_types::ServerName;

        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let files = TlsFiles {
            cert: dir.path().join("localhost.pem"),
            key: dir.path().join("localhost-key.pem"),
        };
        std::fs::write(&files.cert, certified.cert.pem()).unwrap();
        std::fs::write(&files.key, certified.key_pair.serialize_pem()).unwrap();

        let acceptor = load_tls_acceptor(&files).unwrap();
        let listener = CallbackListener::bind("127.0.0.1:0", "/callback", Some(acceptor))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("nonce", Duration::from_secs(5))
                .await
        });

        // Never sends a ClientHello
        let _idle = TcpStream::connect(addr).await.unwrap();

        let mut roots = rustls::RootCertStore::empty();
        roots.add(certified.cert.der().clone()).unwrap();
        let client_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));

        let tcp = TcpStream::connect(addr).await.unwrap();
        let server_name = ServerName::try_from("localhost".to_string()).unwrap();
        let mut tls = connector.connect(server_name, tcp).await.unwrap();
        tls.write_all(b"GET /callback?code=c&state=nonce HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        let _ = tls.read_to_end(&mut response).await;
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200 OK"));

        let code = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(code, "c");
    }

    #[tokio::test]
    async fn test_timeout_releases_socket() {
        let (listener, addr) = listener().await;
        let result = listener
            .wait_for_code("nonce", Duration::from_millis(50))
            .await;

        assert!(matches!(result, Err(YahooError::CallbackTimeout { .. })));
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[test]
    fn test_missing_tls_files_are_reported() {
        let files = TlsFiles {
            cert: "/nonexistent/cert.pem".into(),
            key: "/nonexistent/key.pem".into(),
        };
        assert!(matches!(
            load_tls_acceptor(&files),
            Err(YahooError::Tls { .. })
        ));
    }
}
