//! Fake bundled server for behavioural tests.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for crates that drive an [`RpcClient`](crate::RpcClient).
//!
//! Speaks just enough HTTP/1.1 for the client: one request per connection,
//! `Content-Length` bodies, and `Connection: close` replies. A routing closure
//! decides each reply, so tests can model readiness, failures and malformed
//! bodies without a scripting runtime.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

/// A request received by the fake server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

/// A reply the routing closure hands back.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self::with_status(200, value)
    }

    pub fn with_status(status: u16, value: Value) -> Self {
        Self {
            status,
            body: value.to_string(),
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
        }
    }
}

type Router = dyn Fn(&RecordedRequest) -> Reply + Send + Sync;

pub struct FakeServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeServer {
    /// Starts serving on an ephemeral loopback port.
    pub fn spawn<F>(router: F) -> Result<Self>
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake server")?;
        listener
            .set_nonblocking(true)
            .context("fake server nonblocking")?;
        let port = listener.local_addr().context("local addr")?.port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let router: Arc<Router> = Arc::new(router);
        let requests_clone = Arc::clone(&requests);
        let shutdown_clone = Arc::clone(&shutdown);
        let handle = thread::spawn(move || {
            serve(&listener, router.as_ref(), &requests_clone, &shutdown_clone);
        });
        Ok(Self {
            port,
            requests,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Starts a server that behaves like a healthy runtime.
    pub fn healthy() -> Result<Self> {
        Self::spawn(runtime_reply)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Requests recorded so far, in arrival order.
    pub fn requests(&self) -> Result<Vec<RecordedRequest>> {
        let guard = self
            .requests
            .lock()
            .map_err(|error| anyhow!("lock requests: {error}"))?;
        Ok(guard.clone())
    }

    /// Requests recorded for `path`.
    pub fn requests_to(&self, path: &str) -> Result<Vec<RecordedRequest>> {
        Ok(self
            .requests()?
            .into_iter()
            .filter(|request| request.path == path)
            .collect())
    }

    /// Stops accepting connections and waits for the serving thread.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Replies the way a healthy runtime answers each endpoint.
pub fn runtime_reply(request: &RecordedRequest) -> Reply {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/isReady") => Reply::json(json!({"ready": true})),
        ("POST", "/setAuthToken") => Reply::json(json!({"success": true})),
        ("POST", "/executeJs") => Reply::json(json!({
            "success": true,
            "signedData": {},
            "decryptedData": {},
            "claimData": {},
            "response": "Hello, World!",
            "logs": "This is a log\n"
        })),
        ("POST", "/createWallet") => Reply::json(json!({"pkp": key_pair()})),
        ("GET", "/pkp") => Reply::json(key_pair()),
        ("POST", "/sign") => Reply::json(json!({"signature": "0xfeedface"})),
        ("GET", "/") => Reply::json(json!({"status": "Server is running"})),
        _ => Reply::with_status(
            404,
            json!({"success": false, "error": "Not Found", "message": request.path}),
        ),
    }
}

/// Key pair the healthy runtime reports.
pub fn key_pair() -> Value {
    json!({
        "ethAddress": "0x9D1a5EC58232A894eBFcB5e466E3075b23101B89",
        "publicKey": "0x04deadbeef",
        "tokenId": "0x1234"
    })
}

fn serve(
    listener: &TcpListener,
    router: &Router,
    requests: &Mutex<Vec<RecordedRequest>>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                // Clients hang up mid-request when probes time out; keep serving.
                let _ = handle_connection(stream, router, requests);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => break,
        }
    }
}

fn handle_connection(
    stream: TcpStream,
    router: &Router,
    requests: &Mutex<Vec<RecordedRequest>>,
) -> Result<()> {
    stream
        .set_nonblocking(false)
        .context("blocking connection")?;
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .context("read timeout")?;
    let request = read_request(&stream)?;
    let reply = router(&request);
    requests
        .lock()
        .map_err(|error| anyhow!("lock requests: {error}"))?
        .push(request);
    write_reply(stream, &reply).context("write reply")
}

fn read_request(stream: &TcpStream) -> Result<RecordedRequest> {
    let mut reader = BufReader::new(stream.try_clone().context("clone stream")?);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .context("read request line")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().context("request method")?.to_owned();
    let path = parts.next().context("request path")?.to_owned();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).context("read header")?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().context("content length")?;
        }
    }

    let body = if content_length == 0 {
        None
    } else {
        let mut buffer = vec![0; content_length];
        reader.read_exact(&mut buffer).context("read body")?;
        Some(serde_json::from_slice(&buffer).context("request body json")?)
    };
    Ok(RecordedRequest { method, path, body })
}

fn write_reply(mut stream: TcpStream, reply: &Reply) -> io::Result<()> {
    let reason = match reply.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    write!(
        stream,
        "HTTP/1.1 {} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    )?;
    stream.flush()
}
