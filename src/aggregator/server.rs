use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use super::StateStore;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct AggregatorHandle {
    pub addr: SocketAddr,
    store: Arc<StateStore>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl AggregatorHandle {
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("aggregator server thread panicked"))?;
        }
        Ok(())
    }
}

/// Single-threaded HTTP front for a `StateStore`.
pub struct AggregatorServer {
    addr: String,
    store: Arc<StateStore>,
}

impl AggregatorServer {
    pub fn new(addr: impl Into<String>, store: Arc<StateStore>) -> Self {
        Self {
            addr: addr.into(),
            store,
        }
    }

    pub fn spawn(self) -> Result<AggregatorHandle> {
        let configured_addr: SocketAddr = self
            .addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let store = self.store.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, &store, shutdown_thread) {
                log::error!("aggregator stopped: {}", err);
            }
        });

        Ok(AggregatorHandle {
            addr,
            store: self.store,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(listener: TcpListener, store: &StateStore, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = handle_connection(stream, store) {
                    log::warn!("request from {} failed: {:#}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, store: &StateStore) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(RequestError::TooLarge) => {
            write_json_response(&mut stream, 413, r#"{"status":"error","message":"Payload too large"}"#)?;
            return Ok(());
        }
        Err(RequestError::Other(err)) => return Err(err),
    };
    log::debug!("{} {} ({} body bytes)", request.method, request.path, request.body.len());

    match request.method.as_str() {
        "OPTIONS" => write_response(&mut stream, 200, None, &[]),
        "GET" => match request.path.as_str() {
            "/status" => {
                let body = serde_json::to_vec(&store.board_info())?;
                write_response(&mut stream, 200, Some("application/json"), &body)
            }
            "/presence" => {
                let body = serde_json::to_vec(&store.presence())?;
                write_response(&mut stream, 200, Some("application/json"), &body)
            }
            _ => write_response(&mut stream, 200, Some("text/plain"), b"Server is running!"),
        },
        "POST" => {
            let applied = if request.path == "/presence" {
                store.apply_presence(&request.body).map(|report| {
                    log::info!(
                        "presence for {}: {}",
                        report.ndi_name,
                        report.player_present
                    );
                })
            } else {
                store
                    .apply_board_info(&request.body)
                    .map(|info| log::info!("{}", info.summary()))
            };
            match applied {
                Ok(()) => write_json_response(&mut stream, 200, r#"{"status":"success"}"#),
                Err(err) => {
                    log::warn!("rejected POST {}: {}", request.path, err);
                    write_json_response(
                        &mut stream,
                        400,
                        r#"{"status":"error","message":"Invalid JSON"}"#,
                    )
                }
            }
        }
        _ => write_json_response(
            &mut stream,
            405,
            r#"{"status":"error","message":"Method not allowed"}"#,
        ),
    }
}

enum RequestError {
    TooLarge,
    Other(anyhow::Error),
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Other(err.into())
    }
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        RequestError::Other(err)
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, RequestError> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(RequestError::TooLarge);
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers").into());
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body").into());
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, Some("application/json"), body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {len}\r\nConnection: close\r\n",
        status_line = status_line,
        len = body.len()
    );
    match content_type {
        Some(content_type) => {
            header.push_str(&format!("Content-Type: {}\r\n", content_type));
        }
        None => {
            header.push_str("Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n");
            header.push_str("Access-Control-Allow-Headers: Content-Type\r\n");
        }
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}
