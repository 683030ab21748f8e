pub mod routes;

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

use crate::chat::turn::QueryTurn;
use crate::server::routes::Reply;
use crate::session::ChatService;

pub struct ServerConfig {
    pub port: u16,
    pub web_root: PathBuf,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port)
    }
}

/// Serves requests one at a time until Ctrl-C.
pub fn run_server(server: Server, service: &mut ChatService, cfg: &ServerConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    info!("serving {} on http://{}", cfg.web_root.display(), cfg.addr());
    while running.load(Ordering::SeqCst) {
        let request = match server.recv_timeout(Duration::from_millis(500)) {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                error!("accept failed: {e}");
                continue;
            }
        };
        handle(service, &cfg.web_root, request);
    }
    info!("shutting down");
    Ok(())
}

pub fn bind(cfg: &ServerConfig) -> Result<Server> {
    let addr = cfg.addr();
    Server::http(addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))
}

fn handle(service: &mut ChatService, web_root: &Path, request: Request) {
    let url = request.url().to_string();
    debug!("{} {}", request.method(), url);

    if *request.method() != Method::Get {
        if let Err(e) = request.respond(Response::empty(405)) {
            warn!("failed to answer {url}: {e}");
        }
        return;
    }

    let sent = match routes::dispatch(service, web_root, &url) {
        Reply::Json { status, body } => {
            let mut resp = Response::from_string(body.to_string()).with_status_code(status);
            if let Some(h) = content_type("application/json") {
                resp = resp.with_header(h);
            }
            request.respond(resp)
        }
        Reply::Events(turn) => stream_events(request, turn),
        Reply::File(path) => serve_file(request, &path),
        Reply::NoContent => request.respond(Response::empty(204)),
        Reply::NotFound => request.respond(not_found()),
    };
    if let Err(e) = sent {
        warn!("failed to answer {url}: {e}");
    }
}

fn not_found() -> Response<io::Cursor<Vec<u8>>> {
    Response::from_string("Not Found").with_status_code(404)
}

fn content_type(value: &str) -> Option<Header> {
    Header::from_bytes("Content-Type", value).ok()
}

pub fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn serve_file(request: Request, path: &Path) -> io::Result<()> {
    match File::open(path) {
        Ok(f) => {
            let mut resp = Response::from_file(f);
            if let Some(h) = content_type(mime_for(path)) {
                resp = resp.with_header(h);
            }
            request.respond(resp)
        }
        Err(e) => {
            warn!("cannot serve {}: {e}", path.display());
            request.respond(not_found())
        }
    }
}

// tiny_http's chunked writer buffers; write the head ourselves so every frame
// reaches the browser as soon as it is flushed
fn stream_events(request: Request, turn: QueryTurn<'_>) -> io::Result<()> {
    let mut writer = request.into_writer();
    writer.write_all(
        b"HTTP/1.1 200 OK\r\n\
          Content-Type: text/event-stream\r\n\
          Cache-Control: no-cache\r\n\
          Connection: close\r\n\r\n",
    )?;
    writer.flush()?;
    write_events(&mut writer, turn)
}

/// `data: <frame>\n\n` per frame, flushed one at a time.
pub fn write_events<W: Write>(out: &mut W, frames: impl IntoIterator<Item = String>) -> io::Result<()> {
    for frame in frames {
        write!(out, "data: {frame}\n\n")?;
        out.flush()?;
    }
    Ok(())
}
