// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! HTTP server exposing the Prometheus scrape endpoint
//!
//! A lightweight HTTP/1.1 server built on tokio. There is no background
//! collection loop: every `GET /metrics` runs a full scrape on a blocking
//! worker and answers with the freshly rendered exposition. Scrape latency
//! therefore follows backend latency, and concurrent pulls queue on the
//! collector's lock.
//!
//! # Examples
//!
//! ```no_run
//! use avexlib::http_server::{HttpServer, HttpServerConfig};
//! # use avexlib::prometheus::Exposition;
//! # use std::sync::Arc;
//! # struct Empty;
//! # impl avexlib::http_server::MetricsSource for Empty {
//! #     fn scrape(&self) -> Exposition { Exposition::new() }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = HttpServer::bind(HttpServerConfig::default(), Arc::new(Empty)).await?;
//!     server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!     Ok(())
//! }
//! ```

use crate::client::VmsBackend;
use crate::collector::ScrapeCollector;
use crate::error::{ExporterError, Result};
use crate::prometheus::Exposition;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

/// Anything that can produce a fresh exposition on demand
pub trait MetricsSource: Send + Sync + 'static {
    /// Run one scrape; may block on network I/O
    fn scrape(&self) -> Exposition;
}

impl<B: VmsBackend + 'static> MetricsSource for ScrapeCollector<B> {
    fn scrape(&self) -> Exposition {
        self.collect_exposition()
    }
}

/// Route definitions
pub mod routes {
    pub const ROOT: &str = "/";
    pub const METRICS: &str = "/metrics";
    /// Liveness of the exporter process itself, no scrape
    pub const HEALTHY: &str = "/-/healthy";
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Bind address (default: "0.0.0.0")
    pub bind_address: String,
    /// Port (default: 9100)
    pub port: u16,
    /// Largest request head read from a connection (default: 8KB)
    pub max_request_size: usize,
    /// Whether to log every request (default: true)
    pub request_logging: bool,
    /// How long in-flight requests may run after shutdown is requested (default: 5s)
    pub shutdown_grace: Duration,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: crate::config::DEFAULT_LISTEN_ADDRESS.into(),
            port: crate::config::DEFAULT_PORT,
            max_request_size: 8192,
            request_logging: true,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Bound export server
pub struct HttpServer {
    config: Arc<HttpServerConfig>,
    source: Arc<dyn MetricsSource>,
    listener: TcpListener,
}

impl HttpServer {
    /// Bind the listening socket
    pub async fn bind(config: HttpServerConfig, source: Arc<dyn MetricsSource>) -> Result<Self> {
        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            ExporterError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        Ok(Self {
            config: Arc::new(config),
            source,
            listener,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves, then drain for at most the grace period
    ///
    /// Requests still running when the grace period ends are abandoned.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            source,
            listener,
        } = self;

        log::info!(
            "Avigilon exporter listening on http://{}{}",
            listener.local_addr()?,
            routes::METRICS
        );

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer_addr,
                            source.clone(),
                            config.clone(),
                        ));
                    }
                    Err(e) => log::warn!("Accept error: {}", e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        log::info!("Stopping export server...");

        let grace = config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            log::warn!(
                "Server forced to shutdown: {} request(s) still running after {:?}",
                connections.len(),
                grace
            );
            connections.abort_all();
        }

        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    source: Arc<dyn MetricsSource>,
    config: Arc<HttpServerConfig>,
) {
    let start = Instant::now();
    let mut buf = vec![0u8; config.max_request_size];
    let n = match stream.read(&mut buf).await {
        Ok(n) if n > 0 => n,
        _ => return,
    };
    let raw = String::from_utf8_lossy(&buf[..n]);

    let (method, path, response) = match parse_request_line(&raw) {
        Some((method, path)) => {
            let response = route(&method, &path, &source).await;
            (method, path, response)
        }
        None => (
            "-".to_string(),
            "-".to_string(),
            HttpResponse::text(400, "Bad Request"),
        ),
    };

    if config.request_logging {
        log::info!(
            "{} {} {} {}ms from {}",
            method,
            path,
            response.status,
            start.elapsed().as_millis(),
            peer_addr
        );
    }

    let _ = stream.write_all(&response.into_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn route(method: &str, path: &str, source: &Arc<dyn MetricsSource>) -> HttpResponse {
    match (method, path) {
        ("GET", routes::METRICS) => {
            let source = source.clone();
            match tokio::task::spawn_blocking(move || source.scrape().export()).await {
                Ok(body) => HttpResponse {
                    status: 200,
                    content_type: Exposition::content_type(),
                    body,
                },
                Err(e) => {
                    log::error!("Scrape task failed: {}", e);
                    HttpResponse::text(500, "Internal Server Error")
                }
            }
        }
        ("GET", routes::ROOT) => HttpResponse {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: landing_page(),
        },
        ("GET", routes::HEALTHY) => HttpResponse::text(200, "OK"),
        (_, routes::METRICS) | (_, routes::ROOT) | (_, routes::HEALTHY) => {
            HttpResponse::text(405, "Method Not Allowed")
        }
        _ => HttpResponse::text(404, "Not Found"),
    }
}

/// Method and path (query string removed) of a raw HTTP/1.x request
fn parse_request_line(raw: &str) -> Option<(String, String)> {
    let request_line = raw.lines().next()?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 || !parts.get(2).map_or(true, |v| v.starts_with("HTTP/")) {
        return None;
    }

    let method = parts[0].to_uppercase();
    let path = match parts[1].find('?') {
        Some(idx) => &parts[1][..idx],
        None => parts[1],
    };
    Some((method, path.to_string()))
}

fn landing_page() -> String {
    format!(
        "<html>\n<head><title>Avigilon Exporter</title></head>\n<body>\n\
         <h1>Avigilon Exporter</h1>\n\
         <p>Version {}</p>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        crate::VERSION,
        routes::METRICS
    )
}

struct HttpResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl HttpResponse {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        let mut resp = format!("HTTP/1.1 {} {}\r\n", self.status, status_text(self.status));
        resp.push_str(&format!("Content-Type: {}\r\n", self.content_type));
        resp.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        resp.push_str("Connection: close\r\n");
        resp.push_str("\r\n");
        resp.push_str(&self.body);
        resp.into_bytes()
    }
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
