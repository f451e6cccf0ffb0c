use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Instant,
};

use axum::{
    body::HttpBody,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::AppState;

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Append-only access log, one common log format line per request.
#[derive(Debug)]
pub struct AccessLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AccessLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn record(&self, line: &str) {
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(err) = writeln!(file, "{line}") {
            warn!(path = %self.path.display(), error = %err, "failed to write access log");
        }
    }
}

pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let version = request.version();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let length = response.body().size_hint().exact();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if let Some(access_log) = state.access_log.as_deref() {
        let request_line = format!("{method} {path} {version:?}");
        access_log.record(&common_log_line(
            &peer,
            Utc::now(),
            &request_line,
            status.as_u16(),
            length,
        ));
    }

    response
}

/// `host - - [time] "request" status bytes`, with `-` for an unknown length.
fn common_log_line(
    peer: &str,
    at: DateTime<Utc>,
    request_line: &str,
    status: u16,
    length: Option<u64>,
) -> String {
    let length = length.map_or_else(|| "-".to_string(), |bytes| bytes.to_string());
    format!(
        "{peer} - - [{}] \"{request_line}\" {status} {length}",
        at.format("%d/%b/%Y:%H:%M:%S +0000")
    )
}
