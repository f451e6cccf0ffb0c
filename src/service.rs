//! Web service lifecycle bound to the host engine
//!
//! The host calls [`EngineHooks::on_engine_started`] once its engine runs and
//! [`EngineHooks::on_engine_stopped`] when it stops; the listening socket lives in between.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{debug, info};

use crate::codec::{spider_ref::SpiderReferencer, JsonDecoder};
use crate::config::{ConfigError, WebServiceConfig};
use crate::host::{crawler::Crawler, RemoteInspectable};
use crate::logging::AccessLog;
use crate::resource::RootResource;
use crate::{build_app, AppState};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cannot listen on {host} ports {ports:?}: {source}")]
    CannotListen {
        host: String,
        ports: Vec<u16>,
        #[source]
        source: io::Error,
    },
    #[error("port range {0:?} contains no usable port")]
    InvalidPortRange(Vec<u16>),
    #[error("failed to open access log: {0}")]
    AccessLog(#[source] io::Error),
    #[error("web service is not listening")]
    NotListening,
    #[error("web service already listening on {0}")]
    AlreadyListening(SocketAddr),
    #[error("web server failed: {0}")]
    Server(#[source] io::Error),
    #[error("web server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Lifecycle calls made directly by the host's startup and shutdown sequence.
#[async_trait]
pub trait EngineHooks: Send {
    async fn on_engine_started(&mut self) -> Result<(), ServiceError>;
    async fn on_engine_stopped(&mut self) -> Result<(), ServiceError>;
}

struct Listening {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

pub struct WebService {
    config: WebServiceConfig,
    crawler: Arc<Crawler>,
    listening: Option<Listening>,
}

impl WebService {
    /// Builds the service, or [`ConfigError::NotConfigured`] when `JSONRPC_ENABLED` is off.
    pub fn from_crawler(crawler: &Arc<Crawler>) -> Result<Self, ConfigError> {
        let config = WebServiceConfig::from_settings(crawler.settings())?;
        Ok(Self {
            config,
            crawler: crawler.clone(),
            listening: None,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.as_ref().map(|listening| listening.local_addr)
    }

    pub async fn start_listening(&mut self) -> Result<SocketAddr, ServiceError> {
        if let Some(addr) = self.local_addr() {
            return Err(ServiceError::AlreadyListening(addr));
        }

        let access_log = self
            .config
            .log_file
            .as_deref()
            .map(AccessLog::open)
            .transpose()
            .map_err(ServiceError::AccessLog)?;

        let listener = listen_tcp(&self.config.port_range, &self.config.host).await?;
        let local_addr = listener.local_addr().map_err(ServiceError::Server)?;

        let app = build_app(AppState::new(self.root(), self.decoder(), access_log));
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        debug!("Web service listening on {}:{}", local_addr.ip(), local_addr.port());
        info!(bind_addr = %local_addr, "web service started");

        self.listening = Some(Listening {
            local_addr,
            shutdown,
            task,
        });
        Ok(local_addr)
    }

    pub async fn stop_listening(&mut self) -> Result<(), ServiceError> {
        let Listening {
            local_addr,
            shutdown,
            task,
        } = self.listening.take().ok_or(ServiceError::NotListening)?;

        let _ = shutdown.send(());
        task.await?.map_err(ServiceError::Server)?;
        info!(bind_addr = %local_addr, "web service stopped");
        Ok(())
    }

    fn root(&self) -> RootResource {
        let target: Arc<dyn RemoteInspectable> = self.crawler.clone();
        let mut root = RootResource::new();
        root.put_child("crawler", &target);
        root
    }

    fn decoder(&self) -> JsonDecoder {
        JsonDecoder::new(SpiderReferencer::new(self.crawler.engine()))
    }
}

#[async_trait]
impl EngineHooks for WebService {
    async fn on_engine_started(&mut self) -> Result<(), ServiceError> {
        self.start_listening().await.map(|_| ())
    }

    async fn on_engine_stopped(&mut self) -> Result<(), ServiceError> {
        self.stop_listening().await
    }
}

/// Binds the first free port: none means ephemeral, one means exactly that port, two
/// means every port of the inclusive range in order.
pub async fn listen_tcp(port_range: &[u16], host: &str) -> Result<TcpListener, ServiceError> {
    let ports: Vec<u16> = match port_range {
        [] => vec![0],
        [port] => vec![*port],
        [first, last] => (*first..=*last).collect(),
        _ => return Err(ServiceError::InvalidPortRange(port_range.to_vec())),
    };

    let mut last_error = None;
    for port in ports {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(err) => {
                debug!(host, port, error = %err, "port unavailable");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(source) => Err(ServiceError::CannotListen {
            host: host.to_string(),
            ports: port_range.to_vec(),
            source,
        }),
        None => Err(ServiceError::InvalidPortRange(port_range.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::host::{settings::Settings, spider::Spider};
    use crate::jsonrpc::client::{jsonrpc_client_call, ClientError};

    fn crawler(settings: Settings) -> Arc<Crawler> {
        let crawler = Arc::new(Crawler::new(settings, Spider::new("books")));
        crawler.crawl();
        crawler
    }

    fn ephemeral() -> Settings {
        Settings::new()
            .with("JSONRPC_ENABLED", "1")
            .with("JSONRPC_PORT", "")
    }

    async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
        reqwest::get(format!("http://{addr}{path}"))
            .await
            .expect("request succeeds")
    }

    #[test]
    fn disabled_service_is_not_configured() {
        let crawler = crawler(Settings::new());
        let err = WebService::from_crawler(&crawler)
            .err()
            .expect("service must not be configured");
        assert!(err.is_not_configured());
    }

    #[tokio::test]
    async fn serves_between_start_and_stop() {
        let crawler = crawler(ephemeral());
        let mut service = WebService::from_crawler(&crawler).expect("configured");

        service.on_engine_started().await.expect("start");
        let addr = service.local_addr().expect("listening");
        assert!(addr.ip().is_loopback());

        let response = get(addr, "/").await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.expect("json body");
        assert_eq!(body, json!({"resources": ["crawler"]}));

        service.on_engine_stopped().await.expect("stop");
        assert!(service.local_addr().is_none());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn client_calls_methods_and_surfaces_errors() {
        let crawler = crawler(ephemeral());
        crawler.stats().set_value("item_scraped_count", 3_i64);
        let mut service = WebService::from_crawler(&crawler).expect("configured");
        let addr = service.start_listening().await.expect("start");

        let url = format!("http://{addr}/crawler/stats");
        let value = jsonrpc_client_call(&url, "get_value", json!(["item_scraped_count"]))
            .await
            .expect("call succeeds");
        assert_eq!(value, json!(3));

        let err = jsonrpc_client_call(&url, "explode", json!([]))
            .await
            .expect_err("unknown method");
        assert!(matches!(err, ClientError::Rpc { code: -32601, .. }));

        service.stop_listening().await.expect("stop");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found_over_the_wire() {
        let crawler = crawler(ephemeral());
        let mut service = WebService::from_crawler(&crawler).expect("configured");
        let addr = service.start_listening().await.expect("start");

        let response = get(addr, "/crawler/does_not_exist").await;
        assert_eq!(response.status(), 404);
        assert_eq!(
            response.text().await.expect("text body"),
            "No such child resource."
        );

        service.stop_listening().await.expect("stop");
    }

    #[tokio::test]
    async fn port_range_skips_busy_ports() {
        let busy = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let busy_port = busy.local_addr().expect("addr").port();
        let Some(next_port) = busy_port.checked_add(1) else {
            return;
        };

        match listen_tcp(&[busy_port, next_port], "127.0.0.1").await {
            Ok(listener) => {
                assert_eq!(listener.local_addr().expect("addr").port(), next_port);
            }
            // the neighbouring port may be taken by another process
            Err(err) => assert!(matches!(err, ServiceError::CannotListen { .. })),
        }
    }

    #[tokio::test]
    async fn single_busy_port_cannot_listen() {
        let busy = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let port = busy.local_addr().expect("addr").port();

        let err = listen_tcp(&[port], "127.0.0.1")
            .await
            .expect_err("port is taken");
        assert!(matches!(err, ServiceError::CannotListen { .. }));
    }

    #[tokio::test]
    async fn stop_without_start_is_reported() {
        let crawler = crawler(ephemeral());
        let mut service = WebService::from_crawler(&crawler).expect("configured");

        let err = service.stop_listening().await.expect_err("never started");
        assert!(matches!(err, ServiceError::NotListening));
    }

    #[tokio::test]
    async fn access_log_records_requests() {
        let log_path = std::env::temp_dir().join(format!(
            "crawl-jsonrpc-access-{}.log",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&log_path);
        let settings = ephemeral().with("JSONRPC_LOGFILE", log_path.display().to_string());
        let crawler = crawler(settings);
        let mut service = WebService::from_crawler(&crawler).expect("configured");
        let addr = service.start_listening().await.expect("start");

        get(addr, "/crawler/engine").await;
        service.stop_listening().await.expect("stop");

        let contents = std::fs::read_to_string(&log_path).expect("log written");
        assert!(contents.contains("\"GET /crawler/engine HTTP/1.1\" 200"));
        let length = contents
            .lines()
            .next()
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|field| field.parse::<u64>().ok())
            .expect("byte count recorded");
        assert!(length > 0);
        let _ = std::fs::remove_file(&log_path);
    }
}
