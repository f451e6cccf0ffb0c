use std::sync::Arc;

use axum::{middleware, routing::any, Router};
use tokio::sync::Mutex;

pub mod codec;
pub mod config;
pub mod errors;
pub mod host;
pub mod http;
pub mod jsonrpc;
pub mod logging;
pub mod resource;
pub mod service;

use codec::JsonDecoder;
use logging::AccessLog;
use resource::RootResource;

#[derive(Clone)]
pub struct AppState {
    pub root: Arc<RootResource>,
    pub decoder: JsonDecoder,
    /// Serializes every walk, render and invocation against the host object graph.
    pub dispatch_lock: Arc<Mutex<()>>,
    pub access_log: Option<Arc<AccessLog>>,
}

impl AppState {
    pub fn new(root: RootResource, decoder: JsonDecoder, access_log: Option<AccessLog>) -> Self {
        Self {
            root: Arc::new(root),
            decoder,
            dispatch_lock: Arc::new(Mutex::new(())),
            access_log: access_log.map(Arc::new),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", any(http::handlers::resource_endpoint))
        .route("/{*path}", any(http::handlers::resource_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            logging::request_logging_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::codec::spider_ref::SpiderReferencer;
    use crate::host::{
        crawler::Crawler, settings::Settings, spider::Spider, InvocationError, Params,
        RemoteInspectable, RemoteValue,
    };

    use super::*;

    fn crawler() -> Arc<Crawler> {
        let crawler = Arc::new(Crawler::new(
            Settings::new().with("BOT_NAME", "books"),
            Spider::new("books"),
        ));
        crawler.crawl();
        crawler
    }

    fn app(crawler: &Arc<Crawler>) -> Router {
        let target: Arc<dyn RemoteInspectable> = crawler.clone();
        let mut root = RootResource::new();
        root.put_child("crawler", &target);
        let decoder = JsonDecoder::new(SpiderReferencer::new(crawler.engine()));
        build_app(AppState::new(root, decoder, None))
    }

    async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .method(method)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        (status, body.to_vec())
    }

    fn json_body(body: &[u8]) -> Value {
        serde_json::from_slice(body).expect("valid json response")
    }

    #[tokio::test]
    async fn root_lists_resources() {
        let crawler = crawler();
        let (status, body) = send(app(&crawler), "GET", "/", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"{\"resources\":[\"crawler\"]}\n");
    }

    #[tokio::test]
    async fn json_responses_carry_cors_headers() {
        let crawler = crawler();
        let response = app(&crawler)
            .oneshot(
                Request::builder()
                    .uri("/crawler/stats")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PATCH, PUT, DELETE"
        );
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "X-Requested-With"
        );
    }

    #[tokio::test]
    async fn get_nested_attribute_returns_its_json() {
        let crawler = crawler();
        let (status, body) = send(app(&crawler), "GET", "/crawler/settings/BOT_NAME", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!("books"));
    }

    #[tokio::test]
    async fn get_spider_returns_its_reference() {
        let crawler = crawler();
        let (status, body) = send(app(&crawler), "GET", "/crawler/spider", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_body(&body),
            json!(SpiderReferencer::reference_for(crawler.spider()))
        );
    }

    #[tokio::test]
    async fn unknown_segment_is_not_found() {
        let crawler = crawler();

        for uri in ["/nope", "/crawler/nope", "/crawler/engine/nope", "/crawler/"] {
            let (status, body) = send(app(&crawler), "GET", uri, "").await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, b"No such child resource.");
        }
    }

    #[tokio::test]
    async fn percent_encoded_segments_are_decoded() {
        let crawler = crawler();
        crawler.stats().set_value("log_count/INFO", 7_i64);

        let (status, body) = send(app(&crawler), "GET", "/crawler/settings/BOT%5FNAME", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"\"books\"\n");

        let (status, body) =
            send(app(&crawler), "GET", "/crawler/stats/log_count%2FINFO", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!(7));
    }

    #[tokio::test]
    async fn undecodable_segment_is_not_found() {
        let crawler = crawler();
        let (status, body) = send(app(&crawler), "GET", "/crawler/%FF", "").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"No such child resource.");
    }

    struct Unrepresentable;

    impl RemoteInspectable for Unrepresentable {
        fn kind(&self) -> &'static str {
            "Unrepresentable"
        }

        fn list_attributes(&self) -> Vec<String> {
            Vec::new()
        }

        fn get_attribute(&self, _name: &str) -> Option<RemoteValue> {
            None
        }

        fn has_method(&self, _name: &str) -> bool {
            false
        }

        fn invoke(
            &self,
            _method: &str,
            _params: &Params,
        ) -> Option<Result<RemoteValue, InvocationError>> {
            None
        }
    }

    #[tokio::test]
    async fn get_without_representation_is_encoding_error() {
        let target: Arc<dyn RemoteInspectable> = Arc::new(Unrepresentable);
        let mut root = RootResource::new();
        root.put_child("opaque", &target);
        let app = build_app(AppState::new(root, JsonDecoder::default(), None));

        let (status, body) = send(app, "GET", "/opaque", "").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(&body);
        assert_eq!(body["code"], "encoding_error");
        assert_eq!(
            body["message"],
            "Unrepresentable object is not JSON serializable"
        );
        drop(target);
    }

    #[tokio::test]
    async fn post_calls_method_on_bound_target() {
        let crawler = crawler();
        crawler.stats().set_value("item_scraped_count", 5_i64);

        let (status, body) = send(
            app(&crawler),
            "POST",
            "/crawler/stats",
            r#"{"method": "get_value", "params": ["item_scraped_count"], "id": 1}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"result": 5, "id": 1}));
    }

    #[tokio::test]
    async fn post_pause_mutates_engine() {
        let crawler = crawler();

        let (status, body) = send(
            app(&crawler),
            "POST",
            "/crawler/engine",
            r#"{"method": "pause", "params": [], "id": "p"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"result": null, "id": "p"}));
        assert!(crawler.engine().is_paused());
    }

    #[tokio::test]
    async fn post_unknown_method_is_error_envelope() {
        let crawler = crawler();
        let (status, body) = send(
            app(&crawler),
            "POST",
            "/crawler",
            r#"{"method": "explode", "params": [], "id": 42}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["id"], 42);
        assert_eq!(body["error"]["code"], -32601);
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn post_unknown_method_ignores_params_shape() {
        let crawler = crawler();
        let (status, body) = send(
            app(&crawler),
            "POST",
            "/crawler",
            r#"{"method": "nope", "params": 5, "id": 1}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_body(&body),
            json!({"error": {"code": -32601, "message": "Method not found"}, "id": 1})
        );
    }

    #[tokio::test]
    async fn post_malformed_body_is_parse_error_envelope() {
        let crawler = crawler();
        let (status, body) = send(app(&crawler), "POST", "/crawler", "{not json").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn post_crawler_stop_stops_engine() {
        let crawler = crawler();
        let (status, _) = send(
            app(&crawler),
            "POST",
            "/crawler",
            r#"{"method": "stop", "id": 1}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(!crawler.engine().is_running());
        assert_eq!(
            crawler.stats().get_value("finish_reason"),
            Some(RemoteValue::from("shutdown"))
        );
    }

    #[tokio::test]
    async fn root_post_is_not_allowed() {
        let crawler = crawler();
        let (status, _) = send(app(&crawler), "POST", "/", "{}").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn delete_is_not_allowed() {
        let crawler = crawler();
        let (status, _) = send(app(&crawler), "DELETE", "/crawler", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn repeated_get_is_idempotent() {
        let crawler = crawler();
        let (_, first) = send(app(&crawler), "GET", "/crawler/engine", "").await;
        let (_, second) = send(app(&crawler), "GET", "/crawler/engine", "").await;

        assert_eq!(first, second);
        assert_eq!(json_body(&first)["running"], true);
    }
}
