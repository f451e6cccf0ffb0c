//! Crawl engine state as seen by remote operators

use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock, Mutex},
};

use chrono::{NaiveDateTime, Utc};
use tokio::sync::watch;
use tracing::info;

use crate::host::{
    lock, spider::Spider, stats::StatsCollector, value::RequestSummary, InvocationError,
    MethodRegistry, Params, RemoteInspectable, RemoteValue,
};

static METHODS: LazyLock<MethodRegistry<Engine>> = LazyLock::new(|| {
    MethodRegistry::new()
        .with("pause", Engine::remote_pause)
        .with("unpause", Engine::remote_unpause)
        .with("close_spider", Engine::remote_close_spider)
});

#[derive(Debug, Default)]
struct EngineState {
    paused: bool,
    start_time: Option<NaiveDateTime>,
    open_spiders: Vec<Arc<Spider>>,
    in_progress: Vec<RequestSummary>,
}

#[derive(Debug)]
pub struct Engine {
    state: Mutex<EngineState>,
    stats: Arc<StatsCollector>,
    running: watch::Sender<bool>,
}

impl Engine {
    pub fn new(stats: Arc<StatsCollector>) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            state: Mutex::new(EngineState::default()),
            stats,
            running,
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    /// Receiver that observes the running flag, for hosts waiting on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    pub fn start(&self, spider: Arc<Spider>) {
        let now = Utc::now().naive_utc();
        {
            let mut state = lock(&self.state);
            state.start_time = Some(now);
            state.paused = false;
            if !state.open_spiders.iter().any(|open| Arc::ptr_eq(open, &spider)) {
                state.open_spiders.push(spider.clone());
            }
        }
        self.stats.set_value("start_time", now);
        self.running.send_replace(true);
        info!(spider = spider.name(), "engine started");
    }

    /// Closes every open spider with reason `shutdown` and stops the engine.
    pub fn stop(&self) {
        let open: Vec<_> = lock(&self.state).open_spiders.clone();
        for spider in open {
            let _ = self.close_spider(&spider, "shutdown");
        }
        self.running.send_replace(false);
        info!("engine stopped");
    }

    pub fn pause(&self) {
        lock(&self.state).paused = true;
    }

    pub fn unpause(&self) {
        lock(&self.state).paused = false;
    }

    pub fn open_spiders(&self) -> Vec<Arc<Spider>> {
        lock(&self.state).open_spiders.clone()
    }

    pub fn close_spider(&self, spider: &Arc<Spider>, reason: &str) -> Result<(), InvocationError> {
        let remaining = {
            let mut state = lock(&self.state);
            let Some(index) = state
                .open_spiders
                .iter()
                .position(|open| Arc::ptr_eq(open, spider))
            else {
                return Err(InvocationError::runtime_error(format!(
                    "Spider not opened: {}",
                    spider.name()
                )));
            };
            state.open_spiders.remove(index);
            state.open_spiders.len()
        };

        self.stats.set_value("finish_reason", reason);
        self.stats.set_value("finish_time", Utc::now().naive_utc());
        self.stats.close_spider(spider.name());
        info!(spider = spider.name(), reason, "spider closed");

        if remaining == 0 {
            self.running.send_replace(false);
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn track_request(&self, request: RequestSummary) {
        lock(&self.state).in_progress.push(request);
    }

    #[cfg(test)]
    pub fn release_request(&self, url: &str) {
        lock(&self.state).in_progress.retain(|request| request.url != url);
    }

    fn summary(&self) -> BTreeMap<String, RemoteValue> {
        let state = lock(&self.state);
        BTreeMap::from([
            ("running".to_string(), RemoteValue::Bool(self.is_running())),
            ("paused".to_string(), RemoteValue::Bool(state.paused)),
            (
                "open_spiders".to_string(),
                RemoteValue::List(
                    state
                        .open_spiders
                        .iter()
                        .cloned()
                        .map(RemoteValue::Spider)
                        .collect(),
                ),
            ),
            (
                "start_time".to_string(),
                state
                    .start_time
                    .map(RemoteValue::DateTime)
                    .unwrap_or(RemoteValue::Null),
            ),
            (
                "in_progress".to_string(),
                RemoteValue::List(
                    state
                        .in_progress
                        .iter()
                        .cloned()
                        .map(RemoteValue::Request)
                        .collect(),
                ),
            ),
        ])
    }

    fn remote_pause(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&[])?;
        self.pause();
        Ok(RemoteValue::Null)
    }

    fn remote_unpause(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&[])?;
        self.unpause();
        Ok(RemoteValue::Null)
    }

    fn remote_close_spider(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["spider", "reason"])?;
        let spider = params.required(0, "spider")?;
        let spider = spider.as_spider().ok_or_else(|| {
            InvocationError::type_error(format!(
                "spider must be a spider reference, not {}",
                spider.type_name()
            ))
        })?;
        let reason = match params.get(1, "reason") {
            Some(value) => value.as_str().ok_or_else(|| {
                InvocationError::type_error(format!(
                    "reason must be str, not {}",
                    value.type_name()
                ))
            })?,
            None => "cancelled",
        };
        self.close_spider(spider, reason)?;
        Ok(RemoteValue::Null)
    }
}

impl RemoteInspectable for Engine {
    fn kind(&self) -> &'static str {
        "ExecutionEngine"
    }

    fn list_attributes(&self) -> Vec<String> {
        self.summary().into_keys().collect()
    }

    fn get_attribute(&self, name: &str) -> Option<RemoteValue> {
        self.summary().remove(name)
    }

    fn has_method(&self, name: &str) -> bool {
        METHODS.contains(name)
    }

    fn invoke(
        &self,
        method: &str,
        params: &Params,
    ) -> Option<Result<RemoteValue, InvocationError>> {
        METHODS.call(self, method, params)
    }

    fn represent(&self) -> Option<RemoteValue> {
        Some(RemoteValue::Map(self.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (Engine, Arc<StatsCollector>) {
        let stats = Arc::new(StatsCollector::new());
        (Engine::new(stats.clone()), stats)
    }

    #[test]
    fn pause_and_unpause_toggle_state() {
        let (engine, _) = engine();

        engine
            .invoke("pause", &Params::default())
            .expect("registered")
            .expect("pause");
        assert_eq!(engine.get_attribute("paused"), Some(RemoteValue::Bool(true)));

        engine
            .invoke("unpause", &Params::default())
            .expect("registered")
            .expect("unpause");
        assert!(!engine.is_paused());
    }

    #[test]
    fn close_spider_records_reason_and_stops_engine() {
        let (engine, stats) = engine();
        let spider = Arc::new(Spider::new("books"));
        engine.start(spider.clone());
        assert!(engine.is_running());

        engine
            .invoke(
                "close_spider",
                &Params::Positional(vec![RemoteValue::Spider(spider)]),
            )
            .expect("registered")
            .expect("close");

        assert!(!engine.is_running());
        assert!(engine.open_spiders().is_empty());
        assert_eq!(
            stats.get_value("finish_reason"),
            Some(RemoteValue::from("cancelled"))
        );
    }

    #[test]
    fn closing_unknown_spider_is_runtime_error() {
        let (engine, _) = engine();
        let spider = Arc::new(Spider::new("ghost"));

        let err = engine.close_spider(&spider, "cancelled").expect_err("not open");
        assert_eq!(err.kind, "RuntimeError");
    }

    #[test]
    fn close_spider_rejects_plain_strings() {
        let (engine, _) = engine();

        let err = engine
            .invoke("close_spider", &Params::Positional(vec!["books".into()]))
            .expect("registered")
            .expect_err("needs a spider");
        assert_eq!(err.kind, "TypeError");
    }

    #[test]
    fn in_progress_requests_are_listed() {
        let (engine, _) = engine();
        engine.track_request(RequestSummary::get("http://example.com/a"));
        engine.track_request(RequestSummary::get("http://example.com/b"));
        engine.release_request("http://example.com/a");

        assert_eq!(
            engine.get_attribute("in_progress"),
            Some(RemoteValue::List(vec![RemoteValue::Request(
                RequestSummary::get("http://example.com/b")
            )]))
        );
    }
}
