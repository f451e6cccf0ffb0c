//! Root of the exposed object graph

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, LazyLock,
    },
};

use tracing::info;

use crate::host::{
    engine::Engine, settings::Settings, spider::Spider, stats::StatsCollector, InvocationError,
    MethodRegistry, Params, RemoteInspectable, RemoteValue,
};

static METHODS: LazyLock<MethodRegistry<Crawler>> =
    LazyLock::new(|| MethodRegistry::new().with("stop", Crawler::remote_stop));

#[derive(Debug)]
pub struct Crawler {
    settings: Arc<Settings>,
    stats: Arc<StatsCollector>,
    engine: Arc<Engine>,
    spider: Arc<Spider>,
    crawling: AtomicBool,
}

impl Crawler {
    pub fn new(settings: Settings, spider: Spider) -> Self {
        let stats = Arc::new(StatsCollector::new());
        Self {
            settings: Arc::new(settings),
            engine: Arc::new(Engine::new(stats.clone())),
            stats,
            spider: Arc::new(spider),
            crawling: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn spider(&self) -> &Arc<Spider> {
        &self.spider
    }

    /// False once the engine stops, including when its last spider is closed remotely.
    pub fn is_crawling(&self) -> bool {
        self.crawling.load(Ordering::SeqCst) && self.engine.is_running()
    }

    /// Opens the spider and starts the engine.
    pub fn crawl(&self) {
        self.crawling.store(true, Ordering::SeqCst);
        self.engine.start(self.spider.clone());
    }

    pub fn stop(&self) {
        if self.crawling.swap(false, Ordering::SeqCst) {
            info!(spider = self.spider.name(), "crawler stopping");
            self.engine.stop();
        }
    }

    fn remote_stop(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&[])?;
        self.stop();
        Ok(RemoteValue::Null)
    }
}

impl RemoteInspectable for Crawler {
    fn kind(&self) -> &'static str {
        "Crawler"
    }

    fn list_attributes(&self) -> Vec<String> {
        ["crawling", "engine", "settings", "spider", "stats"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn get_attribute(&self, name: &str) -> Option<RemoteValue> {
        match name {
            "settings" => Some(RemoteValue::Object(self.settings.clone())),
            "stats" => Some(RemoteValue::Object(self.stats.clone())),
            "engine" => Some(RemoteValue::Object(self.engine.clone())),
            "spider" => Some(RemoteValue::Spider(self.spider.clone())),
            "crawling" => Some(RemoteValue::Bool(self.is_crawling())),
            _ => None,
        }
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
        Some(RemoteValue::Map(BTreeMap::from([
            ("crawling".to_string(), RemoteValue::Bool(self.is_crawling())),
            ("spider".to_string(), RemoteValue::Spider(self.spider.clone())),
        ])))
    }
}
