use std::sync::atomic::{AtomicU64, Ordering};

use crate::host::{
    settings::{SettingError, Settings},
    InvocationError, Params, RemoteInspectable, RemoteValue,
};

static NEXT_SPIDER_ID: AtomicU64 = AtomicU64::new(1);

const DEFAULT_SPIDER_NAME: &str = "crawl-jsonrpc";

/// A spider known to the engine; identified remotely by `spider:<hex id>:<name>`.
#[derive(Debug)]
pub struct Spider {
    id: u64,
    name: String,
    allowed_domains: Vec<String>,
    start_urls: Vec<String>,
}

impl Spider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_SPIDER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            allowed_domains: Vec::new(),
            start_urls: Vec::new(),
        }
    }

    /// Spider named by `BOT_NAME`, scoped by `SPIDER_ALLOWED_DOMAINS` and seeded from
    /// `SPIDER_START_URLS` (both comma-separated lists).
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingError> {
        let name = settings.get_str("BOT_NAME").unwrap_or(DEFAULT_SPIDER_NAME);
        Ok(Self::new(name)
            .with_allowed_domains(string_list(settings, "SPIDER_ALLOWED_DOMAINS")?)
            .with_start_urls(string_list(settings, "SPIDER_START_URLS")?))
    }

    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains;
        self
    }

    pub fn with_start_urls(mut self, urls: Vec<String>) -> Self {
        self.start_urls = urls;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn string_list(settings: &Settings, name: &str) -> Result<Vec<String>, SettingError> {
    Ok(settings
        .getlist(name)?
        .unwrap_or_default()
        .iter()
        .filter_map(RemoteValue::as_str)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect())
}

impl RemoteInspectable for Spider {
    fn kind(&self) -> &'static str {
        "Spider"
    }

    fn list_attributes(&self) -> Vec<String> {
        ["allowed_domains", "id", "name", "start_urls"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn get_attribute(&self, name: &str) -> Option<RemoteValue> {
        match name {
            "name" => Some(RemoteValue::from(self.name.as_str())),
            "id" => Some(RemoteValue::Str(format!("{:x}", self.id))),
            "allowed_domains" => Some(RemoteValue::from(self.allowed_domains.clone())),
            "start_urls" => Some(RemoteValue::from(self.start_urls.clone())),
            _ => None,
        }
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
