//! Textual references to running spiders
//!
//! Spiders cross the wire as `spider:<hex id>:<name>` and are looked up again among the
//! engine's open spiders, first by id and then by name.

use std::sync::{Arc, LazyLock, Weak};

use regex::Regex;

use crate::host::{engine::Engine, spider::Spider};

static SPIDER_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spider:([0-9a-f]+)?:?(.+)?$").expect("spider reference pattern is valid")
});

#[derive(Debug, Clone, Default)]
pub struct SpiderReferencer {
    engine: Weak<Engine>,
}

/// Outcome of looking a string up as a spider reference.
#[derive(Debug)]
pub enum SpiderLookup {
    NotAReference,
    Found(Arc<Spider>),
    NotRunning,
}

impl SpiderReferencer {
    pub fn new(engine: &Arc<Engine>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
        }
    }

    pub fn reference_for(spider: &Spider) -> String {
        format!("spider:{:x}:{}", spider.id(), spider.name())
    }

    pub fn lookup(&self, text: &str) -> SpiderLookup {
        let Some(captures) = SPIDER_REF_RE.captures(text) else {
            return SpiderLookup::NotAReference;
        };
        let id = captures.get(1).map(|m| m.as_str());
        let name = captures.get(2).map(|m| m.as_str());

        let Some(engine) = self.engine.upgrade() else {
            return SpiderLookup::NotRunning;
        };

        engine
            .open_spiders()
            .into_iter()
            .find(|spider| {
                id.is_some_and(|id| format!("{:x}", spider.id()) == id)
                    || name.is_some_and(|name| spider.name() == name)
            })
            .map_or(SpiderLookup::NotRunning, SpiderLookup::Found)
    }
}
