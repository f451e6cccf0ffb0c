//! In-memory stats collector

use std::{
    collections::BTreeMap,
    sync::{LazyLock, Mutex},
};

use crate::host::{lock, InvocationError, MethodRegistry, Params, RemoteInspectable, RemoteValue};

type StatsMap = BTreeMap<String, RemoteValue>;

static METHODS: LazyLock<MethodRegistry<StatsCollector>> = LazyLock::new(|| {
    MethodRegistry::new()
        .with("get_stats", StatsCollector::remote_get_stats)
        .with("get_value", StatsCollector::remote_get_value)
        .with("set_value", StatsCollector::remote_set_value)
        .with("inc_value", StatsCollector::remote_inc_value)
        .with("max_value", StatsCollector::remote_max_value)
        .with("min_value", StatsCollector::remote_min_value)
        .with("clear_stats", StatsCollector::remote_clear_stats)
});

#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: Mutex<StatsMap>,
    spider_stats: Mutex<BTreeMap<String, StatsMap>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_stats(&self) -> StatsMap {
        lock(&self.stats).clone()
    }

    pub fn get_value(&self, key: &str) -> Option<RemoteValue> {
        lock(&self.stats).get(key).cloned()
    }

    pub fn set_value(&self, key: impl Into<String>, value: impl Into<RemoteValue>) {
        lock(&self.stats).insert(key.into(), value.into());
    }

    pub fn inc_value(
        &self,
        key: &str,
        count: &RemoteValue,
        start: &RemoteValue,
    ) -> Result<RemoteValue, InvocationError> {
        let mut stats = lock(&self.stats);
        let current = stats.get(key).unwrap_or(start);
        let updated = add_numbers(current, count)?;
        stats.insert(key.to_string(), updated.clone());
        Ok(updated)
    }

    pub fn max_value(&self, key: &str, value: RemoteValue) -> Result<(), InvocationError> {
        self.keep_extreme(key, value, |current, candidate| candidate > current)
    }

    pub fn min_value(&self, key: &str, value: RemoteValue) -> Result<(), InvocationError> {
        self.keep_extreme(key, value, |current, candidate| candidate < current)
    }

    pub fn clear_stats(&self) {
        lock(&self.stats).clear();
    }

    /// Moves the live stats of a finished spider into `spider_stats`.
    pub fn close_spider(&self, spider_name: &str) {
        let snapshot = self.get_stats();
        lock(&self.spider_stats).insert(spider_name.to_string(), snapshot);
    }

    fn keep_extreme(
        &self,
        key: &str,
        value: RemoteValue,
        replaces: fn(f64, f64) -> bool,
    ) -> Result<(), InvocationError> {
        let candidate = number(&value)?;
        let mut stats = lock(&self.stats);
        let replace = match stats.get(key) {
            Some(current) => replaces(number(current)?, candidate),
            None => true,
        };
        if replace {
            stats.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remote_get_stats(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&[])?;
        Ok(RemoteValue::Map(self.get_stats()))
    }

    fn remote_get_value(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["key", "default"])?;
        let key = params.str_arg(0, "key")?;
        let default = params.get(1, "default").cloned().unwrap_or(RemoteValue::Null);
        Ok(self.get_value(key).unwrap_or(default))
    }

    fn remote_set_value(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["key", "value"])?;
        let key = params.str_arg(0, "key")?;
        let value = params.required(1, "value")?.clone();
        self.set_value(key, value);
        Ok(RemoteValue::Null)
    }

    fn remote_inc_value(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["key", "count", "start"])?;
        let key = params.str_arg(0, "key")?;
        let count = params.get(1, "count").cloned().unwrap_or(RemoteValue::Int(1));
        let start = params.get(2, "start").cloned().unwrap_or(RemoteValue::Int(0));
        self.inc_value(key, &count, &start)?;
        Ok(RemoteValue::Null)
    }

    fn remote_max_value(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["key", "value"])?;
        let key = params.str_arg(0, "key")?;
        self.max_value(key, params.required(1, "value")?.clone())?;
        Ok(RemoteValue::Null)
    }

    fn remote_min_value(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["key", "value"])?;
        let key = params.str_arg(0, "key")?;
        self.min_value(key, params.required(1, "value")?.clone())?;
        Ok(RemoteValue::Null)
    }

    fn remote_clear_stats(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&[])?;
        self.clear_stats();
        Ok(RemoteValue::Null)
    }
}

fn number(value: &RemoteValue) -> Result<f64, InvocationError> {
    value.as_f64().ok_or_else(|| {
        InvocationError::type_error(format!(
            "unsupported operand type: '{}'",
            value.type_name()
        ))
    })
}

fn add_numbers(current: &RemoteValue, count: &RemoteValue) -> Result<RemoteValue, InvocationError> {
    match (current, count) {
        (RemoteValue::Int(a), RemoteValue::Int(b)) => a
            .checked_add(*b)
            .map(RemoteValue::Int)
            .ok_or_else(|| InvocationError::new("OverflowError", "integer overflow")),
        _ => Ok(RemoteValue::Float(number(current)? + number(count)?)),
    }
}

impl RemoteInspectable for StatsCollector {
    fn kind(&self) -> &'static str {
        "MemoryStatsCollector"
    }

    fn list_attributes(&self) -> Vec<String> {
        let mut attributes = vec!["spider_stats".to_string()];
        attributes.extend(lock(&self.stats).keys().cloned());
        attributes
    }

    fn get_attribute(&self, name: &str) -> Option<RemoteValue> {
        if name == "spider_stats" {
            let spider_stats = lock(&self.spider_stats)
                .iter()
                .map(|(spider, stats)| (spider.clone(), RemoteValue::Map(stats.clone())))
                .collect();
            return Some(RemoteValue::Map(spider_stats));
        }

        self.get_value(name)
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
        Some(RemoteValue::Map(self.get_stats()))
    }
}
