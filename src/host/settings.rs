//! Host crawl settings with the host's loose typing rules

use std::{collections::BTreeMap, env, sync::LazyLock};

use thiserror::Error;

use crate::host::{InvocationError, MethodRegistry, Params, RemoteInspectable, RemoteValue};

/// Environment variable prefixes copied into [`Settings::from_env`].
const ENV_PREFIXES: [&str; 1] = ["JSONRPC_"];
const ENV_KEYS: [&str; 3] = ["BOT_NAME", "SPIDER_ALLOWED_DOMAINS", "SPIDER_START_URLS"];

static METHODS: LazyLock<MethodRegistry<Settings>> = LazyLock::new(|| {
    MethodRegistry::new()
        .with("get", Settings::remote_get)
        .with("getbool", Settings::remote_getbool)
        .with("getint", Settings::remote_getint)
        .with("getlist", Settings::remote_getlist)
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for setting {name}: {reason}")]
pub struct SettingError {
    pub name: String,
    pub reason: String,
}

impl SettingError {
    fn new(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<SettingError> for InvocationError {
    fn from(err: SettingError) -> Self {
        InvocationError::value_error(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, RemoteValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the service's settings from the process environment.
    pub fn from_env() -> Self {
        let values = env::vars()
            .filter(|(key, _)| {
                ENV_KEYS.contains(&key.as_str())
                    || ENV_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
            })
            .map(|(key, value)| (key, RemoteValue::Str(value)))
            .collect();

        Self { values }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<RemoteValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<RemoteValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&RemoteValue> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(RemoteValue::as_str)
    }

    pub fn getbool(&self, name: &str, default: bool) -> Result<bool, SettingError> {
        let Some(value) = self.get(name) else {
            return Ok(default);
        };

        match value {
            RemoteValue::Bool(flag) => Ok(*flag),
            RemoteValue::Int(0) => Ok(false),
            RemoteValue::Int(1) => Ok(true),
            RemoteValue::Str(text) => match text.trim() {
                "1" | "true" | "True" => Ok(true),
                "0" | "false" | "False" => Ok(false),
                _ => Err(SettingError::new(
                    name,
                    "supported boolean values are 0/1, True/False and true/false",
                )),
            },
            other => Err(SettingError::new(
                name,
                format!("expected a boolean, got {}", other.type_name()),
            )),
        }
    }

    pub fn getint(&self, name: &str, default: i64) -> Result<i64, SettingError> {
        let Some(value) = self.get(name) else {
            return Ok(default);
        };

        match value {
            RemoteValue::Int(number) => Ok(*number),
            RemoteValue::Float(number) => Ok(number.trunc() as i64),
            RemoteValue::Str(text) => text
                .trim()
                .parse()
                .map_err(|_| SettingError::new(name, format!("'{text}' is not an integer"))),
            other => Err(SettingError::new(
                name,
                format!("expected an integer, got {}", other.type_name()),
            )),
        }
    }

    /// Lists may be given natively or as a comma separated string.
    pub fn getlist(&self, name: &str) -> Result<Option<Vec<RemoteValue>>, SettingError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };

        match value {
            RemoteValue::List(items) | RemoteValue::Set(items) => Ok(Some(items.clone())),
            RemoteValue::Str(text) if text.trim().is_empty() => Ok(Some(Vec::new())),
            RemoteValue::Str(text) => Ok(Some(
                text.split(',')
                    .map(|item| RemoteValue::from(item.trim()))
                    .collect(),
            )),
            other => Err(SettingError::new(
                name,
                format!("expected a list, got {}", other.type_name()),
            )),
        }
    }

    fn remote_get(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["name", "default"])?;
        let name = params.str_arg(0, "name")?;
        let default = params.get(1, "default").cloned().unwrap_or(RemoteValue::Null);
        Ok(self.get(name).cloned().unwrap_or(default))
    }

    fn remote_getbool(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["name", "default"])?;
        let name = params.str_arg(0, "name")?;
        let default = match params.get(1, "default") {
            Some(RemoteValue::Bool(flag)) => *flag,
            Some(other) => {
                return Err(InvocationError::type_error(format!(
                    "default must be bool, not {}",
                    other.type_name()
                )))
            }
            None => false,
        };
        Ok(RemoteValue::Bool(self.getbool(name, default)?))
    }

    fn remote_getint(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["name", "default"])?;
        let name = params.str_arg(0, "name")?;
        let default = match params.get(1, "default") {
            Some(value) => value.as_i64().ok_or_else(|| {
                InvocationError::type_error(format!(
                    "default must be int, not {}",
                    value.type_name()
                ))
            })?,
            None => 0,
        };
        Ok(RemoteValue::Int(self.getint(name, default)?))
    }

    fn remote_getlist(&self, params: &Params) -> Result<RemoteValue, InvocationError> {
        params.accept(&["name"])?;
        let name = params.str_arg(0, "name")?;
        Ok(RemoteValue::List(self.getlist(name)?.unwrap_or_default()))
    }
}

impl RemoteInspectable for Settings {
    fn kind(&self) -> &'static str {
        "Settings"
    }

    fn list_attributes(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn get_attribute(&self, name: &str) -> Option<RemoteValue> {
        self.values.get(name).cloned()
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
        Some(RemoteValue::Map(self.values.clone()))
    }
}
