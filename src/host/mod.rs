//! Host crawl objects exposed to remote inspection
//!
//! Every object reachable from the crawler implements [`RemoteInspectable`]: it lists and
//! resolves its attributes and invokes methods from an explicit per-type [`MethodRegistry`].

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

pub mod crawler;
pub mod engine;
pub mod settings;
pub mod spider;
pub mod stats;
pub mod value;

pub use value::RemoteValue;

/// Capability interface for objects that can be walked and called remotely.
pub trait RemoteInspectable: Send + Sync {
    /// Short type name, used in error messages and logs.
    fn kind(&self) -> &'static str;

    fn list_attributes(&self) -> Vec<String>;

    fn get_attribute(&self, name: &str) -> Option<RemoteValue>;

    fn has_method(&self, name: &str) -> bool;

    /// Invokes a registered method, `None` when no method of that name exists.
    fn invoke(
        &self,
        method: &str,
        params: &Params,
    ) -> Option<Result<RemoteValue, InvocationError>>;

    /// JSON-safe representation used when the object itself is rendered.
    fn represent(&self) -> Option<RemoteValue> {
        None
    }
}

pub type Handler<T> = fn(&T, &Params) -> Result<RemoteValue, InvocationError>;

/// Name to handler table populated explicitly for one exposed type.
pub struct MethodRegistry<T> {
    handlers: BTreeMap<&'static str, Handler<T>>,
}

impl<T> MethodRegistry<T> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &'static str, handler: Handler<T>) -> Self {
        self.handlers.insert(name, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn call(
        &self,
        target: &T,
        name: &str,
        params: &Params,
    ) -> Option<Result<RemoteValue, InvocationError>> {
        self.handlers
            .get(name)
            .map(|handler| handler(target, params))
    }
}

impl<T> Default for MethodRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments of a call: JSON arrays are positional, JSON objects are named.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<RemoteValue>),
    Named(BTreeMap<String, RemoteValue>),
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl Params {
    /// Looks an argument up by position or by name, whichever style the caller used.
    pub fn get(&self, index: usize, name: &str) -> Option<&RemoteValue> {
        match self {
            Self::Positional(values) => values.get(index),
            Self::Named(values) => values.get(name),
        }
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&RemoteValue, InvocationError> {
        self.get(index, name).ok_or_else(|| {
            InvocationError::type_error(format!("missing required argument '{name}'"))
        })
    }

    /// Rejects extra positional arguments and unknown keywords.
    pub fn accept(&self, names: &[&str]) -> Result<(), InvocationError> {
        match self {
            Self::Positional(values) if values.len() > names.len() => {
                Err(InvocationError::type_error(format!(
                    "takes at most {} arguments ({} given)",
                    names.len(),
                    values.len()
                )))
            }
            Self::Named(values) => match values.keys().find(|key| !names.contains(&key.as_str())) {
                Some(key) => Err(InvocationError::type_error(format!(
                    "got an unexpected keyword argument '{key}'"
                ))),
                None => Ok(()),
            },
            Self::Positional(_) => Ok(()),
        }
    }

    pub fn str_arg(&self, index: usize, name: &str) -> Result<&str, InvocationError> {
        let value = self.required(index, name)?;
        value.as_str().ok_or_else(|| {
            InvocationError::type_error(format!(
                "argument '{name}' must be str, not {}",
                value.type_name()
            ))
        })
    }
}

/// Failure raised by an invoked method, reported back with its kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct InvocationError {
    pub kind: &'static str,
    pub message: String,
}

impl InvocationError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }
}

/// Locks host state, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_and_positional_params_resolve_the_same_argument() {
        let positional = Params::Positional(vec![RemoteValue::from("item_count")]);
        let named = Params::Named(BTreeMap::from([(
            "key".to_string(),
            RemoteValue::from("item_count"),
        )]));

        assert_eq!(positional.str_arg(0, "key"), Ok("item_count"));
        assert_eq!(named.str_arg(0, "key"), Ok("item_count"));
    }

    #[test]
    fn accept_rejects_unknown_keyword() {
        let params = Params::Named(BTreeMap::from([("bogus".to_string(), RemoteValue::Null)]));

        let err = params.accept(&["key"]).expect_err("unknown keyword must fail");
        assert_eq!(err.kind, "TypeError");
        assert!(err.message.contains("bogus"));
    }

    #[test]
    fn accept_rejects_extra_positionals() {
        let params = Params::Positional(vec![RemoteValue::Int(1), RemoteValue::Int(2)]);

        assert!(params.accept(&["value"]).is_err());
        assert!(params.accept(&["value", "other"]).is_ok());
    }

    #[test]
    fn registry_knows_its_method_names() {
        let registry = MethodRegistry::<()>::new().with("ping", |_, _| Ok(RemoteValue::Null));

        assert!(registry.contains("ping"));
        assert!(!registry.contains("pong"));
        assert!(registry.call(&(), "pong", &Params::default()).is_none());
    }

    #[test]
    fn missing_required_argument_is_type_error() {
        let err = Params::default()
            .required(0, "key")
            .expect_err("missing argument");
        assert_eq!(err.to_string(), "TypeError: missing required argument 'key'");
    }
}
