//! Values reachable through the exposed host object graph

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::host::{spider::Spider, RemoteInspectable};

/// A request as seen by the engine, kept only for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub method: String,
    pub url: String,
}

impl RequestSummary {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status: u16,
    pub url: String,
}

/// Every kind of value the resource tree can be bound to.
#[derive(Clone)]
pub enum RemoteValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<RemoteValue>),
    Set(Vec<RemoteValue>),
    Map(BTreeMap<String, RemoteValue>),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Request(RequestSummary),
    Response(ResponseSummary),
    Spider(Arc<Spider>),
    Object(Arc<dyn RemoteInspectable>),
}

impl RemoteValue {
    /// Returns the inspectable behind this value, if it has attributes or methods.
    pub fn as_inspectable(&self) -> Option<&dyn RemoteInspectable> {
        match self {
            Self::Spider(spider) => Some(spider.as_ref()),
            Self::Object(object) => Some(object.as_ref()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "dict",
            Self::DateTime(_) => "datetime",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Request(_) => "Request",
            Self::Response(_) => "Response",
            Self::Spider(_) => "Spider",
            Self::Object(object) => object.kind(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_spider(&self) -> Option<&Arc<Spider>> {
        match self {
            Self::Spider(spider) => Some(spider),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Debug for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Self::Int(value) => f.debug_tuple("Int").field(value).finish(),
            Self::Float(value) => f.debug_tuple("Float").field(value).finish(),
            Self::Str(value) => f.debug_tuple("Str").field(value).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::DateTime(value) => f.debug_tuple("DateTime").field(value).finish(),
            Self::Date(value) => f.debug_tuple("Date").field(value).finish(),
            Self::Time(value) => f.debug_tuple("Time").field(value).finish(),
            Self::Request(value) => f.debug_tuple("Request").field(value).finish(),
            Self::Response(value) => f.debug_tuple("Response").field(value).finish(),
            Self::Spider(spider) => f.debug_tuple("Spider").field(&spider.name()).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(&object.kind()).finish(),
        }
    }
}

/// Structural equality; objects compare by identity.
impl PartialEq for RemoteValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Request(a), Self::Request(b)) => a == b,
            (Self::Response(a), Self::Response(b)) => a == b,
            (Self::Spider(a), Self::Spider(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for RemoteValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RemoteValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for RemoteValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for RemoteValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RemoteValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<NaiveDateTime> for RemoteValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<RemoteValue>> From<Vec<T>> for RemoteValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, RemoteValue>> for RemoteValue {
    fn from(map: BTreeMap<String, RemoteValue>) -> Self {
        Self::Map(map)
    }
}
