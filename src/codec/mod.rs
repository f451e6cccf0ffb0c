//! JSON encoding and decoding of host values
//!
//! The encoder turns host-specific kinds (dates, sets, request summaries, spiders, inspectable
//! objects) into JSON-safe forms. The decoder is its mirror for spider references.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::host::RemoteValue;

pub mod spider_ref;

use spider_ref::{SpiderLookup, SpiderReferencer};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("{kind} object is not JSON serializable")]
    NoRepresentation { kind: &'static str },
    #[error("float value {0} is out of range for JSON")]
    NonFiniteFloat(f64),
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Spider not running: {0}")]
    SpiderNotRunning(String),
    #[error("integer {0} does not fit in a signed 64-bit value")]
    IntegerOutOfRange(Number),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl JsonEncoder {
    pub fn encode(&self, value: &RemoteValue) -> Result<Vec<u8>, EncodingError> {
        let json = self.to_json(value)?;
        Ok(serde_json::to_vec(&json)?)
    }

    pub fn to_json(&self, value: &RemoteValue) -> Result<Value, EncodingError> {
        Ok(match value {
            RemoteValue::Null => Value::Null,
            RemoteValue::Bool(flag) => Value::Bool(*flag),
            RemoteValue::Int(number) => Value::Number((*number).into()),
            RemoteValue::Float(number) => Number::from_f64(*number)
                .map(Value::Number)
                .ok_or(EncodingError::NonFiniteFloat(*number))?,
            RemoteValue::Str(text) => Value::String(text.clone()),
            RemoteValue::List(items) | RemoteValue::Set(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.to_json(item))
                    .collect::<Result<_, _>>()?,
            ),
            RemoteValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| Ok((key.clone(), self.to_json(item)?)))
                    .collect::<Result<Map<_, _>, EncodingError>>()?,
            ),
            RemoteValue::DateTime(at) => Value::String(at.format(DATETIME_FORMAT).to_string()),
            RemoteValue::Date(day) => Value::String(day.format(DATE_FORMAT).to_string()),
            RemoteValue::Time(time) => Value::String(time.format(TIME_FORMAT).to_string()),
            RemoteValue::Request(request) => {
                Value::String(format!("<Request {} {}>", request.method, request.url))
            }
            RemoteValue::Response(response) => {
                Value::String(format!("<Response {} {}>", response.status, response.url))
            }
            RemoteValue::Spider(spider) => Value::String(SpiderReferencer::reference_for(spider)),
            RemoteValue::Object(object) => {
                let represented = object.represent().ok_or(EncodingError::NoRepresentation {
                    kind: object.kind(),
                })?;
                self.to_json(&represented)?
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    spiders: SpiderReferencer,
}

impl JsonDecoder {
    pub fn new(spiders: SpiderReferencer) -> Self {
        Self { spiders }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<RemoteValue, DecodingError> {
        let value = self.parse(bytes)?;
        self.resolve(value)
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<Value, DecodingError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Converts parsed JSON into host values, swapping spider references for spiders.
    ///
    /// Integers must fit in `i64`; larger ones are rejected rather than rounded to floats.
    pub fn resolve(&self, value: Value) -> Result<RemoteValue, DecodingError> {
        Ok(match value {
            Value::Null => RemoteValue::Null,
            Value::Bool(flag) => RemoteValue::Bool(flag),
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(integer), _) => RemoteValue::Int(integer),
                (None, Some(float)) if !number.is_u64() => RemoteValue::Float(float),
                _ => return Err(DecodingError::IntegerOutOfRange(number)),
            },
            Value::String(text) => match self.spiders.lookup(&text) {
                SpiderLookup::NotAReference => RemoteValue::Str(text),
                SpiderLookup::Found(spider) => RemoteValue::Spider(spider),
                SpiderLookup::NotRunning => return Err(DecodingError::SpiderNotRunning(text)),
            },
            Value::Array(items) => RemoteValue::List(
                items
                    .into_iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => RemoteValue::Map(
                map.into_iter()
                    .map(|(key, item)| Ok((key, self.resolve(item)?)))
                    .collect::<Result<_, DecodingError>>()?,
            ),
        })
    }
}
