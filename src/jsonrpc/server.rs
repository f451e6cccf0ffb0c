//! Server side of a JSON-RPC call against a bound host value
//!
//! Decodes the request, looks the method up in the target's registry before touching the
//! params, invokes it and wraps the outcome. Every failure becomes an error envelope;
//! nothing here fails the exchange.

use serde_json::Value;
use tracing::{info, warn};

use crate::codec::{DecodingError, JsonDecoder, JsonEncoder};
use crate::host::{Params, RemoteValue};
use crate::jsonrpc::envelope::{
    JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};

/// Handles one raw request body and returns the encoded response envelope.
pub fn jsonrpc_server_call(target: &RemoteValue, request: &[u8], decoder: &JsonDecoder) -> Vec<u8> {
    dispatch(target, request, decoder).to_bytes()
}

pub fn dispatch(target: &RemoteValue, request: &[u8], decoder: &JsonDecoder) -> JsonRpcResponse {
    let payload = match decoder.parse(request) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "rejected unparsable rpc request");
            return JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    let Value::Object(mut request) = payload else {
        return JsonRpcResponse::error(Value::Null, INVALID_REQUEST, "Invalid Request");
    };
    let (Some(id), Some(Value::String(method))) = (request.remove("id"), request.remove("method"))
    else {
        return JsonRpcResponse::error(Value::Null, INVALID_REQUEST, "Invalid Request");
    };

    let has_method = target
        .as_inspectable()
        .is_some_and(|object| object.has_method(&method));
    if !has_method {
        return JsonRpcResponse::error(id, METHOD_NOT_FOUND, "Method not found");
    }

    let params = match decode_params(request.remove("params"), decoder) {
        Ok(params) => params,
        Err(ParamsError::Shape) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params");
        }
        Err(ParamsError::Decoding(err)) => {
            warn!(method = %method, error = %err, "failed to decode rpc params");
            return JsonRpcResponse::error(id, PARSE_ERROR, "Parse error");
        }
    };

    let response = invoke(target, id, &method, &params);

    info!(
        method = %method,
        target = target.type_name(),
        outcome = if response.is_error() { "failure" } else { "success" },
        "rpc call audited"
    );

    response
}

fn invoke(target: &RemoteValue, id: Value, method: &str, params: &Params) -> JsonRpcResponse {
    let outcome = target
        .as_inspectable()
        .and_then(|object| object.invoke(method, params));

    match outcome {
        None => JsonRpcResponse::error(id, METHOD_NOT_FOUND, "Method not found"),
        Some(Err(err)) => JsonRpcResponse::error(id, INTERNAL_ERROR, err.to_string()),
        Some(Ok(value)) => match JsonEncoder.to_json(&value) {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(err) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("EncodingError: {err}")),
        },
    }
}

enum ParamsError {
    Shape,
    Decoding(DecodingError),
}

fn decode_params(raw: Option<Value>, decoder: &JsonDecoder) -> Result<Params, ParamsError> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(Params::default()),
        Some(raw @ (Value::Array(_) | Value::Object(_))) => raw,
        Some(_) => return Err(ParamsError::Shape),
    };

    match decoder.resolve(raw).map_err(ParamsError::Decoding)? {
        RemoteValue::List(values) => Ok(Params::Positional(values)),
        RemoteValue::Map(values) => Ok(Params::Named(values)),
        _ => Err(ParamsError::Shape),
    }
}
