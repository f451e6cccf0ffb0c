//! Path-addressable resource tree over the host object graph
//!
//! The root lists its statically registered children. Below it, every path segment is one
//! attribute lookup on the currently bound value.

use std::sync::{Arc, Weak};

use serde_json::json;

use crate::codec::{JsonDecoder, JsonEncoder};
use crate::errors::AppError;
use crate::host::{RemoteInspectable, RemoteValue};
use crate::jsonrpc::server::jsonrpc_server_call;

/// A node reached while walking a request path.
#[derive(Clone)]
pub enum Resource {
    Root(Arc<RootResource>),
    Rpc(RpcResource),
}

impl Resource {
    pub fn resolve_child(&self, name: &str) -> Result<Resource, AppError> {
        match self {
            Self::Root(root) if name.is_empty() => Some(Self::Root(root.clone())),
            Self::Root(root) => root.child(name).map(Self::Rpc),
            Self::Rpc(resource) => resource.resolve_child(name).map(Self::Rpc),
        }
        .ok_or_else(|| AppError::child_not_found(name))
    }

    /// Resolves every segment in turn, starting from `self`.
    pub fn walk<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Resource, AppError> {
        segments
            .into_iter()
            .try_fold(self.clone(), |node, segment| node.resolve_child(segment))
    }

    pub fn render_get(&self) -> Result<Vec<u8>, AppError> {
        match self {
            Self::Root(root) => Ok(root.render_get()),
            Self::Rpc(resource) => resource.render_get(),
        }
    }

    pub fn render_post(&self, body: &[u8], decoder: &JsonDecoder) -> Result<Vec<u8>, AppError> {
        match self {
            Self::Root(_) => Err(AppError::method_not_allowed("POST")),
            Self::Rpc(resource) => Ok(resource.render_post(body, decoder)),
        }
    }
}

/// Root node; holds its children's targets weakly.
#[derive(Default)]
pub struct RootResource {
    children: Vec<(String, Weak<dyn RemoteInspectable>)>,
}

impl RootResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_child(&mut self, name: impl Into<String>, target: &Arc<dyn RemoteInspectable>) {
        let name = name.into();
        self.children.retain(|(existing, _)| *existing != name);
        self.children.push((name, Arc::downgrade(target)));
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn child(&self, name: &str) -> Option<RpcResource> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .and_then(|(_, target)| target.upgrade())
            .map(|target| RpcResource::new(RemoteValue::Object(target)))
    }

    fn render_get(&self) -> Vec<u8> {
        json!({ "resources": self.child_names() }).to_string().into_bytes()
    }
}

/// Node bound to one host value.
#[derive(Clone)]
pub struct RpcResource {
    target: RemoteValue,
}

impl RpcResource {
    pub fn new(target: RemoteValue) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &RemoteValue {
        &self.target
    }

    pub fn resolve_child(&self, name: &str) -> Option<RpcResource> {
        self.target
            .as_inspectable()?
            .get_attribute(name)
            .map(RpcResource::new)
    }

    pub fn render_get(&self) -> Result<Vec<u8>, AppError> {
        Ok(JsonEncoder.encode(&self.target)?)
    }

    pub fn render_post(&self, body: &[u8], decoder: &JsonDecoder) -> Vec<u8> {
        jsonrpc_server_call(&self.target, body, decoder)
    }
}
