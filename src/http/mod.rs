//! HTTP transport for the resource tree
//!
//! Every path is served by one catch-all handler that dispatches through the tree.

pub mod handlers;
