//! HTTP API: routing, request gating, and wire error mapping.

pub mod app;
pub mod authz;
pub mod middleware;
