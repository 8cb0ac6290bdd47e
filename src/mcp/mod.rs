//! Model Context Protocol (MCP) envelopes and method routing
//!
//! `rpc` owns the JSON-RPC 2.0 wire shapes; `server` maps methods onto the
//! tool catalog and turns handler failures into error envelopes.

pub mod rpc;
pub mod server;
