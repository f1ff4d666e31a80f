//! The `relay` command line client.
//!
//! This crate wires the pipeline from `relay-core` to an OpenAI-compatible
//! model and to a tool server speaking MCP over stdio.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod mcp;
