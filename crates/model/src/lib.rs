//! A provider-neutral protocol for talking to language models.
//!
//! The planner and the synthesizer only ever need two things from a model:
//! a finished assistant text for a list of messages, and a way to describe
//! the tool catalog without letting the model call anything. This crate
//! pins down that contract so the core can switch providers freely.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
