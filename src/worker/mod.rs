//! Worker process: serves the media tool catalog over stdio.
//!
//! Stdout carries protocol frames only; all logging goes to stderr.

mod catalog;
mod server;

pub use catalog::tool_catalog;
pub use server::WorkerServer;
