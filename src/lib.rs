//! Incident knowledge-base service
//!
//! Tracks incidents from external ticketing systems through their
//! lifecycle, exposes that lifecycle and a similarity search as MCP tools,
//! and keeps a searchable corpus of closed incidents in sync.

pub mod api;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod integrations;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod sync;

pub use error::{AppError, Result};
