//! agentdeck - terminal dashboard for multi-agent task execution
//!
//! Backend channels (workflow engine, task loop, agent supervisor) are fanned
//! in by the [`bridge`], reduced by [`app::Dashboard`], and drawn by [`ui`].
//! [`runtime::run`] ties them to a real terminal.

pub mod agents;
pub mod app;
pub mod bridge;
pub mod config;
pub mod demo;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod logbuf;
pub mod message;
pub mod progress;
pub mod ratelimit;
pub mod ring;
pub mod runtime;
pub mod ui;
pub mod viewport;

pub use app::Dashboard;
pub use bridge::Bridge;
pub use config::DashboardConfig;
pub use error::{DashboardError, Result};
pub use message::{Cmd, Msg};
