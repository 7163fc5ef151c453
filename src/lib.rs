//! hostpilot: LLM agent orchestration for single-threaded host applications.
//!
//! A multi-turn conversation loop streams responses from a provider,
//! dispatches every requested tool through a host execution bridge onto the
//! host's single execution context, and folds the results back into the
//! conversation until the model answers.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hostpilot::prelude::*;
//! use hostpilot::bridge::{HostBridge, HostThread};
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: i64,
//! }
//!
//! impl HostContext for Counter {}
//!
//! # async fn example() -> hostpilot::error::Result<()> {
//! let registry = ToolRegistry::new().with(FnTool::new(
//!     "increment",
//!     "Increment the counter",
//!     ToolSchema::empty(),
//!     |host: &mut Counter, _| {
//!         host.value += 1;
//!         ToolResult::success(format!("value = {}", host.value))
//!     },
//! ));
//! let (bridge, wakeup) = HostBridge::with_wake_channel(registry);
//! let bridge = Arc::new(bridge);
//! let _host = HostThread::spawn(bridge.clone(), wakeup, Counter::default())?;
//!
//! let settings = EngineSettings::default();
//! let runtime = AgentRuntime::from_settings(&settings, PilotConfig::global(), bridge, None)?;
//! let outcome = runtime.prompt("Increment the counter twice").await?;
//! println!("{:?}", outcome.message().map(|m| m.text()));
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod bridge;
pub mod config;
pub mod error;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
