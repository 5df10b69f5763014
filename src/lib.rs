//! # missiond - mission orchestration engine
//!
//! missiond drives scripted, event-driven missions inside a simulated
//! environment of chat contacts, remote hosts and player resources. Content
//! authors describe missions as JSON templates; the engine decides when a
//! template may run, starts instances, waits for in-world events or timeouts,
//! and applies rewards.
//!
//! ## Features
//!
//! - **Eligibility gating**: unlock keys, reputation requirements, concurrency
//!   limits, completion limits and retry cooldowns.
//! - **Race events**: a trigger (subscription plus condition) races a timeout;
//!   exactly one side wins and the loser is torn down.
//! - **Condition DSL**: a small sandboxed expression language evaluated over
//!   emitted event arguments.
//! - **Pluggable actions**: `send`, `delay`, `schedule`, `cancel`,
//!   `conditional`, `missionSucceeded`, `missionFailed`, and extension handlers.
//! - **Auto-scheduler**: a background loop that starts one mission at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use missiond::missions::{ActionRegistry, AutoScheduler, MissionManager, SchedulerConfig, SystemClock, TemplateRegistry};
//! use missiond::services::Environment;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = TemplateRegistry::load("data/missions")?;
//!     let manager = MissionManager::new(
//!         registry,
//!         Environment::new(),
//!         Arc::new(ActionRegistry::with_builtin_handlers()),
//!         Arc::new(SystemClock),
//!     );
//!     manager.unlock(&["ACT1"]);
//!     let scheduler = AutoScheduler::new(manager, SchedulerConfig::default()).start();
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`missions`] - templates, manager, per-mission event scheduler, actions, auto-scheduler
//! - [`services`] - in-process chat, wallet, reputation, login, syslog and host directory
//! - [`config`] - TOML configuration
//! - [`logutil`] - single-line log escaping
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Auto-Scheduler  │ ← polls for eligible templates
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Mission Manager │ ← unlocks, statistics, rewards
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Mission + Event │ ← trigger / timeout races
//! │ Scheduler       │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Services        │ ← chat, hosts, wallet, ...
//! └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod missions;
pub mod services;
