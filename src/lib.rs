//! # rhopper - SSH Jump-Host Telnet Session Pool
//!
//! `rhopper` keeps many network devices under periodic command execution when
//! they are only reachable by telnet from a jump host. For every device it
//! opens an SSH session to the jump host, runs `telnet <device> <port>` in a
//! shell channel, and afterwards issues a configured command on a fixed
//! cadence, detecting completion by matching an expected output fragment.
//!
//! ## Features
//!
//! - **Concurrent establishment**: bulk (all at once) and incremental (one by one) submission
//! - **Pattern-driven protocol**: no terminal emulator, just non-blocking polls and substring matching
//! - **Live registry**: list, remove by identifier, stop and clear
//! - **Recurring schedule**: fixed-delay ticks over the whole live pool
//! - **Pluggable transport**: [`session::TransportProvider`] with an SSH implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rhopper::config::PoolSettings;
//! use rhopper::session::{
//!     ConnectionSecurityOptions, ScheduleConfig, SessionBatch, SessionPool, TimeUnit,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SessionPool::over_ssh(
//!         ConnectionSecurityOptions::legacy_compatible(),
//!         PoolSettings::default(),
//!     );
//!
//!     let summaries = pool
//!         .connect(SessionBatch {
//!             user_name: vec!["admin".to_string()],
//!             password: vec!["password".to_string()],
//!             host: vec!["192.168.1.1".to_string()],
//!             port: None,
//!             telnet_port: vec![23],
//!             commands: vec!["show version".to_string()],
//!             wait_fors: Some(vec!["#".to_string()]),
//!         })
//!         .await?;
//!     println!("{summaries:?}");
//!
//!     pool.configure_schedule(ScheduleConfig {
//!         initial_delay: 0,
//!         period: 60,
//!         time_unit: TimeUnit::Seconds,
//!     })
//!     .await?;
//!
//!     // ... later
//!     println!("{}", pool.stop().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::SessionPool`] - Owns sessions, establishment workers and the schedule
//! - [`session::SessionRegistry`] - The live session pool
//! - [`session::Scheduler`] - Recurring command tick
//! - [`error::ConnectError`] - Error types for every operation
//! - [`config`] - SSH algorithm tiers and polling constants

pub mod config;
pub mod error;
pub mod session;
