//! Mintbook Transfer Engine
//!
//! Orchestration layer over the ledger store and risk controls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              Callers (bots, games, APIs)             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ submit(payload, priority)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               QueueHandle (Clone)                    │
//! │          mpsc mailbox → priority heap                │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ one task at a time
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │        TransferEngine (single consumer)              │
//! │   limits.check → breaker.can_execute → ledger op     │
//! │   success: record counters + breaker success         │
//! │   failure: retry → dead letter                       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The queue is the sole serialization point for balance-mutating task
//! types; the integrity auditor runs out-of-band and read-only.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod task;

pub use audit::{AuditCheck, AuditReport, IntegrityAuditor};
pub use config::Config;
pub use engine::TransferEngine;
pub use error::{Error, Result};
pub use queue::{QueueHandle, QueueStatus, TaskExecutor, TaskQueue};
pub use task::{GameRequest, RewardRequest, Task, TaskOutput, TaskPayload, TransferRequest};
