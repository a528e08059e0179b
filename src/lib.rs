//! Event-driven HTTP endpoint uptime monitoring engine.
//!
//! ## Architecture
//!
//! ```text
//! REST layer (external) ──on_create/on_update/on_delete──> Registry
//!                                                              │
//!                                                  SnapshotDue │ (Scheduling Loop tick)
//!                                                              ▼
//!                                                        Probe Queue
//!                                                              │
//!                                                   Worker Pool │ (Prober + retry)
//!                                                              ▼
//!                                                  Persistence + Registry counter update
//!                                                              │
//!                                              on failure only │
//!                                                              ▼
//!                                                Notification Coordinator
//! ```
//!
//! The Health Monitor gates the Scheduling Loop; the Scheduler Manager owns
//! startup/shutdown ordering for all of the above.

pub mod actors;
pub mod config;
pub mod domain;
pub mod email;
pub mod manager;
pub mod persistence;
pub mod util;

#[cfg(feature = "api")]
pub mod api;

pub use domain::{Endpoint, HttpMethod, ProbeOutcome};
