//! # Slotwatch
//!
//! Occupancy verification for parking slots that share a single PTZ camera.
//!
//! An external occupancy source reports when a slot becomes occupied. The
//! orchestrator then spawns a slot worker that takes the camera, aims it at
//! the slot's preset, waits for it to settle and asks a detection backend
//! whether a vehicle is really there. The resulting verdict drives an alert
//! indicator, while an environment sensor drives a cooling level.
//!
//! ## Core guarantees
//!
//! - **One camera holder**: the camera lock is held by at most one worker,
//!   waiters are served FIFO, and the lease is released on every exit path
//!   (including cancellation and panics).
//! - **One worker per slot**: the orchestrator owns every worker handle and
//!   reconciles them with occupancy each tick.
//! - **One verdict per run**: a worker posts exactly one verdict unless it
//!   is cancelled first.
//! - **Bounded backend**: single-shot detections run under a hard timeout
//!   and their named backend instance is torn down after every job.
//!
//! ## Detection variants
//!
//! - *Single-shot*: the worker captures a frame and submits a job on a
//!   capacity-one, latest-wins queue; the inference worker answers it.
//! - *Streaming*: one long-lived backend publishes its output on a detection
//!   feed; workers poll it a bounded number of times.
//!
//! ```rust,ignore
//! use slotwatch::builders::build_orchestrator;
//! use slotwatch::config::VerifierConfig;
//! use slotwatch::core::OccupancyMap;
//! use tokio_util::sync::CancellationToken;
//!
//! let cfg = VerifierConfig::from_file("slotwatch.json")?;
//! let occupancy = OccupancyMap::new();
//! let mut orchestrator = build_orchestrator(&cfg, occupancy.clone())?;
//!
//! // The occupancy transport only ever calls `set`.
//! occupancy.set(0, true);
//!
//! let shutdown = CancellationToken::new();
//! orchestrator.run(shutdown).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Camera lock, workers, orchestrator and their collaborator seams.
pub mod core;
/// Configuration models for the camera, slots, timing and backends.
pub mod config;
/// Builders to construct the orchestrator from configuration.
pub mod builders;
/// Infrastructure adapters for queues, camera, capture, backends and sensors.
pub mod infra;
/// Status models and shutdown signal handling.
pub mod runtime;
/// Shared utilities.
pub mod util;
