//! # Measurement Plane
//!
//! Scheduling and transport core for a measurement control plane: components
//! advertise measurement *capabilities*, clients send *specifications* that
//! instantiate them, and components answer with *receipts* and eventually
//! *results* or *exceptions*.
//!
//! ## Key Features
//!
//! - **Typed Messages**: capabilities, specifications, receipts, results,
//!   exceptions, withdrawals, interrupts and envelopes with a JSON wire format
//! - **Fulfillment Matching**: label, parameter constraints, result columns
//!   and temporal windows decide which capability a specification targets
//! - **Job Lifecycle**: receipts while running, terminal replies afterwards,
//!   cooperative interrupts and one-shot completion channels
//! - **Authorization**: role-based gate filtering what each identity sees
//! - **Both Roles**: an axum listener for clients to call, and a reqwest
//!   initiator that registers with a supervisor and polls it for work
//!
//! ## Scheduler
//!
//! ```rust,ignore
//! use measurement_plane::builders::SchedulerBuilder;
//! use measurement_plane::core::FnService;
//! use measurement_plane::model::{Capability, MeasurementResult, Message, Specification};
//!
//! let scheduler = SchedulerBuilder::new().build()?;
//! let ping = Capability::new("ping-test")
//!     .with_parameter("destination.ip4", "*".parse()?)
//!     .with_result("delay.twoway.icmp.us");
//! scheduler.add_service(Arc::new(FnService::new(ping.clone(), |spec, _| async move {
//!     Ok(Message::from(MeasurementResult::for_specification(&spec).with_row(vec![1200.into()])))
//! })))?;
//!
//! let spec = Specification::from_capability(&ping, "now ... now + 1s".parse()?)
//!     .with_parameter("destination.ip4", "192.0.2.1");
//! let receipt = scheduler.process_message("client", spec.into(), None)?;
//! let result = scheduler.job_for_message(&receipt)?.wait_terminal().await;
//! ```
//!
//! ## Components
//!
//! ```rust,ignore
//! let base = BaseComponent::new(ComponentConfig::from_json_str(raw)?, &modules)?;
//! let listener = ListenerComponent::new(base)?;
//! let socket = listener.bind().await?;
//! listener.serve(socket, shutdown).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Message protocol model and wire codec.
pub mod model;
/// Core scheduling: jobs, services, authorization and audit.
pub mod core;
/// Configuration models for components and scheduler policies.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Listener and initiator HTTP components.
pub mod component;
/// Runtime adapters for spawning job bodies.
pub mod runtime;
/// Shared utilities.
pub mod util;
