//! # Flowprobe Core
//!
//! Core types, traits, and errors for the flowprobe telemetry probe.
//!
//! This crate provides the vocabulary shared by the event log, the payload
//! scanner and the probe service, so that each of them can be tested in
//! isolation against a controllable clock.
//!
//! ## Key Traits
//!
//! - [`WallClock`]: Wall-clock time source with microsecond resolution
//!
//! ## Key Types
//!
//! - [`ProbeId`]: Identifier of an instrumentation point
//! - [`ProbePoint`]: The well-known instrumentation points of the packet path
//! - [`Timestamp`]: Seconds + microseconds, always normalized
//! - [`ProbeEvent`]: A recorded, immutable probe event
//! - [`EventDraft`]: The caller-supplied fields of an event before it is stamped

pub mod clock;
pub mod error;
pub mod event;
pub mod probe_point;

// Re-export main types
pub use clock::*;
pub use error::*;
pub use event::*;
pub use probe_point::*;
