//! # SQZ Audio Player Library (sqz-ap)
//!
//! Arbitrates between one background music track and one foreground sound
//! effect, gated on the first user interaction.
//!
//! **Architecture:** [`AudioCoordinator`] drives handles created by an
//! [`AudioBackend`]. The in-memory backend serves tests and headless mode; the
//! device backend decodes with symphonia, resamples with rubato and mixes into
//! a cpal output stream.

pub mod backend;
pub mod coordinator;
pub mod duck;
pub mod error;
pub mod gate;

pub use backend::{AudioBackend, AudioHandle, HandleId, HandleStatus};
pub use coordinator::{AudioCoordinator, CoordinatorConfig};
pub use error::{AudioError, Result};
pub use gate::{AutoplayGate, Gesture};
