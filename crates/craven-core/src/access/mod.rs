//! ============================================================================
//! Access Module - Status-gated access to protected areas
//! ============================================================================
//! Each protected area mounts one gate. The gate reads the signed-in
//! identity, runs the variant's predicate against the record store and
//! settles in one state.
//!
//! ## Variants
//! - **Customer**: approved application
//! - **Onboarding**: approved application with onboarding completed
//! - **Admin**: `admin` role row
//! - **BusinessPortal**: any signed-in identity
//! - **Executive**: exec record, optionally a specific role (`ceo` passes all)
//!
//! Superusers (allow-list or `superuser` role) pass every predicate.
//! Lookup errors fail closed.
//!
//! ## Usage
//! ```rust,ignore
//! use craven_core::access::{AccessGate, GateVariant, LogNavigator};
//!
//! let gate = Arc::new(AccessGate::new(GateVariant::Admin, &client, Arc::new(LogNavigator)));
//! let handle = gate.mount();
//! let state = handle.resolved().await;
//! ```
//! ============================================================================

mod checker;
mod gate;
mod navigator;
mod types;

pub use checker::{AccessChecker, Grants};
pub use gate::{AccessGate, GateHandle};
pub use navigator::{LogNavigator, Navigator, RecordingNavigator};
pub use types::{GateError, GateOutcome, GateState, GateVariant};
