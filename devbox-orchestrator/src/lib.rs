//! Workload lifecycle orchestration
//!
//! Turns "this user just logged in" into a running guest with a known private
//! address. Each call inspects the platform afresh and performs the smallest
//! mutation that moves the guest towards `running`, so it is safe to invoke on
//! every login event.

pub mod error;
pub mod reconciler;

pub use error::{OrchestratorError, Result};
pub use reconciler::{ReconcileSettings, Reconciler};
