//! # Power Module
//!
//! Battery voltage acquisition and the power state machine.
//!
//! This module handles:
//! - Reading raw ADC codes and converting them to hundredths of a volt
//! - Rejecting spurious voltage drops with a hold filter
//! - Deriving battery percentage and the NORMAL / LOW_WARNING /
//!   SHUTDOWN_PENDING power state
//! - Auto-hiding the low-battery warning after a short delay

pub mod battery;
pub mod monitor;

pub use battery::{BatteryAdc, BatteryReader, SysfsAdc, VoltageFilter};
pub use monitor::{PowerMonitor, Thresholds, Transition};
