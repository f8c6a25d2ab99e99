//! # OSD Module
//!
//! Status output to the on-screen-display process.
//!
//! This module handles:
//! - Encoding device state into the one-line status frame
//! - Launching the OSD child process and checking it started
//! - Signalling the child and writing frames to its stdin

pub mod frame;
pub mod transport;

pub use frame::StatusFrame;
pub use transport::{OsdMode, OsdProcess, OsdSink};
