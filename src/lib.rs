//! # Handheld Monitor Library
//!
//! Button, battery and status-overlay controller for single-board-computer
//! handhelds.
//!
//! This library turns GPIO buttons into a virtual gamepad, resolves hotkey
//! combos, tracks the battery through a small power state machine and feeds
//! a status line to an external OSD process.

pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod hid;
pub mod osd;
pub mod power;
pub mod state;
pub mod system;
