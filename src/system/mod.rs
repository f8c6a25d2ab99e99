//! # System Collaborators Module
//!
//! Thin wrappers over the system utilities the monitor drives:
//! - `amixer` for the output volume
//! - `rfkill`, `systemctl` and `hcitool` for the wifi and bluetooth radios
//! - `killall`, `shutdown` and `aplay` for the shutdown path
//!
//! Every utility is invoked through a [`command::CommandRunner`], so the
//! collaborators can be exercised without touching the host. Failures are
//! logged by the collaborator and never escalate past it.

pub mod audio;
pub mod command;
pub mod host;
pub mod radio;
pub mod shutdown;
