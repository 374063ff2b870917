//! Line protocol of the GHS panel.
//!
//! This module contains the command set, the error/status code tables and
//! the reply parsing used by the panel adapter.

pub mod commands;
pub mod response;

pub use commands::*;
pub use response::*;
