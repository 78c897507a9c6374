//! ron task runner library
//!
//! This module exports the core components for testing and integration.

pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod execute;
pub mod format;
pub mod logging;
pub mod make;
pub mod registry;
pub mod remote;
pub mod remotes;
pub mod sink;
pub mod target;
