//! Scriptorium CLI library target.
//!
//! The binary is a thin clap front end; the command implementations live
//! here so integration tests can drive them directly.

pub mod commands;
