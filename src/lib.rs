//! tdvoip-rs library crate
//!
//! This module exposes internal types for integration testing.
//! The main binary is in main.rs.

#[macro_use]
extern crate log;

pub mod call;
pub mod config;
pub mod constants;
pub mod engine;
pub mod event;
pub mod lock;
pub mod queue;
pub mod record;
pub mod script;
pub mod signaling;
pub mod source;
pub mod stdin;
