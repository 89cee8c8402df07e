//! # fallguard-server
//!
//! HTTP server library for the fallguard health band bridge.
//!
//! This library provides the API handlers, shared state and logging setup used by
//! the `fallguard-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
