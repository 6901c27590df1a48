// src/lib.rs

//! bugring Telemetry Intake Library

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod intake;
pub mod janitor;
pub mod limiter;
pub mod models;
pub mod store;
