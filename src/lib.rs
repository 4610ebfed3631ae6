//! Ratewarden - In-process Sliding Window Rate Limiting
//!
//! This crate implements a per-key sliding window rate limiter. Every key
//! keeps the exact instants of its recent events, and a background sweeper
//! reclaims keys that have gone idle. Alongside the limiter it ships a few
//! small helpers used around it: DES/3DES block encryption, a best-effort
//! StatsD client, and bounds-checked regex capture access.

pub mod capture;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod ratelimit;
