// crates/serialite-config/src/lib.rs
// ============================================================================
// Module: Serialite Config Library
// Description: Canonical config model and validation for the bridge.
// Purpose: Single source of truth for serialite.toml semantics.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! `serialite-config` defines the configuration model consumed by the
//! `serialite` connection bridge: worker thread naming, the bounded retry
//! policy applied when compiling statements under contention, engine open
//! options, and logging. Loading is strict and fail-closed: unknown keys,
//! oversized files, and out-of-range limits are rejected.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
