//! # Pantry Support
//!
//! Shared utilities for the Pantry service container.
//!
//! This crate provides:
//! - Text rendering for error messages (resolution chains, type names)
//! - "Did you mean?" suggestions for unknown identifiers

pub mod rendering;
