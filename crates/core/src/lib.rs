//! Franchise Portal Core - Shared types library.
//!
//! This crate provides common types used across all Franchise Portal components:
//! - `portal` - The web portal for franchisees and administrators
//! - `cli` - Command-line tools for dataset import and export
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! Everything that talks to the hosted backend lives in the `portal` crate.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, roles and table cells

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
