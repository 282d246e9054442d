//! Delicious Core - Shared domain types.
//!
//! This crate provides the types used across all Delicious components:
//! - `web` - The server-rendered store directory
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP. Slug derivation, email normalization, coordinate and
//! rating validation live here so they can be tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, slugs, tags, coordinates and ratings

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
