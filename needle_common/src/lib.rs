//! Needle Drive Common Library
//!
//! Shared constants, configuration loading and drive types for the
//! needle drive workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Defaults, parameter bounds, buffer capacities
//! - [`config`] - TOML loading (`ConfigLoader`) and the file layout
//! - [`drive`] - Drive configuration, states, errors, commands, status
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! needle_common = { path = "../needle_common" }
//! ```
//!
//! ```rust
//! use needle_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod drive;
pub mod prelude;
