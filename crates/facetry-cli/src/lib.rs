//! # facetry-cli
//!
//! Command-line front end for Facetry.
//!
//! - `facetry search` runs a query and prints hits, optionally with
//!   pre-applied filters, a sort order and several pages
//! - `facetry facets` prints the filter trees with document counts
//!
//! Both commands read the same configuration as
//! [`facetry_client::ClientConfig`], with `--endpoint`, `--corpus` and
//! `--catalog` overriding the file.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::{Args, Command};
pub use error::{Error, Result};
