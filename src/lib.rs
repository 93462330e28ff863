//! Crate for the `metronome` project
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]

pub mod adapter;
pub mod config;
pub mod event;
pub mod exporter;
pub mod filter;
pub mod hook;
pub mod http;
pub mod logger;
pub mod request;
pub mod routes;

pub const METRONOME_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
