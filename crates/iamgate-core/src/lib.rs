//! Core iamgate library (config, identity client, authentication facade).

pub mod config;
pub mod identity;
pub mod interrupt;
pub mod service;
#[cfg(feature = "testing")]
pub mod testing;

pub use service::{IamService, InitOutcome, RefreshOutcome};
