//! Downloads a profile's media catalog to local storage, skipping what is
//! already there.

pub mod config;
pub mod logger;
pub mod runner;
pub mod site_cache;
pub mod vsco;
