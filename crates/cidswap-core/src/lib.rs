//! # cidswap-core
//! Foundation types and collaborator traits for the cidswap exchange engine.

pub mod constants;
pub mod error;
pub mod offer;
pub mod traits;
pub mod types;
