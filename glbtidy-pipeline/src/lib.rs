//! Mesh processing pipeline for glbtidy
//!
//! Each object runs through the linear state sequence
//! `Imported -> Deduped -> Pruned -> Filled -> Normalized -> Decimated -> Unwrapped -> Exported`.
//! Partial-quality outcomes become warnings; only input errors, invariant violations,
//! resource exhaustion and cancellation stop an object. Objects of one scene are
//! independent and run on a rayon pool.

pub mod config;
pub mod cancel;
pub mod report;
pub mod driver;

pub use config::*;
pub use cancel::*;
pub use report::*;
pub use driver::*;
