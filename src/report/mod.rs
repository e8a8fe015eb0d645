//! Summary table output.

pub mod summary;

pub use summary::*;
