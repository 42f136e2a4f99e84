//! Domain Layer
//!
//! Pure types and rules with no I/O: session identity, market payloads,
//! volume normalization and trailing-stop decisions.

pub mod market;
pub mod session;
pub mod trailing;
pub mod volume;
