//! Application Layer
//!
//! Ports to the remote gateway and the services that make calls through them
//! resilient.

pub mod ports;
pub mod services;
