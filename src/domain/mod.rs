//! Domain Layer
//!
//! Entities, errors and the ports the application layer depends on.

pub mod entities;
pub mod errors;
pub mod ports;
