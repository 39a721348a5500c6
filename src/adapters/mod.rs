//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP API); outbound adapters
//! implement the domain ports (origin, mirrors, decoder, caches).

pub mod inbound;
pub mod outbound;
