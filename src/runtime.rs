//! Runtime for executing conversations
//!
//! The router's transition function is pure; everything it asks for happens
//! here. The relay owns the transports, the session store, the routing
//! (hand-off) sub-protocol, and per-voter serialization of requests.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Relay, RelayError};
pub use traits::*;
