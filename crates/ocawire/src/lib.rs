//! AES70 / OCA wire encoding over OCP.1.
//!
//! # Crate Structure
//!
//! - [`types`] - type signatures, the value model and the parameter [`types::Encoder`]
//! - [`frame`] - PDUs, message framing and stream reassembly (`async` adds a
//!   `tokio_util` codec)

/// Re-export type codec types.
pub mod types {
    pub use ocawire_types::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ocawire_frame::*;
}
