//! Request/response links between a tabletop controller, its table display
//! and its marker tracker.
//!
//! # Crate Structure
//!
//! - [`wire`]: Packet model and protobuf-compatible codec
//! - [`substrate`]: Platform primitives the transports ride on, with in-memory implementations
//! - [`channel`]: The channel contract, the three transports and the display multiplexer

/// Re-export wire types.
pub mod wire {
    pub use tablelink_wire::*;
}

/// Re-export substrate types.
pub mod substrate {
    pub use tablelink_substrate::*;
}

/// Re-export channel types.
pub mod channel {
    pub use tablelink_channel::*;
}
