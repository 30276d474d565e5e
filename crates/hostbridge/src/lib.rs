//! Host-side plumbing for a desktop shell that drives a long-running worker.
//!
//! hostbridge gates a sandboxed renderer's IPC calls through per-mode channel
//! allow-lists, frames the worker's `GSMMSG:` stdout protocol, supervises the
//! worker process, and serves a single-peer WebSocket control channel.
//!
//! # Crate Structure
//!
//! - [`transport`]: port probing with fallback and the persisted shared config
//! - [`frame`]: the bridge [`Message`](frame::Message) and line framing
//! - [`gate`]: channel registry, gatekeeper, and in-process bus (behind `gate`)
//! - [`peer`]: control-channel server/client and worker supervisor (behind `peer`)

/// Re-export transport types.
pub mod transport {
    pub use hostbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hostbridge_frame::*;
}

/// Re-export gate types (requires `gate` feature).
#[cfg(feature = "gate")]
pub mod gate {
    pub use hostbridge_gate::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use hostbridge_peer::*;
}
