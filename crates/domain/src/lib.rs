//! Shared domain types for the banter gateway: configuration, the common
//! error type, the wire-frame protocol, persona/history models, and the
//! streaming primitives consumed by both the engine adapters and the
//! session runtime.

pub mod cancel;
pub mod config;
pub mod error;
pub mod frame;
pub mod history;
pub mod persona;
pub mod stream;

pub use cancel::CancelToken;
pub use error::{Error, Result};
