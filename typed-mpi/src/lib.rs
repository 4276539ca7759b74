//! Typed message passing over a native transport.
//!
//! Values are moved either as flat memory regions (the direct path) or
//! through a portable codec (the portable path). The choice is made per call
//! from the value's static layout classification and the homogeneity of the
//! deployment, see [`select_path`].
use thiserror::Error;

pub mod capabilities;
pub use capabilities::{
    Capabilities,
    Capability,
    CallingConvention,
    TransportIdentity,
    Vendor,
};
pub mod codecs;
pub use codecs::CodecKind;
mod config;
pub use config::{Config, HOMOGENEOUS_DEFAULT};
mod message;
pub use message::{Classification, FlatLayout, Layout, Message, StructuredLayout};
mod dispatch;
pub use dispatch::{path_for, select_path, Path};
mod alloc;
pub use alloc::ScopedBuffer;
mod direct;
mod portable;
mod content;
pub use content::Content;
mod request;
pub use request::SendRequest;
pub mod communicator;
pub use communicator::Communicator;
mod lifecycle;
pub use lifecycle::{InitArgs, Lifecycle, Session, State};
pub mod transport;
pub use transport::{Transport, TransportError};

pub use flat::{FlatBuffer, FlatElement};

/// Process identity within a communicator.
pub type Rank = i32;

/// Message tag.
pub type Tag = i32;

#[derive(Debug, Error)]
pub enum Error {
    /// The linked transport does not support a requested feature.
    #[error("transport does not support {0}")]
    CapabilityMismatch(Capability),

    /// The environment was initialized twice.
    #[error("environment is already initialized")]
    AlreadyInitialized,

    /// Communication attempted before initialization.
    #[error("environment is not initialized")]
    NotInitialized,

    /// Communication attempted after finalization.
    #[error("environment has been finalized")]
    Finalized,

    /// A rank outside of the communicator.
    #[error("rank {rank} is out of range for a communicator of size {size}")]
    InvalidRank { rank: Rank, size: i32 },

    /// An error was returned by the transport.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Error occurred during serialization.
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// Error occurred during deserialization.
    #[error("deserialization failed: {0}")]
    Deserialize(String),

    /// Invalid type received in a message.
    #[error("received a message of a different type")]
    MessageTypeMismatch,

    /// Invalid count of elements received in a message (no partial receives allowed).
    #[error("expected {expected} elements, received {received}")]
    MessageCountMismatch { expected: usize, received: usize },

    /// A direct transfer frame was shorter than its header claims.
    #[error("truncated message frame")]
    Truncated,

    /// A direct transfer was requested for a structured type.
    #[error("type does not have a flat layout")]
    NotFlat,

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Lifecycle misuse or an unsupported feature request.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::CapabilityMismatch(_)
                | Error::AlreadyInitialized
                | Error::NotInitialized
                | Error::Finalized
                | Error::InvalidRank { .. }
        )
    }

    /// Failure reported by the underlying transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Failure while encoding, decoding or validating a message.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            Error::Serialize(_)
                | Error::Deserialize(_)
                | Error::MessageTypeMismatch
                | Error::MessageCountMismatch { .. }
                | Error::Truncated
                | Error::NotFlat
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
