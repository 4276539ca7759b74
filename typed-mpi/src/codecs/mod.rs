//! Codecs for the portable serialization path.
//!
//! Every codec produces a byte stream that does not depend on the native
//! layout of the sending process.
use serde::{Serialize, Deserialize, de::DeserializeOwned};
use crate::Result;

mod bincode;
pub use self::bincode::BincodeCodec;
mod messagepack;
pub use messagepack::MessagePackCodec;
mod postcard;
pub use self::postcard::PostcardCodec;

pub trait Codec {
    /// Encode a value into a portable byte stream.
    fn encode<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize;

    /// Decode a value from a byte stream produced by `encode`.
    fn decode<T>(&self, buf: &[u8]) -> Result<T>
    where
        T: DeserializeOwned;
}

/// Codec selection. Both ends of a transfer must use the same codec.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    #[default]
    #[serde(rename = "messagepack")]
    MessagePack,
    Bincode,
    Postcard,
}

impl Codec for CodecKind {
    fn encode<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        match self {
            CodecKind::MessagePack => MessagePackCodec.encode(data),
            CodecKind::Bincode => BincodeCodec.encode(data),
            CodecKind::Postcard => PostcardCodec.encode(data),
        }
    }

    fn decode<T>(&self, buf: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match self {
            CodecKind::MessagePack => MessagePackCodec.decode(buf),
            CodecKind::Bincode => BincodeCodec.decode(buf),
            CodecKind::Postcard => PostcardCodec.decode(buf),
        }
    }
}
