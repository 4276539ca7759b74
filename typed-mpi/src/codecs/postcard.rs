use serde::{Serialize, de::DeserializeOwned};
use crate::{Result, Error};
use crate::codecs::Codec;

/// Postcard (varint encoded).
#[derive(Debug, Copy, Clone, Default)]
pub struct PostcardCodec;

impl Codec for PostcardCodec {
    fn encode<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        postcard::to_allocvec(data)
            .map_err(|err| Error::Serialize(err.to_string()))
    }

    fn decode<T>(&self, buf: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        postcard::from_bytes(buf)
            .map_err(|err| Error::Deserialize(err.to_string()))
    }
}
