use serde::{Serialize, de::DeserializeOwned};
use crate::{Result, Error};
use crate::codecs::Codec;

/// Bincode with its default fixed-width little-endian encoding.
#[derive(Debug, Copy, Clone, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        bincode::serialize(data)
            .map_err(|err| Error::Serialize(err.to_string()))
    }

    fn decode<T>(&self, buf: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        bincode::deserialize(buf)
            .map_err(|err| Error::Deserialize(err.to_string()))
    }
}
