use serde::{Serialize, de::DeserializeOwned};
use crate::{Result, Error};
use crate::codecs::Codec;

/// MessagePack through `rmp-serde`.
#[derive(Debug, Copy, Clone, Default)]
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn encode<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        rmp_serde::to_vec(data)
            .map_err(|err| Error::Serialize(err.to_string()))
    }

    fn decode<T>(&self, buf: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        rmp_serde::decode::from_slice(buf)
            .map_err(|err| Error::Deserialize(err.to_string()))
    }
}
