//! Portable serialization path.
//!
//! Values are encoded with the configured codec, moved as opaque bytes and
//! decoded on the other side, independent of either process's native
//! layout.
use std::any::type_name;
use log::debug;
use serde::{Serialize, de::DeserializeOwned};
use crate::{CodecKind, Rank, Result, Tag};
use crate::codecs::Codec;
use crate::transport::{self, BroadcastBuffer, CommId, Transport};

pub(crate) fn send<T, M>(
    transport: &T,
    codec: CodecKind,
    comm: CommId,
    value: &M,
    dest: Rank,
    tag: Tag,
) -> Result<()>
where
    T: Transport,
    M: Serialize,
{
    let buf = codec.encode(value)?;
    debug!("Portable send of {} ({} bytes) to rank {}", type_name::<M>(), buf.len(), dest);
    transport.send(comm, &buf, dest, tag)?;
    Ok(())
}

pub(crate) fn recv<T, M>(
    transport: &T,
    codec: CodecKind,
    comm: CommId,
    source: Rank,
    tag: Tag,
) -> Result<M>
where
    T: Transport,
    M: DeserializeOwned,
{
    let len = transport.probe(comm, source, tag)?;
    let mut buf = vec![0; len];
    let received = transport.receive(comm, &mut buf, source, tag)?;
    debug!("Portable receive of {} ({} bytes) from rank {}", type_name::<M>(), received, source);
    codec.decode(&buf[..received])
}

/// Broadcast the encoded length, then the encoded bytes.
pub(crate) fn broadcast<T, M>(
    transport: &T,
    codec: CodecKind,
    comm: CommId,
    value: &mut M,
    root: Rank,
) -> Result<()>
where
    T: Transport,
    M: Serialize + DeserializeOwned,
{
    if transport.rank(comm) == root {
        let mut buf = codec.encode(value)?;
        transport::broadcast_len(transport, comm, buf.len(), root)?;
        transport.broadcast(comm, BroadcastBuffer::Explicit(&mut buf), root)?;
    } else {
        let len = transport::broadcast_len(transport, comm, 0, root)?;
        let mut buf = vec![0; len];
        transport.broadcast(comm, BroadcastBuffer::Explicit(&mut buf), root)?;
        *value = codec.decode(&buf)?;
    }
    Ok(())
}
