//! Direct transfer path.
//!
//! A flat value travels as a frame: a 16 byte header (hashed type id and
//! element count, native endianness) followed by the raw bytes of the value.
//! Frames are staged in [`ScopedBuffer`]s, so they live in transport-managed
//! memory when the transport supports it.
use std::any::type_name;
use log::debug;
use crate::{Capabilities, Error, Rank, Result, Tag};
use crate::alloc::ScopedBuffer;
use crate::message::{Layout, Message};
use crate::transport::{self, BroadcastBuffer, CommId, Transport};

pub(crate) const HEADER_LEN: usize = 16;

/// Write the header and payload of `value` into `frame`.
fn write_frame<M: Message>(frame: &mut [u8], value: &M) -> Result<()> {
    let payload = <M::Layout as Layout<M>>::bytes(value).ok_or(Error::NotFlat)?;
    let count = <M::Layout as Layout<M>>::count(value) as u64;
    frame[..8].copy_from_slice(&<M::Layout as Layout<M>>::type_id().to_ne_bytes());
    frame[8..HEADER_LEN].copy_from_slice(&count.to_ne_bytes());
    frame[HEADER_LEN..].copy_from_slice(payload);
    Ok(())
}

/// Size of the frame holding `value`.
fn frame_len<M: Message>(value: &M) -> Result<usize> {
    let payload = <M::Layout as Layout<M>>::bytes(value).ok_or(Error::NotFlat)?;
    Ok(HEADER_LEN + payload.len())
}

/// Split a frame into (type id, count, payload).
fn read_frame(frame: &[u8]) -> Result<(u64, usize, &[u8])> {
    if frame.len() < HEADER_LEN {
        return Err(Error::Truncated);
    }
    let mut word = [0u8; 8];
    word.copy_from_slice(&frame[..8]);
    let type_id = u64::from_ne_bytes(word);
    word.copy_from_slice(&frame[8..HEADER_LEN]);
    let count = u64::from_ne_bytes(word) as usize;
    Ok((type_id, count, &frame[HEADER_LEN..]))
}

/// Decode a frame into a new value.
pub(crate) fn decode<M: Message>(frame: &[u8]) -> Result<M> {
    let (type_id, count, payload) = read_frame(frame)?;
    if type_id != <M::Layout as Layout<M>>::type_id() {
        return Err(Error::MessageTypeMismatch);
    }
    <M::Layout as Layout<M>>::rebuild(count, payload).ok_or_else(|| {
        Error::Deserialize(format!(
            "{} bytes do not hold {} elements of {}",
            payload.len(),
            count,
            type_name::<M>(),
        ))
    })
}

/// Decode a frame into an existing value with the same element count.
pub(crate) fn decode_into<M: Message>(frame: &[u8], value: &mut M) -> Result<()> {
    let (type_id, count, payload) = read_frame(frame)?;
    if type_id != <M::Layout as Layout<M>>::type_id() {
        return Err(Error::MessageTypeMismatch);
    }
    let expected = <M::Layout as Layout<M>>::count(value);
    if count != expected {
        return Err(Error::MessageCountMismatch { expected, received: count });
    }
    let dest = <M::Layout as Layout<M>>::bytes_mut(value).ok_or(Error::NotFlat)?;
    if dest.len() != payload.len() {
        return Err(Error::Truncated);
    }
    dest.copy_from_slice(payload);
    Ok(())
}

/// Build an owned frame, for requests that outlive the call.
pub(crate) fn frame_vec<M: Message>(value: &M) -> Result<Vec<u8>> {
    let mut frame = vec![0; frame_len(value)?];
    write_frame(&mut frame, value)?;
    Ok(frame)
}

pub(crate) fn send<T, M>(
    transport: &T,
    caps: &Capabilities,
    comm: CommId,
    value: &M,
    dest: Rank,
    tag: Tag,
) -> Result<()>
where
    T: Transport,
    M: Message,
{
    let mut frame = ScopedBuffer::acquire(transport, caps, frame_len(value)?)?;
    write_frame(&mut frame, value)?;
    debug!("Direct send of {} ({} bytes) to rank {}", type_name::<M>(), frame.len(), dest);
    transport.send(comm, &frame, dest, tag)?;
    Ok(())
}

/// Receive into a staging buffer sized by the probed message.
fn receive_frame<'a, T: Transport>(
    transport: &'a T,
    caps: &Capabilities,
    comm: CommId,
    source: Rank,
    tag: Tag,
) -> Result<(ScopedBuffer<'a, T>, usize)> {
    let len = transport.probe(comm, source, tag)?;
    let mut frame = ScopedBuffer::acquire(transport, caps, len)?;
    let received = transport.receive(comm, &mut frame, source, tag)?;
    Ok((frame, received))
}

pub(crate) fn recv<T, M>(
    transport: &T,
    caps: &Capabilities,
    comm: CommId,
    source: Rank,
    tag: Tag,
) -> Result<M>
where
    T: Transport,
    M: Message,
{
    let (frame, received) = receive_frame(transport, caps, comm, source, tag)?;
    debug!("Direct receive of {} ({} bytes) from rank {}", type_name::<M>(), received, source);
    decode(&frame[..received])
}

pub(crate) fn recv_into<T, M>(
    transport: &T,
    caps: &Capabilities,
    comm: CommId,
    value: &mut M,
    source: Rank,
    tag: Tag,
) -> Result<()>
where
    T: Transport,
    M: Message,
{
    let (frame, received) = receive_frame(transport, caps, comm, source, tag)?;
    decode_into(&frame[..received], value)
}

/// Broadcast the frame length, then the frame, both in explicit buffers.
pub(crate) fn broadcast<T, M>(
    transport: &T,
    caps: &Capabilities,
    comm: CommId,
    value: &mut M,
    root: Rank,
) -> Result<()>
where
    T: Transport,
    M: Message,
{
    if transport.rank(comm) == root {
        let mut frame = ScopedBuffer::acquire(transport, caps, frame_len(value)?)?;
        write_frame(&mut frame, value)?;
        transport::broadcast_len(transport, comm, frame.len(), root)?;
        transport.broadcast(comm, BroadcastBuffer::Explicit(&mut frame), root)?;
    } else {
        let len = transport::broadcast_len(transport, comm, 0, root)?;
        let mut frame = ScopedBuffer::acquire(transport, caps, len)?;
        transport.broadcast(comm, BroadcastBuffer::Explicit(&mut frame), root)?;
        *value = decode(&frame)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let frame = frame_vec(&vec![1_i32, 2, 3]).unwrap();
        assert_eq!(frame.len(), HEADER_LEN + 12);
        let (type_id, count, payload) = read_frame(&frame).unwrap();
        assert_eq!(type_id, <i32 as flat::FlatBuffer>::type_id());
        assert_eq!(count, 3);
        assert_eq!(payload.len(), 12);
    }

    #[test]
    fn decode_checks_type() {
        let frame = frame_vec(&vec![1_i32, 2]).unwrap();
        assert!(matches!(decode::<Vec<u32>>(&frame), Err(Error::MessageTypeMismatch)));
        assert_eq!(decode::<Vec<i32>>(&frame).unwrap(), vec![1, 2]);
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert!(matches!(decode::<u8>(&[0; 4]), Err(Error::Truncated)));
    }

    #[test]
    fn decode_into_requires_same_count() {
        let frame = frame_vec(&vec![1.0_f64, 2.0]).unwrap();
        let mut three = vec![0.0_f64; 3];
        assert!(matches!(
            decode_into(&frame, &mut three),
            Err(Error::MessageCountMismatch { expected: 3, received: 2 }),
        ));
        let mut two = vec![0.0_f64; 2];
        decode_into(&frame, &mut two).unwrap();
        assert_eq!(two, vec![1.0, 2.0]);
    }

    #[test]
    fn structured_values_have_no_frame() {
        assert!(matches!(frame_vec(&String::from("x")), Err(Error::NotFlat)));
    }
}
