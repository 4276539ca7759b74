//! Values registered with the transport for sentinel broadcasts.
use log::error;
use flat::FlatBuffer;
use crate::Result;
use crate::transport::{RegionId, Transport};

/// A flat value whose memory is registered with the transport.
///
/// Broadcasting a `Content` can let the transport resolve the memory from
/// its registration instead of an explicit address. The registration is
/// released when the `Content` is dropped.
pub struct Content<'a, M: FlatBuffer, T: Transport> {
    transport: &'a T,
    value: &'a mut M,
    region: RegionId,
}

impl<'a, M: FlatBuffer, T: Transport> Content<'a, M, T> {
    pub(crate) fn register(transport: &'a T, value: &'a mut M) -> Result<Content<'a, M, T>> {
        // SAFETY: the mutable borrow of value is held by the Content until
        // the region is released in drop().
        let region = unsafe { transport.register_region(value.ptr_mut(), value.size()) }?;
        Ok(Content {
            transport,
            value,
            region,
        })
    }

    pub(crate) fn region(&self) -> RegionId {
        self.region
    }

    pub(crate) fn value_mut(&mut self) -> &mut M {
        self.value
    }

    /// The registered value.
    pub fn get(&self) -> &M {
        self.value
    }
}

impl<'a, M: FlatBuffer, T: Transport> Drop for Content<'a, M, T> {
    fn drop(&mut self) {
        if let Err(err) = self.transport.release_region(self.region) {
            error!("Failed to release region {:?}: {}", self.region, err);
        }
    }
}
