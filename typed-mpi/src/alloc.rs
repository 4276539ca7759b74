//! Scoped communication buffers.
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use log::{error, trace};
use crate::{Capabilities, Result};
use crate::transport::Transport;

enum Storage<'a, T: Transport> {
    /// Memory obtained from the transport's allocator
    Managed {
        transport: &'a T,
        ptr: NonNull<u8>,
        len: usize,
    },
    Heap(Vec<u8>),
}

/// Zero-initialized buffer released when dropped.
///
/// The memory comes from the transport's allocator when it supports managed
/// allocation and from the heap otherwise. Managed memory is handed back to
/// the transport's `free` on every exit path.
pub struct ScopedBuffer<'a, T: Transport> {
    storage: Storage<'a, T>,
}

impl<'a, T: Transport> ScopedBuffer<'a, T> {
    pub(crate) fn acquire(transport: &'a T, caps: &Capabilities, len: usize) -> Result<ScopedBuffer<'a, T>> {
        let storage = if caps.supports_managed_allocation() {
            let ptr = transport.allocate(len)?;
            // SAFETY: allocate() returned at least len writable bytes.
            unsafe { ptr.as_ptr().write_bytes(0, len) };
            trace!("Allocated {} bytes from the transport", len);
            Storage::Managed {
                transport,
                ptr,
                len,
            }
        } else {
            Storage::Heap(vec![0; len])
        };
        Ok(ScopedBuffer { storage })
    }

    /// Whether the memory is owned by the transport.
    pub fn is_managed(&self) -> bool {
        matches!(self.storage, Storage::Managed { .. })
    }
}

impl<'a, T: Transport> fmt::Debug for ScopedBuffer<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedBuffer")
            .field("len", &self.len())
            .field("managed", &self.is_managed())
            .finish()
    }
}

impl<'a, T: Transport> Deref for ScopedBuffer<'a, T> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.storage {
            // SAFETY: allocate() returned at least len bytes, zeroed in
            // acquire().
            Storage::Managed { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
            Storage::Heap(buf) => buf.as_slice(),
        }
    }
}

impl<'a, T: Transport> DerefMut for ScopedBuffer<'a, T> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Managed { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
            Storage::Heap(buf) => buf.as_mut_slice(),
        }
    }
}

impl<'a, T: Transport> Drop for ScopedBuffer<'a, T> {
    fn drop(&mut self) {
        if let Storage::Managed { transport, ptr, len } = self.storage {
            // SAFETY: ptr and len come from a single allocate() call.
            if let Err(err) = unsafe { transport.free(ptr, len) } {
                error!("Failed to free {} bytes of transport memory: {}", len, err);
            }
        }
    }
}
