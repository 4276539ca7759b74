//! Narrow operation set consumed from the underlying transport.
//!
//! Implementations move bytes; typing, path selection, framing and lifecycle
//! checks happen above this trait.
use std::ptr::NonNull;
use thiserror::Error;
use crate::{Rank, Tag, TransportIdentity};

mod local;
pub use local::{LocalBuilder, LocalStats, LocalTransport, FaultPoint};
#[cfg(feature = "mpi")]
mod mpi;
#[cfg(feature = "mpi")]
pub use self::mpi::MpiTransport;

/// Communicator handle as known by the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommId(pub u32);

impl CommId {
    /// Communicator containing every process.
    pub const WORLD: CommId = CommId(0);
}

/// Memory region registered for sentinel broadcasts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RegionId(pub u64);

/// Outstanding non-blocking request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Buffer argument of a broadcast.
#[derive(Debug)]
pub enum BroadcastBuffer<'a> {
    /// An explicit buffer address, valid on every rank.
    Explicit(&'a mut [u8]),
    /// The "use existing location" sentinel: the transport resolves the
    /// memory from a previously registered region.
    Bottom(RegionId),
}

impl<'a> BroadcastBuffer<'a> {
    pub fn kind(&self) -> BufferKind {
        match self {
            BroadcastBuffer::Explicit(_) => BufferKind::Explicit,
            BroadcastBuffer::Bottom(_) => BufferKind::Bottom,
        }
    }
}

/// Kind of buffer argument passed to a broadcast.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Explicit,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("initialization failed: {0}")]
    Init(String),

    /// The process already holds an initialized environment.
    #[error("already initialized in this process")]
    AlreadyInitialized,

    #[error("finalization failed: {0}")]
    Finalize(String),

    #[error("send to rank {dest} failed: {reason}")]
    Send { dest: Rank, reason: String },

    #[error("receive from rank {from} failed: {reason}")]
    Receive { from: Rank, reason: String },

    #[error("broadcast from rank {root} failed: {reason}")]
    Broadcast { root: Rank, reason: String },

    #[error("allocation of {size} bytes failed")]
    Allocation { size: usize },

    #[error("free failed: {0}")]
    Free(String),

    #[error("buffer of {available} bytes cannot hold a {needed} byte message")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("unknown request {0:?}")]
    UnknownRequest(RequestId),

    #[error("unknown region {0:?}")]
    UnknownRegion(RegionId),

    #[error("operation timed out")]
    Timeout,
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Underlying message passing implementation.
///
/// All operations block until complete, except `isend`, which returns a
/// request that must be completed with `wait` (or observed complete with
/// `test`) before its buffer is released.
pub trait Transport {
    /// Version and vendor signals used to resolve capabilities.
    fn identity(&self) -> TransportIdentity;

    /// Initialize the transport, with the process arguments if given.
    fn initialize(&self, args: Option<&[String]>) -> TransportResult<()>;

    /// Finalize the transport.
    fn finalize(&self) -> TransportResult<()>;

    /// Rank of this process in the communicator.
    fn rank(&self, comm: CommId) -> Rank;

    /// Number of processes in the communicator.
    fn size(&self, comm: CommId) -> i32;

    /// Blocking send.
    fn send(&self, comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<()>;

    /// Non-blocking send.
    ///
    /// # Safety
    ///
    /// `buf` must stay valid and unmodified until the request completes.
    unsafe fn isend(&self, comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<RequestId>;

    /// Block until the request completes.
    fn wait(&self, request: RequestId) -> TransportResult<()>;

    /// Check whether the request has completed (completing it if so).
    fn test(&self, request: RequestId) -> TransportResult<bool>;

    /// Block until a matching message is available and return its size.
    fn probe(&self, comm: CommId, source: Rank, tag: Tag) -> TransportResult<usize>;

    /// Blocking receive, returns the received length.
    fn receive(&self, comm: CommId, buf: &mut [u8], source: Rank, tag: Tag) -> TransportResult<usize>;

    /// Collective broadcast from `root`.
    fn broadcast(&self, comm: CommId, buf: BroadcastBuffer<'_>, root: Rank) -> TransportResult<()>;

    /// Register a memory region for sentinel broadcasts.
    ///
    /// # Safety
    ///
    /// The region must stay valid and exclusively owned by the caller until
    /// released.
    unsafe fn register_region(&self, ptr: *mut u8, len: usize) -> TransportResult<RegionId>;

    /// Release a registered region.
    fn release_region(&self, region: RegionId) -> TransportResult<()>;

    /// Allocate communication memory.
    fn allocate(&self, size: usize) -> TransportResult<NonNull<u8>>;

    /// Free memory obtained from `allocate`.
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must come from a single successful `allocate` call
    /// on this transport, and must not be freed twice.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) -> TransportResult<()>;
}

impl<'t, T: Transport + ?Sized> Transport for &'t T {
    fn identity(&self) -> TransportIdentity {
        (**self).identity()
    }

    fn initialize(&self, args: Option<&[String]>) -> TransportResult<()> {
        (**self).initialize(args)
    }

    fn finalize(&self) -> TransportResult<()> {
        (**self).finalize()
    }

    fn rank(&self, comm: CommId) -> Rank {
        (**self).rank(comm)
    }

    fn size(&self, comm: CommId) -> i32 {
        (**self).size(comm)
    }

    fn send(&self, comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<()> {
        (**self).send(comm, buf, dest, tag)
    }

    unsafe fn isend(&self, comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<RequestId> {
        (**self).isend(comm, buf, dest, tag)
    }

    fn wait(&self, request: RequestId) -> TransportResult<()> {
        (**self).wait(request)
    }

    fn test(&self, request: RequestId) -> TransportResult<bool> {
        (**self).test(request)
    }

    fn probe(&self, comm: CommId, source: Rank, tag: Tag) -> TransportResult<usize> {
        (**self).probe(comm, source, tag)
    }

    fn receive(&self, comm: CommId, buf: &mut [u8], source: Rank, tag: Tag) -> TransportResult<usize> {
        (**self).receive(comm, buf, source, tag)
    }

    fn broadcast(&self, comm: CommId, buf: BroadcastBuffer<'_>, root: Rank) -> TransportResult<()> {
        (**self).broadcast(comm, buf, root)
    }

    unsafe fn register_region(&self, ptr: *mut u8, len: usize) -> TransportResult<RegionId> {
        (**self).register_region(ptr, len)
    }

    fn release_region(&self, region: RegionId) -> TransportResult<()> {
        (**self).release_region(region)
    }

    fn allocate(&self, size: usize) -> TransportResult<NonNull<u8>> {
        (**self).allocate(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) -> TransportResult<()> {
        (**self).free(ptr, size)
    }
}

/// Broadcast a message length from `root`, as a little-endian u64 in an
/// explicit buffer. Returns the length on every rank.
pub(crate) fn broadcast_len<T: Transport>(transport: &T, comm: CommId, len: usize, root: Rank) -> TransportResult<usize> {
    let mut buf = (len as u64).to_le_bytes();
    transport.broadcast(comm, BroadcastBuffer::Explicit(&mut buf), root)?;
    Ok(u64::from_le_bytes(buf) as usize)
}
