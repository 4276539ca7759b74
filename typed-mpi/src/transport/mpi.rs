//! Transport over a native MPI library, through the `mpi` crate.
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::os::raw::c_void;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use log::{debug, info, warn};
use ::mpi::environment::{self, Universe};
use ::mpi::ffi;
use ::mpi::traits::{Communicator, Destination, Equivalence, Root, Source};
use crate::{Rank, Tag, TransportIdentity, Vendor};
use crate::transport::{
    BroadcastBuffer,
    CommId,
    RegionId,
    RequestId,
    Transport,
    TransportError,
    TransportResult,
};

/// Set while an `MpiTransport` in this process holds the MPI environment.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Transport backed by the process's MPI library.
///
/// Only the world communicator is available.
///
/// Process arguments are never forwarded: the `mpi` crate initializes the
/// library without `argc`/`argv`, so `InitArgs::Args` is accepted and then
/// dropped. Settings that would be passed as MPI command line options must
/// come from the launcher or the environment instead.
///
/// At most one transport per process can be initialized at a time; a second
/// `initialize` fails with `TransportError::AlreadyInitialized`. The MPI
/// library itself cannot be initialized again once finalized.
pub struct MpiTransport {
    universe: RefCell<Option<Universe>>,
    rank: Cell<Rank>,
    size: Cell<i32>,
    regions: RefCell<HashMap<RegionId, (usize, usize)>>,
    requests: RefCell<HashSet<RequestId>>,
    next_id: Cell<u64>,
}

impl MpiTransport {
    pub fn new() -> MpiTransport {
        MpiTransport {
            universe: RefCell::new(None),
            rank: Cell::new(0),
            size: Cell::new(0),
            regions: RefCell::new(HashMap::new()),
            requests: RefCell::new(HashSet::new()),
            next_id: Cell::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn with_world<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&::mpi::topology::SimpleCommunicator) -> R,
    {
        self.universe.borrow().as_ref().map(|universe| f(&universe.world()))
    }
}

impl Default for MpiTransport {
    fn default() -> MpiTransport {
        MpiTransport::new()
    }
}

fn not_initialized() -> String {
    "MPI is not initialized".to_string()
}

impl Transport for MpiTransport {
    fn identity(&self) -> TransportIdentity {
        let (major, minor) = environment::version();
        let vendor = environment::library_version()
            .map(|banner| Vendor::from_library_version(&banner))
            .unwrap_or(Vendor::Unknown);
        let version = u32::try_from(major).ok().zip(u32::try_from(minor).ok());
        TransportIdentity::new(version, vendor)
    }

    fn initialize(&self, args: Option<&[String]>) -> TransportResult<()> {
        if ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyInitialized);
        }
        if args.is_some() {
            debug!("Process arguments are not forwarded to MPI");
        }
        let universe = match ::mpi::initialize() {
            Some(universe) => universe,
            None => {
                ACTIVE.store(false, Ordering::SeqCst);
                return Err(TransportError::Init("MPI was already initialized or finalized outside this transport".to_string()));
            }
        };
        let world = universe.world();
        self.rank.set(world.rank());
        self.size.set(world.size());
        info!("MPI initialized: rank {} of {}", world.rank(), world.size());
        *self.universe.borrow_mut() = Some(universe);
        Ok(())
    }

    fn finalize(&self) -> TransportResult<()> {
        // Dropping the universe finalizes the library
        self.universe
            .borrow_mut()
            .take()
            .map(drop)
            .ok_or_else(|| TransportError::Finalize(not_initialized()))?;
        ACTIVE.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn rank(&self, _comm: CommId) -> Rank {
        self.rank.get()
    }

    fn size(&self, _comm: CommId) -> i32 {
        self.size.get()
    }

    fn send(&self, _comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<()> {
        self.with_world(|world| world.process_at_rank(dest).send_with_tag(buf, tag))
            .ok_or_else(|| TransportError::Send { dest, reason: not_initialized() })
    }

    unsafe fn isend(&self, comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<RequestId> {
        // Completes before returning; the request only tracks the id
        self.send(comm, buf, dest, tag)?;
        let request = RequestId(self.next_id());
        self.requests.borrow_mut().insert(request);
        Ok(request)
    }

    fn wait(&self, request: RequestId) -> TransportResult<()> {
        if self.requests.borrow_mut().remove(&request) {
            Ok(())
        } else {
            Err(TransportError::UnknownRequest(request))
        }
    }

    fn test(&self, request: RequestId) -> TransportResult<bool> {
        self.wait(request).map(|_| true)
    }

    fn probe(&self, _comm: CommId, source: Rank, tag: Tag) -> TransportResult<usize> {
        let count = self
            .with_world(|world| {
                let status = world.process_at_rank(source).probe_with_tag(tag);
                status.count(u8::equivalent_datatype())
            })
            .ok_or_else(|| TransportError::Receive { from: source, reason: not_initialized() })?;
        usize::try_from(count)
            .map_err(|_| TransportError::Receive { from: source, reason: format!("invalid count {}", count) })
    }

    fn receive(&self, _comm: CommId, buf: &mut [u8], source: Rank, tag: Tag) -> TransportResult<usize> {
        let count = self
            .with_world(|world| {
                let status = world.process_at_rank(source).receive_into_with_tag(buf, tag);
                status.count(u8::equivalent_datatype())
            })
            .ok_or_else(|| TransportError::Receive { from: source, reason: not_initialized() })?;
        usize::try_from(count)
            .map_err(|_| TransportError::Receive { from: source, reason: format!("invalid count {}", count) })
    }

    fn broadcast(&self, _comm: CommId, buf: BroadcastBuffer<'_>, root: Rank) -> TransportResult<()> {
        let data = match buf {
            BroadcastBuffer::Explicit(data) => data,
            BroadcastBuffer::Bottom(region) => {
                let (addr, len) = *self
                    .regions
                    .borrow()
                    .get(&region)
                    .ok_or(TransportError::UnknownRegion(region))?;
                // SAFETY: register_region requires the region to stay valid
                // and exclusively owned until it is released.
                unsafe { std::slice::from_raw_parts_mut(addr as *mut u8, len) }
            }
        };
        self.with_world(|world| world.process_at_rank(root).broadcast_into(data))
            .ok_or_else(|| TransportError::Broadcast { root, reason: not_initialized() })
    }

    unsafe fn register_region(&self, ptr: *mut u8, len: usize) -> TransportResult<RegionId> {
        let region = RegionId(self.next_id());
        self.regions.borrow_mut().insert(region, (ptr as usize, len));
        Ok(region)
    }

    fn release_region(&self, region: RegionId) -> TransportResult<()> {
        self.regions
            .borrow_mut()
            .remove(&region)
            .map(|_| ())
            .ok_or(TransportError::UnknownRegion(region))
    }

    fn allocate(&self, size: usize) -> TransportResult<NonNull<u8>> {
        let mut base: *mut u8 = ptr::null_mut();
        let len = ffi::MPI_Aint::try_from(size).map_err(|_| TransportError::Allocation { size })?;
        // SAFETY: base receives the address of the new allocation.
        let rc = unsafe {
            ffi::MPI_Alloc_mem(len, ffi::RSMPI_INFO_NULL, &mut base as *mut *mut u8 as *mut c_void)
        };
        if rc != 0 {
            warn!("MPI_Alloc_mem failed with code {}", rc);
            return Err(TransportError::Allocation { size });
        }
        NonNull::new(base).ok_or(TransportError::Allocation { size })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, _size: usize) -> TransportResult<()> {
        let rc = ffi::MPI_Free_mem(ptr.as_ptr() as *mut c_void);
        if rc != 0 {
            return Err(TransportError::Free(format!("MPI_Free_mem failed with code {}", rc)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, InitArgs, Lifecycle};

    // MPI can only be initialized once per process, so everything that needs
    // a live environment runs in this one test.
    #[test]
    fn one_environment_per_process() {
        let first = Lifecycle::new(MpiTransport::new());
        let second = Lifecycle::new(MpiTransport::new());
        first.initialize(InitArgs::Args(vec!["test".to_string()])).unwrap();

        let err = second.initialize(InitArgs::Args(vec!["test".to_string()])).unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized));
        assert!(err.is_usage());

        let world = first.world();
        assert!(world.size().unwrap() >= 1);
        first.finalize().unwrap();
    }
}
