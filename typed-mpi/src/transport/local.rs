//! In-process transport.
//!
//! Each [`LocalTransport`] endpoint plays one process of a fixed-size world.
//! Endpoints share a fabric of mailboxes and are meant to be moved onto
//! separate threads. Messages between a pair of ranks on the same
//! communicator and tag are delivered in send order.
use std::alloc::{self, Layout};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use log::{debug, trace};
use crate::{Rank, Tag, TransportIdentity, Vendor};
use crate::transport::{
    BroadcastBuffer,
    BufferKind,
    CommId,
    RegionId,
    RequestId,
    Transport,
    TransportError,
    TransportResult,
};

const ALIGN: usize = 16;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Channel {
    PointToPoint(CommId),
    Collective(CommId),
}

struct Envelope {
    channel: Channel,
    source: Rank,
    tag: Tag,
    data: Vec<u8>,
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    arrived: Condvar,
}

impl Mailbox {
    fn push(&self, envelope: Envelope) {
        lock(&self.queue).push_back(envelope);
        self.arrived.notify_all();
    }

    /// Block until an envelope matches, then return its size.
    fn peek_len<P>(&self, timeout: Duration, pred: P) -> TransportResult<usize>
    where
        P: Fn(&Envelope) -> bool,
    {
        let queue = self.wait_match(timeout, &pred)?;
        queue
            .iter()
            .find(|envelope| pred(envelope))
            .map(|envelope| envelope.data.len())
            .ok_or(TransportError::Timeout)
    }

    /// Block until an envelope matches, then remove and return it.
    fn take<P>(&self, timeout: Duration, pred: P) -> TransportResult<Envelope>
    where
        P: Fn(&Envelope) -> bool,
    {
        let mut queue = self.wait_match(timeout, &pred)?;
        let i = queue
            .iter()
            .position(|envelope| pred(envelope))
            .ok_or(TransportError::Timeout)?;
        queue.remove(i).ok_or(TransportError::Timeout)
    }

    fn wait_match<P>(&self, timeout: Duration, pred: &P) -> TransportResult<MutexGuard<'_, VecDeque<Envelope>>>
    where
        P: Fn(&Envelope) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut queue = lock(&self.queue);
        loop {
            if queue.iter().any(|envelope| pred(envelope)) {
                return Ok(queue);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout);
            }
            let (guard, _) = self
                .arrived
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }
    }
}

struct Fabric {
    mailboxes: Vec<Mailbox>,
    timeout: Duration,
}

/// Operations that can be made to fail once, for testing error paths.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Initialize,
    Send,
    Receive,
    Broadcast,
    Allocate,
}

/// Counters kept by a local endpoint.
#[derive(Debug, Default)]
pub struct LocalStats {
    initializations: AtomicUsize,
    finalizations: AtomicUsize,
    sends: AtomicUsize,
    allocations: AtomicUsize,
    frees: AtomicUsize,
    broadcasts: Mutex<Vec<BufferKind>>,
}

impl LocalStats {
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn finalizations(&self) -> usize {
        self.finalizations.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Successful `allocate` calls.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Successful `free` calls.
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    /// Buffer argument kind of every broadcast call, in call order.
    pub fn broadcast_kinds(&self) -> Vec<BufferKind> {
        lock(&self.broadcasts).clone()
    }
}

/// Builder for a world of local endpoints.
#[derive(Debug, Clone)]
pub struct LocalBuilder {
    size: usize,
    identity: TransportIdentity,
    timeout: Duration,
}

impl LocalBuilder {
    /// Version and vendor reported by every endpoint.
    pub fn identity(mut self, identity: TransportIdentity) -> LocalBuilder {
        self.identity = identity;
        self
    }

    /// How long a blocking operation waits for a matching message.
    pub fn timeout(mut self, timeout: Duration) -> LocalBuilder {
        self.timeout = timeout;
        self
    }

    /// Create one endpoint per rank, in rank order.
    pub fn build(self) -> Vec<LocalTransport> {
        let fabric = Arc::new(Fabric {
            mailboxes: (0..self.size).map(|_| Mailbox::default()).collect(),
            timeout: self.timeout,
        });
        (0..self.size)
            .map(|rank| LocalTransport {
                rank: rank as Rank,
                fabric: Arc::clone(&fabric),
                identity: self.identity.clone(),
                stats: LocalStats::default(),
                faults: Mutex::new(HashSet::new()),
                regions: Mutex::new(HashMap::new()),
                requests: Mutex::new(HashSet::new()),
                next_id: AtomicU64::new(1),
                initialized: AtomicBool::new(false),
            })
            .collect()
    }
}

/// One simulated process.
pub struct LocalTransport {
    rank: Rank,
    fabric: Arc<Fabric>,
    identity: TransportIdentity,
    stats: LocalStats,
    faults: Mutex<HashSet<FaultPoint>>,
    /// Registered regions as (address, length)
    regions: Mutex<HashMap<RegionId, (usize, usize)>>,
    /// Completed, not yet waited on, requests
    requests: Mutex<HashSet<RequestId>>,
    next_id: AtomicU64,
    initialized: AtomicBool,
}

impl LocalTransport {
    /// Builder for `size` endpoints reporting a modern, defect-free
    /// transport.
    pub fn builder(size: usize) -> LocalBuilder {
        LocalBuilder {
            size,
            identity: TransportIdentity::new(Some((3, 1)), Vendor::Unknown),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create `size` default endpoints.
    pub fn world(size: usize) -> Vec<LocalTransport> {
        LocalTransport::builder(size).build()
    }

    pub fn stats(&self) -> &LocalStats {
        &self.stats
    }

    /// Make the next call at `point` fail.
    pub fn fail_next(&self, point: FaultPoint) {
        lock(&self.faults).insert(point);
    }

    fn tripped(&self, point: FaultPoint) -> bool {
        let tripped = lock(&self.faults).remove(&point);
        if tripped {
            debug!("Rank {}: injected failure at {:?}", self.rank, point);
        }
        tripped
    }

    fn world_size(&self) -> Rank {
        self.fabric.mailboxes.len() as Rank
    }

    fn mailbox(&self, rank: Rank) -> Option<&Mailbox> {
        usize::try_from(rank).ok().and_then(|i| self.fabric.mailboxes.get(i))
    }

    fn own_mailbox(&self) -> &Mailbox {
        // rank is always in range by construction
        &self.fabric.mailboxes[self.rank as usize]
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn broadcast_bytes(&self, comm: CommId, data: &mut [u8], root: Rank) -> TransportResult<()> {
        if self.rank == root {
            for dest in (0..self.world_size()).filter(|&dest| dest != root) {
                if let Some(mailbox) = self.mailbox(dest) {
                    mailbox.push(Envelope {
                        channel: Channel::Collective(comm),
                        source: root,
                        tag: 0,
                        data: data.to_vec(),
                    });
                }
            }
            return Ok(());
        }
        let envelope = self
            .own_mailbox()
            .take(self.fabric.timeout, |envelope| {
                envelope.channel == Channel::Collective(comm) && envelope.source == root
            })
            .map_err(|err| TransportError::Broadcast { root, reason: err.to_string() })?;
        if envelope.data.len() != data.len() {
            return Err(TransportError::Broadcast {
                root,
                reason: format!(
                    "root sent {} bytes into a {} byte buffer",
                    envelope.data.len(),
                    data.len(),
                ),
            });
        }
        data.copy_from_slice(&envelope.data);
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn identity(&self) -> TransportIdentity {
        self.identity.clone()
    }

    fn initialize(&self, args: Option<&[String]>) -> TransportResult<()> {
        if self.tripped(FaultPoint::Initialize) {
            return Err(TransportError::Init("injected failure".to_string()));
        }
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyInitialized);
        }
        debug!("Rank {}: initialized with args {:?}", self.rank, args);
        self.stats.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finalize(&self) -> TransportResult<()> {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Finalize("not initialized".to_string()));
        }
        self.stats.finalizations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rank(&self, _comm: CommId) -> Rank {
        self.rank
    }

    fn size(&self, _comm: CommId) -> i32 {
        self.world_size()
    }

    fn send(&self, comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<()> {
        if self.tripped(FaultPoint::Send) {
            return Err(TransportError::Send { dest, reason: "injected failure".to_string() });
        }
        let mailbox = self.mailbox(dest).ok_or_else(|| TransportError::Send {
            dest,
            reason: "no such rank".to_string(),
        })?;
        trace!("Rank {}: send {} bytes to {} (tag {})", self.rank, buf.len(), dest, tag);
        mailbox.push(Envelope {
            channel: Channel::PointToPoint(comm),
            source: self.rank,
            tag,
            data: buf.to_vec(),
        });
        self.stats.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    unsafe fn isend(&self, comm: CommId, buf: &[u8], dest: Rank, tag: Tag) -> TransportResult<RequestId> {
        // Sends are buffered, so the request is complete as soon as the data
        // is copied into the destination mailbox
        self.send(comm, buf, dest, tag)?;
        let request = RequestId(self.next_id());
        lock(&self.requests).insert(request);
        Ok(request)
    }

    fn wait(&self, request: RequestId) -> TransportResult<()> {
        if lock(&self.requests).remove(&request) {
            Ok(())
        } else {
            Err(TransportError::UnknownRequest(request))
        }
    }

    fn test(&self, request: RequestId) -> TransportResult<bool> {
        self.wait(request).map(|_| true)
    }

    fn probe(&self, comm: CommId, source: Rank, tag: Tag) -> TransportResult<usize> {
        if self.mailbox(source).is_none() {
            return Err(TransportError::Receive { from: source, reason: "no such rank".to_string() });
        }
        self.own_mailbox().peek_len(self.fabric.timeout, |envelope| {
            envelope.channel == Channel::PointToPoint(comm)
                && envelope.source == source
                && envelope.tag == tag
        })
    }

    fn receive(&self, comm: CommId, buf: &mut [u8], source: Rank, tag: Tag) -> TransportResult<usize> {
        if self.tripped(FaultPoint::Receive) {
            return Err(TransportError::Receive { from: source, reason: "injected failure".to_string() });
        }
        if self.mailbox(source).is_none() {
            return Err(TransportError::Receive { from: source, reason: "no such rank".to_string() });
        }
        let envelope = self.own_mailbox().take(self.fabric.timeout, |envelope| {
            envelope.channel == Channel::PointToPoint(comm)
                && envelope.source == source
                && envelope.tag == tag
        })?;
        let len = envelope.data.len();
        if len > buf.len() {
            return Err(TransportError::BufferTooSmall { needed: len, available: buf.len() });
        }
        buf[..len].copy_from_slice(&envelope.data);
        trace!("Rank {}: received {} bytes from {} (tag {})", self.rank, len, source, tag);
        Ok(len)
    }

    fn broadcast(&self, comm: CommId, buf: BroadcastBuffer<'_>, root: Rank) -> TransportResult<()> {
        lock(&self.stats.broadcasts).push(buf.kind());
        if self.tripped(FaultPoint::Broadcast) {
            return Err(TransportError::Broadcast { root, reason: "injected failure".to_string() });
        }
        if self.mailbox(root).is_none() {
            return Err(TransportError::Broadcast { root, reason: "no such rank".to_string() });
        }
        match buf {
            BroadcastBuffer::Explicit(data) => self.broadcast_bytes(comm, data, root),
            BroadcastBuffer::Bottom(region) => {
                let (addr, len) = *lock(&self.regions)
                    .get(&region)
                    .ok_or(TransportError::UnknownRegion(region))?;
                // SAFETY: register_region requires the region to stay valid
                // and exclusively owned until it is released.
                let data = unsafe { std::slice::from_raw_parts_mut(addr as *mut u8, len) };
                self.broadcast_bytes(comm, data, root)
            }
        }
    }

    unsafe fn register_region(&self, ptr: *mut u8, len: usize) -> TransportResult<RegionId> {
        let region = RegionId(self.next_id());
        lock(&self.regions).insert(region, (ptr as usize, len));
        Ok(region)
    }

    fn release_region(&self, region: RegionId) -> TransportResult<()> {
        lock(&self.regions)
            .remove(&region)
            .map(|_| ())
            .ok_or(TransportError::UnknownRegion(region))
    }

    fn allocate(&self, size: usize) -> TransportResult<NonNull<u8>> {
        if self.tripped(FaultPoint::Allocate) {
            return Err(TransportError::Allocation { size });
        }
        let layout = Layout::from_size_align(size.max(1), ALIGN)
            .map_err(|_| TransportError::Allocation { size })?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(TransportError::Allocation { size })?;
        self.stats.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) -> TransportResult<()> {
        let layout = Layout::from_size_align(size.max(1), ALIGN)
            .map_err(|err| TransportError::Free(err.to_string()))?;
        alloc::dealloc(ptr.as_ptr(), layout);
        self.stats.frees.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
