//! Typed operations on a communicator.
//!
//! Every operation checks the environment state, then takes the path
//! selected for the value's type: the direct path for flat types in a
//! homogeneous deployment, the portable path otherwise.
use std::rc::Rc;
use log::debug;
use flat::FlatBuffer;
use crate::{
    Capabilities,
    Content,
    Error,
    Message,
    Path,
    Rank,
    Result,
    ScopedBuffer,
    SendRequest,
    Tag,
};
use crate::codecs::Codec;
use crate::direct;
use crate::dispatch::path_for;
use crate::lifecycle::Shared;
use crate::portable;
use crate::transport::{BroadcastBuffer, CommId, Transport};

pub struct Communicator<T: Transport> {
    shared: Rc<Shared<T>>,
    comm: CommId,
}

impl<T: Transport> Clone for Communicator<T> {
    fn clone(&self) -> Communicator<T> {
        Communicator {
            shared: Rc::clone(&self.shared),
            comm: self.comm,
        }
    }
}

impl<T: Transport> Communicator<T> {
    pub(crate) fn new(shared: Rc<Shared<T>>, comm: CommId) -> Communicator<T> {
        Communicator { shared, comm }
    }

    #[inline]
    fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Fail if `rank` is not a member of this communicator.
    fn check_rank(&self, rank: Rank) -> Result<()> {
        let size = self.transport().size(self.comm);
        if rank < 0 || rank >= size {
            return Err(Error::InvalidRank { rank, size });
        }
        Ok(())
    }

    /// Rank of this process.
    pub fn rank(&self) -> Result<Rank> {
        self.shared.check_live()?;
        Ok(self.transport().rank(self.comm))
    }

    /// Number of processes.
    pub fn size(&self) -> Result<i32> {
        self.shared.check_live()?;
        Ok(self.transport().size(self.comm))
    }

    /// Whether the deployment is declared homogeneous.
    pub fn homogeneous(&self) -> bool {
        self.shared.config.homogeneous
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.shared.capabilities
    }

    /// Path values of type `M` take on this communicator.
    pub fn path_for<M: Message>(&self) -> Path {
        path_for::<M>(self.homogeneous())
    }

    /// Send a value to `dest`. Blocks until the data has been handed off.
    pub fn send<M: Message>(&self, value: &M, dest: Rank, tag: Tag) -> Result<()> {
        self.shared.check_live()?;
        self.check_rank(dest)?;
        match self.path_for::<M>() {
            Path::Direct => direct::send(self.transport(), &self.shared.capabilities, self.comm, value, dest, tag),
            Path::Portable => portable::send(self.transport(), self.shared.config.codec, self.comm, value, dest, tag),
        }
    }

    /// Receive a value from `source`.
    pub fn recv<M: Message>(&self, source: Rank, tag: Tag) -> Result<M> {
        self.shared.check_live()?;
        self.check_rank(source)?;
        match self.path_for::<M>() {
            Path::Direct => direct::recv(self.transport(), &self.shared.capabilities, self.comm, source, tag),
            Path::Portable => portable::recv(self.transport(), self.shared.config.codec, self.comm, source, tag),
        }
    }

    /// Receive into an existing flat value.
    ///
    /// The incoming element count must match the count already held by
    /// `value`; partial receives are rejected.
    pub fn recv_into<M: Message + FlatBuffer>(&self, value: &mut M, source: Rank, tag: Tag) -> Result<()> {
        self.shared.check_live()?;
        self.check_rank(source)?;
        match self.path_for::<M>() {
            Path::Direct => direct::recv_into(self.transport(), &self.shared.capabilities, self.comm, value, source, tag),
            Path::Portable => {
                let received: M = portable::recv(self.transport(), self.shared.config.codec, self.comm, source, tag)?;
                if received.count() != value.count() {
                    return Err(Error::MessageCountMismatch {
                        expected: value.count(),
                        received: received.count(),
                    });
                }
                *value = received;
                Ok(())
            }
        }
    }

    /// Broadcast `value` from `root`; every other rank's `value` is
    /// replaced.
    pub fn broadcast<M: Message>(&self, value: &mut M, root: Rank) -> Result<()> {
        self.shared.check_live()?;
        self.check_rank(root)?;
        match self.path_for::<M>() {
            Path::Direct => direct::broadcast(self.transport(), &self.shared.capabilities, self.comm, value, root),
            Path::Portable => portable::broadcast(self.transport(), self.shared.config.codec, self.comm, value, root),
        }
    }

    /// Register `value` for content broadcasts.
    pub fn content<'a, M: Message + FlatBuffer>(&'a self, value: &'a mut M) -> Result<Content<'a, M, T>> {
        self.shared.check_live()?;
        Content::register(self.transport(), value)
    }

    /// Broadcast registered content in place.
    ///
    /// The value must have the same size on every rank. The transport's
    /// "use existing location" sentinel is used only when the registry marks
    /// it reliable; otherwise the value's memory is passed explicitly.
    pub fn broadcast_content<M: Message + FlatBuffer>(
        &self,
        content: &mut Content<'_, M, T>,
        root: Rank,
    ) -> Result<()> {
        self.shared.check_live()?;
        self.check_rank(root)?;
        if self.path_for::<M>() == Path::Portable {
            return portable::broadcast(self.transport(), self.shared.config.codec, self.comm, content.value_mut(), root);
        }
        if self.shared.capabilities.broadcast_bottom_is_reliable() {
            debug!("Content broadcast from rank {} through the registered region", root);
            self.transport().broadcast(self.comm, BroadcastBuffer::Bottom(content.region()), root)?;
        } else {
            debug!("Content broadcast from rank {} through an explicit buffer", root);
            let data = content.value_mut().as_bytes_mut();
            self.transport().broadcast(self.comm, BroadcastBuffer::Explicit(data), root)?;
        }
        Ok(())
    }

    /// Start a non-blocking send. The request owns a copy of the outgoing
    /// data.
    pub fn isend<M: Message>(&self, value: &M, dest: Rank, tag: Tag) -> Result<SendRequest<'_, T>> {
        self.shared.check_live()?;
        self.check_rank(dest)?;
        let data = match self.path_for::<M>() {
            Path::Direct => direct::frame_vec(value)?,
            Path::Portable => self.shared.config.codec.encode(value)?,
        };
        // SAFETY: the request keeps data alive until the send completes.
        let request = unsafe { self.transport().isend(self.comm, &data, dest, tag) }?;
        Ok(SendRequest::new(self.transport(), request, data))
    }

    /// Scoped communication buffer of `len` zeroed bytes.
    pub fn alloc_buffer(&self, len: usize) -> Result<ScopedBuffer<'_, T>> {
        self.shared.check_live()?;
        ScopedBuffer::acquire(self.transport(), &self.shared.capabilities, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, InitArgs, Lifecycle};
    use crate::transport::LocalTransport;

    #[test]
    fn operations_require_an_initialized_environment() {
        let lifecycle = Lifecycle::new(LocalTransport::world(1).remove(0));
        let world = lifecycle.world();
        assert!(matches!(world.rank(), Err(Error::NotInitialized)));
        assert!(matches!(world.send(&1_i32, 0, 0), Err(Error::NotInitialized)));
        lifecycle.initialize(InitArgs::None).unwrap();
        assert_eq!(world.rank().unwrap(), 0);
        lifecycle.finalize().unwrap();
        assert!(matches!(world.recv::<i32>(0, 0), Err(Error::Finalized)));
        assert!(matches!(world.alloc_buffer(8), Err(Error::Finalized)));
    }

    #[test]
    fn ranks_are_validated() {
        let lifecycle = Lifecycle::new(LocalTransport::world(2).remove(0));
        lifecycle.initialize(InitArgs::None).unwrap();
        let world = lifecycle.world();
        assert!(matches!(world.send(&1_u8, 2, 0), Err(Error::InvalidRank { rank: 2, size: 2 })));
        assert!(matches!(world.recv::<u8>(-1, 0), Err(Error::InvalidRank { rank: -1, size: 2 })));
        assert!(matches!(world.broadcast(&mut 0_u8, 7), Err(Error::InvalidRank { .. })));
    }

    #[test]
    fn self_send_on_both_paths() {
        for config in [Config::default(), Config::default().heterogeneous()] {
            let lifecycle = Lifecycle::with_config(LocalTransport::world(1).remove(0), config);
            lifecycle.initialize(InitArgs::None).unwrap();
            let world = lifecycle.world();
            world.send(&vec![1.5_f64, -2.0], 0, 3).unwrap();
            assert_eq!(world.recv::<Vec<f64>>(0, 3).unwrap(), vec![1.5, -2.0]);
            world.send(&String::from("hello"), 0, 4).unwrap();
            assert_eq!(world.recv::<String>(0, 4).unwrap(), "hello");
        }
    }

    #[test]
    fn path_follows_configuration() {
        let homogeneous = Lifecycle::new(LocalTransport::world(1).remove(0));
        assert_eq!(homogeneous.world().path_for::<u32>(), Path::Direct);
        assert_eq!(homogeneous.world().path_for::<String>(), Path::Portable);
        let heterogeneous = Lifecycle::with_config(
            LocalTransport::world(1).remove(0),
            Config::default().heterogeneous(),
        );
        assert_eq!(heterogeneous.world().path_for::<u32>(), Path::Portable);
    }

    #[test]
    fn alloc_buffer_is_managed_when_supported() {
        let lifecycle = Lifecycle::new(LocalTransport::world(1).remove(0));
        lifecycle.initialize(InitArgs::None).unwrap();
        let world = lifecycle.world();
        {
            let mut buf = world.alloc_buffer(32).unwrap();
            assert!(buf.is_managed());
            assert!(buf.iter().all(|&b| b == 0));
            buf[0] = 9;
            assert_eq!(buf[0], 9);
        }
        let stats = lifecycle.transport().stats();
        assert_eq!(stats.allocations(), 1);
        assert_eq!(stats.frees(), 1);
    }

    #[test]
    fn isend_to_self() {
        let lifecycle = Lifecycle::new(LocalTransport::world(1).remove(0));
        lifecycle.initialize(InitArgs::None).unwrap();
        let world = lifecycle.world();
        let mut request = world.isend(&[7_u16; 4], 0, 1).unwrap();
        assert!(request.test().unwrap());
        assert!(request.test().unwrap());
        request.wait().unwrap();
        assert_eq!(world.recv::<[u16; 4]>(0, 1).unwrap(), [7; 4]);
    }
}
