#![allow(dead_code)]

use std::thread;
use typed_mpi::{Config, InitArgs, Lifecycle, TransportIdentity};
use typed_mpi::transport::LocalTransport;

/// Run `f` once per rank, each on its own thread with an initialized
/// environment. Returns the results in rank order.
pub fn run<F, R>(transports: Vec<LocalTransport>, config: Config, f: F) -> Vec<R>
where
    F: Fn(&Lifecycle<LocalTransport>) -> R + Sync,
    R: Send,
{
    let f = &f;
    let config = &config;
    thread::scope(|s| {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|transport| {
                s.spawn(move || {
                    let lifecycle = Lifecycle::with_config(transport, config.clone());
                    let session = lifecycle.session(InitArgs::None).unwrap();
                    f(&session)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    })
}

pub fn world(size: usize) -> Vec<LocalTransport> {
    LocalTransport::world(size)
}

pub fn world_with(size: usize, identity: TransportIdentity) -> Vec<LocalTransport> {
    LocalTransport::builder(size).identity(identity).build()
}
