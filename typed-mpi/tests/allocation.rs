use typed_mpi::{Config, TransportIdentity, Vendor};
use typed_mpi::transport::{FaultPoint, LocalTransport};

mod common;

#[test]
fn failed_receive_releases_its_buffer() {
    let transports = LocalTransport::world(2);
    transports[1].fail_next(FaultPoint::Receive);
    let results = common::run(transports, Config::default(), |lifecycle| {
        let world = lifecycle.world();
        if world.rank().unwrap() == 0 {
            world.send(&vec![3_u8; 100], 1, 0).unwrap();
        } else {
            let err = world.recv::<Vec<u8>>(0, 0).unwrap_err();
            assert!(err.is_transport());
        }
        let stats = lifecycle.transport().stats();
        (stats.allocations(), stats.frees())
    });
    for (allocations, frees) in results {
        assert_eq!(allocations, 1);
        assert_eq!(allocations, frees);
    }
}

#[test]
fn failed_send_releases_its_buffer() {
    let transports = LocalTransport::world(1);
    transports[0].fail_next(FaultPoint::Send);
    let results = common::run(transports, Config::default(), |lifecycle| {
        let world = lifecycle.world();
        assert!(world.send(&[1_u32; 32], 0, 0).is_err());
        world.send(&[2_u32; 32], 0, 0).unwrap();
        let received: [u32; 32] = world.recv(0, 0).unwrap();
        let stats = lifecycle.transport().stats();
        (received[0], stats.allocations(), stats.frees())
    });
    assert_eq!(results, vec![(2, 3, 3)]);
}

#[test]
fn failed_allocation_is_reported() {
    let transports = LocalTransport::world(1);
    transports[0].fail_next(FaultPoint::Allocate);
    let results = common::run(transports, Config::default(), |lifecycle| {
        let world = lifecycle.world();
        let err = world.alloc_buffer(16).unwrap_err();
        err.is_transport() && lifecycle.transport().stats().frees() == 0
    });
    assert_eq!(results, vec![true]);
}

#[test]
fn old_transports_stage_on_the_heap() {
    let identity = TransportIdentity::new(Some((1, 2)), Vendor::OpenMpi);
    let transports = LocalTransport::builder(2).identity(identity).build();
    let config = Config::default();
    let lifecycles_ok = std::thread::scope(|s| {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|transport| {
                let config = config.clone();
                s.spawn(move || {
                    // Arg-free init is unsupported, so pass arguments
                    let lifecycle = typed_mpi::Lifecycle::with_config(transport, config);
                    let session = lifecycle
                        .session(typed_mpi::InitArgs::Args(vec!["test".to_string()]))
                        .unwrap();
                    let world = session.world();
                    let buffer = world.alloc_buffer(8).unwrap();
                    assert!(!buffer.is_managed());
                    drop(buffer);
                    if world.rank().unwrap() == 0 {
                        world.send(&7_u16, 1, 0).unwrap();
                    } else {
                        assert_eq!(world.recv::<u16>(0, 0).unwrap(), 7);
                    }
                    session.transport().stats().allocations() == 0
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
    });
    assert_eq!(lifecycles_ok, vec![true, true]);
}
