use typed_mpi::{Config, TransportIdentity, Vendor};
use typed_mpi::transport::BufferKind;
use datatypes::ComplexCompound;

mod common;

fn lam() -> TransportIdentity {
    TransportIdentity::new(Some((2, 0)), Vendor::Lam)
}

#[test]
fn broadcast_with_defective_sentinel_uses_explicit_buffers() {
    let results = common::run(common::world_with(4, lam()), Config::default(), |lifecycle| {
        assert!(!lifecycle.capabilities().broadcast_bottom_is_reliable());
        let world = lifecycle.world();
        let mut value = if world.rank().unwrap() == 0 { vec![1_i32, 2, 3] } else { vec![] };
        world.broadcast(&mut value, 0).unwrap();
        (value, lifecycle.transport().stats().broadcast_kinds())
    });
    for (value, kinds) in results {
        assert_eq!(value, vec![1, 2, 3]);
        assert!(!kinds.is_empty());
        assert!(kinds.iter().all(|&kind| kind == BufferKind::Explicit));
    }
}

#[test]
fn broadcast_structured_values_from_any_root() {
    let results = common::run(common::world(3), Config::default(), |lifecycle| {
        let world = lifecycle.world();
        let mut value = if world.rank().unwrap() == 2 {
            datatypes::complex_compound(256)
        } else {
            Vec::<ComplexCompound>::new()
        };
        world.broadcast(&mut value, 2).unwrap();
        value
    });
    let expected = datatypes::complex_compound(256);
    assert!(results.iter().all(|value| *value == expected));
}

#[test]
fn content_broadcast_uses_the_sentinel_when_reliable() {
    let results = common::run(common::world(3), Config::default(), |lifecycle| {
        let world = lifecycle.world();
        let mut value = if world.rank().unwrap() == 1 { [5_u64, 6, 7, 8] } else { [0; 4] };
        {
            let mut content = world.content(&mut value).unwrap();
            world.broadcast_content(&mut content, 1).unwrap();
            assert_eq!(content.get()[3], 8);
        }
        (value, lifecycle.transport().stats().broadcast_kinds())
    });
    for (value, kinds) in results {
        assert_eq!(value, [5, 6, 7, 8]);
        assert_eq!(kinds, vec![BufferKind::Bottom]);
    }
}

#[test]
fn content_broadcast_avoids_a_defective_sentinel() {
    for vendor in [Vendor::Lam, Vendor::Bullx] {
        let identity = TransportIdentity::new(Some((3, 1)), vendor);
        let results = common::run(common::world_with(2, identity), Config::default(), |lifecycle| {
            let world = lifecycle.world();
            let mut value = if world.rank().unwrap() == 0 { vec![1.5_f32; 8] } else { vec![0.0; 8] };
            let mut content = world.content(&mut value).unwrap();
            world.broadcast_content(&mut content, 0).unwrap();
            drop(content);
            (value, lifecycle.transport().stats().broadcast_kinds())
        });
        for (value, kinds) in results {
            assert_eq!(value, vec![1.5; 8]);
            assert_eq!(kinds, vec![BufferKind::Explicit], "vendor {:?}", vendor);
        }
    }
}

#[test]
fn heterogeneous_content_broadcast_serializes() {
    let results = common::run(common::world(2), Config::default().heterogeneous(), |lifecycle| {
        let world = lifecycle.world();
        let mut value = if world.rank().unwrap() == 0 { [9_i16; 3] } else { [0; 3] };
        let mut content = world.content(&mut value).unwrap();
        world.broadcast_content(&mut content, 0).unwrap();
        drop(content);
        (value, lifecycle.transport().stats().broadcast_kinds())
    });
    for (value, kinds) in results {
        assert_eq!(value, [9; 3]);
        assert!(kinds.iter().all(|&kind| kind == BufferKind::Explicit));
    }
}
