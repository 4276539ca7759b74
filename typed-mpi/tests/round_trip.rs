use proptest::prelude::*;
use typed_mpi::{Config, InitArgs, Lifecycle, Path};
use typed_mpi::transport::LocalTransport;

fn self_loop(config: Config) -> Lifecycle<LocalTransport> {
    let lifecycle = Lifecycle::with_config(LocalTransport::world(1).remove(0), config);
    lifecycle.initialize(InitArgs::None).unwrap();
    lifecycle
}

proptest! {
    #[test]
    fn direct_transfer_is_bit_identical(bits in prop::collection::vec(any::<u64>(), 0..64)) {
        let lifecycle = self_loop(Config::default());
        let world = lifecycle.world();
        let values: Vec<f64> = bits.iter().map(|&b| f64::from_bits(b)).collect();
        prop_assert_eq!(world.path_for::<Vec<f64>>(), Path::Direct);
        world.send(&values, 0, 0).unwrap();
        let received: Vec<f64> = world.recv(0, 0).unwrap();
        let received_bits: Vec<u64> = received.iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(received_bits, bits);
    }

    #[test]
    fn portable_transfer_preserves_values(
        words in prop::collection::vec(".{0,12}", 0..8),
        counts in prop::collection::vec(any::<i64>(), 0..8),
    ) {
        let lifecycle = self_loop(Config::default());
        let world = lifecycle.world();
        let value = (words, counts);
        world.send(&value, 0, 3).unwrap();
        let received: (Vec<String>, Vec<i64>) = world.recv(0, 3).unwrap();
        prop_assert_eq!(received, value);
    }

    #[test]
    fn flat_values_survive_the_portable_path(values in prop::collection::vec(any::<i32>(), 0..32)) {
        let lifecycle = self_loop(Config::default().heterogeneous());
        let world = lifecycle.world();
        world.send(&values, 0, 0).unwrap();
        prop_assert_eq!(world.recv::<Vec<i32>>(0, 0).unwrap(), values);
    }
}
