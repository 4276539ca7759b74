use clap::Parser;
use log::error;
use typed_mpi::{Communicator, Message};
use typed_mpi::transport::LocalTransport;
use benchmarks::{Args, BandwidthOptions};
use datatypes::DataType;

/// Tag of the acknowledgement closing each window
const ACK_TAG: i32 = 1;

fn benchmark<T: Message>(
    opts: &BandwidthOptions,
    comm: &Communicator<LocalTransport>,
    prepare: fn(usize) -> T,
) -> typed_mpi::Result<Vec<(usize, f32)>> {
    let rank = comm.rank()?;
    benchmarks::bw(opts, rank, prepare, |rank, window_size, s_buf| {
        if rank == 0 {
            let requests = (0..window_size)
                .map(|_| comm.isend(s_buf, 1, 0))
                .collect::<typed_mpi::Result<Vec<_>>>()?;
            for request in requests {
                request.wait()?;
            }
            let _ack: u8 = comm.recv(1, ACK_TAG)?;
        } else {
            for _ in 0..window_size {
                let _data: T = comm.recv(0, 0)?;
            }
            comm.send(&0_u8, 0, ACK_TAG)?;
        }
        Ok(())
    })
}

fn main() {
    let args = Args::parse();
    let mut opts: BandwidthOptions = benchmarks::load_config(&args.config).unwrap();
    if let Some(datatype) = args.datatype {
        opts.datatype = datatype;
    }
    let config = args.environment(opts.environment.clone());

    let results = benchmarks::run_pair(&config, |comm| match opts.datatype {
        DataType::Simple => benchmark(&opts, comm, datatypes::simple),
        DataType::ComplexNoncompound => benchmark(&opts, comm, datatypes::complex_noncompound),
        DataType::ComplexCompound => benchmark(&opts, comm, datatypes::complex_compound),
    });

    match results {
        Ok(results) => {
            for (size, bandwidth) in results {
                println!("{} {}", size, bandwidth);
            }
        }
        Err(err) => {
            error!("Bandwidth benchmark failed: {}", err);
            std::process::exit(1);
        }
    }
}
