use clap::Parser;
use log::error;
use typed_mpi::{Communicator, Message};
use typed_mpi::transport::LocalTransport;
use benchmarks::{Args, LatencyOptions};
use datatypes::DataType;

fn benchmark<T: Message>(
    opts: &LatencyOptions,
    comm: &Communicator<LocalTransport>,
    prepare: fn(usize) -> T,
) -> typed_mpi::Result<Vec<(usize, f32)>> {
    let rank = comm.rank()?;
    let next_rank = (rank + 1) % 2;
    benchmarks::latency(
        opts,
        rank,
        prepare,
        |s_buf| {
            comm.send(s_buf, next_rank, 0)?;
            let _data: T = comm.recv(next_rank, 0)?;
            Ok(())
        },
        |s_buf| {
            let _data: T = comm.recv(next_rank, 0)?;
            comm.send(s_buf, next_rank, 0)
        },
    )
}

fn main() {
    let args = Args::parse();
    let mut opts: LatencyOptions = benchmarks::load_config(&args.config).unwrap();
    if let Some(datatype) = args.datatype {
        opts.datatype = datatype;
    }
    let config = args.environment(opts.environment.clone());

    let results = benchmarks::run_pair(&config, |comm| {
        if comm.rank()? == 0 {
            let path = match opts.datatype {
                DataType::Simple => comm.path_for::<Vec<i32>>(),
                DataType::ComplexNoncompound => comm.path_for::<Vec<datatypes::ComplexNoncompound>>(),
                DataType::ComplexCompound => comm.path_for::<Vec<datatypes::ComplexCompound>>(),
            };
            println!("# {} ({:?} path)", opts.datatype, path);
        }
        match opts.datatype {
            DataType::Simple => benchmark(&opts, comm, datatypes::simple),
            DataType::ComplexNoncompound => benchmark(&opts, comm, datatypes::complex_noncompound),
            DataType::ComplexCompound => benchmark(&opts, comm, datatypes::complex_compound),
        }
    });

    match results {
        Ok(results) => {
            for (size, lat) in results {
                println!("{} {}", size, lat);
            }
        }
        Err(err) => {
            error!("Latency benchmark failed: {}", err);
            std::process::exit(1);
        }
    }
}
