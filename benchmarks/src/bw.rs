//! Bandwidth benchmark code
use serde::Deserialize;
use std::time::Instant;
use typed_mpi::{Config, Rank};
use datatypes::DataType;

#[derive(Debug, Clone, Deserialize)]
pub struct BandwidthOptions {
    pub min_size: usize,
    pub max_size: usize,
    pub window_size: usize,
    pub iterations: usize,
    pub skip: usize,
    pub warmup_validation: usize,
    pub datatype: DataType,
    #[serde(default)]
    pub environment: Config,
}

/// Generic bandwidth benchmark function. Returns a vec of pairs of the form
/// (size, MB/s) on rank 0.
///
/// Based on the OSU microbenchmarks version for MPI.
pub fn bw<T, P, B>(
    opts: &BandwidthOptions,
    rank: Rank,
    prepare: P,
    mut body: B,
) -> typed_mpi::Result<Vec<(usize, f32)>>
where
    P: Fn(usize) -> T,
    B: FnMut(Rank, usize, &T) -> typed_mpi::Result<()>,
{
    let mut results = vec![];
    let mut size = opts.min_size.max(1);

    while size <= opts.max_size {
        let mut total_time = 0.0;
        let s_buf = prepare(size);
        for i in 0..(opts.iterations + opts.skip) {
            if rank == 0 {
                for k in 0..=opts.warmup_validation {
                    let start = Instant::now();
                    body(rank, opts.window_size, &s_buf)?;
                    if i >= opts.skip && k == opts.warmup_validation {
                        total_time += start.elapsed().as_secs_f32();
                    }
                }
            } else {
                for _ in 0..=opts.warmup_validation {
                    body(rank, opts.window_size, &s_buf)?;
                }
            }
        }
        if rank == 0 {
            let bandwidth =
                (size as f32 / 1.0e6 * opts.iterations as f32 * opts.window_size as f32)
                    / total_time;
            results.push((size, bandwidth));
        }
        size = match size.checked_mul(2) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(results)
}
