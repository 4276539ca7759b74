use std::path::{Path, PathBuf};
use std::thread;
use clap::{
    Parser,
    ValueEnum,
};
use serde::de::DeserializeOwned;
use typed_mpi::{CodecKind, Communicator, Config, InitArgs, Lifecycle};
use typed_mpi::transport::LocalTransport;
use datatypes::DataType;

mod latency;
pub use latency::{
    latency,
    LatencyOptions,
};
mod bw;
pub use bw::{
    bw,
    BandwidthOptions,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML benchmark configuration
    pub config: PathBuf,
    /// Data type to send, overriding the configuration
    #[arg(short, long)]
    pub datatype: Option<DataType>,
    /// Codec for the portable path, overriding the configuration
    #[arg(short, long, value_enum)]
    pub codec: Option<Kind>,
    /// Declare the deployment heterogeneous (portable path only)
    #[arg(long)]
    pub heterogeneous: bool,
}

impl Args {
    /// Apply the command line overrides to an environment configuration.
    pub fn environment(&self, mut config: Config) -> Config {
        if let Some(kind) = self.codec {
            config = config.with_codec(kind.into());
        }
        if self.heterogeneous {
            config = config.heterogeneous();
        }
        config
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Kind {
    MessagePack,
    Postcard,
    Bincode,
}

impl From<Kind> for CodecKind {
    fn from(kind: Kind) -> CodecKind {
        match kind {
            Kind::MessagePack => CodecKind::MessagePack,
            Kind::Postcard => CodecKind::Postcard,
            Kind::Bincode => CodecKind::Bincode,
        }
    }
}

/// Load a YAML configuration file.
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, String> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    serde_yaml::from_str(&text)
        .map_err(|err| format!("failed to parse {}: {}", path.display(), err))
}

/// Run `body` on both ranks of an in-process two rank world, each on its own
/// thread. Returns rank 0's result.
pub fn run_pair<F, R>(config: &Config, body: F) -> typed_mpi::Result<R>
where
    F: Fn(&Communicator<LocalTransport>) -> typed_mpi::Result<R> + Sync,
    R: Send,
{
    let body = &body;
    let mut results = thread::scope(|s| {
        let handles: Vec<_> = LocalTransport::world(2)
            .into_iter()
            .map(|transport| {
                let config = config.clone();
                s.spawn(move || -> typed_mpi::Result<R> {
                    let lifecycle = Lifecycle::with_config(transport, config);
                    let session = lifecycle.session(InitArgs::from_env())?;
                    let result = body(&session.world())?;
                    session.finalize()?;
                    Ok(result)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect::<Vec<typed_mpi::Result<R>>>()
    });
    results.swap_remove(0)
}
