//! Environment lifecycle: `Uninitialized -> Initialized -> Finalized`.
use std::cell::Cell;
use std::ops::Deref;
use std::rc::Rc;
use log::{error, info};
use crate::{Capabilities, Capability, Communicator, Config, Error, Result};
use crate::transport::{CommId, Transport, TransportError};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initialized,
    Finalized,
}

/// Startup arguments handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitArgs {
    /// No arguments; requires argument-free initialization support.
    None,
    /// Process arguments.
    Args(Vec<String>),
}

impl InitArgs {
    /// Arguments of the current process.
    pub fn from_env() -> InitArgs {
        InitArgs::Args(std::env::args().collect())
    }
}

/// State shared between the lifecycle manager and its communicators.
pub(crate) struct Shared<T: Transport> {
    pub(crate) transport: T,
    pub(crate) capabilities: Capabilities,
    pub(crate) config: Config,
    state: Cell<State>,
}

impl<T: Transport> Shared<T> {
    /// Fail unless the environment is initialized.
    pub(crate) fn check_live(&self) -> Result<()> {
        match self.state.get() {
            State::Initialized => Ok(()),
            State::Uninitialized => Err(Error::NotInitialized),
            State::Finalized => Err(Error::Finalized),
        }
    }
}

/// Owner of the transport and of the process-wide environment state.
///
/// One per process. Capabilities are resolved from the transport when the
/// manager is created and stay fixed afterwards.
pub struct Lifecycle<T: Transport> {
    shared: Rc<Shared<T>>,
}

impl<T: Transport> Lifecycle<T> {
    /// Manage `transport` with the default configuration.
    pub fn new(transport: T) -> Lifecycle<T> {
        Lifecycle::with_config(transport, Config::default())
    }

    pub fn with_config(transport: T, config: Config) -> Lifecycle<T> {
        // Initialize logging
        let _ = env_logger::try_init();
        let capabilities = Capabilities::probe(&transport.identity());
        info!("Environment created (homogeneous: {}, codec: {:?})", config.homogeneous, config.codec);
        Lifecycle {
            shared: Rc::new(Shared {
                transport,
                capabilities,
                config,
                state: Cell::new(State::Uninitialized),
            }),
        }
    }

    /// Initialize the transport.
    ///
    /// Initializing while already initialized is an error, including when
    /// another manager in the same process holds the environment. Initializing
    /// again after `finalize` is allowed by the manager; the transport may
    /// still refuse.
    pub fn initialize(&self, args: InitArgs) -> Result<()> {
        if self.shared.state.get() == State::Initialized {
            return Err(Error::AlreadyInitialized);
        }
        let args = match args {
            InitArgs::None => {
                self.shared.capabilities.require(Capability::ArgFreeInit)?;
                None
            }
            InitArgs::Args(args) => Some(args),
        };
        // Another manager in this process may hold the environment
        self.shared
            .transport
            .initialize(args.as_deref())
            .map_err(|err| match err {
                TransportError::AlreadyInitialized => Error::AlreadyInitialized,
                err => Error::Transport(err),
            })?;
        self.shared.state.set(State::Initialized);
        info!("Environment initialized");
        Ok(())
    }

    /// Finalize the transport. Must be the last transport call.
    pub fn finalize(&self) -> Result<()> {
        self.shared.check_live()?;
        self.shared.transport.finalize()?;
        self.shared.state.set(State::Finalized);
        info!("Environment finalized");
        Ok(())
    }

    /// Initialize and return a guard that finalizes when dropped.
    pub fn session(&self, args: InitArgs) -> Result<Session<'_, T>> {
        self.initialize(args)?;
        Ok(Session {
            lifecycle: self,
            finished: false,
        })
    }

    pub fn state(&self) -> State {
        self.shared.state.get()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.shared.capabilities
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Communicator containing every process.
    ///
    /// Can be created in any state; its operations fail unless the
    /// environment is initialized.
    pub fn world(&self) -> Communicator<T> {
        Communicator::new(Rc::clone(&self.shared), CommId::WORLD)
    }
}

impl<T: Transport> Drop for Lifecycle<T> {
    fn drop(&mut self) {
        if self.shared.state.get() == State::Initialized {
            if let Err(err) = self.finalize() {
                error!("Failed to finalize on drop: {}", err);
            }
        }
    }
}

/// Initialized environment, finalized on every exit path.
pub struct Session<'a, T: Transport> {
    lifecycle: &'a Lifecycle<T>,
    finished: bool,
}

impl<'a, T: Transport> Session<'a, T> {
    /// Finalize now and report the result.
    pub fn finalize(mut self) -> Result<()> {
        self.finished = true;
        self.lifecycle.finalize()
    }
}

impl<'a, T: Transport> Deref for Session<'a, T> {
    type Target = Lifecycle<T>;

    fn deref(&self) -> &Lifecycle<T> {
        self.lifecycle
    }
}

impl<'a, T: Transport> Drop for Session<'a, T> {
    fn drop(&mut self) {
        if !self.finished && self.lifecycle.state() == State::Initialized {
            if let Err(err) = self.lifecycle.finalize() {
                error!("Failed to finalize session: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TransportIdentity, Vendor};
    use crate::transport::{FaultPoint, LocalTransport};

    fn single() -> LocalTransport {
        LocalTransport::world(1).remove(0)
    }

    #[test]
    fn initialize_twice_fails() {
        let lifecycle = Lifecycle::new(single());
        lifecycle.initialize(InitArgs::None).unwrap();
        let err = lifecycle.initialize(InitArgs::None).unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized));
        assert!(err.is_usage());
        assert_eq!(lifecycle.transport().stats().initializations(), 1);
    }

    #[test]
    fn second_manager_in_a_process_is_refused() {
        let process = single();
        let first = Lifecycle::new(&process);
        let second = Lifecycle::new(&process);
        first.initialize(InitArgs::None).unwrap();

        let err = second.initialize(InitArgs::None).unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized));
        assert!(err.is_usage());
        assert!(!err.is_transport());
        assert_eq!(second.state(), State::Uninitialized);

        first.finalize().unwrap();
        second.initialize(InitArgs::None).unwrap();
        second.finalize().unwrap();
        assert_eq!(process.stats().initializations(), 2);
    }

    #[test]
    fn reinitialize_after_finalize() {
        let lifecycle = Lifecycle::new(single());
        lifecycle.initialize(InitArgs::None).unwrap();
        lifecycle.finalize().unwrap();
        assert_eq!(lifecycle.state(), State::Finalized);
        lifecycle.initialize(InitArgs::Args(vec!["prog".to_string()])).unwrap();
        assert_eq!(lifecycle.state(), State::Initialized);
    }

    #[test]
    fn finalize_requires_initialize() {
        let lifecycle = Lifecycle::new(single());
        assert!(matches!(lifecycle.finalize(), Err(Error::NotInitialized)));
        lifecycle.initialize(InitArgs::None).unwrap();
        lifecycle.finalize().unwrap();
        assert!(matches!(lifecycle.finalize(), Err(Error::Finalized)));
    }

    #[test]
    fn arg_free_init_needs_the_capability() {
        let transport = LocalTransport::builder(1)
            .identity(TransportIdentity::new(Some((1, 3)), Vendor::Unknown))
            .build()
            .remove(0);
        let lifecycle = Lifecycle::new(transport);
        let err = lifecycle.initialize(InitArgs::None).unwrap_err();
        assert!(matches!(err, Error::CapabilityMismatch(Capability::ArgFreeInit)));
        assert_eq!(lifecycle.state(), State::Uninitialized);
        lifecycle.initialize(InitArgs::Args(vec!["prog".to_string()])).unwrap();
    }

    #[test]
    fn failed_transport_init_leaves_state_untouched() {
        let lifecycle = Lifecycle::new(single());
        lifecycle.transport().fail_next(FaultPoint::Initialize);
        let err = lifecycle.initialize(InitArgs::None).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(lifecycle.state(), State::Uninitialized);
        lifecycle.initialize(InitArgs::None).unwrap();
    }

    #[test]
    fn session_finalizes_on_drop() {
        let lifecycle = Lifecycle::new(single());
        {
            let session = lifecycle.session(InitArgs::None).unwrap();
            assert_eq!(session.state(), State::Initialized);
        }
        assert_eq!(lifecycle.state(), State::Finalized);
        assert_eq!(lifecycle.transport().stats().finalizations(), 1);
    }

    #[test]
    fn session_finalizes_on_error_paths() {
        fn failing(lifecycle: &Lifecycle<LocalTransport>) -> Result<()> {
            let session = lifecycle.session(InitArgs::None)?;
            session.world().send(&1_u8, 5, 0)?;
            Ok(())
        }
        let lifecycle = Lifecycle::new(single());
        assert!(matches!(failing(&lifecycle), Err(Error::InvalidRank { rank: 5, size: 1 })));
        assert_eq!(lifecycle.state(), State::Finalized);
    }

    #[test]
    fn explicit_session_finalize_runs_once() {
        let lifecycle = Lifecycle::new(single());
        let session = lifecycle.session(InitArgs::None).unwrap();
        session.finalize().unwrap();
        assert_eq!(lifecycle.transport().stats().finalizations(), 1);
    }
}
