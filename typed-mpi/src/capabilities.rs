//! Capability registry for the linked transport.
//!
//! Capabilities are resolved once from the version and vendor reported by the
//! transport and never change afterwards. Version checks live here and
//! nowhere else; call sites only ask the [`Capabilities`] queries.
use std::fmt;
use log::{info, warn};
use serde::{Serialize, Deserialize};

/// Transport implementation vendor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vendor {
    OpenMpi,
    Mpich,
    Lam,
    Bullx,
    MsMpi,
    Unknown,
}

impl Vendor {
    /// Recognize the vendor from a library version banner, as returned by
    /// `MPI_Get_library_version`.
    pub fn from_library_version(banner: &str) -> Vendor {
        let banner = banner.to_ascii_lowercase();
        // bullx MPI is built on Open MPI and mentions both
        if banner.contains("bullx") {
            Vendor::Bullx
        } else if banner.contains("open mpi") {
            Vendor::OpenMpi
        } else if banner.contains("lam/mpi") {
            Vendor::Lam
        } else if banner.contains("microsoft mpi") || banner.contains("ms-mpi") {
            Vendor::MsMpi
        } else if banner.contains("mpich") {
            Vendor::Mpich
        } else {
            Vendor::Unknown
        }
    }
}

/// Version and vendor signals reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportIdentity {
    /// Standard version (major, minor), if the transport reports one.
    pub version: Option<(u32, u32)>,
    /// Implementation vendor.
    pub vendor: Vendor,
}

impl TransportIdentity {
    pub fn new(version: Option<(u32, u32)>, vendor: Vendor) -> TransportIdentity {
        TransportIdentity {
            version,
            vendor,
        }
    }
}

/// Calling convention for callbacks registered with the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// `extern "C"`
    C,
    /// `extern "system"` (MPIAPI on Windows)
    System,
}

/// Optional transport features.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    ManagedAllocation,
    ArgFreeInit,
    BroadcastBottom,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ManagedAllocation => write!(f, "transport-managed memory allocation"),
            Capability::ArgFreeInit => write!(f, "initialization without arguments"),
            Capability::BroadcastBottom => write!(f, "broadcast from the existing location"),
        }
    }
}

/// Vendor exception to the version-derived defaults. `None` leaves the
/// default unchanged.
#[derive(Debug)]
pub struct VendorOverride {
    pub vendor: Vendor,
    pub managed_allocation: Option<bool>,
    pub arg_free_init: Option<bool>,
    pub broadcast_bottom_reliable: Option<bool>,
    pub callback_convention: Option<CallingConvention>,
    pub reason: &'static str,
}

/// Known vendor exceptions. Applied after the version defaults.
pub const VENDOR_OVERRIDES: &[VendorOverride] = &[
    VendorOverride {
        vendor: Vendor::Lam,
        managed_allocation: Some(true),
        arg_free_init: Some(true),
        broadcast_bottom_reliable: Some(false),
        callback_convention: None,
        reason: "LAM/MPI supports MPI-2 allocation and init but broadcasts from MPI_BOTTOM incorrectly",
    },
    VendorOverride {
        vendor: Vendor::Bullx,
        managed_allocation: None,
        arg_free_init: None,
        broadcast_bottom_reliable: Some(false),
        callback_convention: None,
        reason: "bullx MPI broadcasts from MPI_BOTTOM incorrectly",
    },
    VendorOverride {
        vendor: Vendor::Mpich,
        managed_allocation: None,
        arg_free_init: None,
        broadcast_bottom_reliable: None,
        callback_convention: None,
        reason: "MPICH follows its reported version",
    },
    VendorOverride {
        vendor: Vendor::MsMpi,
        managed_allocation: None,
        arg_free_init: None,
        broadcast_bottom_reliable: None,
        callback_convention: Some(CallingConvention::System),
        reason: "MS-MPI callbacks are declared MPIAPI",
    },
];

/// Resolved capability flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    managed_allocation: bool,
    arg_free_init: bool,
    broadcast_bottom_reliable: bool,
    callback_convention: CallingConvention,
}

impl Capabilities {
    /// Resolve the capabilities of a transport from its identity.
    pub fn probe(identity: &TransportIdentity) -> Capabilities {
        let modern = identity.version.map_or(false, |(major, _)| major >= 2);
        let mut caps = Capabilities {
            managed_allocation: modern,
            arg_free_init: modern,
            broadcast_bottom_reliable: true,
            callback_convention: CallingConvention::C,
        };
        for entry in VENDOR_OVERRIDES.iter().filter(|entry| entry.vendor == identity.vendor) {
            let before = caps;
            caps.apply(entry);
            if caps != before {
                warn!("Capability override for {:?}: {}", entry.vendor, entry.reason);
            }
        }
        info!("Resolved capabilities for {:?}: {:?}", identity, caps);
        caps
    }

    fn apply(&mut self, entry: &VendorOverride) {
        if let Some(value) = entry.managed_allocation {
            self.managed_allocation = value;
        }
        if let Some(value) = entry.arg_free_init {
            self.arg_free_init = value;
        }
        if let Some(value) = entry.broadcast_bottom_reliable {
            self.broadcast_bottom_reliable = value;
        }
        if let Some(value) = entry.callback_convention {
            self.callback_convention = value;
        }
    }

    /// Transport provides `allocate`/`free` for communication buffers.
    pub fn supports_managed_allocation(&self) -> bool {
        self.managed_allocation
    }

    /// Transport can be initialized without startup arguments.
    pub fn supports_arg_free_init(&self) -> bool {
        self.arg_free_init
    }

    /// Broadcasting with the existing-location sentinel works.
    pub fn broadcast_bottom_is_reliable(&self) -> bool {
        self.broadcast_bottom_reliable
    }

    /// Calling convention for callbacks handed to the transport.
    pub fn required_callback_convention(&self) -> CallingConvention {
        self.callback_convention
    }

    /// Check that a capability is present.
    pub fn require(&self, capability: Capability) -> crate::Result<()> {
        let present = match capability {
            Capability::ManagedAllocation => self.managed_allocation,
            Capability::ArgFreeInit => self.arg_free_init,
            Capability::BroadcastBottom => self.broadcast_bottom_reliable,
        };
        if present {
            Ok(())
        } else {
            Err(crate::Error::CapabilityMismatch(capability))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modern_version_enables_everything() {
        let caps = Capabilities::probe(&TransportIdentity::new(Some((3, 1)), Vendor::OpenMpi));
        assert!(caps.supports_managed_allocation());
        assert!(caps.supports_arg_free_init());
        assert!(caps.broadcast_bottom_is_reliable());
        assert_eq!(caps.required_callback_convention(), CallingConvention::C);
    }

    #[test]
    fn old_or_missing_version_is_conservative() {
        for version in [None, Some((1, 2))] {
            let caps = Capabilities::probe(&TransportIdentity::new(version, Vendor::Unknown));
            assert!(!caps.supports_managed_allocation());
            assert!(!caps.supports_arg_free_init());
            assert!(caps.broadcast_bottom_is_reliable());
        }
    }

    #[test]
    fn lam_overrides_version_defaults() {
        let caps = Capabilities::probe(&TransportIdentity::new(None, Vendor::Lam));
        assert!(caps.supports_managed_allocation());
        assert!(caps.supports_arg_free_init());
        assert!(!caps.broadcast_bottom_is_reliable());
        assert_eq!(
            caps.require(Capability::BroadcastBottom).unwrap_err().to_string(),
            "transport does not support broadcast from the existing location",
        );
    }

    #[test]
    fn mpich_without_version_is_unchanged() {
        let mpich = Capabilities::probe(&TransportIdentity::new(None, Vendor::Mpich));
        let unknown = Capabilities::probe(&TransportIdentity::new(None, Vendor::Unknown));
        assert_eq!(mpich, unknown);
    }

    #[test]
    fn bullx_keeps_version_but_loses_bottom() {
        let caps = Capabilities::probe(&TransportIdentity::new(Some((2, 1)), Vendor::Bullx));
        assert!(caps.supports_managed_allocation());
        assert!(!caps.broadcast_bottom_is_reliable());
    }

    #[test]
    fn ms_mpi_requires_system_convention() {
        let caps = Capabilities::probe(&TransportIdentity::new(Some((2, 0)), Vendor::MsMpi));
        assert_eq!(caps.required_callback_convention(), CallingConvention::System);
    }

    #[test]
    fn vendor_banners() {
        assert_eq!(Vendor::from_library_version("Open MPI v4.1.5, package: ..."), Vendor::OpenMpi);
        assert_eq!(Vendor::from_library_version("MPICH Version: 4.0\nMPICH Release date"), Vendor::Mpich);
        assert_eq!(Vendor::from_library_version("bullx MPI 1.2.9 (Open MPI based)"), Vendor::Bullx);
        assert_eq!(Vendor::from_library_version("LAM/MPI 7.1.4"), Vendor::Lam);
        assert_eq!(Vendor::from_library_version("Microsoft MPI 10.1"), Vendor::MsMpi);
        assert_eq!(Vendor::from_library_version("something else"), Vendor::Unknown);
    }
}
