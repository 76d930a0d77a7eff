//! PCI error types.

use core::fmt;

use crate::address::Address;

/// Errors reported by PCI discovery, enumeration, and register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciError {
    /// Device number above 31 or function number above 7.
    InvalidAddress,
    /// A domain was described with `start_bus > end_bus`.
    InvalidBusRange {
        /// First bus of the rejected range.
        start_bus: u8,
        /// Last bus of the rejected range.
        end_bus: u8,
    },
    /// The address names a domain that was never discovered.
    UnknownDomain(u32),
    /// The address's bus is not reachable through its domain.
    BusNotCovered(Address),
    /// The register offset lies beyond the mechanism's configuration space.
    OffsetOutOfRange {
        /// Requested offset.
        offset: u16,
        /// Size of the configuration space reachable by the mechanism.
        limit: u16,
    },
    /// The access is not naturally aligned for its width.
    Misaligned {
        /// Requested offset.
        offset: u16,
        /// Access width in bytes.
        width: u8,
    },
    /// No BAR with this index exists for the function's header type.
    InvalidBar(u8),
    /// An ECAM window could not be mapped.
    MappingFailed {
        /// Physical base of the window.
        base: u64,
    },
    /// Discovery produced no usable domain.
    NoDomains,
    /// Enumeration found no responding function in any domain.
    NoDevices,
    /// The global registry has already been published.
    AlreadyInitialized,
}

impl fmt::Display for PciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress => f.write_str("device or function number out of range"),
            Self::InvalidBusRange { start_bus, end_bus } => {
                write!(f, "invalid bus range {start_bus:#04x}..={end_bus:#04x}")
            }
            Self::UnknownDomain(domain) => write!(f, "unknown PCI domain {domain}"),
            Self::BusNotCovered(addr) => write!(f, "{addr} is outside its domain's bus range"),
            Self::OffsetOutOfRange { offset, limit } => {
                write!(f, "config offset {offset:#x} beyond {limit:#x}-byte space")
            }
            Self::Misaligned { offset, width } => {
                write!(f, "config offset {offset:#x} misaligned for {width}-byte access")
            }
            Self::InvalidBar(index) => write!(f, "BAR{index} does not exist"),
            Self::MappingFailed { base } => write!(f, "failed to map ECAM window at {base:#x}"),
            Self::NoDomains => f.write_str("no PCI domain discovered"),
            Self::NoDevices => f.write_str("no PCI device found"),
            Self::AlreadyInitialized => f.write_str("PCI registry already initialized"),
        }
    }
}

impl core::error::Error for PciError {}
