//! PCI bus discovery and configuration-space access.
//!
//! This crate owns the PCI layer of the kernel:
//!
//! - **Addressing** -- [`Address`], [`Id`], and [`Domain`] value types.
//! - **Access** -- [`ConfigAccess`] dispatches every register access to the
//!   mechanism owning the target domain: legacy CAM ports (`0xCF8`/`0xCFC`)
//!   or memory-mapped ECAM windows.
//! - **Enumeration** -- a worklist-driven bus/device/function walk that
//!   follows PCI-to-PCI bridges and parses each function's capability list.
//! - **Registry** -- the immutable set of [`PhysicalId`] records published
//!   once at boot and queried by drivers afterwards.
//!
//! The boot sequence calls [`init`] once; drivers then use [`registry`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod access;
pub mod address;
pub mod bar;
pub mod capability;
pub mod class;
pub mod config;
pub mod discovery;
pub mod enumerate;
pub mod error;
pub mod function;
pub mod regs;
pub mod registry;

#[cfg(test)]
pub(crate) mod fake;

pub use access::{ConfigAccess, DomainAccess, Mechanism};
pub use address::{Address, Domain, Id};
pub use bar::Bar;
pub use capability::{Capability, CapabilityFault, CapabilityId, CapabilityList};
pub use class::ClassCode;
pub use config::{AccessMode, PciConfig, ScanStrategy};
pub use discovery::{ConfigSpaceMapper, Firmware, McfgRegion, discover};
pub use error::PciError;
pub use function::Function;
pub use registry::{PciRegistry, PhysicalId, init, registry};
