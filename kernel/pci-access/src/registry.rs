//! The published set of discovered functions.
//!
//! [`init`] enumerates once during boot and publishes a `'static`
//! [`PciRegistry`]; drivers reach it through [`registry`] afterwards. The
//! registry is immutable once published, so lookups take no lock. Register
//! accesses go through the [`ConfigAccess`] it owns.

use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use spin::Once;

use crate::access::ConfigAccess;
use crate::address::{Address, Id};
use crate::capability::{Capability, CapabilityId};
use crate::class::ClassCode;
use crate::config::PciConfig;
use crate::enumerate;
use crate::error::PciError;
use crate::function::Function;
use crate::regs::HeaderType;

/// Stable identity of one discovered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalId {
    pub(crate) address: Address,
    pub(crate) id: Id,
    pub(crate) class: ClassCode,
    pub(crate) revision: u8,
    pub(crate) header_type: HeaderType,
    pub(crate) interrupt_line: u8,
    pub(crate) capabilities: Vec<Capability>,
}

impl PhysicalId {
    /// Where the function lives.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Vendor and device ID.
    #[must_use]
    pub const fn id(&self) -> Id {
        self.id
    }

    /// Class code triple.
    #[must_use]
    pub const fn class(&self) -> ClassCode {
        self.class
    }

    /// Revision ID.
    #[must_use]
    pub const fn revision(&self) -> u8 {
        self.revision
    }

    /// Header type register as read during enumeration.
    #[must_use]
    pub const fn header_type(&self) -> HeaderType {
        self.header_type
    }

    /// Interrupt line assigned by firmware.
    #[must_use]
    pub const fn interrupt_line(&self) -> u8 {
        self.interrupt_line
    }

    /// Capabilities in hardware list order.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Returns the first capability of the given kind.
    #[must_use]
    pub fn capability(&self, id: CapabilityId) -> Option<&Capability> {
        self.capabilities.iter().find(|cap| cap.kind() == id)
    }

    /// Returns `true` for a PCI-to-PCI bridge.
    #[must_use]
    pub const fn is_bridge(&self) -> bool {
        self.header_type.is_bridge()
    }
}

impl fmt::Display for PhysicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} class {} ({})",
            self.address,
            self.id,
            self.class,
            self.class.name()
        )
    }
}

/// Every discovered function plus the access layer that reaches them.
#[derive(Debug)]
pub struct PciRegistry {
    access: ConfigAccess,
    devices: Vec<PhysicalId>,
}

impl PciRegistry {
    /// Enumerates every domain of `access` and builds a registry.
    ///
    /// # Errors
    ///
    /// Returns [`PciError::NoDevices`] if no function responded.
    pub fn enumerate(mut access: ConfigAccess, config: &PciConfig) -> Result<Self, PciError> {
        let devices = enumerate::enumerate(&mut access, config);
        if devices.is_empty() {
            warn!("PCI: no devices found on {} domains", access.domain_count());
            return Err(PciError::NoDevices);
        }

        info!(
            "PCI: found {} devices on {} domains",
            devices.len(),
            access.domain_count()
        );
        for device in &devices {
            info!("PCI:   {device}");
        }
        Ok(Self { access, devices })
    }

    /// All functions in enumeration order.
    #[must_use]
    pub fn devices(&self) -> &[PhysicalId] {
        &self.devices
    }

    /// Number of recorded functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Looks up the function at `address`.
    #[must_use]
    pub fn get(&self, address: Address) -> Option<&PhysicalId> {
        self.devices.iter().find(|device| device.address == address)
    }

    /// Iterates functions with the given vendor and device ID.
    pub fn find_by_id(&self, vendor_id: u16, device_id: u16) -> impl Iterator<Item = &PhysicalId> {
        let wanted = Id::new(vendor_id, device_id);
        self.devices.iter().filter(move |device| device.id == wanted)
    }

    /// Iterates functions of a class, optionally narrowed to a subclass.
    pub fn by_class(&self, class: u8, subclass: Option<u8>) -> impl Iterator<Item = &PhysicalId> {
        self.devices.iter().filter(move |device| {
            device.class.class == class && subclass.is_none_or(|sub| device.class.subclass == sub)
        })
    }

    /// The access layer used for register reads and writes.
    #[must_use]
    pub const fn access(&self) -> &ConfigAccess {
        &self.access
    }

    /// A register handle for `address`.
    #[must_use]
    pub const fn function(&self, address: Address) -> Function<'_> {
        Function::new(&self.access, address)
    }

    /// Reads an 8-bit register.
    ///
    /// # Errors
    ///
    /// See [`ConfigAccess::read8`].
    pub fn read8(&self, address: Address, offset: u16) -> Result<u8, PciError> {
        self.access.read8(address, offset)
    }

    /// Reads a 16-bit register.
    ///
    /// # Errors
    ///
    /// See [`ConfigAccess::read16`].
    pub fn read16(&self, address: Address, offset: u16) -> Result<u16, PciError> {
        self.access.read16(address, offset)
    }

    /// Reads a 32-bit register.
    ///
    /// # Errors
    ///
    /// See [`ConfigAccess::read32`].
    pub fn read32(&self, address: Address, offset: u16) -> Result<u32, PciError> {
        self.access.read32(address, offset)
    }

    /// Writes an 8-bit register.
    ///
    /// # Errors
    ///
    /// See [`ConfigAccess::write8`].
    pub fn write8(&self, address: Address, offset: u16, value: u8) -> Result<(), PciError> {
        self.access.write8(address, offset, value)
    }

    /// Writes a 16-bit register.
    ///
    /// # Errors
    ///
    /// See [`ConfigAccess::write16`].
    pub fn write16(&self, address: Address, offset: u16, value: u16) -> Result<(), PciError> {
        self.access.write16(address, offset, value)
    }

    /// Writes a 32-bit register.
    ///
    /// # Errors
    ///
    /// See [`ConfigAccess::write32`].
    pub fn write32(&self, address: Address, offset: u16, value: u32) -> Result<(), PciError> {
        self.access.write32(address, offset, value)
    }
}

static REGISTRY: Once<PciRegistry> = Once::new();
static INIT_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Enumerates `access` and publishes the result as the global registry.
///
/// Only the first successful call publishes. A failed enumeration releases
/// the claim so boot may retry with another configuration.
///
/// # Errors
///
/// Returns [`PciError::AlreadyInitialized`] once a registry has been
/// published or while another call is enumerating, and
/// [`PciError::NoDevices`] if enumeration found nothing.
pub fn init(access: ConfigAccess, config: &PciConfig) -> Result<&'static PciRegistry, PciError> {
    if INIT_CLAIMED.swap(true, Ordering::AcqRel) {
        return Err(PciError::AlreadyInitialized);
    }
    match PciRegistry::enumerate(access, config) {
        Ok(registry) => Ok(REGISTRY.call_once(|| registry)),
        Err(err) => {
            INIT_CLAIMED.store(false, Ordering::Release);
            Err(err)
        }
    }
}

/// Returns the global registry, or `None` before [`init`] has succeeded.
#[must_use]
pub fn registry() -> Option<&'static PciRegistry> {
    REGISTRY.get()
}
