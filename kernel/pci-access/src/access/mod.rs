//! Configuration-space access dispatch.
//!
//! Every domain is bound to one [`Mechanism`] when it is discovered. The
//! Address-keyed API on [`ConfigAccess`] validates the request against the
//! owning domain and forwards it to that mechanism; no access is ever issued
//! for a bus the domain cannot reach.

pub mod ecam;
pub mod legacy;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::address::{Address, Domain};
use crate::error::PciError;
use crate::regs;

pub use ecam::EcamWindow;
pub use legacy::{LegacyPorts, PortIo};

/// The register access strategy of one domain.
pub enum Mechanism {
    /// Legacy CAM ports, shared by every legacy domain.
    Legacy(Arc<LegacyPorts>),
    /// Memory-mapped ECAM window owned by this domain.
    Memory(EcamWindow),
}

impl Mechanism {
    /// Size of the per-function configuration space this mechanism reaches.
    #[must_use]
    pub const fn config_space_size(&self) -> u16 {
        match self {
            Self::Legacy(_) => regs::LEGACY_CONFIG_SPACE_SIZE,
            Self::Memory(_) => regs::EXTENDED_CONFIG_SPACE_SIZE,
        }
    }

    /// Short name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Legacy(_) => "legacy",
            Self::Memory(_) => "ecam",
        }
    }
}

impl core::fmt::Debug for Mechanism {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of bus numbers, one bit per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusSet([u64; 4]);

impl BusSet {
    /// The empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; 4])
    }

    /// Every bus in `[start, end]`.
    #[must_use]
    pub fn range(start: u8, end: u8) -> Self {
        let mut set = Self::new();
        for bus in start..=end {
            set.insert(bus);
        }
        set
    }

    /// Adds `bus`. Returns `true` if it was not already present.
    pub fn insert(&mut self, bus: u8) -> bool {
        let (word, bit) = (usize::from(bus >> 6), bus & 63);
        let fresh = self.0[word] & (1 << bit) == 0;
        self.0[word] |= 1 << bit;
        fresh
    }

    /// Returns `true` if `bus` is present.
    #[must_use]
    pub const fn contains(&self, bus: u8) -> bool {
        self.0[(bus >> 6) as usize] & (1 << (bus & 63)) != 0
    }

    /// Returns `true` if no bus is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }

    /// Removes and returns the lowest bus in the set.
    pub fn pop_first(&mut self) -> Option<u8> {
        for (index, word) in self.0.iter_mut().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros();
                *word &= !(1 << bit);
                // index < 4 and bit < 64, so the result fits in a u8.
                return Some((index as u8) * 64 + bit as u8);
            }
        }
        None
    }

    /// Number of buses in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.iter().map(|word| word.count_ones() as usize).sum()
    }
}

/// One discovered domain and the mechanism that reaches it.
#[derive(Debug)]
pub struct DomainAccess {
    domain: Domain,
    segment_group: u16,
    mechanism: Mechanism,
    reachable: BusSet,
}

impl DomainAccess {
    /// The domain description.
    #[must_use]
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }

    /// ACPI segment group the domain was discovered from (0 for legacy).
    #[must_use]
    pub const fn segment_group(&self) -> u16 {
        self.segment_group
    }

    /// The access mechanism bound to this domain.
    #[must_use]
    pub const fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    /// Returns `true` if `bus` can be addressed through this domain.
    ///
    /// This is the domain's bus range plus, for legacy domains, any bus a
    /// bridge inside the domain forwarded to during enumeration.
    #[must_use]
    pub const fn reaches(&self, bus: u8) -> bool {
        self.reachable.contains(bus)
    }

    /// Extends the reachable set with a bridge's secondary bus.
    ///
    /// ECAM windows physically end at `end_bus`, so only legacy domains can
    /// grow. Returns `false` if the bus stays unreachable.
    pub(crate) fn extend_reach(&mut self, bus: u8) -> bool {
        match self.mechanism {
            Mechanism::Legacy(_) => {
                self.reachable.insert(bus);
                true
            }
            Mechanism::Memory(_) => self.domain.contains(bus),
        }
    }
}

/// Address-keyed register access over every discovered domain.
///
/// Domain numbers are assigned in discovery order, starting at 0; an
/// [`Address`]'s domain field indexes this list.
#[derive(Debug, Default)]
pub struct ConfigAccess {
    domains: Vec<DomainAccess>,
}

impl ConfigAccess {
    /// Creates an access layer with no domains.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            domains: Vec::new(),
        }
    }

    /// Registers a domain and returns its domain number.
    pub fn add_domain(&mut self, domain: Domain, segment_group: u16, mechanism: Mechanism) -> u32 {
        // Domain numbers are bounded by the number of MCFG entries.
        let number = self.domains.len() as u32;
        self.domains.push(DomainAccess {
            domain,
            segment_group,
            mechanism,
            reachable: BusSet::range(domain.start_bus(), domain.end_bus()),
        });
        number
    }

    /// Number of registered domains.
    #[must_use]
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Returns the domain with the given number.
    #[must_use]
    pub fn domain(&self, number: u32) -> Option<&DomainAccess> {
        self.domains.get(number as usize)
    }

    pub(crate) fn domain_mut(&mut self, number: u32) -> Option<&mut DomainAccess> {
        self.domains.get_mut(number as usize)
    }

    /// Iterates domains in discovery order.
    pub fn domains(&self) -> impl Iterator<Item = &DomainAccess> {
        self.domains.iter()
    }

    /// Validates a request and returns the mechanism that serves it.
    fn route(&self, addr: Address, offset: u16, width: u8) -> Result<&Mechanism, PciError> {
        let domain = self
            .domain(addr.domain())
            .ok_or(PciError::UnknownDomain(addr.domain()))?;
        if !domain.reaches(addr.bus()) {
            return Err(PciError::BusNotCovered(addr));
        }
        if offset % u16::from(width) != 0 {
            return Err(PciError::Misaligned { offset, width });
        }
        let limit = domain.mechanism.config_space_size();
        if u32::from(offset) + u32::from(width) > u32::from(limit) {
            return Err(PciError::OffsetOutOfRange { offset, limit });
        }
        Ok(&domain.mechanism)
    }

    /// Reads an 8-bit register.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not reachable or the offset is
    /// outside the mechanism's configuration space.
    pub fn read8(&self, addr: Address, offset: u16) -> Result<u8, PciError> {
        Ok(match self.route(addr, offset, 1)? {
            Mechanism::Legacy(ports) => ports.read_u8(addr, legacy_offset(offset)),
            Mechanism::Memory(window) => window.read_u8(addr, offset),
        })
    }

    /// Reads a 16-bit register.
    ///
    /// # Errors
    ///
    /// As [`read8`](Self::read8), plus [`PciError::Misaligned`] for odd offsets.
    pub fn read16(&self, addr: Address, offset: u16) -> Result<u16, PciError> {
        Ok(match self.route(addr, offset, 2)? {
            Mechanism::Legacy(ports) => ports.read_u16(addr, legacy_offset(offset)),
            Mechanism::Memory(window) => window.read_u16(addr, offset),
        })
    }

    /// Reads a 32-bit register.
    ///
    /// # Errors
    ///
    /// As [`read8`](Self::read8), plus [`PciError::Misaligned`] for offsets
    /// that are not a multiple of 4.
    pub fn read32(&self, addr: Address, offset: u16) -> Result<u32, PciError> {
        Ok(match self.route(addr, offset, 4)? {
            Mechanism::Legacy(ports) => ports.read_u32(addr, legacy_offset(offset)),
            Mechanism::Memory(window) => window.read_u32(addr, offset),
        })
    }

    /// Writes an 8-bit register.
    ///
    /// # Errors
    ///
    /// As [`read8`](Self::read8).
    pub fn write8(&self, addr: Address, offset: u16, value: u8) -> Result<(), PciError> {
        match self.route(addr, offset, 1)? {
            Mechanism::Legacy(ports) => ports.write_u8(addr, legacy_offset(offset), value),
            Mechanism::Memory(window) => window.write_u8(addr, offset, value),
        }
        Ok(())
    }

    /// Writes a 16-bit register.
    ///
    /// # Errors
    ///
    /// As [`read16`](Self::read16).
    pub fn write16(&self, addr: Address, offset: u16, value: u16) -> Result<(), PciError> {
        match self.route(addr, offset, 2)? {
            Mechanism::Legacy(ports) => ports.write_u16(addr, legacy_offset(offset), value),
            Mechanism::Memory(window) => window.write_u16(addr, offset, value),
        }
        Ok(())
    }

    /// Writes a 32-bit register.
    ///
    /// # Errors
    ///
    /// As [`read32`](Self::read32).
    pub fn write32(&self, addr: Address, offset: u16, value: u32) -> Result<(), PciError> {
        match self.route(addr, offset, 4)? {
            Mechanism::Legacy(ports) => ports.write_u32(addr, legacy_offset(offset), value),
            Mechanism::Memory(window) => window.write_u32(addr, offset, value),
        }
        Ok(())
    }
}

/// Narrows an offset already checked against the 256-byte legacy space.
#[inline]
fn legacy_offset(offset: u16) -> u8 {
    (offset & 0xFF) as u8
}
