//! PCI addressing value types: [`Address`], [`Id`], and [`Domain`].

use core::fmt;

use crate::error::PciError;

/// Number of device slots on a single PCI bus.
pub const DEVICES_PER_BUS: u8 = 32;
/// Number of functions a single device may implement.
pub const FUNCTIONS_PER_DEVICE: u8 = 8;

/// Location of a single PCI function: domain, bus, device, function.
///
/// Equality compares all four fields. No ordering is provided: there is no
/// meaningful total order across domains, and callers that need a stable
/// order use the registry's enumeration order instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address {
    domain: u32,
    bus: u8,
    device: u8,
    function: u8,
}

impl Address {
    /// Creates an address, truncating `device` to 5 bits and `function` to
    /// 3 bits.
    #[must_use]
    pub const fn new(domain: u32, bus: u8, device: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            device: device & 0x1F,
            function: function & 0x07,
        }
    }

    /// Creates an address, rejecting out-of-range device or function numbers.
    ///
    /// # Errors
    ///
    /// Returns [`PciError::InvalidAddress`] if `device > 31` or
    /// `function > 7`.
    pub const fn try_new(domain: u32, bus: u8, device: u8, function: u8) -> Result<Self, PciError> {
        if device >= DEVICES_PER_BUS || function >= FUNCTIONS_PER_DEVICE {
            return Err(PciError::InvalidAddress);
        }
        Ok(Self::new(domain, bus, device, function))
    }

    /// Domain (host bridge) number.
    #[must_use]
    pub const fn domain(&self) -> u32 {
        self.domain
    }

    /// Bus number (0-255).
    #[must_use]
    pub const fn bus(&self) -> u8 {
        self.bus
    }

    /// Device number (0-31).
    #[must_use]
    pub const fn device(&self) -> u8 {
        self.device
    }

    /// Function number (0-7).
    #[must_use]
    pub const fn function(&self) -> u8 {
        self.function
    }

    /// Returns the same slot with a different function number.
    #[must_use]
    pub const fn with_function(&self, function: u8) -> Self {
        Self::new(self.domain, self.bus, self.device, function)
    }

    /// Returns `true` if bus, device, and function are all zero.
    ///
    /// The domain is deliberately not consulted: the base address of every
    /// domain is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.bus == 0 && self.device == 0 && self.function == 0
    }

    /// Builds the CONFIG_ADDRESS value for the legacy port mechanism.
    ///
    /// The low two bits of `field` are dropped; registers are addressed on
    /// dword boundaries and narrower accesses are extracted by the caller.
    #[must_use]
    pub const fn io_address_for_field(&self, field: u8) -> u32 {
        0x8000_0000
            | ((self.bus as u32) << 16)
            | ((self.device as u32) << 11)
            | ((self.function as u32) << 8)
            | ((field as u32) & 0xFC)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PCI [{:04x}:{:02x}:{:02x}:{:02x}]",
            self.domain, self.bus, self.device, self.function
        )
    }
}

/// Vendor/device identification pair read from offsets 0x00 and 0x02.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Id {
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device ID.
    pub device_id: u16,
}

impl Id {
    /// Creates an ID pair.
    #[must_use]
    pub const fn new(vendor_id: u16, device_id: u16) -> Self {
        Self {
            vendor_id,
            device_id,
        }
    }

    /// Returns `true` if both halves are zero.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.vendor_id == 0 && self.device_id == 0
    }

    /// Splits the dword at offset 0x00 into vendor (low) and device (high).
    #[must_use]
    pub const fn from_dword(dword: u32) -> Self {
        Self {
            vendor_id: dword as u16,
            device_id: (dword >> 16) as u16,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PCI::ID [{:04x}:{:04x}]", self.vendor_id, self.device_id)
    }
}

/// One host bridge's coverage: a contiguous bus range and, for ECAM-based
/// domains, the physical base of its configuration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    base_address: u64,
    start_bus: u8,
    end_bus: u8,
}

impl Domain {
    /// Creates a domain description.
    ///
    /// # Errors
    ///
    /// Returns [`PciError::InvalidBusRange`] if `start_bus > end_bus`.
    pub const fn new(base_address: u64, start_bus: u8, end_bus: u8) -> Result<Self, PciError> {
        if start_bus > end_bus {
            return Err(PciError::InvalidBusRange { start_bus, end_bus });
        }
        Ok(Self {
            base_address,
            start_bus,
            end_bus,
        })
    }

    /// The domain reached through the legacy port mechanism: every bus
    /// number, no memory window.
    #[must_use]
    pub const fn legacy() -> Self {
        Self {
            base_address: 0,
            start_bus: 0,
            end_bus: u8::MAX,
        }
    }

    /// Physical base of the ECAM window. Meaningless for legacy domains.
    #[must_use]
    pub const fn base_address(&self) -> u64 {
        self.base_address
    }

    /// First bus decoded by this host bridge.
    #[must_use]
    pub const fn start_bus(&self) -> u8 {
        self.start_bus
    }

    /// Last bus decoded by this host bridge (inclusive).
    #[must_use]
    pub const fn end_bus(&self) -> u8 {
        self.end_bus
    }

    /// Returns `true` if `bus` lies within `[start_bus, end_bus]`.
    #[must_use]
    pub const fn contains(&self, bus: u8) -> bool {
        bus >= self.start_bus && bus <= self.end_bus
    }

    /// Number of buses covered.
    #[must_use]
    pub const fn bus_count(&self) -> usize {
        (self.end_bus - self.start_bus) as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_ignores_domain() {
        assert!(Address::new(0, 0, 0, 0).is_null());
        assert!(Address::new(7, 0, 0, 0).is_null());
        assert!(!Address::new(0, 1, 0, 0).is_null());
        assert!(!Address::new(0, 0, 1, 0).is_null());
        assert!(!Address::new(0, 0, 0, 1).is_null());
    }

    #[test]
    fn io_address_masks_low_bits() {
        let addr = Address::new(0, 3, 5, 2);
        assert_eq!(addr.io_address_for_field(0x10), addr.io_address_for_field(0x13));
        assert_eq!(
            addr.io_address_for_field(0x13),
            0x8000_0000 | (3 << 16) | (5 << 11) | (2 << 8) | 0x10
        );
        assert_ne!(addr.io_address_for_field(0x10), addr.io_address_for_field(0x14));
    }

    #[test]
    fn equality_covers_every_field() {
        let a = Address::new(0, 1, 2, 3);
        let b = Address::new(0, 1, 2, 3);
        let c = Address::new(0, 1, 2, 3);
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_eq!(b, c);
        assert_eq!(a, c);

        assert_ne!(a, Address::new(1, 1, 2, 3));
        assert_ne!(a, Address::new(0, 9, 2, 3));
        assert_ne!(a, Address::new(0, 1, 9, 3));
        assert_ne!(a, Address::new(0, 1, 2, 4));
    }

    #[test]
    fn try_new_validates_slot() {
        assert!(Address::try_new(0, 0, 31, 7).is_ok());
        assert_eq!(Address::try_new(0, 0, 32, 0), Err(PciError::InvalidAddress));
        assert_eq!(Address::try_new(0, 0, 0, 8), Err(PciError::InvalidAddress));
    }

    #[test]
    fn display_format() {
        let addr = Address::new(1, 0x2a, 0x1f, 7);
        assert_eq!(format!("{addr}"), "PCI [0001:2a:1f:07]");
        assert_eq!(format!("{}", Id::new(0x8086, 0x100e)), "PCI::ID [8086:100e]");
    }

    #[test]
    fn id_null_and_split() {
        assert!(Id::default().is_null());
        assert!(!Id::new(0, 1).is_null());
        assert_eq!(Id::from_dword(0x100E_8086), Id::new(0x8086, 0x100E));
    }

    #[test]
    fn domain_bus_range() {
        let domain = Domain::new(0xE000_0000, 0, 3).unwrap();
        assert!(domain.contains(0));
        assert!(domain.contains(3));
        assert!(!domain.contains(4));
        assert_eq!(domain.bus_count(), 4);
        assert_eq!(
            Domain::new(0, 5, 4),
            Err(PciError::InvalidBusRange {
                start_bus: 5,
                end_bus: 4
            })
        );
        assert_eq!(Domain::legacy().bus_count(), 256);
    }
}
