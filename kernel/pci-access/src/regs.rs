//! Standard PCI configuration space layout.

use bitflags::bitflags;

/// Vendor ID (16-bit, offset 0x00).
pub const VENDOR_ID: u16 = 0x00;
/// Device ID (16-bit, offset 0x02).
pub const DEVICE_ID: u16 = 0x02;
/// Command register (16-bit, offset 0x04).
pub const COMMAND: u16 = 0x04;
/// Status register (16-bit, offset 0x06).
pub const STATUS: u16 = 0x06;
/// Revision ID (8-bit, offset 0x08).
pub const REVISION_ID: u16 = 0x08;
/// Programming Interface (8-bit, offset 0x09).
pub const PROG_IF: u16 = 0x09;
/// Subclass code (8-bit, offset 0x0A).
pub const SUBCLASS: u16 = 0x0A;
/// Class code (8-bit, offset 0x0B).
pub const CLASS: u16 = 0x0B;
/// Cache line size (8-bit, offset 0x0C).
pub const CACHE_LINE_SIZE: u16 = 0x0C;
/// Latency timer (8-bit, offset 0x0D).
pub const LATENCY_TIMER: u16 = 0x0D;
/// Header type (8-bit, offset 0x0E). Bit 7 = multi-function.
pub const HEADER_TYPE: u16 = 0x0E;
/// Built-in self test (8-bit, offset 0x0F).
pub const BIST: u16 = 0x0F;
/// Base Address Register 0 (32-bit, offset 0x10). BAR1-5 at +4 intervals.
pub const BAR0: u16 = 0x10;
/// Primary Bus Number (8-bit, offset 0x18) -- PCI-to-PCI bridge only.
pub const PRIMARY_BUS: u16 = 0x18;
/// Secondary Bus Number (8-bit, offset 0x19) -- PCI-to-PCI bridge only.
pub const SECONDARY_BUS: u16 = 0x19;
/// Subordinate Bus Number (8-bit, offset 0x1A) -- PCI-to-PCI bridge only.
pub const SUBORDINATE_BUS: u16 = 0x1A;
/// Subsystem Vendor ID (16-bit, offset 0x2C).
pub const SUBSYSTEM_VENDOR_ID: u16 = 0x2C;
/// Subsystem ID (16-bit, offset 0x2E).
pub const SUBSYSTEM_ID: u16 = 0x2E;
/// Capabilities Pointer (8-bit, offset 0x34) -- pointer to first capability.
pub const CAPABILITIES_PTR: u16 = 0x34;
/// Interrupt Line (8-bit, offset 0x3C).
pub const INTERRUPT_LINE: u16 = 0x3C;
/// Interrupt Pin (8-bit, offset 0x3D).
pub const INTERRUPT_PIN: u16 = 0x3D;

/// Size of the configuration space reachable through the legacy ports.
pub const LEGACY_CONFIG_SPACE_SIZE: u16 = 0x100;
/// Size of the configuration space of one function under ECAM.
pub const EXTENDED_CONFIG_SPACE_SIZE: u16 = 0x1000;
/// First byte after the standard type 0/1 header.
pub const HEADER_SIZE: u16 = 0x40;

/// Vendor ID returned when no function responds at an address.
pub const VENDOR_NONE: u16 = 0xFFFF;

// -- PCI capability IDs ---------------------------------------------------

/// Terminates the capability list.
pub const CAP_ID_NULL: u8 = 0x00;
/// MSI capability ID.
pub const CAP_ID_MSI: u8 = 0x05;
/// Vendor-specific capability ID (used by VirtIO PCI).
pub const CAP_ID_VENDOR: u8 = 0x09;
/// MSI-X capability ID.
pub const CAP_ID_MSIX: u8 = 0x11;

bitflags! {
    /// Command register (offset 0x04).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Command: u16 {
        /// Respond to I/O space accesses.
        const IO_SPACE = 1 << 0;
        /// Respond to memory space accesses.
        const MEMORY_SPACE = 1 << 1;
        /// Allow the function to act as a bus master (DMA).
        const BUS_MASTER = 1 << 2;
        /// Monitor special cycles.
        const SPECIAL_CYCLES = 1 << 3;
        /// Memory write and invalidate enable.
        const MEMORY_WRITE_INVALIDATE = 1 << 4;
        /// VGA palette snoop.
        const VGA_PALETTE_SNOOP = 1 << 5;
        /// Parity error response.
        const PARITY_ERROR_RESPONSE = 1 << 6;
        /// SERR# driver enable.
        const SERR = 1 << 8;
        /// Fast back-to-back enable.
        const FAST_BACK_TO_BACK = 1 << 9;
        /// Disable INTx# assertion.
        const INTERRUPT_DISABLE = 1 << 10;
    }
}

bitflags! {
    /// Status register (offset 0x06).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u16 {
        /// INTx# is asserted.
        const INTERRUPT = 1 << 3;
        /// The capabilities pointer at 0x34 is valid.
        const CAPABILITIES_LIST = 1 << 4;
        /// 66 MHz capable.
        const MHZ_66 = 1 << 5;
        /// Fast back-to-back capable.
        const FAST_BACK_TO_BACK = 1 << 7;
        /// Master data parity error.
        const MASTER_DATA_PARITY_ERROR = 1 << 8;
        /// Signaled target abort.
        const SIGNALED_TARGET_ABORT = 1 << 11;
        /// Received target abort.
        const RECEIVED_TARGET_ABORT = 1 << 12;
        /// Received master abort.
        const RECEIVED_MASTER_ABORT = 1 << 13;
        /// Signaled system error.
        const SIGNALED_SYSTEM_ERROR = 1 << 14;
        /// Detected parity error.
        const DETECTED_PARITY_ERROR = 1 << 15;
    }
}

/// Layout selected by the low seven bits of the header type register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Type 0: general device.
    Normal,
    /// Type 1: PCI-to-PCI bridge.
    Bridge,
    /// Type 2: CardBus bridge.
    CardBus,
    /// Reserved layout.
    Unknown(u8),
}

/// Decoded header type register (offset 0x0E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderType(pub u8);

impl HeaderType {
    /// Bit 7: the device implements more than one function.
    pub const MULTI_FUNCTION: u8 = 0x80;

    /// Returns the header layout.
    #[must_use]
    pub const fn kind(self) -> HeaderKind {
        match self.0 & 0x7F {
            0 => HeaderKind::Normal,
            1 => HeaderKind::Bridge,
            2 => HeaderKind::CardBus,
            other => HeaderKind::Unknown(other),
        }
    }

    /// Returns `true` for a PCI-to-PCI bridge header.
    #[must_use]
    pub const fn is_bridge(self) -> bool {
        matches!(self.kind(), HeaderKind::Bridge)
    }

    /// Returns `true` if the multi-function bit is set.
    #[must_use]
    pub const fn is_multi_function(self) -> bool {
        self.0 & Self::MULTI_FUNCTION != 0
    }

    /// Number of BAR slots defined by this layout.
    #[must_use]
    pub const fn bar_count(self) -> u8 {
        match self.kind() {
            HeaderKind::Normal => 6,
            HeaderKind::Bridge => 2,
            HeaderKind::CardBus | HeaderKind::Unknown(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_type_decoding() {
        assert_eq!(HeaderType(0x00).kind(), HeaderKind::Normal);
        assert_eq!(HeaderType(0x81).kind(), HeaderKind::Bridge);
        assert!(HeaderType(0x81).is_bridge());
        assert!(HeaderType(0x81).is_multi_function());
        assert!(!HeaderType(0x01).is_multi_function());
        assert_eq!(HeaderType(0x02).kind(), HeaderKind::CardBus);
        assert_eq!(HeaderType(0x7F).kind(), HeaderKind::Unknown(0x7F));
    }

    #[test]
    fn bar_counts() {
        assert_eq!(HeaderType(0x00).bar_count(), 6);
        assert_eq!(HeaderType(0x01).bar_count(), 2);
        assert_eq!(HeaderType(0x02).bar_count(), 0);
    }

    #[test]
    fn status_capability_bit() {
        let status = Status::from_bits_retain(0x0010);
        assert!(status.contains(Status::CAPABILITIES_LIST));
        assert!(!Status::from_bits_retain(0x0280).contains(Status::CAPABILITIES_LIST));
    }
}
