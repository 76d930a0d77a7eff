//! PCI class codes.

use core::fmt;

/// Mass storage controller class.
pub const CLASS_MASS_STORAGE: u8 = 0x01;
/// Network controller class.
pub const CLASS_NETWORK: u8 = 0x02;
/// Display controller class.
pub const CLASS_DISPLAY: u8 = 0x03;
/// Bridge device class.
pub const CLASS_BRIDGE: u8 = 0x06;
/// Serial bus controller class.
pub const CLASS_SERIAL_BUS: u8 = 0x0C;

/// IDE controller subclass of mass storage.
pub const SUBCLASS_IDE: u8 = 0x01;
/// SATA controller subclass of mass storage.
pub const SUBCLASS_SATA: u8 = 0x06;
/// Ethernet subclass of network.
pub const SUBCLASS_ETHERNET: u8 = 0x00;
/// VGA-compatible subclass of display.
pub const SUBCLASS_VGA: u8 = 0x00;
/// Host bridge subclass of bridge.
pub const SUBCLASS_HOST_BRIDGE: u8 = 0x00;
/// PCI-to-PCI subclass of bridge.
pub const SUBCLASS_PCI_TO_PCI: u8 = 0x04;

/// Class, subclass, and programming interface of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassCode {
    /// Base class (offset 0x0B).
    pub class: u8,
    /// Subclass (offset 0x0A).
    pub subclass: u8,
    /// Programming interface (offset 0x09).
    pub prog_if: u8,
}

impl ClassCode {
    /// Creates a class code.
    #[must_use]
    pub const fn new(class: u8, subclass: u8, prog_if: u8) -> Self {
        Self {
            class,
            subclass,
            prog_if,
        }
    }

    /// Decodes the dword at offset 0x08 (revision in the low byte).
    #[must_use]
    pub const fn from_dword(dword: u32) -> Self {
        Self {
            class: (dword >> 24) as u8,
            subclass: (dword >> 16) as u8,
            prog_if: (dword >> 8) as u8,
        }
    }

    /// Human-readable name of the class/subclass pair.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        class_name(self.class, self.subclass)
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.class, self.subclass, self.prog_if)
    }
}

/// Returns a human-readable name for a PCI class/subclass pair.
#[must_use]
pub const fn class_name(class: u8, subclass: u8) -> &'static str {
    match (class, subclass) {
        (0x00, 0x00) => "Non-VGA Unclassified",
        (0x00, 0x01) => "VGA-Compatible Unclassified",
        (0x01, 0x00) => "SCSI Controller",
        (CLASS_MASS_STORAGE, SUBCLASS_IDE) => "IDE Controller",
        (0x01, 0x05) => "ATA Controller",
        (CLASS_MASS_STORAGE, SUBCLASS_SATA) => "SATA Controller",
        (0x01, 0x08) => "NVMe Controller",
        (CLASS_NETWORK, SUBCLASS_ETHERNET) => "Ethernet Controller",
        (CLASS_DISPLAY, SUBCLASS_VGA) => "VGA Controller",
        (0x04, 0x00) => "Video Device",
        (0x04, 0x03) => "Audio Device",
        (CLASS_BRIDGE, SUBCLASS_HOST_BRIDGE) => "Host Bridge",
        (0x06, 0x01) => "ISA Bridge",
        (CLASS_BRIDGE, SUBCLASS_PCI_TO_PCI) => "PCI-to-PCI Bridge",
        (0x06, 0x07) => "CardBus Bridge",
        (0x08, 0x00) => "PIC",
        (0x08, 0x03) => "RTC Controller",
        (CLASS_SERIAL_BUS, 0x03) => "USB Controller",
        (CLASS_SERIAL_BUS, 0x05) => "SMBus Controller",
        _ => "Unknown",
    }
}
