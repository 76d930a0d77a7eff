//! PCI capability linked-list walker.
//!
//! Walks the capability list starting from the Capabilities Pointer register
//! (offset 0x34). Each entry starts with a one-byte ID followed by the offset
//! of the next entry. The list lives in the 256-byte legacy space, so the
//! walk tracks visited offsets in a fixed 64-entry table and stops on the
//! first repeated or out-of-bounds pointer.

use alloc::vec::Vec;
use core::fmt;

use crate::access::ConfigAccess;
use crate::address::Address;
use crate::error::PciError;
use crate::regs::{self, Status};

/// Known capability IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityId {
    /// Message Signaled Interrupts (0x05).
    Msi,
    /// Vendor-specific (0x09).
    VendorSpecific,
    /// MSI-X (0x11).
    MsiX,
    /// Any other capability.
    Other(u8),
}

impl CapabilityId {
    /// Classifies a raw capability ID.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            regs::CAP_ID_MSI => Self::Msi,
            regs::CAP_ID_VENDOR => Self::VendorSpecific,
            regs::CAP_ID_MSIX => Self::MsiX,
            other => Self::Other(other),
        }
    }

    /// Returns the raw capability ID.
    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            Self::Msi => regs::CAP_ID_MSI,
            Self::VendorSpecific => regs::CAP_ID_VENDOR,
            Self::MsiX => regs::CAP_ID_MSIX,
            Self::Other(raw) => raw,
        }
    }
}

/// One entry of a function's capability list.
///
/// Register accesses through a `Capability` are relative to its pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    address: Address,
    id: u8,
    ptr: u8,
}

impl Capability {
    /// Creates a capability record.
    #[must_use]
    pub const fn new(address: Address, id: u8, ptr: u8) -> Self {
        Self { address, id, ptr }
    }

    /// Function the capability belongs to.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Raw capability ID.
    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Classified capability ID.
    #[must_use]
    pub const fn kind(&self) -> CapabilityId {
        CapabilityId::from_raw(self.id)
    }

    /// Config-space offset of the capability header.
    #[must_use]
    pub const fn ptr(&self) -> u8 {
        self.ptr
    }

    /// Absolute offset of a field, or an error if it would leave the
    /// 4 KiB function space.
    fn field(&self, offset: u16) -> Result<u16, PciError> {
        let limit = regs::EXTENDED_CONFIG_SPACE_SIZE - u16::from(self.ptr);
        match u16::from(self.ptr).checked_add(offset) {
            Some(absolute) if offset < limit => Ok(absolute),
            _ => Err(PciError::OffsetOutOfRange { offset, limit }),
        }
    }

    /// Reads an 8-bit field at `offset` bytes past the header.
    ///
    /// # Errors
    ///
    /// Returns [`PciError::OffsetOutOfRange`] if `offset` reaches past the
    /// function's configuration space, and propagates [`ConfigAccess`]
    /// errors.
    pub fn read8(&self, access: &ConfigAccess, offset: u16) -> Result<u8, PciError> {
        access.read8(self.address, self.field(offset)?)
    }

    /// Reads a 16-bit field at `offset` bytes past the header.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigAccess`] errors.
    pub fn read16(&self, access: &ConfigAccess, offset: u16) -> Result<u16, PciError> {
        access.read16(self.address, self.field(offset)?)
    }

    /// Reads a 32-bit field at `offset` bytes past the header.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigAccess`] errors.
    pub fn read32(&self, access: &ConfigAccess, offset: u16) -> Result<u32, PciError> {
        access.read32(self.address, self.field(offset)?)
    }

    /// Writes an 8-bit field at `offset` bytes past the header.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigAccess`] errors.
    pub fn write8(&self, access: &ConfigAccess, offset: u16, value: u8) -> Result<(), PciError> {
        access.write8(self.address, self.field(offset)?, value)
    }

    /// Writes a 16-bit field at `offset` bytes past the header.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigAccess`] errors.
    pub fn write16(&self, access: &ConfigAccess, offset: u16, value: u16) -> Result<(), PciError> {
        access.write16(self.address, self.field(offset)?, value)
    }

    /// Writes a 32-bit field at `offset` bytes past the header.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigAccess`] errors.
    pub fn write32(&self, access: &ConfigAccess, offset: u16, value: u32) -> Result<(), PciError> {
        access.write32(self.address, self.field(offset)?, value)
    }
}

/// Why a capability walk stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityFault {
    /// A next pointer led back to an entry already visited.
    Cycle {
        /// The repeated offset.
        offset: u8,
    },
    /// A pointer landed inside the standard header.
    OutOfBounds {
        /// The offending offset.
        offset: u8,
    },
    /// Reading an entry failed.
    ReadFailed(PciError),
}

impl fmt::Display for CapabilityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { offset } => write!(f, "capability list loops back to {offset:#04x}"),
            Self::OutOfBounds { offset } => {
                write!(f, "capability pointer {offset:#04x} inside the header")
            }
            Self::ReadFailed(err) => write!(f, "capability read failed: {err}"),
        }
    }
}

/// The result of walking one function's capability list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityList {
    /// Capabilities in list order, up to the fault if any.
    pub capabilities: Vec<Capability>,
    /// Set when the walk was truncated.
    pub fault: Option<CapabilityFault>,
}

/// Walks the capability list of the function at `addr`.
///
/// `status` is the function's Status register; when it does not advertise a
/// capability list the pointer at 0x34 is not consulted and the list is
/// empty.
#[must_use]
pub fn walk_capabilities(access: &ConfigAccess, addr: Address, status: Status) -> CapabilityList {
    let mut list = CapabilityList::default();
    if !status.contains(Status::CAPABILITIES_LIST) {
        return list;
    }

    let mut pointer = match access.read8(addr, regs::CAPABILITIES_PTR) {
        Ok(ptr) => ptr & 0xFC, // dword-aligned
        Err(err) => {
            list.fault = Some(CapabilityFault::ReadFailed(err));
            return list;
        }
    };

    // One slot per dword of the 256-byte legacy space.
    let mut visited = [false; 64];

    while pointer != 0 {
        if u16::from(pointer) < regs::HEADER_SIZE {
            list.fault = Some(CapabilityFault::OutOfBounds { offset: pointer });
            break;
        }
        let slot = usize::from(pointer >> 2);
        if visited[slot] {
            list.fault = Some(CapabilityFault::Cycle { offset: pointer });
            break;
        }
        visited[slot] = true;

        // ID in the low byte, next pointer in the high byte.
        let header = match access.read16(addr, u16::from(pointer)) {
            Ok(header) => header,
            Err(err) => {
                list.fault = Some(CapabilityFault::ReadFailed(err));
                break;
            }
        };
        let id = header as u8;
        if id == regs::CAP_ID_NULL {
            break;
        }
        list.capabilities.push(Capability::new(addr, id, pointer));
        pointer = ((header >> 8) as u8) & 0xFC;
    }

    list
}

// ---------------------------------------------------------------------------
// MSI capability
// ---------------------------------------------------------------------------

/// MSI Message Control: MSI Enable (bit 0).
const MSI_CTRL_ENABLE: u16 = 1 << 0;
/// MSI Message Control: 64-bit address capable (bit 7).
const MSI_CTRL_64BIT: u16 = 1 << 7;
/// MSI Message Control: per-vector masking capable (bit 8).
const MSI_CTRL_PER_VECTOR_MASK: u16 = 1 << 8;

/// Parsed MSI capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsiCapability {
    /// Config-space offset of the MSI capability header.
    pub cap_offset: u8,
    /// Number of vectors the function can request (1, 2, 4, ... 32).
    pub vectors: u8,
    /// Whether the message address register is 64 bits wide.
    pub is_64bit: bool,
    /// Whether per-vector masking is supported.
    pub per_vector_masking: bool,
    /// Whether MSI is currently enabled.
    pub enabled: bool,
}

/// Reads an MSI capability. Returns `None` if `cap` is not MSI.
///
/// # Errors
///
/// Propagates [`ConfigAccess`] errors.
pub fn read_msi_cap(access: &ConfigAccess, cap: &Capability) -> Result<Option<MsiCapability>, PciError> {
    if cap.kind() != CapabilityId::Msi {
        return Ok(None);
    }
    let control = cap.read16(access, 2)?;
    // Multiple Message Capable is a log2 encoding in bits 3:1.
    let log2 = ((control >> 1) & 0x7).min(5);
    Ok(Some(MsiCapability {
        cap_offset: cap.ptr(),
        vectors: 1 << log2,
        is_64bit: control & MSI_CTRL_64BIT != 0,
        per_vector_masking: control & MSI_CTRL_PER_VECTOR_MASK != 0,
        enabled: control & MSI_CTRL_ENABLE != 0,
    }))
}

// ---------------------------------------------------------------------------
// MSI-X capability
// ---------------------------------------------------------------------------

/// MSI-X Message Control register: MSI-X Enable (bit 15).
const MSIX_CTRL_ENABLE: u16 = 1 << 15;
/// MSI-X Message Control register: Function Mask (bit 14).
const MSIX_CTRL_FUNCTION_MASK: u16 = 1 << 14;

/// Parsed MSI-X capability from PCI config space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsixCapability {
    /// Config-space offset of the MSI-X capability header.
    pub cap_offset: u8,
    /// Number of MSI-X table entries (table size field + 1).
    pub entries: u16,
    /// BAR index containing the MSI-X table.
    pub table_bar: u8,
    /// Byte offset of the MSI-X table within the BAR.
    pub table_offset: u32,
    /// BAR index containing the PBA (Pending Bit Array).
    pub pba_bar: u8,
    /// Byte offset of the PBA within the BAR.
    pub pba_offset: u32,
}

/// Reads an MSI-X capability. Returns `None` if `cap` is not MSI-X.
///
/// # Errors
///
/// Propagates [`ConfigAccess`] errors.
pub fn read_msix_cap(access: &ConfigAccess, cap: &Capability) -> Result<Option<MsixCapability>, PciError> {
    if cap.kind() != CapabilityId::MsiX {
        return Ok(None);
    }
    let msg_control = cap.read16(access, 2)?;
    let table_bir_offset = cap.read32(access, 4)?;
    let pba_bir_offset = cap.read32(access, 8)?;

    // BIR = bits 2:0, offset = bits 31:3.
    Ok(Some(MsixCapability {
        cap_offset: cap.ptr(),
        entries: (msg_control & 0x7FF) + 1,
        table_bar: (table_bir_offset & 0x7) as u8,
        table_offset: table_bir_offset & !0x7,
        pba_bar: (pba_bir_offset & 0x7) as u8,
        pba_offset: pba_bir_offset & !0x7,
    }))
}

/// Sets or clears the MSI-X Enable and Function Mask bits.
///
/// # Errors
///
/// Propagates [`ConfigAccess`] errors.
pub fn set_msix_control(
    access: &ConfigAccess,
    cap: &Capability,
    enable: bool,
    function_mask: bool,
) -> Result<(), PciError> {
    let mut control = cap.read16(access, 2)?;
    control &= !(MSIX_CTRL_ENABLE | MSIX_CTRL_FUNCTION_MASK);
    if enable {
        control |= MSIX_CTRL_ENABLE;
    }
    if function_mask {
        control |= MSIX_CTRL_FUNCTION_MASK;
    }
    cap.write16(access, 2, control)
}
