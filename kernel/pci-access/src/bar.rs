//! Base Address Register decoding and sizing.

use crate::access::ConfigAccess;
use crate::address::Address;
use crate::error::PciError;
use crate::regs::{self, Command, HeaderType};

/// Decoded Base Address Register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bar {
    /// Memory-mapped BAR.
    Memory {
        /// Base physical address.
        base: u64,
        /// Size in bytes.
        size: u64,
        /// Whether the region is prefetchable.
        prefetchable: bool,
        /// Whether this is a 64-bit BAR (consumes two BAR slots).
        is_64bit: bool,
    },
    /// I/O port BAR.
    Io {
        /// Base I/O port address.
        base: u32,
        /// Size in bytes.
        size: u32,
    },
    /// BAR slot is unimplemented or holds the upper half of a 64-bit BAR.
    Unused,
}

impl Bar {
    /// Returns `true` for a memory BAR.
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory { .. })
    }

    /// Returns the base address, widened to 64 bits.
    #[must_use]
    pub const fn base(&self) -> Option<u64> {
        match *self {
            Self::Memory { base, .. } => Some(base),
            Self::Io { base, .. } => Some(base as u64),
            Self::Unused => None,
        }
    }

    /// Returns the decoded size in bytes.
    #[must_use]
    pub const fn size(&self) -> Option<u64> {
        match *self {
            Self::Memory { size, .. } => Some(size),
            Self::Io { size, .. } => Some(size as u64),
            Self::Unused => None,
        }
    }
}

const fn bar_offset(index: u8) -> u16 {
    regs::BAR0 + index as u16 * 4
}

/// Writes all ones to a BAR register and returns `(original, sizing)`,
/// restoring the original value afterwards.
fn sample_bar(access: &ConfigAccess, addr: Address, offset: u16) -> Result<(u32, u32), PciError> {
    let original = access.read32(addr, offset)?;
    access.write32(addr, offset, 0xFFFF_FFFF)?;
    let sizing = access.read32(addr, offset)?;
    access.write32(addr, offset, original)?;
    Ok((original, sizing))
}

/// Decodes BAR `index` with the standard sizing algorithm.
///
/// Memory and I/O decoding are turned off in the command register while
/// the all-ones pattern is in place and restored afterwards. A 64-bit BAR
/// is combined with the following slot; the caller must not decode that
/// slot on its own.
///
/// # Errors
///
/// Returns [`PciError::InvalidBar`] if the header layout has no BAR
/// `index`, or the access error that interrupted sizing.
pub fn read_bar(
    access: &ConfigAccess,
    addr: Address,
    header: HeaderType,
    index: u8,
) -> Result<Bar, PciError> {
    let count = header.bar_count();
    if index >= count {
        return Err(PciError::InvalidBar(index));
    }

    let command = access.read16(addr, regs::COMMAND)?;
    let decode = Command::IO_SPACE | Command::MEMORY_SPACE;
    let quiesce = Command::from_bits_retain(command).intersects(decode);
    if quiesce {
        access.write16(addr, regs::COMMAND, command & !decode.bits())?;
    }
    let result = size_bar(access, addr, index, count);
    if quiesce {
        access.write16(addr, regs::COMMAND, command)?;
    }
    result
}

fn size_bar(access: &ConfigAccess, addr: Address, index: u8, count: u8) -> Result<Bar, PciError> {
    let (original, sizing) = sample_bar(access, addr, bar_offset(index))?;
    if sizing == 0 || sizing == 0xFFFF_FFFF {
        return Ok(Bar::Unused);
    }

    if original & 1 != 0 {
        let mask = sizing & !0x03;
        let size = (!mask).wrapping_add(1) & 0xFFFF;
        if size == 0 {
            return Ok(Bar::Unused);
        }
        return Ok(Bar::Io {
            base: original & !0x03,
            size,
        });
    }

    let prefetchable = original & 0x08 != 0;
    let is_64bit = (original >> 1) & 0x03 == 2;
    if is_64bit && index + 1 < count {
        let (original_high, sizing_high) = sample_bar(access, addr, bar_offset(index + 1))?;
        let base = (u64::from(original_high) << 32) | u64::from(original & !0x0F);
        let mask = (u64::from(sizing_high) << 32) | u64::from(sizing & !0x0F);
        return Ok(Bar::Memory {
            base,
            size: (!mask).wrapping_add(1),
            prefetchable,
            is_64bit: true,
        });
    }

    let mask = sizing & !0x0F;
    Ok(Bar::Memory {
        base: u64::from(original & !0x0F),
        size: u64::from((!mask).wrapping_add(1)),
        prefetchable,
        is_64bit: false,
    })
}

/// Decodes every BAR of a function.
///
/// Slots beyond the header's BAR count, and the upper halves of 64-bit
/// BARs, are [`Bar::Unused`].
///
/// # Errors
///
/// Returns the first access error encountered.
pub fn read_bars(
    access: &ConfigAccess,
    addr: Address,
    header: HeaderType,
) -> Result<[Bar; 6], PciError> {
    let mut bars = [Bar::Unused; 6];
    let mut index = 0;
    while index < header.bar_count() {
        let bar = read_bar(access, addr, header, index)?;
        bars[usize::from(index)] = bar;
        index += match bar {
            Bar::Memory { is_64bit: true, .. } => 2,
            _ => 1,
        };
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Domain;
    use crate::fake::{ConfigWriter, FakePlatform};

    const NORMAL: HeaderType = HeaderType(0x00);

    fn setup() -> (FakePlatform, Address) {
        let platform = FakePlatform::new();
        let addr = Address::new(0, 0, 3, 0);
        platform.add_function(addr, 0x8086, 0x100E, 0x00);
        (platform, addr)
    }

    #[test]
    fn sizes_memory_and_io_bars() {
        let (platform, addr) = setup();
        platform.set_u32(addr, 0x10, 0xFEBC_0000);
        platform.set_write_mask(addr, 0x10, 0xFFFE_0000);
        platform.set_u32(addr, 0x18, 0x0000_C001);
        platform.set_write_mask(addr, 0x18, 0xFFFF_FFC0);
        let access = platform.legacy_access(Domain::legacy());

        let bars = read_bars(&access, addr, NORMAL).unwrap();
        assert_eq!(
            bars[0],
            Bar::Memory {
                base: 0xFEBC_0000,
                size: 0x2_0000,
                prefetchable: false,
                is_64bit: false,
            }
        );
        assert_eq!(bars[1], Bar::Unused);
        assert_eq!(
            bars[2],
            Bar::Io {
                base: 0xC000,
                size: 0x40
            }
        );

        // Original values are restored after sizing.
        assert_eq!(platform.get_u32(addr, 0x10), 0xFEBC_0000);
        assert_eq!(platform.get_u32(addr, 0x18), 0x0000_C001);
    }

    #[test]
    fn combines_64bit_halves() {
        let (platform, addr) = setup();
        platform.set_u32(addr, 0x10, 0x0000_000C);
        platform.set_write_mask(addr, 0x10, 0xFFFF_C000);
        platform.set_u32(addr, 0x14, 0x0000_0001);
        platform.set_write_mask(addr, 0x14, 0xFFFF_FFFF);
        let access = platform.legacy_access(Domain::legacy());

        let bars = read_bars(&access, addr, NORMAL).unwrap();
        assert_eq!(
            bars[0],
            Bar::Memory {
                base: 0x1_0000_0000,
                size: 0x4000,
                prefetchable: true,
                is_64bit: true,
            }
        );
        assert_eq!(bars[1], Bar::Unused);
        assert_eq!(bars[0].base(), Some(0x1_0000_0000));
    }

    #[test]
    fn restores_command_register() {
        let (platform, addr) = setup();
        platform.set_u16(addr, regs::COMMAND, 0x0007);
        platform.set_u32(addr, 0x10, 0xFEBC_0000);
        platform.set_write_mask(addr, 0x10, 0xFFFF_F000);
        let access = platform.legacy_access(Domain::legacy());

        read_bar(&access, addr, NORMAL, 0).unwrap();
        assert_eq!(access.read16(addr, regs::COMMAND), Ok(0x0007));
    }

    #[test]
    fn rejects_missing_slots() {
        let (platform, addr) = setup();
        let access = platform.legacy_access(Domain::legacy());
        assert_eq!(
            read_bar(&access, addr, HeaderType(0x01), 2),
            Err(PciError::InvalidBar(2))
        );
        assert_eq!(
            read_bar(&access, addr, HeaderType(0x02), 0),
            Err(PciError::InvalidBar(0))
        );
    }
}
