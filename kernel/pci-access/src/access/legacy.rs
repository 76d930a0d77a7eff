//! PCI Configuration Access Mechanism (CAM) via legacy I/O ports.
//!
//! Uses ports `0xCF8` (CONFIG_ADDRESS) and `0xCFC` (CONFIG_DATA) to access
//! the 256-byte configuration space of each PCI function. Every access is a
//! two-step protocol: latch the target in CONFIG_ADDRESS, then transfer a
//! dword through CONFIG_DATA. The port pair is a single machine-wide
//! resource, so [`LegacyPorts`] holds one lock across both steps.

use alloc::boxed::Box;

use spin::Mutex;

use crate::address::Address;

/// CONFIG_ADDRESS port.
pub const CONFIG_ADDRESS: u16 = 0x0CF8;
/// CONFIG_DATA port.
pub const CONFIG_DATA: u16 = 0x0CFC;

/// Raw 32-bit port I/O used by the legacy mechanism.
///
/// Implementations own the CONFIG_ADDRESS/CONFIG_DATA pair. They are only
/// ever driven while the [`LegacyPorts`] lock is held.
pub trait PortIo: Send {
    /// Writes a dword to `port`.
    fn write_u32(&mut self, port: u16, value: u32);
    /// Reads a dword from `port`.
    fn read_u32(&mut self, port: u16) -> u32;
}

/// Port backend issuing real `in`/`out` instructions.
#[cfg(target_arch = "x86_64")]
pub struct X86Ports {
    address: x86_64::instructions::port::Port<u32>,
    data: x86_64::instructions::port::Port<u32>,
}

#[cfg(target_arch = "x86_64")]
impl X86Ports {
    /// Claims the CONFIG_ADDRESS/CONFIG_DATA ports.
    ///
    /// # Safety
    ///
    /// The caller must run with I/O privilege and must ensure no other code
    /// touches ports `0xCF8`/`0xCFC` for the lifetime of the returned value.
    #[must_use]
    pub unsafe fn new() -> Self {
        Self {
            address: x86_64::instructions::port::Port::new(CONFIG_ADDRESS),
            data: x86_64::instructions::port::Port::new(CONFIG_DATA),
        }
    }
}

#[cfg(target_arch = "x86_64")]
impl PortIo for X86Ports {
    fn write_u32(&mut self, port: u16, value: u32) {
        // SAFETY: `X86Ports::new` made the caller promise exclusive ownership
        // of both ports and I/O privilege.
        unsafe {
            match port {
                CONFIG_ADDRESS => self.address.write(value),
                _ => self.data.write(value),
            }
        }
    }

    fn read_u32(&mut self, port: u16) -> u32 {
        // SAFETY: See `write_u32`.
        unsafe {
            match port {
                CONFIG_ADDRESS => self.address.read(),
                _ => self.data.read(),
            }
        }
    }
}

/// The shared legacy port pair, serialized by one lock.
///
/// Domains that use the legacy mechanism hold an `Arc<LegacyPorts>`; there
/// must be at most one instance per machine.
pub struct LegacyPorts {
    io: Mutex<Box<dyn PortIo>>,
}

impl LegacyPorts {
    /// Wraps a port backend.
    pub fn new(io: impl PortIo + 'static) -> Self {
        Self {
            io: Mutex::new(Box::new(io)),
        }
    }

    /// Reads the dword containing `offset`.
    pub fn read_u32(&self, addr: Address, offset: u8) -> u32 {
        let mut io = self.io.lock();
        io.write_u32(CONFIG_ADDRESS, addr.io_address_for_field(offset));
        io.read_u32(CONFIG_DATA)
    }

    /// Reads a 16-bit value.
    pub fn read_u16(&self, addr: Address, offset: u8) -> u16 {
        let dword = self.read_u32(addr, offset);
        // Extract the correct 16-bit half based on bit 1 of offset.
        (dword >> shift_for(offset & 2)) as u16
    }

    /// Reads an 8-bit value.
    pub fn read_u8(&self, addr: Address, offset: u8) -> u8 {
        let dword = self.read_u32(addr, offset);
        // Extract the correct byte based on bits 0-1 of offset.
        (dword >> shift_for(offset & 3)) as u8
    }

    /// Writes the dword containing `offset`.
    pub fn write_u32(&self, addr: Address, offset: u8, value: u32) {
        let mut io = self.io.lock();
        io.write_u32(CONFIG_ADDRESS, addr.io_address_for_field(offset));
        io.write_u32(CONFIG_DATA, value);
    }

    /// Writes a 16-bit value, preserving the other half of the dword.
    pub fn write_u16(&self, addr: Address, offset: u8, value: u16) {
        self.modify(addr, offset, 0xFFFF, u32::from(value), shift_for(offset & 2));
    }

    /// Writes an 8-bit value, preserving the other bytes of the dword.
    pub fn write_u8(&self, addr: Address, offset: u8, value: u8) {
        self.modify(addr, offset, 0xFF, u32::from(value), shift_for(offset & 3));
    }

    /// Read-modify-write of one lane of a dword, under a single lock hold.
    fn modify(&self, addr: Address, offset: u8, mask: u32, value: u32, shift: u32) {
        let request = addr.io_address_for_field(offset);
        let mut io = self.io.lock();
        io.write_u32(CONFIG_ADDRESS, request);
        let dword = io.read_u32(CONFIG_DATA);
        let merged = (dword & !(mask << shift)) | ((value & mask) << shift);
        io.write_u32(CONFIG_ADDRESS, request);
        io.write_u32(CONFIG_DATA, merged);
    }
}

#[inline]
fn shift_for(byte_lane: u8) -> u32 {
    u32::from(byte_lane) * 8
}
