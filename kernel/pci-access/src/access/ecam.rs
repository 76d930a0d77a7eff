//! PCI Express Enhanced Configuration Access Mechanism (ECAM).
//!
//! ECAM provides memory-mapped access to the full 4 KiB PCI configuration
//! space, replacing the legacy 256-byte CAM I/O port mechanism. Each domain
//! owns one window described by an ACPI MCFG entry.
//!
//! ECAM address = base + (bus << 20) | (device << 15) | (function << 12) | offset

use core::ptr::NonNull;

use crate::address::{Address, Domain};

/// Physical address of a configuration register under ECAM.
#[must_use]
pub const fn ecam_physical_address(domain: &Domain, addr: Address, offset: u16) -> u64 {
    domain.base_address()
        + ((addr.bus() as u64) << 20)
        + ((addr.device() as u64) << 15)
        + ((addr.function() as u64) << 12)
        + offset as u64
}

/// Physical start of the part of a domain's window that covers its buses.
#[must_use]
pub const fn window_physical_start(domain: &Domain) -> u64 {
    domain.base_address() + ((domain.start_bus() as u64) << 20)
}

/// Size in bytes of the part of a domain's window that covers its buses.
#[must_use]
pub const fn window_size(domain: &Domain) -> usize {
    domain.bus_count() << 20
}

/// A mapped ECAM window for one domain.
///
/// `virt_base` corresponds to the physical address of `start_bus`'s first
/// function, i.e. [`window_physical_start`].
#[derive(Debug)]
pub struct EcamWindow {
    virt_base: NonNull<u8>,
    start_bus: u8,
    end_bus: u8,
}

// SAFETY: The window is device memory, not Rust-owned data. Every access is a
// single volatile load or store of a naturally aligned value, so sharing the
// pointer between CPUs cannot produce a data race in the Rust sense.
unsafe impl Send for EcamWindow {}
unsafe impl Sync for EcamWindow {}

impl EcamWindow {
    /// Wraps a mapped window.
    ///
    /// # Safety
    ///
    /// `virt_base` must map [`window_size`] bytes of `domain`'s ECAM region
    /// starting at [`window_physical_start`], as uncached memory, for the
    /// rest of the kernel's lifetime.
    #[must_use]
    pub unsafe fn new(virt_base: NonNull<u8>, domain: &Domain) -> Self {
        Self {
            virt_base,
            start_bus: domain.start_bus(),
            end_bus: domain.end_bus(),
        }
    }

    /// Computes the virtual address of a register.
    ///
    /// The caller has already checked that the bus lies in the window and
    /// that `offset` is within the 4 KiB function space.
    fn register(&self, addr: Address, offset: u16) -> *mut u8 {
        debug_assert!(addr.bus() >= self.start_bus && addr.bus() <= self.end_bus);
        let relative = (usize::from(addr.bus() - self.start_bus) << 20)
            | (usize::from(addr.device()) << 15)
            | (usize::from(addr.function()) << 12)
            | usize::from(offset & 0xFFF);
        // SAFETY: `relative` is below `window_size`, which `new` requires to
        // be mapped.
        unsafe { self.virt_base.as_ptr().add(relative) }
    }

    /// Reads an 8-bit register.
    pub fn read_u8(&self, addr: Address, offset: u16) -> u8 {
        // SAFETY: The address lies inside the mapped window (see `register`).
        unsafe { self.register(addr, offset).read_volatile() }
    }

    /// Reads a 16-bit register. `offset` must be 2-byte aligned.
    pub fn read_u16(&self, addr: Address, offset: u16) -> u16 {
        // SAFETY: Inside the window and naturally aligned.
        unsafe { self.register(addr, offset).cast::<u16>().read_volatile() }
    }

    /// Reads a 32-bit register. `offset` must be 4-byte aligned.
    pub fn read_u32(&self, addr: Address, offset: u16) -> u32 {
        // SAFETY: Inside the window and naturally aligned.
        unsafe { self.register(addr, offset).cast::<u32>().read_volatile() }
    }

    /// Writes an 8-bit register.
    pub fn write_u8(&self, addr: Address, offset: u16, value: u8) {
        // SAFETY: Inside the window.
        unsafe { self.register(addr, offset).write_volatile(value) }
    }

    /// Writes a 16-bit register. `offset` must be 2-byte aligned.
    pub fn write_u16(&self, addr: Address, offset: u16, value: u16) {
        // SAFETY: Inside the window and naturally aligned.
        unsafe { self.register(addr, offset).cast::<u16>().write_volatile(value) }
    }

    /// Writes a 32-bit register. `offset` must be 4-byte aligned.
    pub fn write_u32(&self, addr: Address, offset: u16, value: u32) {
        // SAFETY: Inside the window and naturally aligned.
        unsafe { self.register(addr, offset).cast::<u32>().write_volatile(value) }
    }
}
