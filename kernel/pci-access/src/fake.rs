//! Fake configuration space for host tests.
//!
//! [`FakePlatform`] emulates the CONFIG_ADDRESS/CONFIG_DATA latch protocol
//! over a sparse map of 256-byte function spaces; [`FakeEcam`] backs an ECAM
//! window with heap memory. Absent functions read as all ones, matching real
//! hardware.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::access::ecam::{EcamWindow, window_physical_start, window_size};
use crate::access::legacy::{CONFIG_ADDRESS, CONFIG_DATA, LegacyPorts, PortIo};
use crate::access::{ConfigAccess, Mechanism};
use crate::address::{Address, Domain};
use crate::class::{CLASS_BRIDGE, SUBCLASS_PCI_TO_PCI};
use crate::discovery::ConfigSpaceMapper;
use crate::regs;

/// Helpers for populating a fake configuration space.
pub(crate) trait ConfigWriter {
    fn set_u32(&self, addr: Address, offset: u16, value: u32);
    fn get_u32(&self, addr: Address, offset: u16) -> u32;
    /// Makes the function exist with an all-zero configuration space.
    fn clear_function(&self, addr: Address);

    fn set_u16(&self, addr: Address, offset: u16, value: u16) {
        let aligned = offset & !3;
        let shift = u32::from(offset & 2) * 8;
        let dword = self.get_u32(addr, aligned);
        let merged = (dword & !(0xFFFF << shift)) | (u32::from(value) << shift);
        self.set_u32(addr, aligned, merged);
    }

    fn set_u8(&self, addr: Address, offset: u16, value: u8) {
        let aligned = offset & !3;
        let shift = u32::from(offset & 3) * 8;
        let dword = self.get_u32(addr, aligned);
        let merged = (dword & !(0xFF << shift)) | (u32::from(value) << shift);
        self.set_u32(addr, aligned, merged);
    }

    fn add_function(&self, addr: Address, vendor: u16, device: u16, header_type: u8) {
        self.clear_function(addr);
        self.set_u16(addr, regs::VENDOR_ID, vendor);
        self.set_u16(addr, regs::DEVICE_ID, device);
        self.set_u8(addr, regs::HEADER_TYPE, header_type);
    }

    fn set_class(&self, addr: Address, class: u8, subclass: u8, prog_if: u8) {
        self.set_u8(addr, regs::CLASS, class);
        self.set_u8(addr, regs::SUBCLASS, subclass);
        self.set_u8(addr, regs::PROG_IF, prog_if);
    }

    /// Adds a PCI-to-PCI bridge forwarding to `secondary`.
    fn add_bridge(&self, addr: Address, secondary: u8) {
        self.add_function(addr, 0x8086, 0x244E, 0x01);
        self.set_class(addr, CLASS_BRIDGE, SUBCLASS_PCI_TO_PCI, 0x00);
        self.set_u8(addr, regs::PRIMARY_BUS, addr.bus());
        self.set_u8(addr, regs::SECONDARY_BUS, secondary);
        self.set_u8(addr, regs::SUBORDINATE_BUS, secondary);
    }

    /// Chains `(offset, id)` capabilities in the given order and sets the
    /// status bit.
    fn add_capabilities(&self, addr: Address, caps: &[(u8, u8)]) {
        let status = (self.get_u32(addr, 0x04) >> 16) as u16;
        self.set_u16(
            addr,
            regs::STATUS,
            status | regs::Status::CAPABILITIES_LIST.bits(),
        );
        self.set_u8(addr, regs::CAPABILITIES_PTR, caps.first().map_or(0, |c| c.0));
        for (index, (offset, id)) in caps.iter().enumerate() {
            let next = caps.get(index + 1).map_or(0, |c| c.0);
            self.set_u8(addr, u16::from(*offset), *id);
            self.set_u8(addr, u16::from(*offset) + 1, next);
        }
    }
}

type Slot = (u8, u8, u8);

#[derive(Default)]
struct LegacyState {
    spaces: HashMap<Slot, [u8; 256]>,
    /// Writable bits of BAR-like registers, keyed by slot and offset.
    write_masks: HashMap<(Slot, u8), u32>,
    latched: u32,
    latched_by: Option<ThreadId>,
    torn: usize,
}

impl LegacyState {
    fn dword(&self, slot: Slot, offset: u8) -> u32 {
        let base = usize::from(offset & 0xFC);
        self.spaces.get(&slot).map_or(u32::MAX, |space| {
            u32::from_le_bytes([
                space[base],
                space[base + 1],
                space[base + 2],
                space[base + 3],
            ])
        })
    }

    fn store(&mut self, slot: Slot, offset: u8, value: u32) {
        let base = usize::from(offset & 0xFC);
        let space = self.spaces.entry(slot).or_insert([0xFF; 256]);
        space[base..base + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn decode(latched: u32) -> Option<(Slot, u8)> {
        if latched & 0x8000_0000 == 0 {
            return None;
        }
        let bus = (latched >> 16) as u8;
        let device = ((latched >> 11) & 0x1F) as u8;
        let function = ((latched >> 8) & 0x07) as u8;
        Some(((bus, device, function), (latched & 0xFC) as u8))
    }
}

/// Emulated legacy port pair plus the configuration spaces behind it.
#[derive(Clone, Default)]
pub(crate) struct FakePlatform {
    state: Arc<Mutex<LegacyState>>,
    yielding: bool,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Yields the thread between the address and data steps, so that a
    /// missing lock would show up as torn accesses.
    pub(crate) fn with_yielding_ports(mut self) -> Self {
        self.yielding = true;
        self
    }

    pub(crate) fn legacy_ports(&self) -> LegacyPorts {
        LegacyPorts::new(FakePorts {
            state: Arc::clone(&self.state),
            yielding: self.yielding,
        })
    }

    /// An access layer with a single legacy domain.
    pub(crate) fn legacy_access(&self, domain: Domain) -> ConfigAccess {
        let mut access = ConfigAccess::new();
        access.add_domain(domain, 0, Mechanism::Legacy(Arc::new(self.legacy_ports())));
        access
    }

    /// Marks bits of a dword register as the only writable ones.
    pub(crate) fn set_write_mask(&self, addr: Address, offset: u8, mask: u32) {
        let slot = (addr.bus(), addr.device(), addr.function());
        self.state
            .lock()
            .unwrap()
            .write_masks
            .insert((slot, offset & 0xFC), mask);
    }

    /// Number of data-port accesses issued by a thread other than the one
    /// that latched the address.
    pub(crate) fn torn_accesses(&self) -> usize {
        self.state.lock().unwrap().torn
    }
}

impl ConfigWriter for FakePlatform {
    fn set_u32(&self, addr: Address, offset: u16, value: u32) {
        assert!(offset < 0x100, "legacy fake covers 256 bytes");
        let slot = (addr.bus(), addr.device(), addr.function());
        self.state.lock().unwrap().store(slot, offset as u8, value);
    }

    fn get_u32(&self, addr: Address, offset: u16) -> u32 {
        let slot = (addr.bus(), addr.device(), addr.function());
        self.state.lock().unwrap().dword(slot, offset as u8)
    }

    fn clear_function(&self, addr: Address) {
        let slot = (addr.bus(), addr.device(), addr.function());
        self.state.lock().unwrap().spaces.insert(slot, [0; 256]);
    }
}

struct FakePorts {
    state: Arc<Mutex<LegacyState>>,
    yielding: bool,
}

impl PortIo for FakePorts {
    fn write_u32(&mut self, port: u16, value: u32) {
        let me = thread::current().id();
        {
            let mut state = self.state.lock().unwrap();
            match port {
                CONFIG_ADDRESS => {
                    state.latched = value;
                    state.latched_by = Some(me);
                }
                CONFIG_DATA => {
                    if state.latched_by != Some(me) {
                        state.torn += 1;
                    }
                    if let Some((slot, offset)) = LegacyState::decode(state.latched) {
                        if state.spaces.contains_key(&slot) {
                            let stored = match state.write_masks.get(&(slot, offset)) {
                                Some(mask) => {
                                    (value & mask) | (state.dword(slot, offset) & !mask)
                                }
                                None => value,
                            };
                            state.store(slot, offset, stored);
                        }
                    }
                }
                _ => panic!("unexpected port {port:#x}"),
            }
        }
        if self.yielding && port == CONFIG_ADDRESS {
            thread::yield_now();
        }
    }

    fn read_u32(&mut self, port: u16) -> u32 {
        assert_eq!(port, CONFIG_DATA, "only CONFIG_DATA is readable");
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        if state.latched_by != Some(me) {
            state.torn += 1;
        }
        match LegacyState::decode(state.latched) {
            Some((slot, offset)) => state.dword(slot, offset),
            None => u32::MAX,
        }
    }
}

/// Heap memory standing in for one domain's ECAM window.
pub(crate) struct FakeEcam {
    base: NonNull<u8>,
    domain: Domain,
}

impl FakeEcam {
    /// Allocates a window for `domain`. Every function starts absent.
    pub(crate) fn new(domain: Domain) -> Self {
        let memory: &'static mut [u32] =
            Box::leak(vec![u32::MAX; window_size(&domain) / 4].into_boxed_slice());
        let base = NonNull::new(memory.as_mut_ptr().cast::<u8>()).unwrap();
        Self { base, domain }
    }

    pub(crate) fn window(&self) -> EcamWindow {
        // SAFETY: `base` points at a leaked allocation of exactly
        // `window_size(&self.domain)` bytes that is never freed.
        unsafe { EcamWindow::new(self.base, &self.domain) }
    }
}

impl ConfigWriter for FakeEcam {
    fn set_u32(&self, addr: Address, offset: u16, value: u32) {
        self.window().write_u32(addr, offset & !3, value);
    }

    fn get_u32(&self, addr: Address, offset: u16) -> u32 {
        self.window().read_u32(addr, offset & !3)
    }

    fn clear_function(&self, addr: Address) {
        let window = self.window();
        for offset in (0..regs::EXTENDED_CONFIG_SPACE_SIZE).step_by(4) {
            window.write_u32(addr, offset, 0);
        }
    }
}

/// Maps the physical windows of a set of [`FakeEcam`]s.
pub(crate) struct FakeMapper {
    windows: Vec<(u64, usize, NonNull<u8>)>,
}

impl FakeMapper {
    pub(crate) fn new(ecams: &[&FakeEcam]) -> Self {
        Self {
            windows: ecams
                .iter()
                .map(|ecam| {
                    (
                        window_physical_start(&ecam.domain),
                        window_size(&ecam.domain),
                        ecam.base,
                    )
                })
                .collect(),
        }
    }
}

// SAFETY: Every returned pointer is a leaked `FakeEcam` allocation of the
// requested size.
unsafe impl ConfigSpaceMapper for FakeMapper {
    fn map_config_space(&self, phys: u64, size: usize) -> Option<NonNull<u8>> {
        self.windows
            .iter()
            .find(|(start, len, _)| *start == phys && *len == size)
            .map(|(_, _, base)| *base)
    }
}
