//! PCI bus enumeration.
//!
//! Walks every domain's bus hierarchy with an explicit worklist: each domain
//! keeps a set of pending buses and a set of visited ones, and buses are
//! taken lowest first. PCI-to-PCI bridges add their secondary bus to the
//! pending set, so the bridge tree is followed without native recursion and
//! every bus is scanned at most once.

use alloc::vec::Vec;

use log::{debug, warn};

use crate::access::{BusSet, ConfigAccess};
use crate::address::{Address, DEVICES_PER_BUS, FUNCTIONS_PER_DEVICE, Id};
use crate::capability::walk_capabilities;
use crate::class::ClassCode;
use crate::config::{PciConfig, ScanStrategy};
use crate::error::PciError;
use crate::registry::PhysicalId;
use crate::regs::{self, HeaderType, Status};

/// Enumerates every domain of `access`.
///
/// Records are ordered by domain, then bus, device and function. Bridges
/// on legacy domains may extend the domain's reachable buses.
pub fn enumerate(access: &mut ConfigAccess, config: &PciConfig) -> Vec<PhysicalId> {
    let mut devices = Vec::new();
    for number in 0..access.domain_count() {
        // Domain numbers are indices into a list built from MCFG entries.
        let number = number as u32;
        let first = devices.len();
        enumerate_domain(access, number, config, &mut devices);
        devices[first..].sort_by_key(|device: &PhysicalId| {
            let addr = device.address;
            (addr.bus(), addr.device(), addr.function())
        });
    }
    devices
}

fn enumerate_domain(
    access: &mut ConfigAccess,
    number: u32,
    config: &PciConfig,
    devices: &mut Vec<PhysicalId>,
) {
    let mut pending = initial_buses(access, number, config.scan);
    let mut visited = BusSet::new();

    while let Some(bus) = pending.pop_first() {
        visited.insert(bus);
        let secondaries = match scan_bus(access, number, bus, config, devices) {
            Ok(secondaries) => secondaries,
            Err(err) => {
                warn!("PCI: domain {number}: scan of bus {bus:#04x} aborted: {err}");
                continue;
            }
        };

        for (bridge, secondary) in secondaries {
            if secondary == 0 {
                warn!("PCI: {bridge}: bridge has no secondary bus assigned");
                continue;
            }
            if visited.contains(secondary) {
                debug!("PCI: {bridge}: secondary bus {secondary:#04x} already scanned");
                continue;
            }
            let Some(domain) = access.domain_mut(number) else {
                continue;
            };
            if !domain.extend_reach(secondary) {
                warn!(
                    "PCI: {bridge}: secondary bus {secondary:#04x} is outside the ECAM window of domain {number}"
                );
                continue;
            }
            pending.insert(secondary);
        }
    }
}

/// Buses to seed the worklist with.
fn initial_buses(access: &ConfigAccess, number: u32, scan: ScanStrategy) -> BusSet {
    let Some(domain) = access.domain(number) else {
        return BusSet::new();
    };
    let (start, end) = (domain.domain().start_bus(), domain.domain().end_bus());

    match scan {
        ScanStrategy::Exhaustive => BusSet::range(start, end),
        ScanStrategy::Recursive => {
            let mut roots = BusSet::new();
            roots.insert(start);

            // A multi-function host controller at 0:0.0 has one function
            // per root bus.
            let host = Address::new(number, start, 0, 0);
            let multi = access
                .read8(host, regs::HEADER_TYPE)
                .is_ok_and(|header| HeaderType(header).is_multi_function());
            if multi {
                for function in 1..FUNCTIONS_PER_DEVICE {
                    let present = access
                        .read16(host.with_function(function), regs::VENDOR_ID)
                        .is_ok_and(|vendor| vendor != regs::VENDOR_NONE);
                    match start.checked_add(function) {
                        Some(bus) if present && bus <= end => {
                            roots.insert(bus);
                        }
                        _ => {}
                    }
                }
            }
            roots
        }
    }
}

/// Scans one bus, appending every present function to `devices`.
///
/// Returns the `(bridge, secondary bus)` pairs found on the bus.
fn scan_bus(
    access: &ConfigAccess,
    number: u32,
    bus: u8,
    config: &PciConfig,
    devices: &mut Vec<PhysicalId>,
) -> Result<Vec<(Address, u8)>, PciError> {
    let mut secondaries = Vec::new();

    for device in 0..DEVICES_PER_BUS {
        let slot = Address::new(number, bus, device, 0);
        let Some(first) = read_function(access, slot)? else {
            continue;
        };
        let multi = first.header_type.is_multi_function();
        record(access, first, &mut secondaries, devices)?;

        if config.honor_multifunction && !multi {
            continue;
        }
        for function in 1..FUNCTIONS_PER_DEVICE {
            if let Some(found) = read_function(access, slot.with_function(function))? {
                record(access, found, &mut secondaries, devices)?;
            }
        }
    }

    Ok(secondaries)
}

fn record(
    access: &ConfigAccess,
    found: PhysicalId,
    secondaries: &mut Vec<(Address, u8)>,
    devices: &mut Vec<PhysicalId>,
) -> Result<(), PciError> {
    if found.is_bridge() {
        let secondary = access.read8(found.address, regs::SECONDARY_BUS)?;
        debug!("PCI: {} bridge to bus {secondary:#04x}", found.address);
        secondaries.push((found.address, secondary));
    }
    debug!(
        "PCI: {found}, header {:#04x}, {} capabilities",
        found.header_type.0,
        found.capabilities.len()
    );
    devices.push(found);
    Ok(())
}

/// Reads the identity of one function, or `None` if it does not respond.
fn read_function(access: &ConfigAccess, addr: Address) -> Result<Option<PhysicalId>, PciError> {
    let id = Id::from_dword(access.read32(addr, regs::VENDOR_ID)?);
    if id.vendor_id == regs::VENDOR_NONE {
        return Ok(None);
    }

    let header_type = HeaderType(access.read8(addr, regs::HEADER_TYPE)?);
    let status = Status::from_bits_retain(access.read16(addr, regs::STATUS)?);
    let class_dword = access.read32(addr, regs::REVISION_ID)?;
    let interrupt_line = access.read8(addr, regs::INTERRUPT_LINE)?;

    let list = walk_capabilities(access, addr, status);
    if let Some(fault) = list.fault {
        warn!(
            "PCI: {addr} {id}: malformed capability list ({fault}), kept {} entries",
            list.capabilities.len()
        );
    }

    Ok(Some(PhysicalId {
        address: addr,
        id,
        class: ClassCode::from_dword(class_dword),
        // Low byte of the class dword.
        revision: class_dword as u8,
        header_type,
        interrupt_line,
        capabilities: list.capabilities,
    }))
}
