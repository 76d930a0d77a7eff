//! Domain discovery.
//!
//! Binds every host bridge to an access mechanism. ECAM windows come from
//! the ACPI MCFG table (parsed by the ACPI layer and handed over as
//! [`McfgRegion`]s); when none can be used the legacy ports provide a single
//! domain covering every bus number.

use alloc::sync::Arc;
use core::ptr::NonNull;

use log::{info, warn};

use crate::access::ecam::{EcamWindow, window_physical_start, window_size};
use crate::access::{ConfigAccess, LegacyPorts, Mechanism};
use crate::address::Domain;
use crate::config::PciConfig;
use crate::error::PciError;

/// A single MCFG configuration space entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McfgRegion {
    /// Base physical address of the enhanced configuration mechanism.
    pub base_address: u64,
    /// PCI segment group number.
    pub segment_group: u16,
    /// Start PCI bus number decoded by this entry.
    pub start_bus: u8,
    /// End PCI bus number decoded by this entry.
    pub end_bus: u8,
}

/// Maps ECAM windows into the kernel address space.
///
/// # Safety
///
/// A returned pointer must map `size` bytes starting at physical `phys` as
/// uncached memory and stay valid for the rest of the kernel's lifetime.
pub unsafe trait ConfigSpaceMapper {
    /// Maps `size` bytes at physical address `phys`.
    fn map_config_space(&self, phys: u64, size: usize) -> Option<NonNull<u8>>;
}

/// Inputs available to discovery at boot.
#[derive(Default)]
pub struct Firmware<'a> {
    /// MCFG entries, in table order.
    pub mcfg: &'a [McfgRegion],
    /// Mapper for ECAM windows; ECAM is unusable without one.
    pub mapper: Option<&'a dyn ConfigSpaceMapper>,
    /// The legacy port pair, if the platform has one.
    pub legacy: Option<Arc<LegacyPorts>>,
}

/// Discovers domains and binds each to its mechanism.
///
/// ECAM domains are numbered in MCFG order. A malformed or unmappable MCFG
/// entry is skipped with a warning. The legacy domain is used only when no
/// ECAM domain was created and `config.mode` permits it.
///
/// # Errors
///
/// Returns [`PciError::NoDomains`] if no domain could be created.
pub fn discover(firmware: Firmware<'_>, config: &PciConfig) -> Result<ConfigAccess, PciError> {
    let mut access = ConfigAccess::new();

    if config.mode.allows_memory() {
        match firmware.mapper {
            Some(mapper) => {
                for region in firmware.mcfg {
                    add_ecam_domain(&mut access, region, mapper);
                }
            }
            None if !firmware.mcfg.is_empty() => {
                warn!("PCI: MCFG lists {} regions but no mapper was provided", firmware.mcfg.len());
            }
            None => {}
        }
    }

    if access.domain_count() == 0 && config.mode.allows_legacy() {
        if let Some(ports) = firmware.legacy {
            let number = access.add_domain(Domain::legacy(), 0, Mechanism::Legacy(ports));
            info!("PCI: domain {number}: legacy CAM ports, buses 0x00-0xff");
        }
    }

    if access.domain_count() == 0 {
        return Err(PciError::NoDomains);
    }
    Ok(access)
}

fn add_ecam_domain(access: &mut ConfigAccess, region: &McfgRegion, mapper: &dyn ConfigSpaceMapper) {
    let domain = match Domain::new(region.base_address, region.start_bus, region.end_bus) {
        Ok(domain) => domain,
        Err(err) => {
            warn!("PCI: skipping MCFG segment {}: {err}", region.segment_group);
            return;
        }
    };

    let Some(virt) = mapper.map_config_space(window_physical_start(&domain), window_size(&domain))
    else {
        let err = PciError::MappingFailed {
            base: region.base_address,
        };
        warn!("PCI: skipping MCFG segment {}: {err}", region.segment_group);
        return;
    };

    // SAFETY: `ConfigSpaceMapper` guarantees the mapping covers the requested
    // window for the kernel's lifetime.
    let window = unsafe { EcamWindow::new(virt, &domain) };
    let number = access.add_domain(domain, region.segment_group, Mechanism::Memory(window));
    info!(
        "PCI: domain {number}: segment {}, buses {:#04x}-{:#04x}, ECAM at {:#x}",
        region.segment_group,
        domain.start_bus(),
        domain.end_bus(),
        domain.base_address()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessMode;
    use crate::fake::{FakeEcam, FakeMapper, FakePlatform};

    fn region(base: u64, segment: u16, start: u8, end: u8) -> McfgRegion {
        McfgRegion {
            base_address: base,
            segment_group: segment,
            start_bus: start,
            end_bus: end,
        }
    }

    #[test]
    fn ecam_domains_in_mcfg_order() {
        let first = FakeEcam::new(Domain::new(0xE000_0000, 0, 1).unwrap());
        let second = FakeEcam::new(Domain::new(0xF000_0000, 4, 4).unwrap());
        let mapper = FakeMapper::new(&[&first, &second]);
        let mcfg = [region(0xE000_0000, 0, 0, 1), region(0xF000_0000, 1, 4, 4)];

        let access = discover(
            Firmware {
                mcfg: &mcfg,
                mapper: Some(&mapper),
                legacy: Some(Arc::new(FakePlatform::new().legacy_ports())),
            },
            &PciConfig::new(),
        )
        .unwrap();

        assert_eq!(access.domain_count(), 2);
        let second_domain = access.domain(1).unwrap();
        assert_eq!(second_domain.segment_group(), 1);
        assert_eq!(second_domain.domain().start_bus(), 4);
        assert_eq!(second_domain.mechanism().name(), "ecam");
    }

    #[test]
    fn skips_bad_regions() {
        let good = FakeEcam::new(Domain::new(0xE000_0000, 0, 0).unwrap());
        let mapper = FakeMapper::new(&[&good]);
        let mcfg = [
            region(0xD000_0000, 0, 3, 1), // inverted range
            region(0xC000_0000, 0, 0, 0), // mapper refuses
            region(0xE000_0000, 2, 0, 0),
        ];

        let access = discover(
            Firmware {
                mcfg: &mcfg,
                mapper: Some(&mapper),
                legacy: None,
            },
            &PciConfig::new(),
        )
        .unwrap();
        assert_eq!(access.domain_count(), 1);
        assert_eq!(access.domain(0).unwrap().segment_group(), 2);
    }

    #[test]
    fn falls_back_to_legacy() {
        let access = discover(
            Firmware {
                mcfg: &[],
                mapper: None,
                legacy: Some(Arc::new(FakePlatform::new().legacy_ports())),
            },
            &PciConfig::new(),
        )
        .unwrap();
        assert_eq!(access.domain_count(), 1);
        let domain = access.domain(0).unwrap();
        assert_eq!(domain.mechanism().name(), "legacy");
        assert_eq!(*domain.domain(), Domain::legacy());
    }

    #[test]
    fn legacy_mode_ignores_mcfg() {
        let ecam = FakeEcam::new(Domain::new(0xE000_0000, 0, 0).unwrap());
        let mapper = FakeMapper::new(&[&ecam]);
        let mcfg = [region(0xE000_0000, 0, 0, 0)];
        let config = PciConfig {
            mode: AccessMode::Legacy,
            ..PciConfig::new()
        };

        let access = discover(
            Firmware {
                mcfg: &mcfg,
                mapper: Some(&mapper),
                legacy: Some(Arc::new(FakePlatform::new().legacy_ports())),
            },
            &config,
        )
        .unwrap();
        assert_eq!(access.domain(0).unwrap().mechanism().name(), "legacy");
    }

    #[test]
    fn memory_mode_never_uses_ports() {
        let config = PciConfig {
            mode: AccessMode::Memory,
            ..PciConfig::new()
        };
        let result = discover(
            Firmware {
                mcfg: &[],
                mapper: None,
                legacy: Some(Arc::new(FakePlatform::new().legacy_ports())),
            },
            &config,
        );
        assert_eq!(result.err(), Some(PciError::NoDomains));
    }

    #[test]
    fn nothing_available() {
        let result = discover(Firmware::default(), &PciConfig::new());
        assert_eq!(result.err(), Some(PciError::NoDomains));
    }
}
