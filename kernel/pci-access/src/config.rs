//! PCI subsystem configuration.
//!
//! Defaults are compile-time constants; the boot sequence may override them
//! from the kernel command line with [`PciConfig::from_cmdline`].

use log::warn;

/// Which access mechanisms discovery may bind to domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Use ECAM windows when MCFG describes any, otherwise legacy ports.
    Auto,
    /// Legacy ports only; MCFG entries are ignored.
    Legacy,
    /// ECAM only; no legacy fallback.
    Memory,
}

impl AccessMode {
    /// Returns `true` if ECAM windows may be used.
    #[must_use]
    pub const fn allows_memory(self) -> bool {
        matches!(self, Self::Auto | Self::Memory)
    }

    /// Returns `true` if the legacy ports may be used.
    #[must_use]
    pub const fn allows_legacy(self) -> bool {
        matches!(self, Self::Auto | Self::Legacy)
    }
}

/// How the enumerator chooses which buses to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Scan every bus in each domain's range, plus buses behind bridges.
    Exhaustive,
    /// Start at each domain's root bus (one per host-controller function
    /// when 0:0.0 is multi-function) and follow bridges only.
    Recursive,
}

/// Tunables for discovery and enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciConfig {
    /// Mechanisms discovery may use.
    pub mode: AccessMode,
    /// Bus selection strategy.
    pub scan: ScanStrategy,
    /// Skip functions 1-7 when function 0 lacks the multi-function bit.
    pub honor_multifunction: bool,
}

impl PciConfig {
    /// The default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: AccessMode::Auto,
            scan: ScanStrategy::Exhaustive,
            honor_multifunction: true,
        }
    }

    /// Applies `pci=`, `pci_scan=`, and `pci_multifunction=` options from a
    /// kernel command line on top of the defaults.
    ///
    /// Unknown values for these keys are reported and ignored; other keys
    /// belong to other subsystems and are skipped silently.
    #[must_use]
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::new();
        for (key, value) in cmdline.split_whitespace().filter_map(|arg| arg.split_once('=')) {
            match key {
                "pci" => match value {
                    "auto" => config.mode = AccessMode::Auto,
                    "io" | "legacy" => config.mode = AccessMode::Legacy,
                    "ecam" | "mmio" => config.mode = AccessMode::Memory,
                    _ => warn!("PCI: ignoring unknown access mode '{value}'"),
                },
                "pci_scan" => match value {
                    "exhaustive" => config.scan = ScanStrategy::Exhaustive,
                    "recursive" => config.scan = ScanStrategy::Recursive,
                    _ => warn!("PCI: ignoring unknown scan strategy '{value}'"),
                },
                "pci_multifunction" => match value {
                    "on" => config.honor_multifunction = true,
                    "off" => config.honor_multifunction = false,
                    _ => warn!("PCI: ignoring pci_multifunction={value}"),
                },
                _ => {}
            }
        }
        config
    }
}

impl Default for PciConfig {
    fn default() -> Self {
        Self::new()
    }
}
