//! Driver-facing handle to one function's configuration space.

use crate::access::ConfigAccess;
use crate::address::{Address, Id};
use crate::bar::{self, Bar};
use crate::capability::{CapabilityList, walk_capabilities};
use crate::class::ClassCode;
use crate::error::PciError;
use crate::regs::{self, Command, HeaderType, Status};

/// A function bound to the access layer that reaches it.
#[derive(Debug, Clone, Copy)]
pub struct Function<'a> {
    access: &'a ConfigAccess,
    address: Address,
}

impl<'a> Function<'a> {
    /// Binds `address` to `access`. No register is touched.
    #[must_use]
    pub const fn new(access: &'a ConfigAccess, address: Address) -> Self {
        Self { access, address }
    }

    /// The function's address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Reads the vendor/device pair.
    ///
    /// # Errors
    ///
    /// Propagates access errors from [`ConfigAccess`].
    pub fn id(&self) -> Result<Id, PciError> {
        self.read32(regs::VENDOR_ID).map(Id::from_dword)
    }

    /// Reads the revision ID.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn revision(&self) -> Result<u8, PciError> {
        self.read8(regs::REVISION_ID)
    }

    /// Reads the class code triple.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn class_code(&self) -> Result<ClassCode, PciError> {
        self.read32(regs::REVISION_ID).map(ClassCode::from_dword)
    }

    /// Reads the header type register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn header_type(&self) -> Result<HeaderType, PciError> {
        self.read8(regs::HEADER_TYPE).map(HeaderType)
    }

    /// Reads the interrupt line register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn interrupt_line(&self) -> Result<u8, PciError> {
        self.read8(regs::INTERRUPT_LINE)
    }

    /// Reads the interrupt pin register (0 = none, 1-4 = INTA#-INTD#).
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn interrupt_pin(&self) -> Result<u8, PciError> {
        self.read8(regs::INTERRUPT_PIN)
    }

    /// Reads the subsystem vendor/device pair.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn subsystem_id(&self) -> Result<Id, PciError> {
        self.read32(regs::SUBSYSTEM_VENDOR_ID).map(Id::from_dword)
    }

    /// Reads the command register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn command(&self) -> Result<Command, PciError> {
        self.read16(regs::COMMAND).map(Command::from_bits_retain)
    }

    /// Writes the command register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn set_command(&self, command: Command) -> Result<(), PciError> {
        self.write16(regs::COMMAND, command.bits())
    }

    /// Reads the status register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn status(&self) -> Result<Status, PciError> {
        self.read16(regs::STATUS).map(Status::from_bits_retain)
    }

    fn update_command(&self, set: Command, clear: Command) -> Result<(), PciError> {
        let command = self.command()?;
        self.set_command((command | set) - clear)
    }

    /// Enables bus mastering (DMA).
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn enable_bus_mastering(&self) -> Result<(), PciError> {
        self.update_command(Command::BUS_MASTER, Command::empty())
    }

    /// Disables bus mastering.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn disable_bus_mastering(&self) -> Result<(), PciError> {
        self.update_command(Command::empty(), Command::BUS_MASTER)
    }

    /// Enables memory space decoding.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn enable_memory_space(&self) -> Result<(), PciError> {
        self.update_command(Command::MEMORY_SPACE, Command::empty())
    }

    /// Enables I/O space decoding.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn enable_io_space(&self) -> Result<(), PciError> {
        self.update_command(Command::IO_SPACE, Command::empty())
    }

    /// Masks or unmasks legacy INTx# assertion.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn set_interrupt_disable(&self, disable: bool) -> Result<(), PciError> {
        if disable {
            self.update_command(Command::INTERRUPT_DISABLE, Command::empty())
        } else {
            self.update_command(Command::empty(), Command::INTERRUPT_DISABLE)
        }
    }

    /// Decodes BAR `index`.
    ///
    /// # Errors
    ///
    /// Returns [`PciError::InvalidBar`] for slots the header does not have.
    pub fn bar(&self, index: u8) -> Result<Bar, PciError> {
        bar::read_bar(self.access, self.address, self.header_type()?, index)
    }

    /// Decodes every BAR.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn bars(&self) -> Result<[Bar; 6], PciError> {
        bar::read_bars(self.access, self.address, self.header_type()?)
    }

    /// Walks the capability list from the current status register.
    ///
    /// # Errors
    ///
    /// Propagates the error from reading the status register; faults in the
    /// list itself are reported in [`CapabilityList::fault`].
    pub fn capabilities(&self) -> Result<CapabilityList, PciError> {
        let status = self.status()?;
        Ok(walk_capabilities(self.access, self.address, status))
    }

    /// Reads an 8-bit register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn read8(&self, offset: u16) -> Result<u8, PciError> {
        self.access.read8(self.address, offset)
    }

    /// Reads a 16-bit register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn read16(&self, offset: u16) -> Result<u16, PciError> {
        self.access.read16(self.address, offset)
    }

    /// Reads a 32-bit register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn read32(&self, offset: u16) -> Result<u32, PciError> {
        self.access.read32(self.address, offset)
    }

    /// Writes an 8-bit register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn write8(&self, offset: u16, value: u8) -> Result<(), PciError> {
        self.access.write8(self.address, offset, value)
    }

    /// Writes a 16-bit register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn write16(&self, offset: u16, value: u16) -> Result<(), PciError> {
        self.access.write16(self.address, offset, value)
    }

    /// Writes a 32-bit register.
    ///
    /// # Errors
    ///
    /// Propagates access errors.
    pub fn write32(&self, offset: u16, value: u32) -> Result<(), PciError> {
        self.access.write32(self.address, offset, value)
    }
}
