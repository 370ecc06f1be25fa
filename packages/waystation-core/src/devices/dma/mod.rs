//! The direct-memory-access engine: seven channels, a priority register
//! and an interrupt register.
//!
//! This module only models the register file. The transfers themselves are
//! executed synchronously by the bus the moment a register write makes a
//! channel active, because a drain needs simultaneous access to RAM and
//! the target peripheral.

pub mod structs;

pub use structs::{Channel, Direction, Step, Sync};

/// The peripheral wired to each DMA channel, by channel number
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Port {
    /// Macroblock decoder input
    MdecIn = 0,
    /// Macroblock decoder output
    MdecOut = 1,
    Gpu = 2,
    CdRom = 3,
    Spu = 4,
    /// Extension port
    Pio = 5,
    /// Ordering-table clear unit
    Otc = 6,
}

impl Port {
    pub fn from_index(index: u32) -> Port {
        match index {
            0 => Port::MdecIn,
            1 => Port::MdecOut,
            2 => Port::Gpu,
            3 => Port::CdRom,
            4 => Port::Spu,
            5 => Port::Pio,
            6 => Port::Otc,
            _ => unreachable!("DMA channel index out of range: {}", index),
        }
    }
}

pub struct Dma {
    /// Priority/enable register. Only stored and read back.
    control: u32,

    /// Master enable for channel interrupts
    irq_master_enable: bool,
    /// Per-channel interrupt enable, bits 0-6
    irq_channel_enable: u8,
    /// Per-channel interrupt flags, bits 0-6. Write 1 to acknowledge.
    irq_channel_flags: u8,
    /// Force the master flag regardless of channel state
    irq_force: bool,
    /// Read-write bits with no function
    irq_dummy: u8,

    channels: [Channel; 7],
}

impl Dma {
    pub fn new() -> Dma {
        Dma {
            // reset value of the priority register
            control: 0x0765_4321,
            irq_master_enable: false,
            irq_channel_enable: 0,
            irq_channel_flags: 0,
            irq_force: false,
            irq_dummy: 0,
            channels: Default::default(),
        }
    }

    pub fn channel(&self, port: Port) -> &Channel {
        &self.channels[port as usize]
    }

    pub fn channel_mut(&mut self, port: Port) -> &mut Channel {
        &mut self.channels[port as usize]
    }

    /// The computed master interrupt flag, bit 31 of the interrupt register
    fn irq_active(&self) -> bool {
        let channels = self.irq_channel_flags & self.irq_channel_enable;
        self.irq_force || (self.irq_master_enable && channels != 0)
    }

    fn interrupt(&self) -> u32 {
        let mut value = 0u32;

        value |= u32::from(self.irq_dummy);
        value |= u32::from(self.irq_force) << 15;
        value |= u32::from(self.irq_channel_enable) << 16;
        value |= u32::from(self.irq_master_enable) << 23;
        value |= u32::from(self.irq_channel_flags) << 24;
        value |= u32::from(self.irq_active()) << 31;

        value
    }

    fn set_interrupt(&mut self, value: u32) {
        self.irq_dummy = (value & 0x3F) as u8;
        self.irq_force = value & (1 << 15) != 0;
        self.irq_channel_enable = ((value >> 16) & 0x7F) as u8;
        self.irq_master_enable = value & (1 << 23) != 0;

        // writing 1 to a flag bit acknowledges it
        let ack = ((value >> 24) & 0x7F) as u8;
        self.irq_channel_flags &= !ack;
    }

    /// Whether a completion interrupt would be delivered for this channel.
    /// The drains do not raise completion interrupts yet, so this only
    /// feeds the register read-back.
    pub fn channel_irq_enabled(&self, port: Port) -> bool {
        self.irq_master_enable && self.irq_channel_enable & (1 << port as u8) != 0
    }

    /// Register read. `offset` is relative to the DMA block base.
    pub fn load(&self, offset: u32) -> u32 {
        let major = (offset >> 4) & 7;
        let minor = offset & 0xF;

        match major {
            0..=6 => {
                let channel = self.channel(Port::from_index(major));
                match minor {
                    0x0 => channel.base(),
                    0x4 => channel.block_control(),
                    0x8 => channel.control(),
                    _ => {
                        log::warn!("read from unhandled DMA register 0x{:x}", offset);
                        0
                    }
                }
            }
            7 => match minor {
                0x0 => self.control,
                0x4 => self.interrupt(),
                _ => {
                    log::warn!("read from unhandled DMA register 0x{:x}", offset);
                    0
                }
            },
            _ => unreachable!(),
        }
    }

    /// Register write. Returns the port of a channel this write switched
    /// to active, so the bus can drain it immediately.
    pub fn store(&mut self, offset: u32, value: u32) -> Option<Port> {
        let major = (offset >> 4) & 7;
        let minor = offset & 0xF;

        match major {
            0..=6 => {
                let port = Port::from_index(major);
                let channel = self.channel_mut(port);

                match minor {
                    0x0 => channel.set_base(value),
                    0x4 => channel.set_block_control(value),
                    0x8 => channel.set_control(value),
                    _ => {
                        log::warn!("write to unhandled DMA register 0x{:x}", offset);
                        return None;
                    }
                }

                if channel.active() {
                    Some(port)
                } else {
                    None
                }
            }
            7 => {
                match minor {
                    0x0 => self.control = value,
                    0x4 => self.set_interrupt(value),
                    _ => log::warn!("write to unhandled DMA register 0x{:x}", offset),
                }
                None
            }
            _ => unreachable!(),
        }
    }
}

impl Default for Dma {
    fn default() -> Dma {
        Dma::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_register_has_reset_value() {
        let dma = Dma::new();
        assert_eq!(dma.load(0x70), 0x0765_4321);
    }

    #[test]
    fn control_write_reports_activation() {
        let mut dma = Dma::new();

        assert_eq!(dma.store(0x60, 0x100), None, "base write must not activate");
        let port = dma.store(0x68, 0x1100_0000);
        assert_eq!(port, Some(Port::Otc), "manual enable+trigger activates");
    }

    #[test]
    fn interrupt_flags_ack_on_write() {
        let mut dma = Dma::new();
        dma.irq_channel_flags = 0x7F;

        dma.store(0x74, 0x0500_0000);
        let flags = (dma.load(0x74) >> 24) & 0x7F;
        assert_eq!(flags, 0x7A, "written bits acknowledge");
    }

    #[test]
    fn master_flag_computation() {
        let mut dma = Dma::new();

        // force bit alone raises the master flag
        dma.store(0x74, 1 << 15);
        assert_ne!(dma.load(0x74) & (1 << 31), 0);

        // enabled channel flag with master enable
        dma.store(0x74, (1 << 23) | (1 << 16));
        dma.irq_channel_flags = 1;
        assert_ne!(dma.load(0x74) & (1 << 31), 0);

        // same flag without master enable
        dma.store(0x74, 1 << 16);
        assert_eq!(dma.load(0x74) & (1 << 31), 0);
    }
}
