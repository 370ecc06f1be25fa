//! The bus router.
//!
//! Every load and store the CPU issues lands here. The virtual address is
//! masked down to a physical one, matched against the memory map, and
//! dispatched to the owning device. The bus also owns every peripheral,
//! which is what lets it run DMA drains synchronously: a store that
//! activates a channel is not acknowledged until the whole transfer has
//! been pumped between RAM and the peripheral.

use std::collections::HashSet;

use super::cdrom::CdRom;
use super::dma::{Direction, Dma, Port, Step, Sync};
use super::gpu::renderer::Renderer;
use super::gpu::Gpu;
use super::irq::{Interrupt, InterruptController};
use super::mem::{Bios, Ram, RAM_SIZE, SCRATCHPAD_SIZE};
use super::timers::Timers;

/// Mask applied to virtual addresses by region, indexed by the top three
/// address bits. KUSEG and KSEG2 pass through, KSEG0 strips the top bit,
/// KSEG1 strips the top three.
const REGION_MASK: [u32; 8] = [
    0xFFFF_FFFF,
    0xFFFF_FFFF,
    0xFFFF_FFFF,
    0xFFFF_FFFF,
    0x7FFF_FFFF,
    0x1FFF_FFFF,
    0xFFFF_FFFF,
    0xFFFF_FFFF,
];

pub fn mask_region(address: u32) -> u32 {
    address & REGION_MASK[(address >> 29) as usize]
}

pub mod map {
    /// A half-open physical address range
    pub struct Range {
        start: u32,
        length: u32,
    }

    impl Range {
        pub const fn new(start: u32, length: u32) -> Range {
            Range { start, length }
        }

        /// Offset of `address` within this range, or None if it falls
        /// outside
        pub fn contains(&self, address: u32) -> Option<u32> {
            if address >= self.start && address < self.start + self.length {
                Some(address - self.start)
            } else {
                None
            }
        }
    }

    pub const RAM: Range = Range::new(0x0000_0000, 2 * 1024 * 1024);
    pub const EXPANSION_1: Range = Range::new(0x1F00_0000, 512 * 1024);
    pub const SCRATCHPAD: Range = Range::new(0x1F80_0000, 1024);
    pub const MEM_CONTROL: Range = Range::new(0x1F80_1000, 0x60);
    pub const RAM_SIZE: Range = Range::new(0x1F80_1060, 4);
    pub const IRQ_CONTROL: Range = Range::new(0x1F80_1070, 8);
    pub const DMA: Range = Range::new(0x1F80_1080, 0x80);
    pub const TIMERS: Range = Range::new(0x1F80_1100, 0x30);
    pub const CDROM: Range = Range::new(0x1F80_1800, 4);
    pub const GPU: Range = Range::new(0x1F80_1810, 8);
    pub const SPU: Range = Range::new(0x1F80_1C00, 640);
    pub const EXPANSION_2: Range = Range::new(0x1F80_2000, 0x80);
    pub const BIOS: Range = Range::new(0x1FC0_0000, 512 * 1024);
    pub const CACHE_CONTROL: Range = Range::new(0xFFFE_0130, 4);

    /// The device a physical address belongs to
    pub enum Device {
        Ram,
        Scratchpad,
        Bios,
        MemControl,
        RamSize,
        CacheControl,
        IrqControl,
        Dma,
        Timers,
        CdRom,
        Gpu,
        Spu,
        Expansion1,
        Expansion2,
        Unmapped,
    }

    /// Match a physical address to its device and local offset. Unmapped
    /// addresses return themselves as the offset for diagnostics.
    pub fn match_addr(address: u32) -> (Device, u32) {
        if let Some(offset) = RAM.contains(address) {
            (Device::Ram, offset)
        } else if let Some(offset) = BIOS.contains(address) {
            (Device::Bios, offset)
        } else if let Some(offset) = SCRATCHPAD.contains(address) {
            (Device::Scratchpad, offset)
        } else if let Some(offset) = GPU.contains(address) {
            (Device::Gpu, offset)
        } else if let Some(offset) = DMA.contains(address) {
            (Device::Dma, offset)
        } else if let Some(offset) = IRQ_CONTROL.contains(address) {
            (Device::IrqControl, offset)
        } else if let Some(offset) = TIMERS.contains(address) {
            (Device::Timers, offset)
        } else if let Some(offset) = CDROM.contains(address) {
            (Device::CdRom, offset)
        } else if let Some(offset) = SPU.contains(address) {
            (Device::Spu, offset)
        } else if let Some(offset) = RAM_SIZE.contains(address) {
            (Device::RamSize, offset)
        } else if let Some(offset) = MEM_CONTROL.contains(address) {
            (Device::MemControl, offset)
        } else if let Some(offset) = CACHE_CONTROL.contains(address) {
            (Device::CacheControl, offset)
        } else if let Some(offset) = EXPANSION_1.contains(address) {
            (Device::Expansion1, offset)
        } else if let Some(offset) = EXPANSION_2.contains(address) {
            (Device::Expansion2, offset)
        } else {
            (Device::Unmapped, address)
        }
    }
}

use map::Device;

pub struct Bus {
    ram: Ram,
    scratchpad: Ram,
    bios: Bios,
    irq: InterruptController,
    pub timers: Timers,
    pub gpu: Gpu,
    pub dma: Dma,
    pub cdrom: CdRom,
    /// Addresses already reported for known-ignored or unmapped traffic,
    /// so each one warns only once
    warned: HashSet<u32>,
}

impl Bus {
    pub fn new(bios: Bios, renderer: Box<dyn Renderer>) -> Bus {
        let irq = InterruptController::new();
        let timers = Timers::new(irq.handle());
        let cdrom = CdRom::new(irq.handle());

        Bus {
            ram: Ram::new(RAM_SIZE),
            scratchpad: Ram::new(SCRATCHPAD_SIZE),
            bios,
            irq,
            timers,
            gpu: Gpu::new(renderer),
            dma: Dma::new(),
            cdrom,
            warned: HashSet::new(),
        }
    }

    /// State of the single CPU interrupt line
    pub fn irq_active(&self) -> bool {
        self.irq.active()
    }

    /// Raise an interrupt line on behalf of the machine glue (the VBlank
    /// pacer)
    pub fn request_irq(&mut self, which: Interrupt) {
        self.irq.handle().request(which);
    }

    fn warn_once(&mut self, address: u32, what: &str) {
        if self.warned.insert(address) {
            log::warn!("{} at 0x{:08X}", what, address);
        }
    }

    pub fn load32(&mut self, address: u32) -> u32 {
        let physical = mask_region(address);

        match map::match_addr(physical) {
            (Device::Ram, offset) => self.ram.load32(offset),
            (Device::Scratchpad, offset) => self.scratchpad.load32(offset),
            (Device::Bios, offset) => self.bios.load32(offset),
            (Device::IrqControl, offset) => match offset {
                0 => u32::from(self.irq.status()),
                _ => u32::from(self.irq.mask()),
            },
            (Device::Dma, offset) => self.dma.load(offset),
            (Device::Timers, offset) => self.timers.load(offset),
            (Device::Gpu, offset) => match offset {
                0 => self.gpu.read(),
                _ => self.gpu.status(),
            },
            (Device::Expansion1, _) => 0xFFFF_FFFF,
            (Device::MemControl, _) | (Device::RamSize, _) | (Device::CacheControl, _) => 0,
            (Device::Spu, _) => 0,
            (Device::CdRom, _) => {
                self.warn_once(address, "32-bit read from the CD-ROM ports");
                0
            }
            (Device::Expansion2, _) | (Device::Unmapped, _) => {
                self.warn_once(address, "32-bit read from unmapped address");
                0
            }
        }
    }

    pub fn load16(&mut self, address: u32) -> u16 {
        let physical = mask_region(address);

        match map::match_addr(physical) {
            (Device::Ram, offset) => self.ram.load16(offset),
            (Device::Scratchpad, offset) => self.scratchpad.load16(offset),
            (Device::Bios, offset) => self.bios.load16(offset),
            (Device::IrqControl, offset) => match offset {
                0 => self.irq.status(),
                _ => self.irq.mask(),
            },
            (Device::Timers, offset) => self.timers.load(offset) as u16,
            (Device::Spu, _) => 0,
            _ => {
                self.warn_once(address, "16-bit read from unhandled address");
                0
            }
        }
    }

    pub fn load8(&mut self, address: u32) -> u8 {
        let physical = mask_region(address);

        match map::match_addr(physical) {
            (Device::Ram, offset) => self.ram.load8(offset),
            (Device::Scratchpad, offset) => self.scratchpad.load8(offset),
            (Device::Bios, offset) => self.bios.load8(offset),
            (Device::CdRom, offset) => self.cdrom.load8(offset),
            (Device::Expansion1, _) => 0xFF,
            _ => {
                self.warn_once(address, "8-bit read from unhandled address");
                0
            }
        }
    }

    pub fn store32(&mut self, address: u32, value: u32) {
        let physical = mask_region(address);

        match map::match_addr(physical) {
            (Device::Ram, offset) => self.ram.store32(offset, value),
            (Device::Scratchpad, offset) => self.scratchpad.store32(offset, value),
            (Device::Bios, _) => {
                self.warn_once(address, "dropped store to the boot ROM");
            }
            (Device::IrqControl, offset) => match offset {
                0 => self.irq.ack(value as u16),
                _ => self.irq.set_mask(value as u16),
            },
            (Device::Dma, offset) => {
                if let Some(port) = self.dma.store(offset, value) {
                    self.do_dma(port);
                }
            }
            (Device::Timers, offset) => self.timers.store(offset, value),
            (Device::Gpu, offset) => match offset {
                0 => self.gpu.gp0(value),
                _ => self.gpu.gp1(value),
            },
            (Device::CacheControl, _) => (),
            (Device::MemControl, offset) => self.mem_control_store(address, offset, value),
            (Device::RamSize, _) => {
                self.warn_once(address, "ignored store to the RAM-size register");
            }
            (Device::Spu, _) => (),
            (Device::Expansion2, _) => {
                self.warn_once(address, "ignored store to expansion 2");
            }
            (Device::CdRom, _) | (Device::Expansion1, _) | (Device::Unmapped, _) => {
                self.warn_once(address, "32-bit store to unhandled address");
            }
        }
    }

    pub fn store16(&mut self, address: u32, value: u16) {
        let physical = mask_region(address);

        match map::match_addr(physical) {
            (Device::Ram, offset) => self.ram.store16(offset, value),
            (Device::Scratchpad, offset) => self.scratchpad.store16(offset, value),
            (Device::IrqControl, offset) => match offset {
                0 => self.irq.ack(value),
                _ => self.irq.set_mask(value),
            },
            (Device::Timers, offset) => self.timers.store(offset, u32::from(value)),
            (Device::Spu, _) => (),
            (Device::Bios, _) => {
                self.warn_once(address, "dropped store to the boot ROM");
            }
            _ => {
                self.warn_once(address, "16-bit store to unhandled address");
            }
        }
    }

    pub fn store8(&mut self, address: u32, value: u8) {
        let physical = mask_region(address);

        match map::match_addr(physical) {
            (Device::Ram, offset) => self.ram.store8(offset, value),
            (Device::Scratchpad, offset) => self.scratchpad.store8(offset, value),
            (Device::CdRom, offset) => self.cdrom.store8(offset, value),
            (Device::Expansion2, _) => {
                self.warn_once(address, "ignored store to expansion 2");
            }
            (Device::Bios, _) => {
                self.warn_once(address, "dropped store to the boot ROM");
            }
            _ => {
                self.warn_once(address, "8-bit store to unhandled address");
            }
        }
    }

    /// Memory-control stores configure expansion mapping and bus timings.
    /// None of that is modelled, but a write that tries to move the
    /// expansion base addresses somewhere unexpected deserves more than a
    /// generic warning.
    fn mem_control_store(&mut self, address: u32, offset: u32, value: u32) {
        match offset {
            0 => {
                if value != 0x1F00_0000 {
                    log::warn!("expansion 1 base rebased to 0x{:08X}", value);
                }
            }
            4 => {
                if value != 0x1F80_2000 {
                    log::warn!("expansion 2 base rebased to 0x{:08X}", value);
                }
            }
            _ => self.warn_once(address, "ignored store to memory control"),
        }
    }

    /// Run a newly activated DMA channel to completion
    fn do_dma(&mut self, port: Port) {
        match self.dma.channel(port).sync() {
            Sync::LinkedList => self.do_dma_linked_list(port),
            _ => self.do_dma_block(port),
        }
    }

    fn do_dma_block(&mut self, port: Port) {
        let channel = self.dma.channel(port);
        let direction = channel.direction();
        let step = channel.step();
        let mut addr = channel.base();

        // block sizes are known for manual and request sync modes
        let mut remaining = channel.transfer_size().unwrap_or(0);

        while remaining > 0 {
            // addresses stay inside RAM and word-aligned as the counter
            // walks
            let current = addr & 0x1F_FFFC;

            match direction {
                Direction::FromRam => {
                    let word = self.ram.load32(current);

                    match port {
                        Port::Gpu => self.gpu.gp0(word),
                        _ => {
                            log::warn!("DMA word 0x{:08X} for unhandled port {:?}", word, port);
                        }
                    }
                }
                Direction::ToRam => {
                    let word = match port {
                        // the ordering-table clear writes a chain of
                        // headers, each pointing at the previous word
                        Port::Otc => {
                            if remaining == 1 {
                                // end-of-table marker
                                0x00FF_FFFF
                            } else {
                                addr.wrapping_sub(4) & 0x1F_FFFF
                            }
                        }
                        Port::Gpu => self.gpu.read(),
                        Port::CdRom => self.cdrom.dma_read_word(),
                        _ => {
                            log::warn!("DMA read from unhandled port {:?}", port);
                            0
                        }
                    };

                    self.ram.store32(current, word);
                }
            }

            addr = match step {
                Step::Increment => addr.wrapping_add(4),
                Step::Decrement => addr.wrapping_sub(4),
            };
            remaining -= 1;
        }

        self.dma.channel_mut(port).done();
    }

    fn do_dma_linked_list(&mut self, port: Port) {
        let channel = self.dma.channel(port);
        let mut addr = channel.base() & 0x1F_FFFC;

        if port != Port::Gpu || channel.direction() == Direction::ToRam {
            log::warn!("linked-list DMA only reaches the GPU from RAM");
            self.dma.channel_mut(port).done();
            return;
        }

        loop {
            // packet header: word count in the high byte, next header
            // address in the low 24 bits
            let header = self.ram.load32(addr);

            let mut count = header >> 24;
            let mut packet = addr;
            while count > 0 {
                packet = packet.wrapping_add(4) & 0x1F_FFFC;
                let word = self.ram.load32(packet);
                self.gpu.gp0(word);
                count -= 1;
            }

            let next = header & 0xFF_FFFF;
            if header & 0x80_0000 != 0 || next == 0xFF_FFFF {
                break;
            }
            addr = next & 0x1F_FFFC;
        }

        self.dma.channel_mut(port).done();
    }
}
