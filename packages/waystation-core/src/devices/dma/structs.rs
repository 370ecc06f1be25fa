//! Decoded forms of the DMA channel registers

/// Transfer direction relative to main RAM
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    ToRam = 0,
    FromRam = 1,
}

/// Address step applied after every word
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Step {
    Increment = 0,
    Decrement = 1,
}

/// Transfer synchronization mode
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sync {
    /// Whole transfer starts when the trigger bit is set
    Manual = 0,
    /// Blocks transferred on peripheral request
    Request = 1,
    /// Chain of header-linked packets (GPU command lists)
    LinkedList = 2,
}

/// One DMA channel: a base address, a block layout and the decomposed
/// control word.
pub struct Channel {
    enable: bool,
    trigger: bool,
    direction: Direction,
    step: Step,
    sync: Sync,
    /// Chopping: burst pause control. Stored and read back, not honored.
    chop: bool,
    chop_dma_size: u8,
    chop_cpu_size: u8,
    /// Read-write bits of the control word with no known function
    dummy: u8,
    /// Transfer start address, 24 bits
    base: u32,
    /// Block size in words (manual and request modes)
    block_size: u16,
    /// Number of blocks (request mode only)
    block_count: u16,
}

impl Channel {
    pub fn new() -> Channel {
        Channel {
            enable: false,
            trigger: false,
            direction: Direction::ToRam,
            step: Step::Increment,
            sync: Sync::Manual,
            chop: false,
            chop_dma_size: 0,
            chop_cpu_size: 0,
            dummy: 0,
            base: 0,
            block_size: 0,
            block_count: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn sync(&self) -> Sync {
        self.sync
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn set_base(&mut self, value: u32) {
        self.base = value & 0xFF_FFFF;
    }

    pub fn block_control(&self) -> u32 {
        u32::from(self.block_count) << 16 | u32::from(self.block_size)
    }

    pub fn set_block_control(&mut self, value: u32) {
        self.block_size = value as u16;
        self.block_count = (value >> 16) as u16;
    }

    pub fn control(&self) -> u32 {
        let mut control = 0u32;

        control |= self.direction as u32;
        control |= (self.step as u32) << 1;
        control |= u32::from(self.chop) << 8;
        control |= (self.sync as u32) << 9;
        control |= u32::from(self.chop_dma_size) << 16;
        control |= u32::from(self.chop_cpu_size) << 20;
        control |= u32::from(self.enable) << 24;
        control |= u32::from(self.trigger) << 28;
        control |= u32::from(self.dummy) << 29;

        control
    }

    pub fn set_control(&mut self, value: u32) {
        self.direction = if value & 1 != 0 {
            Direction::FromRam
        } else {
            Direction::ToRam
        };
        self.step = if value & 2 != 0 {
            Step::Decrement
        } else {
            Step::Increment
        };
        self.chop = value & (1 << 8) != 0;
        self.sync = match (value >> 9) & 3 {
            0 => Sync::Manual,
            1 => Sync::Request,
            2 => Sync::LinkedList,
            _ => {
                log::warn!("DMA channel configured with reserved sync mode 3");
                Sync::Manual
            }
        };
        self.chop_dma_size = ((value >> 16) & 7) as u8;
        self.chop_cpu_size = ((value >> 20) & 7) as u8;
        self.enable = value & (1 << 24) != 0;
        self.trigger = value & (1 << 28) != 0;
        self.dummy = ((value >> 29) & 3) as u8;
    }

    /// A channel is active once enabled, with the manual mode additionally
    /// gated on the trigger bit.
    pub fn active(&self) -> bool {
        let triggered = match self.sync {
            Sync::Manual => self.trigger,
            _ => true,
        };

        self.enable && triggered
    }

    /// Transfer length in words, or None for linked-list transfers whose
    /// length is discovered while following the chain.
    pub fn transfer_size(&self) -> Option<u32> {
        let size = u32::from(self.block_size);
        let count = u32::from(self.block_count);

        match self.sync {
            // a block size of 0 means the maximum, 0x10000 words
            Sync::Manual => Some(if size == 0 { 0x1_0000 } else { size }),
            Sync::Request => Some(size * count),
            Sync::LinkedList => None,
        }
    }

    /// Mark the transfer finished. Enable and trigger drop together.
    pub fn done(&mut self) {
        self.enable = false;
        self.trigger = false;
    }
}

impl Default for Channel {
    fn default() -> Channel {
        Channel::new()
    }
}
