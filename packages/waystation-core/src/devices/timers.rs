//! The three programmable hardware timers.
//!
//! Each timer is a 16-bit counter driven by a selectable clock source. The
//! counters do not tick in real time: the machine loop hands the block the
//! number of CPU cycles the last instruction consumed and each timer
//! converts those to ticks of its own clock, carrying the fractional
//! remainder between calls so non-integer ratios stay exact over time.

use super::irq::{Interrupt, IrqHandle};

/// The CPU clock, in Hz
pub const CPU_HZ: f64 = 33_868_800.0;

/// The GPU pixel clock. NTSC video clock divided by 8, a fixed
/// approximation since no real display timing crosses the renderer
/// interface.
const DOTCLOCK_HZ: f64 = 53_222_400.0 / 8.0;

/// NTSC horizontal retrace rate
const HSYNC_HZ: f64 = 15_734.0;

bitflags! {
    /// Configuration half of a timer mode register. The dynamic bits
    /// (interrupt request, reached-target, reached-overflow) are kept
    /// outside the flags and merged in when the register is read.
    pub struct TimerMode: u16 {
        /// Gate counting on a blanking signal
        const SYNC_ENABLE = 0x0001;
        /// Which blanking signal, and how to react to it
        const SYNC_MODE = 0x0006;
        /// Reset the counter when it reaches the target value
        const RESET_ON_TARGET = 0x0008;
        /// Request an interrupt when the counter reaches the target
        const IRQ_ON_TARGET = 0x0010;
        /// Request an interrupt when the counter wraps past 0xFFFF
        const IRQ_ON_OVERFLOW = 0x0020;
        /// Re-arm the interrupt after it fires instead of one-shot
        const IRQ_REPEAT = 0x0040;
        /// Toggle the interrupt request bit instead of pulsing it
        const IRQ_TOGGLE = 0x0080;
        /// Clock source selector, meaning depends on the timer instance
        const CLOCK_SOURCE = 0x0300;
    }
}

/// Mode register read-back bit positions for the dynamic flags
const MODE_IRQ_REQUEST: u16 = 1 << 10;
const MODE_REACHED_TARGET: u16 = 1 << 11;
const MODE_REACHED_OVERFLOW: u16 = 1 << 12;

struct Timer {
    /// Timer instance number, 0-2. Decides the clock-source menu and the
    /// interrupt line.
    instance: usize,
    /// Free-running 16-bit counter
    counter: u16,
    /// Counter target value
    target: u16,
    /// Configuration bits of the mode register
    mode: TimerMode,
    /// Set when the counter reaches the target. Sticky: survives until the
    /// next mode-register write.
    reached_target: bool,
    /// Set when the counter wraps past 0xFFFF. Sticky as above.
    reached_overflow: bool,
    /// Mirror of mode bit 10
    irq_request: bool,
    /// Fractional ticks carried over from the previous step
    frac: f64,
    /// One-time warning latch for unimplemented sync modes
    sync_warned: bool,
}

impl Timer {
    fn new(instance: usize) -> Timer {
        Timer {
            instance,
            counter: 0,
            target: 0,
            mode: TimerMode::empty(),
            reached_target: false,
            reached_overflow: false,
            irq_request: false,
            frac: 0.0,
            sync_warned: false,
        }
    }

    fn interrupt(&self) -> Interrupt {
        match self.instance {
            0 => Interrupt::Timer0,
            1 => Interrupt::Timer1,
            _ => Interrupt::Timer2,
        }
    }

    /// Ticks of this timer's clock per CPU cycle
    fn tick_ratio(&self) -> f64 {
        let source = (self.mode & TimerMode::CLOCK_SOURCE).bits() >> 8;

        let hz = match (self.instance, source) {
            (0, 1) | (0, 3) => DOTCLOCK_HZ,
            (1, 1) | (1, 3) => HSYNC_HZ,
            (2, 2) | (2, 3) => CPU_HZ / 8.0,
            _ => CPU_HZ,
        };

        hz / CPU_HZ
    }

    fn read_mode(&self) -> u16 {
        let mut value = self.mode.bits();

        if self.irq_request {
            value |= MODE_IRQ_REQUEST;
        }
        if self.reached_target {
            value |= MODE_REACHED_TARGET;
        }
        if self.reached_overflow {
            value |= MODE_REACHED_OVERFLOW;
        }

        value
    }

    /// A mode write reconfigures the timer and acknowledges everything:
    /// both sticky flags, the request bit and the pending line at the
    /// interrupt controller.
    fn write_mode(&mut self, value: u16, irq: &IrqHandle) {
        self.mode = TimerMode::from_bits_truncate(value);
        self.reached_target = false;
        self.reached_overflow = false;
        self.irq_request = false;
        irq.clear(self.interrupt());

        if self.mode.contains(TimerMode::SYNC_ENABLE) && !self.sync_warned {
            log::warn!(
                "timer {}: sync mode {} not modelled, counting free-run",
                self.instance,
                (self.mode & TimerMode::SYNC_MODE).bits() >> 1
            );
            self.sync_warned = true;
        }
    }

    fn step(&mut self, cpu_cycles: u32, irq: &IrqHandle) {
        let total = self.frac + f64::from(cpu_cycles) * self.tick_ratio();
        let ticks = total.floor();
        self.frac = total - ticks;

        let ticks = ticks as u64;
        if ticks == 0 {
            return;
        }

        let start = u64::from(self.counter);
        let end = start + ticks;

        // Next occurrence of the target value strictly after the current
        // counter position
        let target = u64::from(self.target);
        let next_target = if target > start {
            target
        } else {
            target + 0x1_0000
        };

        if end >= next_target {
            self.reached_target = true;
        }
        if end > 0xFFFF {
            self.reached_overflow = true;
        }

        let reset = self.mode.contains(TimerMode::RESET_ON_TARGET) && end >= next_target;
        self.counter = if reset { 0 } else { (end & 0xFFFF) as u16 };

        let wants_irq = (self.reached_target && self.mode.contains(TimerMode::IRQ_ON_TARGET))
            || (self.reached_overflow && self.mode.contains(TimerMode::IRQ_ON_OVERFLOW));

        if wants_irq && !self.irq_request {
            self.irq_request = true;
            irq.request(self.interrupt());
        }
    }
}

/// The timer block: three timers behind one register window
pub struct Timers {
    timers: [Timer; 3],
    irq: IrqHandle,
}

impl Timers {
    pub fn new(irq: IrqHandle) -> Timers {
        Timers {
            timers: [Timer::new(0), Timer::new(1), Timer::new(2)],
            irq,
        }
    }

    /// Register read. `offset` is relative to the timer block base: bits
    /// 5:4 select the timer, bits 3:0 the register (0 counter, 4 mode,
    /// 8 target).
    pub fn load(&self, offset: u32) -> u32 {
        let timer = &self.timers[(offset as usize >> 4) & 3];

        match offset & 0xF {
            0x0 => u32::from(timer.counter),
            0x4 => u32::from(timer.read_mode()),
            0x8 => u32::from(timer.target),
            _ => {
                log::warn!("read from unhandled timer register 0x{:x}", offset);
                0
            }
        }
    }

    pub fn store(&mut self, offset: u32, value: u32) {
        let timer = &mut self.timers[(offset as usize >> 4) & 3];
        let value = value as u16;

        match offset & 0xF {
            0x0 => timer.counter = value,
            0x4 => timer.write_mode(value, &self.irq),
            0x8 => timer.target = value,
            _ => log::warn!("write to unhandled timer register 0x{:x}", offset),
        }
    }

    /// Advance all three timers by the given number of CPU cycles
    pub fn step(&mut self, cpu_cycles: u32) {
        for timer in self.timers.iter_mut() {
            timer.step(cpu_cycles, &self.irq);
        }
    }
}
