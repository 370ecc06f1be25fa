//! A struct representing the console as a whole unit.
//!
//! Ownership runs in one direction: the machine owns the CPU, the CPU
//! owns the bus, the bus owns the peripherals. The machine loop steps the
//! CPU one instruction at a time and feeds the consumed cycles to the
//! devices that keep their own time, then paces the frame counter that
//! stands in for the display engine's vertical retrace.

use std::path::Path;

use super::bus::Bus;
use super::cdrom::disc::DiscError;
use super::cpu::Cpu;
use super::exe::{Exe, ExeError};
use super::gpu::renderer::Renderer;
use super::irq::Interrupt;
use super::mem::{Bios, BiosError};
use super::timers::CPU_HZ;

/// CPU cycles per video frame, rounded from CPU_HZ / 60. The rasterizer
/// interface exposes no real video timing, so the vertical retrace is
/// derived from the CPU clock.
pub const CYCLES_PER_FRAME: u32 = (CPU_HZ / 60.0) as u32;

/// Address the boot ROM jumps to once its kernel is set up and it is
/// about to run the shell. Side-loaded executables take over here.
const SHELL_ENTRY: u32 = 0x8003_0000;

pub struct Psx {
    pub cpu: Cpu,
    /// Cycles accumulated toward the next vertical retrace
    frame_cycles: u32,
    /// Completed frames since power-on
    frames: u64,
    /// Executable waiting for the boot ROM to reach the shell
    pending_exe: Option<Exe>,
}

impl Psx {
    pub fn new(bios: Bios, renderer: Box<dyn Renderer>) -> Psx {
        let bus = Bus::new(bios, renderer);

        Psx {
            cpu: Cpu::new(bus),
            frame_cycles: 0,
            frames: 0,
            pending_exe: None,
        }
    }

    pub fn new_from_file(path: &Path, renderer: Box<dyn Renderer>) -> Result<Psx, BiosError> {
        let bios = Bios::new_from_file(path)?;
        log::info!("boot ROM loaded from {}", path.display());
        Ok(Psx::new(bios, renderer))
    }

    pub fn insert_disc(&mut self, path: &Path) -> Result<(), DiscError> {
        self.cpu.bus.cdrom.insert_disc(path)
    }

    /// Queue an executable for side-loading. It is injected once the
    /// boot ROM finishes initializing and reaches the shell entry point.
    pub fn sideload_exe(&mut self, path: &Path) -> Result<(), ExeError> {
        self.pending_exe = Some(Exe::new_from_file(path)?);
        Ok(())
    }

    /// Copy a queued executable into RAM and redirect the CPU into it
    fn inject_exe(&mut self, exe: Exe) {
        for i in 0..exe.memfill_len {
            self.cpu.bus.store8(exe.memfill_base.wrapping_add(i), 0);
        }

        for (i, &byte) in exe.text.iter().enumerate() {
            self.cpu.bus.store8(exe.base.wrapping_add(i as u32), byte);
        }

        // global pointer, stack pointer and frame pointer
        self.cpu.set_register(28, exe.initial_gp);
        if exe.initial_sp != 0 {
            self.cpu.set_register(29, exe.initial_sp);
            self.cpu.set_register(30, exe.initial_sp);
        }

        self.cpu.set_pc(exe.entry);
        log::info!("side-loaded executable, entry 0x{:08X}", exe.entry);
    }

    /// Run one CPU instruction and bring the peripherals up to date
    pub fn step(&mut self) {
        if self.pending_exe.is_some() && self.cpu.pc() == SHELL_ENTRY {
            if let Some(exe) = self.pending_exe.take() {
                self.inject_exe(exe);
            }
        }

        let cycles = self.cpu.step();

        self.cpu.bus.timers.step(cycles);
        self.cpu.bus.cdrom.step(cycles);

        self.frame_cycles += cycles;
        if self.frame_cycles >= CYCLES_PER_FRAME {
            self.frame_cycles -= CYCLES_PER_FRAME;
            self.frames += 1;

            self.cpu.bus.request_irq(Interrupt::VBlank);
            self.cpu.bus.gpu.frame_done();
        }
    }

    /// Number of completed frames
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Step until the next vertical retrace
    pub fn run_frame(&mut self) {
        let current = self.frames;
        while self.frames == current {
            self.step();
        }
    }

    /// Trigger a hardware reset.
    ///
    /// This is not the same as power-cycling: the CPU restarts at the
    /// reset vector but memory and peripheral state are left alone, the
    /// way the physical reset line behaved.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }
}
