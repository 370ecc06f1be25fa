//! The CD-ROM drive controller.
//!
//! The drive sits behind four byte-wide ports. Port 0 selects an index;
//! the index decides which logical register the other three ports expose,
//! so the same address reads the response FIFO or the interrupt file
//! depending on the last index written. Commands go through a parameter
//! FIFO and answer through a response FIFO, each paired with an interrupt
//! code. Slow commands answer in two phases: an immediate acknowledge and
//! a completion that the drive delivers after a countdown, stepped by the
//! machine loop.

pub mod disc;

use std::collections::VecDeque;
use std::path::Path;

use super::irq::{Interrupt, IrqHandle};
use super::timers::CPU_HZ;
use disc::{Disc, DiscError, ISO_SECTOR_SIZE, PAYLOAD_OFFSET, RAW_SECTOR_SIZE};

/// FIFO depth shared by the parameter and response queues
const FIFO_SIZE: usize = 16;

/// Interrupt codes delivered with responses
const INT_DATA_READY: u8 = 1;
const INT_COMPLETE: u8 = 2;
const INT_ACKNOWLEDGE: u8 = 3;
const INT_ERROR: u8 = 5;

/// Error codes pushed after an error status byte
const ERR_WRONG_PARAMS: u8 = 0x20;
const ERR_INVALID_COMMAND: u8 = 0x40;
const ERR_NO_DISC: u8 = 0x80;

/// Countdown before a second-phase response is delivered. The init
/// sequence takes much longer than everything else on real hardware and
/// the boot ROM relies on the difference being visible.
const COMPLETE_DELAY: u32 = 25_000;
const INIT_DELAY: u32 = 900_000;

/// Cycles between data-ready interrupts while reading at single speed
const READ_DELAY: u32 = (CPU_HZ as u32) / 75;

/// Mode register bits
const MODE_DOUBLE_SPEED: u8 = 0x80;
const MODE_RAW_SECTORS: u8 = 0x20;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DriveState {
    Idle,
    /// A multi-phase command is in flight
    Executing,
    Reading,
    /// The last command failed; cleared by the next command
    Error,
}

/// Second phase of a multi-phase command, delivered when the countdown
/// expires
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum PendingOp {
    InitComplete,
    GetIdComplete,
    PauseComplete,
    StopComplete,
    SeekComplete,
    ReadSector,
}

struct Pending {
    countdown: u32,
    op: PendingOp,
}

pub struct CdRom {
    /// Register bank selector, the low two bits of port 0
    index: u8,
    params: VecDeque<u8>,
    response: VecDeque<u8>,
    /// Interrupt enable bits, one per interrupt code
    irq_mask: u8,
    /// Interrupt flag bits, one per interrupt code
    irq_flags: u8,
    /// Mode byte set by SetMode
    mode: u8,
    /// Seek target set by SetLoc, as a logical block address
    seek_target: u32,
    /// Current read position
    position: u32,
    state: DriveState,
    pending: Option<Pending>,
    /// Extracted payload of the last sector read
    data: Vec<u8>,
    /// Read cursor into `data`
    data_pos: usize,
    disc: Option<Disc>,
    irq: IrqHandle,
}

impl CdRom {
    pub fn new(irq: IrqHandle) -> CdRom {
        CdRom {
            index: 0,
            params: VecDeque::new(),
            response: VecDeque::new(),
            irq_mask: 0,
            irq_flags: 0,
            mode: 0,
            seek_target: 0,
            position: 0,
            state: DriveState::Idle,
            pending: None,
            data: Vec::new(),
            data_pos: 0,
            disc: None,
            irq,
        }
    }

    pub fn insert_disc(&mut self, path: &Path) -> Result<(), DiscError> {
        let disc = Disc::open(path)?;
        self.disc = Some(disc);
        Ok(())
    }

    /// The drive status byte reported in most responses
    fn drive_status(&self) -> u8 {
        let mut status = 0u8;

        if self.state == DriveState::Error {
            status |= 0x01;
        }
        // motor on whenever a disc is present
        if self.disc.is_some() {
            status |= 0x02;
        }
        if self.state == DriveState::Reading {
            status |= 0x20;
        }

        status
    }

    /// Queue a response and latch its interrupt code. Raises the CPU line
    /// when the matching enable bit is set.
    fn push_response(&mut self, code: u8, bytes: &[u8]) {
        for &byte in bytes {
            if self.response.len() < FIFO_SIZE {
                self.response.push_back(byte);
            } else {
                log::warn!("CD-ROM response FIFO overflow");
            }
        }

        self.irq_flags |= 1 << (code - 1);
        if self.irq_flags & self.irq_mask != 0 {
            self.irq.request(Interrupt::CdRom);
        }
    }

    fn push_error(&mut self, code: u8) {
        let status = self.drive_status() | 0x01;
        self.state = DriveState::Error;
        self.push_response(INT_ERROR, &[status, code]);
    }

    fn schedule(&mut self, countdown: u32, op: PendingOp) {
        self.pending = Some(Pending { countdown, op });
    }

    /// Pop `count` parameters, or error out if the caller sent the wrong
    /// number.
    fn take_params(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.params.len() != count {
            log::warn!(
                "CD-ROM command expected {} parameters, got {}",
                count,
                self.params.len()
            );
            self.params.clear();
            self.push_error(ERR_WRONG_PARAMS);
            return None;
        }

        Some(self.params.drain(..).collect())
    }

    /// Execute a command byte written to the command port
    fn command(&mut self, command: u8) {
        log::debug!("CD-ROM command 0x{:02X}", command);

        // a new command clears a previous error state
        if self.state == DriveState::Error {
            self.state = DriveState::Idle;
        }
        self.response.clear();

        match command {
            0x01 => self.cmd_get_stat(),
            0x02 => self.cmd_set_loc(),
            0x06 | 0x1B => self.cmd_read(),
            0x08 => self.cmd_stop(),
            0x09 => self.cmd_pause(),
            0x0A => self.cmd_init(),
            0x0E => self.cmd_set_mode(),
            0x15 => self.cmd_seek_l(),
            0x19 => self.cmd_test(),
            0x1A => self.cmd_get_id(),
            _ => {
                log::warn!("unimplemented CD-ROM command 0x{:02X}", command);
                self.params.clear();
                self.push_error(ERR_INVALID_COMMAND);
            }
        }
    }

    fn cmd_get_stat(&mut self) {
        if self.take_params(0).is_none() {
            return;
        }
        let status = self.drive_status();
        self.push_response(INT_ACKNOWLEDGE, &[status]);
    }

    fn cmd_set_loc(&mut self) {
        let params = match self.take_params(3) {
            Some(params) => params,
            None => return,
        };

        let minutes = from_bcd(params[0]);
        let seconds = from_bcd(params[1]);
        let frames = from_bcd(params[2]);

        // two seconds of lead-in precede block 0
        let sector = (u32::from(minutes) * 60 + u32::from(seconds)) * 75 + u32::from(frames);
        self.seek_target = sector.saturating_sub(150);

        let status = self.drive_status();
        self.push_response(INT_ACKNOWLEDGE, &[status]);
    }

    fn cmd_read(&mut self) {
        if self.take_params(0).is_none() {
            return;
        }

        if self.disc.is_none() {
            self.push_error(ERR_NO_DISC);
            return;
        }

        self.position = self.seek_target;
        self.state = DriveState::Reading;

        let status = self.drive_status();
        self.push_response(INT_ACKNOWLEDGE, &[status]);
        self.schedule(self.read_delay(), PendingOp::ReadSector);
    }

    fn cmd_stop(&mut self) {
        if self.take_params(0).is_none() {
            return;
        }
        let status = self.drive_status();
        self.state = DriveState::Executing;
        self.push_response(INT_ACKNOWLEDGE, &[status]);
        self.schedule(COMPLETE_DELAY, PendingOp::StopComplete);
    }

    fn cmd_pause(&mut self) {
        if self.take_params(0).is_none() {
            return;
        }
        let status = self.drive_status();
        self.state = DriveState::Executing;
        self.pending = None;
        self.push_response(INT_ACKNOWLEDGE, &[status]);
        self.schedule(COMPLETE_DELAY, PendingOp::PauseComplete);
    }

    fn cmd_init(&mut self) {
        if self.take_params(0).is_none() {
            return;
        }
        let status = self.drive_status();
        self.state = DriveState::Executing;
        self.pending = None;
        self.push_response(INT_ACKNOWLEDGE, &[status]);
        self.schedule(INIT_DELAY, PendingOp::InitComplete);
    }

    fn cmd_set_mode(&mut self) {
        let params = match self.take_params(1) {
            Some(params) => params,
            None => return,
        };
        self.mode = params[0];

        let status = self.drive_status();
        self.push_response(INT_ACKNOWLEDGE, &[status]);
    }

    fn cmd_seek_l(&mut self) {
        if self.take_params(0).is_none() {
            return;
        }
        self.position = self.seek_target;
        self.state = DriveState::Executing;
        let status = self.drive_status();
        self.push_response(INT_ACKNOWLEDGE, &[status]);
        self.schedule(COMPLETE_DELAY, PendingOp::SeekComplete);
    }

    fn cmd_test(&mut self) {
        let params = match self.take_params(1) {
            Some(params) => params,
            None => return,
        };

        match params[0] {
            // firmware version query
            0x20 => self.push_response(INT_ACKNOWLEDGE, &[0x94, 0x09, 0x19, 0xC0]),
            sub => {
                log::warn!("unimplemented CD-ROM test subcommand 0x{:02X}", sub);
                self.push_error(ERR_INVALID_COMMAND);
            }
        }
    }

    fn cmd_get_id(&mut self) {
        if self.take_params(0).is_none() {
            return;
        }
        let status = self.drive_status();
        self.state = DriveState::Executing;
        self.push_response(INT_ACKNOWLEDGE, &[status]);
        self.schedule(COMPLETE_DELAY, PendingOp::GetIdComplete);
    }

    /// Cycles between sectors at the current speed setting
    fn read_delay(&self) -> u32 {
        if self.mode & MODE_DOUBLE_SPEED != 0 {
            READ_DELAY / 2
        } else {
            READ_DELAY
        }
    }

    /// Run the second phase of a multi-phase command
    fn complete(&mut self, op: PendingOp) {
        match op {
            PendingOp::InitComplete => {
                self.mode = 0;
                self.state = DriveState::Idle;
                let status = self.drive_status();
                self.push_response(INT_COMPLETE, &[status]);
            }
            PendingOp::PauseComplete | PendingOp::StopComplete | PendingOp::SeekComplete => {
                self.state = DriveState::Idle;
                let status = self.drive_status();
                self.push_response(INT_COMPLETE, &[status]);
            }
            PendingOp::GetIdComplete => {
                self.state = DriveState::Idle;
                if self.disc.is_some() {
                    // licensed North-American data disc
                    self.push_response(
                        INT_COMPLETE,
                        &[0x02, 0x00, 0x20, 0x00, b'S', b'C', b'E', b'A'],
                    );
                } else {
                    self.push_error(ERR_NO_DISC);
                }
            }
            PendingOp::ReadSector => self.read_sector(),
        }
    }

    /// Deliver one sector and re-arm the countdown for the next
    fn read_sector(&mut self) {
        if self.state != DriveState::Reading {
            return;
        }

        let position = self.position;
        let raw_mode = self.mode & MODE_RAW_SECTORS != 0;

        let sector = match self.disc.as_mut() {
            Some(disc) => disc.read_sector(position),
            None => {
                self.push_error(ERR_NO_DISC);
                return;
            }
        };

        let raw = match sector {
            Ok(raw) => raw,
            Err(error) => {
                log::warn!("CD-ROM read of sector {} failed: {}", position, error);
                self.push_error(ERR_NO_DISC);
                return;
            }
        };

        // whole-sector mode keeps everything after the sync pattern,
        // data mode extracts the 2048-byte payload
        self.data = if raw_mode {
            raw[12..RAW_SECTOR_SIZE].to_vec()
        } else {
            raw[PAYLOAD_OFFSET..PAYLOAD_OFFSET + ISO_SECTOR_SIZE].to_vec()
        };
        self.data_pos = 0;

        self.position = position + 1;

        let status = self.drive_status();
        self.push_response(INT_DATA_READY, &[status]);
        self.schedule(self.read_delay(), PendingOp::ReadSector);
    }

    /// Advance the countdown of a pending completion
    pub fn step(&mut self, cpu_cycles: u32) {
        if let Some(pending) = self.pending.as_mut() {
            if pending.countdown > cpu_cycles {
                pending.countdown -= cpu_cycles;
            } else {
                let op = pending.op;
                self.pending = None;
                self.complete(op);
            }
        }
    }

    /// The status byte shared by every index on port 0
    fn host_status(&self) -> u8 {
        let mut status = self.index;

        // parameter FIFO empty
        if self.params.is_empty() {
            status |= 0x08;
        }
        // parameter FIFO not full
        if self.params.len() < FIFO_SIZE {
            status |= 0x10;
        }
        // response FIFO not empty
        if !self.response.is_empty() {
            status |= 0x20;
        }
        // data FIFO not empty
        if self.data_pos < self.data.len() {
            status |= 0x40;
        }
        // busy while a command phase is pending
        if self.pending.is_some() && self.state == DriveState::Executing {
            status |= 0x80;
        }

        status
    }

    fn pop_response(&mut self) -> u8 {
        self.response.pop_front().unwrap_or(0)
    }

    fn pop_data(&mut self) -> u8 {
        let byte = self.data.get(self.data_pos).copied().unwrap_or(0);
        self.data_pos += 1;
        byte
    }

    /// Assemble a data word for the CD-ROM DMA channel
    pub fn dma_read_word(&mut self) -> u32 {
        let bytes = [
            self.pop_data(),
            self.pop_data(),
            self.pop_data(),
            self.pop_data(),
        ];
        u32::from_le_bytes(bytes)
    }

    /// Byte read from one of the four ports
    pub fn load8(&mut self, offset: u32) -> u8 {
        match (offset, self.index) {
            (0, _) => self.host_status(),
            (1, _) => self.pop_response(),
            (2, _) => self.pop_data(),
            (3, 0) | (3, 2) => self.irq_mask | 0xE0,
            (3, _) => self.irq_flags | 0xE0,
            _ => unreachable!(),
        }
    }

    /// Byte write to one of the four ports
    pub fn store8(&mut self, offset: u32, value: u8) {
        match (offset, self.index) {
            (0, _) => self.index = value & 3,
            (1, 0) => self.command(value),
            (2, 0) => {
                if self.params.len() < FIFO_SIZE {
                    self.params.push_back(value);
                } else {
                    log::warn!("CD-ROM parameter FIFO overflow");
                }
            }
            (2, 1) => self.irq_mask = value & 0x1F,
            (3, 0) => {
                // request register; bit 7 asks for the sector data, which
                // this drive always keeps staged
                if value & 0x80 == 0 {
                    self.data_pos = self.data.len();
                }
            }
            (3, 1) => {
                // acknowledge the written interrupt flags
                self.irq_flags &= !(value & 0x1F);
                if value & 0x40 != 0 {
                    self.params.clear();
                }
            }
            _ => log::warn!(
                "write to unhandled CD-ROM register {}.{} (value 0x{:02X})",
                offset,
                self.index,
                value
            ),
        }
    }
}

/// Decode a packed binary-coded-decimal byte
fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0xF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::irq::InterruptController;

    fn drive() -> (CdRom, InterruptController) {
        let controller = InterruptController::new();
        (CdRom::new(controller.handle()), controller)
    }

    fn ack_code(cdrom: &mut CdRom) -> u8 {
        cdrom.store8(0, 1);
        let flags = cdrom.load8(3) & 0x1F;
        cdrom.store8(0, 0);
        flags
    }

    #[test]
    fn get_stat_acknowledges() {
        let (mut cdrom, _controller) = drive();

        cdrom.store8(1, 0x01);

        assert_eq!(ack_code(&mut cdrom), 1 << (INT_ACKNOWLEDGE - 1));
        let status = cdrom.load8(1);
        assert_eq!(status & 0x02, 0, "motor off without a disc");
    }

    #[test]
    fn set_loc_converts_bcd() {
        let (mut cdrom, _controller) = drive();

        // 00:02:16 -> block 16
        cdrom.store8(2, 0x00);
        cdrom.store8(2, 0x02);
        cdrom.store8(2, 0x16);
        cdrom.store8(1, 0x02);

        assert_eq!(cdrom.seek_target, 16);
    }

    #[test]
    fn wrong_parameter_count_is_an_error() {
        let (mut cdrom, _controller) = drive();

        // SetLoc with a single parameter
        cdrom.store8(2, 0x00);
        cdrom.store8(1, 0x02);

        assert_eq!(ack_code(&mut cdrom), 1 << (INT_ERROR - 1));
        let status = cdrom.load8(1);
        assert_ne!(status & 0x01, 0, "error bit set");
        assert_eq!(cdrom.load8(1), ERR_WRONG_PARAMS);
        assert_eq!(cdrom.state, DriveState::Error);

        // the next command clears the error state
        cdrom.store8(1, 0x01);
        assert_eq!(cdrom.state, DriveState::Idle);
    }

    #[test]
    fn test_subcommand_returns_firmware_id() {
        let (mut cdrom, _controller) = drive();

        cdrom.store8(2, 0x20);
        cdrom.store8(1, 0x19);

        let response: Vec<u8> = (0..4).map(|_| cdrom.load8(1)).collect();
        assert_eq!(response, [0x94, 0x09, 0x19, 0xC0]);
    }

    #[test]
    fn get_id_without_disc_errors_out() {
        let (mut cdrom, _controller) = drive();

        cdrom.store8(1, 0x1A);
        assert_eq!(ack_code(&mut cdrom), 1 << (INT_ACKNOWLEDGE - 1));
        cdrom.load8(1);

        // second phase after the countdown
        cdrom.step(COMPLETE_DELAY);

        let flags = ack_code(&mut cdrom);
        assert_ne!(flags & (1 << (INT_ERROR - 1)), 0);
        cdrom.load8(1);
        assert_eq!(cdrom.load8(1), ERR_NO_DISC);
    }

    #[test]
    fn read_without_disc_errors_out() {
        let (mut cdrom, _controller) = drive();

        cdrom.store8(1, 0x06);

        assert_eq!(ack_code(&mut cdrom), 1 << (INT_ERROR - 1));
    }

    #[test]
    fn interrupt_line_respects_enable_mask() {
        let (mut cdrom, mut controller) = drive();
        controller.set_mask(0x7FF);

        cdrom.store8(1, 0x01);
        assert!(
            !controller.active(),
            "no CPU interrupt while the enable bit is clear"
        );

        // acknowledge the flags, enable INT3 and retry
        cdrom.store8(0, 1);
        cdrom.store8(3, 0x1F);
        cdrom.store8(2, 0x07);
        cdrom.store8(0, 0);
        cdrom.store8(1, 0x01);

        assert!(controller.active());
    }

    #[test]
    fn flag_write_acknowledges() {
        let (mut cdrom, _controller) = drive();

        cdrom.store8(1, 0x01);
        assert_ne!(ack_code(&mut cdrom), 0);

        cdrom.store8(0, 1);
        cdrom.store8(3, 0x1F);
        assert_eq!(cdrom.load8(3) & 0x1F, 0);
    }

    #[test]
    fn init_is_slower_than_other_commands() {
        let (mut cdrom, _controller) = drive();

        cdrom.store8(1, 0x0A);
        cdrom.load8(1);
        cdrom.store8(0, 1);
        cdrom.store8(3, 0x1F);
        cdrom.store8(0, 0);

        cdrom.step(COMPLETE_DELAY);
        assert_eq!(ack_code(&mut cdrom), 0, "init must still be pending");

        cdrom.step(INIT_DELAY);
        assert_eq!(ack_code(&mut cdrom), 1 << (INT_COMPLETE - 1));
    }
}
