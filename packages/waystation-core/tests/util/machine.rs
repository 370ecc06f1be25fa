//! Test-machine builders: assemble a handful of instructions into a
//! synthetic boot ROM and wrap a machine around it.

use waystation_core::devices::gpu::renderer::NullRenderer;
use waystation_core::devices::mem::{Bios, BIOS_SIZE};
use waystation_core::devices::psx::Psx;

/// Build a machine whose boot ROM holds the given instruction words at
/// the reset vector. The rest of the ROM is zeroed.
pub fn machine(words: &[u32]) -> Psx {
    let mut image = vec![0u8; BIOS_SIZE];

    for (i, word) in words.iter().enumerate() {
        image[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }

    let bios = Bios::new(image).expect("synthetic ROM must have the right size");
    Psx::new(bios, Box::new(NullRenderer::new()))
}

/// A machine that spins at the reset vector forever. Used by tests that
/// drive the peripherals directly and only need the clock to advance.
pub fn idle_machine() -> Psx {
    machine(&[asm::j(0xBFC0_0000), asm::nop()])
}

pub fn run(psx: &mut Psx, steps: usize) {
    for _ in 0..steps {
        psx.step();
    }
}

/// Hand assembler for the instruction words the tests need
pub mod asm {
    pub fn nop() -> u32 {
        0
    }

    pub fn lui(t: u32, imm: u32) -> u32 {
        (0x0F << 26) | (t << 16) | (imm & 0xFFFF)
    }

    pub fn ori(t: u32, s: u32, imm: u32) -> u32 {
        (0x0D << 26) | (s << 21) | (t << 16) | (imm & 0xFFFF)
    }

    pub fn addi(t: u32, s: u32, imm: i16) -> u32 {
        (0x08 << 26) | (s << 21) | (t << 16) | u32::from(imm as u16)
    }

    pub fn addiu(t: u32, s: u32, imm: i16) -> u32 {
        (0x09 << 26) | (s << 21) | (t << 16) | u32::from(imm as u16)
    }

    pub fn slti(t: u32, s: u32, imm: i16) -> u32 {
        (0x0A << 26) | (s << 21) | (t << 16) | u32::from(imm as u16)
    }

    pub fn sltiu(t: u32, s: u32, imm: i16) -> u32 {
        (0x0B << 26) | (s << 21) | (t << 16) | u32::from(imm as u16)
    }

    fn rtype(s: u32, t: u32, d: u32, shamt: u32, funct: u32) -> u32 {
        (s << 21) | (t << 16) | (d << 11) | (shamt << 6) | funct
    }

    pub fn sll(d: u32, t: u32, shamt: u32) -> u32 {
        rtype(0, t, d, shamt, 0x00)
    }

    pub fn srl(d: u32, t: u32, shamt: u32) -> u32 {
        rtype(0, t, d, shamt, 0x02)
    }

    pub fn sra(d: u32, t: u32, shamt: u32) -> u32 {
        rtype(0, t, d, shamt, 0x03)
    }

    pub fn sllv(d: u32, t: u32, s: u32) -> u32 {
        rtype(s, t, d, 0, 0x04)
    }

    pub fn add(d: u32, s: u32, t: u32) -> u32 {
        rtype(s, t, d, 0, 0x20)
    }

    pub fn addu(d: u32, s: u32, t: u32) -> u32 {
        rtype(s, t, d, 0, 0x21)
    }

    pub fn sub(d: u32, s: u32, t: u32) -> u32 {
        rtype(s, t, d, 0, 0x22)
    }

    pub fn nor(d: u32, s: u32, t: u32) -> u32 {
        rtype(s, t, d, 0, 0x27)
    }

    pub fn slt(d: u32, s: u32, t: u32) -> u32 {
        rtype(s, t, d, 0, 0x2A)
    }

    pub fn sltu(d: u32, s: u32, t: u32) -> u32 {
        rtype(s, t, d, 0, 0x2B)
    }

    pub fn mult(s: u32, t: u32) -> u32 {
        rtype(s, t, 0, 0, 0x18)
    }

    pub fn multu(s: u32, t: u32) -> u32 {
        rtype(s, t, 0, 0, 0x19)
    }

    pub fn div(s: u32, t: u32) -> u32 {
        rtype(s, t, 0, 0, 0x1A)
    }

    pub fn divu(s: u32, t: u32) -> u32 {
        rtype(s, t, 0, 0, 0x1B)
    }

    pub fn mfhi(d: u32) -> u32 {
        rtype(0, 0, d, 0, 0x10)
    }

    pub fn mflo(d: u32) -> u32 {
        rtype(0, 0, d, 0, 0x12)
    }

    pub fn jr(s: u32) -> u32 {
        rtype(s, 0, 0, 0, 0x08)
    }

    pub fn jalr(d: u32, s: u32) -> u32 {
        rtype(s, 0, d, 0, 0x09)
    }

    pub fn syscall() -> u32 {
        0x0C
    }

    pub fn brk() -> u32 {
        0x0D
    }

    pub fn j(target: u32) -> u32 {
        (0x02 << 26) | ((target >> 2) & 0x03FF_FFFF)
    }

    pub fn jal(target: u32) -> u32 {
        (0x03 << 26) | ((target >> 2) & 0x03FF_FFFF)
    }

    pub fn beq(s: u32, t: u32, offset: i16) -> u32 {
        (0x04 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn bne(s: u32, t: u32, offset: i16) -> u32 {
        (0x05 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn bltzal(s: u32, offset: i16) -> u32 {
        (0x01 << 26) | (s << 21) | (0x10 << 16) | u32::from(offset as u16)
    }

    pub fn lb(t: u32, s: u32, offset: i16) -> u32 {
        (0x20 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn lh(t: u32, s: u32, offset: i16) -> u32 {
        (0x21 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn lwl(t: u32, s: u32, offset: i16) -> u32 {
        (0x22 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn lw(t: u32, s: u32, offset: i16) -> u32 {
        (0x23 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn lbu(t: u32, s: u32, offset: i16) -> u32 {
        (0x24 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn lhu(t: u32, s: u32, offset: i16) -> u32 {
        (0x25 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn lwr(t: u32, s: u32, offset: i16) -> u32 {
        (0x26 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn sb(t: u32, s: u32, offset: i16) -> u32 {
        (0x28 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn sh(t: u32, s: u32, offset: i16) -> u32 {
        (0x29 << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn swl(t: u32, s: u32, offset: i16) -> u32 {
        (0x2A << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn sw(t: u32, s: u32, offset: i16) -> u32 {
        (0x2B << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn swr(t: u32, s: u32, offset: i16) -> u32 {
        (0x2E << 26) | (s << 21) | (t << 16) | u32::from(offset as u16)
    }

    pub fn mfc0(t: u32, cop_r: u32) -> u32 {
        (0x10 << 26) | (t << 16) | (cop_r << 11)
    }

    pub fn mtc0(t: u32, cop_r: u32) -> u32 {
        (0x10 << 26) | (0x04 << 21) | (t << 16) | (cop_r << 11)
    }

    pub fn rfe() -> u32 {
        (0x10 << 26) | (0x10 << 21) | 0x10
    }
}
