//! Debug helpers: a one-line disassembler for trace output.
//!
//! This exists for humans reading execution traces, not for the
//! interpreter, so unknown encodings render as raw words instead of
//! being an error.

use super::structs::{Instruction, RegisterIndex};

/// Conventional MIPS register names, by index
const REGISTER_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

fn reg(index: RegisterIndex) -> &'static str {
    REGISTER_NAMES[index.0 as usize]
}

/// Render one instruction as assembly. `address` is the instruction's
/// own location, used to resolve branch targets.
pub fn disassemble(address: u32, i: Instruction) -> String {
    // branch targets are relative to the delay slot
    let branch_target = address
        .wrapping_add(4)
        .wrapping_add(i.imm_se() << 2);

    match i.opcode() {
        0x00 => match i.funct() {
            0x00 if i.0 == 0 => "nop".to_string(),
            0x00 => format!("sll ${}, ${}, {}", reg(i.d()), reg(i.t()), i.shamt()),
            0x02 => format!("srl ${}, ${}, {}", reg(i.d()), reg(i.t()), i.shamt()),
            0x03 => format!("sra ${}, ${}, {}", reg(i.d()), reg(i.t()), i.shamt()),
            0x04 => format!("sllv ${}, ${}, ${}", reg(i.d()), reg(i.t()), reg(i.s())),
            0x06 => format!("srlv ${}, ${}, ${}", reg(i.d()), reg(i.t()), reg(i.s())),
            0x07 => format!("srav ${}, ${}, ${}", reg(i.d()), reg(i.t()), reg(i.s())),
            0x08 => format!("jr ${}", reg(i.s())),
            0x09 => format!("jalr ${}, ${}", reg(i.d()), reg(i.s())),
            0x0C => "syscall".to_string(),
            0x0D => "break".to_string(),
            0x10 => format!("mfhi ${}", reg(i.d())),
            0x11 => format!("mthi ${}", reg(i.s())),
            0x12 => format!("mflo ${}", reg(i.d())),
            0x13 => format!("mtlo ${}", reg(i.s())),
            0x18 => format!("mult ${}, ${}", reg(i.s()), reg(i.t())),
            0x19 => format!("multu ${}, ${}", reg(i.s()), reg(i.t())),
            0x1A => format!("div ${}, ${}", reg(i.s()), reg(i.t())),
            0x1B => format!("divu ${}, ${}", reg(i.s()), reg(i.t())),
            0x20 => format!("add ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x21 => format!("addu ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x22 => format!("sub ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x23 => format!("subu ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x24 => format!("and ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x25 => format!("or ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x26 => format!("xor ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x27 => format!("nor ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x2A => format!("slt ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            0x2B => format!("sltu ${}, ${}, ${}", reg(i.d()), reg(i.s()), reg(i.t())),
            _ => format!(".word 0x{:08X}", i.0),
        },
        0x01 => {
            let mnemonic = match ((i.0 >> 16) & 1 != 0, (i.0 >> 20) & 1 != 0) {
                (false, false) => "bltz",
                (true, false) => "bgez",
                (false, true) => "bltzal",
                (true, true) => "bgezal",
            };
            format!("{} ${}, 0x{:08X}", mnemonic, reg(i.s()), branch_target)
        }
        0x02 => format!(
            "j 0x{:08X}",
            (address & 0xF000_0000) | (i.target() << 2)
        ),
        0x03 => format!(
            "jal 0x{:08X}",
            (address & 0xF000_0000) | (i.target() << 2)
        ),
        0x04 => format!(
            "beq ${}, ${}, 0x{:08X}",
            reg(i.s()),
            reg(i.t()),
            branch_target
        ),
        0x05 => format!(
            "bne ${}, ${}, 0x{:08X}",
            reg(i.s()),
            reg(i.t()),
            branch_target
        ),
        0x06 => format!("blez ${}, 0x{:08X}", reg(i.s()), branch_target),
        0x07 => format!("bgtz ${}, 0x{:08X}", reg(i.s()), branch_target),
        0x08 => format!("addi ${}, ${}, {}", reg(i.t()), reg(i.s()), i.imm_se() as i32),
        0x09 => format!(
            "addiu ${}, ${}, {}",
            reg(i.t()),
            reg(i.s()),
            i.imm_se() as i32
        ),
        0x0A => format!("slti ${}, ${}, {}", reg(i.t()), reg(i.s()), i.imm_se() as i32),
        0x0B => format!(
            "sltiu ${}, ${}, {}",
            reg(i.t()),
            reg(i.s()),
            i.imm_se() as i32
        ),
        0x0C => format!("andi ${}, ${}, 0x{:X}", reg(i.t()), reg(i.s()), i.imm()),
        0x0D => format!("ori ${}, ${}, 0x{:X}", reg(i.t()), reg(i.s()), i.imm()),
        0x0E => format!("xori ${}, ${}, 0x{:X}", reg(i.t()), reg(i.s()), i.imm()),
        0x0F => format!("lui ${}, 0x{:X}", reg(i.t()), i.imm()),
        0x10 => match i.cop_opcode() {
            0x00 => format!("mfc0 ${}, $cop0_{}", reg(i.t()), i.d().0),
            0x04 => format!("mtc0 ${}, $cop0_{}", reg(i.t()), i.d().0),
            0x10 => "rfe".to_string(),
            _ => format!(".word 0x{:08X}", i.0),
        },
        0x20 => memory_op("lb", i),
        0x21 => memory_op("lh", i),
        0x22 => memory_op("lwl", i),
        0x23 => memory_op("lw", i),
        0x24 => memory_op("lbu", i),
        0x25 => memory_op("lhu", i),
        0x26 => memory_op("lwr", i),
        0x28 => memory_op("sb", i),
        0x29 => memory_op("sh", i),
        0x2A => memory_op("swl", i),
        0x2B => memory_op("sw", i),
        0x2E => memory_op("swr", i),
        _ => format!(".word 0x{:08X}", i.0),
    }
}

fn memory_op(mnemonic: &str, i: Instruction) -> String {
    format!(
        "{} ${}, {}(${})",
        mnemonic,
        reg(i.t()),
        i.imm_se() as i32,
        reg(i.s())
    )
}
