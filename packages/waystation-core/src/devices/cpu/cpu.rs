//! Interpreter for the R3000 main CPU.
//!
//! One call to `step` retires one instruction. The two delay disciplines
//! of the architecture are modelled with explicit state: a branch sets
//! `branch`, which becomes `delay_slot` on the following cycle, and a
//! load schedules a (register, value) pair that is committed at the top
//! of the next cycle. Register writes land in an output bank that is
//! copied back to the input bank after each instruction, so an
//! instruction can never observe its own result or a load that has not
//! aged past its delay slot.

use super::super::bus::Bus;
use super::icache::{ICache, LINE_WORDS};
use super::structs::{
    Exception, Instruction, RegisterIndex, HANDLER_RAM, HANDLER_ROM, RESET_VECTOR, SR_BOOT_VECTORS,
    SR_IRQ_ENABLE, SR_ISOLATE_CACHE,
};

pub struct Cpu {
    /// Address of the instruction being executed
    current_pc: u32,
    /// Address of the next instruction to fetch
    pc: u32,
    /// Address after that; branches redirect this one, which is what
    /// gives the delay slot its one-instruction reprieve
    next_pc: u32,

    /// Input register bank, read by instructions
    regs: [u32; 32],
    /// Output register bank, written by instructions
    out_regs: [u32; 32],

    /// Multiply/divide result high word
    hi: u32,
    /// Multiply/divide result low word
    lo: u32,

    /// COP0 register 12: processor status
    sr: u32,
    /// COP0 register 13: exception cause
    cause: u32,
    /// COP0 register 14: exception return address
    epc: u32,

    /// Load scheduled by the previous instruction, committed at the top
    /// of the next cycle. Register 0 encodes "nothing pending".
    load: (RegisterIndex, u32),

    /// The executing instruction is a taken branch or jump
    branch: bool,
    /// The executing instruction sits in a branch delay slot
    delay_slot: bool,

    icache: ICache,

    pub bus: Bus,
}

impl Cpu {
    pub fn new(bus: Bus) -> Cpu {
        Cpu {
            current_pc: RESET_VECTOR,
            pc: RESET_VECTOR,
            next_pc: RESET_VECTOR.wrapping_add(4),
            regs: [0; 32],
            out_regs: [0; 32],
            hi: 0,
            lo: 0,
            sr: 0,
            cause: 0,
            epc: 0,
            load: (RegisterIndex(0), 0),
            branch: false,
            delay_slot: false,
            icache: ICache::new(),
            bus,
        }
    }

    /// Rewind execution to the reset vector without touching memory or
    /// peripherals, the way the physical reset line did.
    pub fn reset(&mut self) {
        self.current_pc = RESET_VECTOR;
        self.pc = RESET_VECTOR;
        self.next_pc = RESET_VECTOR.wrapping_add(4);
        self.sr = 0;
        self.cause = 0;
        self.epc = 0;
        self.load = (RegisterIndex(0), 0);
        self.branch = false;
        self.delay_slot = false;
        self.icache = ICache::new();
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn next_pc(&self) -> u32 {
        self.next_pc
    }

    /// Read a general-purpose register
    pub fn reg(&self, index: u32) -> u32 {
        self.regs[index as usize]
    }

    /// Debugger hook: overwrite a register in both banks
    pub fn set_register(&mut self, index: u32, value: u32) {
        if index != 0 {
            self.regs[index as usize] = value;
            self.out_regs[index as usize] = value;
        }
    }

    /// Debugger hook: redirect execution, dropping any pending branch
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc.wrapping_add(4);
        self.branch = false;
        self.delay_slot = false;
    }

    pub fn lo(&self) -> u32 {
        self.lo
    }

    pub fn hi(&self) -> u32 {
        self.hi
    }

    pub fn sr(&self) -> u32 {
        self.sr
    }

    pub fn cause(&self) -> u32 {
        self.cause
    }

    pub fn epc(&self) -> u32 {
        self.epc
    }

    /// One line of execution trace: the address, encoding and assembly
    /// of the next instruction to run
    pub fn debug_string(&mut self) -> String {
        let pc = self.pc;
        let word = self.bus.load32(pc);

        format!(
            "{:08x}: {:08x} {}",
            pc,
            word,
            super::utils::disassemble(pc, Instruction(word))
        )
    }

    fn set_reg(&mut self, index: RegisterIndex, value: u32) {
        self.out_regs[index.0 as usize] = value;
        self.out_regs[0] = 0;
    }

    /// Execute one instruction. Returns the number of CPU cycles charged;
    /// timing is not cycle-exact and every instruction costs one.
    pub fn step(&mut self) -> u32 {
        self.current_pc = self.pc;

        // the instruction about to run is a delay slot iff the previous
        // one was a taken branch
        self.delay_slot = self.branch;
        self.branch = false;

        // mirror the external interrupt line into cause bit 10 and take
        // the interrupt before fetching
        let irq_active = self.bus.irq_active();
        self.cause = (self.cause & !(1 << 10)) | (u32::from(irq_active) << 10);

        if irq_active && self.sr & SR_IRQ_ENABLE != 0 {
            self.exception(Exception::Interrupt);
            return 1;
        }

        // commit the load scheduled by the previous instruction
        let (reg, value) = self.load;
        self.set_reg(reg, value);
        self.load = (RegisterIndex(0), 0);

        if self.current_pc % 4 != 0 {
            self.exception(Exception::LoadAddressError);
            self.regs = self.out_regs;
            return 1;
        }

        let instruction = Instruction(self.fetch_instruction());

        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);

        self.decode_and_execute(instruction);

        self.regs = self.out_regs;

        1
    }

    /// Fetch through the instruction cache. Addresses in the uncached
    /// window go straight to the bus and leave the cache untouched.
    fn fetch_instruction(&mut self) -> u32 {
        let pc = self.current_pc;

        if pc >> 29 == 0b101 {
            return self.bus.load32(pc);
        }

        let tag = ICache::tag(pc);
        let line_index = ICache::line_index(pc);
        let word_index = ICache::word_index(pc);

        let line = &mut self.icache.lines[line_index];

        if line.tag != tag || !line.valid[word_index] {
            // refill from the missed word to the end of the line
            line.tag = tag;
            for word in 0..word_index {
                line.valid[word] = false;
            }

            let base = pc & !0xF;
            for word in word_index..LINE_WORDS {
                let fetched = self.bus.load32(base + (word as u32) * 4);
                let line = &mut self.icache.lines[line_index];
                line.words[word] = fetched;
                line.valid[word] = true;
            }
        }

        self.icache.lines[line_index].words[word_index]
    }

    /// Enter an exception handler
    fn exception(&mut self, cause: Exception) {
        let handler = if self.sr & SR_BOOT_VECTORS != 0 {
            HANDLER_ROM
        } else {
            HANDLER_RAM
        };

        // push the interrupt/kernel mode stack: two zeroes shift in,
        // disabling interrupts and entering kernel mode
        let mode = self.sr & 0x3F;
        self.sr = (self.sr & !0x3F) | ((mode << 2) & 0x3F);

        self.cause = (self.cause & !0x7C) | ((cause as u32) << 2);

        if self.delay_slot {
            // the handler must restart the branch, not the slot
            self.epc = self.current_pc.wrapping_sub(4);
            self.cause |= 1 << 31;
        } else {
            self.epc = self.current_pc;
            self.cause &= !(1 << 31);
        }

        self.pc = handler;
        self.next_pc = handler.wrapping_add(4);
    }

    // Memory helpers. Alignment is checked here, before the bus ever
    // sees the access, and a misaligned address raises the architectural
    // exception without touching memory.

    fn load8(&mut self, address: u32) -> u8 {
        self.bus.load8(address)
    }

    fn load16(&mut self, address: u32) -> Option<u16> {
        if address % 2 != 0 {
            self.exception(Exception::LoadAddressError);
            return None;
        }
        Some(self.bus.load16(address))
    }

    fn load32(&mut self, address: u32) -> Option<u32> {
        if address % 4 != 0 {
            self.exception(Exception::LoadAddressError);
            return None;
        }
        Some(self.bus.load32(address))
    }

    fn store8(&mut self, address: u32, value: u8) {
        if self.sr & SR_ISOLATE_CACHE != 0 {
            return;
        }
        self.bus.store8(address, value);
    }

    fn store16(&mut self, address: u32, value: u16) {
        if address % 2 != 0 {
            self.exception(Exception::StoreAddressError);
            return;
        }
        if self.sr & SR_ISOLATE_CACHE != 0 {
            return;
        }
        self.bus.store16(address, value);
    }

    fn store32(&mut self, address: u32, value: u32) {
        if address % 4 != 0 {
            self.exception(Exception::StoreAddressError);
            return;
        }
        if self.sr & SR_ISOLATE_CACHE != 0 {
            return;
        }
        self.bus.store32(address, value);
    }

    /// Redirect the instruction after the delay slot
    fn branch(&mut self, offset: u32) {
        self.next_pc = self.pc.wrapping_add(offset << 2);
        self.branch = true;
    }

    fn decode_and_execute(&mut self, instruction: Instruction) {
        match instruction.opcode() {
            0x00 => match instruction.funct() {
                0x00 => self.op_sll(instruction),
                0x02 => self.op_srl(instruction),
                0x03 => self.op_sra(instruction),
                0x04 => self.op_sllv(instruction),
                0x06 => self.op_srlv(instruction),
                0x07 => self.op_srav(instruction),
                0x08 => self.op_jr(instruction),
                0x09 => self.op_jalr(instruction),
                0x0C => self.op_syscall(instruction),
                0x0D => self.op_break(instruction),
                0x10 => self.op_mfhi(instruction),
                0x11 => self.op_mthi(instruction),
                0x12 => self.op_mflo(instruction),
                0x13 => self.op_mtlo(instruction),
                0x18 => self.op_mult(instruction),
                0x19 => self.op_multu(instruction),
                0x1A => self.op_div(instruction),
                0x1B => self.op_divu(instruction),
                0x20 => self.op_add(instruction),
                0x21 => self.op_addu(instruction),
                0x22 => self.op_sub(instruction),
                0x23 => self.op_subu(instruction),
                0x24 => self.op_and(instruction),
                0x25 => self.op_or(instruction),
                0x26 => self.op_xor(instruction),
                0x27 => self.op_nor(instruction),
                0x2A => self.op_slt(instruction),
                0x2B => self.op_sltu(instruction),
                _ => self.op_illegal(instruction),
            },
            0x01 => self.op_bxx(instruction),
            0x02 => self.op_j(instruction),
            0x03 => self.op_jal(instruction),
            0x04 => self.op_beq(instruction),
            0x05 => self.op_bne(instruction),
            0x06 => self.op_blez(instruction),
            0x07 => self.op_bgtz(instruction),
            0x08 => self.op_addi(instruction),
            0x09 => self.op_addiu(instruction),
            0x0A => self.op_slti(instruction),
            0x0B => self.op_sltiu(instruction),
            0x0C => self.op_andi(instruction),
            0x0D => self.op_ori(instruction),
            0x0E => self.op_xori(instruction),
            0x0F => self.op_lui(instruction),
            0x10 => self.op_cop0(instruction),
            0x11 | 0x12 | 0x13 => self.op_copn(instruction),
            0x20 => self.op_lb(instruction),
            0x21 => self.op_lh(instruction),
            0x22 => self.op_lwl(instruction),
            0x23 => self.op_lw(instruction),
            0x24 => self.op_lbu(instruction),
            0x25 => self.op_lhu(instruction),
            0x26 => self.op_lwr(instruction),
            0x28 => self.op_sb(instruction),
            0x29 => self.op_sh(instruction),
            0x2A => self.op_swl(instruction),
            0x2B => self.op_sw(instruction),
            0x2E => self.op_swr(instruction),
            0x30..=0x33 | 0x38..=0x3B => self.op_copn(instruction),
            _ => self.op_illegal(instruction),
        }
    }

    fn op_illegal(&mut self, instruction: Instruction) {
        log::warn!(
            "illegal instruction 0x{:08X} at 0x{:08X}",
            instruction.0,
            self.current_pc
        );
        self.exception(Exception::IllegalInstruction);
    }

    /// Any access to an unusable coprocessor
    fn op_copn(&mut self, _instruction: Instruction) {
        self.exception(Exception::CoprocessorError);
    }

    //
    // Shifts
    //

    fn op_sll(&mut self, i: Instruction) {
        let value = self.reg(i.t().0) << i.shamt();
        self.set_reg(i.d(), value);
    }

    fn op_srl(&mut self, i: Instruction) {
        let value = self.reg(i.t().0) >> i.shamt();
        self.set_reg(i.d(), value);
    }

    fn op_sra(&mut self, i: Instruction) {
        let value = (self.reg(i.t().0) as i32) >> i.shamt();
        self.set_reg(i.d(), value as u32);
    }

    fn op_sllv(&mut self, i: Instruction) {
        // only the low 5 bits of the shift register matter
        let value = self.reg(i.t().0) << (self.reg(i.s().0) & 0x1F);
        self.set_reg(i.d(), value);
    }

    fn op_srlv(&mut self, i: Instruction) {
        let value = self.reg(i.t().0) >> (self.reg(i.s().0) & 0x1F);
        self.set_reg(i.d(), value);
    }

    fn op_srav(&mut self, i: Instruction) {
        let value = (self.reg(i.t().0) as i32) >> (self.reg(i.s().0) & 0x1F);
        self.set_reg(i.d(), value as u32);
    }

    //
    // Arithmetic
    //

    fn op_add(&mut self, i: Instruction) {
        let s = self.reg(i.s().0) as i32;
        let t = self.reg(i.t().0) as i32;

        match s.checked_add(t) {
            Some(value) => self.set_reg(i.d(), value as u32),
            None => self.exception(Exception::Overflow),
        }
    }

    fn op_addu(&mut self, i: Instruction) {
        let value = self.reg(i.s().0).wrapping_add(self.reg(i.t().0));
        self.set_reg(i.d(), value);
    }

    fn op_sub(&mut self, i: Instruction) {
        let s = self.reg(i.s().0) as i32;
        let t = self.reg(i.t().0) as i32;

        match s.checked_sub(t) {
            Some(value) => self.set_reg(i.d(), value as u32),
            None => self.exception(Exception::Overflow),
        }
    }

    fn op_subu(&mut self, i: Instruction) {
        let value = self.reg(i.s().0).wrapping_sub(self.reg(i.t().0));
        self.set_reg(i.d(), value);
    }

    fn op_addi(&mut self, i: Instruction) {
        let s = self.reg(i.s().0) as i32;
        let imm = i.imm_se() as i32;

        match s.checked_add(imm) {
            Some(value) => self.set_reg(i.t(), value as u32),
            None => self.exception(Exception::Overflow),
        }
    }

    fn op_addiu(&mut self, i: Instruction) {
        let value = self.reg(i.s().0).wrapping_add(i.imm_se());
        self.set_reg(i.t(), value);
    }

    //
    // Comparisons
    //

    fn op_slt(&mut self, i: Instruction) {
        let value = (self.reg(i.s().0) as i32) < (self.reg(i.t().0) as i32);
        self.set_reg(i.d(), u32::from(value));
    }

    fn op_sltu(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) < self.reg(i.t().0);
        self.set_reg(i.d(), u32::from(value));
    }

    fn op_slti(&mut self, i: Instruction) {
        let value = (self.reg(i.s().0) as i32) < (i.imm_se() as i32);
        self.set_reg(i.t(), u32::from(value));
    }

    fn op_sltiu(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) < i.imm_se();
        self.set_reg(i.t(), u32::from(value));
    }

    //
    // Bitwise
    //

    fn op_and(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) & self.reg(i.t().0);
        self.set_reg(i.d(), value);
    }

    fn op_or(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) | self.reg(i.t().0);
        self.set_reg(i.d(), value);
    }

    fn op_xor(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) ^ self.reg(i.t().0);
        self.set_reg(i.d(), value);
    }

    fn op_nor(&mut self, i: Instruction) {
        let value = !(self.reg(i.s().0) | self.reg(i.t().0));
        self.set_reg(i.d(), value);
    }

    fn op_andi(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) & i.imm();
        self.set_reg(i.t(), value);
    }

    fn op_ori(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) | i.imm();
        self.set_reg(i.t(), value);
    }

    fn op_xori(&mut self, i: Instruction) {
        let value = self.reg(i.s().0) ^ i.imm();
        self.set_reg(i.t(), value);
    }

    fn op_lui(&mut self, i: Instruction) {
        self.set_reg(i.t(), i.imm() << 16);
    }

    //
    // Multiply and divide
    //

    fn op_mult(&mut self, i: Instruction) {
        let s = i64::from(self.reg(i.s().0) as i32);
        let t = i64::from(self.reg(i.t().0) as i32);
        let product = (s * t) as u64;

        self.hi = (product >> 32) as u32;
        self.lo = product as u32;
    }

    fn op_multu(&mut self, i: Instruction) {
        let product = u64::from(self.reg(i.s().0)) * u64::from(self.reg(i.t().0));

        self.hi = (product >> 32) as u32;
        self.lo = product as u32;
    }

    fn op_div(&mut self, i: Instruction) {
        let n = self.reg(i.s().0) as i32;
        let d = self.reg(i.t().0) as i32;

        if d == 0 {
            // division by zero is not a trap on this architecture, it
            // produces sentinel values
            self.hi = n as u32;
            self.lo = if n >= 0 { 0xFFFF_FFFF } else { 1 };
        } else if n as u32 == 0x8000_0000 && d == -1 {
            // the one quotient that does not fit in 32 bits
            self.hi = 0;
            self.lo = 0x8000_0000;
        } else {
            self.hi = (n % d) as u32;
            self.lo = (n / d) as u32;
        }
    }

    fn op_divu(&mut self, i: Instruction) {
        let n = self.reg(i.s().0);
        let d = self.reg(i.t().0);

        if d == 0 {
            self.hi = n;
            self.lo = 0xFFFF_FFFF;
        } else {
            self.hi = n % d;
            self.lo = n / d;
        }
    }

    fn op_mfhi(&mut self, i: Instruction) {
        let hi = self.hi;
        self.set_reg(i.d(), hi);
    }

    fn op_mthi(&mut self, i: Instruction) {
        self.hi = self.reg(i.s().0);
    }

    fn op_mflo(&mut self, i: Instruction) {
        let lo = self.lo;
        self.set_reg(i.d(), lo);
    }

    fn op_mtlo(&mut self, i: Instruction) {
        self.lo = self.reg(i.s().0);
    }

    //
    // Jumps and branches
    //

    fn op_j(&mut self, i: Instruction) {
        // the high nibble carries over from the delay-slot address
        self.next_pc = (self.pc & 0xF000_0000) | (i.target() << 2);
        self.branch = true;
    }

    fn op_jal(&mut self, i: Instruction) {
        let return_address = self.next_pc;
        self.op_j(i);
        self.set_reg(RegisterIndex(31), return_address);
    }

    fn op_jr(&mut self, i: Instruction) {
        // target alignment is checked when the fetch happens
        self.next_pc = self.reg(i.s().0);
        self.branch = true;
    }

    fn op_jalr(&mut self, i: Instruction) {
        let return_address = self.next_pc;
        self.next_pc = self.reg(i.s().0);
        self.branch = true;
        self.set_reg(i.d(), return_address);
    }

    fn op_beq(&mut self, i: Instruction) {
        if self.reg(i.s().0) == self.reg(i.t().0) {
            self.branch(i.imm_se());
        }
    }

    fn op_bne(&mut self, i: Instruction) {
        if self.reg(i.s().0) != self.reg(i.t().0) {
            self.branch(i.imm_se());
        }
    }

    fn op_blez(&mut self, i: Instruction) {
        if (self.reg(i.s().0) as i32) <= 0 {
            self.branch(i.imm_se());
        }
    }

    fn op_bgtz(&mut self, i: Instruction) {
        if (self.reg(i.s().0) as i32) > 0 {
            self.branch(i.imm_se());
        }
    }

    /// The REGIMM family: BLTZ, BGEZ, BLTZAL and BGEZAL, told apart by
    /// instruction bits 16 and 20
    fn op_bxx(&mut self, i: Instruction) {
        let is_bgez = (i.0 >> 16) & 1;
        let is_link = (i.0 >> 20) & 1 != 0;

        let value = self.reg(i.s().0) as i32;
        let test = u32::from(value < 0) ^ is_bgez;

        if is_link {
            // the link register is written whether or not the branch is
            // taken
            let return_address = self.next_pc;
            self.set_reg(RegisterIndex(31), return_address);
        }

        if test != 0 {
            self.branch(i.imm_se());
        }
    }

    //
    // Traps
    //

    fn op_syscall(&mut self, _i: Instruction) {
        // a few kernel services the boot ROM reaches through SYSCALL are
        // handled directly instead of bouncing through the handler
        match self.reg(4) {
            1 => self.sr &= !SR_IRQ_ENABLE,
            2 => self.sr |= SR_IRQ_ENABLE,
            _ => self.exception(Exception::SysCall),
        }
    }

    fn op_break(&mut self, _i: Instruction) {
        self.exception(Exception::Break);
    }

    //
    // Coprocessor 0
    //

    fn op_cop0(&mut self, i: Instruction) {
        match i.cop_opcode() {
            0x00 => self.op_mfc0(i),
            0x04 => self.op_mtc0(i),
            0x10 => self.op_rfe(i),
            _ => self.op_illegal(i),
        }
    }

    fn op_mfc0(&mut self, i: Instruction) {
        let value = match i.d().0 {
            12 => self.sr,
            13 => self.cause,
            14 => self.epc,
            register => {
                log::warn!("read from unhandled COP0 register {}", register);
                0
            }
        };

        // moves from COP0 honor the load delay slot
        self.load = (i.t(), value);
    }

    fn op_mtc0(&mut self, i: Instruction) {
        let value = self.reg(i.t().0);

        match i.d().0 {
            12 => self.sr = value,
            13 => {
                // only the two software interrupt bits are writable
                self.cause = (self.cause & !0x300) | (value & 0x300);
            }
            14 => self.epc = value,
            // breakpoint registers, only the quiescent value is handled
            3 | 5 | 6 | 7 | 9 | 11 => {
                if value != 0 {
                    log::warn!(
                        "wrote 0x{:08X} to breakpoint COP0 register {}",
                        value,
                        i.d().0
                    );
                }
            }
            register => log::warn!("write to unhandled COP0 register {}", register),
        }
    }

    fn op_rfe(&mut self, i: Instruction) {
        if i.funct() != 0x10 {
            self.op_illegal(i);
            return;
        }

        // pop the interrupt/kernel mode stack
        let mode = self.sr & 0x3F;
        self.sr = (self.sr & !0x3F) | (mode >> 2);
    }

    //
    // Loads and stores
    //

    fn op_lb(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());
        let value = self.load8(address) as i8;

        self.load = (i.t(), value as u32);
    }

    fn op_lbu(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());
        let value = self.load8(address);

        self.load = (i.t(), u32::from(value));
    }

    fn op_lh(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());

        if let Some(value) = self.load16(address) {
            self.load = (i.t(), value as i16 as u32);
        }
    }

    fn op_lhu(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());

        if let Some(value) = self.load16(address) {
            self.load = (i.t(), u32::from(value));
        }
    }

    fn op_lw(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());

        if let Some(value) = self.load32(address) {
            self.load = (i.t(), value);
        }
    }

    fn op_sb(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());
        let value = self.reg(i.t().0);

        self.store8(address, value as u8);
    }

    fn op_sh(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());
        let value = self.reg(i.t().0);

        self.store16(address, value as u16);
    }

    fn op_sw(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());
        let value = self.reg(i.t().0);

        self.store32(address, value);
    }

    /// Unaligned load, left part. The pair LWL/LWR reads around an
    /// unaligned word in two instructions; each one merges bytes into
    /// the target, observing a still-pending load of the same register.
    fn op_lwl(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());

        let current = self.out_regs[i.t().0 as usize];

        let aligned = self.bus.load32(address & !3);
        let value = match address & 3 {
            0 => (current & 0x00FF_FFFF) | (aligned << 24),
            1 => (current & 0x0000_FFFF) | (aligned << 16),
            2 => (current & 0x0000_00FF) | (aligned << 8),
            _ => aligned,
        };

        self.load = (i.t(), value);
    }

    /// Unaligned load, right part
    fn op_lwr(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());

        let current = self.out_regs[i.t().0 as usize];

        let aligned = self.bus.load32(address & !3);
        let value = match address & 3 {
            0 => aligned,
            1 => (current & 0xFF00_0000) | (aligned >> 8),
            2 => (current & 0xFFFF_0000) | (aligned >> 16),
            _ => (current & 0xFFFF_FF00) | (aligned >> 24),
        };

        self.load = (i.t(), value);
    }

    /// Unaligned store, left part
    fn op_swl(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());
        let value = self.reg(i.t().0);

        let aligned_address = address & !3;
        let current = self.bus.load32(aligned_address);

        let merged = match address & 3 {
            0 => (current & 0xFFFF_FF00) | (value >> 24),
            1 => (current & 0xFFFF_0000) | (value >> 16),
            2 => (current & 0xFF00_0000) | (value >> 8),
            _ => value,
        };

        self.store32(aligned_address, merged);
    }

    /// Unaligned store, right part
    fn op_swr(&mut self, i: Instruction) {
        let address = self.reg(i.s().0).wrapping_add(i.imm_se());
        let value = self.reg(i.t().0);

        let aligned_address = address & !3;
        let current = self.bus.load32(aligned_address);

        let merged = match address & 3 {
            0 => value,
            1 => (current & 0x0000_00FF) | (value << 8),
            2 => (current & 0x0000_FFFF) | (value << 16),
            _ => (current & 0x00FF_FFFF) | (value << 24),
        };

        self.store32(aligned_address, merged);
    }
}
