//! 6502 CPU core (NES 2A03 variant: no decimal mode arithmetic).
//!
//! A table-driven, instruction-stepped interpreter. Each `step` decodes one
//! opcode through [`opcodes::OPCODES`], resolves its addressing mode, executes,
//! and returns the cycles consumed including page-crossing and branch
//! penalties plus any DMA stall the bus accumulated. Decoding an opcode with
//! no table entry is a fatal [`CpuCrash`] surfaced at the frame boundary.

use crate::{
    cpu::{
        opcodes::{AddrMode, Mnemonic, OPCODES},
        status::Status,
    },
    memory::cpu as cpu_mem,
    reset_kind::ResetKind,
};

pub mod opcodes;
pub mod status;

/// Memory interface the CPU executes against.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, data: u8);

    /// Cycles stolen from the CPU by DMA since the last call (sprite DMA,
    /// DMC fetches).
    fn take_stall_cycles(&mut self) -> u32 {
        0
    }
}

/// Fatal decode failure: the opcode matched no table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCrash {
    pub pc: u16,
    pub opcode: u8,
}

/// Serializable CPU payload for save states.
#[cfg_attr(
    feature = "savestate-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuState {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub status: u8,
    pub nmi_pending: bool,
    pub irq_line: bool,
    pub cycles: u64,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer; the stack lives at `$0100 + sp`.
    pub sp: u8,
    pub pc: u16,
    pub status: Status,

    /// Latched NMI edge, consumed by the next `step`.
    nmi_pending: bool,
    /// Level of the shared IRQ line (APU frame/DMC, mapper).
    irq_line: bool,

    cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            status: Status::power_on(),
            nmi_pending: false,
            irq_line: false,
            cycles: 0,
        }
    }

    /// Runs the reset sequence: loads PC from the reset vector and masks
    /// interrupts. A power-on reset also reinitializes the registers; a soft
    /// reset preserves A/X/Y and only drops SP by three.
    pub fn reset(&mut self, bus: &mut impl CpuBus, kind: ResetKind) {
        match kind {
            ResetKind::PowerOn => {
                self.a = 0;
                self.x = 0;
                self.y = 0;
                self.sp = 0xFD;
                self.status = Status::power_on();
                self.cycles = 0;
            }
            ResetKind::Soft => {
                self.sp = self.sp.wrapping_sub(3);
                self.status.insert(Status::IRQ_OFF);
            }
        }
        self.nmi_pending = false;
        self.irq_line = false;
        self.pc = self.read16(bus, cpu_mem::RESET_VECTOR);
        self.cycles += 7;
    }

    /// Latches an NMI edge; serviced before the next instruction.
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Drives the level-sensitive IRQ line.
    pub fn set_irq_line(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }

    /// Executes one instruction (or services a pending interrupt) and
    /// returns the CPU cycles consumed.
    pub fn step(&mut self, bus: &mut impl CpuBus) -> Result<u32, CpuCrash> {
        // Interrupt gate: NMI beats IRQ; IRQ only fires with I clear.
        if self.nmi_pending {
            self.nmi_pending = false;
            self.service_interrupt(bus, cpu_mem::NMI_VECTOR);
            self.cycles += 7;
            return Ok(7);
        }
        if self.irq_line && !self.status.contains(Status::IRQ_OFF) {
            self.service_interrupt(bus, cpu_mem::IRQ_VECTOR);
            self.cycles += 7;
            return Ok(7);
        }

        let op_pc = self.pc;
        let opcode = bus.read(op_pc);
        let entry = OPCODES[opcode as usize];
        if entry.mnemonic == Mnemonic::Jam {
            return Err(CpuCrash { pc: op_pc, opcode });
        }
        self.pc = self.pc.wrapping_add(1);

        let (addr, crossed) = self.resolve(bus, entry.mode);
        let mut cycles = u32::from(entry.cycles);
        if entry.page_penalty && crossed {
            cycles += 1;
        }

        self.execute(bus, entry.mnemonic, entry.mode, addr, &mut cycles);

        cycles += bus.take_stall_cycles();
        self.cycles += u64::from(cycles);
        Ok(cycles)
    }

    // =========================================================================
    // Memory primitives
    // =========================================================================

    fn read16(&mut self, bus: &mut impl CpuBus, addr: u16) -> u16 {
        let lo = bus.read(addr);
        let hi = bus.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// 16-bit read reproducing the 6502's page-wrap bug: the high byte comes
    /// from the start of the same page when the pointer sits on `$xxFF`.
    fn read16_bug(&mut self, bus: &mut impl CpuBus, addr: u16) -> u16 {
        let lo = bus.read(addr);
        let hi_addr = (addr & 0xFF00) | u16::from((addr as u8).wrapping_add(1));
        let hi = bus.read(hi_addr);
        u16::from_le_bytes([lo, hi])
    }

    /// 16-bit read from the zero page, wrapping within it.
    fn read16_zp(&mut self, bus: &mut impl CpuBus, zp: u8) -> u16 {
        let lo = bus.read(u16::from(zp));
        let hi = bus.read(u16::from(zp.wrapping_add(1)));
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, bus: &mut impl CpuBus, value: u8) {
        bus.write(cpu_mem::STACK_PAGE + u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn push16(&mut self, bus: &mut impl CpuBus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pull(&mut self, bus: &mut impl CpuBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(cpu_mem::STACK_PAGE + u16::from(self.sp))
    }

    fn pull16(&mut self, bus: &mut impl CpuBus) -> u16 {
        let lo = self.pull(bus);
        let hi = self.pull(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn service_interrupt(&mut self, bus: &mut impl CpuBus, vector: u16) {
        self.push16(bus, self.pc);
        let pushed = self.status.pushed_by_interrupt();
        self.push(bus, pushed);
        self.status.insert(Status::IRQ_OFF);
        self.pc = self.read16(bus, vector);
    }

    // =========================================================================
    // Addressing
    // =========================================================================

    /// Resolves the operand address, advancing PC past the operand bytes.
    /// Returns the effective address and whether indexing crossed a page.
    fn resolve(&mut self, bus: &mut impl CpuBus, mode: AddrMode) -> (u16, bool) {
        match mode {
            AddrMode::Implied | AddrMode::Accumulator => (0, false),
            AddrMode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (addr, false)
            }
            AddrMode::ZeroPage => {
                let addr = u16::from(self.fetch(bus));
                (addr, false)
            }
            AddrMode::ZeroPageX => {
                let base = self.fetch(bus);
                (u16::from(base.wrapping_add(self.x)), false)
            }
            AddrMode::ZeroPageY => {
                let base = self.fetch(bus);
                (u16::from(base.wrapping_add(self.y)), false)
            }
            AddrMode::Absolute => {
                let addr = self.fetch16(bus);
                (addr, false)
            }
            AddrMode::AbsoluteX => {
                let base = self.fetch16(bus);
                let addr = base.wrapping_add(u16::from(self.x));
                (addr, crossed_page(base, addr))
            }
            AddrMode::AbsoluteY => {
                let base = self.fetch16(bus);
                let addr = base.wrapping_add(u16::from(self.y));
                (addr, crossed_page(base, addr))
            }
            AddrMode::Indirect => {
                let pointer = self.fetch16(bus);
                let addr = self.read16_bug(bus, pointer);
                (addr, false)
            }
            AddrMode::IndirectX => {
                let pointer = self.fetch(bus).wrapping_add(self.x);
                let addr = self.read16_zp(bus, pointer);
                (addr, false)
            }
            AddrMode::IndirectY => {
                let pointer = self.fetch(bus);
                let base = self.read16_zp(bus, pointer);
                let addr = base.wrapping_add(u16::from(self.y));
                (addr, crossed_page(base, addr))
            }
            AddrMode::Relative => {
                let offset = self.fetch(bus) as i8;
                let target = self.pc.wrapping_add(offset as u16);
                (target, crossed_page(self.pc, target))
            }
        }
    }

    fn fetch(&mut self, bus: &mut impl CpuBus) -> u8 {
        let value = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch16(&mut self, bus: &mut impl CpuBus) -> u16 {
        let value = self.read16(bus, self.pc);
        self.pc = self.pc.wrapping_add(2);
        value
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn execute(
        &mut self,
        bus: &mut impl CpuBus,
        mnemonic: Mnemonic,
        mode: AddrMode,
        addr: u16,
        cycles: &mut u32,
    ) {
        use Mnemonic::*;

        match mnemonic {
            Adc => {
                let value = bus.read(addr);
                self.adc(value);
            }
            Sbc => {
                let value = bus.read(addr);
                self.adc(value ^ 0xFF);
            }
            And => {
                self.a &= bus.read(addr);
                self.status.set_zn(self.a);
            }
            Ora => {
                self.a |= bus.read(addr);
                self.status.set_zn(self.a);
            }
            Eor => {
                self.a ^= bus.read(addr);
                self.status.set_zn(self.a);
            }
            Asl => {
                let value = self.read_operand(bus, mode, addr);
                let result = self.asl(value);
                self.write_operand(bus, mode, addr, result);
            }
            Lsr => {
                let value = self.read_operand(bus, mode, addr);
                let result = self.lsr(value);
                self.write_operand(bus, mode, addr, result);
            }
            Rol => {
                let value = self.read_operand(bus, mode, addr);
                let result = self.rol(value);
                self.write_operand(bus, mode, addr, result);
            }
            Ror => {
                let value = self.read_operand(bus, mode, addr);
                let result = self.ror(value);
                self.write_operand(bus, mode, addr, result);
            }
            Bit => {
                let value = bus.read(addr);
                self.status.set(Status::ZERO, self.a & value == 0);
                self.status.set(Status::OVERFLOW, value & 0x40 != 0);
                self.status.set(Status::NEGATIVE, value & 0x80 != 0);
            }
            Cmp => {
                let value = bus.read(addr);
                self.compare(self.a, value);
            }
            Cpx => {
                let value = bus.read(addr);
                self.compare(self.x, value);
            }
            Cpy => {
                let value = bus.read(addr);
                self.compare(self.y, value);
            }
            Dec => {
                let value = bus.read(addr).wrapping_sub(1);
                bus.write(addr, value);
                self.status.set_zn(value);
            }
            Inc => {
                let value = bus.read(addr).wrapping_add(1);
                bus.write(addr, value);
                self.status.set_zn(value);
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.status.set_zn(self.x);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.status.set_zn(self.y);
            }
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.status.set_zn(self.x);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.status.set_zn(self.y);
            }
            Lda => {
                self.a = bus.read(addr);
                self.status.set_zn(self.a);
            }
            Ldx => {
                self.x = bus.read(addr);
                self.status.set_zn(self.x);
            }
            Ldy => {
                self.y = bus.read(addr);
                self.status.set_zn(self.y);
            }
            Sta => bus.write(addr, self.a),
            Stx => bus.write(addr, self.x),
            Sty => bus.write(addr, self.y),
            Tax => {
                self.x = self.a;
                self.status.set_zn(self.x);
            }
            Tay => {
                self.y = self.a;
                self.status.set_zn(self.y);
            }
            Tsx => {
                self.x = self.sp;
                self.status.set_zn(self.x);
            }
            Txa => {
                self.a = self.x;
                self.status.set_zn(self.a);
            }
            Txs => self.sp = self.x,
            Tya => {
                self.a = self.y;
                self.status.set_zn(self.a);
            }
            Jmp => self.pc = addr,
            Jsr => {
                self.push16(bus, self.pc.wrapping_sub(1));
                self.pc = addr;
            }
            Rts => {
                self.pc = self.pull16(bus).wrapping_add(1);
            }
            Rti => {
                let pulled = self.pull(bus);
                self.status = Status::from_pulled(pulled);
                self.pc = self.pull16(bus);
            }
            Brk => {
                // BRK pushes the address after its padding byte, then the
                // status with the break bit set.
                self.push16(bus, self.pc.wrapping_add(1));
                let pushed = self.status.pushed_by_instruction();
                self.push(bus, pushed);
                self.status.insert(Status::IRQ_OFF);
                self.pc = self.read16(bus, cpu_mem::IRQ_VECTOR);
            }
            Pha => self.push(bus, self.a),
            Php => {
                let pushed = self.status.pushed_by_instruction();
                self.push(bus, pushed);
            }
            Pla => {
                self.a = self.pull(bus);
                self.status.set_zn(self.a);
            }
            Plp => {
                let pulled = self.pull(bus);
                self.status = Status::from_pulled(pulled);
            }
            Bcc => self.branch(!self.status.contains(Status::CARRY), addr, cycles),
            Bcs => self.branch(self.status.contains(Status::CARRY), addr, cycles),
            Beq => self.branch(self.status.contains(Status::ZERO), addr, cycles),
            Bne => self.branch(!self.status.contains(Status::ZERO), addr, cycles),
            Bmi => self.branch(self.status.contains(Status::NEGATIVE), addr, cycles),
            Bpl => self.branch(!self.status.contains(Status::NEGATIVE), addr, cycles),
            Bvc => self.branch(!self.status.contains(Status::OVERFLOW), addr, cycles),
            Bvs => self.branch(self.status.contains(Status::OVERFLOW), addr, cycles),
            Clc => self.status.remove(Status::CARRY),
            Cld => self.status.remove(Status::DECIMAL),
            Cli => self.status.remove(Status::IRQ_OFF),
            Clv => self.status.remove(Status::OVERFLOW),
            Sec => self.status.insert(Status::CARRY),
            Sed => self.status.insert(Status::DECIMAL),
            Sei => self.status.insert(Status::IRQ_OFF),
            Nop => {}

            // Undocumented opcodes ------------------------------------------
            Lax => {
                let value = bus.read(addr);
                self.a = value;
                self.x = value;
                self.status.set_zn(value);
            }
            Sax => bus.write(addr, self.a & self.x),
            Dcp => {
                let value = bus.read(addr).wrapping_sub(1);
                bus.write(addr, value);
                self.compare(self.a, value);
            }
            Isc => {
                let value = bus.read(addr).wrapping_add(1);
                bus.write(addr, value);
                self.adc(value ^ 0xFF);
            }
            Slo => {
                let value = bus.read(addr);
                let shifted = self.asl(value);
                bus.write(addr, shifted);
                self.a |= shifted;
                self.status.set_zn(self.a);
            }
            Sre => {
                let value = bus.read(addr);
                let shifted = self.lsr(value);
                bus.write(addr, shifted);
                self.a ^= shifted;
                self.status.set_zn(self.a);
            }
            Rla => {
                let value = bus.read(addr);
                let rolled = self.rol(value);
                bus.write(addr, rolled);
                self.a &= rolled;
                self.status.set_zn(self.a);
            }
            Rra => {
                let value = bus.read(addr);
                let rolled = self.ror(value);
                bus.write(addr, rolled);
                self.adc(rolled);
            }
            Anc => {
                self.a &= bus.read(addr);
                self.status.set_zn(self.a);
                self.status
                    .set(Status::CARRY, self.status.contains(Status::NEGATIVE));
            }
            Alr => {
                self.a &= bus.read(addr);
                self.a = self.lsr(self.a);
            }
            Arr => {
                self.a &= bus.read(addr);
                let carry_in = self.status.contains(Status::CARRY) as u8;
                let result = (self.a >> 1) | (carry_in << 7);
                self.a = result;
                self.status.set_zn(result);
                self.status.set(Status::CARRY, result & 0x40 != 0);
                self.status
                    .set(Status::OVERFLOW, ((result >> 6) ^ (result >> 5)) & 1 != 0);
            }
            Axs => {
                let operand = bus.read(addr);
                let base = self.a & self.x;
                self.status.set(Status::CARRY, base >= operand);
                self.x = base.wrapping_sub(operand);
                self.status.set_zn(self.x);
            }
            Skb => {}
            Ign => {
                // The read still happens; some games use this against
                // read-sensitive registers.
                let _ = bus.read(addr);
            }
            Jam => unreachable!("jam opcodes are rejected before execution"),
        }
    }

    fn branch(&mut self, taken: bool, target: u16, cycles: &mut u32) {
        if taken {
            *cycles += 1;
            if crossed_page(self.pc, target) {
                *cycles += 1;
            }
            self.pc = target;
        }
    }

    fn adc(&mut self, value: u8) {
        let carry = self.status.contains(Status::CARRY) as u16;
        let sum = u16::from(self.a) + u16::from(value) + carry;
        let result = sum as u8;
        self.status.set(Status::CARRY, sum > 0xFF);
        self.status
            .set(Status::OVERFLOW, (self.a ^ result) & (value ^ result) & 0x80 != 0);
        self.a = result;
        self.status.set_zn(result);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.status.set(Status::CARRY, register >= value);
        self.status.set_zn(register.wrapping_sub(value));
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.status.set(Status::CARRY, value & 0x80 != 0);
        let result = value << 1;
        self.status.set_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.status.set(Status::CARRY, value & 0x01 != 0);
        let result = value >> 1;
        self.status.set_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.status.contains(Status::CARRY) as u8;
        self.status.set(Status::CARRY, value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.status.set_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = self.status.contains(Status::CARRY) as u8;
        self.status.set(Status::CARRY, value & 0x01 != 0);
        let result = (value >> 1) | (carry_in << 7);
        self.status.set_zn(result);
        result
    }

    fn read_operand(&mut self, bus: &mut impl CpuBus, mode: AddrMode, addr: u16) -> u8 {
        if mode == AddrMode::Accumulator {
            self.a
        } else {
            bus.read(addr)
        }
    }

    fn write_operand(&mut self, bus: &mut impl CpuBus, mode: AddrMode, addr: u16, value: u8) {
        if mode == AddrMode::Accumulator {
            self.a = value;
        } else {
            bus.write(addr, value);
        }
    }

    // =========================================================================
    // Save states
    // =========================================================================

    pub fn save_state(&self) -> CpuState {
        CpuState {
            a: self.a,
            x: self.x,
            y: self.y,
            sp: self.sp,
            pc: self.pc,
            status: self.status.bits(),
            nmi_pending: self.nmi_pending,
            irq_line: self.irq_line,
            cycles: self.cycles,
        }
    }

    pub fn load_state(&mut self, state: &CpuState) {
        self.a = state.a;
        self.x = state.x;
        self.y = state.y;
        self.sp = state.sp;
        self.pc = state.pc;
        self.status = Status::from_bits_truncate(state.status) | Status::UNUSED;
        self.nmi_pending = state.nmi_pending;
        self.irq_line = state.irq_line;
        self.cycles = state.cycles;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn crossed_page(a: u16, b: u16) -> bool {
    a & 0xFF00 != b & 0xFF00
}
