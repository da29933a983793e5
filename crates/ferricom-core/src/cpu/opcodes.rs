//! Pre-computed 6502 opcode table.
//!
//! Each of the 256 opcodes decodes to a mnemonic, an addressing mode, the
//! instruction size, the base cycle count, and whether indexed reads pay the
//! page-crossing penalty. Undocumented opcodes that games actually use (the
//! LAX/SAX family, the read-modify-write combos, and the multi-byte NOPs)
//! are first-class entries; everything else is `Jam` and halts the machine.

/// Instruction mnemonics, official and undocumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    // Undocumented.
    Alr, Anc, Arr, Axs, Dcp, Isc, Lax, Rla, Rra, Sax, Slo, Sre,
    /// Two-byte NOP consuming an immediate (a.k.a. SKB).
    Skb,
    /// NOP with a memory operand whose read still happens (a.k.a. IGN).
    Ign,
    /// Unimplemented opcode: halts the CPU.
    Jam,
}

/// 6502 addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// `JMP ($hhll)` with the page-wrap fetch bug.
    Indirect,
    /// `(zp,X)` pre-indexed.
    IndirectX,
    /// `(zp),Y` post-indexed.
    IndirectY,
    Relative,
}

/// One decoded opcode-table entry.
#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
    pub bytes: u8,
    pub cycles: u8,
    /// Add one cycle when an indexed effective address crosses a page.
    pub page_penalty: bool,
}

const JAM: Opcode = Opcode {
    mnemonic: Mnemonic::Jam,
    mode: AddrMode::Implied,
    bytes: 1,
    cycles: 2,
    page_penalty: false,
};

const fn op(mnemonic: Mnemonic, mode: AddrMode, bytes: u8, cycles: u8) -> Opcode {
    Opcode {
        mnemonic,
        mode,
        bytes,
        cycles,
        page_penalty: false,
    }
}

/// Read instruction whose indexed forms pay the page-crossing cycle.
const fn op_pg(mnemonic: Mnemonic, mode: AddrMode, bytes: u8, cycles: u8) -> Opcode {
    Opcode {
        mnemonic,
        mode,
        bytes,
        cycles,
        page_penalty: true,
    }
}

pub static OPCODES: [Opcode; 256] = build_table();

#[rustfmt::skip]
const fn build_table() -> [Opcode; 256] {
    use AddrMode::*;
    use Mnemonic::*;

    let mut t = [JAM; 256];

    // ADC
    t[0x69] = op(Adc, Immediate, 2, 2);
    t[0x65] = op(Adc, ZeroPage, 2, 3);
    t[0x75] = op(Adc, ZeroPageX, 2, 4);
    t[0x6D] = op(Adc, Absolute, 3, 4);
    t[0x7D] = op_pg(Adc, AbsoluteX, 3, 4);
    t[0x79] = op_pg(Adc, AbsoluteY, 3, 4);
    t[0x61] = op(Adc, IndirectX, 2, 6);
    t[0x71] = op_pg(Adc, IndirectY, 2, 5);
    // AND
    t[0x29] = op(And, Immediate, 2, 2);
    t[0x25] = op(And, ZeroPage, 2, 3);
    t[0x35] = op(And, ZeroPageX, 2, 4);
    t[0x2D] = op(And, Absolute, 3, 4);
    t[0x3D] = op_pg(And, AbsoluteX, 3, 4);
    t[0x39] = op_pg(And, AbsoluteY, 3, 4);
    t[0x21] = op(And, IndirectX, 2, 6);
    t[0x31] = op_pg(And, IndirectY, 2, 5);
    // ASL
    t[0x0A] = op(Asl, Accumulator, 1, 2);
    t[0x06] = op(Asl, ZeroPage, 2, 5);
    t[0x16] = op(Asl, ZeroPageX, 2, 6);
    t[0x0E] = op(Asl, Absolute, 3, 6);
    t[0x1E] = op(Asl, AbsoluteX, 3, 7);
    // Branches
    t[0x90] = op(Bcc, Relative, 2, 2);
    t[0xB0] = op(Bcs, Relative, 2, 2);
    t[0xF0] = op(Beq, Relative, 2, 2);
    t[0x30] = op(Bmi, Relative, 2, 2);
    t[0xD0] = op(Bne, Relative, 2, 2);
    t[0x10] = op(Bpl, Relative, 2, 2);
    t[0x50] = op(Bvc, Relative, 2, 2);
    t[0x70] = op(Bvs, Relative, 2, 2);
    // BIT
    t[0x24] = op(Bit, ZeroPage, 2, 3);
    t[0x2C] = op(Bit, Absolute, 3, 4);
    // BRK
    t[0x00] = op(Brk, Implied, 1, 7);
    // Flag operations
    t[0x18] = op(Clc, Implied, 1, 2);
    t[0xD8] = op(Cld, Implied, 1, 2);
    t[0x58] = op(Cli, Implied, 1, 2);
    t[0xB8] = op(Clv, Implied, 1, 2);
    t[0x38] = op(Sec, Implied, 1, 2);
    t[0xF8] = op(Sed, Implied, 1, 2);
    t[0x78] = op(Sei, Implied, 1, 2);
    // CMP
    t[0xC9] = op(Cmp, Immediate, 2, 2);
    t[0xC5] = op(Cmp, ZeroPage, 2, 3);
    t[0xD5] = op(Cmp, ZeroPageX, 2, 4);
    t[0xCD] = op(Cmp, Absolute, 3, 4);
    t[0xDD] = op_pg(Cmp, AbsoluteX, 3, 4);
    t[0xD9] = op_pg(Cmp, AbsoluteY, 3, 4);
    t[0xC1] = op(Cmp, IndirectX, 2, 6);
    t[0xD1] = op_pg(Cmp, IndirectY, 2, 5);
    // CPX / CPY
    t[0xE0] = op(Cpx, Immediate, 2, 2);
    t[0xE4] = op(Cpx, ZeroPage, 2, 3);
    t[0xEC] = op(Cpx, Absolute, 3, 4);
    t[0xC0] = op(Cpy, Immediate, 2, 2);
    t[0xC4] = op(Cpy, ZeroPage, 2, 3);
    t[0xCC] = op(Cpy, Absolute, 3, 4);
    // DEC
    t[0xC6] = op(Dec, ZeroPage, 2, 5);
    t[0xD6] = op(Dec, ZeroPageX, 2, 6);
    t[0xCE] = op(Dec, Absolute, 3, 6);
    t[0xDE] = op(Dec, AbsoluteX, 3, 7);
    t[0xCA] = op(Dex, Implied, 1, 2);
    t[0x88] = op(Dey, Implied, 1, 2);
    // EOR
    t[0x49] = op(Eor, Immediate, 2, 2);
    t[0x45] = op(Eor, ZeroPage, 2, 3);
    t[0x55] = op(Eor, ZeroPageX, 2, 4);
    t[0x4D] = op(Eor, Absolute, 3, 4);
    t[0x5D] = op_pg(Eor, AbsoluteX, 3, 4);
    t[0x59] = op_pg(Eor, AbsoluteY, 3, 4);
    t[0x41] = op(Eor, IndirectX, 2, 6);
    t[0x51] = op_pg(Eor, IndirectY, 2, 5);
    // INC
    t[0xE6] = op(Inc, ZeroPage, 2, 5);
    t[0xF6] = op(Inc, ZeroPageX, 2, 6);
    t[0xEE] = op(Inc, Absolute, 3, 6);
    t[0xFE] = op(Inc, AbsoluteX, 3, 7);
    t[0xE8] = op(Inx, Implied, 1, 2);
    t[0xC8] = op(Iny, Implied, 1, 2);
    // JMP / JSR
    t[0x4C] = op(Jmp, Absolute, 3, 3);
    t[0x6C] = op(Jmp, Indirect, 3, 5);
    t[0x20] = op(Jsr, Absolute, 3, 6);
    // LDA
    t[0xA9] = op(Lda, Immediate, 2, 2);
    t[0xA5] = op(Lda, ZeroPage, 2, 3);
    t[0xB5] = op(Lda, ZeroPageX, 2, 4);
    t[0xAD] = op(Lda, Absolute, 3, 4);
    t[0xBD] = op_pg(Lda, AbsoluteX, 3, 4);
    t[0xB9] = op_pg(Lda, AbsoluteY, 3, 4);
    t[0xA1] = op(Lda, IndirectX, 2, 6);
    t[0xB1] = op_pg(Lda, IndirectY, 2, 5);
    // LDX / LDY
    t[0xA2] = op(Ldx, Immediate, 2, 2);
    t[0xA6] = op(Ldx, ZeroPage, 2, 3);
    t[0xB6] = op(Ldx, ZeroPageY, 2, 4);
    t[0xAE] = op(Ldx, Absolute, 3, 4);
    t[0xBE] = op_pg(Ldx, AbsoluteY, 3, 4);
    t[0xA0] = op(Ldy, Immediate, 2, 2);
    t[0xA4] = op(Ldy, ZeroPage, 2, 3);
    t[0xB4] = op(Ldy, ZeroPageX, 2, 4);
    t[0xAC] = op(Ldy, Absolute, 3, 4);
    t[0xBC] = op_pg(Ldy, AbsoluteX, 3, 4);
    // LSR
    t[0x4A] = op(Lsr, Accumulator, 1, 2);
    t[0x46] = op(Lsr, ZeroPage, 2, 5);
    t[0x56] = op(Lsr, ZeroPageX, 2, 6);
    t[0x4E] = op(Lsr, Absolute, 3, 6);
    t[0x5E] = op(Lsr, AbsoluteX, 3, 7);
    // NOP (official and the common one-byte variants)
    t[0xEA] = op(Nop, Implied, 1, 2);
    t[0x1A] = op(Nop, Implied, 1, 2);
    t[0x3A] = op(Nop, Implied, 1, 2);
    t[0x5A] = op(Nop, Implied, 1, 2);
    t[0x7A] = op(Nop, Implied, 1, 2);
    t[0xDA] = op(Nop, Implied, 1, 2);
    t[0xFA] = op(Nop, Implied, 1, 2);
    // ORA
    t[0x09] = op(Ora, Immediate, 2, 2);
    t[0x05] = op(Ora, ZeroPage, 2, 3);
    t[0x15] = op(Ora, ZeroPageX, 2, 4);
    t[0x0D] = op(Ora, Absolute, 3, 4);
    t[0x1D] = op_pg(Ora, AbsoluteX, 3, 4);
    t[0x19] = op_pg(Ora, AbsoluteY, 3, 4);
    t[0x01] = op(Ora, IndirectX, 2, 6);
    t[0x11] = op_pg(Ora, IndirectY, 2, 5);
    // Stack
    t[0x48] = op(Pha, Implied, 1, 3);
    t[0x08] = op(Php, Implied, 1, 3);
    t[0x68] = op(Pla, Implied, 1, 4);
    t[0x28] = op(Plp, Implied, 1, 4);
    // ROL / ROR
    t[0x2A] = op(Rol, Accumulator, 1, 2);
    t[0x26] = op(Rol, ZeroPage, 2, 5);
    t[0x36] = op(Rol, ZeroPageX, 2, 6);
    t[0x2E] = op(Rol, Absolute, 3, 6);
    t[0x3E] = op(Rol, AbsoluteX, 3, 7);
    t[0x6A] = op(Ror, Accumulator, 1, 2);
    t[0x66] = op(Ror, ZeroPage, 2, 5);
    t[0x76] = op(Ror, ZeroPageX, 2, 6);
    t[0x6E] = op(Ror, Absolute, 3, 6);
    t[0x7E] = op(Ror, AbsoluteX, 3, 7);
    // Returns
    t[0x40] = op(Rti, Implied, 1, 6);
    t[0x60] = op(Rts, Implied, 1, 6);
    // SBC (with the undocumented $EB alias)
    t[0xE9] = op(Sbc, Immediate, 2, 2);
    t[0xEB] = op(Sbc, Immediate, 2, 2);
    t[0xE5] = op(Sbc, ZeroPage, 2, 3);
    t[0xF5] = op(Sbc, ZeroPageX, 2, 4);
    t[0xED] = op(Sbc, Absolute, 3, 4);
    t[0xFD] = op_pg(Sbc, AbsoluteX, 3, 4);
    t[0xF9] = op_pg(Sbc, AbsoluteY, 3, 4);
    t[0xE1] = op(Sbc, IndirectX, 2, 6);
    t[0xF1] = op_pg(Sbc, IndirectY, 2, 5);
    // Stores (no page penalty: the dummy read always happens)
    t[0x85] = op(Sta, ZeroPage, 2, 3);
    t[0x95] = op(Sta, ZeroPageX, 2, 4);
    t[0x8D] = op(Sta, Absolute, 3, 4);
    t[0x9D] = op(Sta, AbsoluteX, 3, 5);
    t[0x99] = op(Sta, AbsoluteY, 3, 5);
    t[0x81] = op(Sta, IndirectX, 2, 6);
    t[0x91] = op(Sta, IndirectY, 2, 6);
    t[0x86] = op(Stx, ZeroPage, 2, 3);
    t[0x96] = op(Stx, ZeroPageY, 2, 4);
    t[0x8E] = op(Stx, Absolute, 3, 4);
    t[0x84] = op(Sty, ZeroPage, 2, 3);
    t[0x94] = op(Sty, ZeroPageX, 2, 4);
    t[0x8C] = op(Sty, Absolute, 3, 4);
    // Transfers
    t[0xAA] = op(Tax, Implied, 1, 2);
    t[0xA8] = op(Tay, Implied, 1, 2);
    t[0xBA] = op(Tsx, Implied, 1, 2);
    t[0x8A] = op(Txa, Implied, 1, 2);
    t[0x9A] = op(Txs, Implied, 1, 2);
    t[0x98] = op(Tya, Implied, 1, 2);

    // ---- Undocumented opcodes ------------------------------------------
    // LAX: load A and X together.
    t[0xA7] = op(Lax, ZeroPage, 2, 3);
    t[0xB7] = op(Lax, ZeroPageY, 2, 4);
    t[0xAF] = op(Lax, Absolute, 3, 4);
    t[0xBF] = op_pg(Lax, AbsoluteY, 3, 4);
    t[0xA3] = op(Lax, IndirectX, 2, 6);
    t[0xB3] = op_pg(Lax, IndirectY, 2, 5);
    // SAX: store A & X.
    t[0x87] = op(Sax, ZeroPage, 2, 3);
    t[0x97] = op(Sax, ZeroPageY, 2, 4);
    t[0x8F] = op(Sax, Absolute, 3, 4);
    t[0x83] = op(Sax, IndirectX, 2, 6);
    // DCP: DEC then CMP.
    t[0xC7] = op(Dcp, ZeroPage, 2, 5);
    t[0xD7] = op(Dcp, ZeroPageX, 2, 6);
    t[0xCF] = op(Dcp, Absolute, 3, 6);
    t[0xDF] = op(Dcp, AbsoluteX, 3, 7);
    t[0xDB] = op(Dcp, AbsoluteY, 3, 7);
    t[0xC3] = op(Dcp, IndirectX, 2, 8);
    t[0xD3] = op(Dcp, IndirectY, 2, 8);
    // ISC: INC then SBC.
    t[0xE7] = op(Isc, ZeroPage, 2, 5);
    t[0xF7] = op(Isc, ZeroPageX, 2, 6);
    t[0xEF] = op(Isc, Absolute, 3, 6);
    t[0xFF] = op(Isc, AbsoluteX, 3, 7);
    t[0xFB] = op(Isc, AbsoluteY, 3, 7);
    t[0xE3] = op(Isc, IndirectX, 2, 8);
    t[0xF3] = op(Isc, IndirectY, 2, 8);
    // RLA: ROL then AND.
    t[0x27] = op(Rla, ZeroPage, 2, 5);
    t[0x37] = op(Rla, ZeroPageX, 2, 6);
    t[0x2F] = op(Rla, Absolute, 3, 6);
    t[0x3F] = op(Rla, AbsoluteX, 3, 7);
    t[0x3B] = op(Rla, AbsoluteY, 3, 7);
    t[0x23] = op(Rla, IndirectX, 2, 8);
    t[0x33] = op(Rla, IndirectY, 2, 8);
    // RRA: ROR then ADC.
    t[0x67] = op(Rra, ZeroPage, 2, 5);
    t[0x77] = op(Rra, ZeroPageX, 2, 6);
    t[0x6F] = op(Rra, Absolute, 3, 6);
    t[0x7F] = op(Rra, AbsoluteX, 3, 7);
    t[0x7B] = op(Rra, AbsoluteY, 3, 7);
    t[0x63] = op(Rra, IndirectX, 2, 8);
    t[0x73] = op(Rra, IndirectY, 2, 8);
    // SLO: ASL then ORA.
    t[0x07] = op(Slo, ZeroPage, 2, 5);
    t[0x17] = op(Slo, ZeroPageX, 2, 6);
    t[0x0F] = op(Slo, Absolute, 3, 6);
    t[0x1F] = op(Slo, AbsoluteX, 3, 7);
    t[0x1B] = op(Slo, AbsoluteY, 3, 7);
    t[0x03] = op(Slo, IndirectX, 2, 8);
    t[0x13] = op(Slo, IndirectY, 2, 8);
    // SRE: LSR then EOR.
    t[0x47] = op(Sre, ZeroPage, 2, 5);
    t[0x57] = op(Sre, ZeroPageX, 2, 6);
    t[0x4F] = op(Sre, Absolute, 3, 6);
    t[0x5F] = op(Sre, AbsoluteX, 3, 7);
    t[0x5B] = op(Sre, AbsoluteY, 3, 7);
    t[0x43] = op(Sre, IndirectX, 2, 8);
    t[0x53] = op(Sre, IndirectY, 2, 8);
    // Immediate-only combinations.
    t[0x0B] = op(Anc, Immediate, 2, 2);
    t[0x2B] = op(Anc, Immediate, 2, 2);
    t[0x4B] = op(Alr, Immediate, 2, 2);
    t[0x6B] = op(Arr, Immediate, 2, 2);
    t[0xCB] = op(Axs, Immediate, 2, 2);
    // SKB: two-byte NOPs consuming an immediate.
    t[0x80] = op(Skb, Immediate, 2, 2);
    t[0x82] = op(Skb, Immediate, 2, 2);
    t[0x89] = op(Skb, Immediate, 2, 2);
    t[0xC2] = op(Skb, Immediate, 2, 2);
    t[0xE2] = op(Skb, Immediate, 2, 2);
    // IGN: NOPs with a real memory read.
    t[0x04] = op(Ign, ZeroPage, 2, 3);
    t[0x44] = op(Ign, ZeroPage, 2, 3);
    t[0x64] = op(Ign, ZeroPage, 2, 3);
    t[0x14] = op(Ign, ZeroPageX, 2, 4);
    t[0x34] = op(Ign, ZeroPageX, 2, 4);
    t[0x54] = op(Ign, ZeroPageX, 2, 4);
    t[0x74] = op(Ign, ZeroPageX, 2, 4);
    t[0xD4] = op(Ign, ZeroPageX, 2, 4);
    t[0xF4] = op(Ign, ZeroPageX, 2, 4);
    t[0x0C] = op(Ign, Absolute, 3, 4);
    t[0x1C] = op_pg(Ign, AbsoluteX, 3, 4);
    t[0x3C] = op_pg(Ign, AbsoluteX, 3, 4);
    t[0x5C] = op_pg(Ign, AbsoluteX, 3, 4);
    t[0x7C] = op_pg(Ign, AbsoluteX, 3, 4);
    t[0xDC] = op_pg(Ign, AbsoluteX, 3, 4);
    t[0xFC] = op_pg(Ign, AbsoluteX, 3, 4);

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn official_entries_decode() {
        let lda = OPCODES[0xA9];
        assert_eq!(lda.mnemonic, Mnemonic::Lda);
        assert_eq!(lda.mode, AddrMode::Immediate);
        assert_eq!(lda.bytes, 2);
        assert_eq!(lda.cycles, 2);

        let sta = OPCODES[0x9D];
        assert_eq!(sta.mnemonic, Mnemonic::Sta);
        assert_eq!(sta.cycles, 5);
        assert!(!sta.page_penalty);
    }

    #[test]
    fn indexed_reads_carry_the_page_penalty() {
        assert!(OPCODES[0xBD].page_penalty);
        assert!(OPCODES[0xB1].page_penalty);
        assert!(!OPCODES[0xA1].page_penalty);
    }

    #[test]
    fn unassigned_opcodes_jam() {
        assert_eq!(OPCODES[0x02].mnemonic, Mnemonic::Jam);
        assert_eq!(OPCODES[0x92].mnemonic, Mnemonic::Jam);
    }

    #[test]
    fn table_covers_expected_opcode_count() {
        let implemented = OPCODES
            .iter()
            .filter(|op| op.mnemonic != Mnemonic::Jam)
            .count();
        // 151 official entries plus the undocumented roster.
        assert_eq!(implemented, 236);
    }
}
