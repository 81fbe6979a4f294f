use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    /// `(zp,X)`
    IndexedIndirect,
    /// `(zp),Y`
    IndirectIndexed,
    Relative,
}

impl AddressingMode {
    pub const fn operand_bytes(self) -> u8 {
        match self {
            Self::Implied | Self::Accumulator => 0,
            Self::Immediate
            | Self::ZeroPage
            | Self::ZeroPageX
            | Self::ZeroPageY
            | Self::IndexedIndirect
            | Self::IndirectIndexed
            | Self::Relative => 1,
            Self::Absolute | Self::AbsoluteX | Self::AbsoluteY | Self::Indirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    // Undocumented NMOS opcodes.
    Alr,
    Anc,
    Arr,
    Axs,
    Dcp,
    Isc,
    Jam,
    Las,
    Lax,
    Lxa,
    Rla,
    Rra,
    Sax,
    Sha,
    Shx,
    Shy,
    Slo,
    Sre,
    Tas,
    Xaa,
}

const MNEMONIC_NAMES: [(Mnemonic, &str); 76] = [
    (Mnemonic::Adc, "ADC"),
    (Mnemonic::And, "AND"),
    (Mnemonic::Asl, "ASL"),
    (Mnemonic::Bcc, "BCC"),
    (Mnemonic::Bcs, "BCS"),
    (Mnemonic::Beq, "BEQ"),
    (Mnemonic::Bit, "BIT"),
    (Mnemonic::Bmi, "BMI"),
    (Mnemonic::Bne, "BNE"),
    (Mnemonic::Bpl, "BPL"),
    (Mnemonic::Brk, "BRK"),
    (Mnemonic::Bvc, "BVC"),
    (Mnemonic::Bvs, "BVS"),
    (Mnemonic::Clc, "CLC"),
    (Mnemonic::Cld, "CLD"),
    (Mnemonic::Cli, "CLI"),
    (Mnemonic::Clv, "CLV"),
    (Mnemonic::Cmp, "CMP"),
    (Mnemonic::Cpx, "CPX"),
    (Mnemonic::Cpy, "CPY"),
    (Mnemonic::Dec, "DEC"),
    (Mnemonic::Dex, "DEX"),
    (Mnemonic::Dey, "DEY"),
    (Mnemonic::Eor, "EOR"),
    (Mnemonic::Inc, "INC"),
    (Mnemonic::Inx, "INX"),
    (Mnemonic::Iny, "INY"),
    (Mnemonic::Jmp, "JMP"),
    (Mnemonic::Jsr, "JSR"),
    (Mnemonic::Lda, "LDA"),
    (Mnemonic::Ldx, "LDX"),
    (Mnemonic::Ldy, "LDY"),
    (Mnemonic::Lsr, "LSR"),
    (Mnemonic::Nop, "NOP"),
    (Mnemonic::Ora, "ORA"),
    (Mnemonic::Pha, "PHA"),
    (Mnemonic::Php, "PHP"),
    (Mnemonic::Pla, "PLA"),
    (Mnemonic::Plp, "PLP"),
    (Mnemonic::Rol, "ROL"),
    (Mnemonic::Ror, "ROR"),
    (Mnemonic::Rti, "RTI"),
    (Mnemonic::Rts, "RTS"),
    (Mnemonic::Sbc, "SBC"),
    (Mnemonic::Sec, "SEC"),
    (Mnemonic::Sed, "SED"),
    (Mnemonic::Sei, "SEI"),
    (Mnemonic::Sta, "STA"),
    (Mnemonic::Stx, "STX"),
    (Mnemonic::Sty, "STY"),
    (Mnemonic::Tax, "TAX"),
    (Mnemonic::Tay, "TAY"),
    (Mnemonic::Tsx, "TSX"),
    (Mnemonic::Txa, "TXA"),
    (Mnemonic::Txs, "TXS"),
    (Mnemonic::Tya, "TYA"),
    (Mnemonic::Alr, "ALR"),
    (Mnemonic::Anc, "ANC"),
    (Mnemonic::Arr, "ARR"),
    (Mnemonic::Axs, "AXS"),
    (Mnemonic::Dcp, "DCP"),
    (Mnemonic::Isc, "ISC"),
    (Mnemonic::Jam, "JAM"),
    (Mnemonic::Las, "LAS"),
    (Mnemonic::Lax, "LAX"),
    (Mnemonic::Lxa, "LXA"),
    (Mnemonic::Rla, "RLA"),
    (Mnemonic::Rra, "RRA"),
    (Mnemonic::Sax, "SAX"),
    (Mnemonic::Sha, "SHA"),
    (Mnemonic::Shx, "SHX"),
    (Mnemonic::Shy, "SHY"),
    (Mnemonic::Slo, "SLO"),
    (Mnemonic::Sre, "SRE"),
    (Mnemonic::Tas, "TAS"),
    (Mnemonic::Xaa, "XAA"),
];

impl Mnemonic {
    pub fn name(self) -> &'static str {
        MNEMONIC_NAMES
            .iter()
            .find(|(m, _)| *m == self)
            .map(|(_, name)| *name)
            .unwrap_or("???")
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Bcc | Self::Bcs | Self::Beq | Self::Bmi | Self::Bne | Self::Bpl | Self::Bvc | Self::Bvs
        )
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mnemonic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MNEMONIC_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(m, _)| *m)
            .ok_or_else(|| format!("unknown mnemonic {s:?}"))
    }
}

/// Static decode information for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    pub size: u8,
    pub cycles: u8,
    /// Adds a cycle when indexing crosses a page boundary.
    pub page_penalty: bool,
    pub official: bool,
}

const fn op(
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
    page_penalty: bool,
) -> Instruction {
    Instruction {
        opcode,
        mnemonic,
        mode,
        size: 1 + mode.operand_bytes(),
        cycles,
        page_penalty,
        official: true,
    }
}

const fn ill(
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
    page_penalty: bool,
) -> Instruction {
    Instruction {
        official: false,
        ..op(opcode, mnemonic, mode, cycles, page_penalty)
    }
}

use AddressingMode::{
    Absolute as Abs, AbsoluteX as AbsX, AbsoluteY as AbsY, Accumulator as Acc, Immediate as Imm,
    Implied as Imp, IndexedIndirect as IzX, Indirect as Ind, IndirectIndexed as IzY,
    Relative as Rel, ZeroPage as Zp, ZeroPageX as ZpX, ZeroPageY as ZpY,
};
use Mnemonic::*;

pub static INSTRUCTIONS: [Instruction; 256] = [
    op(0x00, Brk, Imp, 7, false),
    op(0x01, Ora, IzX, 6, false),
    ill(0x02, Jam, Imp, 2, false),
    ill(0x03, Slo, IzX, 8, false),
    ill(0x04, Nop, Zp, 3, false),
    op(0x05, Ora, Zp, 3, false),
    op(0x06, Asl, Zp, 5, false),
    ill(0x07, Slo, Zp, 5, false),
    op(0x08, Php, Imp, 3, false),
    op(0x09, Ora, Imm, 2, false),
    op(0x0A, Asl, Acc, 2, false),
    ill(0x0B, Anc, Imm, 2, false),
    ill(0x0C, Nop, Abs, 4, false),
    op(0x0D, Ora, Abs, 4, false),
    op(0x0E, Asl, Abs, 6, false),
    ill(0x0F, Slo, Abs, 6, false),
    op(0x10, Bpl, Rel, 2, false),
    op(0x11, Ora, IzY, 5, true),
    ill(0x12, Jam, Imp, 2, false),
    ill(0x13, Slo, IzY, 8, false),
    ill(0x14, Nop, ZpX, 4, false),
    op(0x15, Ora, ZpX, 4, false),
    op(0x16, Asl, ZpX, 6, false),
    ill(0x17, Slo, ZpX, 6, false),
    op(0x18, Clc, Imp, 2, false),
    op(0x19, Ora, AbsY, 4, true),
    ill(0x1A, Nop, Imp, 2, false),
    ill(0x1B, Slo, AbsY, 7, false),
    ill(0x1C, Nop, AbsX, 4, true),
    op(0x1D, Ora, AbsX, 4, true),
    op(0x1E, Asl, AbsX, 7, false),
    ill(0x1F, Slo, AbsX, 7, false),
    op(0x20, Jsr, Abs, 6, false),
    op(0x21, And, IzX, 6, false),
    ill(0x22, Jam, Imp, 2, false),
    ill(0x23, Rla, IzX, 8, false),
    op(0x24, Bit, Zp, 3, false),
    op(0x25, And, Zp, 3, false),
    op(0x26, Rol, Zp, 5, false),
    ill(0x27, Rla, Zp, 5, false),
    op(0x28, Plp, Imp, 4, false),
    op(0x29, And, Imm, 2, false),
    op(0x2A, Rol, Acc, 2, false),
    ill(0x2B, Anc, Imm, 2, false),
    op(0x2C, Bit, Abs, 4, false),
    op(0x2D, And, Abs, 4, false),
    op(0x2E, Rol, Abs, 6, false),
    ill(0x2F, Rla, Abs, 6, false),
    op(0x30, Bmi, Rel, 2, false),
    op(0x31, And, IzY, 5, true),
    ill(0x32, Jam, Imp, 2, false),
    ill(0x33, Rla, IzY, 8, false),
    ill(0x34, Nop, ZpX, 4, false),
    op(0x35, And, ZpX, 4, false),
    op(0x36, Rol, ZpX, 6, false),
    ill(0x37, Rla, ZpX, 6, false),
    op(0x38, Sec, Imp, 2, false),
    op(0x39, And, AbsY, 4, true),
    ill(0x3A, Nop, Imp, 2, false),
    ill(0x3B, Rla, AbsY, 7, false),
    ill(0x3C, Nop, AbsX, 4, true),
    op(0x3D, And, AbsX, 4, true),
    op(0x3E, Rol, AbsX, 7, false),
    ill(0x3F, Rla, AbsX, 7, false),
    op(0x40, Rti, Imp, 6, false),
    op(0x41, Eor, IzX, 6, false),
    ill(0x42, Jam, Imp, 2, false),
    ill(0x43, Sre, IzX, 8, false),
    ill(0x44, Nop, Zp, 3, false),
    op(0x45, Eor, Zp, 3, false),
    op(0x46, Lsr, Zp, 5, false),
    ill(0x47, Sre, Zp, 5, false),
    op(0x48, Pha, Imp, 3, false),
    op(0x49, Eor, Imm, 2, false),
    op(0x4A, Lsr, Acc, 2, false),
    ill(0x4B, Alr, Imm, 2, false),
    op(0x4C, Jmp, Abs, 3, false),
    op(0x4D, Eor, Abs, 4, false),
    op(0x4E, Lsr, Abs, 6, false),
    ill(0x4F, Sre, Abs, 6, false),
    op(0x50, Bvc, Rel, 2, false),
    op(0x51, Eor, IzY, 5, true),
    ill(0x52, Jam, Imp, 2, false),
    ill(0x53, Sre, IzY, 8, false),
    ill(0x54, Nop, ZpX, 4, false),
    op(0x55, Eor, ZpX, 4, false),
    op(0x56, Lsr, ZpX, 6, false),
    ill(0x57, Sre, ZpX, 6, false),
    op(0x58, Cli, Imp, 2, false),
    op(0x59, Eor, AbsY, 4, true),
    ill(0x5A, Nop, Imp, 2, false),
    ill(0x5B, Sre, AbsY, 7, false),
    ill(0x5C, Nop, AbsX, 4, true),
    op(0x5D, Eor, AbsX, 4, true),
    op(0x5E, Lsr, AbsX, 7, false),
    ill(0x5F, Sre, AbsX, 7, false),
    op(0x60, Rts, Imp, 6, false),
    op(0x61, Adc, IzX, 6, false),
    ill(0x62, Jam, Imp, 2, false),
    ill(0x63, Rra, IzX, 8, false),
    ill(0x64, Nop, Zp, 3, false),
    op(0x65, Adc, Zp, 3, false),
    op(0x66, Ror, Zp, 5, false),
    ill(0x67, Rra, Zp, 5, false),
    op(0x68, Pla, Imp, 4, false),
    op(0x69, Adc, Imm, 2, false),
    op(0x6A, Ror, Acc, 2, false),
    ill(0x6B, Arr, Imm, 2, false),
    op(0x6C, Jmp, Ind, 5, false),
    op(0x6D, Adc, Abs, 4, false),
    op(0x6E, Ror, Abs, 6, false),
    ill(0x6F, Rra, Abs, 6, false),
    op(0x70, Bvs, Rel, 2, false),
    op(0x71, Adc, IzY, 5, true),
    ill(0x72, Jam, Imp, 2, false),
    ill(0x73, Rra, IzY, 8, false),
    ill(0x74, Nop, ZpX, 4, false),
    op(0x75, Adc, ZpX, 4, false),
    op(0x76, Ror, ZpX, 6, false),
    ill(0x77, Rra, ZpX, 6, false),
    op(0x78, Sei, Imp, 2, false),
    op(0x79, Adc, AbsY, 4, true),
    ill(0x7A, Nop, Imp, 2, false),
    ill(0x7B, Rra, AbsY, 7, false),
    ill(0x7C, Nop, AbsX, 4, true),
    op(0x7D, Adc, AbsX, 4, true),
    op(0x7E, Ror, AbsX, 7, false),
    ill(0x7F, Rra, AbsX, 7, false),
    ill(0x80, Nop, Imm, 2, false),
    op(0x81, Sta, IzX, 6, false),
    ill(0x82, Nop, Imm, 2, false),
    ill(0x83, Sax, IzX, 6, false),
    op(0x84, Sty, Zp, 3, false),
    op(0x85, Sta, Zp, 3, false),
    op(0x86, Stx, Zp, 3, false),
    ill(0x87, Sax, Zp, 3, false),
    op(0x88, Dey, Imp, 2, false),
    ill(0x89, Nop, Imm, 2, false),
    op(0x8A, Txa, Imp, 2, false),
    ill(0x8B, Xaa, Imm, 2, false),
    op(0x8C, Sty, Abs, 4, false),
    op(0x8D, Sta, Abs, 4, false),
    op(0x8E, Stx, Abs, 4, false),
    ill(0x8F, Sax, Abs, 4, false),
    op(0x90, Bcc, Rel, 2, false),
    op(0x91, Sta, IzY, 6, false),
    ill(0x92, Jam, Imp, 2, false),
    ill(0x93, Sha, IzY, 6, false),
    op(0x94, Sty, ZpX, 4, false),
    op(0x95, Sta, ZpX, 4, false),
    op(0x96, Stx, ZpY, 4, false),
    ill(0x97, Sax, ZpY, 4, false),
    op(0x98, Tya, Imp, 2, false),
    op(0x99, Sta, AbsY, 5, false),
    op(0x9A, Txs, Imp, 2, false),
    ill(0x9B, Tas, AbsY, 5, false),
    ill(0x9C, Shy, AbsX, 5, false),
    op(0x9D, Sta, AbsX, 5, false),
    ill(0x9E, Shx, AbsY, 5, false),
    ill(0x9F, Sha, AbsY, 5, false),
    op(0xA0, Ldy, Imm, 2, false),
    op(0xA1, Lda, IzX, 6, false),
    op(0xA2, Ldx, Imm, 2, false),
    ill(0xA3, Lax, IzX, 6, false),
    op(0xA4, Ldy, Zp, 3, false),
    op(0xA5, Lda, Zp, 3, false),
    op(0xA6, Ldx, Zp, 3, false),
    ill(0xA7, Lax, Zp, 3, false),
    op(0xA8, Tay, Imp, 2, false),
    op(0xA9, Lda, Imm, 2, false),
    op(0xAA, Tax, Imp, 2, false),
    ill(0xAB, Lxa, Imm, 2, false),
    op(0xAC, Ldy, Abs, 4, false),
    op(0xAD, Lda, Abs, 4, false),
    op(0xAE, Ldx, Abs, 4, false),
    ill(0xAF, Lax, Abs, 4, false),
    op(0xB0, Bcs, Rel, 2, false),
    op(0xB1, Lda, IzY, 5, true),
    ill(0xB2, Jam, Imp, 2, false),
    ill(0xB3, Lax, IzY, 5, true),
    op(0xB4, Ldy, ZpX, 4, false),
    op(0xB5, Lda, ZpX, 4, false),
    op(0xB6, Ldx, ZpY, 4, false),
    ill(0xB7, Lax, ZpY, 4, false),
    op(0xB8, Clv, Imp, 2, false),
    op(0xB9, Lda, AbsY, 4, true),
    op(0xBA, Tsx, Imp, 2, false),
    ill(0xBB, Las, AbsY, 4, true),
    op(0xBC, Ldy, AbsX, 4, true),
    op(0xBD, Lda, AbsX, 4, true),
    op(0xBE, Ldx, AbsY, 4, true),
    ill(0xBF, Lax, AbsY, 4, true),
    op(0xC0, Cpy, Imm, 2, false),
    op(0xC1, Cmp, IzX, 6, false),
    ill(0xC2, Nop, Imm, 2, false),
    ill(0xC3, Dcp, IzX, 8, false),
    op(0xC4, Cpy, Zp, 3, false),
    op(0xC5, Cmp, Zp, 3, false),
    op(0xC6, Dec, Zp, 5, false),
    ill(0xC7, Dcp, Zp, 5, false),
    op(0xC8, Iny, Imp, 2, false),
    op(0xC9, Cmp, Imm, 2, false),
    op(0xCA, Dex, Imp, 2, false),
    ill(0xCB, Axs, Imm, 2, false),
    op(0xCC, Cpy, Abs, 4, false),
    op(0xCD, Cmp, Abs, 4, false),
    op(0xCE, Dec, Abs, 6, false),
    ill(0xCF, Dcp, Abs, 6, false),
    op(0xD0, Bne, Rel, 2, false),
    op(0xD1, Cmp, IzY, 5, true),
    ill(0xD2, Jam, Imp, 2, false),
    ill(0xD3, Dcp, IzY, 8, false),
    ill(0xD4, Nop, ZpX, 4, false),
    op(0xD5, Cmp, ZpX, 4, false),
    op(0xD6, Dec, ZpX, 6, false),
    ill(0xD7, Dcp, ZpX, 6, false),
    op(0xD8, Cld, Imp, 2, false),
    op(0xD9, Cmp, AbsY, 4, true),
    ill(0xDA, Nop, Imp, 2, false),
    ill(0xDB, Dcp, AbsY, 7, false),
    ill(0xDC, Nop, AbsX, 4, true),
    op(0xDD, Cmp, AbsX, 4, true),
    op(0xDE, Dec, AbsX, 7, false),
    ill(0xDF, Dcp, AbsX, 7, false),
    op(0xE0, Cpx, Imm, 2, false),
    op(0xE1, Sbc, IzX, 6, false),
    ill(0xE2, Nop, Imm, 2, false),
    ill(0xE3, Isc, IzX, 8, false),
    op(0xE4, Cpx, Zp, 3, false),
    op(0xE5, Sbc, Zp, 3, false),
    op(0xE6, Inc, Zp, 5, false),
    ill(0xE7, Isc, Zp, 5, false),
    op(0xE8, Inx, Imp, 2, false),
    op(0xE9, Sbc, Imm, 2, false),
    op(0xEA, Nop, Imp, 2, false),
    ill(0xEB, Sbc, Imm, 2, false),
    op(0xEC, Cpx, Abs, 4, false),
    op(0xED, Sbc, Abs, 4, false),
    op(0xEE, Inc, Abs, 6, false),
    ill(0xEF, Isc, Abs, 6, false),
    op(0xF0, Beq, Rel, 2, false),
    op(0xF1, Sbc, IzY, 5, true),
    ill(0xF2, Jam, Imp, 2, false),
    ill(0xF3, Isc, IzY, 8, false),
    ill(0xF4, Nop, ZpX, 4, false),
    op(0xF5, Sbc, ZpX, 4, false),
    op(0xF6, Inc, ZpX, 6, false),
    ill(0xF7, Isc, ZpX, 6, false),
    op(0xF8, Sed, Imp, 2, false),
    op(0xF9, Sbc, AbsY, 4, true),
    ill(0xFA, Nop, Imp, 2, false),
    ill(0xFB, Isc, AbsY, 7, false),
    ill(0xFC, Nop, AbsX, 4, true),
    op(0xFD, Sbc, AbsX, 4, true),
    op(0xFE, Inc, AbsX, 7, false),
    ill(0xFF, Isc, AbsX, 7, false),
];

pub fn decode(opcode: u8) -> &'static Instruction {
    &INSTRUCTIONS[opcode as usize]
}

/// Finds the opcode for a mnemonic/mode pair, preferring the documented encoding.
pub fn encode(mnemonic: Mnemonic, mode: AddressingMode) -> Option<&'static Instruction> {
    let mut fallback = None;
    for instruction in INSTRUCTIONS.iter() {
        if instruction.mnemonic != mnemonic || instruction.mode != mode {
            continue;
        }
        if instruction.official {
            return Some(instruction);
        }
        fallback.get_or_insert(instruction);
    }
    fallback
}

/// Every addressing mode a mnemonic can be encoded with.
pub fn modes_for(mnemonic: Mnemonic) -> impl Iterator<Item = AddressingMode> {
    INSTRUCTIONS
        .iter()
        .filter(move |instruction| instruction.mnemonic == mnemonic)
        .map(|instruction| instruction.mode)
}
