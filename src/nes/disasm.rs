use super::instructions::{AddressingMode, decode};

/// One decoded instruction, formatted for trace logs and the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledLine {
    pub addr: u16,
    pub bytes: Vec<u8>,
    pub text: String,
}

impl DisassembledLine {
    pub fn size(&self) -> u16 {
        self.bytes.len() as u16
    }
}

impl std::fmt::Display for DisassembledLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex: Vec<String> = self.bytes.iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "{:04X}  {:<9} {}", self.addr, hex.join(" "), self.text)
    }
}

/// Decodes the instruction at `addr`. `read` must be side-effect free (use peeks).
pub fn disassemble(addr: u16, mut read: impl FnMut(u16) -> u8) -> DisassembledLine {
    let instruction = decode(read(addr));
    let bytes: Vec<u8> = (0..instruction.size as u16)
        .map(|offset| read(addr.wrapping_add(offset)))
        .collect();
    let byte = bytes.get(1).copied().unwrap_or(0);
    let word = u16::from_le_bytes([byte, bytes.get(2).copied().unwrap_or(0)]);

    let operand = match instruction.mode {
        AddressingMode::Implied => String::new(),
        AddressingMode::Accumulator => "A".to_string(),
        AddressingMode::Immediate => format!("#${byte:02X}"),
        AddressingMode::ZeroPage => format!("${byte:02X}"),
        AddressingMode::ZeroPageX => format!("${byte:02X},X"),
        AddressingMode::ZeroPageY => format!("${byte:02X},Y"),
        AddressingMode::Absolute => format!("${word:04X}"),
        AddressingMode::AbsoluteX => format!("${word:04X},X"),
        AddressingMode::AbsoluteY => format!("${word:04X},Y"),
        AddressingMode::Indirect => format!("(${word:04X})"),
        AddressingMode::IndexedIndirect => format!("(${byte:02X},X)"),
        AddressingMode::IndirectIndexed => format!("(${byte:02X}),Y"),
        AddressingMode::Relative => {
            let target = addr.wrapping_add(2).wrapping_add(byte as i8 as i16 as u16);
            format!("${target:04X}")
        }
    };

    let marker = if instruction.official { "" } else { "*" };
    let text = if operand.is_empty() {
        format!("{marker}{}", instruction.mnemonic)
    } else {
        format!("{marker}{} {operand}", instruction.mnemonic)
    };

    DisassembledLine { addr, bytes, text }
}

/// Disassembles `count` consecutive instructions starting at `addr`.
pub fn disassemble_range(
    addr: u16,
    count: usize,
    mut read: impl FnMut(u16) -> u8,
) -> Vec<DisassembledLine> {
    let mut lines = Vec::with_capacity(count);
    let mut pc = addr;
    for _ in 0..count {
        let line = disassemble(pc, &mut read);
        pc = pc.wrapping_add(line.size());
        lines.push(line);
    }
    lines
}
