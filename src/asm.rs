//! Two-pass 6502 assembler for building test programs.
//!
//! Supported syntax, one statement per line:
//!
//! ```text
//! label:  LDA #$10        ; comments run to end of line
//!         STA $0200,X
//!         BNE label
//!         .org $C000
//!         .byte 1, %1010, <label, >label
//!         .word label, $FFFA
//! ```
//!
//! Operands are `$hex`, `%binary`, decimal or label names, optionally combined with
//! `+`/`-`. Literals of up to two hex digits select zero-page forms when the
//! instruction has one; labels always assemble as absolute unless only a zero-page form
//! exists.

use std::collections::BTreeMap;
use std::fmt;

use crate::nes::instructions::{AddressingMode, Instruction, Mnemonic, encode, modes_for};

/// Origin used until the first `.org`.
pub const DEFAULT_ORIGIN: u16 = 0x8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub origin: u16,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Address of the first emitted byte.
    pub origin: u16,
    pub segments: Vec<Segment>,
    pub symbols: BTreeMap<String, u16>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.bytes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn symbol(&self, name: &str) -> Option<u16> {
        self.symbols.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    Syntax {
        line: usize,
        message: String,
    },
    UnknownMnemonic {
        line: usize,
        name: String,
    },
    UnsupportedMode {
        line: usize,
        mnemonic: Mnemonic,
        mode: AddressingMode,
    },
    DuplicateLabel {
        line: usize,
        name: String,
    },
    OutOfRange {
        line: usize,
        value: i64,
    },
    BranchOutOfRange {
        line: usize,
        offset: i64,
    },
    /// Every label referenced but never defined, sorted.
    UnresolvedLabels(Vec<String>),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { line, message } => write!(f, "line {line}: {message}"),
            Self::UnknownMnemonic { line, name } => {
                write!(f, "line {line}: unknown mnemonic `{name}`")
            }
            Self::UnsupportedMode {
                line,
                mnemonic,
                mode,
            } => write!(f, "line {line}: {mnemonic} has no {mode:?} form"),
            Self::DuplicateLabel { line, name } => {
                write!(f, "line {line}: label `{name}` is already defined")
            }
            Self::OutOfRange { line, value } => {
                write!(f, "line {line}: value {value} does not fit the operand")
            }
            Self::BranchOutOfRange { line, offset } => {
                write!(f, "line {line}: branch offset {offset} is outside -128..=127")
            }
            Self::UnresolvedLabels(names) => write!(f, "unresolved labels: {}", names.join(", ")),
        }
    }
}

impl std::error::Error for AsmError {}

pub fn assemble(source: &str) -> Result<Program, AsmError> {
    let mut assembler = Assembler::new();
    for (index, text) in source.lines().enumerate() {
        assembler.parse_line(index + 1, text)?;
    }
    assembler.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector {
    Word,
    Low,
    High,
}

#[derive(Debug, Clone)]
enum Term {
    Number { value: i64, wide: bool },
    Label(String),
}

#[derive(Debug, Clone)]
struct Expr {
    selector: Selector,
    /// `(negated, term)` pairs summed left to right.
    terms: Vec<(bool, Term)>,
}

impl Expr {
    /// True when the operand is known in the first pass to fit one byte.
    fn is_byte(&self) -> bool {
        if self.selector != Selector::Word {
            return true;
        }
        let mut sum = 0i64;
        for (negated, term) in &self.terms {
            match term {
                Term::Number { value, wide: false } => sum += if *negated { -value } else { *value },
                _ => return false,
            }
        }
        (0..=0xFF).contains(&sum)
    }

    fn evaluate(&self, symbols: &BTreeMap<String, u16>, unresolved: &mut Vec<String>) -> Option<i64> {
        let mut sum = 0i64;
        let mut resolved = true;
        for (negated, term) in &self.terms {
            let value = match term {
                Term::Number { value, .. } => *value,
                Term::Label(name) => match symbols.get(name) {
                    Some(&addr) => addr as i64,
                    None => {
                        unresolved.push(name.clone());
                        resolved = false;
                        continue;
                    }
                },
            };
            sum += if *negated { -value } else { value };
        }

        resolved.then_some(match self.selector {
            Selector::Word => sum,
            Selector::Low => sum & 0xFF,
            Selector::High => (sum >> 8) & 0xFF,
        })
    }
}

enum ItemKind {
    Instruction {
        instruction: &'static Instruction,
        operand: Option<Expr>,
    },
    Bytes(Vec<Expr>),
    Words(Vec<Expr>),
}

struct Item {
    line: usize,
    addr: u16,
    kind: ItemKind,
}

struct PendingSegment {
    origin: u16,
    items: Vec<Item>,
}

struct Assembler {
    pc: u16,
    segments: Vec<PendingSegment>,
    symbols: BTreeMap<String, u16>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            pc: DEFAULT_ORIGIN,
            segments: vec![PendingSegment {
                origin: DEFAULT_ORIGIN,
                items: Vec::new(),
            }],
            symbols: BTreeMap::new(),
        }
    }

    fn parse_line(&mut self, line: usize, text: &str) -> Result<(), AsmError> {
        let code = text.split(';').next().unwrap_or_default();
        let mut rest = code.trim();

        while let Some((head, tail)) = rest.split_once(':') {
            let head = head.trim();
            if !is_identifier(head) {
                break;
            }
            self.define_label(line, head)?;
            rest = tail.trim();
        }

        if rest.is_empty() {
            return Ok(());
        }
        if let Some(directive) = rest.strip_prefix('.') {
            return self.directive(line, directive);
        }

        let (name, operand) = split_word(rest);
        let mnemonic: Mnemonic = name.parse().map_err(|_| AsmError::UnknownMnemonic {
            line,
            name: name.to_string(),
        })?;
        let (mode, operand) = parse_operand(line, mnemonic, operand)?;
        let instruction = encode(mnemonic, mode).ok_or(AsmError::UnsupportedMode {
            line,
            mnemonic,
            mode,
        })?;

        self.emit(
            line,
            ItemKind::Instruction {
                instruction,
                operand,
            },
            instruction.size as u16,
        );
        Ok(())
    }

    fn directive(&mut self, line: usize, text: &str) -> Result<(), AsmError> {
        let (name, args) = split_word(text);
        match name.to_ascii_lowercase().as_str() {
            "org" => {
                let expr = parse_expr(line, args)?;
                let value = expr
                    .evaluate(&self.symbols, &mut Vec::new())
                    .ok_or_else(|| syntax(line, ".org needs a value known at this point"))?;
                self.set_origin(to_word(line, value)?);
            }
            "byte" | "db" => {
                let values = parse_list(line, args)?;
                let size = values.len() as u16;
                self.emit(line, ItemKind::Bytes(values), size);
            }
            "word" | "dw" => {
                let values = parse_list(line, args)?;
                let size = values.len() as u16 * 2;
                self.emit(line, ItemKind::Words(values), size);
            }
            other => return Err(syntax(line, format!("unknown directive .{other}"))),
        }
        Ok(())
    }

    fn define_label(&mut self, line: usize, name: &str) -> Result<(), AsmError> {
        if self.symbols.contains_key(name) {
            return Err(AsmError::DuplicateLabel {
                line,
                name: name.to_string(),
            });
        }
        self.symbols.insert(name.to_string(), self.pc);
        Ok(())
    }

    fn set_origin(&mut self, origin: u16) {
        self.pc = origin;
        match self.segments.last_mut() {
            Some(segment) if segment.items.is_empty() => segment.origin = origin,
            _ => self.segments.push(PendingSegment {
                origin,
                items: Vec::new(),
            }),
        }
    }

    fn emit(&mut self, line: usize, kind: ItemKind, size: u16) {
        let addr = self.pc;
        if let Some(segment) = self.segments.last_mut() {
            segment.items.push(Item { line, addr, kind });
        }
        self.pc = self.pc.wrapping_add(size);
    }

    fn finish(self) -> Result<Program, AsmError> {
        let mut unresolved = Vec::new();
        let mut segments = Vec::new();

        for pending in &self.segments {
            let mut bytes = Vec::new();
            for item in &pending.items {
                self.encode_item(item, &mut bytes, &mut unresolved)?;
            }
            if !bytes.is_empty() {
                segments.push(Segment {
                    origin: pending.origin,
                    bytes,
                });
            }
        }

        if !unresolved.is_empty() {
            unresolved.sort();
            unresolved.dedup();
            return Err(AsmError::UnresolvedLabels(unresolved));
        }

        Ok(Program {
            origin: segments.first().map_or(DEFAULT_ORIGIN, |segment| segment.origin),
            segments,
            symbols: self.symbols,
        })
    }

    fn encode_item(
        &self,
        item: &Item,
        bytes: &mut Vec<u8>,
        unresolved: &mut Vec<String>,
    ) -> Result<(), AsmError> {
        let line = item.line;
        match &item.kind {
            ItemKind::Instruction {
                instruction,
                operand,
            } => {
                bytes.push(instruction.opcode);
                let Some(expr) = operand else {
                    return Ok(());
                };
                let operand_len = instruction.size as usize - 1;
                let Some(value) = expr.evaluate(&self.symbols, unresolved) else {
                    bytes.extend(std::iter::repeat_n(0, operand_len));
                    return Ok(());
                };

                if instruction.mode == AddressingMode::Relative {
                    let offset = value - (item.addr as i64 + 2);
                    if !(-128..=127).contains(&offset) {
                        return Err(AsmError::BranchOutOfRange { line, offset });
                    }
                    bytes.push(offset as i8 as u8);
                } else if operand_len == 1 {
                    bytes.push(to_byte(line, value)?);
                } else {
                    bytes.extend(to_word(line, value)?.to_le_bytes());
                }
            }
            ItemKind::Bytes(values) => {
                for expr in values {
                    let value = expr.evaluate(&self.symbols, unresolved).unwrap_or(0);
                    bytes.push(to_byte(line, value)?);
                }
            }
            ItemKind::Words(values) => {
                for expr in values {
                    let value = expr.evaluate(&self.symbols, unresolved).unwrap_or(0);
                    bytes.extend(to_word(line, value)?.to_le_bytes());
                }
            }
        }
        Ok(())
    }
}

fn parse_operand(
    line: usize,
    mnemonic: Mnemonic,
    text: &str,
) -> Result<(AddressingMode, Option<Expr>), AsmError> {
    use AddressingMode::*;

    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();
    let supports = |mode: AddressingMode| modes_for(mnemonic).any(|m| m == mode);

    if compact.is_empty() {
        let mode = if supports(Implied) { Implied } else { Accumulator };
        return Ok((mode, None));
    }
    if upper == "A" && supports(Accumulator) {
        return Ok((Accumulator, None));
    }
    if let Some(value) = compact.strip_prefix('#') {
        return Ok((Immediate, Some(parse_expr(line, value)?)));
    }
    if mnemonic.is_branch() {
        return Ok((Relative, Some(parse_expr(line, &compact)?)));
    }

    let len = compact.len();
    if compact.starts_with('(') {
        let (inner, mode) = if upper.ends_with(",X)") {
            (&compact[1..len - 3], IndexedIndirect)
        } else if upper.ends_with("),Y") {
            (&compact[1..len - 3], IndirectIndexed)
        } else if upper.ends_with(')') {
            (&compact[1..len - 1], Indirect)
        } else {
            return Err(syntax(line, format!("unbalanced parenthesis in `{text}`")));
        };
        return Ok((mode, Some(parse_expr(line, inner)?)));
    }

    let (inner, zero_page, absolute) = if upper.ends_with(",X") {
        (&compact[..len - 2], ZeroPageX, AbsoluteX)
    } else if upper.ends_with(",Y") {
        (&compact[..len - 2], ZeroPageY, AbsoluteY)
    } else {
        (compact.as_str(), ZeroPage, Absolute)
    };
    let expr = parse_expr(line, inner)?;
    let mode = match (expr.is_byte(), supports(zero_page), supports(absolute)) {
        (true, true, _) | (_, true, false) => zero_page,
        _ => absolute,
    };
    Ok((mode, Some(expr)))
}

fn parse_list(line: usize, text: &str) -> Result<Vec<Expr>, AsmError> {
    if text.trim().is_empty() {
        return Err(syntax(line, "directive needs at least one value"));
    }
    text.split(',').map(|value| parse_expr(line, value)).collect()
}

fn parse_expr(line: usize, text: &str) -> Result<Expr, AsmError> {
    let text = text.trim();
    let (selector, mut rest) = if let Some(rest) = text.strip_prefix('<') {
        (Selector::Low, rest)
    } else if let Some(rest) = text.strip_prefix('>') {
        (Selector::High, rest)
    } else {
        (Selector::Word, text)
    };

    let mut negated = false;
    if let Some(tail) = rest.trim_start().strip_prefix('-') {
        negated = true;
        rest = tail;
    }

    let mut terms = Vec::new();
    loop {
        let end = rest.find(['+', '-']).unwrap_or(rest.len());
        terms.push((negated, parse_term(line, rest[..end].trim())?));
        if end == rest.len() {
            break;
        }
        negated = rest.as_bytes()[end] == b'-';
        rest = &rest[end + 1..];
    }
    Ok(Expr { selector, terms })
}

fn parse_term(line: usize, token: &str) -> Result<Term, AsmError> {
    let invalid = || syntax(line, format!("invalid operand `{token}`"));

    if let Some(digits) = token.strip_prefix('$') {
        let value = i64::from_str_radix(digits, 16).map_err(|_| invalid())?;
        return Ok(Term::Number {
            value,
            wide: digits.len() > 2,
        });
    }
    if let Some(digits) = token.strip_prefix('%') {
        let value = i64::from_str_radix(digits, 2).map_err(|_| invalid())?;
        return Ok(Term::Number {
            value,
            wide: digits.len() > 8,
        });
    }
    if token.starts_with(|c: char| c.is_ascii_digit()) {
        let value: i64 = token.parse().map_err(|_| invalid())?;
        return Ok(Term::Number {
            value,
            wide: value > 0xFF,
        });
    }
    if is_identifier(token) {
        return Ok(Term::Label(token.to_string()));
    }
    Err(invalid())
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}

fn to_byte(line: usize, value: i64) -> Result<u8, AsmError> {
    if !(-128..=0xFF).contains(&value) {
        return Err(AsmError::OutOfRange { line, value });
    }
    Ok(value as u8)
}

fn to_word(line: usize, value: i64) -> Result<u16, AsmError> {
    u16::try_from(value).map_err(|_| AsmError::OutOfRange { line, value })
}

fn syntax(line: usize, message: impl Into<String>) -> AsmError {
    AsmError::Syntax {
        line,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(source: &str) -> Vec<u8> {
        let program = assemble(source).unwrap();
        assert_eq!(program.segments.len(), 1);
        program.segments[0].bytes.clone()
    }

    #[test]
    fn assembles_basic_program_at_default_origin() {
        let program = assemble("LDA #$01\nSTA $0200\nBRK").unwrap();
        assert_eq!(program.origin, DEFAULT_ORIGIN);
        assert_eq!(program.segments[0].bytes, [0xA9, 0x01, 0x8D, 0x00, 0x02, 0x00]);
        assert_eq!(program.len(), 6);
    }

    #[test]
    fn literal_width_picks_zero_page_or_absolute() {
        assert_eq!(bytes("LDA $10"), [0xA5, 0x10]);
        assert_eq!(bytes("LDA $0010"), [0xAD, 0x10, 0x00]);
        assert_eq!(bytes("LDA 16,X"), [0xB5, 0x10]);
        assert_eq!(bytes("LDA $10,Y"), [0xB9, 0x10, 0x00]);
    }

    #[test]
    fn labels_are_absolute_unless_only_zero_page_exists() {
        let source = "
            .org $0010
            value: .byte 0
            LDA value
            STX value,Y
        ";
        assert_eq!(bytes(source), [0x00, 0xAD, 0x10, 0x00, 0x96, 0x10]);
    }

    #[test]
    fn accumulator_and_indirect_forms() {
        assert_eq!(bytes("ASL"), [0x0A]);
        assert_eq!(bytes("ror a"), [0x6A]);
        assert_eq!(bytes("LDA ($20,X)"), [0xA1, 0x20]);
        assert_eq!(bytes("LDA ( $20 ), y"), [0xB1, 0x20]);
        assert_eq!(bytes("JMP ($1234)"), [0x6C, 0x34, 0x12]);
        assert_eq!(bytes("NOP"), [0xEA]);
    }

    #[test]
    fn branch_offsets_are_relative_to_the_next_instruction() {
        assert_eq!(bytes("loop: DEX\nBNE loop"), [0xCA, 0xD0, 0xFD]);
        assert_eq!(bytes("BEQ done\nNOP\ndone: RTS"), [0xF0, 0x01, 0xEA, 0x60]);
    }

    #[test]
    fn branch_beyond_range_is_an_error() {
        let filler = vec!["0"; 130].join(", ");
        let source = format!("BNE far\n.byte {filler}\nfar: RTS");
        assert!(matches!(
            assemble(&source),
            Err(AsmError::BranchOutOfRange { line: 1, offset: 130 })
        ));
    }

    #[test]
    fn unresolved_labels_are_reported_together() {
        let err = assemble("JMP foo\nJSR bar\nLDA baz\nLDX foo").unwrap_err();
        assert_eq!(
            err,
            AsmError::UnresolvedLabels(vec!["bar".into(), "baz".into(), "foo".into()])
        );
        assert_eq!(err.to_string(), "unresolved labels: bar, baz, foo");
    }

    #[test]
    fn unsupported_modes_are_rejected() {
        assert!(matches!(
            assemble("STA #$10"),
            Err(AsmError::UnsupportedMode { line: 1, mode: AddressingMode::Immediate, .. })
        ));
        assert!(matches!(
            assemble("NOP\nLDX $10,X"),
            Err(AsmError::UnsupportedMode { line: 2, .. })
        ));
    }

    #[test]
    fn directives_and_byte_selectors() {
        let program = assemble(
            "
            .org $C000
            start: .byte <start, >start, 1, %101
                   .word start, $1234
            ",
        )
        .unwrap();
        assert_eq!(program.origin, 0xC000);
        assert_eq!(
            program.segments[0].bytes,
            [0x00, 0xC0, 0x01, 0x05, 0x00, 0xC0, 0x34, 0x12]
        );
        assert_eq!(program.symbol("start"), Some(0xC000));
    }

    #[test]
    fn label_arithmetic_and_comments() {
        let source = "
            table: .byte 1, 2   ; two entries
                   LDA table+1  ; second one
                   LDX #-1
        ";
        assert_eq!(bytes(source), [0x01, 0x02, 0xAD, 0x01, 0x80, 0xA2, 0xFF]);
    }

    #[test]
    fn each_org_starts_a_segment() {
        let program = assemble(".org $8000\nreset: NOP\n.org $FFFC\n.word reset").unwrap();
        assert_eq!(program.segments.len(), 2);
        assert_eq!(program.segments[1].origin, 0xFFFC);
        assert_eq!(program.segments[1].bytes, [0x00, 0x80]);
    }

    #[test]
    fn reports_line_numbers_for_bad_input() {
        assert!(matches!(
            assemble("NOP\nFOO $10"),
            Err(AsmError::UnknownMnemonic { line: 2, .. })
        ));
        assert!(matches!(
            assemble("a: NOP\na: NOP"),
            Err(AsmError::DuplicateLabel { line: 2, .. })
        ));
        assert!(matches!(
            assemble("LDA #$1FF"),
            Err(AsmError::OutOfRange { line: 1, value: 0x1FF })
        ));
        assert!(matches!(assemble(".fill 3"), Err(AsmError::Syntax { line: 1, .. })));
        assert!(matches!(assemble("LDA ($10"), Err(AsmError::Syntax { .. })));
    }
}
