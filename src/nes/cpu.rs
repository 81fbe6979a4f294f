use bitflags::bitflags;

use super::instructions::{AddressingMode, Instruction, Mnemonic, decode};
use super::pins::CpuPins;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

const STACK_BASE: u16 = 0x0100;
const POWER_UP_SP: u8 = 0xFD;
const INTERRUPT_CYCLES: u32 = 7;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const CARRY = 0x01;
        const ZERO = 0x02;
        const INTERRUPT = 0x04;
        const DECIMAL = 0x08;
        const BREAK = 0x10;
        const UNUSED = 0x20;
        const OVERFLOW = 0x40;
        const NEGATIVE = 0x80;
    }
}

impl Status {
    pub const POWER_UP: Status = Status::INTERRUPT.union(Status::UNUSED);

    /// Status as it appears on the stack: B set by software pushes, bit 5 always set.
    fn pushed(self, brk: bool) -> u8 {
        let mut bits = self | Status::UNUSED;
        bits.set(Status::BREAK, brk);
        bits.bits()
    }

    fn pulled(value: u8) -> Self {
        (Status::from_bits_retain(value) - Status::BREAK) | Status::UNUSED
    }
}

/// Everything the processor can reach: the address space plus its input pins.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    fn pins(&mut self) -> &mut CpuPins;
}

#[derive(Debug, Clone, Copy, Default)]
struct Operand {
    addr: u16,
    /// Un-indexed address, used for dummy reads and the unstable store high byte.
    base: u16,
    page_crossed: bool,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub p: Status,
    pub cycles: u64,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            pc: 0,
            a: 0,
            x: 0,
            y: 0,
            sp: POWER_UP_SP,
            p: Status::POWER_UP,
            cycles: 0,
        }
    }

    pub fn reset<B: CpuBus + ?Sized>(&mut self, bus: &mut B) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = POWER_UP_SP;
        self.p = Status::POWER_UP;
        self.pc = read_u16(bus, RESET_VECTOR);
        bus.pins().reset();
    }

    pub fn status(&self) -> u8 {
        (self.p | Status::UNUSED).bits()
    }

    /// Runs one stall cycle, one interrupt entry, or one instruction and returns the
    /// cycles it took.
    pub fn execute_instruction<B: CpuBus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let cycles = self.execute(bus);
        self.cycles += cycles as u64;
        cycles
    }

    fn execute<B: CpuBus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        if bus.pins().consume_stall() {
            return 1;
        }

        if bus.pins().take_nmi() {
            log::trace!("NMI at ${:04X}", self.pc);
            self.interrupt(bus, NMI_VECTOR, false);
            return INTERRUPT_CYCLES;
        }

        if bus.pins().irq_pending() && !self.p.contains(Status::INTERRUPT) {
            log::trace!("IRQ at ${:04X} ({:?})", self.pc, bus.pins().irq_sources());
            self.interrupt(bus, IRQ_VECTOR, false);
            return INTERRUPT_CYCLES;
        }

        let opcode_pc = self.pc;
        let instruction = decode(bus.read(opcode_pc));
        let operand = self.resolve(bus, instruction);
        self.pc = opcode_pc.wrapping_add(instruction.size as u16);

        let extra = self.run(bus, instruction, operand);
        let penalty = (instruction.page_penalty && operand.page_crossed) as u32;
        instruction.cycles as u32 + penalty + extra
    }

    fn interrupt<B: CpuBus + ?Sized>(&mut self, bus: &mut B, vector: u16, brk: bool) {
        self.push16(bus, self.pc);
        self.push(bus, self.p.pushed(brk));
        self.p.insert(Status::INTERRUPT);
        self.pc = read_u16(bus, vector);
    }

    fn resolve<B: CpuBus + ?Sized>(&mut self, bus: &mut B, instruction: &Instruction) -> Operand {
        let pc = self.pc;
        let arg = pc.wrapping_add(1);
        let indexed = |base: u16, index: u8| {
            let addr = base.wrapping_add(index as u16);
            Operand {
                addr,
                base,
                page_crossed: (base & 0xFF00) != (addr & 0xFF00),
            }
        };
        let direct = |addr: u16| Operand {
            addr,
            base: addr,
            page_crossed: false,
        };

        match instruction.mode {
            AddressingMode::Implied | AddressingMode::Accumulator => Operand::default(),
            AddressingMode::Immediate => direct(arg),
            AddressingMode::ZeroPage => direct(bus.read(arg) as u16),
            AddressingMode::ZeroPageX => {
                let zp = bus.read(arg);
                let _ = bus.read(zp as u16);
                direct(zp.wrapping_add(self.x) as u16)
            }
            AddressingMode::ZeroPageY => {
                let zp = bus.read(arg);
                let _ = bus.read(zp as u16);
                direct(zp.wrapping_add(self.y) as u16)
            }
            AddressingMode::Absolute => direct(read_u16(bus, arg)),
            AddressingMode::AbsoluteX => indexed(read_u16(bus, arg), self.x),
            AddressingMode::AbsoluteY => indexed(read_u16(bus, arg), self.y),
            AddressingMode::Indirect => {
                let ptr = read_u16(bus, arg);
                // The high byte never carries into the next page.
                let hi_ptr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let lo = bus.read(ptr) as u16;
                let hi = bus.read(hi_ptr) as u16;
                direct((hi << 8) | lo)
            }
            AddressingMode::IndexedIndirect => {
                let zp = bus.read(arg);
                let _ = bus.read(zp as u16);
                direct(read_zp_u16(bus, zp.wrapping_add(self.x)))
            }
            AddressingMode::IndirectIndexed => {
                let zp = bus.read(arg);
                indexed(read_zp_u16(bus, zp), self.y)
            }
            AddressingMode::Relative => {
                let offset = bus.read(arg) as i8;
                let next = pc.wrapping_add(2);
                indexed(next, 0).with_target(next.wrapping_add(offset as i16 as u16))
            }
        }
    }

    fn run<B: CpuBus + ?Sized>(
        &mut self,
        bus: &mut B,
        instruction: &Instruction,
        operand: Operand,
    ) -> u32 {
        use Mnemonic::*;

        let mode = instruction.mode;
        match instruction.mnemonic {
            Lda => {
                self.a = self.load(bus, mode, operand);
                self.update_zn(self.a);
            }
            Ldx => {
                self.x = self.load(bus, mode, operand);
                self.update_zn(self.x);
            }
            Ldy => {
                self.y = self.load(bus, mode, operand);
                self.update_zn(self.y);
            }
            Sta => self.store(bus, mode, operand, self.a),
            Stx => self.store(bus, mode, operand, self.x),
            Sty => self.store(bus, mode, operand, self.y),

            Tax => {
                self.x = self.a;
                self.update_zn(self.x);
            }
            Tay => {
                self.y = self.a;
                self.update_zn(self.y);
            }
            Txa => {
                self.a = self.x;
                self.update_zn(self.a);
            }
            Tya => {
                self.a = self.y;
                self.update_zn(self.a);
            }
            Tsx => {
                self.x = self.sp;
                self.update_zn(self.x);
            }
            Txs => self.sp = self.x,

            Adc => {
                let value = self.load(bus, mode, operand);
                self.adc(value);
            }
            Sbc => {
                let value = self.load(bus, mode, operand);
                self.sbc(value);
            }
            And => {
                let value = self.load(bus, mode, operand);
                self.and(value);
            }
            Ora => {
                let value = self.load(bus, mode, operand);
                self.ora(value);
            }
            Eor => {
                let value = self.load(bus, mode, operand);
                self.eor(value);
            }
            Bit => {
                let value = self.load(bus, mode, operand);
                self.bit(value);
            }
            Cmp => {
                let value = self.load(bus, mode, operand);
                self.compare(self.a, value);
            }
            Cpx => {
                let value = self.load(bus, mode, operand);
                self.compare(self.x, value);
            }
            Cpy => {
                let value = self.load(bus, mode, operand);
                self.compare(self.y, value);
            }

            Asl => {
                self.modify(bus, mode, operand, Self::asl);
            }
            Lsr => {
                self.modify(bus, mode, operand, Self::lsr);
            }
            Rol => {
                self.modify(bus, mode, operand, Self::rol);
            }
            Ror => {
                self.modify(bus, mode, operand, Self::ror);
            }
            Inc => {
                self.modify(bus, mode, operand, Self::inc);
            }
            Dec => {
                self.modify(bus, mode, operand, Self::dec);
            }
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
            }

            Bcc => return self.branch(bus, !self.p.contains(Status::CARRY), operand),
            Bcs => return self.branch(bus, self.p.contains(Status::CARRY), operand),
            Bne => return self.branch(bus, !self.p.contains(Status::ZERO), operand),
            Beq => return self.branch(bus, self.p.contains(Status::ZERO), operand),
            Bpl => return self.branch(bus, !self.p.contains(Status::NEGATIVE), operand),
            Bmi => return self.branch(bus, self.p.contains(Status::NEGATIVE), operand),
            Bvc => return self.branch(bus, !self.p.contains(Status::OVERFLOW), operand),
            Bvs => return self.branch(bus, self.p.contains(Status::OVERFLOW), operand),

            Jmp => self.pc = operand.addr,
            Jsr => {
                self.push16(bus, self.pc.wrapping_sub(1));
                self.pc = operand.addr;
            }
            Rts => {
                let _ = bus.read(self.pc);
                self.pc = self.pull16(bus).wrapping_add(1);
            }
            Rti => {
                let _ = bus.read(self.pc);
                self.p = Status::pulled(self.pull(bus));
                self.pc = self.pull16(bus);
            }
            Brk => {
                // Skips the padding byte after the opcode.
                self.pc = self.pc.wrapping_add(1);
                self.interrupt(bus, IRQ_VECTOR, true);
            }

            Pha => self.push(bus, self.a),
            Php => self.push(bus, self.p.pushed(true)),
            Pla => {
                let _ = bus.read(self.pc);
                self.a = self.pull(bus);
                self.update_zn(self.a);
            }
            Plp => {
                let _ = bus.read(self.pc);
                self.p = Status::pulled(self.pull(bus));
            }

            Clc => self.p.remove(Status::CARRY),
            Sec => self.p.insert(Status::CARRY),
            Cli => self.p.remove(Status::INTERRUPT),
            Sei => self.p.insert(Status::INTERRUPT),
            Cld => self.p.remove(Status::DECIMAL),
            Sed => self.p.insert(Status::DECIMAL),
            Clv => self.p.remove(Status::OVERFLOW),

            Nop => {
                if !matches!(mode, AddressingMode::Implied | AddressingMode::Accumulator) {
                    let _ = self.load(bus, mode, operand);
                }
            }

            Lax => {
                let value = self.load(bus, mode, operand);
                self.a = value;
                self.x = value;
                self.update_zn(value);
            }
            Sax => self.store(bus, mode, operand, self.a & self.x),
            Slo => {
                let shifted = self.modify(bus, mode, operand, Self::asl);
                self.ora(shifted);
            }
            Rla => {
                let rotated = self.modify(bus, mode, operand, Self::rol);
                self.and(rotated);
            }
            Sre => {
                let shifted = self.modify(bus, mode, operand, Self::lsr);
                self.eor(shifted);
            }
            Rra => {
                let rotated = self.modify(bus, mode, operand, Self::ror);
                self.adc(rotated);
            }
            Dcp => {
                let decremented = self.modify(bus, mode, operand, Self::dec);
                self.compare(self.a, decremented);
            }
            Isc => {
                let incremented = self.modify(bus, mode, operand, Self::inc);
                self.sbc(incremented);
            }
            Anc => {
                let value = self.load(bus, mode, operand);
                self.and(value);
                self.p.set(Status::CARRY, self.p.contains(Status::NEGATIVE));
            }
            Alr => {
                let value = self.load(bus, mode, operand);
                self.a &= value;
                self.a = self.lsr(self.a);
            }
            Arr => {
                let value = self.load(bus, mode, operand);
                let carry_in = if self.p.contains(Status::CARRY) { 0x80 } else { 0 };
                self.a = ((self.a & value) >> 1) | carry_in;
                self.update_zn(self.a);
                let bit6 = self.a & 0x40 != 0;
                let bit5 = self.a & 0x20 != 0;
                self.p.set(Status::CARRY, bit6);
                self.p.set(Status::OVERFLOW, bit6 ^ bit5);
            }
            Axs => {
                let value = self.load(bus, mode, operand);
                let masked = self.a & self.x;
                self.p.set(Status::CARRY, masked >= value);
                self.x = masked.wrapping_sub(value);
                self.update_zn(self.x);
            }
            Xaa => {
                let value = self.load(bus, mode, operand);
                self.a = (self.a | 0xEE) & self.x & value;
                self.update_zn(self.a);
            }
            Lxa => {
                let value = self.load(bus, mode, operand);
                self.a = (self.a | 0xEE) & value;
                self.x = self.a;
                self.update_zn(self.a);
            }
            Las => {
                let value = self.load(bus, mode, operand) & self.sp;
                self.a = value;
                self.x = value;
                self.sp = value;
                self.update_zn(value);
            }
            Sha => self.unstable_store(bus, operand, self.a & self.x),
            Shx => self.unstable_store(bus, operand, self.x),
            Shy => self.unstable_store(bus, operand, self.y),
            Tas => {
                self.sp = self.a & self.x;
                self.unstable_store(bus, operand, self.sp);
            }
            Jam => {
                log::trace!("JAM at ${:04X}", self.pc.wrapping_sub(1));
                self.pc = self.pc.wrapping_sub(1);
            }
        }
        0
    }

    fn load<B: CpuBus + ?Sized>(&mut self, bus: &mut B, mode: AddressingMode, operand: Operand) -> u8 {
        if mode == AddressingMode::Accumulator {
            return self.a;
        }
        if operand.page_crossed {
            let _ = bus.read(Self::uncorrected(operand));
        }
        bus.read(operand.addr)
    }

    fn store<B: CpuBus + ?Sized>(
        &mut self,
        bus: &mut B,
        mode: AddressingMode,
        operand: Operand,
        value: u8,
    ) {
        // Indexed stores always perform the read before the carry is fixed up.
        if Self::is_indexed(mode) {
            let _ = bus.read(Self::uncorrected(operand));
        }
        bus.write(operand.addr, value);
    }

    /// Read-modify-write with the dummy write of the unmodified value.
    fn modify<B: CpuBus + ?Sized>(
        &mut self,
        bus: &mut B,
        mode: AddressingMode,
        operand: Operand,
        op: fn(&mut Self, u8) -> u8,
    ) -> u8 {
        if mode == AddressingMode::Accumulator {
            let value = self.a;
            self.a = op(self, value);
            return self.a;
        }
        if Self::is_indexed(mode) {
            let _ = bus.read(Self::uncorrected(operand));
        }
        let value = bus.read(operand.addr);
        bus.write(operand.addr, value);
        let result = op(self, value);
        bus.write(operand.addr, result);
        result
    }

    /// SHA/SHX/SHY/TAS: the stored value is ANDed with the base high byte plus one, and a
    /// page crossing replaces the target high byte with that value.
    fn unstable_store<B: CpuBus + ?Sized>(&mut self, bus: &mut B, operand: Operand, register: u8) {
        let _ = bus.read(Self::uncorrected(operand));
        let high = ((operand.base >> 8) as u8).wrapping_add(1);
        let value = register & high;
        let addr = if operand.page_crossed {
            ((value as u16) << 8) | (operand.addr & 0x00FF)
        } else {
            operand.addr
        };
        bus.write(addr, value);
    }

    fn branch<B: CpuBus + ?Sized>(&mut self, bus: &mut B, condition: bool, operand: Operand) -> u32 {
        if !condition {
            return 0;
        }
        let _ = bus.read(self.pc);
        self.pc = operand.addr;
        if operand.page_crossed {
            let _ = bus.read(Self::uncorrected(operand));
            2
        } else {
            1
        }
    }

    fn is_indexed(mode: AddressingMode) -> bool {
        matches!(
            mode,
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY | AddressingMode::IndirectIndexed
        )
    }

    fn uncorrected(operand: Operand) -> u16 {
        (operand.base & 0xFF00) | (operand.addr & 0x00FF)
    }

    pub fn push<B: CpuBus + ?Sized>(&mut self, bus: &mut B, value: u8) {
        bus.write(STACK_BASE | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    pub fn pull<B: CpuBus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(STACK_BASE | self.sp as u16)
    }

    pub fn push16<B: CpuBus + ?Sized>(&mut self, bus: &mut B, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    pub fn pull16<B: CpuBus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let lo = self.pull(bus) as u16;
        let hi = self.pull(bus) as u16;
        (hi << 8) | lo
    }

    fn update_zn(&mut self, value: u8) {
        self.p.set(Status::ZERO, value == 0);
        self.p.set(Status::NEGATIVE, value & 0x80 != 0);
    }

    fn ora(&mut self, value: u8) {
        self.a |= value;
        self.update_zn(self.a);
    }

    fn and(&mut self, value: u8) {
        self.a &= value;
        self.update_zn(self.a);
    }

    fn eor(&mut self, value: u8) {
        self.a ^= value;
        self.update_zn(self.a);
    }

    fn bit(&mut self, value: u8) {
        self.p.set(Status::ZERO, self.a & value == 0);
        self.p.set(Status::NEGATIVE, value & 0x80 != 0);
        self.p.set(Status::OVERFLOW, value & 0x40 != 0);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.p.set(Status::CARRY, register >= value);
        self.update_zn(register.wrapping_sub(value));
    }

    fn adc(&mut self, value: u8) {
        let carry_in = self.p.contains(Status::CARRY) as u16;
        let result = self.a as u16 + value as u16 + carry_in;
        let out = result as u8;

        self.p.set(Status::CARRY, result > 0xFF);
        self.p
            .set(Status::OVERFLOW, (self.a ^ out) & (value ^ out) & 0x80 != 0);

        self.a = out;
        self.update_zn(self.a);
    }

    fn sbc(&mut self, value: u8) {
        self.adc(value ^ 0xFF);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.p.set(Status::CARRY, value & 0x80 != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.p.set(Status::CARRY, value & 0x01 != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.p.contains(Status::CARRY) as u8;
        self.p.set(Status::CARRY, value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.p.contains(Status::CARRY) { 0x80 } else { 0 };
        self.p.set(Status::CARRY, value & 0x01 != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn inc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.update_zn(result);
        result
    }

    fn dec(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.update_zn(result);
        result
    }
}

impl Operand {
    fn with_target(self, addr: u16) -> Self {
        Operand {
            addr,
            base: self.base,
            page_crossed: (self.base & 0xFF00) != (addr & 0xFF00),
        }
    }
}

fn read_u16<B: CpuBus + ?Sized>(bus: &mut B, addr: u16) -> u16 {
    let lo = bus.read(addr) as u16;
    let hi = bus.read(addr.wrapping_add(1)) as u16;
    (hi << 8) | lo
}

fn read_zp_u16<B: CpuBus + ?Sized>(bus: &mut B, zp: u8) -> u16 {
    let lo = bus.read(zp as u16) as u16;
    let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
    (hi << 8) | lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::pins::IrqSource;

    struct FlatBus {
        ram: Vec<u8>,
        pins: CpuPins,
    }

    impl FlatBus {
        fn with_program(origin: u16, program: &[u8]) -> Self {
            let mut ram = vec![0; 0x10000];
            ram[origin as usize..origin as usize + program.len()].copy_from_slice(program);
            ram[RESET_VECTOR as usize] = origin as u8;
            ram[RESET_VECTOR as usize + 1] = (origin >> 8) as u8;
            Self {
                ram,
                pins: CpuPins::new(),
            }
        }
    }

    impl CpuBus for FlatBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }

        fn write(&mut self, addr: u16, value: u8) {
            self.ram[addr as usize] = value;
        }

        fn pins(&mut self) -> &mut CpuPins {
            &mut self.pins
        }
    }

    fn boot(program: &[u8]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus::with_program(0x8000, program);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    #[test]
    fn reset_loads_vector_and_power_up_state() {
        let (cpu, _) = boot(&[0xEA]);
        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.sp, 0xFD);
        assert_eq!(cpu.status(), 0x24);
    }

    #[test]
    fn adc_carry_and_overflow_sequence() {
        let mut cpu = Cpu::new();
        cpu.a = 0x7F;
        cpu.adc(0x01);
        assert_eq!(cpu.a, 0x80);
        assert!(cpu.p.contains(Status::OVERFLOW));
        assert!(!cpu.p.contains(Status::CARRY));

        cpu.adc(0x80);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.p.contains(Status::CARRY));
        assert!(cpu.p.contains(Status::OVERFLOW));

        cpu.adc(0x01);
        assert_eq!(cpu.a, 0x02);
        assert!(!cpu.p.contains(Status::CARRY));
        assert!(!cpu.p.contains(Status::OVERFLOW));
    }

    #[test]
    fn asl_walks_a_bit_out_through_carry() {
        let mut cpu = Cpu::new();
        let mut value = 0x01;
        for _ in 0..7 {
            value = cpu.asl(value);
        }
        assert_eq!(value, 0x80);
        assert!(!cpu.p.contains(Status::CARRY));
        value = cpu.asl(value);
        assert_eq!(value, 0x00);
        assert!(cpu.p.contains(Status::CARRY));
        assert!(cpu.p.contains(Status::ZERO));
    }

    #[test]
    fn rotations_are_nine_bit_cycles() {
        let mut cpu = Cpu::new();
        cpu.p.remove(Status::CARRY);
        let mut value = 0x81;
        for _ in 0..9 {
            value = cpu.rol(value);
        }
        assert_eq!(value, 0x81);
        assert!(!cpu.p.contains(Status::CARRY));

        for _ in 0..9 {
            value = cpu.ror(value);
        }
        assert_eq!(value, 0x81);

        let mut shifted = 0x81;
        for _ in 0..8 {
            shifted = cpu.lsr(shifted);
        }
        assert_eq!(shifted, 0);
        assert!(cpu.p.contains(Status::CARRY));
    }

    #[test]
    fn stack_round_trip() {
        let (mut cpu, mut bus) = boot(&[0xEA]);
        cpu.push(&mut bus, 0x69);
        assert_eq!(cpu.sp, 0xFC);
        assert_eq!(cpu.pull(&mut bus), 0x69);
        assert_eq!(cpu.sp, 0xFD);

        cpu.push16(&mut bus, 0x1234);
        assert_eq!(cpu.sp, 0xFB);
        assert_eq!(cpu.pull16(&mut bus), 0x1234);
        assert_eq!(cpu.sp, 0xFD);
    }

    #[test]
    fn brk_pushes_pc_plus_two_and_break_flag() {
        let (mut cpu, mut bus) = boot(&[0x00, 0xFF]);
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0x90;
        cpu.p.remove(Status::INTERRUPT);

        let cycles = cpu.execute_instruction(&mut bus);

        assert_eq!(cycles, 7);
        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.p.contains(Status::INTERRUPT));
        let pushed_p = cpu.pull(&mut bus);
        assert_eq!(pushed_p & 0x30, 0x30);
        assert_eq!(cpu.pull16(&mut bus), 0x8002);
    }

    #[test]
    fn rti_clears_break_and_keeps_bit_five() {
        let (mut cpu, mut bus) = boot(&[0x40]);
        cpu.push16(&mut bus, 0x1234);
        cpu.push(&mut bus, 0xFF);
        cpu.execute_instruction(&mut bus);
        assert_eq!(cpu.pc, 0x1234);
        assert_eq!(cpu.status(), 0xEF);
    }

    #[test]
    fn page_crossing_costs_a_cycle_on_loads_only() {
        // LDA $80FF,X ; STA $80FF,X
        let (mut cpu, mut bus) = boot(&[0xBD, 0xFF, 0x80, 0x9D, 0xFF, 0x80]);
        cpu.x = 1;
        assert_eq!(cpu.execute_instruction(&mut bus), 5);
        assert_eq!(cpu.execute_instruction(&mut bus), 5);
    }

    #[test]
    fn taken_branches_cost_extra_cycles() {
        // BNE +2 (not taken with Z set), BEQ -128 crosses a page
        let (mut cpu, mut bus) = boot(&[0xD0, 0x02, 0xF0, 0x80]);
        cpu.p.insert(Status::ZERO);
        assert_eq!(cpu.execute_instruction(&mut bus), 2);
        assert_eq!(cpu.pc, 0x8002);
        assert_eq!(cpu.execute_instruction(&mut bus), 4);
        assert_eq!(cpu.pc, 0x8004u16.wrapping_sub(128));
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        let (mut cpu, mut bus) = boot(&[0x6C, 0xFF, 0x02]);
        bus.ram[0x02FF] = 0x34;
        bus.ram[0x0200] = 0x12;
        bus.ram[0x0300] = 0x99;
        cpu.execute_instruction(&mut bus);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn zero_page_indexing_wraps() {
        // LDA $F0,X with X = $20 reads $0010
        let (mut cpu, mut bus) = boot(&[0xB5, 0xF0]);
        bus.ram[0x0010] = 0x42;
        cpu.x = 0x20;
        cpu.execute_instruction(&mut bus);
        assert_eq!(cpu.a, 0x42);
    }

    #[test]
    fn irq_respects_interrupt_disable_and_nmi_does_not() {
        let (mut cpu, mut bus) = boot(&[0xEA, 0xEA]);
        bus.ram[0xFFFA] = 0x00;
        bus.ram[0xFFFB] = 0xA0;
        bus.ram[0xFFFE] = 0x00;
        bus.ram[0xFFFF] = 0xB0;

        bus.pins.assert_irq(IrqSource::MAPPER);
        assert_eq!(cpu.execute_instruction(&mut bus), 2);
        assert_eq!(cpu.pc, 0x8001);

        bus.pins.trigger_nmi();
        assert_eq!(cpu.execute_instruction(&mut bus), 7);
        assert_eq!(cpu.pc, 0xA000);

        cpu.p.remove(Status::INTERRUPT);
        assert_eq!(cpu.execute_instruction(&mut bus), 7);
        assert_eq!(cpu.pc, 0xB000);
    }

    #[test]
    fn stall_cycles_are_consumed_before_execution() {
        let (mut cpu, mut bus) = boot(&[0xE8]);
        bus.pins.add_stall(2);
        assert_eq!(cpu.execute_instruction(&mut bus), 1);
        assert_eq!(cpu.execute_instruction(&mut bus), 1);
        assert_eq!(cpu.x, 0);
        assert_eq!(cpu.execute_instruction(&mut bus), 2);
        assert_eq!(cpu.x, 1);
        assert_eq!(cpu.cycles, 4);
    }

    #[test]
    fn every_opcode_executes_without_panicking() {
        for opcode in 0..=255u8 {
            let (mut cpu, mut bus) = boot(&[opcode, 0x10, 0x20]);
            let cycles = cpu.execute_instruction(&mut bus);
            assert!((2..=8).contains(&cycles), "opcode ${opcode:02X} took {cycles}");
        }
    }

    #[test]
    fn jam_holds_the_program_counter() {
        let (mut cpu, mut bus) = boot(&[0x02]);
        cpu.execute_instruction(&mut bus);
        cpu.execute_instruction(&mut bus);
        assert_eq!(cpu.pc, 0x8000);
    }

    #[test]
    fn unofficial_rmw_combines_with_accumulator() {
        // DCP $10 ; ISC $11
        let (mut cpu, mut bus) = boot(&[0xC7, 0x10, 0xE7, 0x11]);
        bus.ram[0x10] = 0x43;
        bus.ram[0x11] = 0x01;
        cpu.a = 0x42;
        cpu.execute_instruction(&mut bus);
        assert_eq!(bus.ram[0x10], 0x42);
        assert!(cpu.p.contains(Status::ZERO));
        assert!(cpu.p.contains(Status::CARRY));

        cpu.execute_instruction(&mut bus);
        assert_eq!(bus.ram[0x11], 0x02);
        assert_eq!(cpu.a, 0x40);
    }
}
