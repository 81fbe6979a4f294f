use bitflags::bitflags;

bitflags! {
    /// Devices that can hold the shared IRQ line low.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqSource: u8 {
        const APU_FRAME = 0x01;
        const APU_DMC = 0x02;
        const MAPPER = 0x04;
        const EXTERNAL = 0x08;
    }
}

/// Processor input lines: edge-triggered NMI, wired-OR IRQ and the RDY stall counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuPins {
    nmi: bool,
    irq: IrqSource,
    stall: u32,
}

impl CpuPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_nmi(&mut self) {
        self.nmi = true;
    }

    pub fn nmi_pending(&self) -> bool {
        self.nmi
    }

    /// Consumes a latched NMI edge.
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi)
    }

    pub fn assert_irq(&mut self, source: IrqSource) {
        self.irq |= source;
    }

    pub fn cancel_irq(&mut self, source: IrqSource) {
        self.irq &= !source;
    }

    pub fn set_irq(&mut self, source: IrqSource, asserted: bool) {
        self.irq.set(source, asserted);
    }

    pub fn irq_pending(&self) -> bool {
        !self.irq.is_empty()
    }

    pub fn irq_sources(&self) -> IrqSource {
        self.irq
    }

    pub fn add_stall(&mut self, cycles: u32) {
        self.stall = self.stall.saturating_add(cycles);
    }

    pub fn stall_cycles(&self) -> u32 {
        self.stall
    }

    /// Takes one stall cycle off the RDY line, returning whether one was pending.
    pub fn consume_stall(&mut self) -> bool {
        if self.stall == 0 {
            return false;
        }
        self.stall -= 1;
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_sources_cancel_independently() {
        let mut pins = CpuPins::new();
        pins.assert_irq(IrqSource::APU_FRAME);
        pins.assert_irq(IrqSource::MAPPER);
        pins.cancel_irq(IrqSource::APU_FRAME);
        assert!(pins.irq_pending());
        assert_eq!(pins.irq_sources(), IrqSource::MAPPER);
        pins.cancel_irq(IrqSource::MAPPER);
        assert!(!pins.irq_pending());
    }

    #[test]
    fn nmi_edge_is_consumed_once() {
        let mut pins = CpuPins::new();
        pins.trigger_nmi();
        pins.trigger_nmi();
        assert!(pins.take_nmi());
        assert!(!pins.take_nmi());
    }

    #[test]
    fn stall_counts_down() {
        let mut pins = CpuPins::new();
        pins.add_stall(2);
        assert!(pins.consume_stall());
        assert!(pins.consume_stall());
        assert!(!pins.consume_stall());
    }
}
