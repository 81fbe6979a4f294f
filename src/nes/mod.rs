pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod disasm;
pub mod instructions;
pub mod mapper;
pub mod palette;
pub mod pins;
pub mod ppu;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::Path;

use crate::asm::Program;
use crate::config::ConsoleConfig;
use apu::Apu;
use bus::{Handler, MemoryHandler, MemoryMap, Target};
use cartridge::Cartridge;
use controller::{Buttons, ControllerMultiplexor, InputDevice, Joypad};
use cpu::{Cpu, CpuBus, Status};
use mapper::{Mapper, Mirroring, Unloaded, create_mapper, mapper_name};
use pins::{CpuPins, IrqSource};
use ppu::Ppu;

pub const CONTROLLER_PORTS: usize = 2;

const PPU_STEPS_PER_CPU_CYCLE: u32 = 3;
const OAM_DMA_STALL_CYCLES: u32 = 513;
const DMC_FETCH_STALL_CYCLES: u32 = 4;
const CARTRIDGE_START: u16 = 0x4020;
const FRAME_STEP_LIMIT: usize = 1_000_000;

/// Memory-mapped devices behind [`Handler::External`] slots on the CPU bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    PpuRegisters,
    ApuRegisters,
    ApuStatus,
    OamDma,
    Controller1,
    Controller2,
    ControllerStrobe,
    OpenBus,
    Cartridge,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsoleStats {
    pub frames: u64,
    pub instructions: u64,
    pub cpu_cycles: u64,
    pub ppu_ticks: u64,
    pub apu_ticks: u64,
    pub oam_dma_transfers: u64,
    pub dmc_fetches: u64,
    pub stall_cycles: u64,
    pub nmis_serviced: u64,
    pub irqs_serviced: u64,
}

/// Everything the CPU can reach through memory-mapped registers.
pub struct Devices {
    pub ppu: Ppu,
    pub apu: Apu,
    pub mapper: Box<dyn Mapper>,
    pub ports: [ControllerMultiplexor; CONTROLLER_PORTS],
    pins: CpuPins,
    open_bus: u8,
    dma_page: Option<u8>,
    cartridge_written: bool,
    mirroring: Mirroring,
}

impl Devices {
    fn new(config: &ConsoleConfig) -> Self {
        let mut ppu = Ppu::new();
        ppu.configure(config.nmi_delay_cycles, config.odd_frame_skip);

        let ports = [
            ControllerMultiplexor::with_device(Box::new(Joypad::new())),
            ControllerMultiplexor::with_device(Box::new(Joypad::new())),
        ];

        Self {
            ppu,
            apu: Apu::new(config.sample_rate, config.cpu_frequency_hz),
            mapper: Box::new(Unloaded::default()),
            ports,
            pins: CpuPins::new(),
            open_bus: 0,
            dma_page: None,
            cartridge_written: false,
            mirroring: Mirroring::default(),
        }
    }

    pub fn pins(&self) -> &CpuPins {
        &self.pins
    }

    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    /// Forwards cartridge mirroring and IRQ output after the mapper may have changed them.
    fn sync_cartridge(&mut self) {
        let mirroring = self.mapper.mirroring();
        if mirroring != self.mirroring {
            log::debug!("mirroring {:?} -> {:?}", self.mirroring, mirroring);
            self.mirroring = mirroring;
            self.ppu.set_mirroring(mirroring);
        }
        self.pins.set_irq(IrqSource::MAPPER, self.mapper.irq_pending());
    }
}

impl MemoryHandler<Device> for Devices {
    fn read(&mut self, device: Device, addr: u16) -> u8 {
        match device {
            Device::PpuRegisters => self.ppu.read_register(addr, self.mapper.as_mut()),
            Device::ApuStatus => (self.open_bus & 0x20) | self.apu.read_status(),
            Device::Controller1 => self.ports[0].read(&self.ppu),
            Device::Controller2 => self.ports[1].read(&self.ppu),
            Device::Cartridge => self.mapper.cpu_read(addr).unwrap_or(self.open_bus),
            Device::ApuRegisters | Device::OamDma | Device::ControllerStrobe | Device::OpenBus => {
                self.open_bus
            }
        }
    }

    fn write(&mut self, device: Device, addr: u16, value: u8) {
        match device {
            Device::PpuRegisters => self.ppu.write_register(addr, value, self.mapper.as_mut()),
            Device::ApuRegisters | Device::ApuStatus => self.apu.write_register(addr, value),
            Device::OamDma => self.dma_page = Some(value),
            Device::ControllerStrobe => {
                for port in &mut self.ports {
                    port.write_strobe(value);
                }
            }
            Device::Cartridge => {
                self.mapper.cpu_write(addr, value);
                self.cartridge_written = true;
            }
            Device::Controller1 | Device::Controller2 | Device::OpenBus => {}
        }
    }
}

/// CPU-side bus: the configurable address map plus the devices it dispatches to.
pub struct SystemBus {
    pub map: MemoryMap<Device>,
    pub devices: Devices,
    stats: ConsoleStats,
    cpu_cycle: u64,
}

impl SystemBus {
    fn new(config: &ConsoleConfig) -> Self {
        Self {
            map: default_memory_map(),
            devices: Devices::new(config),
            stats: ConsoleStats::default(),
            cpu_cycle: 0,
        }
    }

    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        let mut bytes = [0u8; 256];
        for (offset, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read(base | offset as u16);
        }
        self.devices.ppu.write_oam_dma(&bytes);

        let stall = OAM_DMA_STALL_CYCLES + (self.cpu_cycle & 1) as u32;
        self.devices.pins.add_stall(stall);
        self.stats.oam_dma_transfers += 1;
        self.stats.stall_cycles += stall as u64;
        log::debug!("OAM DMA from ${base:04X}, {stall} stall cycles");
    }
}

impl CpuBus for SystemBus {
    fn read(&mut self, addr: u16) -> u8 {
        let value = self.map.read(addr, &mut self.devices);
        self.devices.open_bus = value;
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.devices.open_bus = value;
        self.map.write(addr, value, &mut self.devices);

        if let Some(page) = self.devices.dma_page.take() {
            self.oam_dma(page);
        }
        if std::mem::take(&mut self.devices.cartridge_written) {
            self.devices.sync_cartridge();
        }
    }

    fn pins(&mut self) -> &mut CpuPins {
        &mut self.devices.pins
    }
}

/// Power-on CPU address map. $4020-$FFFF stay plain memory until a cartridge is inserted.
pub fn default_memory_map() -> MemoryMap<Device> {
    let mut map = MemoryMap::new();

    map.configure_range(0x0800, 0x1FFF, Handler::Mirror { base: 0x0000, length: 0x0800 });
    map.configure_range(0x2000, 0x2007, Handler::External(Device::PpuRegisters));
    map.configure_range(0x2008, 0x3FFF, Handler::Mirror { base: 0x2000, length: 8 });

    map.configure_write_range(0x4000, 0x4013, Handler::External(Device::ApuRegisters));
    map.configure_read_range(0x4000, 0x4013, Handler::External(Device::OpenBus));
    map.configure_write(0x4014, Handler::External(Device::OamDma));
    map.configure_read(0x4014, Handler::External(Device::OpenBus));
    map.configure(0x4015, Handler::External(Device::ApuStatus));
    map.configure_read(0x4016, Handler::External(Device::Controller1));
    map.configure_write(0x4016, Handler::External(Device::ControllerStrobe));
    map.configure_read(0x4017, Handler::External(Device::Controller2));
    map.configure_write(0x4017, Handler::External(Device::ApuRegisters));
    map.configure_range(0x4018, 0x401F, Handler::External(Device::OpenBus));

    map
}

/// The console: one CPU stepping in lockstep with the PPU (3 dots per cycle) and APU.
pub struct Nes {
    pub cpu: Cpu,
    pub bus: SystemBus,
    config: ConsoleConfig,
    mapper_label: String,
    cycle_budget: f64,
    frame_ready: bool,
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nes {
    pub fn new() -> Self {
        Self::build(ConsoleConfig::default())
    }

    /// Builds a console from `config`, rejecting values it cannot run with.
    pub fn with_config(config: ConsoleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ConsoleConfig) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: SystemBus::new(&config),
            config,
            mapper_label: "none".to_string(),
            cycle_budget: 0.0,
            frame_ready: false,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn stats(&self) -> &ConsoleStats {
        &self.bus.stats
    }

    pub fn ppu(&self) -> &Ppu {
        &self.bus.devices.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.bus.devices.apu
    }

    pub fn mapper(&self) -> &dyn Mapper {
        self.bus.devices.mapper.as_ref()
    }

    pub fn mapper_name(&self) -> &str {
        &self.mapper_label
    }

    pub fn memory_map_mut(&mut self) -> &mut MemoryMap<Device> {
        &mut self.bus.map
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.devices.ppu.frame_buffer()
    }

    pub fn take_audio_samples(&mut self) -> Vec<f32> {
        self.bus.devices.apu.take_samples()
    }

    pub fn load_rom_from_path(&mut self, path: &Path) -> Result<()> {
        let cart = Cartridge::from_file(path)?;
        self.load_cartridge(cart)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn load_rom_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.load_cartridge(Cartridge::from_bytes(bytes)?)
    }

    /// Inserts a cartridge, hands it $4020-$FFFF and resets the console.
    pub fn load_cartridge(&mut self, cart: Cartridge) -> Result<()> {
        let mapper_id = cart.mapper_id;
        let submapper_id = cart.submapper_id;
        let mapper = create_mapper(cart)?;

        self.mapper_label = if submapper_id != 0 {
            format!("{} (mapper {mapper_id}, submapper {submapper_id})", mapper_name(mapper_id))
        } else {
            format!("{} (mapper {mapper_id})", mapper_name(mapper_id))
        };

        self.bus.devices.mapper = mapper;
        self.bus.map.configure_range(
            CARTRIDGE_START,
            0xFFFF,
            Handler::External(Device::Cartridge),
        );
        self.bus.devices.mirroring = self.bus.devices.mapper.mirroring();
        self.bus.devices.ppu.set_mirroring(self.bus.devices.mirroring);

        self.reset();
        log::debug!("ROM loaded: {}", self.mapper_label);
        Ok(())
    }

    /// Writes an assembled program through the bus and points the CPU at its origin.
    pub fn load_program(&mut self, program: &Program) {
        for segment in &program.segments {
            for (offset, &byte) in segment.bytes.iter().enumerate() {
                let addr = segment.origin.wrapping_add(offset as u16);
                self.bus.write(addr, byte);
            }
        }
        self.cpu.pc = program.origin;
    }

    pub fn reset(&mut self) {
        self.bus.devices.ppu.reset();
        self.bus.devices.apu.reset();
        self.cpu.reset(&mut self.bus);
        self.bus.devices.sync_cartridge();
        self.cycle_budget = 0.0;
        self.frame_ready = false;
        log::debug!("CPU reset, PC=${:04X}", self.cpu.pc);
    }

    pub fn connect(&mut self, port: usize, device: Box<dyn InputDevice>) -> Result<()> {
        self.port_mut(port)?.connect(device)
    }

    pub fn disconnect_all(&mut self, port: usize) -> Result<()> {
        self.port_mut(port)?.disconnect_all();
        Ok(())
    }

    pub fn port_mut(&mut self, port: usize) -> Result<&mut ControllerMultiplexor> {
        if port >= CONTROLLER_PORTS {
            bail!("controller port {port} out of range (0-{})", CONTROLLER_PORTS - 1);
        }
        Ok(&mut self.bus.devices.ports[port])
    }

    /// Sets the buttons of the first joypad on `port`.
    pub fn set_buttons(&mut self, port: usize, buttons: Buttons) -> Result<()> {
        let joypad = self
            .port_mut(port)?
            .device_mut::<Joypad>()
            .with_context(|| format!("no joypad connected to port {port}"))?;
        joypad.set_buttons(buttons);
        Ok(())
    }

    /// Bus read with all device side effects.
    pub fn read_memory(&mut self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    /// Bus write with all device side effects.
    pub fn write_memory(&mut self, addr: u16, value: u8) {
        self.bus.write(addr, value);
    }

    /// Backing memory, bypassing handlers.
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.map.peek(addr)
    }

    pub fn poke(&mut self, addr: u16, value: u8) {
        self.bus.map.poke(addr, value);
    }

    /// Reads what the CPU would see without touching device registers. Register slots
    /// report the current open-bus value.
    pub fn inspect(&mut self, addr: u16) -> u8 {
        let devices = &mut self.bus.devices;
        match self.bus.map.resolve_read(addr) {
            Target::Memory(addr) => self.bus.map.peek(addr),
            Target::External(Device::Cartridge, addr) => {
                devices.mapper.cpu_read(addr).unwrap_or(devices.open_bus)
            }
            Target::External(..) => devices.open_bus,
        }
    }

    /// Executes one instruction (or interrupt entry, or stall cycle), then runs the PPU
    /// for three dots and the APU for one cycle per CPU cycle.
    pub fn step(&mut self) -> u32 {
        let pins = &self.bus.devices.pins;
        let stalled = pins.stall_cycles() > 0;
        let nmi = !stalled && pins.nmi_pending();
        let irq = !stalled && !nmi && pins.irq_pending() && !self.cpu.p.contains(Status::INTERRUPT);

        self.bus.cpu_cycle = self.cpu.cycles;
        let cycles = self.cpu.execute_instruction(&mut self.bus);

        let stats = &mut self.bus.stats;
        if nmi {
            stats.nmis_serviced += 1;
        } else if irq {
            stats.irqs_serviced += 1;
        } else if !stalled {
            stats.instructions += 1;
        }
        stats.cpu_cycles += cycles as u64;

        for _ in 0..cycles * PPU_STEPS_PER_CPU_CYCLE {
            self.step_video();
        }
        for _ in 0..cycles {
            self.step_audio();
        }
        cycles
    }

    fn step_video(&mut self) {
        let devices = &mut self.bus.devices;
        devices.ppu.step(devices.mapper.as_mut());
        if devices.ppu.take_nmi() {
            devices.pins.trigger_nmi();
        }
        if devices.ppu.take_frame_complete() {
            self.frame_ready = true;
            self.bus.stats.frames += 1;
        }
        devices.pins.set_irq(IrqSource::MAPPER, devices.mapper.irq_pending());
        self.bus.stats.ppu_ticks += 1;
    }

    fn step_audio(&mut self) {
        self.bus.devices.apu.step();

        if let Some(addr) = self.bus.devices.apu.dmc_fetch_request() {
            let value = self.bus.read(addr);
            self.bus.devices.apu.complete_dmc_fetch(value);
            self.bus.devices.pins.add_stall(DMC_FETCH_STALL_CYCLES);
            self.bus.stats.dmc_fetches += 1;
            self.bus.stats.stall_cycles += DMC_FETCH_STALL_CYCLES as u64;
            log::trace!("DMC fetch ${addr:04X}");
        }

        let devices = &mut self.bus.devices;
        devices.pins.set_irq(IrqSource::APU_FRAME, devices.apu.frame_irq());
        devices.pins.set_irq(IrqSource::APU_DMC, devices.apu.dmc_irq());
        self.bus.stats.apu_ticks += 1;
    }

    /// Runs for `delta_seconds` of emulated time and returns the CPU cycles executed.
    ///
    /// The final instruction may overshoot the budget; the overshoot is paid back from
    /// the next call.
    pub fn run(&mut self, delta_seconds: f64) -> u64 {
        self.cycle_budget += delta_seconds * self.config.cpu_frequency_hz;
        let mut consumed = 0u64;
        while self.cycle_budget > 0.0 {
            let cycles = self.step();
            consumed += cycles as u64;
            self.cycle_budget -= cycles as f64;
        }
        consumed
    }

    /// Steps until the PPU enters VBlank and returns the CPU cycles executed.
    pub fn run_frame(&mut self) -> u64 {
        self.frame_ready = false;
        let mut consumed = 0u64;
        for _ in 0..FRAME_STEP_LIMIT {
            consumed += self.step() as u64;
            if self.frame_ready {
                return consumed;
            }
        }
        log::warn!("frame did not complete within {FRAME_STEP_LIMIT} CPU steps");
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use controller::Zapper;

    fn boot(source: &str) -> Nes {
        let program = assemble(source).unwrap();
        let mut nes = Nes::new();
        nes.load_program(&program);
        nes.reset();
        nes
    }

    const VECTORS: &str = "
        .org $FFFA
        .word nmi, reset, irq
    ";

    fn nrom_image(prg: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 16];
        image[0..4].copy_from_slice(b"NES\x1A");
        image[4] = 1;
        image[5] = 1;
        let mut bank = vec![0xEA; 0x4000];
        bank[..prg.len()].copy_from_slice(prg);
        bank[0x3FFC] = 0x00;
        bank[0x3FFD] = 0xC0;
        image.extend(bank);
        image.extend(vec![0u8; 0x2000]);
        image
    }

    #[test]
    fn every_port_starts_with_one_joypad() {
        let mut nes = Nes::new();
        for port in 0..CONTROLLER_PORTS {
            let port = nes.port_mut(port).unwrap();
            assert_eq!(port.len(), 1);
            assert!(port.device_mut::<Joypad>().is_some());
        }
    }

    #[test]
    fn internal_ram_is_mirrored() {
        let mut nes = Nes::new();
        nes.write_memory(0x0001, 0x42);
        assert_eq!(nes.read_memory(0x0801), 0x42);
        assert_eq!(nes.read_memory(0x1801), 0x42);
        nes.write_memory(0x1FFF, 0x17);
        assert_eq!(nes.peek(0x07FF), 0x17);
    }

    #[test]
    fn ppu_registers_are_mirrored_every_eight_bytes() {
        let mut nes = Nes::new();
        nes.write_memory(0x3FFE, 0x21);
        nes.write_memory(0x2006, 0x08);
        assert_eq!(nes.ppu().scroll_registers().0, 0x2108);
    }

    #[test]
    fn unmapped_registers_read_open_bus() {
        let mut nes = Nes::new();
        nes.write_memory(0x0000, 0x5C);
        nes.read_memory(0x0000);
        assert_eq!(nes.read_memory(0x4018), 0x5C);
    }

    #[test]
    fn oam_dma_copies_a_page_and_stalls() {
        let mut nes = Nes::new();
        for i in 0..=255u8 {
            nes.write_memory(0x0200 | i as u16, i);
        }
        nes.write_memory(0x4014, 0x02);

        assert_eq!(nes.ppu().peek_oam(0x00), 0x00);
        assert_eq!(nes.ppu().peek_oam(0x7F), 0x7F);
        assert_eq!(nes.ppu().peek_oam(0xFF), 0xFF);
        assert_eq!(nes.bus.devices.pins().stall_cycles(), 513);
        assert_eq!(nes.stats().oam_dma_transfers, 1);

        assert_eq!(nes.step(), 1);
    }

    #[test]
    fn odd_cycle_dma_costs_one_more() {
        let mut nes = Nes::new();
        nes.bus.cpu_cycle = 7;
        nes.write_memory(0x4014, 0x00);
        assert_eq!(nes.bus.devices.pins().stall_cycles(), 514);
    }

    #[test]
    fn step_keeps_one_to_three_to_one_ratio() {
        let mut nes = boot(
            "
            .org $8000
            reset: LDA #$01
                   STA $00
                   INC $00
            loop:  JMP loop
            nmi:
            irq:   RTI
            ",
        );
        nes.poke(0xFFFC, 0x00);
        nes.poke(0xFFFD, 0x80);
        nes.reset();

        let mut total = 0u64;
        for _ in 0..100 {
            total += nes.step() as u64;
        }
        let stats = nes.stats();
        assert_eq!(stats.cpu_cycles, total);
        assert_eq!(stats.ppu_ticks, total * 3);
        assert_eq!(stats.apu_ticks, total);
        assert_eq!(nes.peek(0x00), 0x02);
    }

    #[test]
    fn run_consumes_the_time_budget() {
        let mut nes = boot(&format!(
            "
            .org $8000
            reset: NOP
                   JMP reset
            nmi:
            irq:   RTI
            {VECTORS}"
        ));
        let frequency = nes.config().cpu_frequency_hz;

        let first = nes.run(0.001);
        assert!(first as f64 >= frequency * 0.001);
        assert!((first as f64) < frequency * 0.001 + 8.0);

        let mut total = first;
        for _ in 0..99 {
            total += nes.run(0.001);
        }
        let expected = frequency * 0.1;
        assert!((total as f64 - expected).abs() < 8.0);
    }

    #[test]
    fn vblank_nmi_reaches_the_cpu() {
        let mut nes = boot(&format!(
            "
            .org $8000
            reset: LDA #$80
                   STA $2000
            loop:  JMP loop
            nmi:   INC $10
                   RTI
            irq:   RTI
            {VECTORS}"
        ));
        nes.run_frame();
        nes.run_frame();
        nes.run_frame();
        assert!(nes.peek(0x10) >= 2);
        assert_eq!(nes.stats().nmis_serviced as u8, nes.peek(0x10));
        assert_eq!(nes.stats().frames, 3);
    }

    #[test]
    fn apu_frame_irq_is_serviced_and_acknowledged() {
        let mut nes = boot(&format!(
            "
            .org $8000
            reset: CLI
            loop:  JMP loop
            irq:   LDA $4015
                   INC $20
                   RTI
            nmi:   RTI
            {VECTORS}"
        ));
        // The first frame IRQ lands at cycle 29829 and the next one 29830 cycles later.
        while nes.stats().cpu_cycles < 40_000 {
            nes.step();
        }
        assert_eq!(nes.peek(0x20), 1);
        assert_eq!(nes.stats().irqs_serviced, 1);
        assert!(!nes.bus.devices.pins().irq_sources().contains(IrqSource::APU_FRAME));
    }

    #[test]
    fn joypad_reads_through_4016() {
        let mut nes = Nes::new();
        nes.set_buttons(0, Buttons::B | Buttons::UP).unwrap();
        nes.write_memory(0x4016, 1);
        nes.write_memory(0x4016, 0);
        let bits: Vec<u8> = (0..8).map(|_| nes.read_memory(0x4016) & 1).collect();
        assert_eq!(bits, [0, 1, 0, 0, 1, 0, 0, 0]);
        assert_eq!(nes.read_memory(0x4017) & 0xE0, 0x40);
    }

    #[test]
    fn controller_port_must_exist() {
        let mut nes = Nes::new();
        assert!(nes.connect(2, Box::new(Zapper::default())).is_err());
        assert!(nes.set_buttons(5, Buttons::A).is_err());
        nes.disconnect_all(1).unwrap();
        nes.connect(1, Box::new(Zapper::default())).unwrap();
        assert!(nes.set_buttons(1, Buttons::A).is_err());
        assert_eq!(nes.read_memory(0x4017) & 0x18, 0x08);
    }

    #[test]
    fn cartridge_owns_upper_address_space() {
        let mut nes = Nes::new();
        nes.load_rom_bytes(&nrom_image(&[0xA9, 0x07])).unwrap();

        assert_eq!(nes.cpu.pc, 0xC000);
        assert_eq!(nes.read_memory(0x8000), 0xA9);
        assert_eq!(nes.read_memory(0xC001), 0x07);
        assert_eq!(nes.inspect(0xC000), 0xA9);
        assert!(nes.mapper_name().starts_with("NROM"));

        nes.read_memory(0x0000);
        let open_bus = nes.bus.devices.open_bus();
        assert_eq!(nes.read_memory(0x5000), open_bus);

        nes.step();
        assert_eq!(nes.cpu.a, 0x07);
    }

    #[test]
    fn mapper_mirroring_changes_reach_the_ppu() {
        let mut image = nrom_image(&[]);
        image[6] = 0x70;
        image[4] = 2;
        image.splice(16..16, vec![0xEA; 0x4000]);
        let mut nes = Nes::new();
        nes.load_rom_bytes(&image).unwrap();
        assert_eq!(nes.ppu().mirroring(), Mirroring::OneScreenLower);

        nes.write_memory(0x8000, 0x10);
        assert_eq!(nes.ppu().mirroring(), Mirroring::OneScreenUpper);
    }

    #[test]
    fn unsupported_mapper_is_rejected() {
        let mut image = nrom_image(&[]);
        image[6] = 0xF0;
        let mut nes = Nes::new();
        assert!(nes.load_rom_bytes(&image).is_err());
        assert_eq!(nes.mapper_name(), "none");
    }

    #[test]
    fn stats_serialize_to_json() {
        let nes = Nes::new();
        let json = serde_json::to_value(nes.stats()).unwrap();
        assert_eq!(json["frames"], 0);
        assert!(json.get("dmc_fetches").is_some());
    }
}
