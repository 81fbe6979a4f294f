use famicore::asm::{AsmError, Program, assemble};
use famicore::config::ConsoleConfig;
use famicore::nes::Nes;
use famicore::nes::controller::{Buttons, Zapper};
use famicore::nes::cpu::CpuBus;
use famicore::nes::pins::IrqSource;
use famicore::nes::ppu::{FRAME_HEIGHT, FRAME_WIDTH};

const VECTORS: &str = "
    .org $FFFA
    .word nmi, reset, irq
";

fn boot_with(config: ConsoleConfig, body: &str) -> (Nes, Program) {
    let source = format!(
        "
        .org $8000
        {body}
        nmi:
        irq:   RTI
        {VECTORS}"
    );
    let program = assemble(&source).unwrap();
    let mut nes = Nes::with_config(config).unwrap();
    nes.load_program(&program);
    nes.reset();
    (nes, program)
}

fn boot(body: &str) -> (Nes, Program) {
    boot_with(ConsoleConfig::default(), body)
}

fn run_until(nes: &mut Nes, program: &Program, label: &str) {
    let target = program.symbol(label).unwrap();
    for _ in 0..10_000 {
        if nes.cpu.pc == target {
            return;
        }
        nes.step();
    }
    panic!("never reached {label} (PC=${:04X})", nes.cpu.pc);
}

#[test]
fn assembled_loop_sums_a_series() {
    let (mut nes, program) = boot(
        "
        reset: LDX #10
               LDA #0
               CLC
        loop:  STX $01
               ADC $01
               DEX
               BNE loop
               STA $00
        done:  JMP done
        ",
    );
    run_until(&mut nes, &program, "done");
    assert_eq!(nes.peek(0x00), 55);
    assert_eq!(nes.cpu.x, 0);
}

#[test]
fn subroutines_balance_the_stack() {
    let (mut nes, program) = boot(
        "
        reset: LDX #$FF
               TXS
               JSR bump
               JSR bump
        done:  JMP done
        bump:  INC $40
               RTS
        ",
    );
    run_until(&mut nes, &program, "done");
    assert_eq!(nes.peek(0x40), 2);
    assert_eq!(nes.cpu.sp, 0xFF);
}

#[test]
fn load_program_starts_at_the_first_segment() {
    let program = assemble(".org $0300\nstart: NOP\nJMP start").unwrap();
    let mut nes = Nes::new();
    nes.load_program(&program);
    assert_eq!(nes.cpu.pc, 0x0300);
    assert_eq!(nes.peek(0x0300), 0xEA);

    assert_eq!(nes.step(), 2);
    assert_eq!(nes.cpu.pc, 0x0301);
}

#[test]
fn program_reads_the_joypad_serially() {
    let (mut nes, program) = boot(
        "
        reset: LDA #1
               STA $4016
               LDA #0
               STA $4016
               LDX #0
        read:  LDA $4016
               AND #1
               STA $50,X
               INX
               CPX #8
               BNE read
        done:  JMP done
        ",
    );
    nes.set_buttons(0, Buttons::A | Buttons::SELECT | Buttons::LEFT)
        .unwrap();
    run_until(&mut nes, &program, "done");

    let bits: Vec<u8> = (0x50..0x58).map(|addr| nes.peek(addr)).collect();
    assert_eq!(bits, [1, 0, 1, 0, 0, 0, 1, 0]);
}

#[test]
fn zapper_on_port_two() {
    let mut nes = Nes::new();
    nes.disconnect_all(1).unwrap();
    nes.connect(1, Box::new(Zapper::default())).unwrap();

    assert_eq!(nes.read_memory(0x4017) & 0x18, 0x08);
    nes.port_mut(1)
        .unwrap()
        .device_mut::<Zapper>()
        .unwrap()
        .aim(10, 10, true);
    // Power-on frame is black, so the sensor still reads dark.
    assert_eq!(nes.read_memory(0x4017) & 0x18, 0x18);
}

#[test]
fn reconfigured_mirroring_is_visible_to_programs() {
    let (mut nes, program) = boot(
        "
        reset: LDA #$99
               STA $6105
               LDA $6005
               STA $00
        done:  JMP done
        ",
    );
    nes.memory_map_mut()
        .configure_address_mirroring(0x6000, 0x100, 0x1000)
        .unwrap();
    run_until(&mut nes, &program, "done");

    assert_eq!(nes.peek(0x00), 0x99);
    assert_eq!(nes.peek(0x6005), 0x99);
    assert_eq!(nes.peek(0x6105), 0x00);
}

#[test]
fn bad_mirroring_requests_are_rejected() {
    let mut nes = Nes::new();
    let map = nes.memory_map_mut();
    assert!(map.configure_address_mirroring(0x6000, 0, 0x100).is_err());
    assert!(map.configure_address_mirroring(0x6000, 0x300, 0x1000).is_err());
    assert!(map.configure_address_mirroring(0xF000, 0x1000, 0x2000).is_err());
}

#[test]
fn configured_frequency_sets_the_run_budget() {
    let config = ConsoleConfig::from_json_str(r#"{ "cpu_frequency_hz": 1000.0 }"#).unwrap();
    let (mut nes, _) = boot_with(config, "reset: JMP reset");

    let cycles = nes.run(1.0);
    assert!((1000..1003).contains(&cycles), "ran {cycles} cycles");
}

#[test]
fn run_produces_audio_at_the_sample_rate() {
    let (mut nes, _) = boot("reset: JMP reset");
    nes.run(0.1);
    let samples = nes.take_audio_samples();
    assert!((4798..=4802).contains(&samples.len()), "{} samples", samples.len());
    assert!(nes.take_audio_samples().is_empty());
}

#[test]
fn frame_buffer_is_rgba() {
    let (mut nes, _) = boot("reset: JMP reset");
    nes.run_frame();
    assert_eq!(nes.frame_buffer().len(), FRAME_WIDTH * FRAME_HEIGHT * 4);
    assert!(nes.frame_buffer().chunks_exact(4).all(|px| px[3] == 0xFF));
}

#[test]
fn assembler_errors_surface_through_anyhow() {
    let err = assemble("JSR missing\nJMP gone").unwrap_err();
    assert!(matches!(err, AsmError::UnresolvedLabels(ref names) if names.len() == 2));

    let wrapped: anyhow::Error = err.into();
    assert_eq!(wrapped.to_string(), "unresolved labels: gone, missing");
}

#[test]
fn external_irq_line_is_level_triggered() {
    let program = assemble(
        "
        .org $8000
        reset: CLI
        spin:  JMP spin
        irq:   INC $30
               RTI
        nmi:   RTI
        .org $FFFA
        .word nmi, reset, irq
        ",
    )
    .unwrap();
    let mut nes = Nes::new();
    nes.load_program(&program);
    nes.reset();
    nes.step();
    nes.step();

    nes.bus.pins().assert_irq(IrqSource::EXTERNAL);
    assert_eq!(nes.step(), 7);
    assert_eq!(nes.cpu.pc, program.symbol("irq").unwrap());
    nes.bus.pins().cancel_irq(IrqSource::EXTERNAL);

    run_until(&mut nes, &program, "spin");
    assert_eq!(nes.peek(0x30), 1);
    assert_eq!(nes.stats().irqs_serviced, 1);
}

#[test]
fn unusable_configs_are_rejected_before_running() {
    let config = ConsoleConfig {
        cpu_frequency_hz: 0.0,
        ..ConsoleConfig::default()
    };
    let err = Nes::with_config(config).err().unwrap();
    assert!(err.to_string().contains("cpu_frequency_hz"));

    assert!(ConsoleConfig::from_json_str(r#"{ "cpu_frequency_hz": 0.0 }"#).is_err());
}
