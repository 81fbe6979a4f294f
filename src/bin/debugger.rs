use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use famicore::asm::assemble;
use famicore::nes::Nes;
use famicore::nes::disasm::disassemble_range;
use famicore::nes::mapper::Mapper;

const HELP: &str = "\
Commands:
  step, s [n]        - Execute n instructions (default 1)
  run, r [frames]    - Run whole frames (default 1)
  regs               - Show CPU registers
  mem <addr> [len]   - Show memory as the CPU sees it (hex)
  dis [addr] [n]     - Disassemble n instructions (default: 8 at PC)
  asm <file>         - Assemble a source file into memory and jump to its origin
  ppu                - Show PPU state
  apu                - Show APU status
  mapper             - Show mapper state
  stats              - Show console counters
  reset              - Reset the console
  quit, q            - Exit debugger";

fn parse_hex(text: &str) -> Result<u16> {
    let digits = text.trim_start_matches('$').trim_start_matches("0x");
    u16::from_str_radix(digits, 16).with_context(|| format!("invalid address: {text}"))
}

fn parse_count(text: Option<&&str>, default: usize) -> Result<usize> {
    match text {
        Some(text) => text
            .parse::<usize>()
            .with_context(|| format!("invalid count: {text}")),
        None => Ok(default),
    }
}

fn print_regs(nes: &Nes) {
    let cpu = &nes.cpu;
    let p = cpu.status();
    println!("A: ${:02X}  X: ${:02X}  Y: ${:02X}", cpu.a, cpu.x, cpu.y);
    println!("P: {:08b} (NV-BDIZC)", p);
    println!("SP: ${:02X}  PC: ${:04X}  cycles: {}", cpu.sp, cpu.pc, cpu.cycles);
}

fn print_memory(nes: &mut Nes, addr: u16, len: usize) {
    for row in (0..len).step_by(16) {
        let start = addr.wrapping_add(row as u16);
        let mut line = format!("{start:04X}: ");
        for i in 0..(len - row).min(16) {
            line.push_str(&format!("{:02X} ", nes.inspect(start.wrapping_add(i as u16))));
        }
        println!("{}", line.trim_end());
    }
}

fn execute(nes: &mut Nes, parts: &[&str]) -> Result<bool> {
    match parts[0] {
        "help" | "h" => println!("{HELP}"),
        "step" | "s" => {
            let count = parse_count(parts.get(1), 1)?;
            for _ in 0..count {
                nes.step();
            }
            nes.take_audio_samples();
            let pc = nes.cpu.pc;
            if let Some(line) = disassemble_range(pc, 1, |addr| nes.inspect(addr)).first() {
                println!("{:04X}  {}", line.addr, line.text);
            }
        }
        "run" | "r" => {
            let frames = parse_count(parts.get(1), 1)?;
            let mut cycles = 0u64;
            for _ in 0..frames {
                cycles += nes.run_frame();
                nes.take_audio_samples();
            }
            println!("ran {frames} frame(s), {cycles} CPU cycles, PC=${:04X}", nes.cpu.pc);
        }
        "regs" => print_regs(nes),
        "mem" => {
            let Some(addr) = parts.get(1) else {
                println!("Usage: mem <addr> [len]");
                return Ok(true);
            };
            let addr = parse_hex(addr)?;
            let len = parse_count(parts.get(2), 16)?;
            print_memory(nes, addr, len);
        }
        "dis" => {
            let addr = match parts.get(1) {
                Some(text) => parse_hex(text)?,
                None => nes.cpu.pc,
            };
            let count = parse_count(parts.get(2), 8)?;
            for line in disassemble_range(addr, count, |addr| nes.inspect(addr)) {
                let bytes: Vec<String> = line.bytes.iter().map(|b| format!("{b:02X}")).collect();
                println!("{:04X}  {:<9} {}", line.addr, bytes.join(" "), line.text);
            }
        }
        "asm" => {
            let Some(path) = parts.get(1) else {
                println!("Usage: asm <file>");
                return Ok(true);
            };
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {path}"))?;
            let program = assemble(&source)?;
            nes.load_program(&program);
            println!(
                "assembled {} byte(s) in {} segment(s), PC=${:04X}",
                program.len(),
                program.segments.len(),
                program.origin
            );
        }
        "ppu" => {
            let ppu = nes.ppu();
            let (v, t, fine_x, w) = ppu.scroll_registers();
            println!("PPU State:");
            println!("  Scanline: {}, Cycle: {}", ppu.scanline(), ppu.cycle());
            println!("  $2000 (ctrl):   {:08b}", ppu.ctrl());
            println!("  $2001 (mask):   {:08b}", ppu.mask());
            println!("  $2002 (status): {:08b}", ppu.status());
            println!("  v=${v:04X} t=${t:04X} x={fine_x} w={w}");
            println!("  mirroring: {:?}", ppu.mirroring());
        }
        "apu" => {
            let apu = nes.apu();
            println!("APU status: {:08b}", apu.peek_status());
            println!("  frame IRQ: {}  DMC IRQ: {}", apu.frame_irq(), apu.dmc_irq());
            println!("  buffered samples: {}", apu.pending_samples());
        }
        "mapper" => println!("Mapper: {}", nes.mapper().describe()),
        "stats" => println!("{}", serde_json::to_string_pretty(nes.stats())?),
        "reset" => {
            nes.reset();
            print_regs(nes);
        }
        "quit" | "q" => return Ok(false),
        other => println!("Unknown command: {other}. Type 'help' for available commands."),
    }
    Ok(true)
}

fn main() -> Result<()> {
    println!("famicore debugger");
    println!("=================");

    let mut nes = Nes::new();
    match std::env::args().nth(1) {
        Some(arg) if arg == "--help" || arg == "-h" => {
            println!("Usage: nes_debug [rom.nes]\n");
            println!("{HELP}");
            return Ok(());
        }
        Some(rom_path) => {
            nes.load_rom_from_path(Path::new(&rom_path))?;
            println!("Loaded {rom_path}: {}", nes.mapper_name());
        }
        None => println!("No ROM given; $4020-$FFFF is plain RAM for assembled programs."),
    }

    print_regs(&nes);
    println!("Type 'help' for commands");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(input) = lines.next() else {
            break;
        };
        let input = input?;
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match execute(&mut nes, &parts) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => println!("error: {err:#}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_commands_drain_audio() {
        let mut nes = Nes::new();
        assert!(execute(&mut nes, &["run", "2"]).unwrap());
        assert_eq!(nes.apu().pending_samples(), 0);

        assert!(execute(&mut nes, &["step", "500"]).unwrap());
        assert_eq!(nes.apu().pending_samples(), 0);
        assert!(nes.stats().cpu_cycles > 0);
    }
}
