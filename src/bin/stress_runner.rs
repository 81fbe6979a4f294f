use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use famicore::config::ConsoleConfig;
use famicore::nes::Nes;
use famicore::nes::controller::Buttons;

const FRAME_SECONDS: f64 = 1.0 / 60.0;

#[derive(Debug, Clone)]
struct Config {
    rom: PathBuf,
    console: Option<PathBuf>,
    iterations: u32,
    frames_per_iteration: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rom: PathBuf::from("roms/stress.nes"),
            console: None,
            iterations: 20,
            frames_per_iteration: 1800,
        }
    }
}

fn next_value<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
    example: &str,
) -> Result<T> {
    let value = args
        .next()
        .with_context(|| format!("{flag} requires a value, e.g. {flag} {example}"))?;
    value
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid {flag} value: {value}"))
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rom" => cfg.rom = next_value(&mut args, "--rom", "roms/stress.nes")?,
            "--config" => cfg.console = Some(next_value(&mut args, "--config", "console.json")?),
            "--iterations" => cfg.iterations = next_value(&mut args, "--iterations", "20")?,
            "--frames" => cfg.frames_per_iteration = next_value(&mut args, "--frames", "1800")?,
            "--help" | "-h" => {
                println!(
                    "stress_runner\n\n\
Usage:\n\
  cargo run --release --bin stress_runner -- [options]\n\n\
Options:\n\
  --rom <path>          ROM path (default roms/stress.nes)\n\
  --config <path>       Console configuration JSON\n\
  --iterations <n>      Number of independent runs (default 20)\n\
  --frames <n>          1/60 s slices per run (default 1800)\n\
  -h, --help            Show this help\n"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(cfg)
}

/// Xorshift32 step mapped onto the joypad, with opposite directions never held together.
fn next_buttons(seed: &mut u32) -> Buttons {
    let mut x = *seed;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *seed = x;

    let mut buttons = Buttons::from_bits_truncate(x as u8);
    if buttons.contains(Buttons::UP | Buttons::DOWN) {
        buttons.remove(Buttons::DOWN);
    }
    if buttons.contains(Buttons::LEFT | Buttons::RIGHT) {
        buttons.remove(Buttons::RIGHT);
    }
    buttons
}

fn run_once(cfg: &Config, console: &ConsoleConfig, seed: &mut u32) -> Result<Nes> {
    let mut nes = Nes::with_config(console.clone())?;
    nes.load_rom_from_path(&cfg.rom)
        .with_context(|| format!("failed to load ROM {}", cfg.rom.display()))?;

    for slice in 0..cfg.frames_per_iteration {
        // New input every 15 slices, released in between.
        let buttons = if slice % 15 == 0 {
            next_buttons(seed)
        } else {
            Buttons::empty()
        };
        nes.set_buttons(0, buttons)?;
        nes.run(FRAME_SECONDS);
        nes.take_audio_samples();
    }

    Ok(nes)
}

fn main() -> Result<()> {
    let cfg = parse_args()?;
    let console = match &cfg.console {
        Some(path) => ConsoleConfig::from_path(path)?,
        None => ConsoleConfig::default(),
    };

    let start = Instant::now();
    let mut seed = 0xC47D0E8Au32;
    let mut total_cycles = 0u64;
    let mut failures = 0u64;

    for i in 0..cfg.iterations {
        match run_once(&cfg, &console, &mut seed) {
            Ok(nes) => {
                let stats = nes.stats();
                total_cycles = total_cycles.wrapping_add(stats.cpu_cycles);
                println!(
                    "iter={:03} pc=${:04X} {}",
                    i + 1,
                    nes.cpu.pc,
                    serde_json::to_string(stats)?
                );
            }
            Err(err) => {
                failures += 1;
                eprintln!("iter={:03} ERROR: {err:#}", i + 1);
            }
        }
    }

    println!();
    println!("Stress Summary");
    println!("- iterations: {}", cfg.iterations);
    println!("- slices/iter: {}", cfg.frames_per_iteration);
    println!("- load/runtime failures: {failures}");
    println!("- total cycles: {total_cycles}");
    println!("- elapsed: {:.2}s", start.elapsed().as_secs_f32());

    if failures > 0 {
        anyhow::bail!("stress runner encountered {failures} failed iteration(s)");
    }
    Ok(())
}
