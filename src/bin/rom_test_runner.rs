use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use famicore::nes::controller::Buttons;
use famicore::nes::{ConsoleStats, Nes};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use sha1::{Digest, Sha1};

/// Pixel layouts tried against the expected hash, as byte indices into an RGBA pixel.
const PIXEL_LAYOUTS: [(&str, &[usize]); 4] = [
    ("rgba", &[0, 1, 2, 3]),
    ("rgb", &[0, 1, 2]),
    ("argb", &[3, 0, 1, 2]),
    ("bgra", &[2, 1, 0, 3]),
];

/// Test ROMs that report through $6000 write this signature to $6001-$6003.
const RESULT_SIGNATURE: [u8; 3] = [0xDE, 0xB0, 0x61];
const RESULT_RUNNING: u8 = 0x80;

#[derive(Debug, Clone, Default)]
struct SuiteTest {
    filename: String,
    system: String,
    runframes: u32,
    tvsha1: String,
    recorded_input: String,
}

#[derive(Debug, Clone, Serialize)]
struct RunOutcome {
    hashes: Vec<(&'static str, String)>,
    pc: u16,
    ppu_ctrl: u8,
    ppu_mask: u8,
    ppu_status: u8,
    ppu_scanline: u16,
    ppu_cycle: u16,
    ram_f8: u8,
    result_code: Option<u8>,
    stats: ConsoleStats,
}

#[derive(Debug, Serialize)]
struct TestReport {
    filename: String,
    outcome: &'static str,
    matched: Option<&'static str>,
    expected: String,
    run: Option<RunOutcome>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct Config {
    suite: PathBuf,
    rom_root: PathBuf,
    max_tests: usize,
    include_recorded_input: bool,
    include_pal: bool,
    contains: Vec<String>,
    frame_multiplier: u32,
    extra_frames: u32,
    json: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            suite: PathBuf::from("external/nes-test-roms/test_roms.xml"),
            rom_root: PathBuf::from("external/nes-test-roms"),
            max_tests: 80,
            include_recorded_input: false,
            include_pal: false,
            contains: Vec::new(),
            frame_multiplier: 1,
            extra_frames: 0,
            json: None,
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
            "--suite" => cfg.suite = next_value(&mut args, "--suite", "test_roms.xml")?,
            "--rom-root" => cfg.rom_root = next_value(&mut args, "--rom-root", "nes-test-roms")?,
            "--max-tests" => cfg.max_tests = next_value(&mut args, "--max-tests", "120")?,
            "--include-recorded-input" => cfg.include_recorded_input = true,
            "--include-pal" => cfg.include_pal = true,
            "--contains" => {
                let value: String = next_value(&mut args, "--contains", "vbl_nmi_timing")?;
                cfg.contains.push(value.to_lowercase());
            }
            "--frame-multiplier" => {
                cfg.frame_multiplier = next_value(&mut args, "--frame-multiplier", "2")?;
            }
            "--extra-frames" => cfg.extra_frames = next_value(&mut args, "--extra-frames", "120")?,
            "--json" => cfg.json = Some(next_value(&mut args, "--json", "report.json")?),
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
        }
    }

    Ok(cfg)
}

fn print_help() {
    println!(
        "ROM suite runner for famicore\n\n\
Usage:\n\
  cargo run --bin rom_test_runner -- [options]\n\n\
Options:\n\
  --suite <path>                 Path to test_roms.xml\n\
  --rom-root <path>              Root path containing ROM files\n\
  --max-tests <n>                Maximum number of tests to run (default 80)\n\
  --include-recorded-input       Include tests that replay joypad input\n\
  --include-pal                  Include PAL tests\n\
  --contains <substr>            Only run tests whose filename contains this text (repeatable)\n\
  --frame-multiplier <n>         Multiply XML runframes by n (default 1)\n\
  --extra-frames <n>             Add n frames after XML runframes (default 0)\n\
  --json <path>                  Write a JSON report of every test\n\
  -h, --help                     Show this help\n"
    );
}

fn start_test(element: &BytesStart, reader: &Reader<&[u8]>) -> SuiteTest {
    let mut test = SuiteTest::default();
    for attr in element.attributes().flatten() {
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map(|v| v.to_string())
            .unwrap_or_default();
        match attr.key.as_ref() {
            b"filename" => test.filename = value,
            b"system" => test.system = value,
            b"runframes" => test.runframes = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    test
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Hash,
    RecordedInput,
}

fn parse_suite_xml(path: &Path) -> Result<Vec<SuiteTest>> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite XML: {}", path.display()))?;
    parse_suite(&xml)
}

fn parse_suite(xml: &str) -> Result<Vec<SuiteTest>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tests = Vec::new();
    let mut current: Option<SuiteTest> = None;
    let mut field = Field::None;

    loop {
        let text = match reader.read_event() {
            Ok(Event::Start(e)) => {
                match e.name().as_ref() {
                    b"test" => current = Some(start_test(&e, &reader)),
                    b"tvsha1" => field = Field::Hash,
                    b"recordedinput" => field = Field::RecordedInput,
                    _ => {}
                }
                continue;
            }
            Ok(Event::End(e)) => {
                match e.name().as_ref() {
                    b"tvsha1" | b"recordedinput" => field = Field::None,
                    b"test" => tests.extend(current.take()),
                    _ => {}
                }
                continue;
            }
            Ok(Event::Text(e)) => e.decode().map(|v| v.to_string()).unwrap_or_default(),
            Ok(Event::CData(e)) => e.decode().map(|v| v.to_string()).unwrap_or_default(),
            Ok(Event::Eof) => break,
            Err(err) => anyhow::bail!("failed to parse suite XML: {err}"),
            _ => continue,
        };

        if let Some(test) = current.as_mut() {
            match field {
                Field::Hash => test.tvsha1.push_str(text.trim()),
                Field::RecordedInput => test.recorded_input.push_str(text.trim()),
                Field::None => {}
            }
        }
    }

    Ok(tests)
}

fn should_run(test: &SuiteTest, cfg: &Config) -> bool {
    if !cfg.include_pal && test.system.eq_ignore_ascii_case("pal") {
        return false;
    }
    if !cfg.include_recorded_input && !test.recorded_input.is_empty() {
        return false;
    }
    if cfg.contains.is_empty() {
        return true;
    }
    let lower = test.filename.to_lowercase();
    cfg.contains.iter().any(|f| lower.contains(f))
}

/// Recorded input is base64, one byte of port 1 joypad state per frame.
fn decode_recorded_input(text: &str) -> Result<Vec<Buttons>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(compact)
        .context("recorded input is not valid base64")?;
    Ok(bytes.into_iter().map(Buttons::from_bits_truncate).collect())
}

fn hash_frame(frame_rgba: &[u8], layout: &[usize]) -> String {
    let mut hasher = Sha1::new();
    let mut pixel = Vec::with_capacity(4);
    for px in frame_rgba.chunks_exact(4) {
        pixel.clear();
        pixel.extend(layout.iter().map(|&i| px[i]));
        hasher.update(&pixel);
    }
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Status byte of the $6000 result protocol, once the ROM has published one.
fn result_code(nes: &mut Nes) -> Option<u8> {
    let signature = [nes.inspect(0x6001), nes.inspect(0x6002), nes.inspect(0x6003)];
    let status = nes.inspect(0x6000);
    (signature == RESULT_SIGNATURE && status != RESULT_RUNNING).then_some(status)
}

fn run_single(test: &SuiteTest, cfg: &Config) -> Result<RunOutcome> {
    let rom_path = cfg.rom_root.join(&test.filename);
    let mut nes = Nes::new();
    nes.load_rom_from_path(&rom_path)
        .with_context(|| format!("failed to load ROM {}", rom_path.display()))?;
    let input = decode_recorded_input(&test.recorded_input)?;

    let total_frames = test
        .runframes
        .saturating_mul(cfg.frame_multiplier)
        .saturating_add(cfg.extra_frames);
    for frame in 0..total_frames as usize {
        let buttons = input.get(frame).copied().unwrap_or_default();
        nes.set_buttons(0, buttons)?;
        nes.run_frame();
        nes.take_audio_samples();
    }

    let frame = nes.frame_buffer();
    let hashes = PIXEL_LAYOUTS
        .iter()
        .map(|&(name, layout)| (name, hash_frame(frame, layout)))
        .collect();
    let ppu = nes.ppu();
    let (ppu_ctrl, ppu_mask, ppu_status) = (ppu.ctrl(), ppu.mask(), ppu.status());
    let (ppu_scanline, ppu_cycle) = (ppu.scanline(), ppu.cycle());

    Ok(RunOutcome {
        hashes,
        pc: nes.cpu.pc,
        ppu_ctrl,
        ppu_mask,
        ppu_status,
        ppu_scanline,
        ppu_cycle,
        ram_f8: nes.peek(0x00F8),
        result_code: result_code(&mut nes),
        stats: nes.stats().clone(),
    })
}

fn matched_by(test: &SuiteTest, run: &RunOutcome) -> Option<&'static str> {
    if let Some((name, _)) = run.hashes.iter().find(|(_, hash)| *hash == test.tvsha1) {
        return Some(*name);
    }
    if run.result_code == Some(0) {
        return Some("result-code");
    }
    // Blargg VBL/NMI timing ROMs leave their verdict in RAM instead.
    (test.filename.starts_with("vbl_nmi_timing/") && run.ram_f8 == 0x01).then_some("ram-f8")
}

fn report(test: &SuiteTest, label: &str, result: Result<RunOutcome>) -> TestReport {
    let mut entry = TestReport {
        filename: test.filename.clone(),
        outcome: "skip",
        matched: None,
        expected: test.tvsha1.clone(),
        run: None,
        error: None,
    };

    match result {
        Ok(run) => {
            entry.matched = matched_by(test, &run);
            if let Some(how) = entry.matched {
                entry.outcome = "pass";
                println!("PASS {label} [{how}]");
            } else {
                entry.outcome = "fail";
                println!("FAIL {label}\n  expected: {}", test.tvsha1);
                for (name, hash) in &run.hashes {
                    println!("  got {name:<4}: {hash}");
                }
                println!(
                    "  pc=${:04X} result={:?} ppu ctrl=${:02X} mask=${:02X} status=${:02X} sl={} cy={}",
                    run.pc,
                    run.result_code,
                    run.ppu_ctrl,
                    run.ppu_mask,
                    run.ppu_status,
                    run.ppu_scanline,
                    run.ppu_cycle
                );
            }
            entry.run = Some(run);
        }
        Err(err) => {
            println!("SKIP {label} -> {err:#}");
            entry.error = Some(format!("{err:#}"));
        }
    }
    entry
}

fn main() -> Result<()> {
    let cfg = parse_args()?;

    let start = Instant::now();
    let selected: Vec<SuiteTest> = parse_suite_xml(&cfg.suite)?
        .into_iter()
        .filter(|t| should_run(t, &cfg))
        .take(cfg.max_tests)
        .collect();

    println!(
        "Running {} test(s) from {}",
        selected.len(),
        cfg.suite.display()
    );

    let reports: Vec<TestReport> = selected
        .iter()
        .enumerate()
        .map(|(idx, test)| {
            let label = format!("[{}/{}] {}", idx + 1, selected.len(), test.filename);
            report(test, &label, run_single(test, &cfg))
        })
        .collect();

    let count = |outcome: &str| reports.iter().filter(|r| r.outcome == outcome).count();
    println!();
    println!("Summary:");
    println!("- Passed: {}", count("pass"));
    println!("- Failed: {}", count("fail"));
    println!("- Skipped: {}", count("skip"));
    println!("- Runtime: {:.2}s", start.elapsed().as_secs_f32());

    if let Some(path) = &cfg.json {
        let json = serde_json::to_string_pretty(&reports)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
