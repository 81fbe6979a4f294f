use std::f32::consts::PI;
use std::sync::LazyLock;

const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

const TRIANGLE_SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15,
];

const NOISE_PERIOD_TABLE: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

const DMC_RATE_TABLE: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

// Frame sequencer steps, in CPU cycles since the last reset.
const STEP_QUARTER_1: u32 = 7_457;
const STEP_HALF_1: u32 = 14_913;
const STEP_QUARTER_3: u32 = 22_371;
const STEP_4_LAST: u32 = 29_829;
const STEP_4_WRAP: u32 = 29_830;
const STEP_5_LAST: u32 = 37_281;
const STEP_5_WRAP: u32 = 37_282;

/// `pulse_out = 95.52 / (8128 / (p1 + p2) + 100)`
static PULSE_MIX: LazyLock<[f32; 31]> = LazyLock::new(|| {
    let mut table = [0.0; 31];
    for (n, slot) in table.iter_mut().enumerate().skip(1) {
        *slot = 95.52 / (8128.0 / n as f32 + 100.0);
    }
    table
});

/// `tnd_out = 163.67 / (24329 / (3t + 2n + d) + 100)`
static TND_MIX: LazyLock<[f32; 203]> = LazyLock::new(|| {
    let mut table = [0.0; 203];
    for (n, slot) in table.iter_mut().enumerate().skip(1) {
        *slot = 163.67 / (24329.0 / n as f32 + 100.0);
    }
    table
});

pub fn mix(pulse1: u8, pulse2: u8, triangle: u8, noise: u8, dmc: u8) -> f32 {
    let pulse = PULSE_MIX[(pulse1 + pulse2) as usize];
    let tnd = TND_MIX[3 * triangle as usize + 2 * noise as usize + dmc as usize];
    pulse + tnd
}

pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,

    frame_cycle: u32,
    five_step: bool,
    frame_irq_inhibit: bool,
    frame_irq: bool,
    pending_frame_write: Option<(u8, u8)>,

    cycle: u64,
    cpu_frequency_hz: f64,
    sample_rate: u32,
    sample_phase: f64,
    samples: Vec<f32>,
    filter: OutputFilter,
}

impl Apu {
    pub fn new(sample_rate: u32, cpu_frequency_hz: f64) -> Self {
        let sample_rate = sample_rate.max(8_000);
        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            triangle: Triangle::default(),
            noise: Noise::default(),
            dmc: Dmc::default(),
            frame_cycle: 0,
            five_step: false,
            frame_irq_inhibit: false,
            frame_irq: false,
            pending_frame_write: None,
            cycle: 0,
            cpu_frequency_hz,
            sample_rate,
            sample_phase: 0.0,
            samples: Vec::with_capacity(2048),
            filter: OutputFilter::new(sample_rate),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.sample_rate, self.cpu_frequency_hz);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn write_register(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000..=0x4003 => self.pulse1.write(addr & 3, value),
            0x4004..=0x4007 => self.pulse2.write(addr & 3, value),
            0x4008 => self.triangle.write_linear(value),
            0x400A => self.triangle.write_timer_low(value),
            0x400B => self.triangle.write_timer_high(value),
            0x400C => self.noise.write_control(value),
            0x400E => self.noise.write_period(value),
            0x400F => self.noise.write_length(value),
            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.output_level = value & 0x7F,
            0x4012 => self.dmc.sample_addr = value,
            0x4013 => self.dmc.sample_length = value,
            0x4015 => self.write_control(value),
            0x4017 => self.write_frame_counter(value),
            _ => {}
        }
    }

    /// $4015 read. Acknowledges the frame IRQ.
    pub fn read_status(&mut self) -> u8 {
        let status = self.peek_status();
        self.frame_irq = false;
        status
    }

    pub fn peek_status(&self) -> u8 {
        let mut status = 0;
        if self.pulse1.length.active() {
            status |= 0x01;
        }
        if self.pulse2.length.active() {
            status |= 0x02;
        }
        if self.triangle.length.active() {
            status |= 0x04;
        }
        if self.noise.length.active() {
            status |= 0x08;
        }
        if self.dmc.bytes_remaining > 0 {
            status |= 0x10;
        }
        if self.frame_irq {
            status |= 0x40;
        }
        if self.dmc.irq {
            status |= 0x80;
        }
        status
    }

    pub fn frame_irq(&self) -> bool {
        self.frame_irq
    }

    pub fn dmc_irq(&self) -> bool {
        self.dmc.irq
    }

    /// Advances one CPU cycle.
    pub fn step(&mut self) {
        self.cycle = self.cycle.wrapping_add(1);

        if let Some((value, delay)) = self.pending_frame_write {
            if delay <= 1 {
                self.pending_frame_write = None;
                self.apply_frame_counter(value);
            } else {
                self.pending_frame_write = Some((value, delay - 1));
            }
        }

        if self.cycle & 1 == 0 {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
        }
        self.triangle.clock_timer();
        self.noise.clock_timer();
        self.dmc.clock_timer();

        self.step_frame_counter();

        self.sample_phase += self.sample_rate as f64;
        while self.sample_phase >= self.cpu_frequency_hz {
            self.sample_phase -= self.cpu_frequency_hz;
            let sample = mix(
                self.pulse1.output(),
                self.pulse2.output(),
                self.triangle.output(),
                self.noise.output(),
                self.dmc.output_level,
            );
            self.samples.push(self.filter.apply(sample));
        }
    }

    /// Address the DMC wants read, if its sample buffer is empty and bytes remain.
    pub fn dmc_fetch_request(&self) -> Option<u16> {
        self.dmc.wants_fetch().then_some(self.dmc.current_addr)
    }

    pub fn complete_dmc_fetch(&mut self, value: u8) {
        self.dmc.load_sample(value);
    }

    pub fn take_samples(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    fn write_control(&mut self, value: u8) {
        self.dmc.irq = false;
        self.pulse1.length.set_enabled(value & 0x01 != 0);
        self.pulse2.length.set_enabled(value & 0x02 != 0);
        self.triangle.length.set_enabled(value & 0x04 != 0);
        self.noise.length.set_enabled(value & 0x08 != 0);

        if value & 0x10 == 0 {
            self.dmc.bytes_remaining = 0;
        } else if self.dmc.bytes_remaining == 0 {
            self.dmc.restart();
        }
    }

    fn write_frame_counter(&mut self, value: u8) {
        if value & 0x40 != 0 {
            self.frame_irq = false;
        }
        // The sequencer resets 3 or 4 cycles later depending on write parity.
        let delay = if self.cycle & 1 == 0 { 3 } else { 4 };
        self.pending_frame_write = Some((value, delay));
    }

    fn apply_frame_counter(&mut self, value: u8) {
        self.five_step = value & 0x80 != 0;
        self.frame_irq_inhibit = value & 0x40 != 0;
        if self.frame_irq_inhibit {
            self.frame_irq = false;
        }
        self.frame_cycle = 0;
        if self.five_step {
            self.quarter_frame();
            self.half_frame();
        }
    }

    fn step_frame_counter(&mut self) {
        self.frame_cycle += 1;
        match (self.five_step, self.frame_cycle) {
            (_, STEP_QUARTER_1 | STEP_QUARTER_3) => self.quarter_frame(),
            (_, STEP_HALF_1) | (true, STEP_5_LAST) => {
                self.quarter_frame();
                self.half_frame();
            }
            (false, STEP_4_LAST) => {
                self.quarter_frame();
                self.half_frame();
                self.raise_frame_irq();
            }
            (false, STEP_4_WRAP) => {
                self.raise_frame_irq();
                self.frame_cycle = 0;
            }
            (true, STEP_5_WRAP) => self.frame_cycle = 0,
            _ => {}
        }
    }

    fn raise_frame_irq(&mut self) {
        if !self.frame_irq_inhibit {
            self.frame_irq = true;
        }
    }

    fn quarter_frame(&mut self) {
        self.pulse1.envelope.clock();
        self.pulse2.envelope.clock();
        self.triangle.clock_linear_counter();
        self.noise.envelope.clock();
    }

    fn half_frame(&mut self) {
        self.pulse1.length.clock();
        self.pulse1.clock_sweep();
        self.pulse2.length.clock();
        self.pulse2.clock_sweep();
        self.triangle.length.clock();
        self.noise.length.clock();
    }
}

#[derive(Default, Clone, Copy)]
struct LengthCounter {
    enabled: bool,
    halt: bool,
    value: u8,
}

impl LengthCounter {
    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value = 0;
        }
    }

    fn load(&mut self, index: u8) {
        if self.enabled {
            self.value = LENGTH_TABLE[(index >> 3) as usize];
        }
    }

    fn clock(&mut self) {
        if !self.halt && self.value > 0 {
            self.value -= 1;
        }
    }

    fn active(&self) -> bool {
        self.value > 0
    }
}

#[derive(Default, Clone, Copy)]
struct Envelope {
    start: bool,
    looping: bool,
    constant: bool,
    period: u8,
    divider: u8,
    decay: u8,
}

impl Envelope {
    fn write(&mut self, value: u8) {
        self.looping = value & 0x20 != 0;
        self.constant = value & 0x10 != 0;
        self.period = value & 0x0F;
    }

    fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.period;
        } else if self.divider == 0 {
            self.divider = self.period;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        } else {
            self.divider -= 1;
        }
    }

    fn volume(&self) -> u8 {
        if self.constant { self.period } else { self.decay }
    }
}

#[derive(Clone, Copy)]
struct Pulse {
    ones_complement: bool,
    duty: u8,
    duty_step: u8,
    timer_period: u16,
    timer: u16,
    length: LengthCounter,
    envelope: Envelope,
    sweep_enabled: bool,
    sweep_period: u8,
    sweep_negate: bool,
    sweep_shift: u8,
    sweep_reload: bool,
    sweep_divider: u8,
}

impl Pulse {
    fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            duty: 0,
            duty_step: 0,
            timer_period: 0,
            timer: 0,
            length: LengthCounter::default(),
            envelope: Envelope::default(),
            sweep_enabled: false,
            sweep_period: 1,
            sweep_negate: false,
            sweep_shift: 0,
            sweep_reload: false,
            sweep_divider: 0,
        }
    }

    fn write(&mut self, register: u16, value: u8) {
        match register {
            0 => {
                self.duty = value >> 6;
                self.length.halt = value & 0x20 != 0;
                self.envelope.write(value);
            }
            1 => {
                self.sweep_enabled = value & 0x80 != 0;
                self.sweep_period = ((value >> 4) & 0x07) + 1;
                self.sweep_negate = value & 0x08 != 0;
                self.sweep_shift = value & 0x07;
                self.sweep_reload = true;
            }
            2 => self.timer_period = (self.timer_period & 0x0700) | value as u16,
            _ => {
                self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
                self.length.load(value);
                self.duty_step = 0;
                self.envelope.start = true;
            }
        }
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.duty_step = (self.duty_step + 1) & 0x07;
        } else {
            self.timer -= 1;
        }
    }

    fn sweep_target(&self) -> u16 {
        let change = self.timer_period >> self.sweep_shift;
        if self.sweep_negate {
            // Pulse 1 negates with one's complement.
            let extra = u16::from(self.ones_complement);
            self.timer_period.saturating_sub(change + extra)
        } else {
            self.timer_period + change
        }
    }

    fn clock_sweep(&mut self) {
        let target = self.sweep_target();
        if self.sweep_divider == 0 && self.sweep_enabled && self.sweep_shift > 0 && !self.muted(target) {
            self.timer_period = target;
        }
        if self.sweep_divider == 0 || self.sweep_reload {
            self.sweep_divider = self.sweep_period;
            self.sweep_reload = false;
        } else {
            self.sweep_divider -= 1;
        }
    }

    fn muted(&self, target: u16) -> bool {
        self.timer_period < 8 || target > 0x07FF
    }

    fn output(&self) -> u8 {
        if !self.length.active()
            || DUTY_TABLE[self.duty as usize][self.duty_step as usize] == 0
            || self.muted(self.sweep_target())
        {
            return 0;
        }
        self.envelope.volume()
    }
}

#[derive(Default, Clone, Copy)]
struct Triangle {
    length: LengthCounter,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    timer_period: u16,
    timer: u16,
    step: u8,
}

impl Triangle {
    fn write_linear(&mut self, value: u8) {
        self.length.halt = value & 0x80 != 0;
        self.linear_reload_value = value & 0x7F;
    }

    fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x0700) | value as u16;
    }

    fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        self.length.load(value);
        self.linear_reload = true;
    }

    fn clock_linear_counter(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        // The control flag doubles as the length halt flag.
        if !self.length.halt {
            self.linear_reload = false;
        }
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length.active() && self.linear_counter > 0 {
                self.step = (self.step + 1) & 0x1F;
            }
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        // Ultrasonic periods are silenced instead of aliasing.
        if self.timer_period < 2 {
            return 0;
        }
        TRIANGLE_SEQUENCE[self.step as usize]
    }
}

#[derive(Clone, Copy)]
struct Noise {
    length: LengthCounter,
    envelope: Envelope,
    short_mode: bool,
    timer_period: u16,
    timer: u16,
    shift: u16,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            length: LengthCounter::default(),
            envelope: Envelope::default(),
            short_mode: false,
            timer_period: NOISE_PERIOD_TABLE[0],
            timer: 0,
            shift: 1,
        }
    }
}

impl Noise {
    fn write_control(&mut self, value: u8) {
        self.length.halt = value & 0x20 != 0;
        self.envelope.write(value);
    }

    fn write_period(&mut self, value: u8) {
        self.short_mode = value & 0x80 != 0;
        self.timer_period = NOISE_PERIOD_TABLE[(value & 0x0F) as usize];
    }

    fn write_length(&mut self, value: u8) {
        self.length.load(value);
        self.envelope.start = true;
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            let tap = if self.short_mode { 6 } else { 1 };
            let feedback = (self.shift ^ (self.shift >> tap)) & 1;
            self.shift = (self.shift >> 1) | (feedback << 14);
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.length.active() || self.shift & 1 != 0 {
            return 0;
        }
        self.envelope.volume()
    }
}

#[derive(Clone, Copy)]
struct Dmc {
    irq_enabled: bool,
    irq: bool,
    looping: bool,
    timer_period: u16,
    timer: u16,
    output_level: u8,
    sample_addr: u8,
    sample_length: u8,
    current_addr: u16,
    bytes_remaining: u16,
    buffer: Option<u8>,
    shift: u8,
    bits_remaining: u8,
    silent: bool,
}

impl Default for Dmc {
    fn default() -> Self {
        Self {
            irq_enabled: false,
            irq: false,
            looping: false,
            timer_period: DMC_RATE_TABLE[0],
            timer: DMC_RATE_TABLE[0],
            output_level: 0,
            sample_addr: 0,
            sample_length: 0,
            current_addr: 0xC000,
            bytes_remaining: 0,
            buffer: None,
            shift: 0,
            bits_remaining: 8,
            silent: true,
        }
    }
}

impl Dmc {
    fn write_control(&mut self, value: u8) {
        self.irq_enabled = value & 0x80 != 0;
        if !self.irq_enabled {
            self.irq = false;
        }
        self.looping = value & 0x40 != 0;
        self.timer_period = DMC_RATE_TABLE[(value & 0x0F) as usize];
    }

    fn restart(&mut self) {
        self.current_addr = 0xC000 | ((self.sample_addr as u16) << 6);
        self.bytes_remaining = ((self.sample_length as u16) << 4) | 1;
    }

    fn wants_fetch(&self) -> bool {
        self.buffer.is_none() && self.bytes_remaining > 0
    }

    fn load_sample(&mut self, value: u8) {
        self.buffer = Some(value);
        self.current_addr = self.current_addr.checked_add(1).unwrap_or(0x8000);
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);
        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enabled {
                self.irq = true;
            }
        }
    }

    fn clock_timer(&mut self) {
        if self.timer > 1 {
            self.timer -= 1;
            return;
        }
        self.timer = self.timer_period;

        if !self.silent {
            if self.shift & 1 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;

        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.buffer.take() {
                Some(sample) => {
                    self.shift = sample;
                    self.silent = false;
                }
                None => self.silent = true,
            }
        }
    }
}

/// 90 Hz high-pass followed by a 14 kHz low-pass, as on the console's output stage.
struct OutputFilter {
    high_alpha: f32,
    low_alpha: f32,
    prev_in: f32,
    prev_high: f32,
    prev_low: f32,
}

impl OutputFilter {
    fn new(sample_rate: u32) -> Self {
        let dt = 1.0 / sample_rate as f32;
        let rc = |cutoff: f32| 1.0 / (2.0 * PI * cutoff);
        Self {
            high_alpha: rc(90.0) / (rc(90.0) + dt),
            low_alpha: dt / (rc(14_000.0) + dt),
            prev_in: 0.0,
            prev_high: 0.0,
            prev_low: 0.0,
        }
    }

    fn apply(&mut self, sample: f32) -> f32 {
        let high = self.high_alpha * (self.prev_high + sample - self.prev_in);
        self.prev_in = sample;
        self.prev_high = high;
        self.prev_low += self.low_alpha * (high - self.prev_low);
        self.prev_low.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NTSC_CPU_FREQUENCY_HZ;

    fn apu() -> Apu {
        Apu::new(48_000, NTSC_CPU_FREQUENCY_HZ)
    }

    #[test]
    fn mixer_is_silent_at_zero_and_monotonic() {
        assert_eq!(mix(0, 0, 0, 0, 0), 0.0);
        assert!(mix(15, 0, 0, 0, 0) < mix(15, 15, 0, 0, 0));
        assert!(mix(0, 0, 15, 15, 127) < 1.0);
        assert!((PULSE_MIX[30] - 0.2587).abs() < 0.001);
    }

    #[test]
    fn length_counters_load_only_when_enabled() {
        let mut apu = apu();
        apu.write_register(0x4003, 0x08);
        assert_eq!(apu.peek_status() & 0x01, 0);

        apu.write_register(0x4015, 0x0F);
        apu.write_register(0x4003, 0x08);
        apu.write_register(0x400B, 0x08);
        apu.write_register(0x400F, 0x08);
        assert_eq!(apu.peek_status() & 0x0F, 0x0D);

        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.peek_status() & 0x0F, 0);
    }

    #[test]
    fn four_step_sequence_raises_frame_irq() {
        let mut apu = apu();
        for _ in 0..STEP_4_LAST - 1 {
            apu.step();
        }
        assert!(!apu.frame_irq());
        apu.step();
        assert!(apu.frame_irq());

        assert_ne!(apu.read_status() & 0x40, 0);
        assert!(!apu.frame_irq());
    }

    #[test]
    fn irq_inhibit_and_five_step_mode_suppress_frame_irq() {
        for value in [0x40, 0x80] {
            let mut apu = apu();
            apu.write_register(0x4017, value);
            for _ in 0..STEP_5_WRAP * 2 {
                apu.step();
            }
            assert!(!apu.frame_irq());
        }
    }

    #[test]
    fn length_counter_expires_on_half_frames() {
        let mut apu = apu();
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, 0x00);
        // Index 3 loads a length of 2.
        apu.write_register(0x4003, 3 << 3);
        for _ in 0..STEP_4_LAST {
            apu.step();
        }
        assert_eq!(apu.peek_status() & 0x01, 0);
    }

    #[test]
    fn dmc_requests_fetches_and_raises_irq_at_end() {
        let mut apu = apu();
        apu.write_register(0x4010, 0x8F);
        apu.write_register(0x4012, 0x01);
        apu.write_register(0x4013, 0x00);
        apu.write_register(0x4015, 0x10);

        assert_eq!(apu.dmc_fetch_request(), Some(0xC040));
        assert_ne!(apu.peek_status() & 0x10, 0);
        apu.complete_dmc_fetch(0xAA);
        assert_eq!(apu.dmc_fetch_request(), None);
        assert!(apu.dmc_irq());
        assert_eq!(apu.peek_status() & 0x90, 0x80);

        apu.write_register(0x4015, 0x00);
        assert!(!apu.dmc_irq());
    }

    #[test]
    fn dmc_address_wraps_to_8000() {
        let mut apu = apu();
        apu.write_register(0x4010, 0x0F);
        apu.write_register(0x4012, 0xFF);
        apu.write_register(0x4013, 0x04);
        apu.write_register(0x4015, 0x10);
        let mut fetches = Vec::new();
        for _ in 0..40_000 {
            apu.step();
            if let Some(addr) = apu.dmc_fetch_request() {
                fetches.push(addr);
                apu.complete_dmc_fetch(0);
            }
        }
        assert_eq!(fetches.len(), 65);
        assert_eq!(fetches[0], 0xFFC0);
        assert_eq!(fetches[63], 0xFFFF);
        assert_eq!(fetches[64], 0x8000);
    }

    #[test]
    fn produces_samples_at_the_configured_rate() {
        let mut apu = apu();
        let cycles = (NTSC_CPU_FREQUENCY_HZ / 10.0) as u32;
        for _ in 0..cycles {
            apu.step();
        }
        let samples = apu.take_samples();
        assert!((samples.len() as i64 - 4_800).abs() <= 1);
        assert_eq!(apu.pending_samples(), 0);
    }
}
