mod dmc;
mod noise;
mod pulse;
mod triangle;

use dmc::DmcChannel;
use noise::NoiseChannel;
use pulse::PulseChannel;
use triangle::TriangleChannel;

pub(crate) const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

#[derive(Default, Clone, Copy)]
struct FrameEvent {
    quarter: bool,
    half: bool,
}

#[derive(Clone, Copy)]
struct FrameStep {
    cycle: u32,
    quarter: bool,
    half: bool,
    irq: bool,
}

const FOUR_STEP_SEQUENCE: [FrameStep; 4] = [
    FrameStep { cycle: 3728, quarter: true, half: false, irq: false },
    FrameStep { cycle: 7456, quarter: true, half: true, irq: false },
    FrameStep { cycle: 11185, quarter: true, half: false, irq: false },
    FrameStep { cycle: 14914, quarter: true, half: true, irq: true },
];

const FIVE_STEP_SEQUENCE: [FrameStep; 4] = [
    FrameStep { cycle: 3728, quarter: true, half: false, irq: false },
    FrameStep { cycle: 7456, quarter: true, half: true, irq: false },
    FrameStep { cycle: 11185, quarter: true, half: false, irq: false },
    FrameStep { cycle: 18640, quarter: true, half: true, irq: false },
];

/// Divides the CPU clock into the quarter- and half-frame pulses that
/// drive envelopes, sweeps and length counters.
struct FrameCounter {
    five_step: bool,
    cycle: u32,
    irq_inhibit: bool,
    irq_flag: bool,
}

impl FrameCounter {
    fn new() -> Self {
        FrameCounter {
            five_step: false,
            cycle: 0,
            irq_inhibit: false,
            irq_flag: false,
        }
    }

    fn clock(&mut self) -> FrameEvent {
        self.cycle += 1;
        let mut event = FrameEvent::default();

        let sequence = if self.five_step {
            &FIVE_STEP_SEQUENCE
        } else {
            &FOUR_STEP_SEQUENCE
        };

        for step in sequence {
            if self.cycle == step.cycle {
                event.quarter |= step.quarter;
                event.half |= step.half;
                if step.irq && !self.irq_inhibit {
                    self.irq_flag = true;
                }
            }
        }

        // The sequence restarts at its terminal step.
        if self.cycle >= sequence[sequence.len() - 1].cycle {
            self.cycle = 0;
        }

        event
    }

    /// $4017 write; a 5-step select clocks everything immediately.
    fn set_control(&mut self, five_step: bool, irq_inhibit: bool) -> FrameEvent {
        self.five_step = five_step;
        self.irq_inhibit = irq_inhibit;
        self.irq_flag = false;
        self.cycle = 0;

        FrameEvent {
            quarter: five_step,
            half: five_step,
        }
    }
}

/// The 2A03 audio unit: two pulses, triangle, noise and DMC under a
/// frame sequencer, mixed non-linearly on demand.
pub struct Apu {
    pulse1: PulseChannel,
    pulse2: PulseChannel,
    triangle: TriangleChannel,
    noise: NoiseChannel,
    dmc: DmcChannel,
    frame_counter: FrameCounter,
    cycle_parity: bool,
}

impl Apu {
    pub fn new() -> Self {
        Apu {
            pulse1: PulseChannel::new(1),
            pulse2: PulseChannel::new(0),
            triangle: TriangleChannel::new(),
            noise: NoiseChannel::new(),
            dmc: DmcChannel::new(),
            frame_counter: FrameCounter::new(),
            cycle_parity: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Apu::new();
    }

    /// Advance one CPU cycle. Returns the address of a DMC sample byte
    /// the bus should read and hand back via [`Apu::provide_dmc_sample`].
    pub fn tick(&mut self) -> Option<u16> {
        let dmc_fetch = self.dmc.clock_timer();

        // Pulse timers run at half the CPU rate.
        if self.cycle_parity {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
        }
        self.cycle_parity = !self.cycle_parity;

        self.triangle.clock_timer();
        self.noise.clock_timer();

        let event = self.frame_counter.clock();
        if event.quarter {
            self.clock_quarter_frame();
        }
        if event.half {
            self.clock_half_frame();
        }

        dmc_fetch
    }

    pub fn provide_dmc_sample(&mut self, value: u8) {
        self.dmc.provide_sample(value);
    }

    pub fn write_register(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000..=0x4003 => self.pulse1.write_register((addr - 0x4000) as usize, value),
            0x4004..=0x4007 => self.pulse2.write_register((addr - 0x4004) as usize, value),
            0x4008..=0x400B => self.triangle.write_register((addr - 0x4008) as usize, value),
            0x400C..=0x400F => self.noise.write_register((addr - 0x400C) as usize, value),
            0x4010..=0x4013 => self.dmc.write_register((addr - 0x4010) as usize, value),
            0x4015 => self.write_status(value),
            0x4017 => self.write_frame_counter(value),
            _ => {}
        }
    }

    pub fn read_status(&mut self) -> u8 {
        let mut status = 0u8;
        if self.pulse1.active() {
            status |= 0x01;
        }
        if self.pulse2.active() {
            status |= 0x02;
        }
        if self.triangle.active() {
            status |= 0x04;
        }
        if self.noise.active() {
            status |= 0x08;
        }
        if self.dmc.active() {
            status |= 0x10;
        }
        if self.frame_counter.irq_flag {
            status |= 0x40;
            self.frame_counter.irq_flag = false;
        }
        if self.dmc.irq_flag() {
            status |= 0x80;
        }
        status
    }

    fn write_status(&mut self, value: u8) {
        self.pulse1.set_enabled(value & 0x01 != 0);
        self.pulse2.set_enabled(value & 0x02 != 0);
        self.triangle.set_enabled(value & 0x04 != 0);
        self.noise.set_enabled(value & 0x08 != 0);
        self.dmc.set_enabled(value & 0x10 != 0);

        if value & 0x10 == 0 {
            self.dmc.clear_irq();
        }
    }

    fn write_frame_counter(&mut self, value: u8) {
        let event = self
            .frame_counter
            .set_control(value & 0x80 != 0, value & 0x40 != 0);
        if event.quarter {
            self.clock_quarter_frame();
        }
        if event.half {
            self.clock_half_frame();
        }
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.clock_quarter_frame();
        self.pulse2.clock_quarter_frame();
        self.triangle.clock_quarter_frame();
        self.noise.clock_quarter_frame();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.clock_half_frame();
        self.pulse2.clock_half_frame();
        self.triangle.clock_half_frame();
        self.noise.clock_half_frame();
    }

    /// Instantaneous non-linear mix of all five channels, roughly 0..1.
    /// Host-side filtering happens downstream.
    pub fn sample(&self) -> f32 {
        let pulse_sum = (self.pulse1.output() + self.pulse2.output()) as f32;
        let pulse_out = if pulse_sum == 0.0 {
            0.0
        } else {
            95.52 / (8128.0 / pulse_sum + 100.0)
        };

        let tnd_sum = (3 * self.triangle.output() as u16
            + 2 * self.noise.output() as u16
            + self.dmc.output() as u16) as f32;
        let tnd_out = if tnd_sum == 0.0 {
            0.0
        } else {
            163.67 / (24329.0 / tnd_sum + 100.0)
        };

        pulse_out + tnd_out
    }
}

impl Default for Apu {
    fn default() -> Self {
        Apu::new()
    }
}
