use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::Parser;
use sdl2::audio::AudioSpecDesired;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;

use famicore::{Button, Nes};

const CPU_FREQUENCY_NTSC: f64 = 1_789_773.0;
const SAMPLE_RATE: i32 = 44_100;

#[derive(Parser)]
#[command(about = "NES emulator")]
struct CliArgs {
    rom_file: String,

    /// Integer window scale factor.
    #[arg(short, long, default_value_t = 3)]
    scale: u32,
}

/// Output shaping for the raw APU mix: a first-order low-pass, a DC
/// blocker, and soft clipping.
struct AudioFilter {
    low_pass: f32,
    hp_prev_in: f32,
    hp_prev_out: f32,
}

impl AudioFilter {
    fn new() -> Self {
        AudioFilter {
            low_pass: 0.0,
            hp_prev_in: 0.0,
            hp_prev_out: 0.0,
        }
    }

    fn apply(&mut self, sample: f32) -> f32 {
        const LP_ALPHA: f32 = 0.815;
        const HP_ALPHA: f32 = 0.995;

        self.low_pass = self.low_pass * LP_ALPHA + sample * (1.0 - LP_ALPHA);
        let high_passed = HP_ALPHA * (self.hp_prev_out + self.low_pass - self.hp_prev_in);
        self.hp_prev_in = self.low_pass;
        self.hp_prev_out = high_passed;

        (high_passed * 0.5).clamp(-0.95, 0.95)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();

    let bytes = std::fs::read(&args.rom_file)
        .with_context(|| format!("cannot read ROM file {}", args.rom_file))?;

    let mut nes = Nes::new();
    nes.load_rom(&bytes).context("failed to load ROM")?;

    let sdl_context = sdl2::init().map_err(anyhow::Error::msg)?;
    let video = sdl_context.video().map_err(anyhow::Error::msg)?;
    let audio = sdl_context.audio().map_err(anyhow::Error::msg)?;

    let window = video
        .window("famicore", 256 * args.scale, 240 * args.scale)
        .position_centered()
        .build()?;
    let mut canvas = window.into_canvas().present_vsync().build()?;
    canvas
        .set_scale(args.scale as f32, args.scale as f32)
        .map_err(anyhow::Error::msg)?;
    let creator = canvas.texture_creator();
    let mut texture = creator.create_texture_streaming(PixelFormatEnum::RGB24, 256, 240)?;

    let audio_queue = audio
        .open_queue::<f32, _>(
            None,
            &AudioSpecDesired {
                freq: Some(SAMPLE_RATE),
                channels: Some(1),
                samples: Some(1024),
            },
        )
        .map_err(anyhow::Error::msg)?;
    audio_queue.resume();

    let mut event_pump = sdl_context.event_pump().map_err(anyhow::Error::msg)?;

    let key_map: HashMap<Keycode, Button> = HashMap::from([
        (Keycode::X, Button::A),
        (Keycode::Z, Button::B),
        (Keycode::Space, Button::SELECT),
        (Keycode::Return, Button::START),
        (Keycode::Up, Button::UP),
        (Keycode::Down, Button::DOWN),
        (Keycode::Left, Button::LEFT),
        (Keycode::Right, Button::RIGHT),
    ]);

    let sample_interval = CPU_FREQUENCY_NTSC / SAMPLE_RATE as f64;
    let mut sample_timer = 0.0f64;
    let mut filter = AudioFilter::new();
    let mut samples: Vec<f32> = Vec::with_capacity(2048);
    let mut pad_state = Button::empty();

    'running: loop {
        loop {
            let frame_done = nes.clock();

            // Every third system tick is a CPU cycle; that is the
            // audio sampling clock.
            if nes.bus.system_clock() % 3 == 1 {
                sample_timer += 1.0;
                if sample_timer >= sample_interval {
                    sample_timer -= sample_interval;
                    samples.push(filter.apply(nes.sample()));
                }
            }

            if frame_done {
                break;
            }
        }

        texture.update(None, nes.framebuffer(), 256 * 3)?;
        canvas.copy(&texture, None, None).map_err(anyhow::Error::msg)?;
        canvas.present();

        if audio_queue.size() < SAMPLE_RATE as u32 {
            audio_queue
                .queue_audio(&samples)
                .map_err(anyhow::Error::msg)?;
        }
        samples.clear();

        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'running,
                Event::KeyDown {
                    keycode: Some(key), ..
                } => {
                    if let Some(&button) = key_map.get(&key) {
                        pad_state.insert(button);
                    }
                }
                Event::KeyUp {
                    keycode: Some(key), ..
                } => {
                    if let Some(&button) = key_map.get(&key) {
                        pad_state.remove(button);
                    }
                }
                _ => {}
            }
        }
        nes.set_controller(0, pad_state.bits());
    }

    Ok(())
}
