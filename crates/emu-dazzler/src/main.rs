//! Windowed runner for the Cromemco Dazzler peripheral.
//!
//! Listens for a host emulator on TCP, feeds the wire protocol into the
//! Dazzler core, and presents the result: framebuffer through winit/pixels,
//! DAC audio through cpal, gamepads and the keyboard back to the host as
//! device reports. A headless mode runs the dispatch loop without video
//! for protocol debugging.

#![allow(clippy::cast_possible_truncation)]

mod audio;
mod input;
mod transport;

use std::process;
use std::time::{Duration, Instant};

use cromemco_dazzler::{key_report, vsync_report, DacCommand, Dazzler, FB_HEIGHT, FB_WIDTH};
use pixels::{Pixels, SurfaceTexture};
use ringbuf::{
    HeapProd, HeapRb,
    traits::{Producer, Split},
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use audio::AudioOutput;
use input::Joysticks;
use transport::Transport;

const DEFAULT_LISTEN: &str = "127.0.0.1:5742";
const DEFAULT_SCALE: u32 = 6;
const FRAME_DURATION: Duration = Duration::from_micros(16_667); // ~60 Hz

struct CliArgs {
    listen: String,
    scale: u32,
    headless: bool,
    frames: u32,
    no_audio: bool,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!("Usage: emu-dazzler [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --listen <addr>  TCP address to listen on [default: {DEFAULT_LISTEN}]");
    eprintln!("  --scale <n>      Integer window scale factor [default: {DEFAULT_SCALE}]");
    eprintln!("  --headless       Run the protocol loop without a window");
    eprintln!("  --frames <n>     Frames to run in headless mode [default: 3600]");
    eprintln!("  --no-audio       Disable host audio playback");
    eprintln!("  -h, --help       Show this help");
    process::exit(code);
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut listen = String::from(DEFAULT_LISTEN);
    let mut scale = DEFAULT_SCALE;
    let mut headless = false;
    let mut frames = 3600;
    let mut no_audio = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--listen" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Missing value for --listen");
                    print_usage_and_exit(1);
                };
                listen = value.clone();
            }
            "--scale" => {
                i += 1;
                if let Some(value) = args.get(i) {
                    scale = value.parse().unwrap_or(DEFAULT_SCALE).max(1);
                }
            }
            "--headless" => {
                headless = true;
            }
            "--frames" => {
                i += 1;
                if let Some(value) = args.get(i) {
                    frames = value.parse().unwrap_or(3600);
                }
            }
            "--no-audio" => {
                no_audio = true;
            }
            "-h" | "--help" => print_usage_and_exit(0),
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage_and_exit(1);
            }
        }
        i += 1;
    }

    CliArgs {
        listen,
        scale,
        headless,
        frames,
        no_audio,
    }
}

/// One emulation frame: drain the transport into the dispatcher, forward
/// its outputs, poll input, and latch the display.
fn pump_frame(
    daz: &mut Dazzler,
    transport: &mut Transport,
    joysticks: &mut Joysticks,
    dac_tx: Option<&mut HeapProd<DacCommand>>,
) {
    let mut buf = [0u8; 512];
    loop {
        let n = transport.recv(&mut buf);
        if n == 0 {
            break;
        }
        daz.push_bytes(&buf[..n]);
    }
    // Transport idle: resolve any half-decided CTRL/CTRLPIC pair
    daz.flush_pending();

    let commands = daz.take_dac_commands();
    if let Some(tx) = dac_tx {
        for cmd in commands {
            // Full ring: the engine is saturated, shed here
            let _ = tx.try_push(cmd);
        }
    }

    let replies = daz.take_output();
    transport.send(&replies);

    for report in joysticks.poll() {
        transport.send(&report);
    }

    daz.video_mut().latch_frame();
    transport.send(&vsync_report());
}

fn run_headless(cli: &CliArgs, mut transport: Transport, mut dac_tx: Option<HeapProd<DacCommand>>) {
    let mut daz = Dazzler::new();
    let mut joysticks = Joysticks::new();

    for _ in 0..cli.frames {
        let frame_start = Instant::now();
        pump_frame(&mut daz, &mut transport, &mut joysticks, dac_tx.as_mut());
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_DURATION {
            std::thread::sleep(FRAME_DURATION - elapsed);
        }
    }

    eprintln!(
        "Headless run finished: {} protocol bytes discarded, {} transport bytes shed",
        daz.discarded(),
        transport.dropped()
    );
}

struct App {
    daz: Dazzler,
    transport: Transport,
    joysticks: Joysticks,
    dac_tx: Option<HeapProd<DacCommand>>,
    _audio: Option<AudioOutput>,
    window: Option<&'static Window>,
    pixels: Option<Pixels<'static>>,
    last_frame_time: Instant,
    scale: u32,
}

impl App {
    fn new(
        transport: Transport,
        dac_tx: Option<HeapProd<DacCommand>>,
        audio: Option<AudioOutput>,
        scale: u32,
    ) -> Self {
        Self {
            daz: Dazzler::new(),
            transport,
            joysticks: Joysticks::new(),
            dac_tx,
            _audio: audio,
            window: None,
            pixels: None,
            last_frame_time: Instant::now(),
            scale,
        }
    }

    fn handle_keyboard_input(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        // F12 is the runner's quit hotkey; everything else goes to the host
        if let PhysicalKey::Code(KeyCode::F12) = event.physical_key
            && event.state == ElementState::Pressed
        {
            event_loop.exit();
            return;
        }

        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        if let Some(ascii) = input::key_ascii(&event.logical_key) {
            self.transport.send(&key_report(ascii));
        }
    }

    fn update_pixels(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };

        let frame = pixels.frame_mut();
        for (i, &argb) in self.daz.video().framebuffer().iter().enumerate() {
            let o = i * 4;
            frame[o] = ((argb >> 16) & 0xFF) as u8; // R
            frame[o + 1] = ((argb >> 8) & 0xFF) as u8; // G
            frame[o + 2] = (argb & 0xFF) as u8; // B
            frame[o + 3] = ((argb >> 24) & 0xFF) as u8; // A
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let size = winit::dpi::LogicalSize::new(
            FB_WIDTH as u32 * self.scale,
            FB_HEIGHT as u32 * self.scale,
        );
        let attrs = WindowAttributes::default()
            .with_title("Cromemco Dazzler")
            .with_inner_size(size)
            .with_resizable(false);

        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window: &'static Window = Box::leak(Box::new(window));
                let inner = window.inner_size();
                let surface = SurfaceTexture::new(inner.width, inner.height, window);
                let pixels = match Pixels::new(FB_WIDTH as u32, FB_HEIGHT as u32, surface) {
                    Ok(pixels) => pixels,
                    Err(e) => {
                        eprintln!("Failed to create pixels surface: {e}");
                        event_loop.exit();
                        return;
                    }
                };

                self.pixels = Some(pixels);
                self.window = Some(window);
            }
            Err(e) => {
                eprintln!("Failed to create window: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_keyboard_input(event_loop, &event);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                if now.duration_since(self.last_frame_time) >= FRAME_DURATION {
                    pump_frame(
                        &mut self.daz,
                        &mut self.transport,
                        &mut self.joysticks,
                        self.dac_tx.as_mut(),
                    );
                    self.update_pixels();
                    self.last_frame_time = now;
                }

                if let Some(pixels) = self.pixels.as_ref()
                    && let Err(e) = pixels.render()
                {
                    eprintln!("Render error: {e}");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    let cli = parse_args();

    let transport = match Transport::listen(&cli.listen) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Failed to listen on {}: {e}", cli.listen);
            process::exit(1);
        }
    };

    let (dac_tx, audio) = if cli.no_audio {
        (None, None)
    } else {
        let ring = HeapRb::<DacCommand>::new(audio::COMMAND_RING_CAPACITY);
        let (producer, consumer) = ring.split();
        match AudioOutput::new(consumer) {
            Ok(output) => (Some(producer), Some(output)),
            Err(e) => {
                eprintln!("Audio disabled: {e}");
                (None, None)
            }
        }
    };

    if cli.headless {
        run_headless(&cli, transport, dac_tx);
        return;
    }

    let mut app = App::new(transport, dac_tx, audio, cli.scale);

    let event_loop = match EventLoop::new() {
        Ok(loop_) => loop_,
        Err(e) => {
            eprintln!("Failed to create event loop: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = event_loop.run_app(&mut app) {
        eprintln!("Event loop error: {e}");
        process::exit(1);
    }
}
