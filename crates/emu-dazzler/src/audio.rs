//! Host audio output for the Dazzler DAC.
//!
//! The `Dac` engine lives inside the cpal callback, which is its sole
//! consumer: decoded `DacCommand`s travel from the frame loop through an
//! SPSC ring, and the callback advances the engine's microsecond clock by
//! one tick per emitted frame, mirroring the hardware timer cadence. The
//! engine itself never blocks or allocates on this path.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cromemco_dazzler::{Dac, DacCommand, SAMPLE_RATE, TICK_INTERVAL_US};
use ringbuf::{HeapCons, traits::Consumer};

const CHANNELS: u16 = 2;

/// Capacity of the command ring between dispatcher and audio callback.
/// Roomier than the per-channel engine queues so the ring never becomes
/// the limiting drop point.
pub const COMMAND_RING_CAPACITY: usize = 2048;

/// Convert one 16-bit composite half to a signed PCM sample.
///
/// The engine's samples are unipolar (hardware PWM duty, silence at 0), so
/// map 0..=0xFFFF onto the full signed range by recentring.
fn to_i16(half: u16) -> i16 {
    (half ^ 0x8000) as i16
}

fn to_f32(half: u16) -> f32 {
    f32::from(half) / 32_767.5 - 1.0
}

/// Split a composite tick value into its (left, right) halves.
fn split(composite: u32) -> (u16, u16) {
    (composite as u16, (composite >> 16) as u16)
}

/// Engine state owned by the audio callback.
struct Playback {
    dac: Dac,
    commands: HeapCons<DacCommand>,
    clock_us: u64,
}

impl Playback {
    /// Produce one stereo frame.
    fn next_frame(&mut self) -> (u16, u16) {
        while let Some(cmd) = self.commands.try_pop() {
            self.dac.enqueue(cmd.channel, cmd.delay_us, cmd.sample);
        }
        let composite = self.dac.tick(self.clock_us);
        self.clock_us += TICK_INTERVAL_US;
        split(composite)
    }
}

pub struct AudioOutput {
    _stream: cpal::Stream,
}

impl AudioOutput {
    /// Build and start a 48 kHz stereo output stream fed by `commands`.
    pub fn new(commands: HeapCons<DacCommand>) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| String::from("no default audio output device"))?;

        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| format!("failed to query output configs: {e}"))?;

        let desired = supported_configs
            .filter(|cfg| cfg.channels() == CHANNELS)
            .find(|cfg| {
                let min = cfg.min_sample_rate().0;
                let max = cfg.max_sample_rate().0;
                min <= SAMPLE_RATE && SAMPLE_RATE <= max
            })
            .ok_or_else(|| format!("no {CHANNELS}-channel output config supports {SAMPLE_RATE} Hz"))?;

        let sample_format = desired.sample_format();
        let config = desired.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)).config();

        let mut playback = Playback {
            dac: Dac::new(),
            commands,
            clock_us: 0,
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _| {
                        for frame in data.chunks_exact_mut(usize::from(CHANNELS)) {
                            let (left, right) = playback.next_frame();
                            frame[0] = to_f32(left);
                            frame[1] = to_f32(right);
                        }
                    },
                    |err| eprintln!("Audio stream error: {err}"),
                    None,
                )
                .map_err(|e| format!("failed to build f32 audio stream: {e}"))?,
            cpal::SampleFormat::I16 => device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _| {
                        for frame in data.chunks_exact_mut(usize::from(CHANNELS)) {
                            let (left, right) = playback.next_frame();
                            frame[0] = to_i16(left);
                            frame[1] = to_i16(right);
                        }
                    },
                    |err| eprintln!("Audio stream error: {err}"),
                    None,
                )
                .map_err(|e| format!("failed to build i16 audio stream: {e}"))?,
            other => {
                return Err(format!("unsupported audio sample format: {other:?}"));
            }
        };

        stream
            .play()
            .map_err(|e| format!("failed to start audio stream: {e}"))?;

        Ok(Self { _stream: stream })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cromemco_dazzler::SETTLE_DELAY_US;
    use ringbuf::{
        HeapRb,
        traits::{Producer, Split},
    };

    #[test]
    fn composite_splits_into_halves() {
        assert_eq!(split(0xC000_4000), (0x4000, 0xC000));
        assert_eq!(split(0), (0, 0));
    }

    #[test]
    fn recentring_maps_midpoint_to_zero() {
        assert_eq!(to_i16(0x8000), 0);
        assert_eq!(to_i16(0x0000), i16::MIN);
        assert_eq!(to_i16(0xFFFF), i16::MAX);
        assert!(to_f32(0x8000).abs() < 1.0e-4);
        assert!((to_f32(0xFFFF) - 1.0).abs() < 1.0e-4);
    }

    /// Drive the callback-side state directly: commands pushed through the
    /// ring come out as PCM after the settle window.
    #[test]
    fn playback_consumes_command_ring() {
        let ring = HeapRb::<DacCommand>::new(COMMAND_RING_CAPACITY);
        let (mut producer, consumer) = ring.split();
        let mut playback = Playback {
            dac: Dac::new(),
            commands: consumer,
            clock_us: 0,
        };

        producer
            .try_push(DacCommand {
                channel: 0,
                delay_us: 100,
                sample: 0xFF,
            })
            .unwrap();

        let frames_to_settle = (SETTLE_DELAY_US / TICK_INTERVAL_US) as usize;
        let mut last = (0, 0);
        for _ in 0..=frames_to_settle {
            last = playback.next_frame();
        }
        assert_eq!(last.0, 0xFF00);
        assert_eq!(last.1, 0, "channel 1 silent");
    }
}
