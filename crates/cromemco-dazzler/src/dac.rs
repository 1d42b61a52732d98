//! Two-channel DAC playback engine.
//!
//! The host streams audio as `(delay_us, sample)` pairs per channel, where
//! the delay says how long the *previously committed* sample keeps playing
//! before the new one takes over — not how long the new sample lasts. Each
//! channel holds a small FIFO of these pairs and a deadline-driven state
//! machine advanced by a fixed-rate tick.
//!
//! The tick is nominally 48 kHz but fires every 20 µs — slightly faster than
//! the exact 20.83 µs period — so the downstream audio peripheral, which is
//! clocked from the sample stream itself, is never starved.
//!
//! Time is a caller-supplied monotonic microsecond counter; the engine does
//! no clock reads of its own, which keeps the state machine deterministic
//! under test. The tick path performs no allocation and only bounded-time
//! queue operations, so it is safe to run from an audio callback.

use std::collections::VecDeque;

/// Nominal output sample rate.
pub const SAMPLE_RATE: u32 = 48_000;

/// Tick period in microseconds. 20 µs is slightly fast for 48 kHz, which is
/// intentional: the consumer must never be starved.
pub const TICK_INTERVAL_US: u64 = 1_000_000 / SAMPLE_RATE as u64;

/// Per-channel queue depth. Enough to absorb producer jitter without
/// delaying audio noticeably.
pub const QUEUE_DEPTH: usize = 512;

/// Hold-off before playback resumes after a queue-empty period, letting the
/// producer refill the queue instead of glitching on every sample.
pub const SETTLE_DELAY_US: u64 = 5_000;

/// Number of DAC channels (stereo).
pub const NUM_CHANNELS: usize = 2;

/// Playback state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    /// Queue drained; channel contributes silence.
    Idle,
    /// A deadline is armed; the pending sample commits when it passes.
    Playing,
    /// The last committed sample plays for one more tick, then silence.
    Draining,
}

/// One DAC channel: sample FIFO plus deadline state machine.
pub struct DacChannel {
    /// Queued `(delay_us, sample)` pairs, oldest first.
    queue: VecDeque<(u16, u8)>,
    state: ChannelState,
    /// When the pending sample takes over (microseconds).
    deadline_us: u64,
    /// Next sample to commit, already widened to 16 bits.
    pending: u16,
    /// Last committed 16-bit sample.
    current: u16,
    /// Samples dropped because the queue was full.
    dropped: u64,
}

impl DacChannel {
    fn new() -> Self {
        Self {
            queue: VecDeque::with_capacity(QUEUE_DEPTH),
            state: ChannelState::Idle,
            deadline_us: 0,
            pending: 0,
            current: 0,
            dropped: 0,
        }
    }

    /// Queue a sample. Returns false (and counts a drop) when full.
    pub fn enqueue(&mut self, delay_us: u16, sample: u8) -> bool {
        if self.queue.len() >= QUEUE_DEPTH {
            self.dropped += 1;
            return false;
        }
        self.queue.push_back((delay_us, sample));
        true
    }

    /// Advance the channel by one tick at time `now_us`.
    fn tick(&mut self, now_us: u64) {
        match self.state {
            ChannelState::Playing => {
                if now_us >= self.deadline_us {
                    // The previous sample has played long enough
                    self.current = self.pending;
                    if let Some((delay_us, sample)) = self.queue.pop_front() {
                        self.deadline_us = now_us + u64::from(delay_us);
                        self.pending = widen(sample);
                    } else {
                        self.state = ChannelState::Draining;
                    }
                }
            }
            ChannelState::Draining => {
                self.current = 0;
                self.state = ChannelState::Idle;
            }
            ChannelState::Idle => {
                if let Some((_, sample)) = self.queue.pop_front() {
                    // First sample after silence: hold for the settle delay
                    // (superseding the entry's own delay) so the producer can
                    // refill the queue before playback resumes.
                    self.pending = widen(sample);
                    self.deadline_us = now_us + SETTLE_DELAY_US;
                    self.state = ChannelState::Playing;
                }
            }
        }
    }

    /// Last committed 16-bit sample.
    #[must_use]
    pub fn current(&self) -> u16 {
        self.current
    }

    /// Number of samples dropped on a full queue.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Queued entries awaiting playback.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// Widen an 8-bit wire sample into the high byte of a 16-bit PCM value.
fn widen(sample: u8) -> u16 {
    u16::from(sample) << 8
}

/// The two-channel DAC engine.
pub struct Dac {
    channels: [DacChannel; NUM_CHANNELS],
}

impl Dac {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: [DacChannel::new(), DacChannel::new()],
        }
    }

    /// Queue a sample on one channel. Returns false on overflow.
    pub fn enqueue(&mut self, channel: usize, delay_us: u16, sample: u8) -> bool {
        self.channels[channel & 1].enqueue(delay_us, sample)
    }

    /// Advance both channels one tick and return the composite sample:
    /// channel 0 in the low 16 bits, channel 1 in the high 16 bits. Written
    /// to the audio peripheral exactly once per tick.
    pub fn tick(&mut self, now_us: u64) -> u32 {
        for channel in &mut self.channels {
            channel.tick(now_us);
        }
        u32::from(self.channels[0].current) | (u32::from(self.channels[1].current) << 16)
    }

    #[must_use]
    pub fn channel(&self, channel: usize) -> &DacChannel {
        &self.channels[channel & 1]
    }
}

impl Default for Dac {
    fn default() -> Self {
        Self::new()
    }
}
