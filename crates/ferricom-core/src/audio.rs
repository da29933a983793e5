//! Host-facing audio path: resampling, DC removal, and the sample ring.
//!
//! The APU mixer produces one sample per CPU cycle (~1.789 MHz). This module
//! integrates those samples over each host-rate output interval, removes the
//! mixer's standing DC offset with a one-pole high-pass, and fans the result
//! out to a per-frame batch plus an optional lock-free SPSC ring that an
//! audio thread can drain.

use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Producer, Split},
};

use crate::config;

/// Ring capacity in stereo pairs; comfortably above one frame's worth of
/// output (~735 pairs at 44.1 kHz).
pub const RING_CAPACITY_PAIRS: usize = 2048;

/// One-pole DC-blocking high-pass: `y[n] = x[n] - x[n-1] + R * y[n-1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DcBlocker {
    prev_input: f32,
    prev_output: f32,
}

/// Pole location; sustained offsets decay by this factor per sample.
const DC_POLE: f32 = 0.995;

impl DcBlocker {
    pub fn filter(&mut self, input: f32) -> f32 {
        let output = input - self.prev_input + DC_POLE * self.prev_output;
        self.prev_input = input;
        self.prev_output = output;
        output
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Accumulates CPU-rate mixer samples and emits host-rate stereo pairs.
pub struct AudioOutput {
    sample_rate: u32,
    /// CPU cycles per host output sample.
    cycles_per_sample: f64,
    /// Integral of the mixer output over the current interval.
    accumulator: f64,
    /// Cycles accumulated so far (fractional carry across intervals).
    interval: f64,
    dc: DcBlocker,
    /// Interleaved stereo samples produced since the last drain.
    frame_samples: Vec<f32>,
    producer: Option<HeapProd<f32>>,
}

impl std::fmt::Debug for AudioOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioOutput")
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.frame_samples.len())
            .field("ring_attached", &self.producer.is_some())
            .finish()
    }
}

impl AudioOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            cycles_per_sample: config::CPU_CLOCK_NTSC / f64::from(sample_rate.max(1)),
            accumulator: 0.0,
            interval: 0.0,
            dc: DcBlocker::default(),
            frame_samples: Vec::with_capacity(1024),
            producer: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.cycles_per_sample = config::CPU_CLOCK_NTSC / f64::from(sample_rate.max(1));
        self.reset();
    }

    /// Creates the SPSC ring and hands back the consumer half. The producer
    /// side is owned here; the consumer belongs to the host audio thread,
    /// which fades to silence on underrun.
    pub fn attach_ring(&mut self) -> HeapCons<f32> {
        let ring = HeapRb::<f32>::new(RING_CAPACITY_PAIRS * 2);
        let (producer, consumer) = ring.split();
        self.producer = Some(producer);
        consumer
    }

    /// Feeds one CPU-cycle mixer sample.
    pub(crate) fn push(&mut self, mix: f32) {
        self.accumulator += f64::from(mix);
        self.interval += 1.0;
        if self.interval >= self.cycles_per_sample {
            let average = (self.accumulator / self.interval) as f32;
            let sample = self.dc.filter(average);
            self.emit(sample);
            self.accumulator = 0.0;
            self.interval -= self.cycles_per_sample;
        }
    }

    fn emit(&mut self, sample: f32) {
        // Mono source, mirrored into both stereo channels.
        self.frame_samples.push(sample);
        self.frame_samples.push(sample);
        if let Some(producer) = self.producer.as_mut() {
            // A full ring drops the newest samples; blocking the emulation
            // thread would be worse than a glitch.
            let _ = producer.try_push(sample);
            let _ = producer.try_push(sample);
        }
    }

    /// Drains the interleaved stereo samples produced since the last call.
    pub fn drain(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.frame_samples)
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.interval = 0.0;
        self.dc.reset();
        self.frame_samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Consumer;

    #[test]
    fn dc_offset_decays_at_the_pole_rate() {
        let mut dc = DcBlocker::default();
        // A unit step: first output is 1, then decays by 0.995 per sample.
        let first = dc.filter(1.0);
        assert!((first - 1.0).abs() < 1e-6);
        let second = dc.filter(1.0);
        assert!((second - DC_POLE).abs() < 1e-6);
        let third = dc.filter(1.0);
        assert!((third - DC_POLE * DC_POLE).abs() < 1e-6);
    }

    #[test]
    fn resampler_produces_host_rate_sample_count() {
        let mut out = AudioOutput::new(44_100);
        // One second of CPU cycles.
        for _ in 0..config::CPU_CLOCK_NTSC as u64 {
            out.push(0.25);
        }
        let samples = out.drain();
        let pairs = samples.len() / 2;
        assert!((44_099..=44_101).contains(&pairs), "got {pairs} pairs");
    }

    #[test]
    fn sustained_tone_has_no_dc_component() {
        let mut out = AudioOutput::new(44_100);
        // A constant mixer level: after the initial transient the DC block
        // should hold the mean near zero.
        for _ in 0..config::CPU_CLOCK_NTSC as u64 {
            out.push(0.5);
        }
        let samples = out.drain();
        let mean: f64 = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 1e-3, "mean {mean}");
    }

    #[test]
    fn ring_receives_interleaved_stereo() {
        let mut out = AudioOutput::new(44_100);
        let mut consumer = out.attach_ring();
        for _ in 0..100 {
            out.push(0.5);
        }
        let mut popped = 0;
        while consumer.try_pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped % 2, 0);
        assert!(popped >= 2);
    }
}
