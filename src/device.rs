//! Live output through a CPAL device.
//!
//! ```no_run
//! use std::rc::Rc;
//! use patchwerk::device::{CpalDevice, CpalOutput};
//! use patchwerk::RenderContext;
//!
//! let device = CpalDevice::default_output().expect("no output device");
//! let ctx = Rc::new(RenderContext::new(device.sample_rate()));
//! let mut output = CpalOutput::open(&device, ctx.clone()).unwrap();
//! loop {
//!     output.pump();
//!     std::thread::sleep(std::time::Duration::from_millis(2));
//! }
//! ```

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{error, warn};

use crate::error::DeviceError;
use crate::render::node::BLOCK;
use crate::render::RenderContext;

/// A discovered output device.
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
}

impl CpalDevice {
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        Self::describe(host.default_output_device()?)
    }

    /// Every output device with a usable default configuration.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(Self::describe).collect())
            .unwrap_or_default()
    }

    fn describe(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self { device, config, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }
}

/// Renders a [`RenderContext`] into a device stream.
///
/// The stream pulls interleaved samples from a ring buffer on its own
/// thread; [`pump`](Self::pump) tops that buffer up from the context.
pub struct CpalOutput {
    ctx: Rc<RenderContext>,
    producer: Producer<f32>,
    channels: usize,
    samples_consumed: Arc<AtomicUsize>,
    had_underrun: Arc<AtomicBool>,
    _stream: cpal::Stream,
}

impl CpalOutput {
    pub fn open(device: &CpalDevice, ctx: Rc<RenderContext>) -> Result<Self, DeviceError> {
        use crate::context::AudioContext;

        let channels = device.channels() as usize;
        let stream_config = device.config.config();
        if ctx.sample_rate() != stream_config.sample_rate.0 {
            warn!(
                context = ctx.sample_rate(),
                device = stream_config.sample_rate.0,
                "sample rate mismatch, playback speed will be off"
            );
        }

        // ~100ms of audio to absorb scheduling jitter
        let buffer_samples = ((stream_config.sample_rate.0 as f32 * 0.1) as usize) * channels;
        let (producer, consumer) = RingBuffer::<f32>::new(buffer_samples.next_power_of_two().max(8192));

        let samples_consumed = Arc::new(AtomicUsize::new(0));
        let had_underrun = Arc::new(AtomicBool::new(false));

        let stream = build_stream(
            &device.device,
            device.config.sample_format(),
            &stream_config,
            consumer,
            samples_consumed.clone(),
            had_underrun.clone(),
        )?;
        stream.play()?;

        Ok(Self {
            ctx,
            producer,
            channels,
            samples_consumed,
            had_underrun,
            _stream: stream,
        })
    }

    pub fn context(&self) -> &Rc<RenderContext> {
        &self.ctx
    }

    /// Renders blocks until the ring buffer is full. Returns the number of
    /// blocks rendered.
    pub fn pump(&mut self) -> usize {
        let needed = BLOCK * self.channels;
        let mut blocks = 0;
        while self.producer.slots() >= needed {
            let bus = self.ctx.render_block();
            for i in 0..BLOCK {
                for ch in 0..self.channels {
                    // devices with more than two channels repeat the right one
                    let _ = self.producer.push(bus[ch.min(1)][i]);
                }
            }
            blocks += 1;
        }
        blocks
    }

    #[inline]
    pub fn samples_consumed(&self) -> usize {
        self.samples_consumed.load(Ordering::Relaxed)
    }

    /// Checks and clears the underrun flag.
    pub fn check_underrun(&self) -> bool {
        self.had_underrun.swap(false, Ordering::Relaxed)
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    samples_consumed: Arc<AtomicUsize>,
    had_underrun: Arc<AtomicBool>,
) -> Result<cpal::Stream, DeviceError> {
    let on_error = |err: cpal::StreamError| error!(error = %err, "output stream error");

    let mut next = move || {
        consumer.pop().unwrap_or_else(|_| {
            had_underrun.store(true, Ordering::Relaxed);
            0.0
        })
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _| {
                for sample in data.iter_mut() {
                    *sample = next();
                }
                samples_consumed.fetch_add(data.len(), Ordering::Relaxed);
            },
            on_error,
            None,
        )?,
        SampleFormat::I16 => device.build_output_stream(
            stream_config,
            move |data: &mut [i16], _| {
                for sample in data.iter_mut() {
                    *sample = (next().clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                }
                samples_consumed.fetch_add(data.len(), Ordering::Relaxed);
            },
            on_error,
            None,
        )?,
        SampleFormat::U16 => device.build_output_stream(
            stream_config,
            move |data: &mut [u16], _| {
                for sample in data.iter_mut() {
                    *sample = ((next().clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16;
                }
                samples_consumed.fetch_add(data.len(), Ordering::Relaxed);
            },
            on_error,
            None,
        )?,
        other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
    };
    Ok(stream)
}
