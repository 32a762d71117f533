//! Ring-buffer fed stream source

use rtrb::{Consumer, Producer, RingBuffer};

use crate::context::PrimitiveKind;
use crate::patch::Value;
use crate::render::node::{write_mono, Block, Bus, Process, ProcessContext, PropertyError};
use crate::render::param::ParamSet;

/// Plays mono PCM pushed by another thread or task.
///
/// The feeding side obtains a [`Producer`] with
/// [`RenderContext::open_stream`](crate::render::RenderContext::open_stream).
/// Underruns play silence. `url` is carried as a property for whoever feeds
/// the stream.
pub struct StreamSource {
    params: ParamSet,
    url: String,
    consumer: Option<Consumer<f32>>,
}

impl StreamSource {
    pub fn new() -> Self {
        Self {
            params: ParamSet::new(),
            url: String::new(),
            consumer: None,
        }
    }

    /// Replaces the feed with a fresh ring buffer of `capacity` samples.
    pub fn open(&mut self, capacity: usize) -> Producer<f32> {
        let (producer, consumer) = RingBuffer::new(capacity);
        self.consumer = Some(consumer);
        producer
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for StreamSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for StreamSource {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Streamer
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "url").then(|| Value::from(self.url.as_str()))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), PropertyError> {
        if name != "url" {
            return Err(PropertyError::Unknown);
        }
        self.url = value.to_string();
        Ok(())
    }

    fn process(&mut self, ctx: &ProcessContext, _input: &Bus, _params: &[Block], out: &mut Bus) {
        let Some(consumer) = &mut self.consumer else {
            return;
        };
        let (from, to) = ctx.active;
        for i in from..to {
            let sample = consumer.pop().unwrap_or(0.0);
            write_mono(out, i, sample);
        }
    }
}
