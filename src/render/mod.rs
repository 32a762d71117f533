//! A built-in, block-based [`AudioContext`].
//!
//! [`RenderContext`] hosts primitives on a `petgraph` graph and renders 64-frame
//! stereo blocks on demand. Nothing drives it by itself: call
//! [`render_block`](RenderContext::render_block) / [`render`](RenderContext::render)
//! for offline work, or hand it to a [`CpalOutput`](crate::device::CpalOutput)
//! to play through a device.
//!
//! ```
//! use patchwerk::{AudioContext, PrimitiveKind, RenderContext};
//!
//! let ctx = RenderContext::new(48_000);
//! let osc = ctx.create(PrimitiveKind::Oscillator).unwrap();
//! ctx.connect(osc, ctx.destination()).unwrap();
//! ctx.start(osc, 0.0).unwrap();
//!
//! let rendered = ctx.render(4_800);
//! assert_eq!(rendered.len(), 4_800);
//! assert!(ctx.current_time() >= 0.1);
//! ```

mod graph;
pub mod node;
pub mod nodes;
pub mod param;

use std::cell::{Cell, RefCell};

use rtrb::Producer;

use crate::buffer::{AudioBuffer, SharedBuffer};
use crate::context::{AudioContext, PrimitiveId, PrimitiveKind};
use crate::decode;
use crate::error::{ContextError, DecodeError};
use crate::patch::Value;

pub use self::graph::Route;
use self::graph::RenderGraph;
use self::node::{Bus, Process, PropertyError, BLOCK};

pub struct RenderContext {
    graph: RefCell<RenderGraph>,
    closed: Cell<bool>,
}

impl RenderContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: RefCell::new(RenderGraph::new(sample_rate)),
            closed: Cell::new(false),
        }
    }

    /// Renders one block and advances the clock by [`BLOCK`] frames.
    pub fn render_block(&self) -> Bus {
        self.graph.borrow_mut().process()
    }

    /// Renders at least `frames` frames (whole blocks) and returns exactly
    /// `frames` of stereo output.
    pub fn render(&self, frames: usize) -> AudioBuffer {
        let mut left = Vec::with_capacity(frames + BLOCK);
        let mut right = Vec::with_capacity(frames + BLOCK);
        while left.len() < frames {
            let [l, r] = self.render_block();
            left.extend_from_slice(&l);
            right.extend_from_slice(&r);
        }
        left.truncate(frames);
        right.truncate(frames);
        AudioBuffer::new(self.sample_rate(), vec![left, right])
    }

    /// Opens a fresh PCM feed into a stream source. Any previous feed is dropped.
    pub fn open_stream(&self, id: PrimitiveId) -> Result<Producer<f32>, ContextError> {
        let mut graph = self.graph.borrow_mut();
        let capacity = graph.sample_rate() as usize * 2;
        let slot = graph.slot_mut(id)?;
        let source = slot
            .primitive
            .as_stream_source_mut()
            .ok_or_else(|| ContextError::InvalidState(format!("{id:?} is not a stream source")))?;
        Ok(source.open(capacity))
    }

    /// Rejects every further creation. Existing primitives keep rendering.
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Whether `id` is still hosted (not yet reclaimed).
    pub fn contains(&self, id: PrimitiveId) -> bool {
        self.graph.borrow().contains(id)
    }

    /// Number of hosted primitives, the destination included.
    pub fn primitive_count(&self) -> usize {
        self.graph.borrow().len()
    }

    pub fn kind_of(&self, id: PrimitiveId) -> Option<PrimitiveKind> {
        let graph = self.graph.borrow();
        graph.slot(id).ok().map(|slot| slot.primitive.kind())
    }

    pub fn routes_from(&self, id: PrimitiveId) -> Vec<(PrimitiveId, Route)> {
        self.graph.borrow().routes_from(id)
    }

    pub fn is_connected(&self, from: PrimitiveId, to: PrimitiveId) -> bool {
        self.routes_from(from).iter().any(|(target, _)| *target == to)
    }

    /// Scheduled `(start, stop)` times of a source.
    pub fn schedule(&self, id: PrimitiveId) -> Option<(Option<f64>, Option<f64>)> {
        let graph = self.graph.borrow();
        graph.slot(id).ok().map(|slot| (slot.start, slot.stop))
    }
}

impl AudioContext for RenderContext {
    fn current_time(&self) -> f64 {
        let graph = self.graph.borrow();
        graph.frames() as f64 / graph.sample_rate() as f64
    }

    fn sample_rate(&self) -> u32 {
        self.graph.borrow().sample_rate()
    }

    fn destination(&self) -> PrimitiveId {
        self.graph.borrow().destination()
    }

    fn create(&self, kind: PrimitiveKind) -> Result<PrimitiveId, ContextError> {
        if self.closed.get() {
            return Err(ContextError::Closed);
        }
        if kind == PrimitiveKind::Destination {
            return Ok(self.destination());
        }
        Ok(self.graph.borrow_mut().add(kind))
    }

    fn has_param(&self, id: PrimitiveId, name: &str) -> bool {
        let graph = self.graph.borrow();
        graph
            .slot(id)
            .is_ok_and(|slot| slot.primitive.params().get(name).is_some())
    }

    fn param_value(&self, id: PrimitiveId, name: &str) -> Option<f32> {
        let graph = self.graph.borrow();
        let slot = graph.slot(id).ok()?;
        slot.primitive.params().get(name).map(|p| p.value())
    }

    fn set_param_value(&self, id: PrimitiveId, name: &str, value: f32) -> Result<(), ContextError> {
        let mut graph = self.graph.borrow_mut();
        let param = graph
            .slot_mut(id)?
            .primitive
            .params_mut()
            .get_mut(name)
            .ok_or_else(|| ContextError::UnknownParam { id, name: name.to_owned() })?;
        param.set_value(value);
        Ok(())
    }

    fn set_target_at_time(
        &self,
        id: PrimitiveId,
        name: &str,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), ContextError> {
        if !time_constant.is_finite() || time_constant < 0.0 {
            return Err(ContextError::InvalidValue {
                name: name.to_owned(),
                reason: format!("time constant {time_constant} must be finite and non-negative"),
            });
        }
        let mut graph = self.graph.borrow_mut();
        let param = graph
            .slot_mut(id)?
            .primitive
            .params_mut()
            .get_mut(name)
            .ok_or_else(|| ContextError::UnknownParam { id, name: name.to_owned() })?;
        param.set_target_at_time(target, start_time, time_constant);
        Ok(())
    }

    fn property(&self, id: PrimitiveId, name: &str) -> Option<Value> {
        let graph = self.graph.borrow();
        graph.slot(id).ok()?.primitive.property(name)
    }

    fn set_property(&self, id: PrimitiveId, name: &str, value: Value) -> Result<(), ContextError> {
        let mut graph = self.graph.borrow_mut();
        graph
            .slot_mut(id)?
            .primitive
            .set_property(name, &value)
            .map_err(|e| match e {
                PropertyError::Unknown => ContextError::UnknownProperty { id, name: name.to_owned() },
                PropertyError::Invalid(reason) => ContextError::InvalidValue { name: name.to_owned(), reason },
            })
    }

    fn set_buffer(&self, id: PrimitiveId, buffer: SharedBuffer) -> Result<(), ContextError> {
        let mut graph = self.graph.borrow_mut();
        if graph.slot_mut(id)?.primitive.set_buffer(buffer) {
            Ok(())
        } else {
            Err(ContextError::InvalidState(format!("{id:?} does not play buffers")))
        }
    }

    fn buffer(&self, id: PrimitiveId) -> Option<SharedBuffer> {
        let graph = self.graph.borrow();
        graph.slot(id).ok()?.primitive.buffer()
    }

    fn connect(&self, from: PrimitiveId, to: PrimitiveId) -> Result<(), ContextError> {
        self.graph.borrow_mut().connect(from, to, Route::Audio)
    }

    fn connect_param(&self, from: PrimitiveId, to: PrimitiveId, param: &str) -> Result<(), ContextError> {
        let mut graph = self.graph.borrow_mut();
        let name = graph
            .slot(to)?
            .primitive
            .params()
            .name_of(param)
            .ok_or_else(|| ContextError::UnknownParam { id: to, name: param.to_owned() })?;
        graph.connect(from, to, Route::Param(name))
    }

    fn disconnect(&self, id: PrimitiveId) -> Result<(), ContextError> {
        self.graph.borrow_mut().disconnect(id)
    }

    fn start(&self, id: PrimitiveId, when: f64) -> Result<(), ContextError> {
        self.graph.borrow_mut().start(id, when)
    }

    fn stop(&self, id: PrimitiveId, when: f64) -> Result<(), ContextError> {
        self.graph.borrow_mut().stop(id, when)
    }

    fn decode_audio_data(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        decode::decode(bytes)
    }
}
