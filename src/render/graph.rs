//! Render graph - owns primitives, routes and the block clock

use hashbrown::HashMap;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{DfsPostOrder, EdgeRef, Reversed};
use petgraph::Direction::{Incoming, Outgoing};
use tracing::trace;

use crate::context::{PrimitiveId, PrimitiveKind};
use crate::error::ContextError;

use super::node::{Block, Bus, Primitive, Process, ProcessContext, BLOCK, SILENCE};

/// What an edge carries into its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Summed into the target's audio input.
    Audio,
    /// Mono-mixed and added to the named parameter.
    Param(&'static str),
}

pub(crate) struct Slot {
    pub(crate) id: PrimitiveId,
    pub(crate) primitive: Primitive,
    pub(crate) start: Option<f64>,
    pub(crate) stop: Option<f64>,
    output: Bus,
    param_blocks: Vec<Block>,
    /// Disconnected by its owner; reclaimed once nothing routes through it.
    released: bool,
}

type InnerGraph = StableGraph<Slot, Route>;

/// Block-based processing graph at a fixed sample rate.
pub(crate) struct RenderGraph {
    graph: InnerGraph,
    indices: HashMap<PrimitiveId, NodeIndex>,
    next_id: u32,
    destination: NodeIndex,
    sample_rate: u32,
    /// Frames rendered so far; the context clock.
    frames: u64,
}

impl RenderGraph {
    pub fn new(sample_rate: u32) -> Self {
        let mut graph = Self {
            graph: InnerGraph::with_capacity(64, 64),
            indices: HashMap::new(),
            next_id: 0,
            destination: NodeIndex::new(0),
            sample_rate,
            frames: 0,
        };
        let id = graph.add(PrimitiveKind::Destination);
        graph.destination = graph.indices[&id];
        graph
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn destination(&self) -> PrimitiveId {
        self.graph[self.destination].id
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn add(&mut self, kind: PrimitiveKind) -> PrimitiveId {
        let id = PrimitiveId(self.next_id);
        self.next_id += 1;

        let primitive = Primitive::new(kind, self.sample_rate);
        let param_blocks = vec![[0.0; BLOCK]; primitive.params().len()];
        let idx = self.graph.add_node(Slot {
            id,
            primitive,
            start: None,
            stop: None,
            output: SILENCE,
            param_blocks,
            released: false,
        });
        self.indices.insert(id, idx);
        id
    }

    fn index(&self, id: PrimitiveId) -> Result<NodeIndex, ContextError> {
        self.indices
            .get(&id)
            .copied()
            .ok_or(ContextError::UnknownPrimitive(id))
    }

    pub fn slot(&self, id: PrimitiveId) -> Result<&Slot, ContextError> {
        let idx = self.index(id)?;
        Ok(&self.graph[idx])
    }

    pub fn slot_mut(&mut self, id: PrimitiveId) -> Result<&mut Slot, ContextError> {
        let idx = self.index(id)?;
        Ok(&mut self.graph[idx])
    }

    pub fn contains(&self, id: PrimitiveId) -> bool {
        self.indices.contains_key(&id)
    }

    /// Adds a route. Identical routes are not duplicated.
    pub fn connect(&mut self, from: PrimitiveId, to: PrimitiveId, route: Route) -> Result<(), ContextError> {
        let a = self.index(from)?;
        let b = self.index(to)?;
        if a == self.destination {
            return Err(ContextError::InvalidState("the destination has no output".into()));
        }

        let exists = self
            .graph
            .edges_directed(a, Outgoing)
            .any(|e| e.target() == b && *e.weight() == route);
        if !exists {
            self.graph.add_edge(a, b, route);
        }
        self.graph[a].released = false;
        Ok(())
    }

    /// Drops every outgoing route of `id` and releases it.
    pub fn disconnect(&mut self, id: PrimitiveId) -> Result<(), ContextError> {
        let idx = self.index(id)?;
        let edges: Vec<EdgeIndex> = self.graph.edges_directed(idx, Outgoing).map(|e| e.id()).collect();
        for edge in edges {
            self.graph.remove_edge(edge);
        }
        if idx != self.destination {
            self.graph[idx].released = true;
        }
        self.sweep();
        Ok(())
    }

    /// Reclaims released primitives that no route touches any more.
    fn sweep(&mut self) {
        loop {
            let dead: Vec<NodeIndex> = self
                .graph
                .node_indices()
                .filter(|&n| self.graph[n].released && self.graph.neighbors_undirected(n).next().is_none())
                .collect();
            if dead.is_empty() {
                break;
            }
            for idx in dead {
                if let Some(slot) = self.graph.remove_node(idx) {
                    trace!(id = ?slot.id, "primitive reclaimed");
                    self.indices.remove(&slot.id);
                }
            }
        }
    }

    /// Outgoing routes of `id`, as `(target, route)`.
    pub fn routes_from(&self, id: PrimitiveId) -> Vec<(PrimitiveId, Route)> {
        let Ok(idx) = self.index(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Outgoing)
            .map(|e| (self.graph[e.target()].id, *e.weight()))
            .collect()
    }

    pub fn start(&mut self, id: PrimitiveId, when: f64) -> Result<(), ContextError> {
        let slot = self.slot_mut(id)?;
        if !slot.primitive.kind().is_source() {
            return Err(ContextError::NotASource(id));
        }
        if slot.start.is_some() {
            return Err(ContextError::InvalidState(format!("{id:?} was already started")));
        }
        slot.start = Some(when);
        Ok(())
    }

    pub fn stop(&mut self, id: PrimitiveId, when: f64) -> Result<(), ContextError> {
        let slot = self.slot_mut(id)?;
        if !slot.primitive.kind().is_source() {
            return Err(ContextError::NotASource(id));
        }
        if slot.start.is_none() {
            return Err(ContextError::InvalidState(format!("{id:?} was stopped before it started")));
        }
        slot.stop = Some(when);
        Ok(())
    }

    /// Frames of the current block in which the slot sounds.
    fn active_window(&self, slot: &Slot) -> (usize, usize) {
        if !slot.primitive.kind().is_source() {
            return (0, BLOCK);
        }
        let Some(start) = slot.start else {
            return (0, 0);
        };
        if slot.primitive.finished() {
            return (0, 0);
        }

        let rate = self.sample_rate as f64;
        let offset = |time: f64| -> usize {
            let frame = (time * rate).ceil().max(0.0) as u64;
            frame.saturating_sub(self.frames).min(BLOCK as u64) as usize
        };

        let from = offset(start);
        let to = slot.stop.map_or(BLOCK, offset);
        (from, to.max(from))
    }

    /// Processes one block and returns the destination's output.
    pub fn process(&mut self) -> Bus {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let reversed = Reversed(&self.graph);
        let mut dfs = DfsPostOrder::new(reversed, self.destination);
        while let Some(idx) = dfs.next(reversed) {
            order.push(idx);
        }

        for idx in order {
            let mut ctx = ProcessContext::new(self.sample_rate, self.frames);
            ctx.active = self.active_window(&self.graph[idx]);

            let mut params = std::mem::take(&mut self.graph[idx].param_blocks);
            for (k, (_, param)) in self.graph[idx].primitive.params_mut().iter_mut().enumerate() {
                param.fill(&ctx, &mut params[k]);
            }

            let mut input = SILENCE;
            let target = &self.graph[idx].primitive;
            for edge in self.graph.edges_directed(idx, Incoming) {
                let source = &self.graph[edge.source()].output;
                match *edge.weight() {
                    Route::Audio => {
                        for (acc, ch) in input.iter_mut().zip(source) {
                            for (a, s) in acc.iter_mut().zip(ch) {
                                *a += s;
                            }
                        }
                    }
                    Route::Param(name) => {
                        if let Some(k) = target.params().index_of(name) {
                            for (i, v) in params[k].iter_mut().enumerate() {
                                *v += 0.5 * (source[0][i] + source[1][i]);
                            }
                        }
                    }
                }
            }

            let slot = &mut self.graph[idx];
            for (k, (_, param)) in slot.primitive.params_mut().iter_mut().enumerate() {
                for v in params[k].iter_mut() {
                    *v = param.clamp(*v);
                }
            }

            let mut output = SILENCE;
            if ctx.active.0 < ctx.active.1 {
                slot.primitive.process(&ctx, &input, &params, &mut output);
            }
            slot.output = output;
            slot.param_blocks = params;
        }

        self.frames += BLOCK as u64;
        self.graph[self.destination].output
    }
}
