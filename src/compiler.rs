//! Graph compilation: node/connection sets in, a playable [`CompiledGraph`] out.
//!
//! [`GraphCompiler::compile`] only snapshots its inputs. All the work happens
//! in [`CompiledGraph::play`]:
//!
//! 1. every node with an instantiable kind becomes one primitive, its data
//!    applied; buffer sources await their sample through the [`BufferLoader`]
//! 2. connections are wired once every node exists, into a named parameter
//!    when the target socket is one, otherwise audio-to-audio
//! 3. sources are started once every connection is wired
//!
//! [`CompiledGraph::stop`] schedules sources to stop and disconnects
//! everything once that time has passed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use itertools::Itertools;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::context::{AudioContext, PrimitiveId, PrimitiveKind};
use crate::error::{ContextError, EngineError, LoadError};
use crate::kind::{Instantiate, SAMPLE_KEY};
use crate::loader::BufferLoader;
use crate::patch::{Connection, GraphNode, NodeMap};
use crate::registry::NodeRegistry;

/// Lifecycle of a [`CompiledGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphState {
    /// No instances.
    Idle,
    /// Instances are being built, possibly waiting on sample loads.
    Starting,
    /// Wired and sources started.
    Playing,
    /// Sources told to stop; disconnection pending.
    Stopping,
}

/// A primitive created for one graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instance {
    pub id: PrimitiveId,
    pub kind: PrimitiveKind,
}

struct Shared {
    state: GraphState,
    instances: BTreeMap<String, Instance>,
    cleanup: Option<JoinHandle<()>>,
    /// Bumped by every play and stop. A play that wakes up to a different
    /// epoch has been cancelled.
    epoch: u64,
    cleanup_passes: usize,
}

/// Compiles node/connection sets against a registry and a sample loader.
#[derive(Clone)]
pub struct GraphCompiler {
    registry: Rc<NodeRegistry>,
    loader: Rc<BufferLoader>,
}

impl GraphCompiler {
    pub fn new(registry: Rc<NodeRegistry>, loader: Rc<BufferLoader>) -> Self {
        Self { registry, loader }
    }

    pub fn registry(&self) -> &Rc<NodeRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Rc<BufferLoader> {
        &self.loader
    }

    /// Snapshots `nodes` and `connections`. Performs no I/O and creates no
    /// primitives.
    pub fn compile(
        &self,
        nodes: &NodeMap,
        connections: &[Connection],
        ctx: Rc<dyn AudioContext>,
    ) -> CompiledGraph {
        CompiledGraph {
            registry: self.registry.clone(),
            loader: self.loader.clone(),
            ctx,
            nodes: nodes.clone(),
            connections: connections.to_vec(),
            shared: Rc::new(RefCell::new(Shared {
                state: GraphState::Idle,
                instances: BTreeMap::new(),
                cleanup: None,
                epoch: 0,
                cleanup_passes: 0,
            })),
        }
    }

    /// Loads the sample of every buffer source in `nodes` ahead of playing,
    /// each distinct key once. Every sample is attempted; the first failure is returned.
    pub async fn prefetch(
        &self,
        ctx: &dyn AudioContext,
        nodes: &NodeMap,
        connections: &[Connection],
    ) -> Result<(), LoadError> {
        let keys: Vec<String> = nodes
            .values()
            .filter(|node| {
                self.registry
                    .get(&node.type_name)
                    .and_then(|d| d.kind.as_ref())
                    .is_some_and(|k| k.loads_sample())
            })
            .filter_map(|node| sample_key(&self.registry, nodes, connections, node))
            .unique()
            .collect();
        self.loader.prefetch(ctx, keys).await
    }
}

/// The sample key a buffer source plays: published by a label node wired
/// into its `sample` socket, else its own `sample` data.
pub fn sample_key(
    registry: &NodeRegistry,
    nodes: &NodeMap,
    connections: &[Connection],
    node: &GraphNode,
) -> Option<String> {
    let wired = connections
        .iter()
        .filter(|c| c.to.node_id == node.id && c.to.socket == SAMPLE_KEY)
        .find_map(|c| {
            let upstream = nodes.get(&c.from.node_id)?;
            let descriptor = registry.get(&upstream.type_name)?;
            (descriptor.compute)(upstream).remove(&c.from.socket)
        });

    wired
        .or_else(|| node.data.get(SAMPLE_KEY).and_then(|v| v.as_text()).map(str::to_owned))
        .filter(|key| !key.is_empty())
}

/// A compiled, playable graph.
pub struct CompiledGraph {
    registry: Rc<NodeRegistry>,
    loader: Rc<BufferLoader>,
    ctx: Rc<dyn AudioContext>,
    nodes: NodeMap,
    connections: Vec<Connection>,
    shared: Rc<RefCell<Shared>>,
}

impl CompiledGraph {
    pub fn state(&self) -> GraphState {
        self.shared.borrow().state
    }

    pub fn context(&self) -> &Rc<dyn AudioContext> {
        &self.ctx
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The primitive created for `node_id`, while one is live.
    pub fn instance(&self, node_id: &str) -> Option<Instance> {
        self.shared.borrow().instances.get(node_id).copied()
    }

    pub fn instance_count(&self) -> usize {
        self.shared.borrow().instances.len()
    }

    /// Completed cleanup passes over the lifetime of this graph.
    pub fn cleanup_passes(&self) -> usize {
        self.shared.borrow().cleanup_passes
    }

    pub fn is_cleanup_pending(&self) -> bool {
        self.shared.borrow().cleanup.is_some()
    }

    /// Instantiates, wires and starts the graph, with sources starting at `at`
    /// on the context clock.
    ///
    /// Per-node problems (unknown types, failed sample loads, dangling
    /// connections) are logged and skipped. Errors only for a play while
    /// already starting or playing, and for a context that can no longer
    /// create primitives.
    pub async fn play(&self, at: f64) -> Result<(), EngineError> {
        let epoch = self.begin()?;

        for node in self.nodes.values() {
            let Some(descriptor) = self.registry.get(&node.type_name) else {
                warn!(node = %node.id, type_name = %node.type_name, "unknown node type, skipped");
                continue;
            };
            let Some(kind) = &descriptor.kind else {
                trace!(node = %node.id, type_name = %node.type_name, "label-only node, nothing to instantiate");
                continue;
            };

            let id = match kind.instantiate(&*self.ctx, &node.data) {
                Ok(id) => id,
                Err(ContextError::Closed) => {
                    self.abort_start();
                    return Err(ContextError::Closed.into());
                }
                Err(e) => {
                    warn!(node = %node.id, error = %e, "primitive creation failed, skipped");
                    continue;
                }
            };
            let instance = Instance {
                id,
                kind: kind.primitive(),
            };
            self.shared.borrow_mut().instances.insert(node.id.clone(), instance);
            trace!(node = %node.id, ?id, "instantiated");

            if kind.loads_sample() {
                self.attach_sample(node, id).await;
                if self.shared.borrow().epoch != epoch {
                    debug!("stopped while starting, abandoning play");
                    return Ok(());
                }
            }
        }

        self.wire();
        self.start_sources(at);

        self.shared.borrow_mut().state = GraphState::Playing;
        debug!(instances = self.instance_count(), at, "graph playing");
        Ok(())
    }

    /// Schedules every source to stop at `at` (default: now), then
    /// disconnects every instance except the destination once `at` has
    /// passed. Cancels any cleanup already pending. A no-op while idle.
    ///
    /// # Panics
    ///
    /// A stop in the future spawns its cleanup with
    /// [`tokio::task::spawn_local`], so it must be called from within a
    /// [`LocalSet`](tokio::task::LocalSet). Stops at or before the current
    /// time clean up inline.
    pub fn stop(&self, at: Option<f64>) {
        let now = self.ctx.current_time();
        let when = at.unwrap_or(now);

        let mut shared = self.shared.borrow_mut();
        if shared.state == GraphState::Idle && shared.cleanup.is_none() {
            debug!("stop while idle, ignored");
            return;
        }
        if let Some(pending) = shared.cleanup.take() {
            debug!("cancelling pending cleanup");
            pending.abort();
        }
        shared.epoch += 1;

        for (node_id, instance) in &shared.instances {
            if !instance.kind.is_source() {
                continue;
            }
            if let Err(e) = self.ctx.stop(instance.id, when) {
                debug!(node = %node_id, error = %e, "source stop ignored");
            }
        }

        let delay = (when - now).max(0.0);
        let wait = match Duration::try_from_secs_f64(delay) {
            Ok(wait) if !wait.is_zero() => Some(wait),
            Ok(_) => None,
            Err(e) => {
                warn!(at = when, error = %e, "stop time out of range, cleaning up now");
                None
            }
        };
        let Some(wait) = wait else {
            drop(shared);
            run_cleanup(&self.shared, &*self.ctx);
            return;
        };

        shared.state = GraphState::Stopping;
        let task_shared = self.shared.clone();
        let ctx = self.ctx.clone();
        shared.cleanup = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(wait).await;
            run_cleanup(&task_shared, &*ctx);
        }));
        debug!(delay, "cleanup scheduled");
    }

    /// Enters Starting, first finishing any cleanup a previous stop left pending.
    fn begin(&self) -> Result<u64, EngineError> {
        let pending = {
            let mut shared = self.shared.borrow_mut();
            match shared.state {
                GraphState::Starting | GraphState::Playing => return Err(EngineError::AlreadyStarted),
                GraphState::Stopping | GraphState::Idle => shared.cleanup.take(),
            }
        };
        if let Some(pending) = pending {
            pending.abort();
            debug!("finishing pending cleanup before play");
            run_cleanup(&self.shared, &*self.ctx);
        }

        let mut shared = self.shared.borrow_mut();
        shared.state = GraphState::Starting;
        shared.epoch += 1;
        Ok(shared.epoch)
    }

    fn abort_start(&self) {
        self.shared.borrow_mut().epoch += 1;
        run_cleanup(&self.shared, &*self.ctx);
    }

    async fn attach_sample(&self, node: &GraphNode, id: PrimitiveId) {
        let Some(key) = sample_key(&self.registry, &self.nodes, &self.connections, node) else {
            debug!(node = %node.id, "buffer source without a sample");
            return;
        };

        match self.loader.load(&*self.ctx, &key).await {
            Ok(buffer) => {
                if let Err(e) = self.ctx.set_buffer(id, buffer) {
                    warn!(node = %node.id, %key, error = %e, "could not attach sample");
                }
            }
            Err(e) => warn!(node = %node.id, %key, error = %e, "sample failed to load, source stays silent"),
        }
    }

    fn wire(&self) {
        let shared = self.shared.borrow();
        for connection in &self.connections {
            let from = shared.instances.get(&connection.from.node_id);
            let to = shared.instances.get(&connection.to.node_id);
            let (Some(from), Some(to)) = (from, to) else {
                debug!(%connection, "unresolved connection skipped");
                continue;
            };

            let socket = connection.to.socket.as_str();
            let result = if self.ctx.has_param(to.id, socket) {
                trace!(%connection, "control-rate route");
                self.ctx.connect_param(from.id, to.id, socket)
            } else {
                trace!(%connection, "audio route");
                self.ctx.connect(from.id, to.id)
            };
            if let Err(e) = result {
                warn!(%connection, error = %e, "connection failed");
            }
        }
    }

    fn start_sources(&self, at: f64) {
        let shared = self.shared.borrow();
        for (node_id, instance) in &shared.instances {
            if !instance.kind.is_source() {
                continue;
            }
            if let Err(e) = self.ctx.start(instance.id, at) {
                warn!(node = %node_id, error = %e, "source failed to start");
            }
        }
    }
}

/// Disconnects every instance but the destination and empties the table.
fn run_cleanup(shared: &RefCell<Shared>, ctx: &dyn AudioContext) {
    let instances = {
        let mut shared = shared.borrow_mut();
        shared.cleanup = None;
        shared.state = GraphState::Idle;
        shared.cleanup_passes += 1;
        std::mem::take(&mut shared.instances)
    };

    let destination = ctx.destination();
    for (node_id, instance) in &instances {
        if instance.id == destination {
            continue;
        }
        if let Err(e) = ctx.disconnect(instance.id) {
            debug!(node = %node_id, error = %e, "disconnect failed");
        }
    }
    debug!(released = instances.len(), "cleanup pass complete");
}
