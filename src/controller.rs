//! The play/stop toggle.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, error};

use crate::compiler::{CompiledGraph, GraphCompiler, GraphState};
use crate::config::EngineConfig;
use crate::context::AudioContext;
use crate::patch::Patch;
use crate::sync::ParamSync;

/// What a [`PlaybackController::toggle_play`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    Started,
    Stopped,
    /// A play was already in flight.
    Ignored,
    /// Stopped by someone else before it finished starting.
    Cancelled,
    /// Play failed; the error was logged.
    Failed,
}

/// Owns the playing graph of one audio context.
///
/// Every play compiles a fresh graph from the patch. At most one play is in
/// flight at a time. Dropping the controller stops playback.
pub struct PlaybackController {
    compiler: GraphCompiler,
    ctx: Rc<dyn AudioContext>,
    sync: RefCell<ParamSync>,
    graph: RefCell<Option<Rc<CompiledGraph>>>,
    playing: Cell<bool>,
    loading: Cell<bool>,
    /// Latched for the whole of a play, independent of `loading`.
    starting: Cell<bool>,
}

impl PlaybackController {
    pub fn new(compiler: GraphCompiler, ctx: Rc<dyn AudioContext>, config: &EngineConfig) -> Self {
        Self {
            compiler,
            ctx,
            sync: RefCell::new(ParamSync::new(config.sync.time_constant)),
            graph: RefCell::new(None),
            playing: Cell::new(false),
            loading: Cell::new(false),
            starting: Cell::new(false),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    /// The most recently compiled graph.
    pub fn graph(&self) -> Option<Rc<CompiledGraph>> {
        self.graph.borrow().clone()
    }

    /// Stops when playing, otherwise compiles `patch` and plays it now.
    /// Failures are logged, never returned.
    pub async fn toggle_play(&self, patch: &Patch) -> Toggle {
        if self.starting.get() {
            debug!("play already in flight, toggle ignored");
            return Toggle::Ignored;
        }
        if self.playing.get() {
            self.stop();
            return Toggle::Stopped;
        }

        let latch = StartLatch::hold(&self.starting, &self.loading);

        let graph = Rc::new(self.compiler.compile(patch.nodes(), patch.connections(), self.ctx.clone()));
        if let Some(previous) = self.graph.replace(Some(graph.clone())) {
            previous.stop(None);
        }
        self.sync.borrow_mut().reset();

        let result = graph.play(self.ctx.current_time()).await;
        drop(latch);

        match result {
            Ok(()) if graph.state() == GraphState::Playing => {
                self.playing.set(true);
                Toggle::Started
            }
            Ok(()) => {
                debug!("play cancelled by a stop");
                Toggle::Cancelled
            }
            Err(e) => {
                error!(error = %e, "play failed");
                Toggle::Failed
            }
        }
    }

    /// Pushes edited node data into the playing graph. Returns the number of
    /// updates issued.
    pub fn sync(&self, patch: &Patch) -> usize {
        let graph = self.graph.borrow();
        match graph.as_deref() {
            Some(graph) if self.playing.get() => self.sync.borrow_mut().observe(graph, patch.nodes()),
            _ => 0,
        }
    }

    /// Stops now. Safe in any state.
    pub fn stop(&self) {
        if let Some(graph) = self.graph.borrow().as_deref() {
            graph.stop(None);
        }
        self.playing.set(false);
    }
}

/// Holds `starting` and `loading` set until dropped, including when the
/// play future itself is dropped part-way.
struct StartLatch<'a> {
    starting: &'a Cell<bool>,
    loading: &'a Cell<bool>,
}

impl<'a> StartLatch<'a> {
    fn hold(starting: &'a Cell<bool>, loading: &'a Cell<bool>) -> Self {
        starting.set(true);
        loading.set(true);
        Self { starting, loading }
    }
}

impl Drop for StartLatch<'_> {
    fn drop(&mut self) {
        self.starting.set(false);
        self.loading.set(false);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::LoadError;
    use crate::loader::{BufferLoader, Fetch, FetchFuture, FileFetcher, SampleSources};
    use crate::patch::{Endpoint, DESTINATION_ID};
    use crate::registry::NodeRegistry;
    use crate::render::RenderContext;

    fn controller(ctx: Rc<RenderContext>) -> (PlaybackController, Patch, Rc<NodeRegistry>) {
        let registry = Rc::new(NodeRegistry::with_builtins());
        let loader = Rc::new(BufferLoader::new(SampleSources::new(), FileFetcher));
        let compiler = GraphCompiler::new(registry.clone(), loader);
        let controller = PlaybackController::new(compiler, ctx, &EngineConfig::default());
        (controller, Patch::new(), registry)
    }

    #[tokio::test]
    async fn toggles_between_playing_and_stopped() {
        let ctx = Rc::new(RenderContext::new(48_000));
        let (controller, mut patch, registry) = controller(ctx.clone());
        let osc = patch.add_node(&registry, "Oscillator", (0.0, 0.0)).unwrap();
        patch
            .connect(&registry, Endpoint::new(&osc, "output"), Endpoint::new(DESTINATION_ID, "input"))
            .unwrap();

        assert_eq!(controller.toggle_play(&patch).await, Toggle::Started);
        assert!(controller.is_playing());
        assert!(!controller.is_loading());
        assert_eq!(ctx.primitive_count(), 2);

        assert_eq!(controller.toggle_play(&patch).await, Toggle::Stopped);
        assert!(!controller.is_playing());
        assert_eq!(ctx.primitive_count(), 1);
    }

    #[tokio::test]
    async fn failures_clear_loading() {
        let ctx = Rc::new(RenderContext::new(48_000));
        let (controller, mut patch, registry) = controller(ctx.clone());
        patch.add_node(&registry, "Gain", (0.0, 0.0)).unwrap();
        ctx.close();

        assert_eq!(controller.toggle_play(&patch).await, Toggle::Failed);
        assert!(!controller.is_playing());
        assert!(!controller.is_loading());
    }

    struct Hung;

    impl Fetch for Hung {
        fn fetch<'a>(&'a self, _url: &'a str) -> FetchFuture<'a> {
            Box::pin(std::future::pending::<Result<Vec<u8>, LoadError>>())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_toggle_releases_the_latch() {
        let ctx = Rc::new(RenderContext::new(48_000));
        let registry = Rc::new(NodeRegistry::with_builtins());
        let mut sources = SampleSources::new();
        sources.insert("music", "mem://music");
        let loader = Rc::new(BufferLoader::new(sources, Hung));
        let compiler = GraphCompiler::new(registry.clone(), loader);
        let controller = PlaybackController::new(compiler, ctx.clone(), &EngineConfig::default());

        let mut hung = Patch::new();
        let source = hung.add_node(&registry, "AudioBufferSource", (0.0, 0.0)).unwrap();
        hung.connect(&registry, Endpoint::new(&source, "output"), Endpoint::new(DESTINATION_ID, "input"))
            .unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(100), controller.toggle_play(&hung)).await;
        assert!(abandoned.is_err());
        assert!(!controller.is_loading());
        assert!(!controller.is_playing());

        let mut patch = Patch::new();
        let osc = patch.add_node(&registry, "Oscillator", (0.0, 0.0)).unwrap();
        patch
            .connect(&registry, Endpoint::new(&osc, "output"), Endpoint::new(DESTINATION_ID, "input"))
            .unwrap();
        assert_eq!(controller.toggle_play(&patch).await, Toggle::Started);
        assert!(controller.is_playing());
        assert_eq!(ctx.primitive_count(), 2);
    }

    #[tokio::test]
    async fn drop_stops_playback() {
        let ctx = Rc::new(RenderContext::new(48_000));
        let (controller, mut patch, registry) = controller(ctx.clone());
        let osc = patch.add_node(&registry, "Oscillator", (0.0, 0.0)).unwrap();
        patch
            .connect(&registry, Endpoint::new(&osc, "output"), Endpoint::new(DESTINATION_ID, "input"))
            .unwrap();
        controller.toggle_play(&patch).await;
        assert_eq!(ctx.primitive_count(), 2);

        drop(controller);
        assert_eq!(ctx.primitive_count(), 1);
    }
}
