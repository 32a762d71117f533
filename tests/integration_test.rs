use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use patchwerk::loader::FetchFuture;
use patchwerk::render::Route;
use patchwerk::{
    AudioBuffer, AudioContext, BufferLoader, CompiledGraph, Connection, ContextError, DecodeError, EngineConfig,
    Endpoint, Fetch, GraphCompiler, GraphNode, GraphState, LoadError, NodeDataUpdate, NodeMap, NodeRegistry, Patch,
    PlaybackController, PrimitiveId, PrimitiveKind, RenderContext, SampleSources, SharedBuffer, Toggle, Value,
};
use tokio::task::LocalSet;
use tracing::Level;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

fn wav_bytes() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..4_800 {
            writer.write_sample(((i % 100) as i16 - 50) * 400).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Serves one short WAV for any url after `delay`, counting calls.
#[derive(Clone, Default)]
struct MemFetcher {
    calls: Rc<Cell<usize>>,
    delay: Duration,
}

impl MemFetcher {
    fn slow(millis: u64) -> Self {
        Self {
            delay: Duration::from_millis(millis),
            ..Self::default()
        }
    }
}

impl Fetch for MemFetcher {
    fn fetch<'a>(&'a self, _url: &'a str) -> FetchFuture<'a> {
        self.calls.set(self.calls.get() + 1);
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(wav_bytes())
        })
    }
}

/// A [`RenderContext`] that counts primitive creation and disconnection.
struct Counting {
    inner: RenderContext,
    creates: Cell<usize>,
    disconnects: Cell<usize>,
}

impl Counting {
    fn new() -> Self {
        Self {
            inner: RenderContext::new(48_000),
            creates: Cell::new(0),
            disconnects: Cell::new(0),
        }
    }
}

impl AudioContext for Counting {
    delegate::delegate! {
        to self.inner {
            fn current_time(&self) -> f64;
            fn sample_rate(&self) -> u32;
            fn destination(&self) -> PrimitiveId;
            fn has_param(&self, id: PrimitiveId, name: &str) -> bool;
            fn param_value(&self, id: PrimitiveId, name: &str) -> Option<f32>;
            fn set_param_value(&self, id: PrimitiveId, name: &str, value: f32) -> Result<(), ContextError>;
            fn set_target_at_time(
                &self,
                id: PrimitiveId,
                name: &str,
                target: f32,
                start_time: f64,
                time_constant: f64,
            ) -> Result<(), ContextError>;
            fn property(&self, id: PrimitiveId, name: &str) -> Option<Value>;
            fn set_property(&self, id: PrimitiveId, name: &str, value: Value) -> Result<(), ContextError>;
            fn set_buffer(&self, id: PrimitiveId, buffer: SharedBuffer) -> Result<(), ContextError>;
            fn buffer(&self, id: PrimitiveId) -> Option<SharedBuffer>;
            fn connect(&self, from: PrimitiveId, to: PrimitiveId) -> Result<(), ContextError>;
            fn connect_param(&self, from: PrimitiveId, to: PrimitiveId, param: &str) -> Result<(), ContextError>;
            fn start(&self, id: PrimitiveId, when: f64) -> Result<(), ContextError>;
            fn stop(&self, id: PrimitiveId, when: f64) -> Result<(), ContextError>;
            fn decode_audio_data(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError>;
        }
    }

    fn create(&self, kind: PrimitiveKind) -> Result<PrimitiveId, ContextError> {
        self.creates.set(self.creates.get() + 1);
        self.inner.create(kind)
    }

    fn disconnect(&self, id: PrimitiveId) -> Result<(), ContextError> {
        self.disconnects.set(self.disconnects.get() + 1);
        self.inner.disconnect(id)
    }
}

struct Rig {
    registry: Rc<NodeRegistry>,
    compiler: GraphCompiler,
    fetcher: MemFetcher,
}

fn rig(fetcher: MemFetcher) -> Rig {
    init_tracing();
    let registry = Rc::new(NodeRegistry::with_builtins());
    let sources: SampleSources = [
        ("music".to_owned(), "mem://music".to_owned()),
        ("kick".to_owned(), "mem://kick".to_owned()),
    ]
    .into_iter()
    .collect();
    let loader = Rc::new(BufferLoader::new(sources, fetcher.clone()));
    Rig {
        compiler: GraphCompiler::new(registry.clone(), loader),
        registry,
        fetcher,
    }
}

impl Rig {
    fn compile(&self, patch: &Patch, ctx: Rc<dyn AudioContext>) -> CompiledGraph {
        self.compiler.compile(patch.nodes(), patch.connections(), ctx)
    }

    fn add(&self, patch: &mut Patch, type_name: &str) -> String {
        patch.add_node(&self.registry, type_name, (0.0, 0.0)).unwrap()
    }

    fn wire(&self, patch: &mut Patch, from: &str, to: &str, socket: &str) {
        patch
            .connect(&self.registry, Endpoint::new(from, "output"), Endpoint::new(to, socket))
            .unwrap();
    }
}

fn id_of(graph: &CompiledGraph, node: &str) -> PrimitiveId {
    graph.instance(node).unwrap().id
}

#[tokio::test]
async fn minimal_synth_plays_and_releases_everything() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let osc = rig.add(&mut patch, "Oscillator");
    let gain = rig.add(&mut patch, "Gain");
    rig.wire(&mut patch, &osc, &gain, "input");
    rig.wire(&mut patch, &gain, "destination", "input");

    let graph = rig.compile(&patch, ctx.clone());
    graph.play(0.0).await.unwrap();
    assert_eq!(graph.state(), GraphState::Playing);
    assert_eq!(graph.instance_count(), 3);

    let destination = ctx.destination();
    assert_eq!(id_of(&graph, "destination"), destination);
    assert_eq!(ctx.routes_from(id_of(&graph, &osc)), [(id_of(&graph, &gain), Route::Audio)]);
    assert_eq!(ctx.routes_from(id_of(&graph, &gain)), [(destination, Route::Audio)]);

    let rendered = ctx.render(4_800);
    assert!(rendered.channel(0).unwrap().iter().any(|s| s.abs() > 0.1));

    graph.stop(None);
    assert_eq!(graph.state(), GraphState::Idle);
    assert_eq!(graph.instance_count(), 0);
    assert_eq!(ctx.primitive_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn delayed_stop_cleans_up_once_the_time_has_passed() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let osc = rig.add(&mut patch, "Oscillator");
    rig.wire(&mut patch, &osc, "destination", "input");
    let graph = rig.compile(&patch, ctx.clone());

    LocalSet::new()
        .run_until(async {
            graph.play(0.0).await.unwrap();
            let osc_id = id_of(&graph, &osc);

            graph.stop(Some(0.25));
            assert_eq!(graph.state(), GraphState::Stopping);
            assert!(graph.is_cleanup_pending());
            assert_eq!(ctx.schedule(osc_id), Some((Some(0.0), Some(0.25))));
            assert_eq!(ctx.primitive_count(), 2);

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(graph.cleanup_passes(), 0);

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(graph.state(), GraphState::Idle);
            assert_eq!(graph.cleanup_passes(), 1);
            assert_eq!(graph.instance_count(), 0);
            assert_eq!(ctx.primitive_count(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn a_second_stop_replaces_the_first_cleanup() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let osc = rig.add(&mut patch, "Oscillator");
    rig.wire(&mut patch, &osc, "destination", "input");
    let graph = rig.compile(&patch, ctx.clone());

    LocalSet::new()
        .run_until(async {
            graph.play(0.0).await.unwrap();
            graph.stop(Some(0.5));
            graph.stop(Some(0.5));

            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(graph.cleanup_passes(), 1);

            // idle now; further stops do nothing
            graph.stop(None);
            assert_eq!(graph.cleanup_passes(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn play_during_a_pending_cleanup_finishes_it_first() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let osc = rig.add(&mut patch, "Oscillator");
    rig.wire(&mut patch, &osc, "destination", "input");
    let graph = rig.compile(&patch, ctx.clone());

    LocalSet::new()
        .run_until(async {
            graph.play(0.0).await.unwrap();
            graph.stop(Some(1.0));
            graph.play(0.0).await.unwrap();
            assert_eq!(graph.cleanup_passes(), 1);
            assert_eq!(graph.state(), GraphState::Playing);
            assert_eq!(ctx.primitive_count(), 2);

            // the old timer must not tear down the new instances
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(graph.cleanup_passes(), 1);
            assert_eq!(graph.instance_count(), 2);
        })
        .await;
}

#[tokio::test]
async fn connections_to_unknown_nodes_are_skipped() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let osc = rig.add(&mut patch, "Oscillator");
    rig.wire(&mut patch, &osc, "destination", "input");
    patch.push_connection(Connection::between("ghost", "output", "destination", "input"));
    patch.push_connection(Connection::between(osc.as_str(), "output", "ghost", "input"));

    let graph = rig.compile(&patch, ctx.clone());
    graph.play(0.0).await.unwrap();
    assert_eq!(graph.state(), GraphState::Playing);
    assert!(ctx.is_connected(id_of(&graph, &osc), ctx.destination()));
    assert_eq!(ctx.routes_from(id_of(&graph, &osc)).len(), 1);
}

#[tokio::test]
async fn param_sockets_route_at_control_rate() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let lfo = rig.add(&mut patch, "Oscillator");
    let osc = rig.add(&mut patch, "Oscillator");
    rig.wire(&mut patch, &lfo, &osc, "frequency");
    rig.wire(&mut patch, &osc, "destination", "input");

    let graph = rig.compile(&patch, ctx.clone());
    graph.play(0.0).await.unwrap();
    assert_eq!(
        ctx.routes_from(id_of(&graph, &lfo)),
        [(id_of(&graph, &osc), Route::Param("frequency"))]
    );
    assert_eq!(ctx.routes_from(id_of(&graph, &osc)), [(ctx.destination(), Route::Audio)]);
}

#[tokio::test]
async fn a_missing_sample_leaves_a_silent_source() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let src = rig.add(&mut patch, "AudioBufferSource");
    patch
        .update_node_data(NodeDataUpdate {
            node_id: src.clone(),
            key: "sample".into(),
            value: Value::from("nowhere"),
        })
        .unwrap();
    rig.wire(&mut patch, &src, "destination", "input");

    let graph = rig.compile(&patch, ctx.clone());
    graph.play(0.0).await.unwrap();
    assert_eq!(graph.state(), GraphState::Playing);

    let id = id_of(&graph, &src);
    assert!(ctx.buffer(id).is_none());
    assert_eq!(rig.fetcher.calls.get(), 0);
    let rendered = ctx.render(256);
    assert!(rendered.channel(0).unwrap().iter().all(|s| *s == 0.0));
}

#[tokio::test(start_paused = true)]
async fn concurrent_plays_share_one_fetch() {
    let rig = rig(MemFetcher::slow(50));
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let src = rig.add(&mut patch, "AudioBufferSource");
    rig.wire(&mut patch, &src, "destination", "input");

    let first = rig.compile(&patch, ctx.clone());
    let second = rig.compile(&patch, ctx.clone());
    let (a, b) = tokio::join!(first.play(0.0), second.play(0.0));
    a.unwrap();
    b.unwrap();

    assert_eq!(rig.fetcher.calls.get(), 1);
    let one = ctx.buffer(id_of(&first, &src)).unwrap();
    let two = ctx.buffer(id_of(&second, &src)).unwrap();
    assert!(Arc::ptr_eq(&one, &two));
    assert_eq!(one.sample_rate(), 48_000);
}

#[tokio::test]
async fn unconfigured_keys_fail_without_a_fetch() {
    let rig = rig(MemFetcher::default());
    let ctx = RenderContext::new(48_000);
    let loader = rig.compiler.loader();

    let err = loader.load(&ctx, "nope").await.unwrap_err();
    assert!(matches!(err, LoadError::Unconfigured { ref key } if key == "nope"));
    assert!(!loader.is_loading("nope"));
    assert_eq!(loader.cached_len(), 0);
    assert_eq!(rig.fetcher.calls.get(), 0);
}

#[tokio::test]
async fn prefetch_warms_the_cache_once_per_key() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let a = rig.add(&mut patch, "AudioBufferSource");
    let b = rig.add(&mut patch, "AudioBufferSource");
    rig.wire(&mut patch, &a, "destination", "input");
    rig.wire(&mut patch, &b, "destination", "input");

    rig.compiler
        .prefetch(&*ctx, patch.nodes(), patch.connections())
        .await
        .unwrap();
    assert_eq!(rig.fetcher.calls.get(), 1);
    assert!(rig.compiler.loader().get_cached("music").is_some());

    let graph = rig.compile(&patch, ctx.clone());
    graph.play(0.0).await.unwrap();
    assert_eq!(rig.fetcher.calls.get(), 1);
    assert!(ctx.buffer(id_of(&graph, &a)).is_some());
}

#[tokio::test(start_paused = true)]
async fn stop_while_starting_abandons_the_play() {
    let rig = rig(MemFetcher::slow(100));
    let ctx = Rc::new(Counting::new());
    let mut patch = Patch::new();
    // ordered before the oscillator, so the play suspends on it first
    let src = rig.add(&mut patch, "AudioBufferSource");
    let osc = rig.add(&mut patch, "Oscillator");
    rig.wire(&mut patch, &src, "destination", "input");
    rig.wire(&mut patch, &osc, "destination", "input");

    let graph = rig.compile(&patch, ctx.clone());
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(graph.state(), GraphState::Starting);
        graph.stop(None);
    };
    let (played, ()) = tokio::join!(graph.play(0.0), stopper);

    played.unwrap();
    assert_eq!(graph.state(), GraphState::Idle);
    assert_eq!(graph.instance_count(), 0);
    assert_eq!(ctx.creates.get(), 1);
    assert_eq!(ctx.inner.primitive_count(), 1);
    assert!(graph.instance(&osc).is_none());
}

#[tokio::test]
async fn every_created_primitive_is_disconnected() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(Counting::new());
    let mut patch = Patch::new();
    let osc = rig.add(&mut patch, "Oscillator");
    let filter = rig.add(&mut patch, "BiquadFilter");
    let pan = rig.add(&mut patch, "StereoPanner");
    rig.wire(&mut patch, &osc, &filter, "input");
    rig.wire(&mut patch, &filter, &pan, "input");
    rig.wire(&mut patch, &pan, "destination", "input");

    let graph = rig.compile(&patch, ctx.clone());
    graph.play(0.0).await.unwrap();
    assert_eq!(ctx.creates.get(), 3);

    graph.stop(None);
    assert_eq!(ctx.disconnects.get(), 3);
    assert_eq!(ctx.inner.primitive_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn controller_ignores_toggles_while_starting() {
    let rig = rig(MemFetcher::slow(50));
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let src = rig.add(&mut patch, "AudioBufferSource");
    rig.wire(&mut patch, &src, "destination", "input");

    let controller = PlaybackController::new(rig.compiler.clone(), ctx.clone(), &EngineConfig::default());
    let (first, second) = tokio::join!(controller.toggle_play(&patch), controller.toggle_play(&patch));
    assert_eq!(first, Toggle::Started);
    assert_eq!(second, Toggle::Ignored);
    assert_eq!(rig.fetcher.calls.get(), 1);
    assert!(controller.is_playing());

    assert_eq!(controller.toggle_play(&patch).await, Toggle::Stopped);
    assert_eq!(ctx.primitive_count(), 1);
}

#[tokio::test]
async fn controller_pushes_live_edits() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut patch = Patch::new();
    let osc = rig.add(&mut patch, "Oscillator");
    rig.wire(&mut patch, &osc, "destination", "input");

    let controller = PlaybackController::new(rig.compiler.clone(), ctx.clone(), &EngineConfig::default());
    assert_eq!(controller.sync(&patch), 0);
    controller.toggle_play(&patch).await;
    assert_eq!(controller.sync(&patch), 0);

    patch
        .update_node_data(NodeDataUpdate {
            node_id: osc.clone(),
            key: "type".into(),
            value: Value::from("sawtooth"),
        })
        .unwrap();
    assert_eq!(controller.sync(&patch), 1);

    let graph = controller.graph().unwrap();
    assert_eq!(ctx.property(id_of(&graph, &osc), "type"), Some(Value::from("sawtooth")));
}

#[tokio::test]
async fn label_nodes_never_become_primitives() {
    let rig = rig(MemFetcher::default());
    let ctx = Rc::new(RenderContext::new(48_000));
    let mut nodes = NodeMap::new();
    nodes.insert("label".into(), GraphNode::new("label", "Music"));
    nodes.insert(
        "src".into(),
        GraphNode::new("src", "AudioBufferSource").with("sample", "unconfigured"),
    );
    nodes.insert("destination".into(), GraphNode::new("destination", "AudioDestination"));
    let connections = [
        Connection::between("label", "output", "src", "sample"),
        Connection::between("src", "output", "destination", "input"),
    ];

    let graph = rig.compiler.compile(&nodes, &connections, ctx.clone());
    graph.play(0.0).await.unwrap();
    assert!(graph.instance("label").is_none());
    assert_eq!(graph.instance_count(), 2);
    // the label's key wins over the node's own data
    assert!(ctx.buffer(id_of(&graph, "src")).is_some());
    assert_eq!(rig.fetcher.calls.get(), 1);
}
