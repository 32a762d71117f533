//! Offline render: compile a small patch and write two seconds of it to a WAV
//!
//! Run with: cargo run --example offline_render [output.wav]
//!
//! A sawtooth through a resonant lowpass, with a slow LFO sweeping it
//! between the speakers.

use std::rc::Rc;

use patchwerk::{
    AudioContext, BufferLoader, EngineConfig, Endpoint, GraphCompiler, NodeDataUpdate, NodeRegistry, Patch,
    RenderContext, Value,
};

fn set(patch: &mut Patch, node: &str, key: &str, value: impl Into<Value>) {
    patch
        .update_node_data(NodeDataUpdate {
            node_id: node.to_owned(),
            key: key.to_owned(),
            value: value.into(),
        })
        .unwrap();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "offline_render.wav".into());
    let config = EngineConfig::default();

    let ctx = Rc::new(RenderContext::new(config.render.sample_rate));
    let registry = Rc::new(NodeRegistry::with_builtins());
    let loader = Rc::new(BufferLoader::new(config.sample_sources(), patchwerk::FileFetcher));
    let compiler = GraphCompiler::new(registry.clone(), loader);

    let mut patch = Patch::new();
    let add = |patch: &mut Patch, type_name: &str| patch.add_node(&registry, type_name, (0.0, 0.0)).unwrap();
    let osc = add(&mut patch, "Oscillator");
    let lfo = add(&mut patch, "Oscillator");
    let filter = add(&mut patch, "BiquadFilter");
    let pan = add(&mut patch, "StereoPanner");
    let gain = add(&mut patch, "Gain");

    set(&mut patch, &osc, "type", "sawtooth");
    set(&mut patch, &osc, "frequency", 110.0);
    set(&mut patch, &lfo, "frequency", 0.5);
    set(&mut patch, &filter, "Q", 6.0);
    set(&mut patch, &gain, "gain", 0.3);

    let destination = "destination".to_owned();
    let wires = [
        (&osc, &filter, "input"),
        (&lfo, &pan, "pan"),
        (&filter, &pan, "input"),
        (&pan, &gain, "input"),
        (&gain, &destination, "input"),
    ];
    for (from, to, socket) in wires {
        patch
            .connect(&registry, Endpoint::new(from.as_str(), "output"), Endpoint::new(to.as_str(), socket))
            .unwrap();
    }

    let graph = compiler.compile(patch.nodes(), patch.connections(), ctx.clone());
    graph.play(0.0).await.unwrap();

    let seconds = 2;
    let rendered = ctx.render(ctx.sample_rate() as usize * seconds);
    graph.stop(None);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: ctx.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let left = rendered.channel(0).unwrap();
    let right = rendered.channel(1).unwrap();
    for (l, r) in left.iter().zip(right) {
        writer.write_sample(*l).unwrap();
        writer.write_sample(*r).unwrap();
    }
    writer.finalize().unwrap();

    println!("wrote {seconds}s to {path}");
}
