//! Live synth: play a patch through the default output device and edit it
//! while it plays
//!
//! Run with: cargo run --example live_synth --features cpal_sink
//!
//! Sweeps the oscillator frequency up and down for a few seconds. Every edit
//! goes through the controller's parameter sync, so the sweep glides instead
//! of stepping.

use std::rc::Rc;
use std::time::{Duration, Instant};

use patchwerk::device::{CpalDevice, CpalOutput};
use patchwerk::{
    BufferLoader, EngineConfig, Endpoint, FileFetcher, GraphCompiler, NodeDataUpdate, NodeRegistry, Patch,
    PlaybackController, RenderContext, Toggle, Value,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().init();

    let devices = CpalDevice::list_outputs();
    println!("Available audio output devices:");
    for device in &devices {
        println!("  {} ({}Hz, {} ch)", device.name(), device.sample_rate(), device.channels());
    }

    let Some(device) = CpalDevice::default_output() else {
        eprintln!("No audio output devices found!");
        return;
    };
    println!("\nUsing: {} @ {}Hz", device.name(), device.sample_rate());

    let config = EngineConfig::default();
    let ctx = Rc::new(RenderContext::new(device.sample_rate()));
    let mut output = CpalOutput::open(&device, ctx.clone()).expect("failed to open output stream");

    let registry = Rc::new(NodeRegistry::with_builtins());
    let loader = Rc::new(BufferLoader::new(config.sample_sources(), FileFetcher));
    let controller = PlaybackController::new(GraphCompiler::new(registry.clone(), loader), ctx.clone(), &config);

    let mut patch = Patch::new();
    let osc = patch.add_node(&registry, "Oscillator", (0.0, 0.0)).unwrap();
    let gain = patch.add_node(&registry, "Gain", (200.0, 0.0)).unwrap();
    let edit = |patch: &mut Patch, node: &str, key: &str, value: Value| {
        patch
            .update_node_data(NodeDataUpdate {
                node_id: node.to_owned(),
                key: key.to_owned(),
                value,
            })
            .unwrap();
    };
    edit(&mut patch, &osc, "type", Value::from("triangle"));
    edit(&mut patch, &gain, "gain", Value::Number(0.2));
    patch
        .connect(&registry, Endpoint::new(&osc, "output"), Endpoint::new(&gain, "input"))
        .unwrap();
    patch
        .connect(&registry, Endpoint::new(&gain, "output"), Endpoint::new("destination", "input"))
        .unwrap();

    if controller.toggle_play(&patch).await != Toggle::Started {
        eprintln!("Playback did not start");
        return;
    }

    let started = Instant::now();
    let mut last_edit = Instant::now();
    while started.elapsed() < Duration::from_secs(6) {
        if last_edit.elapsed() > Duration::from_millis(250) {
            let t = started.elapsed().as_secs_f64();
            let frequency = 220.0 + 440.0 * (0.5 - 0.5 * (t * std::f64::consts::PI / 3.0).cos());
            edit(&mut patch, &osc, "frequency", Value::Number(frequency));
            controller.sync(&patch);
            last_edit = Instant::now();
        }

        output.pump();
        if output.check_underrun() {
            println!("underrun at {:.2}s", started.elapsed().as_secs_f64());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    controller.toggle_play(&patch).await;
    println!("Done! {} samples played", output.samples_consumed());
}
