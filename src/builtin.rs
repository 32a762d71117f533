//! The built-in node types.

use std::collections::BTreeMap;

use crate::kind::{self, SAMPLE_KEY};
use crate::patch::{GraphNode, DESTINATION_TYPE};
use crate::registry::{NodeDescriptor, NodeRegistry, ParameterSpec, Socket};

pub const OSCILLATOR_TYPES: [&str; 4] = ["sine", "square", "sawtooth", "triangle"];

pub const FILTER_TYPES: [&str; 8] = [
    "lowpass", "highpass", "bandpass", "notch", "allpass", "peaking", "lowshelf", "highshelf",
];

/// Sample keys offered by the buffer source's selector.
pub const SAMPLE_KEYS: [&str; 2] = ["music", "speech"];

pub const MUSIC_EXAMPLE: &str =
    "https://software-mansion.github.io/react-native-audio-api/audio/music/example-music-03.mp3";

pub const SPEECH_EXAMPLE: &str =
    "https://software-mansion.github.io/react-native-audio-api/audio/voice/example-voice-01.mp3";

/// Default for the streamer's `url`.
pub const RADIO_EXAMPLE: &str = "https://stream.radioparadise.com/aac-320";

fn slider(name: &'static str, min: f64, max: f64, step: f64, default: f64) -> ParameterSpec {
    ParameterSpec::Slider { name, min, max, step, default }
}

fn selector(name: &'static str, options: &[&str], default: &str) -> ParameterSpec {
    ParameterSpec::Selector {
        name,
        options: options.iter().map(|s| s.to_string()).collect(),
        default: default.to_owned(),
    }
}

fn url(name: &'static str, default: &str) -> ParameterSpec {
    ParameterSpec::Url { name, default: default.to_owned() }
}

fn publish(key: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("output".to_owned(), key.to_owned())])
}

fn compute_music(_: &GraphNode) -> BTreeMap<String, String> {
    publish("music")
}

fn compute_speech(_: &GraphNode) -> BTreeMap<String, String> {
    publish("speech")
}

fn compute_url_music(node: &GraphNode) -> BTreeMap<String, String> {
    node.data
        .get("source")
        .and_then(|v| v.as_text())
        .map(publish)
        .unwrap_or_default()
}

/// Descriptors for every built-in node type.
pub fn descriptors() -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor::new(DESTINATION_TYPE)
            .with_inputs([Socket::audio("input")])
            .with_kind(kind::Destination),
        NodeDescriptor::new("Gain")
            .with_inputs([Socket::audio("input"), Socket::param("gain")])
            .with_outputs([Socket::audio("output")])
            .with_parameter(slider("gain", 0.0, 20.0, 0.01, 15.0))
            .with_kind(kind::Gain),
        NodeDescriptor::new("Oscillator")
            .with_inputs([Socket::param("frequency")])
            .with_outputs([Socket::audio("output")])
            .with_parameter(slider("frequency", 20.0, 3000.0, 10.0, 440.0))
            .with_parameter(selector("type", &OSCILLATOR_TYPES, "sine"))
            .with_kind(kind::Oscillator),
        NodeDescriptor::new("BiquadFilter")
            .with_inputs([
                Socket::audio("input"),
                Socket::param("frequency"),
                Socket::param("Q"),
            ])
            .with_outputs([Socket::audio("output")])
            .with_parameter(selector("type", &FILTER_TYPES, "lowpass"))
            .with_parameter(slider("frequency", 20.0, 3000.0, 10.0, 440.0))
            .with_parameter(slider("Q", 0.1, 20.0, 0.1, 1.0))
            .with_kind(kind::BiquadFilter),
        NodeDescriptor::new("StereoPanner")
            .with_inputs([Socket::audio("input"), Socket::param("pan")])
            .with_outputs([Socket::audio("output")])
            .with_parameter(slider("pan", -1.0, 1.0, 0.01, 0.0))
            .with_kind(kind::StereoPanner),
        NodeDescriptor::new("AudioBufferSource")
            .with_inputs([Socket::param(SAMPLE_KEY), Socket::param("playbackRate")])
            .with_outputs([Socket::audio("output")])
            .with_parameter(selector(SAMPLE_KEY, &SAMPLE_KEYS, "music"))
            .with_parameter(slider("playbackRate", 0.1, 4.0, 0.01, 1.0))
            .with_kind(kind::BufferSource),
        NodeDescriptor::new("Streamer")
            .with_outputs([Socket::audio("output")])
            .with_parameter(url("url", RADIO_EXAMPLE))
            .with_kind(kind::Streamer),
        // Label-only helpers: they publish a sample key through `compute` and
        // never become primitives.
        NodeDescriptor::new("Music")
            .with_outputs([Socket::param("output")])
            .with_compute(compute_music),
        NodeDescriptor::new("Speech")
            .with_outputs([Socket::param("output")])
            .with_compute(compute_speech),
        NodeDescriptor::new("UrlMusic")
            .with_outputs([Socket::param("output")])
            .with_parameter(url("source", MUSIC_EXAMPLE))
            .with_compute(compute_url_music),
    ]
}

impl NodeRegistry {
    /// A registry holding every built-in node type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors() {
            registry.register(descriptor);
        }
        registry
    }
}
