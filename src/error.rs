//! Error types for every layer of the engine.
//!
//! Compile-time resolution problems (unknown node types, dangling connections)
//! are not errors here: the compiler logs and skips them. What remains are
//! failures a caller can actually act on.

use std::sync::Arc;

use crate::context::PrimitiveId;

/// Errors raised by an [`AudioContext`](crate::AudioContext) implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("no primitive with id {0:?}")]
    UnknownPrimitive(PrimitiveId),

    #[error("primitive {id:?} has no parameter named `{name}`")]
    UnknownParam { id: PrimitiveId, name: String },

    #[error("primitive {id:?} has no property named `{name}`")]
    UnknownProperty { id: PrimitiveId, name: String },

    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue { name: String, reason: String },

    /// Lifecycle misuse, e.g. starting a source twice or stopping one that never started.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("primitive {0:?} is not a schedulable source")]
    NotASource(PrimitiveId),

    #[error("audio context is closed")]
    Closed,
}

/// Errors decoding raw bytes into an [`AudioBuffer`](crate::AudioBuffer).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognised audio container")]
    UnsupportedFormat,

    #[error("vorbis: {0}")]
    Vorbis(#[from] lewton::VorbisError),

    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    #[error("mp3: {0}")]
    Mp3(String),

    #[error("decoded stream contains no samples")]
    Empty,
}

/// Errors from [`BufferLoader::load`](crate::BufferLoader::load).
///
/// Cloneable so one failure can be handed to every caller that was waiting
/// on the same in-flight load.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("no source configured for sample key `{key}`")]
    Unconfigured { key: String },

    #[error("fetching {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("fetching {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("decoding sample `{key}` failed: {source}")]
    Decode {
        key: String,
        #[source]
        source: Arc<DecodeError>,
    },
}

/// Errors surfaced by [`CompiledGraph::play`](crate::CompiledGraph::play).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("graph is already starting or playing")]
    AlreadyStarted,

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Errors editing a [`Patch`](crate::Patch).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node type `{0}` is not registered")]
    UnknownNodeType(String),

    #[error("no node with id `{0}`")]
    UnknownNode(String),

    #[error("the destination node cannot be removed")]
    DestinationNotRemovable,

    #[error("cannot connect {from} -> {to}: {reason}")]
    InvalidConnection {
        from: String,
        to: String,
        reason: String,
    },
}

/// Errors loading an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors opening a live output stream.
#[cfg(feature = "cpal_sink")]
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Build(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    Play(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format {0}")]
    UnsupportedFormat(String),
}
