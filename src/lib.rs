//! patchwerk - compiles node/socket patches into playable audio graphs
//!
//! A [`Patch`] is what an editor holds: typed nodes with free-form data and
//! socket-to-socket connections. A [`GraphCompiler`] turns a snapshot of it
//! into a [`CompiledGraph`], which instantiates primitives on an
//! [`AudioContext`] when played and tears them down when stopped.
//!
//! - Node types are data: a [`NodeRegistry`] of descriptors, each optionally
//!   carrying the [`NodeKind`] that instantiates it
//! - Samples are fetched and decoded once per key, concurrent requests share
//!   one load ([`BufferLoader`])
//! - Edits to a playing patch are pushed through [`ParamSync`], continuous
//!   parameters glide, discrete properties jump
//! - [`RenderContext`] is a block-based software renderer; anything else
//!   that implements [`AudioContext`] works too
//!
//! Everything here is single-threaded. Delayed stops spawn local tasks, so
//! they need a [`tokio::task::LocalSet`].

pub mod buffer;
pub mod builtin;
pub mod compiler;
pub mod config;
pub mod context;
pub mod controller;
pub mod decode;
pub mod error;
pub mod kind;
pub mod loader;
pub mod patch;
pub mod registry;
pub mod render;
pub mod sync;

#[cfg(feature = "cpal_sink")]
pub mod device;

pub use buffer::{AudioBuffer, SharedBuffer};
pub use compiler::{CompiledGraph, GraphCompiler, GraphState, Instance};
pub use config::EngineConfig;
pub use context::{AudioContext, PrimitiveId, PrimitiveKind};
pub use controller::{PlaybackController, Toggle};
pub use error::{ConfigError, ContextError, DecodeError, EngineError, GraphError, LoadError};
pub use kind::{Instantiate, NodeKind};
pub use loader::{BufferLoader, Fetch, FileFetcher, SampleSources};
pub use patch::{Connection, Endpoint, GraphNode, NodeData, NodeDataUpdate, NodeMap, Patch, Value};
pub use registry::{NodeDescriptor, NodeRegistry, ParameterSpec, Socket, SocketKind};
pub use render::RenderContext;
pub use sync::ParamSync;

#[cfg(feature = "http")]
pub use loader::HttpFetcher;
