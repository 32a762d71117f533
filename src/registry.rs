//! Node type registry: what node types exist, what sockets and parameters
//! they declare, and how each one becomes a runtime primitive.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::kind::NodeKind;
use crate::patch::{GraphNode, NodeData, Value};

/// Whether a socket carries an audio-rate signal or targets a control parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Audio,
    Param,
}

/// A named connection point on a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Socket {
    pub name: &'static str,
    pub kind: SocketKind,
}

impl Socket {
    pub const fn audio(name: &'static str) -> Self {
        Self { name, kind: SocketKind::Audio }
    }

    pub const fn param(name: &'static str) -> Self {
        Self { name, kind: SocketKind::Param }
    }
}

/// A user-adjustable parameter and its editing affordance.
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterSpec {
    Slider {
        name: &'static str,
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    },
    Selector {
        name: &'static str,
        options: Vec<String>,
        default: String,
    },
    Url {
        name: &'static str,
        default: String,
    },
}

impl ParameterSpec {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterSpec::Slider { name, .. }
            | ParameterSpec::Selector { name, .. }
            | ParameterSpec::Url { name, .. } => name,
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            ParameterSpec::Slider { default, .. } => Value::Number(*default),
            ParameterSpec::Selector { default, .. } | ParameterSpec::Url { default, .. } => {
                Value::Text(default.clone())
            }
        }
    }
}

/// Pure per-node compute stub. Label nodes use it to publish a value (such as
/// a sample key) on one of their outputs.
pub type ComputeFn = fn(&GraphNode) -> BTreeMap<String, String>;

fn compute_nothing(_: &GraphNode) -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Everything the registry knows about one node type.
#[derive(Clone, Debug)]
pub struct NodeDescriptor {
    pub type_name: &'static str,
    pub inputs: Vec<Socket>,
    pub outputs: Vec<Socket>,
    pub parameters: Vec<ParameterSpec>,
    pub compute: ComputeFn,
    /// How to instantiate the node. `None` for label-only helper types.
    pub kind: Option<NodeKind>,
}

impl NodeDescriptor {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            compute: compute_nothing,
            kind: None,
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = Socket>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = Socket>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_compute(mut self, compute: ComputeFn) -> Self {
        self.compute = compute;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<NodeKind>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn input(&self, name: &str) -> Option<&Socket> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Socket> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    /// Data for a freshly created node: every parameter at its default.
    pub fn default_data(&self) -> NodeData {
        self.parameters
            .iter()
            .map(|p| (p.name().to_owned(), p.default_value()))
            .collect()
    }
}

/// Type name → descriptor. Filled once at startup, read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    descriptors: HashMap<&'static str, NodeDescriptor>,
    /// Registration order, for listing.
    order: Vec<&'static str>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `descriptor`, replacing any previous entry with the same type name.
    pub fn register(&mut self, descriptor: NodeDescriptor) {
        let name = descriptor.type_name;
        if self.descriptors.insert(name, descriptor).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&NodeDescriptor> {
        self.descriptors.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.descriptors.contains_key(type_name)
    }

    /// Registered type names, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
