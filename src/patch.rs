//! The user-authored graph: nodes, their parameter data and the connections
//! between their sockets.
//!
//! [`Patch`] is the smallest owner of that data that upholds the node
//! lifecycle rules (seeded defaults, ids that are never reused, cascading
//! deletes, an undeletable destination). Editors may keep their own store and
//! hand the compiler a [`NodeMap`] and connection list directly instead.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::GraphError;
use crate::registry::NodeRegistry;

/// Id of the destination node every [`Patch`] starts with.
pub const DESTINATION_ID: &str = "destination";

/// Type name of the destination node.
pub const DESTINATION_TYPE: &str = "AudioDestination";

/// A parameter value as held in a node's data.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value. Numeric strings are accepted; non-finite
    /// numbers are not.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Number(_) => None,
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Parameter name → current value.
pub type NodeData = BTreeMap<String, Value>;

/// A node placed in the editor.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub type_name: String,
    pub position: (f32, f32),
    pub data: NodeData,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            position: (0.0, 0.0),
            data: NodeData::new(),
        }
    }

    /// Builder-style helper for setting one data entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// One end of a connection: a socket on a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node_id: String,
    pub socket: String,
}

impl Endpoint {
    pub fn new(node_id: impl Into<String>, socket: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            socket: socket.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.socket)
    }
}

/// A directed edge from an output socket to an input socket.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl Connection {
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self { from, to }
    }

    /// Shorthand for `from_node.from_socket -> to_node.to_socket`.
    pub fn between(
        from_node: impl Into<String>,
        from_socket: impl Into<String>,
        to_node: impl Into<String>,
        to_socket: impl Into<String>,
    ) -> Self {
        Self::new(
            Endpoint::new(from_node, from_socket),
            Endpoint::new(to_node, to_socket),
        )
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.from.node_id == node_id || self.to.node_id == node_id
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Node id → node.
pub type NodeMap = BTreeMap<String, GraphNode>;

/// A single parameter edit coming from the editing surface.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDataUpdate {
    pub node_id: String,
    pub key: String,
    pub value: Value,
}

/// Nodes plus connections, with the lifecycle rules of the editor store.
#[derive(Clone, Debug)]
pub struct Patch {
    nodes: NodeMap,
    connections: Vec<Connection>,
    next_id: u64,
}

impl Default for Patch {
    fn default() -> Self {
        Self::new()
    }
}

impl Patch {
    /// An empty patch holding only the destination node.
    pub fn new() -> Self {
        let mut nodes = NodeMap::new();
        nodes.insert(
            DESTINATION_ID.to_owned(),
            GraphNode::new(DESTINATION_ID, DESTINATION_TYPE),
        );
        Self {
            nodes,
            connections: Vec::new(),
            next_id: 1,
        }
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Adds a node of `type_name`, seeding its data from the type's parameter
    /// defaults. Returns the new id.
    pub fn add_node(
        &mut self,
        registry: &NodeRegistry,
        type_name: &str,
        position: (f32, f32),
    ) -> Result<String, GraphError> {
        let descriptor = registry
            .get(type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(type_name.to_owned()))?;

        let id = loop {
            let candidate = format!("{type_name}_{}", self.next_id);
            self.next_id += 1;
            if !self.nodes.contains_key(&candidate) {
                break candidate;
            }
        };

        let node = GraphNode {
            id: id.clone(),
            type_name: type_name.to_owned(),
            position,
            data: descriptor.default_data(),
        };
        debug!(node = %id, "added node");
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Removes a node and every connection referencing it.
    pub fn remove_node(&mut self, id: &str) -> Result<GraphNode, GraphError> {
        if id == DESTINATION_ID {
            return Err(GraphError::DestinationNotRemovable);
        }
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_owned()))?;
        let before = self.connections.len();
        self.connections.retain(|c| !c.touches(id));
        debug!(node = %id, dropped = before - self.connections.len(), "removed node");
        Ok(node)
    }

    pub fn set_position(&mut self, id: &str, x: f32, y: f32) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_owned()))?;
        node.position = (x, y);
        Ok(())
    }

    pub fn update_node_data(&mut self, update: NodeDataUpdate) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&update.node_id)
            .ok_or_else(|| GraphError::UnknownNode(update.node_id.clone()))?;
        node.data.insert(update.key, update.value);
        Ok(())
    }

    /// Connects an output socket to an input socket, checking both against
    /// the registry. Adding an identical connection twice is a no-op.
    pub fn connect(
        &mut self,
        registry: &NodeRegistry,
        from: Endpoint,
        to: Endpoint,
    ) -> Result<(), GraphError> {
        let invalid = |reason: String| GraphError::InvalidConnection {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let from_node = self
            .nodes
            .get(&from.node_id)
            .ok_or_else(|| GraphError::UnknownNode(from.node_id.clone()))?;
        let to_node = self
            .nodes
            .get(&to.node_id)
            .ok_or_else(|| GraphError::UnknownNode(to.node_id.clone()))?;

        let from_desc = registry
            .get(&from_node.type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(from_node.type_name.clone()))?;
        let to_desc = registry
            .get(&to_node.type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(to_node.type_name.clone()))?;

        if from_desc.output(&from.socket).is_none() {
            return Err(invalid(format!(
                "`{}` has no output `{}`",
                from_desc.type_name, from.socket
            )));
        }
        if to_desc.input(&to.socket).is_none() {
            return Err(invalid(format!(
                "`{}` has no input `{}`",
                to_desc.type_name, to.socket
            )));
        }

        self.push_connection(Connection::new(from, to));
        Ok(())
    }

    /// Inserts a connection without validation.
    pub fn push_connection(&mut self, connection: Connection) {
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != connection);
        before != self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NodeRegistry {
        NodeRegistry::with_builtins()
    }

    #[test]
    fn new_patch_has_only_destination() {
        let patch = Patch::new();
        assert_eq!(patch.nodes().len(), 1);
        assert_eq!(patch.node(DESTINATION_ID).unwrap().type_name, DESTINATION_TYPE);
    }

    #[test]
    fn add_node_seeds_defaults() {
        let mut patch = Patch::new();
        let id = patch.add_node(&registry(), "Oscillator", (10.0, 20.0)).unwrap();
        let node = patch.node(&id).unwrap();
        assert_eq!(node.position, (10.0, 20.0));
        assert_eq!(node.data.get("frequency"), Some(&Value::Number(440.0)));
        assert_eq!(node.data.get("type"), Some(&Value::Text("sine".into())));
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let reg = registry();
        let mut patch = Patch::new();
        let a = patch.add_node(&reg, "Gain", (0.0, 0.0)).unwrap();
        patch.remove_node(&a).unwrap();
        let b = patch.add_node(&reg, "Gain", (0.0, 0.0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut patch = Patch::new();
        assert_eq!(
            patch.add_node(&registry(), "Theremin", (0.0, 0.0)),
            Err(GraphError::UnknownNodeType("Theremin".into()))
        );
    }

    #[test]
    fn remove_cascades_connections() {
        let reg = registry();
        let mut patch = Patch::new();
        let osc = patch.add_node(&reg, "Oscillator", (0.0, 0.0)).unwrap();
        let gain = patch.add_node(&reg, "Gain", (0.0, 0.0)).unwrap();
        patch
            .connect(&reg, Endpoint::new(&osc, "output"), Endpoint::new(&gain, "input"))
            .unwrap();
        patch
            .connect(&reg, Endpoint::new(&gain, "output"), Endpoint::new(DESTINATION_ID, "input"))
            .unwrap();

        patch.remove_node(&gain).unwrap();
        assert!(patch.connections().is_empty());
        assert!(patch.node(&osc).is_some());
    }

    #[test]
    fn destination_cannot_be_removed() {
        let mut patch = Patch::new();
        assert_eq!(
            patch.remove_node(DESTINATION_ID),
            Err(GraphError::DestinationNotRemovable)
        );
    }

    #[test]
    fn connect_checks_socket_direction() {
        let reg = registry();
        let mut patch = Patch::new();
        let osc = patch.add_node(&reg, "Oscillator", (0.0, 0.0)).unwrap();
        let gain = patch.add_node(&reg, "Gain", (0.0, 0.0)).unwrap();

        // input -> output is backwards
        let err = patch
            .connect(&reg, Endpoint::new(&gain, "input"), Endpoint::new(&osc, "output"))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidConnection { .. }));

        // duplicates collapse
        for _ in 0..2 {
            patch
                .connect(&reg, Endpoint::new(&osc, "output"), Endpoint::new(&gain, "input"))
                .unwrap();
        }
        assert_eq!(patch.connections().len(), 1);
    }

    #[test]
    fn data_updates_apply_in_place() {
        let reg = registry();
        let mut patch = Patch::new();
        let gain = patch.add_node(&reg, "Gain", (0.0, 0.0)).unwrap();
        patch
            .update_node_data(NodeDataUpdate {
                node_id: gain.clone(),
                key: "gain".into(),
                value: Value::Number(0.5),
            })
            .unwrap();
        patch.set_position(&gain, 3.0, 4.0).unwrap();
        let node = patch.node(&gain).unwrap();
        assert_eq!(node.data["gain"], Value::Number(0.5));
        assert_eq!(node.position, (3.0, 4.0));
    }

    #[test]
    fn numeric_strings_coerce() {
        assert_eq!(Value::from("0.25").as_number(), Some(0.25));
        assert_eq!(Value::from("sine").as_number(), None);
        assert_eq!(Value::Number(f64::NAN).as_number(), None);
    }
}
