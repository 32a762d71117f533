//! Live parameter sync: pushes node data edits into a playing graph.

use hashbrown::HashMap;
use tracing::trace;

use crate::compiler::{CompiledGraph, GraphState};
use crate::kind::SAMPLE_KEY;
use crate::patch::{NodeData, NodeMap};

/// Diffs node data between observations and applies what changed.
///
/// Continuous parameters glide to their new value (an exponential approach
/// with `time_constant` seconds, anchored at the context's current time);
/// discrete properties are assigned immediately. Values equal to what the
/// primitive already holds are skipped.
#[derive(Debug)]
pub struct ParamSync {
    time_constant: f64,
    seen: HashMap<String, NodeData>,
}

impl ParamSync {
    pub fn new(time_constant: f64) -> Self {
        Self {
            time_constant,
            seen: HashMap::new(),
        }
    }

    pub fn time_constant(&self) -> f64 {
        self.time_constant
    }

    /// Forgets every observation; the next one compares against the
    /// primitives alone.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// Applies the data that changed since the last observation. Returns the
    /// number of updates issued. Does nothing unless `graph` is playing.
    pub fn observe(&mut self, graph: &CompiledGraph, nodes: &NodeMap) -> usize {
        if graph.state() != GraphState::Playing {
            return 0;
        }

        let ctx = graph.context();
        let now = ctx.current_time();
        let mut applied = 0;

        for (node_id, node) in nodes {
            let Some(instance) = graph.instance(node_id) else {
                continue;
            };
            let previous = self.seen.get(node_id);

            for (key, value) in &node.data {
                if key == SAMPLE_KEY || previous.and_then(|p| p.get(key)) == Some(value) {
                    continue;
                }

                if ctx.has_param(instance.id, key) {
                    let Some(target) = value.as_number().map(|n| n as f32) else {
                        trace!(node = %node_id, %key, %value, "non-numeric value for parameter");
                        continue;
                    };
                    if ctx.param_value(instance.id, key) == Some(target) {
                        continue;
                    }
                    match ctx.set_target_at_time(instance.id, key, target, now, self.time_constant) {
                        Ok(()) => {
                            trace!(node = %node_id, %key, target, "parameter glide");
                            applied += 1;
                        }
                        Err(e) => trace!(node = %node_id, %key, error = %e, "parameter not updated"),
                    }
                } else {
                    if ctx.property(instance.id, key).as_ref() == Some(value) {
                        continue;
                    }
                    match ctx.set_property(instance.id, key, value.clone()) {
                        Ok(()) => {
                            trace!(node = %node_id, %key, %value, "property set");
                            applied += 1;
                        }
                        Err(e) => trace!(node = %node_id, %key, error = %e, "property not updated"),
                    }
                }
            }

            self.seen.insert(node_id.clone(), node.data.clone());
        }

        self.seen.retain(|id, _| nodes.contains_key(id));
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::GraphCompiler;
    use crate::context::AudioContext;
    use crate::loader::{BufferLoader, FileFetcher, SampleSources};
    use crate::patch::{Connection, GraphNode, Value};
    use crate::registry::NodeRegistry;
    use crate::render::RenderContext;
    use std::rc::Rc;

    fn setup() -> (Rc<RenderContext>, CompiledGraph, NodeMap) {
        let ctx = Rc::new(RenderContext::new(48_000));
        let compiler = GraphCompiler::new(
            Rc::new(NodeRegistry::with_builtins()),
            Rc::new(BufferLoader::new(SampleSources::new(), FileFetcher)),
        );
        let osc = GraphNode::new("osc", "Oscillator")
            .with("frequency", 440.0)
            .with("type", "sine");
        let destination = GraphNode::new("destination", "AudioDestination");
        let nodes: NodeMap = [("osc".to_owned(), osc), ("destination".to_owned(), destination)].into();
        let connections = [Connection::between("osc", "output", "destination", "input")];
        let graph = compiler.compile(&nodes, &connections, ctx.clone());
        (ctx, graph, nodes)
    }

    #[tokio::test]
    async fn only_acts_while_playing() {
        let (_ctx, graph, mut nodes) = setup();
        let mut sync = ParamSync::new(0.015);
        nodes.get_mut("osc").unwrap().data.insert("frequency".into(), Value::Number(880.0));
        assert_eq!(sync.observe(&graph, &nodes), 0);
    }

    #[tokio::test]
    async fn unchanged_data_issues_nothing() {
        let (_ctx, graph, nodes) = setup();
        graph.play(0.0).await.unwrap();
        let mut sync = ParamSync::new(0.015);
        assert_eq!(sync.observe(&graph, &nodes), 0);
        assert_eq!(sync.observe(&graph, &nodes), 0);
    }

    #[tokio::test]
    async fn params_glide_and_properties_jump() {
        let (ctx, graph, mut nodes) = setup();
        graph.play(0.0).await.unwrap();
        let id = graph.instance("osc").unwrap().id;
        let mut sync = ParamSync::new(0.015);
        sync.observe(&graph, &nodes);

        let data = &mut nodes.get_mut("osc").unwrap().data;
        data.insert("frequency".into(), Value::Number(880.0));
        data.insert("type".into(), Value::from("square"));
        assert_eq!(sync.observe(&graph, &nodes), 2);

        // the property is immediate, the parameter is still on its way
        assert_eq!(ctx.property(id, "type"), Some(Value::from("square")));
        assert_eq!(ctx.param_value(id, "frequency"), Some(440.0));
        for _ in 0..200 {
            ctx.render_block();
        }
        assert_eq!(ctx.param_value(id, "frequency"), Some(880.0));

        // same data again: nothing to do
        assert_eq!(sync.observe(&graph, &nodes), 0);
    }
}
