use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use taskwarden_core::error::{Result, TaskwardenError};

use super::edge::Edge;
use super::node::{Branch, Executor, PayloadKind};

/// Assembles and validates a [`WorkflowGraph`].
pub struct GraphBuilder {
    entry: String,
    nodes: Vec<Arc<dyn Executor>>,
    edges: Vec<Edge>,
    outputs: Vec<String>,
}

/// A validated, immutable workflow topology.
pub struct WorkflowGraph {
    entry: String,
    nodes: HashMap<String, Arc<dyn Executor>>,
    order: Vec<String>,
    edges: Vec<Edge>,
    outputs: HashSet<String>,
}

fn invalid(msg: impl Into<String>) -> TaskwardenError {
    TaskwardenError::InvalidGraph(msg.into())
}

impl GraphBuilder {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_node(self, node: impl Executor) -> Self {
        self.add_node_arc(Arc::new(node))
    }

    pub fn add_node_arc(mut self, node: Arc<dyn Executor>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }

    /// Validate the topology. Every failure is an `InvalidGraph` error.
    pub fn build(self) -> Result<WorkflowGraph> {
        let mut nodes: HashMap<String, Arc<dyn Executor>> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let id = node.id().to_string();
            if nodes.insert(id.clone(), node).is_some() {
                return Err(invalid(format!("duplicate node id '{}'", id)));
            }
            order.push(id);
        }

        let entry = nodes
            .get(&self.entry)
            .ok_or_else(|| invalid(format!("entry node '{}' is not in the graph", self.entry)))?;
        if !entry.accepts(PayloadKind::Question) {
            return Err(invalid(format!(
                "entry node '{}' does not accept a question",
                self.entry
            )));
        }

        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !nodes.contains_key(end) {
                    return Err(invalid(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, end
                    )));
                }
            }
        }

        let outputs: HashSet<String> = self.outputs.into_iter().collect();
        for id in &outputs {
            let node = nodes
                .get(id)
                .ok_or_else(|| invalid(format!("output node '{}' is not in the graph", id)))?;
            if node.output_kind() != PayloadKind::Final {
                return Err(invalid(format!(
                    "output node '{}' produces {}, not a final answer",
                    id,
                    node.output_kind()
                )));
            }
        }

        for id in &order {
            let node = &nodes[id];
            let outgoing: Vec<&Edge> = self.edges.iter().filter(|e| &e.from == id).collect();

            if outputs.contains(id) {
                if !outgoing.is_empty() {
                    return Err(invalid(format!("output node '{}' has outgoing edges", id)));
                }
                continue;
            }
            if outgoing.is_empty() {
                return Err(invalid(format!(
                    "node '{}' is neither an output nor has outgoing edges",
                    id
                )));
            }

            let kind = node.output_kind();
            for edge in &outgoing {
                let target = &nodes[&edge.to];
                if !target.accepts(kind) {
                    return Err(invalid(format!(
                        "edge {} -> {} carries {} but '{}' expects {}",
                        edge.from,
                        edge.to,
                        kind,
                        edge.to,
                        target.input_kind()
                    )));
                }
                if edge.condition.covered(kind).is_empty() {
                    return Err(invalid(format!(
                        "edge {} -> {} can never be taken by a {} value",
                        edge.from, edge.to, kind
                    )));
                }
            }
            check_branch_coverage(id, kind, &outgoing)?;
        }

        check_reachable(&self.entry, &order, &self.edges)?;
        check_acyclic(&order, &self.edges)?;

        debug!(
            entry = %self.entry,
            nodes = order.len(),
            edges = self.edges.len(),
            "Workflow graph built"
        );

        Ok(WorkflowGraph {
            entry: self.entry,
            nodes,
            order,
            edges: self.edges,
            outputs,
        })
    }
}

/// Each branch of `kind` must be taken by exactly one outgoing edge.
fn check_branch_coverage(id: &str, kind: PayloadKind, outgoing: &[&Edge]) -> Result<()> {
    let mut taken: HashMap<Branch, &str> = HashMap::new();
    for edge in outgoing {
        for branch in edge.condition.covered(kind) {
            if let Some(other) = taken.insert(branch, edge.to.as_str()) {
                return Err(invalid(format!(
                    "node '{}': branch {} goes to both '{}' and '{}'",
                    id, branch, other, edge.to
                )));
            }
        }
    }
    let missing: Vec<String> = kind
        .branches()
        .iter()
        .filter(|b| !taken.contains_key(*b))
        .map(|b| b.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(invalid(format!(
            "node '{}' has no edge for branch(es): {}",
            id,
            missing.join(", ")
        )));
    }
    Ok(())
}

fn check_reachable(entry: &str, order: &[String], edges: &[Edge]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::from([entry]);
    let mut queue: VecDeque<&str> = VecDeque::from([entry]);
    while let Some(id) = queue.pop_front() {
        for edge in edges.iter().filter(|e| e.from == id) {
            if seen.insert(edge.to.as_str()) {
                queue.push_back(edge.to.as_str());
            }
        }
    }
    match order.iter().find(|id| !seen.contains(id.as_str())) {
        Some(id) => Err(invalid(format!(
            "node '{}' is not reachable from '{}'",
            id, entry
        ))),
        None => Ok(()),
    }
}

fn check_acyclic(order: &[String], edges: &[Edge]) -> Result<()> {
    // Kahn's algorithm: whatever keeps a non-zero in-degree sits on a cycle.
    let mut in_degree: HashMap<&str, usize> = order.iter().map(|id| (id.as_str(), 0)).collect();
    for edge in edges {
        if let Some(d) = in_degree.get_mut(edge.to.as_str()) {
            *d += 1;
        }
    }
    let mut ready: VecDeque<&str> = order
        .iter()
        .map(|id| id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut visited = 0;
    while let Some(id) = ready.pop_front() {
        visited += 1;
        for edge in edges.iter().filter(|e| e.from == id) {
            if let Some(d) = in_degree.get_mut(edge.to.as_str()) {
                *d -= 1;
                if *d == 0 {
                    ready.push_back(edge.to.as_str());
                }
            }
        }
    }
    if visited == order.len() {
        return Ok(());
    }
    let mut looped: Vec<&str> = in_degree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(id, _)| id)
        .collect();
    looped.sort_unstable();
    Err(invalid(format!("cycle through: {}", looped.join(", "))))
}

impl WorkflowGraph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn Executor>> {
        self.nodes.get(id)
    }

    /// Node ids in the order they were added.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn outgoing<'a, 'b>(&'a self, id: &'b str) -> impl Iterator<Item = &'a Edge> + 'b
    where
        'a: 'b,
    {
        self.edges.iter().filter(move |e| e.from == id)
    }

    pub fn is_output(&self, id: &str) -> bool {
        self.outputs.contains(id)
    }

    pub fn outputs(&self) -> &HashSet<String> {
        &self.outputs
    }

    /// First edge out of `from` taken by `branch`, in declared order.
    pub fn route(&self, from: &str, branch: Branch) -> Result<&Edge> {
        self.edges
            .iter()
            .find(|e| e.from == from && e.condition.matches(branch))
            .ok_or_else(|| TaskwardenError::NoMatchingEdge {
                node: from.to_string(),
                branch: branch.to_string(),
            })
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .field("edges", &self.edges)
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::graph::executor::TurnContext;
    use crate::graph::node::NodeOutput;
    use taskwarden_core::error::ErrorKind;

    struct Stub {
        id: &'static str,
        input: PayloadKind,
        output: PayloadKind,
    }

    impl Executor for Stub {
        fn id(&self) -> &str {
            self.id
        }

        fn input_kind(&self) -> PayloadKind {
            self.input
        }

        fn output_kind(&self) -> PayloadKind {
            self.output
        }

        fn execute<'a>(
            &'a self,
            input: NodeOutput,
            _ctx: &'a mut TurnContext,
        ) -> BoxFuture<'a, Result<NodeOutput>> {
            Box::pin(async move { Ok(input) })
        }
    }

    fn stub(id: &'static str, input: PayloadKind, output: PayloadKind) -> Stub {
        Stub { id, input, output }
    }

    /// guard(Q->G) --threat--> reject(G->F)
    ///             --safe----> pass(G->Q) --> answer(Q->F)
    fn valid() -> GraphBuilder {
        GraphBuilder::new("guard")
            .add_node(stub("guard", PayloadKind::Question, PayloadKind::Guardian))
            .add_node(stub("reject", PayloadKind::Guardian, PayloadKind::Final))
            .add_node(stub("pass", PayloadKind::Guardian, PayloadKind::Question))
            .add_node(stub("answer", PayloadKind::Question, PayloadKind::Final))
            .add_edge(Edge::when("guard", "reject", Branch::Threat))
            .add_edge(Edge::when("guard", "pass", Branch::Safe))
            .add_edge(Edge::always("pass", "answer"))
            .with_outputs(["reject", "answer"])
    }

    fn build_err(builder: GraphBuilder) -> String {
        match builder.build() {
            Ok(_) => panic!("graph should be rejected"),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Configuration);
                e.to_string()
            }
        }
    }

    #[test]
    fn test_valid_graph_routes() {
        let graph = valid().build().unwrap();
        assert_eq!(graph.entry(), "guard");
        assert_eq!(graph.route("guard", Branch::Threat).unwrap().to, "reject");
        assert_eq!(graph.route("guard", Branch::Safe).unwrap().to, "pass");
        assert!(graph.is_output("answer"));
        assert!(matches!(
            graph.route("answer", Branch::Always),
            Err(TaskwardenError::NoMatchingEdge { .. })
        ));
    }

    #[test]
    fn test_routed_edge_outlives_lookup_key() {
        let graph = valid().build().unwrap();
        let edge = {
            let from = String::from("guard");
            graph.route(&from, Branch::Safe).unwrap()
        };
        assert_eq!(edge.to, "pass");
        assert_eq!(graph.outgoing("guard").count(), 2);
    }

    #[test]
    fn test_duplicate_node() {
        let msg = build_err(valid().add_node(stub("pass", PayloadKind::Question, PayloadKind::Final)));
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn test_missing_entry() {
        let msg = build_err(GraphBuilder::new("ghost").add_node(stub(
            "a",
            PayloadKind::Question,
            PayloadKind::Final,
        )));
        assert!(msg.contains("entry"));
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let msg = build_err(valid().add_edge(Edge::always("answer", "nowhere")));
        assert!(msg.contains("nowhere"));
    }

    #[test]
    fn test_non_exhaustive_branches() {
        let builder = GraphBuilder::new("guard")
            .add_node(stub("guard", PayloadKind::Question, PayloadKind::Guardian))
            .add_node(stub("reject", PayloadKind::Guardian, PayloadKind::Final))
            .add_edge(Edge::when("guard", "reject", Branch::Threat))
            .with_outputs(["reject"]);
        let msg = build_err(builder);
        assert!(msg.contains("safe"));
    }

    #[test]
    fn test_overlapping_branches() {
        let msg = build_err(valid().add_edge(Edge::always("guard", "reject")));
        assert!(msg.contains("both"));
    }

    #[test]
    fn test_kind_mismatch() {
        let builder = GraphBuilder::new("guard")
            .add_node(stub("guard", PayloadKind::Question, PayloadKind::Guardian))
            .add_node(stub("answer", PayloadKind::Question, PayloadKind::Final))
            .add_edge(Edge::always("guard", "answer"))
            .with_outputs(["answer"]);
        let msg = build_err(builder);
        assert!(msg.contains("expects"));
    }

    #[test]
    fn test_output_must_be_final_and_terminal() {
        let msg = build_err(valid().with_outputs(["pass"]));
        assert!(msg.contains("final answer"));

        let builder = GraphBuilder::new("a")
            .add_node(stub("a", PayloadKind::Question, PayloadKind::Final))
            .add_node(stub("b", PayloadKind::Final, PayloadKind::Final))
            .add_edge(Edge::always("a", "b"))
            .with_outputs(["a", "b"]);
        assert!(build_err(builder).contains("outgoing"));
    }

    #[test]
    fn test_dangling_internal_node() {
        let builder = GraphBuilder::new("a")
            .add_node(stub("a", PayloadKind::Question, PayloadKind::Question))
            .with_outputs(Vec::<String>::new());
        assert!(build_err(builder).contains("neither"));
    }

    #[test]
    fn test_unreachable_node() {
        let msg = build_err(
            valid()
                .add_node(stub("island", PayloadKind::Question, PayloadKind::Final))
                .with_outputs(["island"]),
        );
        assert!(msg.contains("island"));
    }

    #[test]
    fn test_cycle_rejected() {
        let builder = GraphBuilder::new("a")
            .add_node(stub("a", PayloadKind::Question, PayloadKind::Question))
            .add_node(stub("b", PayloadKind::Question, PayloadKind::Question))
            .add_edge(Edge::always("a", "b"))
            .add_edge(Edge::always("b", "a"));
        assert!(build_err(builder).contains("cycle"));
    }
}
