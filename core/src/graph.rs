use crate::span::{Span, SpanStatus, Trace};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Namespace for deriving node ids from span ids (UUIDv5)
const NODE_NAMESPACE: Uuid = Uuid::from_u128(0x6a3f_5c1e_92d4_4b7a_8e10_f2c4_9d37_b615);

/// Relationship carried by an edge between two spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    ControlFlow,      // child completed without error
    ErrorPropagation, // child span is error/critical
}

/// Directed parent -> child edge in the causal graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalEdge {
    pub id: Uuid,
    pub source: Uuid,
    pub target: Uuid,
    pub kind: EdgeKind,
    /// child start - parent end, negative when the child overlaps its parent
    pub latency_ms: i64,
}

/// Node in the causal graph, one per ingested span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalNode {
    pub id: Uuid,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub category: String,
    pub agent_id: String,
    pub domain: String,
    pub status: SpanStatus,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: u64,
    pub parents: Vec<Uuid>,
    pub children: Vec<Uuid>,
    pub depth: usize,
    pub is_root_cause: bool,
    pub root_cause_probability: f64,
}

impl CausalNode {
    fn from_span(span: &Span) -> Self {
        Self {
            id: CausalGraph::node_id_for_span(&span.id),
            span_id: span.id.clone(),
            parent_span_id: span.parent_id.clone(),
            name: span.name.clone(),
            category: span.category.clone(),
            agent_id: span.agent_id.clone(),
            domain: span.domain.clone(),
            status: span.status,
            start_ms: span.start_ms,
            end_ms: span.end_ms,
            duration_ms: span.duration_ms,
            parents: Vec::new(),
            children: Vec::new(),
            depth: 0,
            is_root_cause: false,
            root_cause_probability: 0.0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }
}

/// What a single ingestion changed structurally
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    pub new_nodes: usize,
    pub new_edges: usize,
    /// Span ids whose declared parent is not in the graph
    pub orphans: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub error_nodes: usize,
    pub root_causes: usize,
    pub impacted_nodes: usize,
    pub critical_path_length: usize,
    pub max_depth: usize,
    pub has_cycles: bool,
}

/// Serializable view of the graph handed to report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<CausalNode>,
    pub edges: Vec<CausalEdge>,
    pub root_causes: Vec<Uuid>,
    pub impacted_nodes: Vec<Uuid>,
    pub critical_path: Vec<Uuid>,
}

/// The causal graph of one session, grown across every ingested trace.
///
/// Structure lives in a petgraph `DiGraph`; span and node ids are resolved
/// through index maps. Derived data (depth, root causes, critical path,
/// impacted set) is recomputed over the whole graph after each ingestion.
#[derive(Debug, Clone, Default)]
pub struct CausalGraph {
    graph: DiGraph<CausalNode, CausalEdge>,
    span_index: HashMap<String, NodeIndex>,
    node_index: HashMap<Uuid, NodeIndex>,
    root_causes: Vec<Uuid>,
    impacted_nodes: HashSet<Uuid>,
    critical_path: Vec<Uuid>,
}

impl CausalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable node id for a span id
    pub fn node_id_for_span(span_id: &str) -> Uuid {
        Uuid::new_v5(&NODE_NAMESPACE, span_id.as_bytes())
    }

    /// Merge a trace into the graph and re-run the analysis over everything
    pub fn ingest_trace(&mut self, trace: &Trace) -> IngestSummary {
        let summary = self.ingest_spans(&trace.spans);
        tracing::debug!(
            trace_id = %trace.trace_id,
            new_nodes = summary.new_nodes,
            new_edges = summary.new_edges,
            orphans = summary.orphans.len(),
            "Merged trace into causal graph"
        );
        summary
    }

    /// Merge spans into the graph. Nodes are created for the whole batch
    /// before any edge, so parent order inside the batch does not matter.
    pub fn ingest_spans(&mut self, spans: &[Span]) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for span in spans {
            if self.add_span(span) {
                summary.new_nodes += 1;
            }
        }

        for span in spans {
            match self.link_to_parent(&span.id) {
                LinkOutcome::Created => summary.new_edges += 1,
                LinkOutcome::MissingParent => summary.orphans.push(span.id.clone()),
                LinkOutcome::Existing | LinkOutcome::NoParent => {}
            }
        }

        self.analyze();
        summary
    }

    /// Create the node for a span. Returns false if the span is already present.
    fn add_span(&mut self, span: &Span) -> bool {
        if self.span_index.contains_key(&span.id) {
            return false;
        }

        let node = CausalNode::from_span(span);
        let node_id = node.id;
        let idx = self.graph.add_node(node);
        self.span_index.insert(span.id.clone(), idx);
        self.node_index.insert(node_id, idx);
        true
    }

    /// Connect a span's node to its parent's node. The parent recorded at
    /// node creation is used, since spans are immutable once ingested.
    fn link_to_parent(&mut self, span_id: &str) -> LinkOutcome {
        let Some(&child_idx) = self.span_index.get(span_id) else {
            return LinkOutcome::NoParent;
        };
        let Some(parent_span_id) = self.graph[child_idx].parent_span_id.clone() else {
            return LinkOutcome::NoParent;
        };
        if parent_span_id == span_id {
            return LinkOutcome::MissingParent;
        }
        let Some(&parent_idx) = self.span_index.get(&parent_span_id) else {
            return LinkOutcome::MissingParent;
        };

        if self.graph.find_edge(parent_idx, child_idx).is_some() {
            return LinkOutcome::Existing;
        }

        let parent_id = self.graph[parent_idx].id;
        let child_id = self.graph[child_idx].id;
        let kind = if self.graph[child_idx].is_error() {
            EdgeKind::ErrorPropagation
        } else {
            EdgeKind::ControlFlow
        };
        let latency_ms = self.graph[child_idx].start_ms - self.graph[parent_idx].end_ms;

        self.graph.add_edge(
            parent_idx,
            child_idx,
            CausalEdge {
                id: Uuid::new_v4(),
                source: parent_id,
                target: child_id,
                kind,
                latency_ms,
            },
        );
        self.graph[parent_idx].children.push(child_id);
        self.graph[child_idx].parents.push(parent_id);

        LinkOutcome::Created
    }

    /// Recompute depth, root causes, probabilities, critical path and impact
    pub fn analyze(&mut self) {
        self.compute_depths();
        self.identify_root_causes();
        self.score_root_causes();
        self.compute_critical_path();
        self.compute_impacted_nodes();
    }

    /// Multi-seed BFS from every parentless node
    fn compute_depths(&mut self) {
        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();

        for idx in self.graph.node_indices() {
            self.graph[idx].depth = 0;
            if self.graph[idx].parents.is_empty() {
                visited.insert(idx);
                queue.push_back(idx);
            }
        }

        while let Some(idx) = queue.pop_front() {
            let depth = self.graph[idx].depth;
            let children = self.child_indices(idx);
            for child in children {
                if visited.insert(child) {
                    self.graph[child].depth = depth + 1;
                    queue.push_back(child);
                }
            }
        }
    }

    /// A root cause is an error node with no error parent
    fn identify_root_causes(&mut self) {
        let mut root_causes = Vec::new();

        for idx in self.graph.node_indices() {
            let qualifies = self.graph[idx].is_error()
                && self
                    .parent_indices(idx)
                    .into_iter()
                    .all(|parent| !self.graph[parent].is_error());
            self.graph[idx].is_root_cause = qualifies;
            if qualifies {
                root_causes.push(self.graph[idx].id);
            }
        }

        self.root_causes = root_causes;
    }

    fn score_root_causes(&mut self) {
        let total_errors = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].is_error())
            .count();

        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for idx in indices {
            let probability = if !self.graph[idx].is_error() {
                0.0
            } else if self.graph[idx].is_root_cause {
                let descendant_errors = self
                    .descendant_indices(idx)
                    .into_iter()
                    .filter(|&d| self.graph[d].is_error())
                    .count();
                0.5 + 0.5 * (descendant_errors as f64 / total_errors.max(1) as f64)
            } else {
                let parents = self.parent_indices(idx);
                let error_parents = parents
                    .iter()
                    .filter(|&&p| self.graph[p].is_error())
                    .count();
                let error_parent_fraction = if parents.is_empty() {
                    0.0
                } else {
                    error_parents as f64 / parents.len() as f64
                };
                0.1 * (1.0 - error_parent_fraction)
            };
            self.graph[idx].root_cause_probability = probability.clamp(0.0, 1.0);
        }
    }

    /// Longest all-error path starting at any root cause; first found wins ties
    fn compute_critical_path(&mut self) {
        let mut best: Vec<NodeIndex> = Vec::new();

        for root_id in &self.root_causes {
            let Some(&root_idx) = self.node_index.get(root_id) else {
                continue;
            };
            let mut on_path = HashSet::new();
            let candidate = self.longest_error_path(root_idx, &mut on_path);
            if candidate.len() > best.len() {
                best = candidate;
            }
        }

        self.critical_path = best.into_iter().map(|idx| self.graph[idx].id).collect();
    }

    fn longest_error_path(
        &self,
        idx: NodeIndex,
        on_path: &mut HashSet<NodeIndex>,
    ) -> Vec<NodeIndex> {
        on_path.insert(idx);

        let mut longest_tail: Vec<NodeIndex> = Vec::new();
        for child in self.child_indices(idx) {
            if !self.graph[child].is_error() || on_path.contains(&child) {
                continue;
            }
            let tail = self.longest_error_path(child, on_path);
            if tail.len() > longest_tail.len() {
                longest_tail = tail;
            }
        }

        on_path.remove(&idx);

        let mut path = Vec::with_capacity(longest_tail.len() + 1);
        path.push(idx);
        path.extend(longest_tail);
        path
    }

    fn compute_impacted_nodes(&mut self) {
        let mut impacted = HashSet::new();

        for root_id in &self.root_causes {
            if let Some(&root_idx) = self.node_index.get(root_id) {
                for idx in self.descendant_indices(root_idx) {
                    impacted.insert(self.graph[idx].id);
                }
            }
        }

        self.impacted_nodes = impacted;
    }

    /// Every node reachable from `idx`, excluding `idx` itself
    fn descendant_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut dfs = Dfs::new(&self.graph, idx);
        let mut descendants = Vec::new();
        while let Some(next) = dfs.next(&self.graph) {
            if next != idx {
                descendants.push(next);
            }
        }
        descendants
    }

    /// Children in the order their edges were created
    fn child_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph[idx]
            .children
            .iter()
            .filter_map(|id| self.node_index.get(id).copied())
            .collect()
    }

    fn parent_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph[idx]
            .parents
            .iter()
            .filter_map(|id| self.node_index.get(id).copied())
            .collect()
    }

    pub fn contains_span(&self, span_id: &str) -> bool {
        self.span_index.contains_key(span_id)
    }

    pub fn node(&self, node_id: Uuid) -> Option<&CausalNode> {
        self.node_index.get(&node_id).map(|&idx| &self.graph[idx])
    }

    pub fn node_by_span(&self, span_id: &str) -> Option<&CausalNode> {
        self.span_index.get(span_id).map(|&idx| &self.graph[idx])
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &CausalNode> {
        self.graph.node_weights()
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &CausalEdge> {
        self.graph.edge_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn root_causes(&self) -> &[Uuid] {
        &self.root_causes
    }

    pub fn critical_path(&self) -> &[Uuid] {
        &self.critical_path
    }

    pub fn impacted_nodes(&self) -> &HashSet<Uuid> {
        &self.impacted_nodes
    }

    /// Downstream blast radius of a single node
    pub fn descendants(&self, node_id: Uuid) -> Vec<Uuid> {
        match self.node_index.get(&node_id) {
            Some(&idx) => self
                .descendant_indices(idx)
                .into_iter()
                .map(|d| self.graph[d].id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Detect cycles in the graph (construction should never produce one)
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            error_nodes: self.nodes().filter(|node| node.is_error()).count(),
            root_causes: self.root_causes.len(),
            impacted_nodes: self.impacted_nodes.len(),
            critical_path_length: self.critical_path.len(),
            max_depth: self.nodes().map(|node| node.depth).max().unwrap_or(0),
            has_cycles: self.has_cycles(),
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes().cloned().collect(),
            edges: self.edges().cloned().collect(),
            root_causes: self.root_causes.clone(),
            impacted_nodes: self
                .nodes()
                .filter(|node| self.impacted_nodes.contains(&node.id))
                .map(|node| node.id)
                .collect(),
            critical_path: self.critical_path.clone(),
        }
    }
}

enum LinkOutcome {
    Created,
    Existing,
    NoParent,
    MissingParent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, parent: Option<&str>, status: SpanStatus) -> Span {
        Span::new(id, parent.map(str::to_string), id, 0, 10, status)
    }

    fn error_chain(len: usize) -> Vec<Span> {
        (0..len)
            .map(|i| {
                let parent = if i == 0 { None } else { Some(format!("e{}", i - 1)) };
                let start_ms = i as i64 * 10;
                Span::new(format!("e{i}"), parent, "step", start_ms, 10, SpanStatus::Error)
            })
            .collect()
    }

    fn node_id(span_id: &str) -> Uuid {
        CausalGraph::node_id_for_span(span_id)
    }

    #[test]
    fn test_ingest_creates_nodes_and_edges() {
        let mut graph = CausalGraph::new();
        let summary = graph.ingest_spans(&[
            span("root", None, SpanStatus::Ok),
            span("a", Some("root"), SpanStatus::Ok),
            span("b", Some("root"), SpanStatus::Warning),
        ]);

        assert_eq!(summary.new_nodes, 3);
        assert_eq!(summary.new_edges, 2);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);

        let root = graph.node_by_span("root").unwrap();
        assert_eq!(root.children, vec![node_id("a"), node_id("b")]);
        assert_eq!(graph.node_by_span("a").unwrap().parents, vec![root.id]);
        assert!(graph.edges().all(|edge| edge.kind == EdgeKind::ControlFlow));
    }

    #[test]
    fn reingesting_same_spans_is_noop() {
        let mut graph = CausalGraph::new();
        let spans = vec![
            span("root", None, SpanStatus::Ok),
            span("child", Some("root"), SpanStatus::Error),
        ];

        graph.ingest_spans(&spans);
        let summary = graph.ingest_spans(&spans);

        assert_eq!(summary.new_nodes, 0);
        assert_eq!(summary.new_edges, 0);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn child_before_parent_in_trace_is_still_linked() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[
            span("child", Some("root"), SpanStatus::Ok),
            span("root", None, SpanStatus::Ok),
        ]);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_by_span("child").unwrap().depth, 1);
    }

    #[test]
    fn missing_parent_leaves_orphan_without_edge() {
        let mut graph = CausalGraph::new();
        let summary = graph.ingest_spans(&[span("lost", Some("nowhere"), SpanStatus::Error)]);

        assert_eq!(summary.orphans, vec!["lost".to_string()]);
        assert_eq!(graph.edge_count(), 0);
        // an orphaned error node has no parents, so it is a root cause
        assert_eq!(graph.root_causes(), &[node_id("lost")]);
    }

    #[test]
    fn edge_records_kind_and_latency() {
        let mut graph = CausalGraph::new();
        let parent = Span::new("p", None, "plan", 1_000, 200, SpanStatus::Ok);
        let child = Span::new("c", Some("p".into()), "act", 1_250, 50, SpanStatus::Critical);
        graph.ingest_spans(&[parent, child]);

        let edge = graph.edges().next().unwrap();
        assert_eq!(edge.kind, EdgeKind::ErrorPropagation);
        assert_eq!(edge.latency_ms, 50);
        assert_eq!(edge.source, node_id("p"));
        assert_eq!(edge.target, node_id("c"));
    }

    #[test]
    fn depths_follow_bfs_layers() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[
            span("r1", None, SpanStatus::Ok),
            span("a", Some("r1"), SpanStatus::Ok),
            span("b", Some("a"), SpanStatus::Ok),
            span("r2", None, SpanStatus::Ok),
            span("c", Some("r2"), SpanStatus::Ok),
        ]);

        assert_eq!(graph.node_by_span("r1").unwrap().depth, 0);
        assert_eq!(graph.node_by_span("a").unwrap().depth, 1);
        assert_eq!(graph.node_by_span("b").unwrap().depth, 2);
        assert_eq!(graph.node_by_span("r2").unwrap().depth, 0);
        assert_eq!(graph.node_by_span("c").unwrap().depth, 1);
        assert_eq!(graph.stats().max_depth, 2);
    }

    #[test]
    fn error_chain_has_single_root_cause_and_full_critical_path() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&error_chain(3));

        assert_eq!(graph.root_causes(), &[node_id("e0")]);
        assert_eq!(
            graph.critical_path(),
            &[node_id("e0"), node_id("e1"), node_id("e2")]
        );

        // consequences of the root cause score zero
        assert_eq!(graph.node_by_span("e1").unwrap().root_cause_probability, 0.0);
        assert!(!graph.node_by_span("e2").unwrap().is_root_cause);
    }

    #[test]
    fn ok_sibling_leaf_does_not_lengthen_critical_path() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&error_chain(3));
        graph.ingest_spans(&[span("ok-leaf", Some("e1"), SpanStatus::Ok)]);

        assert_eq!(graph.critical_path().len(), 3);
        assert!(graph.impacted_nodes().contains(&node_id("ok-leaf")));
    }

    #[test]
    fn critical_path_prefers_longer_error_branch() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[
            span("root", None, SpanStatus::Error),
            span("short", Some("root"), SpanStatus::Error),
            span("long-1", Some("root"), SpanStatus::Error),
            span("long-2", Some("long-1"), SpanStatus::Critical),
        ]);

        assert_eq!(
            graph.critical_path(),
            &[node_id("root"), node_id("long-1"), node_id("long-2")]
        );
    }

    #[test]
    fn critical_path_tie_keeps_first_discovered() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[
            span("first", None, SpanStatus::Error),
            span("first-child", Some("first"), SpanStatus::Error),
            span("second", None, SpanStatus::Error),
            span("second-child", Some("second"), SpanStatus::Error),
        ]);

        assert_eq!(
            graph.critical_path(),
            &[node_id("first"), node_id("first-child")]
        );
    }

    #[test]
    fn isolated_root_cause_scores_one_half() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[
            span("root", None, SpanStatus::Ok),
            span("fail", Some("root"), SpanStatus::Error),
            span("other", None, SpanStatus::Error),
        ]);

        let fail = graph.node_by_span("fail").unwrap();
        assert!(fail.is_root_cause);
        assert_eq!(fail.root_cause_probability, 0.5);
        assert_eq!(graph.node_by_span("root").unwrap().root_cause_probability, 0.0);
    }

    #[test]
    fn root_cause_probability_approaches_one_with_all_errors_downstream() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&error_chain(10));

        let root = graph.node_by_span("e0").unwrap();
        assert!((root.root_cause_probability - 0.95).abs() < 1e-9);
        assert!(root.root_cause_probability <= 1.0);
    }

    #[test]
    fn later_trace_demotes_earlier_root_cause() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[span("child", Some("parent"), SpanStatus::Error)]);
        assert_eq!(graph.root_causes(), &[node_id("child")]);

        // the parent arrives later; re-ingesting the child links it
        graph.ingest_spans(&[
            span("parent", None, SpanStatus::Error),
            span("child", Some("parent"), SpanStatus::Error),
        ]);

        assert_eq!(graph.root_causes(), &[node_id("parent")]);
        assert!(!graph.node_by_span("child").unwrap().is_root_cause);
    }

    #[test]
    fn no_error_spans_yield_no_root_causes() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[
            span("root", None, SpanStatus::Ok),
            span("a", Some("root"), SpanStatus::Warning),
        ]);

        assert!(graph.root_causes().is_empty());
        assert!(graph.critical_path().is_empty());
        assert!(graph.impacted_nodes().is_empty());
    }

    #[test]
    fn impacted_nodes_cover_blast_radius() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[
            span("root", None, SpanStatus::Ok),
            span("fail", Some("root"), SpanStatus::Error),
            span("after-1", Some("fail"), SpanStatus::Ok),
            span("after-2", Some("after-1"), SpanStatus::Warning),
            span("unrelated", Some("root"), SpanStatus::Ok),
        ]);

        let impacted = graph.impacted_nodes();
        assert_eq!(impacted.len(), 2);
        assert!(impacted.contains(&node_id("after-1")));
        assert!(impacted.contains(&node_id("after-2")));
        assert!(!impacted.contains(&node_id("unrelated")));
        assert_eq!(graph.descendants(node_id("fail")).len(), 2);
    }

    #[test]
    fn self_parent_is_not_linked() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[span("loop", Some("loop"), SpanStatus::Error)]);

        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn snapshot_serializes() {
        let mut graph = CausalGraph::new();
        graph.ingest_spans(&error_chain(2));

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.impacted_nodes, vec![node_id("e1")]);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["edges"][0]["kind"], "error_propagation");
        assert_eq!(json["nodes"][0]["status"], "error");
    }
}
