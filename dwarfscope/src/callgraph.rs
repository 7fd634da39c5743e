// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Static call-graph assembly from depth-annotated function listings.
//!
//! [`crate::dwarf::find_all_funcs`] yields functions in unit-offset, then
//! pre-order sequence, so consecutive entries of one subprogram form a
//! contiguous depth chain. The builder walks that chain with a rolling
//! depth → last-node map: an entry's parent is the previous node one level
//! up, or two levels up when a lexical block occupies the level in between.

use crate::dwarf::Func;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;

/// Fixed per-level edge palette.
const EDGE_COLORS: [&str; 12] = [
    "sienna1",
    "brown",
    "green",
    "cyan",
    "darkgreen",
    "tan1",
    "purple",
    "red",
    "yellow",
    "aquamarine",
    "bisque",
    "cadetblue",
];

/// A function that participates in at least one caller/callee relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Function name.
    pub name: String,
    /// Whether the caller-supplied covered set contains this function.
    pub covered: bool,
}

/// A caller → inlined-callee relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Index of the caller in [`CallGraph::nodes`].
    pub parent: usize,
    /// Index of the callee in [`CallGraph::nodes`].
    pub child: usize,
    /// Depth level of the relation (the caller's depth).
    pub level: u64,
}

/// Directed graph of inline call relations.
///
/// Nodes are only created when their first edge is committed, so functions
/// without any relation never appear.
#[derive(Debug, Default)]
pub struct CallGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    styled: bool,
}

impl CallGraph {
    /// All nodes, in first-reference order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges, deduplicated by (caller, callee); the first occurrence
    /// determines the level label.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Renders the graph as Graphviz DOT text.
    ///
    /// Covered nodes are drawn as blue boxes labelled `<name> (covered)`;
    /// when a covered set was supplied, the remaining nodes are red. Edges
    /// carry an `L<level>` label and a per-level colour.
    pub fn write_dot(&self, mut out: impl io::Write) -> io::Result<()> {
        writeln!(out, "digraph callgraph {{")?;
        writeln!(out, "  graph [label=\"Call Graph\", rankdir=LR];")?;

        for node in &self.nodes {
            let name = escape(&node.name);
            if node.covered {
                writeln!(
                    out,
                    "  \"{name}\" [shape=box, color=blue, label=\"{name} (covered)\"];"
                )?;
            } else if self.styled {
                writeln!(out, "  \"{name}\" [shape=ellipse, color=red];")?;
            } else {
                writeln!(out, "  \"{name}\" [shape=ellipse];")?;
            }
        }

        for edge in &self.edges {
            let parent = escape(&self.nodes[edge.parent].name);
            let child = escape(&self.nodes[edge.child].name);
            let color = edge
                .level
                .checked_sub(1)
                .and_then(|i| EDGE_COLORS.get(i as usize));
            match color {
                Some(color) => writeln!(
                    out,
                    "  \"{parent}\" -> \"{child}\" [label=\"L{}\", color={color}];",
                    edge.level
                )?,
                None => writeln!(
                    out,
                    "  \"{parent}\" -> \"{child}\" [label=\"L{}\"];",
                    edge.level
                )?,
            }
        }

        writeln!(out, "}}")
    }
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Builds the call graph from a depth-annotated function listing.
///
/// `max_depth` of 0 means unlimited. The `covered` set marks nodes for the
/// coverage styling in [`CallGraph::write_dot`].
pub fn build_graph(funcs: &[Func], covered: &HashSet<String>, max_depth: u64) -> CallGraph {
    let mut graph = CallGraph {
        nodes: Vec::new(),
        edges: Vec::new(),
        styled: !covered.is_empty(),
    };
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut edge_seen: HashSet<(usize, usize)> = HashSet::new();

    // Rolling map from depth to the most recent node at that depth. Stale
    // deeper slots are only cleared when a new subprogram root appears.
    let mut parents: SmallVec<[Option<String>; 16]> = SmallVec::new();

    let mut node_id = |graph: &mut CallGraph, name: &str| -> usize {
        *index.entry(name.to_owned()).or_insert_with(|| {
            graph.nodes.push(Node {
                name: name.to_owned(),
                covered: covered.contains(name),
            });
            graph.nodes.len() - 1
        })
    };

    for func in funcs {
        if max_depth != 0 && func.depth > max_depth {
            continue;
        }
        let depth = func.depth as usize;
        if func.depth == 1 {
            parents.clear();
        }

        let parent_slot = |level: usize| parents.get(level).cloned().flatten();
        let parent = depth
            .checked_sub(1)
            .and_then(parent_slot)
            // Bridge a missing intermediate level (a lexical block).
            .or_else(|| depth.checked_sub(2).and_then(parent_slot));

        if let Some(parent_name) = parent {
            let p = node_id(&mut graph, &parent_name);
            let c = node_id(&mut graph, &func.name);
            if edge_seen.insert((p, c)) {
                graph.edges.push(Edge {
                    parent: p,
                    child: c,
                    level: func.depth - 1,
                });
            }
        }

        if parents.len() <= depth {
            parents.resize(depth + 1, None);
        }
        parents[depth] = Some(func.name.clone());
    }

    graph
}

/// Per-depth coverage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStats {
    /// Inline depth the counters apply to.
    pub depth: u64,
    /// Number of distinct covered functions first seen at this depth.
    pub covered: u64,
    /// Number of distinct functions first seen at this depth.
    pub total: u64,
}

impl DepthStats {
    /// Coverage percentage, rounded up, but clamped to 99 while any function
    /// of the depth remains uncovered.
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        let pct = (self.covered * 100).div_ceil(self.total);
        if pct == 100 && self.covered < self.total {
            99
        } else {
            pct
        }
    }
}

/// Rolls the function listing up into per-depth coverage counters.
///
/// Every distinct function name is counted once, at the depth of its first
/// occurrence. `max_depth` of 0 means unlimited.
pub fn coverage_stats(funcs: &[Func], covered: &HashSet<String>, max_depth: u64) -> Vec<DepthStats> {
    let mut seen = HashSet::new();
    let mut by_depth: BTreeMap<u64, DepthStats> = BTreeMap::new();

    for func in funcs {
        if max_depth != 0 && func.depth > max_depth {
            continue;
        }
        if !seen.insert(func.name.as_str()) {
            continue;
        }
        let stats = by_depth.entry(func.depth).or_insert(DepthStats {
            depth: func.depth,
            covered: 0,
            total: 0,
        });
        stats.total += 1;
        if covered.contains(&func.name) {
            stats.covered += 1;
        }
    }

    by_depth.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::FuncKind;

    fn func(name: &str, depth: u64) -> Func {
        Func {
            kind: if depth == 1 {
                FuncKind::Subprogram
            } else {
                FuncKind::InlinedSubroutine
            },
            name: name.into(),
            ranges: vec![0x1000..0x1010],
            decl_file: String::new(),
            decl_line: 0,
            call_file: String::new(),
            call_line: 0,
            call_column: 0,
            inline: depth > 1,
            offset: 0,
            unit: 0,
            depth,
        }
    }

    fn covered(names: &[&str]) -> HashSet<String> {
        names.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn stats_per_depth() {
        let funcs = [func("A", 1), func("B", 2), func("C", 2), func("D", 3)];
        let stats = coverage_stats(&funcs, &covered(&["A", "C"]), 0);

        assert_eq!(
            stats,
            [
                DepthStats {
                    depth: 1,
                    covered: 1,
                    total: 1
                },
                DepthStats {
                    depth: 2,
                    covered: 1,
                    total: 2
                },
                DepthStats {
                    depth: 3,
                    covered: 0,
                    total: 1
                },
            ]
        );
        assert_eq!(stats[0].percent(), 100);
        assert_eq!(stats[1].percent(), 50);
        assert_eq!(stats[2].percent(), 0);
    }

    #[test]
    fn percent_clamps_just_below_full() {
        let stats = DepthStats {
            depth: 1,
            covered: 999,
            total: 1000,
        };
        assert_eq!(stats.percent(), 99);
    }

    #[test]
    fn graph_edges_follow_depth_chain() {
        let funcs = [func("A", 1), func("B", 2), func("C", 2), func("D", 3)];
        let graph = build_graph(&funcs, &HashSet::new(), 0);

        let edge_names: Vec<(&str, &str, u64)> = graph
            .edges()
            .iter()
            .map(|e| {
                (
                    graph.nodes()[e.parent].name.as_str(),
                    graph.nodes()[e.child].name.as_str(),
                    e.level,
                )
            })
            .collect();

        assert_eq!(
            edge_names,
            [("A", "B", 1), ("A", "C", 1), ("C", "D", 2)]
        );
    }

    #[test]
    fn lexical_block_gap_is_bridged() {
        // A subprogram at depth 1 whose inlined subroutine sits at depth 3
        // below a lexical block: the block holds no slot, so the callee
        // attaches to its grandparent level.
        let funcs = [func("outer", 1), func("inner", 3)];
        let graph = build_graph(&funcs, &HashSet::new(), 0);

        assert_eq!(graph.edges().len(), 1);
        let edge = graph.edges()[0];
        assert_eq!(graph.nodes()[edge.parent].name, "outer");
        assert_eq!(graph.nodes()[edge.child].name, "inner");
        assert_eq!(edge.level, 2);
    }

    #[test]
    fn isolated_functions_never_become_nodes() {
        let funcs = [func("lonely", 1), func("also_lonely", 1)];
        let graph = build_graph(&funcs, &HashSet::new(), 0);
        assert!(graph.nodes().is_empty());
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn max_depth_filters_graph() {
        let funcs = [func("A", 1), func("B", 2), func("C", 3)];
        let graph = build_graph(&funcs, &HashSet::new(), 2);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.nodes().len(), 2);
    }

    #[test]
    fn dot_output_styles_covered_nodes() {
        let funcs = [func("A", 1), func("B", 2)];
        let graph = build_graph(&funcs, &covered(&["B"]), 0);

        let mut out = Vec::new();
        graph.write_dot(&mut out).unwrap();
        let dot = String::from_utf8(out).unwrap();

        assert!(dot.contains("digraph callgraph {"));
        assert!(dot.contains("\"A\" [shape=ellipse, color=red];"));
        assert!(dot.contains("\"B\" [shape=box, color=blue, label=\"B (covered)\"];"));
        assert!(dot.contains("\"A\" -> \"B\" [label=\"L1\", color=sienna1];"));
    }
}
