//! Dependency graph export.
//!
//! [`Index::graph`] walks the stage graph and reports what it finds to a
//! [`GraphSink`]. [`DotGraph`] is the stock sink: it accumulates a
//! `petgraph` graph and renders it in Graphviz DOT format, with every stage
//! drawn as a labelled cluster containing its outputs.

use std::collections::HashMap;
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::IndexError;
use crate::index::Index;
use crate::traversal::Traversal;

/// The relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// A stage reads an artifact.
    Input,
    /// A stage depends on an upstream stage.
    Upstream,
}

/// Receives the nodes and edges discovered by [`Index::graph`].
pub trait GraphSink {
    /// A stage was visited.
    fn add_stage(&mut self, stage_path: &str, command: Option<&str>);
    /// `artifact_path` is an output of `stage_path`.
    fn add_output(&mut self, stage_path: &str, artifact_path: &str);
    /// An input artifact was seen.
    fn add_artifact(&mut self, artifact_path: &str);
    /// `from` (always a stage) relates to `to`.
    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind);
}

impl Index {
    /// Reports a stage and everything upstream of it to `sink`.
    ///
    /// With `stages_only`, only stages and the edges between them are
    /// reported; otherwise every input and output artifact is included and
    /// stages point at the artifacts they read.
    pub fn graph(
        &self,
        stage_path: &str,
        sink: &mut dyn GraphSink,
        stages_only: bool,
        traversal: &mut Traversal,
    ) -> Result<(), IndexError> {
        if !traversal.enter(stage_path)? {
            return Ok(());
        }
        let stage = self.stage(stage_path)?;
        sink.add_stage(stage_path, stage.command.as_deref());
        if !stages_only {
            for path in stage.outputs.keys() {
                sink.add_output(stage_path, path);
            }
        }
        for path in stage.inputs.keys() {
            let owner = self.owner_of(path);
            if let Some(owner) = &owner {
                self.graph(owner, sink, stages_only, traversal)?;
            }
            if !stages_only {
                sink.add_artifact(path);
                sink.add_edge(stage_path, path, EdgeKind::Input);
            } else if let Some(owner) = &owner {
                sink.add_edge(stage_path, owner, EdgeKind::Upstream);
            }
        }
        traversal.leave(stage_path);
        Ok(())
    }
}

#[derive(Debug)]
enum Node {
    Stage { command: Option<String> },
    Artifact { stage: Option<NodeIndex> },
}

/// A [`GraphSink`] that renders Graphviz DOT.
///
/// Edges are deduplicated, and nodes are emitted in discovery order so the
/// output is stable for a given index.
#[derive(Debug, Default)]
pub struct DotGraph {
    graph: DiGraph<(String, Node), EdgeKind>,
    nodes: HashMap<String, NodeIndex>,
}

impl DotGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str, make: impl FnOnce() -> Node) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node((name.to_string(), make()));
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    fn artifact(&mut self, name: &str) -> NodeIndex {
        self.node(name, || Node::Artifact { stage: None })
    }

    fn write_artifact(f: &mut fmt::Formatter<'_>, indent: &str, name: &str) -> fmt::Result {
        writeln!(f, "{indent}{};", quote(name))
    }
}

impl GraphSink for DotGraph {
    fn add_stage(&mut self, stage_path: &str, command: Option<&str>) {
        let idx = self.node(stage_path, || Node::Stage { command: None });
        if let Node::Stage { command: slot } = &mut self.graph[idx].1 {
            *slot = command.map(str::to_string);
        }
    }

    fn add_output(&mut self, stage_path: &str, artifact_path: &str) {
        let owner = self.node(stage_path, || Node::Stage { command: None });
        let idx = self.artifact(artifact_path);
        if let Node::Artifact { stage } = &mut self.graph[idx].1 {
            *stage = Some(owner);
        }
    }

    fn add_artifact(&mut self, artifact_path: &str) {
        self.artifact(artifact_path);
    }

    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let from = self.node(from, || Node::Stage { command: None });
        let to = match kind {
            EdgeKind::Input => self.artifact(to),
            EdgeKind::Upstream => self.node(to, || Node::Stage { command: None }),
        };
        self.graph.update_edge(from, to, kind);
    }
}

impl fmt::Display for DotGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strict digraph {{")?;
        writeln!(f, "  rankdir=\"LR\";")?;
        writeln!(f, "  compound=\"true\";")?;

        for idx in self.graph.node_indices() {
            let (name, node) = &self.graph[idx];
            match node {
                Node::Stage { command } => {
                    let mut label = name.clone();
                    if let Some(command) = command {
                        label.push('\n');
                        label.push_str(command);
                    }
                    writeln!(f, "  subgraph {} {{", quote(&cluster(name)))?;
                    writeln!(f, "    label={};", quote(&label))?;
                    writeln!(f, "    {} [style=\"invis\", shape=\"point\"];", quote(name))?;
                    for child in self.graph.node_indices() {
                        let (child_name, child_node) = &self.graph[child];
                        if let Node::Artifact { stage: Some(owner) } = child_node {
                            if *owner == idx {
                                Self::write_artifact(f, "    ", child_name)?;
                            }
                        }
                    }
                    writeln!(f, "  }}")?;
                }
                Node::Artifact { stage: None } => Self::write_artifact(f, "  ", name)?,
                Node::Artifact { .. } => {}
            }
        }

        for edge in self.graph.edge_references() {
            let from = &self.graph[edge.source()].0;
            let to = &self.graph[edge.target()].0;
            write!(
                f,
                "  {} -> {} [ltail={}",
                quote(from),
                quote(to),
                quote(&cluster(from))
            )?;
            if *edge.weight() == EdgeKind::Upstream {
                write!(f, ", lhead={}", quote(&cluster(to)))?;
            }
            writeln!(f, "];")?;
        }
        writeln!(f, "}}")
    }
}

fn cluster(stage_path: &str) -> String {
    format!("cluster_{stage_path}")
}

/// Quotes `s` as a DOT string. Newlines become centered line breaks.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
