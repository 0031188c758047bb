//! Visual (image) workflow graph built from a topic analysis.
//!
//! Each concept becomes a `generate_image` node followed by an
//! `edit_image` node that adds the concept's annotations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use crate::TopicAnalysis;

const COLUMN_SPACING: f64 = 300.0;
const ORIGIN: f64 = 100.0;
const ANNOTATION_ROW: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Edge references unknown node: {0}")]
    UnknownNode(String),

    #[error("Workflow contains a cycle")]
    Cycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    GenerateImage,
    /// Takes the upstream image as input
    EditImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowNode {
    pub id: String,
    pub kind: NodeKind,
    pub prompt: String,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualWorkflow {
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

impl VisualWorkflow {
    pub fn from_analysis(analysis: &TopicAnalysis) -> Self {
        let mut nodes = Vec::with_capacity(analysis.concepts.len() * 2);
        let mut edges = Vec::with_capacity(analysis.concepts.len());

        for (i, concept) in analysis.concepts.iter().enumerate() {
            let x = ORIGIN + COLUMN_SPACING * i as f64;
            let concept_id = format!("concept_{i}");
            let annotate_id = format!("annotate_{i}");

            nodes.push(WorkflowNode {
                id: concept_id.clone(),
                kind: NodeKind::GenerateImage,
                prompt: concept.image_prompt.clone(),
                position: Position { x, y: ORIGIN },
                concept: Some(concept.name.clone()),
            });
            nodes.push(WorkflowNode {
                id: annotate_id.clone(),
                kind: NodeKind::EditImage,
                prompt: format!(
                    "Add educational annotations: {}",
                    concept.annotations.join(", ")
                ),
                position: Position {
                    x,
                    y: ANNOTATION_ROW,
                },
                concept: None,
            });
            edges.push(WorkflowEdge {
                source: concept_id,
                target: annotate_id,
            });
        }

        Self {
            name: format!("Educational Workflow: {}", analysis.topic),
            nodes,
            edges,
        }
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Source node feeding `id`, if any. Edit nodes use it as their input image.
    pub fn upstream_of(&self, id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.target == id)
            .map(|e| e.source.as_str())
    }

    /// Nodes in dependency order (Kahn's algorithm, ties broken by insertion order).
    pub fn execution_order(&self) -> Result<Vec<&WorkflowNode>, WorkflowError> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            let src = *index
                .get(edge.source.as_str())
                .ok_or_else(|| WorkflowError::UnknownNode(edge.source.clone()))?;
            let dst = *index
                .get(edge.target.as_str())
                .ok_or_else(|| WorkflowError::UnknownNode(edge.target.clone()))?;
            outgoing[src].push(dst);
            in_degree[dst] += 1;
        }

        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_front() {
            order.push(&self.nodes[i]);
            let mut next: Vec<usize> = Vec::new();
            for &dst in &outgoing[i] {
                in_degree[dst] -= 1;
                if in_degree[dst] == 0 {
                    next.push(dst);
                }
            }
            next.sort_unstable();
            ready.extend(next);
        }

        if order.len() != self.nodes.len() {
            return Err(WorkflowError::Cycle);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Concept, Level, Subject};

    fn analysis(n: usize) -> TopicAnalysis {
        let mut a = TopicAnalysis::baseline("Gravity", Subject::Physics, Level::HighSchool);
        let template = a.concepts[0].clone();
        a.concepts = (0..n)
            .map(|i| Concept {
                name: format!("Concept {i}"),
                annotations: vec!["a".into(), "b".into(), "c".into()],
                ..template.clone()
            })
            .collect();
        a
    }

    #[test]
    fn test_nodes_and_edges_from_analysis() {
        let wf = VisualWorkflow::from_analysis(&analysis(2));
        assert_eq!(wf.name, "Educational Workflow: Gravity");
        assert_eq!(wf.nodes.len(), 4);
        assert_eq!(wf.edges.len(), 2);

        let annotate_1 = wf.node("annotate_1").unwrap();
        assert_eq!(annotate_1.kind, NodeKind::EditImage);
        assert_eq!(annotate_1.prompt, "Add educational annotations: a, b, c");
        assert_eq!(annotate_1.position, Position { x: 400.0, y: 300.0 });

        let concept_0 = wf.node("concept_0").unwrap();
        assert_eq!(concept_0.kind, NodeKind::GenerateImage);
        assert_eq!(concept_0.position, Position { x: 100.0, y: 100.0 });
        assert_eq!(concept_0.concept.as_deref(), Some("Concept 0"));

        assert_eq!(wf.upstream_of("annotate_1"), Some("concept_1"));
        assert_eq!(wf.upstream_of("concept_1"), None);
    }

    #[test]
    fn test_execution_order_respects_edges() {
        let mut wf = VisualWorkflow::from_analysis(&analysis(2));
        // Put edit nodes first to make sure ordering comes from edges.
        wf.nodes.reverse();
        let order: Vec<&str> = wf
            .execution_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();

        let pos = |id: &str| order.iter().position(|o| *o == id).unwrap();
        assert!(pos("concept_0") < pos("annotate_0"));
        assert!(pos("concept_1") < pos("annotate_1"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_execution_order_keeps_insertion_order_without_edges() {
        let mut wf = VisualWorkflow::from_analysis(&analysis(2));
        wf.edges.clear();
        let order: Vec<&str> = wf
            .execution_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, vec!["concept_0", "annotate_0", "concept_1", "annotate_1"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut wf = VisualWorkflow::from_analysis(&analysis(1));
        wf.edges.push(WorkflowEdge {
            source: "annotate_0".into(),
            target: "concept_0".into(),
        });
        assert_eq!(wf.execution_order().unwrap_err(), WorkflowError::Cycle);
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let mut wf = VisualWorkflow::from_analysis(&analysis(1));
        wf.edges.push(WorkflowEdge {
            source: "concept_0".into(),
            target: "missing".into(),
        });
        assert_eq!(
            wf.execution_order().unwrap_err(),
            WorkflowError::UnknownNode("missing".into())
        );
    }
}
