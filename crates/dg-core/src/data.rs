//! State→Data projection and the snapshot codec.
//!
//! `Diagram` (runtime State) carries transient UI flags that must never
//! reach history or storage. `DiagramData` is the persisted projection:
//! two explicit record shapes plus a recursive projection, rather than
//! one mutable bag with skip-on-serialize conventions. Projecting then
//! rehydrating reproduces every persisted field exactly.
//!
//! Snapshots encode to MessagePack (`rmp-serde`, what history and
//! storage hold) and to JSON for interchange/debugging.

use crate::id::DiagramId;
use crate::model::{Diagram, DiagramGraph, DiagramKind, Frame, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The persisted projection of a diagram and its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramData {
    pub id: DiagramId,
    pub kind: DiagramKind,
    pub frame: Frame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Children in paint order. Includes the auto-generated connect
    /// points of connectable diagrams so line endpoints survive a
    /// round-trip.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<DiagramData>,
}

/// A Data-projected copy of the whole tree: the root-level diagrams in
/// paint order. This is what the history stacks and storage hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub roots: Vec<DiagramData>,
}

/// Codec failure when encoding/decoding a snapshot.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("snapshot encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("snapshot decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("snapshot JSON codec failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Project a diagram and all its descendants to Data, stripping the
/// transient flags. `None` if `idx` is the canvas root.
pub fn project_to_data(doc: &DiagramGraph, idx: NodeIndex) -> Option<DiagramData> {
    let diagram = &doc.graph[idx];
    if matches!(diagram.kind, DiagramKind::Canvas) {
        return None;
    }
    Some(DiagramData {
        id: diagram.id,
        kind: diagram.kind.clone(),
        frame: diagram.frame,
        name: diagram.name.clone(),
        description: diagram.description.clone(),
        items: doc
            .children(idx)
            .into_iter()
            .filter_map(|child| project_to_data(doc, child))
            .collect(),
    })
}

/// Rebuild a diagram subtree from Data under `parent`, with all
/// transient flags at their defaults. Returns the new subtree's index.
pub fn rehydrate(doc: &mut DiagramGraph, parent: Option<NodeIndex>, data: &DiagramData) -> NodeIndex {
    let mut diagram = Diagram::with_id(data.id, data.kind.clone());
    diagram.frame = data.frame;
    diagram.name = data.name.clone();
    diagram.description = data.description.clone();
    let idx = doc.add(parent, diagram);
    for item in &data.items {
        rehydrate(doc, Some(idx), item);
    }
    idx
}

impl Snapshot {
    /// Project the whole document.
    pub fn from_graph(doc: &DiagramGraph) -> Self {
        Self {
            roots: doc
                .children(doc.root)
                .into_iter()
                .filter_map(|idx| project_to_data(doc, idx))
                .collect(),
        }
    }

    /// Rebuild a fresh document from this snapshot.
    pub fn restore(&self) -> DiagramGraph {
        let mut doc = DiagramGraph::new();
        for data in &self.roots {
            rehydrate(&mut doc, None, data);
        }
        doc
    }

    /// Encode as MessagePack (named-field representation).
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// JSON interchange form.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }
}
