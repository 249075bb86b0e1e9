//! Connection data model: anchors, connect lines, and endpoint
//! resolution.
//!
//! Connect points live in the tree as children of their owner, one per
//! cardinal anchor. Connect lines are first-class diagrams whose
//! geometry is never authored: endpoints are resolved against the
//! referenced points/nodes every time the line is read, so lines track
//! their owners through any move/resize/reparent.

use crate::id::DiagramId;
use crate::model::{DiagramGraph, DiagramKind, Frame, NodeIndex};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ─── Anchors ─────────────────────────────────────────────────────────────

/// A named anchor on a connectable diagram's edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Top,
    Right,
    Bottom,
    Left,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [Anchor::Top, Anchor::Right, Anchor::Bottom, Anchor::Left];

    /// The anchor's logical name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Right => "right",
            Self::Bottom => "bottom",
            Self::Left => "left",
        }
    }

    /// Offset from the owner's center to this anchor, in the owner's
    /// local (unscaled) space: the edge midpoint of the owner frame.
    pub fn offset(self, frame: &Frame) -> Vec2 {
        match self {
            Self::Top => Vec2::new(0.0, -frame.height / 2.0),
            Self::Right => Vec2::new(frame.width / 2.0, 0.0),
            Self::Bottom => Vec2::new(0.0, frame.height / 2.0),
            Self::Left => Vec2::new(-frame.width / 2.0, 0.0),
        }
    }
}

// ─── Connect lines ───────────────────────────────────────────────────────

/// One end of a connect line: a specific connect point, or a whole node
/// (resolved to its most convenient anchor at read time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Point(DiagramId),
    Node(DiagramId),
}

impl Endpoint {
    pub fn id(self) -> DiagramId {
        match self {
            Self::Point(id) | Self::Node(id) => id,
        }
    }
}

/// Arrow head placement on a connect line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowKind {
    #[default]
    None,
    Start,
    End,
    Both,
}

/// How the line path is drawn between its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    #[default]
    Straight,
    Smooth,
    Step,
}

/// The persisted payload of a connect-line diagram. Geometry is derived
/// from `source`/`target`, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectLine {
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub arrow: ArrowKind,
    #[serde(default)]
    pub curve: CurveKind,
    #[serde(default)]
    pub label: Option<String>,
}

impl ConnectLine {
    pub fn between(source: Endpoint, target: Endpoint) -> Self {
        Self {
            source,
            target,
            arrow: ArrowKind::End,
            curve: CurveKind::default(),
            label: None,
        }
    }
}

// ─── Layout & resolution ─────────────────────────────────────────────────

/// Re-place the connect-point children of `owner` on its frame's edge
/// midpoints. Called after the owner's size changes.
pub fn layout_connect_points(doc: &mut DiagramGraph, owner: NodeIndex) {
    let owner_frame = doc.graph[owner].frame;
    for child in doc.children(owner) {
        if let DiagramKind::ConnectPoint { anchor, .. } = doc.graph[child].kind {
            let pos = anchor.offset(&owner_frame);
            let frame = &mut doc.graph[child].frame;
            frame.x = pos.x;
            frame.y = pos.y;
        }
    }
}

/// World positions an endpoint may attach at: the single point position
/// for point endpoints, or all of the node's connect points (falling
/// back to the node center if it has none).
pub fn endpoint_candidates(doc: &DiagramGraph, endpoint: Endpoint) -> SmallVec<[Vec2; 4]> {
    let mut out = SmallVec::new();
    match endpoint {
        Endpoint::Point(id) => {
            if let Some(idx) = doc.index_of(id) {
                out.push(world_center(doc, idx));
            }
        }
        Endpoint::Node(id) => {
            if let Some(idx) = doc.index_of(id) {
                for child in doc.children(idx) {
                    if matches!(doc.graph[child].kind, DiagramKind::ConnectPoint { .. }) {
                        out.push(world_center(doc, child));
                    }
                }
                if out.is_empty() {
                    out.push(world_center(doc, idx));
                }
            }
        }
    }
    out
}

/// Resolve a line's world endpoints: the candidate pair with the
/// shortest span, so node-level connections pick the facing anchors.
/// `None` when either endpoint no longer resolves.
pub fn resolve_line(doc: &DiagramGraph, line: &ConnectLine) -> Option<(Vec2, Vec2)> {
    let sources = endpoint_candidates(doc, line.source);
    let targets = endpoint_candidates(doc, line.target);
    let mut best: Option<(Vec2, Vec2)> = None;
    let mut best_dist = f32::MAX;
    for &s in &sources {
        for &t in &targets {
            let dist = s.distance_squared(t);
            if dist < best_dist {
                best_dist = dist;
                best = Some((s, t));
            }
        }
    }
    best
}

fn world_center(doc: &DiagramGraph, idx: NodeIndex) -> Vec2 {
    let frame = doc.graph[idx].frame;
    doc.parent_world_transform(idx)
        .transform_point2(Vec2::new(frame.x, frame.y))
}
