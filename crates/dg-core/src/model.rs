//! Core scene-tree data model for DG diagrams.
//!
//! A document is a forest of `Diagram` nodes hanging off a synthetic
//! canvas root. Parent→child edges express containment; child order is
//! paint order (later = on top). Every diagram carries a `Frame` — its
//! center position, size, rotation, and per-axis scale in the parent's
//! local space — so world coordinates are always derived by composing
//! frames down the ancestor chain, never stored.
//!
//! Runtime state (`Diagram`) is a superset of what persists: transient
//! UI flags live here and are stripped by the `data` module's
//! projection.

use crate::connect::{Anchor, ConnectLine, Endpoint};
use crate::geometry::finite_or_zero;
use crate::id::DiagramId;
use glam::{Affine2, Vec2};
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

pub use petgraph::graph::NodeIndex;

// ─── Frame ───────────────────────────────────────────────────────────────

/// Position, size, rotation, and scale of a diagram in its parent's
/// local coordinate space. `x, y` is the center. Fields missing on the
/// wire fall back to the defaults (unrotated, unit scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Clockwise rotation in degrees around the center.
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl Frame {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
            ..Self::default()
        }
    }

    /// The local transform this frame applies to its contents:
    /// translate to center ∘ rotate ∘ scale.
    pub fn local_transform(&self) -> Affine2 {
        Affine2::from_scale_angle_translation(
            Vec2::new(self.scale_x, self.scale_y),
            self.rotation.to_radians(),
            Vec2::new(self.x, self.y),
        )
    }

    /// Corners in the parent's space, order TL, TR, BR, BL.
    pub fn vertices(&self) -> [Vec2; 4] {
        crate::geometry::rectangle_vertices(
            self.x,
            self.y,
            self.width,
            self.height,
            self.rotation,
            self.scale_x,
            self.scale_y,
        )
    }

    /// Axis-aligned bounding box over the rotated corners, as (min, max).
    pub fn aabb(&self) -> (Vec2, Vec2) {
        let verts = self.vertices();
        let mut min = verts[0];
        let mut max = verts[0];
        for v in &verts[1..] {
            min = min.min(*v);
            max = max.max(*v);
        }
        (min, max)
    }

    /// Set width/height, clamping at zero. NaN collapses to 0.
    pub fn set_size(&mut self, width: f32, height: f32) {
        self.width = finite_or_zero(width).max(0.0);
        self.height = finite_or_zero(height).max(0.0);
    }
}

// ─── Text ────────────────────────────────────────────────────────────────

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Vertical text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    Top,
    #[default]
    Middle,
    Bottom,
}

/// Text content plus styling, carried by every textable variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBlock {
    pub text: String,
    pub text_align: TextAlign,
    pub vertical_align: VerticalAlign,
    /// CSS color string, e.g. `"#1F1A17"`.
    pub font_color: String,
    pub font_size: f32,
    pub font_family: String,
    pub font_weight: u16,
}

impl Default for TextBlock {
    fn default() -> Self {
        Self {
            text: String::new(),
            text_align: TextAlign::default(),
            vertical_align: VerticalAlign::default(),
            font_color: "#1F1A17".into(),
            font_size: 14.0,
            font_family: "Inter".into(),
            font_weight: 400,
        }
    }
}

impl TextBlock {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

// ─── Diagram kinds ───────────────────────────────────────────────────────

/// The diagram variants. Payloads hold only persisted, kind-specific
/// fields; the shared base record lives on `Diagram`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagramKind {
    /// Synthetic tree root. Exactly one per document, never serialized,
    /// never hit-tested, never selected.
    Canvas,
    Rectangle {
        corner_radius: f32,
    },
    Ellipse,
    Text {
        block: TextBlock,
    },
    Image {
        source: String,
    },
    Group,
    /// Named anchor owned by a connectable diagram; lives in the tree as
    /// a child of its owner and is deleted with it.
    ConnectPoint {
        owner: DiagramId,
        anchor: Anchor,
    },
    ConnectLine(ConnectLine),
    /// Container node with editable multi-line text.
    TextArea {
        block: TextBlock,
        corner_radius: f32,
    },
    /// Container node that clips its children to its frame.
    FrameNode {
        clip: bool,
        corner_radius: f32,
    },
    /// Container node representing an automated agent, with a title block.
    Agent {
        agent: String,
        block: TextBlock,
    },
}

impl DiagramKind {
    /// The prefix used for generated ids of this kind.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Canvas => "canvas",
            Self::Rectangle { .. } => "rect",
            Self::Ellipse => "ellipse",
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Group => "group",
            Self::ConnectPoint { .. } => "cp",
            Self::ConnectLine(_) => "line",
            Self::TextArea { .. } => "textarea",
            Self::FrameNode { .. } => "frame",
            Self::Agent { .. } => "agent",
        }
    }
}

// ─── Capability traits ───────────────────────────────────────────────────

/// Capability: may own an ordered list of child diagrams.
pub trait Itemable {
    fn is_itemable(&self) -> bool;
}

/// Capability: carries a text block.
pub trait Textable {
    fn text_block(&self) -> Option<&TextBlock>;
    fn text_block_mut(&mut self) -> Option<&mut TextBlock>;
}

/// Capability: has a corner radius.
pub trait CornerRoundable {
    fn corner_radius(&self) -> Option<f32>;
    fn set_corner_radius(&mut self, radius: f32);
}

/// Capability: generates connect points and may anchor connect lines.
pub trait Connectable {
    fn is_connectable(&self) -> bool;
}

impl Itemable for DiagramKind {
    fn is_itemable(&self) -> bool {
        matches!(
            self,
            Self::Canvas
                | Self::Group
                | Self::TextArea { .. }
                | Self::FrameNode { .. }
                | Self::Agent { .. }
        )
    }
}

impl Textable for DiagramKind {
    fn text_block(&self) -> Option<&TextBlock> {
        match self {
            Self::Text { block } | Self::TextArea { block, .. } | Self::Agent { block, .. } => {
                Some(block)
            }
            _ => None,
        }
    }

    fn text_block_mut(&mut self) -> Option<&mut TextBlock> {
        match self {
            Self::Text { block } | Self::TextArea { block, .. } | Self::Agent { block, .. } => {
                Some(block)
            }
            _ => None,
        }
    }
}

impl CornerRoundable for DiagramKind {
    fn corner_radius(&self) -> Option<f32> {
        match self {
            Self::Rectangle { corner_radius }
            | Self::TextArea { corner_radius, .. }
            | Self::FrameNode { corner_radius, .. } => Some(*corner_radius),
            _ => None,
        }
    }

    fn set_corner_radius(&mut self, radius: f32) {
        match self {
            Self::Rectangle { corner_radius }
            | Self::TextArea { corner_radius, .. }
            | Self::FrameNode { corner_radius, .. } => *corner_radius = radius.max(0.0),
            _ => {}
        }
    }
}

impl Connectable for DiagramKind {
    fn is_connectable(&self) -> bool {
        matches!(
            self,
            Self::Rectangle { .. }
                | Self::Ellipse
                | Self::Image { .. }
                | Self::TextArea { .. }
                | Self::FrameNode { .. }
                | Self::Agent { .. }
        )
    }
}

// ─── Diagram ─────────────────────────────────────────────────────────────

/// A single node in the scene tree: the shared base record plus the
/// variant payload. The trailing flags are runtime-only UI state — the
/// `data` module's projection drops them.
#[derive(Debug, Clone)]
pub struct Diagram {
    pub id: DiagramId,
    pub kind: DiagramKind,
    pub frame: Frame,
    pub name: Option<String>,
    pub description: Option<String>,

    // Transient state, excluded from the Data projection.
    pub is_selected: bool,
    pub is_text_editing: bool,
    pub is_drop_target: bool,
    pub show_connect_points: bool,
}

impl Diagram {
    /// Create a diagram with a freshly generated id.
    pub fn new(kind: DiagramKind) -> Self {
        let id = DiagramId::with_prefix(kind.id_prefix());
        Self::with_id(id, kind)
    }

    pub fn with_id(id: DiagramId, kind: DiagramKind) -> Self {
        Self {
            id,
            kind,
            frame: Frame::default(),
            name: None,
            description: None,
            is_selected: false,
            is_text_editing: false,
            is_drop_target: false,
            show_connect_points: false,
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    pub fn is_itemable(&self) -> bool {
        self.kind.is_itemable()
    }

    pub fn is_connectable(&self) -> bool {
        self.kind.is_connectable()
    }
}

// ─── Structure errors ────────────────────────────────────────────────────

/// A violated structural invariant found by [`DiagramGraph::validate`].
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("diagram {0} has {1} parents (expected exactly one)")]
    MultipleParents(DiagramId, usize),
    #[error("containment cycle involving {0}")]
    Cycle(DiagramId),
    #[error("child order for {0} disagrees with the graph edges")]
    OrderMismatch(DiagramId),
    #[error("connect line {0} references unresolvable endpoint")]
    DanglingEndpoint(DiagramId),
    #[error("connect point {0} is not a child of its owner {1}")]
    OrphanConnectPoint(DiagramId, DiagramId),
    #[error("non-itemable diagram {0} has children")]
    IllegalChildren(DiagramId),
}

// ─── Diagram graph ───────────────────────────────────────────────────────

/// The complete document: a stable digraph of diagrams under a synthetic
/// canvas root, an interned-id index for O(1) lookup, and an explicit
/// per-parent child order (paint order).
#[derive(Debug, Clone)]
pub struct DiagramGraph {
    pub graph: StableDiGraph<Diagram, ()>,
    pub root: NodeIndex,
    id_index: HashMap<DiagramId, NodeIndex>,
    child_order: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl Default for DiagramGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagramGraph {
    /// Create an empty document with its canvas root.
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let root_diagram = Diagram::with_id(DiagramId::with_prefix("canvas"), DiagramKind::Canvas);
        let root_id = root_diagram.id;
        let root = graph.add_node(root_diagram);

        let mut id_index = HashMap::new();
        id_index.insert(root_id, root);

        Self {
            graph,
            root,
            id_index,
            child_order: HashMap::new(),
        }
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    pub fn index_of(&self, id: DiagramId) -> Option<NodeIndex> {
        self.id_index.get(&id).copied()
    }

    /// Look up a diagram by id. Absence is a returned `None`, never a
    /// default entity.
    pub fn find_by_id(&self, id: DiagramId) -> Option<&Diagram> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    pub fn find_by_id_mut(&mut self, id: DiagramId) -> Option<&mut Diagram> {
        self.index_of(id).map(|idx| &mut self.graph[idx])
    }

    /// Collect all diagrams matching `ids` in a single pre-order pass;
    /// result is in document order regardless of the order of `ids`.
    pub fn find_all_by_ids(&self, ids: &[DiagramId]) -> Vec<&Diagram> {
        let wanted: HashSet<DiagramId> = ids.iter().copied().collect();
        self.preorder()
            .into_iter()
            .map(|idx| &self.graph[idx])
            .filter(|d| wanted.contains(&d.id))
            .collect()
    }

    /// Every diagram id in the document, pre-order, root excluded.
    pub fn collect_all_ids(&self) -> Vec<DiagramId> {
        self.preorder()
            .into_iter()
            .map(|idx| self.graph[idx].id)
            .collect()
    }

    /// Pre-order traversal of all diagram indices (root excluded).
    /// Iterative with an explicit stack; children pushed in reverse so
    /// they pop in paint order.
    pub fn preorder(&self) -> Vec<NodeIndex> {
        let mut out = Vec::with_capacity(self.graph.node_count());
        let mut stack: Vec<NodeIndex> = self.children(self.root);
        stack.reverse();
        while let Some(idx) = stack.pop() {
            out.push(idx);
            let mut kids = self.children(idx);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    // ─── Structure ───────────────────────────────────────────────────────

    /// Add a diagram as the last child of `parent` (or the root).
    /// Returns the new node's index.
    pub fn add(&mut self, parent: Option<NodeIndex>, diagram: Diagram) -> NodeIndex {
        let parent = parent.unwrap_or(self.root);
        let id = diagram.id;
        let idx = self.graph.add_node(diagram);
        self.graph.add_edge(parent, idx, ());
        self.id_index.insert(id, idx);
        self.child_order.entry(parent).or_default().push(idx);
        idx
    }

    /// Remove a diagram and its whole subtree. Returns the removed ids
    /// (pre-order), empty if `idx` is the root.
    pub fn remove_subtree(&mut self, idx: NodeIndex) -> Vec<DiagramId> {
        if idx == self.root {
            return Vec::new();
        }
        let mut removed = Vec::new();
        self.remove_subtree_inner(idx, &mut removed);
        removed
    }

    fn remove_subtree_inner(&mut self, idx: NodeIndex, removed: &mut Vec<DiagramId>) {
        if let Some(parent) = self.parent_of(idx)
            && let Some(order) = self.child_order.get_mut(&parent)
        {
            order.retain(|&c| c != idx);
        }
        let mut stack = vec![idx];
        // Detach the subtree top first, then drain it depth-first.
        while let Some(cur) = stack.pop() {
            for child in self.children(cur) {
                stack.push(child);
            }
            self.child_order.remove(&cur);
            if let Some(diagram) = self.graph.remove_node(cur) {
                self.id_index.remove(&diagram.id);
                removed.push(diagram.id);
            }
        }
    }

    /// Parent of a node, if any (the root has none).
    pub fn parent_of(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .next()
    }

    /// Children in paint order (first = painted first = bottom).
    pub fn children(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.child_order.get(&idx).cloned().unwrap_or_default()
    }

    /// Move `child` under `new_parent`, appended at the top of the paint
    /// order. Refused (returns false) if it would create a cycle.
    pub fn reparent(&mut self, child: NodeIndex, new_parent: NodeIndex) -> bool {
        let pos = self.child_order.get(&new_parent).map_or(0, Vec::len);
        self.reparent_at(child, new_parent, pos)
    }

    /// Move `child` under `new_parent` at `position` in the child order.
    /// Refused (returns false) if it would create a cycle or the child
    /// is the root.
    pub fn reparent_at(&mut self, child: NodeIndex, new_parent: NodeIndex, position: usize) -> bool {
        if child == self.root || self.is_ancestor(child, new_parent) {
            return false;
        }
        if let Some(old_parent) = self.parent_of(child) {
            if let Some(edge) = self.graph.find_edge(old_parent, child) {
                self.graph.remove_edge(edge);
            }
            if let Some(order) = self.child_order.get_mut(&old_parent) {
                order.retain(|&c| c != child);
            }
        }
        self.graph.add_edge(new_parent, child, ());
        let order = self.child_order.entry(new_parent).or_default();
        let position = position.min(order.len());
        order.insert(position, child);
        true
    }

    /// Whether `node` is `descendant` itself or one of its ancestors.
    /// Iterative parent walk — containment is a forest, so this
    /// terminates at the root.
    pub fn is_ancestor(&self, node: NodeIndex, descendant: NodeIndex) -> bool {
        let mut current = Some(descendant);
        while let Some(idx) = current {
            if idx == node {
                return true;
            }
            current = self.parent_of(idx);
        }
        false
    }

    /// Position of `child` within its parent's paint order.
    pub fn order_in_parent(&self, child: NodeIndex) -> Option<usize> {
        let parent = self.parent_of(child)?;
        self.child_order
            .get(&parent)?
            .iter()
            .position(|&c| c == child)
    }

    // ─── Z-order ─────────────────────────────────────────────────────────

    /// Swap with the next sibling (toward the top). Returns true if the
    /// paint order changed.
    pub fn bring_forward(&mut self, child: NodeIndex) -> bool {
        self.shift_in_order(child, 1)
    }

    /// Swap with the previous sibling (toward the bottom).
    pub fn send_backward(&mut self, child: NodeIndex) -> bool {
        self.shift_in_order(child, -1)
    }

    pub fn bring_to_front(&mut self, child: NodeIndex) -> bool {
        self.move_to_edge(child, true)
    }

    pub fn send_to_back(&mut self, child: NodeIndex) -> bool {
        self.move_to_edge(child, false)
    }

    fn shift_in_order(&mut self, child: NodeIndex, delta: isize) -> bool {
        let Some(parent) = self.parent_of(child) else {
            return false;
        };
        let Some(order) = self.child_order.get_mut(&parent) else {
            return false;
        };
        let Some(pos) = order.iter().position(|&c| c == child) else {
            return false;
        };
        let target = pos as isize + delta;
        if target < 0 || target as usize >= order.len() {
            return false;
        }
        order.swap(pos, target as usize);
        true
    }

    fn move_to_edge(&mut self, child: NodeIndex, front: bool) -> bool {
        let Some(parent) = self.parent_of(child) else {
            return false;
        };
        let Some(order) = self.child_order.get_mut(&parent) else {
            return false;
        };
        let Some(pos) = order.iter().position(|&c| c == child) else {
            return false;
        };
        if (front && pos == order.len() - 1) || (!front && pos == 0) {
            return false;
        }
        order.remove(pos);
        if front {
            order.push(child);
        } else {
            order.insert(0, child);
        }
        true
    }

    // ─── Transforms ──────────────────────────────────────────────────────

    /// World transform of a diagram: its ancestors' local transforms
    /// composed root-down, including its own.
    pub fn world_transform(&self, idx: NodeIndex) -> Affine2 {
        let mut chain = Vec::new();
        let mut current = Some(idx);
        while let Some(cur) = current {
            if cur == self.root {
                break;
            }
            chain.push(cur);
            current = self.parent_of(cur);
        }
        chain
            .iter()
            .rev()
            .fold(Affine2::IDENTITY, |acc, &i| {
                acc * self.graph[i].frame.local_transform()
            })
    }

    /// World transform of the parent space a diagram's frame lives in.
    pub fn parent_world_transform(&self, idx: NodeIndex) -> Affine2 {
        match self.parent_of(idx) {
            Some(parent) if parent != self.root => self.world_transform(parent),
            _ => Affine2::IDENTITY,
        }
    }

    /// World-space axis-aligned bounds of a diagram's frame, as
    /// (min, max) over its transformed corners.
    pub fn world_aabb(&self, idx: NodeIndex) -> (Vec2, Vec2) {
        let parent = self.parent_world_transform(idx);
        let verts = self.graph[idx].frame.vertices();
        let mut min = parent.transform_point2(verts[0]);
        let mut max = min;
        for v in &verts[1..] {
            let p = parent.transform_point2(*v);
            min = min.min(p);
            max = max.max(p);
        }
        (min, max)
    }

    // ─── Validation ──────────────────────────────────────────────────────

    /// Check the structural invariants: every non-root node has exactly
    /// one parent, containment is acyclic, the child order agrees with
    /// the edges, connect points sit under their owner, connect lines
    /// resolve, and only itemable diagrams have non-point children.
    pub fn validate(&self) -> Result<(), StructureError> {
        for idx in self.graph.node_indices() {
            let diagram = &self.graph[idx];
            if idx == self.root {
                continue;
            }

            let parents = self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .count();
            if parents != 1 {
                return Err(StructureError::MultipleParents(diagram.id, parents));
            }

            // Walk to the root; a cycle would revisit `idx`.
            let mut seen = 0usize;
            let mut current = self.parent_of(idx);
            while let Some(cur) = current {
                if cur == idx {
                    return Err(StructureError::Cycle(diagram.id));
                }
                seen += 1;
                if seen > self.graph.node_count() {
                    return Err(StructureError::Cycle(diagram.id));
                }
                current = self.parent_of(cur);
            }

            let edge_children: HashSet<NodeIndex> = self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Outgoing)
                .collect();
            let ordered: Vec<NodeIndex> = self.children(idx);
            if ordered.len() != edge_children.len()
                || !ordered.iter().all(|c| edge_children.contains(c))
            {
                return Err(StructureError::OrderMismatch(diagram.id));
            }

            if !edge_children.is_empty() && !diagram.kind.is_itemable() {
                let only_points = ordered
                    .iter()
                    .all(|&c| matches!(self.graph[c].kind, DiagramKind::ConnectPoint { .. }));
                if !only_points {
                    return Err(StructureError::IllegalChildren(diagram.id));
                }
            }

            match &diagram.kind {
                DiagramKind::ConnectPoint { owner, .. } => {
                    let parent_id = self.parent_of(idx).map(|p| self.graph[p].id);
                    if parent_id != Some(*owner) {
                        return Err(StructureError::OrphanConnectPoint(diagram.id, *owner));
                    }
                }
                DiagramKind::ConnectLine(line) => {
                    for endpoint in [&line.source, &line.target] {
                        let target = match endpoint {
                            Endpoint::Point(id) | Endpoint::Node(id) => *id,
                        };
                        if self.index_of(target).is_none() {
                            return Err(StructureError::DanglingEndpoint(diagram.id));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ─── Connect points ──────────────────────────────────────────────────

    /// Create the deterministic connect-point children for a connectable
    /// diagram (the four cardinal anchors). No-op for other kinds or if
    /// points already exist.
    pub fn ensure_connect_points(&mut self, idx: NodeIndex) {
        let (owner_id, connectable) = {
            let d = &self.graph[idx];
            (d.id, d.is_connectable())
        };
        if !connectable {
            return;
        }
        let existing: Vec<Anchor> = self
            .children(idx)
            .into_iter()
            .filter_map(|c| match self.graph[c].kind {
                DiagramKind::ConnectPoint { anchor, .. } => Some(anchor),
                _ => None,
            })
            .collect();
        let owner_frame = self.graph[idx].frame;
        for anchor in Anchor::ALL {
            if existing.contains(&anchor) {
                continue;
            }
            let offset = anchor.offset(&owner_frame);
            let point = Diagram::new(DiagramKind::ConnectPoint {
                owner: owner_id,
                anchor,
            })
            .with_frame(Frame::new(offset.x, offset.y, 0.0, 0.0));
            self.add(Some(idx), point);
        }
    }

    /// Ids of every connect line whose source or target no longer
    /// resolves, or resolves to something in `doomed`.
    pub fn dangling_lines(&self, doomed: &HashSet<DiagramId>) -> Vec<DiagramId> {
        let mut out = Vec::new();
        for idx in self.preorder() {
            let diagram = &self.graph[idx];
            if let DiagramKind::ConnectLine(line) = &diagram.kind {
                let endpoint_gone = [&line.source, &line.target].into_iter().any(|e| {
                    let id = match e {
                        Endpoint::Point(id) | Endpoint::Node(id) => *id,
                    };
                    doomed.contains(&id) || self.index_of(id).is_none()
                });
                if endpoint_gone {
                    log::debug!("connect line {} lost an endpoint", diagram.id);
                    out.push(diagram.id);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Diagram {
        Diagram::new(DiagramKind::Rectangle { corner_radius: 0.0 }).with_frame(Frame::new(x, y, w, h))
    }

    #[test]
    fn add_and_find() {
        let mut doc = DiagramGraph::new();
        let r = rect(10.0, 10.0, 50.0, 50.0);
        let id = r.id;
        doc.add(None, r);

        assert!(doc.find_by_id(id).is_some());
        assert!(doc.find_by_id(DiagramId::intern("no_such")).is_none());
        doc.validate().unwrap();
    }

    #[test]
    fn collect_all_ids_is_preorder() {
        let mut doc = DiagramGraph::new();
        let group = doc.add(None, Diagram::new(DiagramKind::Group));
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 5.0, 10.0, 10.0);
        let (a_id, b_id) = (a.id, b.id);
        doc.add(Some(group), a);
        doc.add(Some(group), b);
        let c = rect(100.0, 0.0, 10.0, 10.0);
        let c_id = c.id;
        doc.add(None, c);

        let ids = doc.collect_all_ids();
        let group_id = doc.graph[group].id;
        assert_eq!(ids, vec![group_id, a_id, b_id, c_id]);
    }

    #[test]
    fn find_all_by_ids_document_order() {
        let mut doc = DiagramGraph::new();
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 5.0, 10.0, 10.0);
        let (a_id, b_id) = (a.id, b.id);
        doc.add(None, a);
        doc.add(None, b);

        // Query order reversed; result stays in document order.
        let found = doc.find_all_by_ids(&[b_id, a_id]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, a_id);
        assert_eq!(found[1].id, b_id);
    }

    #[test]
    fn remove_subtree_removes_descendants() {
        let mut doc = DiagramGraph::new();
        let group = doc.add(None, Diagram::new(DiagramKind::Group));
        let child = rect(0.0, 0.0, 10.0, 10.0);
        let child_id = child.id;
        doc.add(Some(group), child);

        let removed = doc.remove_subtree(group);
        assert_eq!(removed.len(), 2);
        assert!(doc.find_by_id(child_id).is_none());
        assert!(doc.children(doc.root).is_empty());
        doc.validate().unwrap();
    }

    #[test]
    fn reparent_refuses_cycles() {
        let mut doc = DiagramGraph::new();
        let outer = doc.add(None, Diagram::new(DiagramKind::Group));
        let inner = doc.add(Some(outer), Diagram::new(DiagramKind::Group));

        assert!(!doc.reparent(outer, inner));
        doc.validate().unwrap();
    }

    #[test]
    fn child_order_is_paint_order() {
        let mut doc = DiagramGraph::new();
        let a = doc.add(None, rect(0.0, 0.0, 10.0, 10.0));
        let b = doc.add(None, rect(1.0, 1.0, 10.0, 10.0));
        let c = doc.add(None, rect(2.0, 2.0, 10.0, 10.0));

        assert_eq!(doc.children(doc.root), vec![a, b, c]);

        assert!(doc.bring_forward(a));
        assert_eq!(doc.children(doc.root), vec![b, a, c]);

        assert!(doc.bring_to_front(b));
        assert_eq!(doc.children(doc.root), vec![a, c, b]);

        assert!(doc.send_to_back(c));
        assert_eq!(doc.children(doc.root), vec![c, a, b]);

        assert!(!doc.send_backward(c), "already at the back");
        doc.validate().unwrap();
    }

    #[test]
    fn world_transform_composes_parent_chain() {
        let mut doc = DiagramGraph::new();
        let group = doc.add(
            None,
            Diagram::new(DiagramKind::Group).with_frame(Frame::new(100.0, 100.0, 200.0, 200.0)),
        );
        let child = doc.add(Some(group), rect(10.0, 0.0, 10.0, 10.0));

        let world = doc.world_transform(child);
        let origin = world.transform_point2(glam::Vec2::ZERO);
        assert!((origin - glam::Vec2::new(110.0, 100.0)).length() < 1e-4);
    }

    #[test]
    fn ensure_connect_points_is_idempotent() {
        let mut doc = DiagramGraph::new();
        let r = doc.add(None, rect(0.0, 0.0, 40.0, 40.0));
        doc.ensure_connect_points(r);
        doc.ensure_connect_points(r);

        let points = doc
            .children(r)
            .into_iter()
            .filter(|&c| matches!(doc.graph[c].kind, DiagramKind::ConnectPoint { .. }))
            .count();
        assert_eq!(points, 4);
        doc.validate().unwrap();
    }

    #[test]
    fn connect_points_not_generated_for_text() {
        let mut doc = DiagramGraph::new();
        let t = doc.add(
            None,
            Diagram::new(DiagramKind::Text {
                block: TextBlock::from_text("hi"),
            }),
        );
        doc.ensure_connect_points(t);
        assert!(doc.children(t).is_empty());
    }

    #[test]
    fn capability_traits() {
        let group = DiagramKind::Group;
        assert!(group.is_itemable());
        assert!(!group.is_connectable());

        let mut rect = DiagramKind::Rectangle { corner_radius: 4.0 };
        assert_eq!(rect.corner_radius(), Some(4.0));
        rect.set_corner_radius(-2.0);
        assert_eq!(rect.corner_radius(), Some(0.0));

        let text = DiagramKind::Text {
            block: TextBlock::from_text("label"),
        };
        assert_eq!(text.text_block().map(|b| b.text.as_str()), Some("label"));
        assert!(DiagramKind::Ellipse.text_block().is_none());
    }
}
