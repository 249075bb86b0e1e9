//! The editing session: one canvas instance owning its tree, selection,
//! history, canvas bounds, and notification channel.
//!
//! All mutation funnels through [`Session::apply_mutation`] and is
//! all-or-nothing: preconditions are checked before anything is
//! touched, so a returned error means an unchanged tree. History is
//! not pushed here — gestures and commands decide when a checkpoint
//! becomes an undo step (one per gesture, on pointer-up).

use crate::error::{EditorError, EditorResult};
use crate::events::{EventBus, EventId, Notification};
use crate::history::History;
use dg_core::connect::{self, ConnectLine, Endpoint};
use dg_core::data::{DiagramData, Snapshot, project_to_data, rehydrate};
use dg_core::geometry::decompose_affine;
use dg_core::id::DiagramId;
use dg_core::model::{
    CornerRoundable, Diagram, DiagramGraph, DiagramKind, Frame, Itemable, NodeIndex, Textable,
};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How much the canvas grows per edge crossing during a drag.
pub const CANVAS_EXPANSION_STEP: f32 = 300.0;
/// How close to a canvas edge the pointer must be to trigger expansion.
pub const CANVAS_EDGE_THRESHOLD: f32 = 50.0;

// ─── Canvas bounds ───────────────────────────────────────────────────────

/// Current extent of the infinite canvas. `x, y` is the min corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for CanvasBounds {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 800.0,
            height: 600.0,
        }
    }
}

impl CanvasBounds {
    /// Grow toward any edge the pointer is within the threshold of, by
    /// exactly one expansion step per edge. Returns whether anything
    /// grew. A step moves the edge well past the threshold, so a single
    /// crossing can never expand twice.
    pub fn expand_for_pointer(&mut self, p: Vec2) -> bool {
        let mut grew = false;
        if p.x >= self.x + self.width - CANVAS_EDGE_THRESHOLD {
            self.width += CANVAS_EXPANSION_STEP;
            grew = true;
        }
        if p.x <= self.x + CANVAS_EDGE_THRESHOLD {
            self.x -= CANVAS_EXPANSION_STEP;
            self.width += CANVAS_EXPANSION_STEP;
            grew = true;
        }
        if p.y >= self.y + self.height - CANVAS_EDGE_THRESHOLD {
            self.height += CANVAS_EXPANSION_STEP;
            grew = true;
        }
        if p.y <= self.y + CANVAS_EDGE_THRESHOLD {
            self.y -= CANVAS_EXPANSION_STEP;
            self.height += CANVAS_EXPANSION_STEP;
            grew = true;
        }
        grew
    }
}

// ─── Mutations ───────────────────────────────────────────────────────────

/// Sparse update for a diagram. Only present fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagramPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f32>,
}

/// Z-order operations on a diagram within its parent's paint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZOrderOp {
    BringForward,
    SendBackward,
    BringToFront,
    SendToBack,
}

/// A mutation that can be applied to the diagram tree. Produced by the
/// interaction state machine and by the command boundary.
#[derive(Debug, Clone)]
pub enum DiagramMutation {
    /// Insert a new diagram under `parent` (root when `None`).
    Add {
        parent: Option<DiagramId>,
        diagram: Box<Diagram>,
    },
    /// Translate by a delta in the parent's coordinate space.
    Move { id: DiagramId, dx: f32, dy: f32 },
    /// Set width/height (clamped ≥ 0); connect points re-anchor.
    Resize {
        id: DiagramId,
        width: f32,
        height: f32,
    },
    /// Set absolute rotation in degrees.
    Rotate { id: DiagramId, rotation: f32 },
    /// Replace the text of a textable diagram.
    SetText { id: DiagramId, text: String },
    /// Apply a sparse property update.
    Patch { id: DiagramId, patch: DiagramPatch },
    /// Delete a diagram and its subtree; dependent connect lines go
    /// with it.
    Remove { id: DiagramId },
    /// Clone a subtree with fresh ids, offset slightly.
    Duplicate { id: DiagramId },
    /// Group sibling diagrams under a new Group at their bounding frame.
    Group {
        ids: Vec<DiagramId>,
        group_id: DiagramId,
    },
    /// Dissolve a group, re-expressing children in the parent's space.
    Ungroup { id: DiagramId },
    /// Create a connect line between two resolvable endpoints.
    Connect { line: ConnectLine },
    /// Move a diagram under a new parent, preserving its world
    /// transform.
    Reparent {
        id: DiagramId,
        new_parent: Option<DiagramId>,
    },
    /// Adjust paint order within the parent.
    ZOrder { id: DiagramId, op: ZOrderOp },
}

// ─── Queries ─────────────────────────────────────────────────────────────

/// Summary record returned by [`Session::top_level_shapes_info`].
#[derive(Debug, Clone, Serialize)]
pub struct ShapeInfo {
    pub id: DiagramId,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub frame: Frame,
}

// ─── Session ─────────────────────────────────────────────────────────────

/// One canvas instance: the tree, its selection, its history, its
/// bounds, and its notification channel. Multiple sessions are fully
/// independent.
pub struct Session {
    pub doc: DiagramGraph,
    pub history: History,
    pub bus: EventBus,
    pub canvas: CanvasBounds,
    selection: Vec<DiagramId>,
    handled_events: HashSet<EventId>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            doc: DiagramGraph::new(),
            history: History::new(),
            bus: EventBus::new(),
            canvas: CanvasBounds::default(),
            selection: Vec::new(),
            handled_events: HashSet::new(),
        }
    }

    // ─── Snapshots & history ─────────────────────────────────────────────

    /// Data projection of the current tree.
    pub fn checkpoint(&self) -> Snapshot {
        Snapshot::from_graph(&self.doc)
    }

    /// Record `before` as one undo step.
    pub fn commit(&mut self, before: Snapshot) {
        self.history.push(before);
    }

    /// Apply a mutation and record it as a single undo step. Used for
    /// one-shot operations (commands, keyboard actions); gestures
    /// checkpoint/commit around the whole gesture instead.
    pub fn execute(&mut self, mutation: DiagramMutation) -> EditorResult<Option<DiagramId>> {
        let before = self.checkpoint();
        let created = self.apply_mutation(mutation)?;
        self.commit(before);
        Ok(created)
    }

    pub fn undo(&mut self) -> bool {
        let current = self.checkpoint();
        match self.history.undo(current) {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = self.checkpoint();
        match self.history.redo(current) {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Replace the live tree with a snapshot, keeping whatever part of
    /// the selection still resolves. Transient flags come back at their
    /// defaults — snapshots are Data.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.doc = snapshot.restore();
        let surviving: Vec<DiagramId> = self
            .selection
            .iter()
            .copied()
            .filter(|id| self.doc.index_of(*id).is_some())
            .collect();
        self.selection.clear();
        for id in surviving {
            self.mark_selected(id, true);
            self.selection.push(id);
        }
    }

    // ─── Selection ───────────────────────────────────────────────────────

    pub fn selected_ids(&self) -> &[DiagramId] {
        &self.selection
    }

    /// Replace (or extend, when `additive`) the selection. Every id
    /// must resolve; connect points are never selectable.
    pub fn select(&mut self, ids: &[DiagramId], additive: bool) -> EditorResult<()> {
        for &id in ids {
            let diagram = self.doc.find_by_id(id).ok_or(EditorError::NotFound(id))?;
            if matches!(diagram.kind, DiagramKind::ConnectPoint { .. } | DiagramKind::Canvas) {
                return Err(EditorError::InvariantViolation(format!(
                    "{id} is not selectable"
                )));
            }
        }
        if !additive {
            self.deselect_all();
        }
        for &id in ids {
            if !self.selection.contains(&id) {
                self.selection.push(id);
                self.mark_selected(id, true);
            }
        }
        Ok(())
    }

    pub fn deselect_all(&mut self) {
        for id in std::mem::take(&mut self.selection) {
            self.mark_selected(id, false);
        }
    }

    /// Toggle one id in or out of the selection (shift-click).
    pub fn toggle_selected(&mut self, id: DiagramId) -> EditorResult<()> {
        if let Some(pos) = self.selection.iter().position(|&s| s == id) {
            self.selection.remove(pos);
            self.mark_selected(id, false);
            Ok(())
        } else {
            self.select(&[id], true)
        }
    }

    pub fn select_all(&mut self) {
        self.deselect_all();
        let top: Vec<DiagramId> = self
            .doc
            .children(self.doc.root)
            .into_iter()
            .map(|idx| self.doc.graph[idx].id)
            .filter(|&id| {
                !matches!(
                    self.doc.find_by_id(id).map(|d| &d.kind),
                    Some(DiagramKind::ConnectPoint { .. })
                )
            })
            .collect();
        let _ = self.select(&top, false);
    }

    fn mark_selected(&mut self, id: DiagramId, selected: bool) {
        if let Some(diagram) = self.doc.find_by_id_mut(id) {
            diagram.is_selected = selected;
        }
    }

    /// Enter/leave inline text editing on a textable diagram. Purely a
    /// transient flag: never persisted, never an undo step.
    pub fn set_text_editing(&mut self, id: DiagramId, editing: bool) -> EditorResult<()> {
        let diagram = self.doc.find_by_id_mut(id).ok_or(EditorError::NotFound(id))?;
        if diagram.kind.text_block().is_none() {
            return Err(EditorError::InvariantViolation(format!(
                "{id} is not textable"
            )));
        }
        diagram.is_text_editing = editing;
        Ok(())
    }

    fn prune_selection(&mut self) {
        self.selection.retain(|id| self.doc.index_of(*id).is_some());
    }

    // ─── Connect channel ─────────────────────────────────────────────────

    /// Publish a connection request on the bus. The mutation happens
    /// when the session pumps the channel, not here.
    pub fn request_connect(&mut self, source: Endpoint, target: Endpoint) -> EventId {
        let event_id = EventId::next();
        self.bus.publish(Notification::ConnectRequested {
            event_id,
            source,
            target,
        });
        event_id
    }

    /// Process queued connection requests in publish order. Requests
    /// whose `event_id` was already handled are ignored (duplicate or
    /// re-delivered events). Each completed connection is one undo step
    /// and triggers a flash cue for the new line. Returns the ids of
    /// the lines created.
    pub fn pump_events(&mut self) -> EditorResult<Vec<DiagramId>> {
        let mut created = Vec::new();
        let mut first_err = None;
        for notification in self.bus.drain() {
            let Notification::ConnectRequested {
                event_id,
                source,
                target,
            } = notification
            else {
                continue;
            };
            if !self.handled_events.insert(event_id) {
                log::debug!("ignoring duplicate connect request {event_id:?}");
                continue;
            }
            match self.execute(DiagramMutation::Connect {
                line: ConnectLine::between(source, target),
            }) {
                Ok(Some(line_id)) => {
                    created.push(line_id);
                    if let Some(idx) = self.doc.index_of(line_id)
                        && let Some(data) = project_to_data(&self.doc, idx)
                    {
                        self.bus.publish(Notification::ConnectLineFlash { line: data });
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(created),
        }
    }

    // ─── Queries (external interface) ────────────────────────────────────

    /// Summaries of the root-level shapes (connect lines and points
    /// excluded).
    pub fn top_level_shapes_info(&self) -> Vec<ShapeInfo> {
        self.doc
            .children(self.doc.root)
            .into_iter()
            .map(|idx| &self.doc.graph[idx])
            .filter(|d| {
                !matches!(
                    d.kind,
                    DiagramKind::ConnectLine(_) | DiagramKind::ConnectPoint { .. }
                )
            })
            .map(|d| ShapeInfo {
                id: d.id,
                kind: d.kind.id_prefix(),
                name: d.name.clone(),
                frame: d.frame,
            })
            .collect()
    }

    /// Data projection of the current selection, document order.
    pub fn selected_as_data(&self) -> Vec<DiagramData> {
        let wanted: HashSet<DiagramId> = self.selection.iter().copied().collect();
        self.doc
            .preorder()
            .into_iter()
            .filter(|&idx| wanted.contains(&self.doc.graph[idx].id))
            .filter_map(|idx| project_to_data(&self.doc, idx))
            .collect()
    }

    pub fn find_diagrams_by_ids(&self, ids: &[DiagramId]) -> Vec<DiagramData> {
        let wanted: HashSet<DiagramId> = ids.iter().copied().collect();
        self.doc
            .preorder()
            .into_iter()
            .filter(|&idx| wanted.contains(&self.doc.graph[idx].id))
            .filter_map(|idx| project_to_data(&self.doc, idx))
            .collect()
    }

    pub fn collect_all_ids(&self) -> Vec<DiagramId> {
        self.doc.collect_all_ids()
    }

    // ─── Mutation engine ─────────────────────────────────────────────────

    /// Apply one mutation. Preconditions are verified before any write;
    /// on error the tree is untouched. Returns the id of a created
    /// diagram where one exists (Add/Duplicate/Group/Connect).
    pub fn apply_mutation(&mut self, mutation: DiagramMutation) -> EditorResult<Option<DiagramId>> {
        match mutation {
            DiagramMutation::Add { parent, diagram } => self.apply_add(parent, *diagram),
            DiagramMutation::Move { id, dx, dy } => {
                let idx = self.resolve_mutable(id)?;
                if self.geometry_is_derived(idx) {
                    return Err(EditorError::InvariantViolation(format!(
                        "{id} cannot be moved independently"
                    )));
                }
                let frame = &mut self.doc.graph[idx].frame;
                frame.x += dx;
                frame.y += dy;
                Ok(None)
            }
            DiagramMutation::Resize { id, width, height } => {
                let idx = self.resolve_mutable(id)?;
                if self.geometry_is_derived(idx) {
                    return Err(EditorError::InvariantViolation(format!(
                        "{id} has derived geometry"
                    )));
                }
                self.doc.graph[idx].frame.set_size(width, height);
                connect::layout_connect_points(&mut self.doc, idx);
                Ok(None)
            }
            DiagramMutation::Rotate { id, rotation } => {
                let idx = self.resolve_mutable(id)?;
                if self.geometry_is_derived(idx) {
                    return Err(EditorError::InvariantViolation(format!(
                        "{id} has derived geometry"
                    )));
                }
                self.doc.graph[idx].frame.rotation = rotation;
                Ok(None)
            }
            DiagramMutation::SetText { id, text } => {
                let idx = self.resolve_mutable(id)?;
                let Some(block) = self.doc.graph[idx].kind.text_block_mut() else {
                    return Err(EditorError::InvariantViolation(format!(
                        "{id} is not textable"
                    )));
                };
                block.text = text;
                Ok(None)
            }
            DiagramMutation::Patch { id, patch } => self.apply_patch(id, patch),
            DiagramMutation::Remove { id } => {
                let idx = self.resolve_mutable(id)?;
                self.remove_with_gc(idx);
                Ok(None)
            }
            DiagramMutation::Duplicate { id } => self.apply_duplicate(id),
            DiagramMutation::Group { ids, group_id } => self.apply_group(&ids, group_id),
            DiagramMutation::Ungroup { id } => self.apply_ungroup(id),
            DiagramMutation::Connect { line } => self.apply_connect(line),
            DiagramMutation::Reparent { id, new_parent } => self.apply_reparent(id, new_parent),
            DiagramMutation::ZOrder { id, op } => {
                let idx = self.resolve_mutable(id)?;
                match op {
                    ZOrderOp::BringForward => self.doc.bring_forward(idx),
                    ZOrderOp::SendBackward => self.doc.send_backward(idx),
                    ZOrderOp::BringToFront => self.doc.bring_to_front(idx),
                    ZOrderOp::SendToBack => self.doc.send_to_back(idx),
                };
                Ok(None)
            }
        }
    }

    fn resolve_mutable(&self, id: DiagramId) -> EditorResult<NodeIndex> {
        let idx = self.doc.index_of(id).ok_or(EditorError::NotFound(id))?;
        if idx == self.doc.root {
            return Err(EditorError::NotFound(id));
        }
        Ok(idx)
    }

    fn geometry_is_derived(&self, idx: NodeIndex) -> bool {
        matches!(
            self.doc.graph[idx].kind,
            DiagramKind::ConnectPoint { .. } | DiagramKind::ConnectLine(_)
        )
    }

    fn apply_add(
        &mut self,
        parent: Option<DiagramId>,
        diagram: Diagram,
    ) -> EditorResult<Option<DiagramId>> {
        match &diagram.kind {
            DiagramKind::Canvas => {
                return Err(EditorError::InvariantViolation(
                    "cannot add a canvas root".into(),
                ));
            }
            DiagramKind::ConnectPoint { .. } => {
                return Err(EditorError::InvariantViolation(
                    "connect points are generated with their owner".into(),
                ));
            }
            DiagramKind::ConnectLine(line) => {
                self.require_resolvable(line)?;
            }
            _ => {}
        }
        let parent_idx = match parent {
            Some(pid) => {
                let idx = self.doc.index_of(pid).ok_or(EditorError::NotFound(pid))?;
                if idx != self.doc.root && !self.doc.graph[idx].kind.is_itemable() {
                    return Err(EditorError::InvariantViolation(format!(
                        "{pid} cannot contain children"
                    )));
                }
                Some(idx)
            }
            None => None,
        };
        let id = diagram.id;
        let idx = self.doc.add(parent_idx, diagram);
        self.doc.ensure_connect_points(idx);
        log::debug!("added {id}");
        Ok(Some(id))
    }

    fn apply_patch(&mut self, id: DiagramId, patch: DiagramPatch) -> EditorResult<Option<DiagramId>> {
        let idx = self.resolve_mutable(id)?;

        // Verify applicability before touching anything.
        if patch.text.is_some() && self.doc.graph[idx].kind.text_block().is_none() {
            return Err(EditorError::InvariantViolation(format!(
                "{id} is not textable"
            )));
        }
        if patch.corner_radius.is_some() && self.doc.graph[idx].kind.corner_radius().is_none() {
            return Err(EditorError::InvariantViolation(format!(
                "{id} has no corner radius"
            )));
        }
        let touches_geometry = patch.x.is_some()
            || patch.y.is_some()
            || patch.width.is_some()
            || patch.height.is_some()
            || patch.rotation.is_some()
            || patch.scale_x.is_some()
            || patch.scale_y.is_some();
        if touches_geometry && self.geometry_is_derived(idx) {
            return Err(EditorError::InvariantViolation(format!(
                "{id} has derived geometry"
            )));
        }

        let diagram = &mut self.doc.graph[idx];
        if let Some(x) = patch.x {
            diagram.frame.x = x;
        }
        if let Some(y) = patch.y {
            diagram.frame.y = y;
        }
        if patch.width.is_some() || patch.height.is_some() {
            let w = patch.width.unwrap_or(diagram.frame.width);
            let h = patch.height.unwrap_or(diagram.frame.height);
            diagram.frame.set_size(w, h);
        }
        if let Some(r) = patch.rotation {
            diagram.frame.rotation = r;
        }
        if let Some(sx) = patch.scale_x {
            diagram.frame.scale_x = sx;
        }
        if let Some(sy) = patch.scale_y {
            diagram.frame.scale_y = sy;
        }
        if let Some(name) = patch.name {
            diagram.name = Some(name);
        }
        if let Some(description) = patch.description {
            diagram.description = Some(description);
        }
        if let Some(text) = patch.text
            && let Some(block) = diagram.kind.text_block_mut()
        {
            block.text = text;
        }
        if let Some(radius) = patch.corner_radius {
            diagram.kind.set_corner_radius(radius);
        }
        connect::layout_connect_points(&mut self.doc, idx);
        Ok(None)
    }

    /// Remove a subtree plus every connect line that loses an endpoint,
    /// cascading until no dangling line remains.
    fn remove_with_gc(&mut self, idx: NodeIndex) {
        let removed = self.doc.remove_subtree(idx);
        log::debug!("removed {} diagram(s)", removed.len());
        loop {
            let dangling = self.doc.dangling_lines(&HashSet::new());
            if dangling.is_empty() {
                break;
            }
            for line_id in dangling {
                if let Some(line_idx) = self.doc.index_of(line_id) {
                    self.doc.remove_subtree(line_idx);
                }
            }
        }
        self.prune_selection();
    }

    fn apply_duplicate(&mut self, id: DiagramId) -> EditorResult<Option<DiagramId>> {
        let idx = self.resolve_mutable(id)?;
        if self.geometry_is_derived(idx) {
            return Err(EditorError::InvariantViolation(format!(
                "{id} cannot be duplicated directly"
            )));
        }
        let parent = self.doc.parent_of(idx);
        let data = project_to_data(&self.doc, idx)
            .ok_or_else(|| EditorError::InvariantViolation(format!("{id} is not projectable")))?;

        // Fresh ids for the whole clone, endpoints remapped where they
        // point inside it.
        let mut id_map = HashMap::new();
        let mut cloned = remint_ids(&data, &mut id_map);
        remap_endpoints(&mut cloned, &id_map);
        cloned.frame.x += 20.0;
        cloned.frame.y += 20.0;

        let new_idx = rehydrate(&mut self.doc, parent, &cloned);
        Ok(Some(self.doc.graph[new_idx].id))
    }

    fn apply_group(
        &mut self,
        ids: &[DiagramId],
        group_id: DiagramId,
    ) -> EditorResult<Option<DiagramId>> {
        if ids.len() < 2 {
            return Err(EditorError::InvariantViolation(
                "grouping needs at least two diagrams".into(),
            ));
        }
        let mut indices = Vec::with_capacity(ids.len());
        for &id in ids {
            indices.push(self.resolve_mutable(id)?);
        }
        let parent = self.doc.parent_of(indices[0]);
        for &idx in &indices[1..] {
            if self.doc.parent_of(idx) != parent {
                return Err(EditorError::InvariantViolation(
                    "grouped diagrams must be siblings".into(),
                ));
            }
        }
        let Some(parent) = parent else {
            return Err(EditorError::InvariantViolation(
                "grouped diagrams must share a parent".into(),
            ));
        };

        // Bounding frame over the members' rotated corners, in the
        // common parent's space.
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        for &idx in &indices {
            let (lo, hi) = self.doc.graph[idx].frame.aabb();
            min = min.min(lo);
            max = max.max(hi);
        }
        let center = (min + max) / 2.0;
        let size = max - min;

        // The group takes the bottom-most member's slot in the paint
        // order, so group→ungroup restores sibling order exactly.
        let insert_at = indices
            .iter()
            .filter_map(|&idx| self.doc.order_in_parent(idx))
            .min()
            .unwrap_or(0);
        let group = Diagram::with_id(group_id, DiagramKind::Group)
            .with_frame(Frame::new(center.x, center.y, size.x, size.y));
        let group_idx = self.doc.add(Some(parent), group);
        self.doc.reparent_at(group_idx, parent, insert_at);

        // Reparent in document order; the group transform is a pure
        // translation at creation, so shifting each member by the group
        // center preserves world positions exactly.
        let member_set: HashSet<NodeIndex> = indices.iter().copied().collect();
        let ordered: Vec<NodeIndex> = self
            .doc
            .children(parent)
            .into_iter()
            .filter(|idx| member_set.contains(idx))
            .collect();
        for idx in ordered {
            self.doc.reparent(idx, group_idx);
            let frame = &mut self.doc.graph[idx].frame;
            frame.x -= center.x;
            frame.y -= center.y;
        }
        Ok(Some(group_id))
    }

    fn apply_ungroup(&mut self, id: DiagramId) -> EditorResult<Option<DiagramId>> {
        let group_idx = self.resolve_mutable(id)?;
        if !matches!(self.doc.graph[group_idx].kind, DiagramKind::Group) {
            return Err(EditorError::InvariantViolation(format!(
                "{id} is not a group"
            )));
        }
        let Some(parent) = self.doc.parent_of(group_idx) else {
            return Err(EditorError::InvariantViolation(format!(
                "{id} has no parent"
            )));
        };
        let splice_at = self.doc.order_in_parent(group_idx).unwrap_or(0);
        let group_transform = self.doc.graph[group_idx].frame.local_transform();

        // Children splice into the parent at the group's former slot,
        // keeping their relative paint order. The group may have been
        // moved/rotated/scaled since creation, so each child's frame is
        // re-expressed through the composed transform.
        let children = self.doc.children(group_idx);
        for (offset, child_idx) in children.iter().enumerate() {
            let child = &self.doc.graph[*child_idx];
            let parts = decompose_affine(group_transform * child.frame.local_transform());
            let frame = &mut self.doc.graph[*child_idx].frame;
            frame.x = parts.tx;
            frame.y = parts.ty;
            frame.rotation = parts.theta;
            frame.scale_x = parts.sx;
            frame.scale_y = parts.sy;
            self.doc.reparent_at(*child_idx, parent, splice_at + offset);
        }
        self.doc.remove_subtree(group_idx);
        self.prune_selection();
        Ok(None)
    }

    fn apply_connect(&mut self, line: ConnectLine) -> EditorResult<Option<DiagramId>> {
        self.require_resolvable(&line)?;
        let diagram = Diagram::new(DiagramKind::ConnectLine(line));
        let id = diagram.id;
        self.doc.add(None, diagram);
        Ok(Some(id))
    }

    fn require_resolvable(&self, line: &ConnectLine) -> EditorResult<()> {
        for endpoint in [line.source, line.target] {
            let id = endpoint.id();
            if self.doc.index_of(id).is_none() {
                return Err(EditorError::InvariantViolation(format!(
                    "connection endpoint {id} does not resolve"
                )));
            }
        }
        if line.source.id() == line.target.id() {
            return Err(EditorError::InvariantViolation(
                "connection endpoints must differ".into(),
            ));
        }
        Ok(())
    }

    fn apply_reparent(
        &mut self,
        id: DiagramId,
        new_parent: Option<DiagramId>,
    ) -> EditorResult<Option<DiagramId>> {
        let idx = self.resolve_mutable(id)?;
        let parent_idx = match new_parent {
            Some(pid) => {
                let p = self.doc.index_of(pid).ok_or(EditorError::NotFound(pid))?;
                if !self.doc.graph[p].kind.is_itemable() {
                    return Err(EditorError::InvariantViolation(format!(
                        "{pid} cannot contain children"
                    )));
                }
                p
            }
            None => self.doc.root,
        };
        if self.doc.is_ancestor(idx, parent_idx) {
            return Err(EditorError::InvariantViolation(format!(
                "cannot reparent {id} into its own subtree"
            )));
        }

        // Preserve the world transform across the parent change.
        let world = self.doc.world_transform(idx);
        let target_world = if parent_idx == self.doc.root {
            glam::Affine2::IDENTITY
        } else {
            self.doc.world_transform(parent_idx)
        };
        let parts = decompose_affine(target_world.inverse() * world);
        if !self.doc.reparent(idx, parent_idx) {
            return Err(EditorError::InvariantViolation(format!(
                "cannot reparent {id}"
            )));
        }
        let frame = &mut self.doc.graph[idx].frame;
        frame.x = parts.tx;
        frame.y = parts.ty;
        frame.rotation = parts.theta;
        frame.scale_x = parts.sx;
        frame.scale_y = parts.sy;
        Ok(None)
    }
}

/// Deep-copy a Data subtree with fresh ids, recording old→new in `map`.
fn remint_ids(data: &DiagramData, map: &mut HashMap<DiagramId, DiagramId>) -> DiagramData {
    let new_id = DiagramId::with_prefix(data.kind.id_prefix());
    map.insert(data.id, new_id);
    let mut kind = data.kind.clone();
    if let DiagramKind::ConnectPoint { owner, .. } = &mut kind
        && let Some(new_owner) = map.get(owner)
    {
        *owner = *new_owner;
    }
    DiagramData {
        id: new_id,
        kind,
        frame: data.frame,
        name: data.name.clone(),
        description: data.description.clone(),
        items: data
            .items
            .iter()
            .map(|item| remint_ids(item, map))
            .collect(),
    }
}

/// Rewrite connect-line endpoints that point inside a re-minted clone.
fn remap_endpoints(data: &mut DiagramData, map: &HashMap<DiagramId, DiagramId>) {
    if let DiagramKind::ConnectLine(line) = &mut data.kind {
        for endpoint in [&mut line.source, &mut line.target] {
            let mapped = match endpoint {
                Endpoint::Point(id) | Endpoint::Node(id) => map.get(id).copied(),
            };
            if let Some(new_id) = mapped {
                *endpoint = match endpoint {
                    Endpoint::Point(_) => Endpoint::Point(new_id),
                    Endpoint::Node(_) => Endpoint::Node(new_id),
                };
            }
        }
    }
    for item in &mut data.items {
        remap_endpoints(item, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_rect(session: &mut Session, x: f32, y: f32, w: f32, h: f32) -> DiagramId {
        session
            .execute(DiagramMutation::Add {
                parent: None,
                diagram: Box::new(
                    Diagram::new(DiagramKind::Rectangle { corner_radius: 0.0 })
                        .with_frame(Frame::new(x, y, w, h)),
                ),
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn add_generates_connect_points() {
        let mut session = Session::new();
        let id = add_rect(&mut session, 0.0, 0.0, 40.0, 40.0);
        let idx = session.doc.index_of(id).unwrap();
        assert_eq!(session.doc.children(idx).len(), 4);
        session.doc.validate().unwrap();
    }

    #[test]
    fn mutations_on_missing_ids_return_not_found() {
        let mut session = Session::new();
        let ghost = DiagramId::intern("ghost");
        let err = session
            .apply_mutation(DiagramMutation::Move {
                id: ghost,
                dx: 1.0,
                dy: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::NotFound(_)));
    }

    #[test]
    fn resize_clamps_and_reanchors_points() {
        let mut session = Session::new();
        let id = add_rect(&mut session, 0.0, 0.0, 40.0, 40.0);
        session
            .execute(DiagramMutation::Resize {
                id,
                width: -10.0,
                height: 80.0,
            })
            .unwrap();
        let d = session.doc.find_by_id(id).unwrap();
        assert_eq!(d.frame.width, 0.0);
        assert_eq!(d.frame.height, 80.0);

        let idx = session.doc.index_of(id).unwrap();
        let bottom = session
            .doc
            .children(idx)
            .into_iter()
            .find(|&c| {
                matches!(
                    session.doc.graph[c].kind,
                    DiagramKind::ConnectPoint { anchor: dg_core::Anchor::Bottom, .. }
                )
            })
            .unwrap();
        assert_eq!(session.doc.graph[bottom].frame.y, 40.0);
    }

    #[test]
    fn patch_rejects_inapplicable_fields_untouched() {
        let mut session = Session::new();
        let id = add_rect(&mut session, 0.0, 0.0, 40.0, 40.0);
        let before = session.checkpoint();

        let err = session
            .apply_mutation(DiagramMutation::Patch {
                id,
                patch: DiagramPatch {
                    x: Some(99.0),
                    text: Some("nope".into()),
                    ..Default::default()
                },
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::InvariantViolation(_)));
        assert_eq!(session.checkpoint(), before, "failed patch must not mutate");
    }

    #[test]
    fn remove_prunes_selection() {
        let mut session = Session::new();
        let id = add_rect(&mut session, 0.0, 0.0, 40.0, 40.0);
        session.select(&[id], false).unwrap();
        session.execute(DiagramMutation::Remove { id }).unwrap();
        assert!(session.selected_ids().is_empty());
    }

    #[test]
    fn duplicate_offsets_and_remints() {
        let mut session = Session::new();
        let id = add_rect(&mut session, 10.0, 10.0, 40.0, 40.0);
        let copy = session
            .execute(DiagramMutation::Duplicate { id })
            .unwrap()
            .unwrap();
        assert_ne!(copy, id);

        let original = session.doc.find_by_id(id).unwrap().frame;
        let cloned = session.doc.find_by_id(copy).unwrap().frame;
        assert_eq!(cloned.x, original.x + 20.0);
        assert_eq!(cloned.y, original.y + 20.0);

        // The clone's connect points belong to the clone, not the
        // original.
        let copy_idx = session.doc.index_of(copy).unwrap();
        for child in session.doc.children(copy_idx) {
            if let DiagramKind::ConnectPoint { owner, .. } = session.doc.graph[child].kind {
                assert_eq!(owner, copy);
            }
        }
        session.doc.validate().unwrap();
    }

    #[test]
    fn connect_rejects_dangling_endpoint() {
        let mut session = Session::new();
        let a = add_rect(&mut session, 0.0, 0.0, 40.0, 40.0);
        let err = session
            .apply_mutation(DiagramMutation::Connect {
                line: ConnectLine::between(
                    Endpoint::Node(a),
                    Endpoint::Node(DiagramId::intern("nobody")),
                ),
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::InvariantViolation(_)));
    }

    #[test]
    fn canvas_expands_once_per_crossing() {
        let mut bounds = CanvasBounds::default();
        let p = Vec2::new(past_right_threshold(&bounds), 300.0);

        assert!(bounds.expand_for_pointer(p));
        let after_first = bounds;
        // Same pointer position: the edge moved 300 away, no re-fire.
        assert!(!bounds.expand_for_pointer(p));
        assert_eq!(bounds, after_first);
        assert_eq!(bounds.width, 800.0 + CANVAS_EXPANSION_STEP);
    }

    fn past_right_threshold(bounds: &CanvasBounds) -> f32 {
        bounds.x + bounds.width - CANVAS_EDGE_THRESHOLD + 1.0
    }

    #[test]
    fn sessions_are_independent() {
        let mut first = Session::new();
        let mut second = Session::new();
        let id = add_rect(&mut first, 0.0, 0.0, 40.0, 40.0);

        assert!(second.doc.find_by_id(id).is_none());
        assert!(!second.undo(), "histories are per session");
        assert!(first.undo());
        assert!(first.doc.find_by_id(id).is_none());
    }

    #[test]
    fn selection_rejects_connect_points() {
        let mut session = Session::new();
        let id = add_rect(&mut session, 0.0, 0.0, 40.0, 40.0);
        let idx = session.doc.index_of(id).unwrap();
        let point_id = session.doc.graph[session.doc.children(idx)[0]].id;

        assert!(session.select(&[point_id], false).is_err());
    }
}
