//! Pointer-driven interaction state machine.
//!
//! One canvas has at most one active gesture: pointer-down in `Idle`
//! picks the next state from the hit test, every other pointer-down is
//! ignored until the gesture ends. All states return to `Idle` on
//! pointer-up; Escape cancels the gesture and rolls the tree back to
//! its pre-gesture snapshot without creating a history entry.
//!
//! A mutating gesture (drag/resize/rotate, or a drop that reparents)
//! commits exactly one history entry, on pointer-up. Area selection and
//! cancelled connect drags never touch the tree.

use crate::error::EditorResult;
use crate::events::Notification;
use crate::hit::{self, HitOptions, HitTarget};
use crate::input::{InputEvent, Modifiers};
use crate::session::{DiagramMutation, Session};
use dg_core::connect::Endpoint;
use dg_core::data::Snapshot;
use dg_core::model::Itemable;
use dg_core::geometry::{cursor_for_angle, inverse_map_point};
use dg_core::id::DiagramId;
use dg_core::model::{DiagramKind, NodeIndex};
use glam::Vec2;
use std::collections::HashSet;

/// The active gesture, if any.
#[derive(Debug, Clone)]
pub enum InteractionState {
    Idle,
    Dragging {
        last: Vec2,
        drop_target: Option<DiagramId>,
        moved: bool,
    },
    Resizing {
        id: DiagramId,
        corner: usize,
        moved: bool,
    },
    Rotating {
        id: DiagramId,
        moved: bool,
    },
    AreaSelecting {
        start: Vec2,
        current: Vec2,
        additive: bool,
    },
    ConnectingLine {
        source_owner: DiagramId,
        source_point: DiagramId,
        cursor: Vec2,
    },
}

/// The interaction engine for one canvas. Owns no tree state beyond the
/// pre-gesture snapshot used for cancellation.
pub struct Interaction {
    state: InteractionState,
    before: Option<Snapshot>,
}

impl Default for Interaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Interaction {
    pub fn new() -> Self {
        Self {
            state: InteractionState::Idle,
            before: None,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, InteractionState::Idle)
    }

    /// Preview endpoints of an in-progress connect drag, for ghost
    /// rendering. The preview lives here, never in the tree.
    pub fn preview_line(&self, session: &Session) -> Option<(Vec2, Vec2)> {
        let InteractionState::ConnectingLine {
            source_point,
            cursor,
            ..
        } = &self.state
        else {
            return None;
        };
        let idx = session.doc.index_of(*source_point)?;
        let frame = session.doc.graph[idx].frame;
        let start = session
            .doc
            .parent_world_transform(idx)
            .transform_point2(Vec2::new(frame.x, frame.y));
        Some((start, *cursor))
    }

    /// The marquee rectangle of an in-progress area select, normalized.
    pub fn marquee(&self) -> Option<(Vec2, Vec2)> {
        let InteractionState::AreaSelecting { start, current, .. } = &self.state else {
            return None;
        };
        Some((start.min(*current), start.max(*current)))
    }

    /// Hover feedback: the resize cursor token for the handle under the
    /// pointer, if any.
    pub fn hover_cursor(&self, session: &Session, p: Vec2) -> Option<&'static str> {
        let HitTarget::ResizeHandle { id, .. } = hit::hit_test(&session.doc, p, self.hit_options())
        else {
            return None;
        };
        let idx = session.doc.index_of(id)?;
        let frame = session.doc.graph[idx].frame;
        let center = session
            .doc
            .parent_world_transform(idx)
            .transform_point2(Vec2::new(frame.x, frame.y));
        let v = p - center;
        // 0° = north, clockwise.
        let angle = v.x.atan2(-v.y).to_degrees();
        Some(cursor_for_angle(angle).token())
    }

    fn hit_options(&self) -> HitOptions {
        HitOptions {
            show_all_connect_points: matches!(self.state, InteractionState::ConnectingLine { .. }),
        }
    }

    /// Feed one input event through the machine.
    pub fn handle(&mut self, event: &InputEvent, session: &mut Session) -> EditorResult<()> {
        match event {
            InputEvent::PointerDown { x, y, modifiers } => {
                self.pointer_down(Vec2::new(*x, *y), *modifiers, session)
            }
            InputEvent::PointerMove { x, y, .. } => {
                self.pointer_move(Vec2::new(*x, *y), session)
            }
            InputEvent::PointerUp { x, y, .. } => self.pointer_up(Vec2::new(*x, *y), session),
            InputEvent::Key { key, .. } if key == "Escape" => {
                self.cancel(session);
                Ok(())
            }
            InputEvent::Key { .. } => Ok(()),
        }
    }

    /// Abort the active gesture: restore the pre-gesture tree (no
    /// history entry) and return to `Idle`.
    pub fn cancel(&mut self, session: &mut Session) {
        self.clear_drop_target(session);
        if let Some(before) = self.before.take() {
            session.restore(before);
        }
        self.state = InteractionState::Idle;
    }

    // ─── Pointer down ────────────────────────────────────────────────────

    fn pointer_down(
        &mut self,
        p: Vec2,
        modifiers: Modifiers,
        session: &mut Session,
    ) -> EditorResult<()> {
        if !self.is_idle() {
            // At most one active gesture per canvas.
            return Ok(());
        }

        match hit::hit_test(&session.doc, p, HitOptions::default()) {
            HitTarget::ConnectPoint { owner, point, .. } => {
                self.state = InteractionState::ConnectingLine {
                    source_owner: owner,
                    source_point: point,
                    cursor: p,
                };
            }
            HitTarget::ResizeHandle { id, corner } => {
                self.before = Some(session.checkpoint());
                self.state = InteractionState::Resizing {
                    id,
                    corner,
                    moved: false,
                };
            }
            HitTarget::RotateHandle { id } => {
                self.before = Some(session.checkpoint());
                self.state = InteractionState::Rotating { id, moved: false };
            }
            HitTarget::Body { id } => {
                if modifiers.shift {
                    session.toggle_selected(id)?;
                } else if !session.selected_ids().contains(&id) {
                    session.select(&[id], false)?;
                }
                self.before = Some(session.checkpoint());
                self.state = InteractionState::Dragging {
                    last: p,
                    drop_target: None,
                    moved: false,
                };
            }
            HitTarget::Canvas => {
                if !modifiers.shift {
                    session.deselect_all();
                }
                self.state = InteractionState::AreaSelecting {
                    start: p,
                    current: p,
                    additive: modifiers.shift,
                };
            }
        }
        Ok(())
    }

    // ─── Pointer move ────────────────────────────────────────────────────

    fn pointer_move(&mut self, p: Vec2, session: &mut Session) -> EditorResult<()> {
        match &mut self.state {
            InteractionState::Idle => {}
            InteractionState::Dragging { last, moved, .. } => {
                let delta = p - *last;
                *last = p;
                if drag_selection(session, delta)? {
                    *moved = true;
                    session.canvas.expand_for_pointer(p);
                }
            }
            InteractionState::Resizing { id, moved, .. } => {
                let id = *id;
                if let Some((width, height)) = resize_extent(session, id, p) {
                    session.apply_mutation(DiagramMutation::Resize { id, width, height })?;
                    *moved = true;
                }
            }
            InteractionState::Rotating { id, moved } => {
                let id = *id;
                if let Some(rotation) = rotation_toward(session, id, p) {
                    session.apply_mutation(DiagramMutation::Rotate { id, rotation })?;
                    *moved = true;
                }
            }
            InteractionState::AreaSelecting { current, .. } => {
                *current = p;
            }
            InteractionState::ConnectingLine { cursor, .. } => {
                *cursor = p;
            }
        }
        if matches!(self.state, InteractionState::Dragging { .. }) {
            self.update_drop_target(p, session);
        }
        Ok(())
    }

    // ─── Pointer up ──────────────────────────────────────────────────────

    fn pointer_up(&mut self, p: Vec2, session: &mut Session) -> EditorResult<()> {
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        match state {
            InteractionState::Idle => Ok(()),
            InteractionState::Dragging {
                drop_target, moved, ..
            } => {
                self.clear_drop_target_flag(session, drop_target);
                let mut mutated = moved;
                if let Some(target) = drop_target {
                    for id in session.selected_ids().to_vec() {
                        session.apply_mutation(DiagramMutation::Reparent {
                            id,
                            new_parent: Some(target),
                        })?;
                        mutated = true;
                    }
                    session.bus.publish(Notification::DragLeave { target });
                }
                self.finish_gesture(session, mutated);
                Ok(())
            }
            InteractionState::Resizing { moved, .. } | InteractionState::Rotating { moved, .. } => {
                self.finish_gesture(session, moved);
                Ok(())
            }
            InteractionState::AreaSelecting {
                start, additive, ..
            } => {
                let (min, max) = (start.min(p), start.max(p));
                let hits = hit::hit_test_rect(&session.doc, min, max);
                if hits.is_empty() {
                    if !additive {
                        session.deselect_all();
                    }
                } else {
                    session.select(&hits, additive)?;
                }
                self.before = None;
                Ok(())
            }
            InteractionState::ConnectingLine {
                source_owner,
                source_point,
                ..
            } => {
                // Only a drop on a different diagram's connect point
                // completes the connection; anywhere else cancels with
                // no mutation.
                let target = hit::hit_test(
                    &session.doc,
                    p,
                    HitOptions {
                        show_all_connect_points: true,
                    },
                );
                if let HitTarget::ConnectPoint { owner, point, .. } = target
                    && owner != source_owner
                {
                    session.request_connect(Endpoint::Point(source_point), Endpoint::Point(point));
                    session.pump_events()?;
                }
                self.before = None;
                Ok(())
            }
        }
    }

    /// Commit the gesture's single history entry, if it mutated.
    fn finish_gesture(&mut self, session: &mut Session, mutated: bool) {
        if let Some(before) = self.before.take()
            && mutated
        {
            session.commit(before);
        }
    }

    // ─── Drop targets ────────────────────────────────────────────────────

    fn update_drop_target(&mut self, p: Vec2, session: &mut Session) {
        let dragged: HashSet<DiagramId> = session.selected_ids().iter().copied().collect();
        let new_target = drop_target_at(session, p, &dragged);

        let InteractionState::Dragging { drop_target, .. } = &mut self.state else {
            return;
        };
        if *drop_target == new_target {
            return;
        }
        let old = std::mem::replace(drop_target, new_target);

        // Enter/leave only on change, not per move tick.
        if let Some(old_id) = old {
            if let Some(d) = session.doc.find_by_id_mut(old_id) {
                d.is_drop_target = false;
            }
            session.bus.publish(Notification::DragLeave { target: old_id });
        }
        if let Some(new_id) = new_target {
            if let Some(d) = session.doc.find_by_id_mut(new_id) {
                d.is_drop_target = true;
            }
            session.bus.publish(Notification::DragEnter { target: new_id });
        }
    }

    fn clear_drop_target(&mut self, session: &mut Session) {
        if let InteractionState::Dragging { drop_target, .. } = &self.state {
            self.clear_drop_target_flag(session, *drop_target);
        }
    }

    fn clear_drop_target_flag(&self, session: &mut Session, target: Option<DiagramId>) {
        if let Some(id) = target
            && let Some(d) = session.doc.find_by_id_mut(id)
        {
            d.is_drop_target = false;
        }
    }
}

/// Move every selected diagram by a canvas-space delta, mapping the
/// delta through each diagram's parent inverse transform. Diagrams with
/// derived geometry (connect lines) are skipped. Returns whether
/// anything moved.
fn drag_selection(session: &mut Session, delta: Vec2) -> EditorResult<bool> {
    if delta == Vec2::ZERO {
        return Ok(false);
    }
    let mut any = false;
    for id in session.selected_ids().to_vec() {
        let Some(idx) = session.doc.index_of(id) else {
            continue;
        };
        if matches!(
            session.doc.graph[idx].kind,
            DiagramKind::ConnectLine(_) | DiagramKind::ConnectPoint { .. }
        ) {
            continue;
        }
        let local_delta = session
            .doc
            .parent_world_transform(idx)
            .inverse()
            .transform_vector2(delta);
        session.apply_mutation(DiagramMutation::Move {
            id,
            dx: local_delta.x,
            dy: local_delta.y,
        })?;
        any = true;
    }
    Ok(any)
}

/// New width/height for a center-anchored resize toward the pointer.
fn resize_extent(session: &Session, id: DiagramId, p: Vec2) -> Option<(f32, f32)> {
    let idx = session.doc.index_of(id)?;
    let frame = session.doc.graph[idx].frame;
    let parent_local = session
        .doc
        .parent_world_transform(idx)
        .inverse()
        .transform_point2(p);
    let local = inverse_map_point(
        parent_local,
        frame.scale_x,
        frame.scale_y,
        frame.rotation,
        frame.x,
        frame.y,
    );
    Some((local.x.abs() * 2.0, local.y.abs() * 2.0))
}

/// Rotation (degrees, 0 = north, clockwise) pointing the top of the
/// frame toward the pointer.
fn rotation_toward(session: &Session, id: DiagramId, p: Vec2) -> Option<f32> {
    let idx = session.doc.index_of(id)?;
    let frame = session.doc.graph[idx].frame;
    let parent_local = session
        .doc
        .parent_world_transform(idx)
        .inverse()
        .transform_point2(p);
    let v = parent_local - Vec2::new(frame.x, frame.y);
    if v.length_squared() <= f32::EPSILON {
        return None;
    }
    Some(v.x.atan2(-v.y).to_degrees())
}

/// The topmost itemable diagram under `p` that is not being dragged and
/// not inside anything being dragged — the reparent candidate.
fn drop_target_at(session: &Session, p: Vec2, dragged: &HashSet<DiagramId>) -> Option<DiagramId> {
    let doc = &session.doc;
    let mut candidate = None;
    for idx in doc.preorder() {
        let diagram = &doc.graph[idx];
        if !diagram.kind.is_itemable() || dragged.contains(&diagram.id) {
            continue;
        }
        if ancestry_dragged(doc, idx, dragged) {
            continue;
        }
        let parent_local = doc.parent_world_transform(idx).inverse().transform_point2(p);
        let local = inverse_map_point(
            parent_local,
            diagram.frame.scale_x,
            diagram.frame.scale_y,
            diagram.frame.rotation,
            diagram.frame.x,
            diagram.frame.y,
        );
        if local.x.abs() <= diagram.frame.width / 2.0 && local.y.abs() <= diagram.frame.height / 2.0
        {
            // Keep scanning: later pre-order entries paint on top.
            candidate = Some(diagram.id);
        }
    }
    candidate
}

fn ancestry_dragged(doc: &dg_core::model::DiagramGraph, idx: NodeIndex, dragged: &HashSet<DiagramId>) -> bool {
    let mut current = doc.parent_of(idx);
    while let Some(cur) = current {
        if dragged.contains(&doc.graph[cur].id) {
            return true;
        }
        current = doc.parent_of(cur);
    }
    false
}
