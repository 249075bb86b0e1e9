//! Hit testing: canvas point → interaction target.
//!
//! Walks the tree front-to-back (topmost painted first) like the
//! renderer would. When several target kinds overlap at one point the
//! priority is fixed and deterministic:
//!
//! 1. connect point (when visible)
//! 2. resize handle (selected diagrams only)
//! 3. rotate handle (selected diagrams only)
//! 4. diagram body (topmost first; connect lines by segment distance)
//! 5. empty canvas
//!
//! The most specific — smallest — target wins, so a connect point on a
//! selected diagram's edge beats the resize handle underneath it.

use dg_core::connect::{self, Anchor};
use dg_core::geometry::inverse_map_point;
use dg_core::id::DiagramId;
use dg_core::model::{DiagramGraph, DiagramKind, NodeIndex};
use glam::Vec2;

/// Pick radius around a connect point, world units.
pub const CONNECT_POINT_RADIUS: f32 = 6.0;
/// Pick radius around a resize/rotate handle, world units.
pub const HANDLE_RADIUS: f32 = 6.0;
/// Distance from the top edge midpoint to the rotate handle.
pub const ROTATE_HANDLE_OFFSET: f32 = 20.0;
/// Pick distance for connect-line segments.
pub const LINE_TOLERANCE: f32 = 4.0;

/// Corner indices follow `rectangle_vertices` order: TL, TR, BR, BL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    ConnectPoint {
        owner: DiagramId,
        point: DiagramId,
        anchor: Anchor,
    },
    ResizeHandle {
        id: DiagramId,
        corner: usize,
    },
    RotateHandle {
        id: DiagramId,
    },
    Body {
        id: DiagramId,
    },
    Canvas,
}

/// Options threaded through a hit test.
#[derive(Debug, Clone, Copy, Default)]
pub struct HitOptions {
    /// Treat every connect point as visible (set during a connect drag).
    pub show_all_connect_points: bool,
}

/// Find what sits under `p`, honoring the priority above.
pub fn hit_test(doc: &DiagramGraph, p: Vec2, opts: HitOptions) -> HitTarget {
    if let Some(target) = hit_connect_point(doc, p, opts) {
        return target;
    }
    if let Some(target) = hit_handles(doc, p) {
        return target;
    }
    match hit_body(doc, doc.root, p) {
        Some(id) => HitTarget::Body { id },
        None => HitTarget::Canvas,
    }
}

/// All diagrams whose world bounds intersect the rectangle `(min, max)`
/// — marquee selection. Connect points are never included.
pub fn hit_test_rect(doc: &DiagramGraph, min: Vec2, max: Vec2) -> Vec<DiagramId> {
    let mut out = Vec::new();
    for idx in doc.preorder() {
        let diagram = &doc.graph[idx];
        match &diagram.kind {
            DiagramKind::Canvas | DiagramKind::ConnectPoint { .. } => {}
            DiagramKind::ConnectLine(line) => {
                if let Some((s, t)) = connect::resolve_line(doc, line) {
                    let lo = s.min(t);
                    let hi = s.max(t);
                    if lo.x <= max.x && hi.x >= min.x && lo.y <= max.y && hi.y >= min.y {
                        out.push(diagram.id);
                    }
                }
            }
            _ => {
                let (lo, hi) = doc.world_aabb(idx);
                if lo.x <= max.x && hi.x >= min.x && lo.y <= max.y && hi.y >= min.y {
                    out.push(diagram.id);
                }
            }
        }
    }
    out
}

fn hit_connect_point(doc: &DiagramGraph, p: Vec2, opts: HitOptions) -> Option<HitTarget> {
    // Topmost owner first.
    for idx in doc.preorder().into_iter().rev() {
        let diagram = &doc.graph[idx];
        let DiagramKind::ConnectPoint { owner, anchor } = diagram.kind else {
            continue;
        };
        let visible = opts.show_all_connect_points
            || doc
                .find_by_id(owner)
                .is_some_and(|o| o.show_connect_points);
        if !visible {
            continue;
        }
        let center = doc
            .parent_world_transform(idx)
            .transform_point2(Vec2::new(diagram.frame.x, diagram.frame.y));
        if center.distance(p) <= CONNECT_POINT_RADIUS {
            return Some(HitTarget::ConnectPoint {
                owner,
                point: diagram.id,
                anchor,
            });
        }
    }
    None
}

fn hit_handles(doc: &DiagramGraph, p: Vec2) -> Option<HitTarget> {
    for idx in doc.preorder().into_iter().rev() {
        let diagram = &doc.graph[idx];
        if !diagram.is_selected {
            continue;
        }
        let parent_world = doc.parent_world_transform(idx);
        let corners = diagram.frame.vertices().map(|v| parent_world.transform_point2(v));

        for (corner, pos) in corners.iter().enumerate() {
            if pos.distance(p) <= HANDLE_RADIUS {
                return Some(HitTarget::ResizeHandle {
                    id: diagram.id,
                    corner,
                });
            }
        }

        // Rotate handle floats above the top edge midpoint.
        let top_mid = (corners[0] + corners[1]) / 2.0;
        let center = parent_world.transform_point2(Vec2::new(diagram.frame.x, diagram.frame.y));
        let out_dir = top_mid - center;
        if out_dir.length_squared() > f32::EPSILON {
            let handle = top_mid + out_dir.normalize() * ROTATE_HANDLE_OFFSET;
            if handle.distance(p) <= HANDLE_RADIUS {
                return Some(HitTarget::RotateHandle { id: diagram.id });
            }
        }
    }
    None
}

/// Recursive body hit: check children in reverse paint order (topmost
/// first), then self.
fn hit_body(doc: &DiagramGraph, idx: NodeIndex, p: Vec2) -> Option<DiagramId> {
    for child in doc.children(idx).into_iter().rev() {
        if let Some(hit) = hit_body(doc, child, p) {
            return Some(hit);
        }
    }

    let diagram = &doc.graph[idx];
    match &diagram.kind {
        DiagramKind::Canvas | DiagramKind::ConnectPoint { .. } => None,
        DiagramKind::ConnectLine(line) => {
            let (s, t) = connect::resolve_line(doc, line)?;
            (segment_distance(p, s, t) <= LINE_TOLERANCE).then_some(diagram.id)
        }
        _ => {
            let frame = diagram.frame;
            // Into the frame's own (unrotated, unscaled) space; the
            // containment test is then a plain half-extent check.
            let parent_local = doc
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
            (local.x.abs() <= frame.width / 2.0 && local.y.abs() <= frame.height / 2.0)
                .then_some(diagram.id)
        }
    }
}

/// Distance from `p` to the segment `a..b`.
fn segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}
