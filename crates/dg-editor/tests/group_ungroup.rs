//! Integration tests: grouping and ungrouping (dg-editor).
//!
//! Grouping must be transform-preserving: world positions of the
//! members are unchanged by group, and restored exactly by ungroup,
//! including after the group itself was moved, rotated, or scaled.

use dg_editor::error::EditorError;
use dg_editor::session::{DiagramMutation, DiagramPatch, Session};
use dg_core::id::DiagramId;
use dg_core::model::{Diagram, DiagramKind, Frame};
use glam::Vec2;

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

fn world_center(session: &Session, id: DiagramId) -> Vec2 {
    let idx = session.doc.index_of(id).unwrap();
    let frame = session.doc.graph[idx].frame;
    session
        .doc
        .parent_world_transform(idx)
        .transform_point2(Vec2::new(frame.x, frame.y))
}

#[test]
fn group_two_rectangles_bounding_frame() {
    let mut session = Session::new();
    let a = add_rect(&mut session, 100.0, 100.0, 50.0, 50.0);
    let b = add_rect(&mut session, 300.0, 100.0, 50.0, 50.0);

    let group_id = DiagramId::with_prefix("group");
    session
        .execute(DiagramMutation::Group {
            ids: vec![a, b],
            group_id,
        })
        .unwrap();

    // Bounding frame over both: x 75..325, y 75..125.
    let group = session.doc.find_by_id(group_id).unwrap();
    assert_eq!(group.frame.x, 200.0);
    assert_eq!(group.frame.y, 100.0);
    assert_eq!(group.frame.width, 250.0);
    assert_eq!(group.frame.height, 50.0);

    // Members re-expressed in group-local space, world unchanged.
    let a_frame = session.doc.find_by_id(a).unwrap().frame;
    assert_eq!(a_frame.x, -100.0);
    assert_eq!(a_frame.y, 0.0);
    assert!((world_center(&session, a) - Vec2::new(100.0, 100.0)).length() < 1e-4);
    assert!((world_center(&session, b) - Vec2::new(300.0, 100.0)).length() < 1e-4);

    session.doc.validate().unwrap();
}

#[test]
fn ungroup_reverses_group_exactly() {
    let mut session = Session::new();
    let a = add_rect(&mut session, 100.0, 100.0, 50.0, 50.0);
    let b = add_rect(&mut session, 300.0, 100.0, 50.0, 50.0);
    let shape_before = session.checkpoint();

    let group_id = DiagramId::with_prefix("group");
    session
        .execute(DiagramMutation::Group {
            ids: vec![a, b],
            group_id,
        })
        .unwrap();
    session
        .execute(DiagramMutation::Ungroup { id: group_id })
        .unwrap();

    // Same parents, same sibling order, same frames.
    assert_eq!(session.checkpoint(), shape_before);
    session.doc.validate().unwrap();
}

#[test]
fn ungroup_after_moving_rotating_scaling_group() {
    let mut session = Session::new();
    let a = add_rect(&mut session, 100.0, 100.0, 50.0, 50.0);
    let b = add_rect(&mut session, 300.0, 100.0, 50.0, 50.0);
    let a_world = world_center(&session, a);
    let b_world = world_center(&session, b);

    let group_id = DiagramId::with_prefix("group");
    session
        .execute(DiagramMutation::Group {
            ids: vec![a, b],
            group_id,
        })
        .unwrap();

    // Transform the whole group.
    session
        .execute(DiagramMutation::Patch {
            id: group_id,
            patch: DiagramPatch {
                x: Some(250.0),
                y: Some(180.0),
                rotation: Some(30.0),
                scale_x: Some(1.5),
                ..Default::default()
            },
        })
        .unwrap();
    let a_moved = world_center(&session, a);
    let b_moved = world_center(&session, b);
    assert!((a_moved - a_world).length() > 1.0, "group transform moved members");

    // Ungroup: children keep their (new) world placement.
    session
        .execute(DiagramMutation::Ungroup { id: group_id })
        .unwrap();
    assert!((world_center(&session, a) - a_moved).length() < 1e-2);
    assert!((world_center(&session, b) - b_moved).length() < 1e-2);

    let a_frame = session.doc.find_by_id(a).unwrap().frame;
    assert!((a_frame.rotation - 30.0).abs() < 1e-3);
    assert!((a_frame.scale_x - 1.5).abs() < 1e-3);
    session.doc.validate().unwrap();
}

#[test]
fn ungroup_splices_at_former_position() {
    let mut session = Session::new();
    let below = add_rect(&mut session, 0.0, 0.0, 10.0, 10.0);
    let a = add_rect(&mut session, 50.0, 0.0, 10.0, 10.0);
    let b = add_rect(&mut session, 100.0, 0.0, 10.0, 10.0);
    let above = add_rect(&mut session, 150.0, 0.0, 10.0, 10.0);

    let group_id = DiagramId::with_prefix("group");
    session
        .execute(DiagramMutation::Group {
            ids: vec![a, b],
            group_id,
        })
        .unwrap();
    session
        .execute(DiagramMutation::Ungroup { id: group_id })
        .unwrap();

    let order: Vec<DiagramId> = session
        .doc
        .children(session.doc.root)
        .into_iter()
        .map(|idx| session.doc.graph[idx].id)
        .collect();
    assert_eq!(order, vec![below, a, b, above]);
}

#[test]
fn group_preconditions_leave_tree_untouched() {
    let mut session = Session::new();
    let a = add_rect(&mut session, 0.0, 0.0, 10.0, 10.0);
    let before = session.checkpoint();
    let group_id = DiagramId::with_prefix("group");

    // Fewer than two members.
    let err = session
        .apply_mutation(DiagramMutation::Group {
            ids: vec![a],
            group_id,
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::InvariantViolation(_)));
    assert_eq!(session.checkpoint(), before);

    // Unresolvable member.
    let err = session
        .apply_mutation(DiagramMutation::Group {
            ids: vec![a, DiagramId::intern("missing")],
            group_id,
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::NotFound(_)));
    assert_eq!(session.checkpoint(), before);

    // Non-siblings.
    let parent = session
        .execute(DiagramMutation::Add {
            parent: None,
            diagram: Box::new(
                Diagram::new(DiagramKind::Group).with_frame(Frame::new(200.0, 200.0, 100.0, 100.0)),
            ),
        })
        .unwrap()
        .unwrap();
    let nested = session
        .execute(DiagramMutation::Add {
            parent: Some(parent),
            diagram: Box::new(
                Diagram::new(DiagramKind::Ellipse).with_frame(Frame::new(0.0, 0.0, 10.0, 10.0)),
            ),
        })
        .unwrap()
        .unwrap();
    let before = session.checkpoint();
    let err = session
        .apply_mutation(DiagramMutation::Group {
            ids: vec![a, nested],
            group_id,
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::InvariantViolation(_)));
    assert_eq!(session.checkpoint(), before);
}

#[test]
fn ungroup_rejects_non_groups() {
    let mut session = Session::new();
    let a = add_rect(&mut session, 0.0, 0.0, 10.0, 10.0);
    let err = session
        .apply_mutation(DiagramMutation::Ungroup { id: a })
        .unwrap_err();
    assert!(matches!(err, EditorError::InvariantViolation(_)));
}

#[test]
fn rotated_members_group_over_their_corners() {
    let mut session = Session::new();
    let mut frame = Frame::new(100.0, 100.0, 100.0, 20.0);
    frame.rotation = 90.0;
    let rotated = session
        .execute(DiagramMutation::Add {
            parent: None,
            diagram: Box::new(
                Diagram::new(DiagramKind::Rectangle { corner_radius: 0.0 }).with_frame(frame),
            ),
        })
        .unwrap()
        .unwrap();
    let other = add_rect(&mut session, 300.0, 100.0, 20.0, 20.0);

    let group_id = DiagramId::with_prefix("group");
    session
        .execute(DiagramMutation::Group {
            ids: vec![rotated, other],
            group_id,
        })
        .unwrap();

    // The rotated member is 20 wide × 100 tall in parent space, so the
    // bounding frame spans y 50..150.
    let group = session.doc.find_by_id(group_id).unwrap();
    assert!((group.frame.height - 100.0).abs() < 1e-3);
    assert!((world_center(&session, rotated) - Vec2::new(100.0, 100.0)).length() < 1e-3);
}
