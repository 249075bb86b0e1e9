//! Integration tests: structural invariants of the diagram tree
//! (dg-core).
//!
//! Builds documents through the public API and checks that every
//! mutation family leaves the forest invariant intact: one parent per
//! diagram, no cycles, paint order consistent with the edges, and no
//! connect line referencing a vanished endpoint.

use dg_core::connect::{ConnectLine, Endpoint};
use dg_core::model::{Diagram, DiagramGraph, DiagramKind, Frame};
use std::collections::HashSet;

fn rect_at(x: f32, y: f32) -> Diagram {
    Diagram::new(DiagramKind::Rectangle { corner_radius: 0.0 })
        .with_frame(Frame::new(x, y, 50.0, 50.0))
}

#[test]
fn valid_after_add_remove_reparent() {
    let mut doc = DiagramGraph::new();
    let group = doc.add(None, Diagram::new(DiagramKind::Group));
    let a = doc.add(Some(group), rect_at(0.0, 0.0));
    let b = doc.add(None, rect_at(100.0, 0.0));
    doc.validate().unwrap();

    assert!(doc.reparent(b, group));
    doc.validate().unwrap();
    assert_eq!(doc.children(group), vec![a, b]);

    doc.remove_subtree(a);
    doc.validate().unwrap();
    assert_eq!(doc.children(group), vec![b]);
}

#[test]
fn deep_nesting_traversal() {
    // Container nodes inside groups inside container nodes: the
    // traversals must handle arbitrary depth.
    let mut doc = DiagramGraph::new();
    let mut parent = None;
    let mut expected = Vec::new();
    for level in 0..64 {
        let container = if level % 2 == 0 {
            Diagram::new(DiagramKind::Group)
        } else {
            Diagram::new(DiagramKind::FrameNode {
                clip: false,
                corner_radius: 0.0,
            })
        };
        expected.push(container.id);
        parent = Some(doc.add(parent, container));
    }
    let leaf = rect_at(0.0, 0.0);
    expected.push(leaf.id);
    doc.add(parent, leaf);

    assert_eq!(doc.collect_all_ids(), expected);
    doc.validate().unwrap();
}

#[test]
fn dangling_lines_found_before_removal() {
    let mut doc = DiagramGraph::new();
    let a = doc.add(None, rect_at(0.0, 0.0));
    let b = doc.add(None, rect_at(200.0, 0.0));
    doc.ensure_connect_points(a);
    doc.ensure_connect_points(b);
    let (a_id, b_id) = (doc.graph[a].id, doc.graph[b].id);

    let line = Diagram::new(DiagramKind::ConnectLine(ConnectLine::between(
        Endpoint::Node(a_id),
        Endpoint::Node(b_id),
    )));
    let line_id = line.id;
    doc.add(None, line);
    doc.validate().unwrap();

    // Nothing doomed yet: no dangling lines.
    assert!(doc.dangling_lines(&HashSet::new()).is_empty());

    // Marking `a` as doomed implicates the line.
    let doomed: HashSet<_> = [a_id].into_iter().collect();
    assert_eq!(doc.dangling_lines(&doomed), vec![line_id]);
}

#[test]
fn point_level_line_dangles_when_owner_subtree_goes() {
    let mut doc = DiagramGraph::new();
    let a = doc.add(None, rect_at(0.0, 0.0));
    let b = doc.add(None, rect_at(200.0, 0.0));
    doc.ensure_connect_points(a);
    doc.ensure_connect_points(b);

    let a_point = doc
        .children(a)
        .into_iter()
        .find(|&c| matches!(doc.graph[c].kind, DiagramKind::ConnectPoint { .. }))
        .map(|c| doc.graph[c].id)
        .unwrap();
    let b_point = doc
        .children(b)
        .into_iter()
        .find(|&c| matches!(doc.graph[c].kind, DiagramKind::ConnectPoint { .. }))
        .map(|c| doc.graph[c].id)
        .unwrap();

    let line = Diagram::new(DiagramKind::ConnectLine(ConnectLine::between(
        Endpoint::Point(a_point),
        Endpoint::Point(b_point),
    )));
    let line_id = line.id;
    doc.add(None, line);

    // Removing `a` takes its connect points with it; the line is now
    // unresolvable.
    doc.remove_subtree(a);
    assert_eq!(doc.dangling_lines(&HashSet::new()), vec![line_id]);
}

#[test]
fn zorder_ops_never_break_structure() {
    let mut doc = DiagramGraph::new();
    let a = doc.add(None, rect_at(0.0, 0.0));
    let _b = doc.add(None, rect_at(10.0, 0.0));
    let c = doc.add(None, rect_at(20.0, 0.0));

    doc.bring_to_front(a);
    doc.send_backward(c);
    doc.send_to_back(a);
    doc.bring_forward(c);
    doc.validate().unwrap();
    assert_eq!(doc.children(doc.root).len(), 3);
}
