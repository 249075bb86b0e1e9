//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic `ShortcutAction`s and applies
//! them to a session. The map lives in Rust so every host (desktop
//! shell, browser bridge) shares one binding table.

use crate::error::EditorResult;
use crate::input::Modifiers;
use crate::session::{DiagramMutation, Session, ZOrderOp};
use dg_core::id::DiagramId;
use dg_core::model::DiagramKind;

/// Actions that keyboard shortcuts can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    // ── Edit ──
    Undo,
    Redo,
    Delete,
    SelectAll,
    Duplicate,
    GroupSelection,
    UngroupSelection,

    // ── Z-order ──
    SendBackward,
    BringForward,
    SendToBack,
    BringToFront,

    // ── UI ──
    Deselect,
}

/// Resolves key events into shortcut actions.
///
/// Platform-aware modifier detection: on macOS `meta` is ⌘, elsewhere
/// `ctrl` serves the same role.
pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a key event to an action.
    ///
    /// `key` is the host `KeyboardEvent.key` value (e.g. `"z"`,
    /// `"Delete"`). Returns `None` if the combo has no binding.
    pub fn resolve(key: &str, modifiers: Modifiers) -> Option<ShortcutAction> {
        let cmd = modifiers.ctrl || modifiers.meta;

        // ── Modifier combos first (most specific) ──
        if cmd && modifiers.shift {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Redo),
                "g" | "G" => Some(ShortcutAction::UngroupSelection),
                "[" => Some(ShortcutAction::SendToBack),
                "]" => Some(ShortcutAction::BringToFront),
                _ => None,
            };
        }

        if cmd {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Undo),
                "y" | "Y" => Some(ShortcutAction::Redo),
                "a" | "A" => Some(ShortcutAction::SelectAll),
                "d" | "D" => Some(ShortcutAction::Duplicate),
                "g" | "G" => Some(ShortcutAction::GroupSelection),
                "[" => Some(ShortcutAction::SendBackward),
                "]" => Some(ShortcutAction::BringForward),
                _ => None,
            };
        }

        // ── Single keys (no modifiers) ──
        match key {
            "Delete" | "Backspace" => Some(ShortcutAction::Delete),
            "Escape" => Some(ShortcutAction::Deselect),
            _ => None,
        }
    }
}

/// Apply a resolved action to a session. Returns whether anything
/// changed. Multi-target actions (delete, duplicate, z-order over a
/// multi-selection) are one undo step each.
pub fn apply_action(session: &mut Session, action: ShortcutAction) -> EditorResult<bool> {
    match action {
        ShortcutAction::Undo => Ok(session.undo()),
        ShortcutAction::Redo => Ok(session.redo()),
        ShortcutAction::Deselect => {
            let had = !session.selected_ids().is_empty();
            session.deselect_all();
            Ok(had)
        }
        ShortcutAction::SelectAll => {
            session.select_all();
            Ok(!session.selected_ids().is_empty())
        }
        ShortcutAction::Delete => {
            let targets = session.selected_ids().to_vec();
            if targets.is_empty() {
                return Ok(false);
            }
            let before = session.checkpoint();
            for id in targets {
                // Connect-line GC may have already taken a target out.
                if session.doc.index_of(id).is_some() {
                    session.apply_mutation(DiagramMutation::Remove { id })?;
                }
            }
            session.commit(before);
            Ok(true)
        }
        ShortcutAction::Duplicate => {
            let targets = session.selected_ids().to_vec();
            if targets.is_empty() {
                return Ok(false);
            }
            let before = session.checkpoint();
            let mut clones = Vec::with_capacity(targets.len());
            for id in targets {
                if let Some(clone) = session.apply_mutation(DiagramMutation::Duplicate { id })? {
                    clones.push(clone);
                }
            }
            session.commit(before);
            session.select(&clones, false)?;
            Ok(true)
        }
        ShortcutAction::GroupSelection => {
            let ids = session.selected_ids().to_vec();
            if ids.len() < 2 {
                return Ok(false);
            }
            let group_id = DiagramId::with_prefix("group");
            session.execute(DiagramMutation::Group { ids, group_id })?;
            session.select(&[group_id], false)?;
            Ok(true)
        }
        ShortcutAction::UngroupSelection => {
            let groups: Vec<DiagramId> = session
                .selected_ids()
                .iter()
                .copied()
                .filter(|&id| {
                    matches!(
                        session.doc.find_by_id(id).map(|d| &d.kind),
                        Some(DiagramKind::Group)
                    )
                })
                .collect();
            if groups.is_empty() {
                return Ok(false);
            }
            for id in groups {
                session.execute(DiagramMutation::Ungroup { id })?;
            }
            Ok(true)
        }
        ShortcutAction::SendBackward
        | ShortcutAction::BringForward
        | ShortcutAction::SendToBack
        | ShortcutAction::BringToFront => {
            let op = match action {
                ShortcutAction::SendBackward => ZOrderOp::SendBackward,
                ShortcutAction::BringForward => ZOrderOp::BringForward,
                ShortcutAction::SendToBack => ZOrderOp::SendToBack,
                _ => ZOrderOp::BringToFront,
            };
            let targets = session.selected_ids().to_vec();
            if targets.is_empty() {
                return Ok(false);
            }
            let before = session.checkpoint();
            for id in targets {
                session.apply_mutation(DiagramMutation::ZOrder { id, op })?;
            }
            session.commit(before);
            Ok(true)
        }
    }
}
