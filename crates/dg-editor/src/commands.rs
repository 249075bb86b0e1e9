//! External command boundary.
//!
//! Tool/automation collaborators (chat agents, scripts, macros) drive
//! the engine through serializable `Command`s rather than pointer
//! events. A command is validated at this boundary — bad payloads are
//! `MalformedInput` and never reach the tree — and then applied exactly
//! like a user gesture, history push included.

use crate::error::{EditorError, EditorResult};
use crate::session::{DiagramMutation, DiagramPatch, Session, ZOrderOp};
use dg_core::connect::Endpoint;
use dg_core::id::DiagramId;
use dg_core::model::{Diagram, DiagramKind, Frame};
use serde::{Deserialize, Serialize};

/// A mutation command as submitted by an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Create a diagram.
    Add {
        kind: DiagramKind,
        frame: Frame,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<DiagramId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Sparse property update.
    Update {
        id: DiagramId,
        #[serde(flatten)]
        patch: DiagramPatch,
    },
    Delete {
        id: DiagramId,
    },
    Duplicate {
        id: DiagramId,
    },
    Group {
        ids: Vec<DiagramId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<DiagramId>,
    },
    Ungroup {
        id: DiagramId,
    },
    /// Request a connection; routed through the notification channel
    /// like any other connect request.
    Connect {
        source: Endpoint,
        target: Endpoint,
    },
    Select {
        ids: Vec<DiagramId>,
        #[serde(default)]
        additive: bool,
    },
    SetText {
        id: DiagramId,
        text: String,
    },
    ZOrder {
        id: DiagramId,
        #[serde(rename = "order")]
        op: ZOrderOp,
    },
    Undo,
    Redo,
}

/// What a command did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandOutcome {
    /// Id of a diagram the command created, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DiagramId>,
    /// Whether the tree (or selection) changed.
    pub changed: bool,
}

/// Parse a command from its JSON wire form.
pub fn parse_command(json: &str) -> EditorResult<Command> {
    serde_json::from_str(json).map_err(|err| EditorError::MalformedInput(err.to_string()))
}

/// Validate and apply one command against a session.
pub fn apply_command(session: &mut Session, command: Command) -> EditorResult<CommandOutcome> {
    match command {
        Command::Add {
            kind,
            frame,
            parent,
            name,
            description,
        } => {
            if matches!(
                kind,
                DiagramKind::Canvas | DiagramKind::ConnectPoint { .. }
            ) {
                return Err(EditorError::MalformedInput(format!(
                    "cannot add a `{}` via commands",
                    kind.id_prefix()
                )));
            }
            let mut sanitized = frame;
            sanitized.set_size(frame.width, frame.height);
            let mut diagram = Diagram::new(kind).with_frame(sanitized);
            diagram.name = name;
            diagram.description = description;
            let created = session.execute(DiagramMutation::Add {
                parent,
                diagram: Box::new(diagram),
            })?;
            Ok(CommandOutcome {
                created,
                changed: true,
            })
        }
        Command::Update { id, patch } => {
            session.execute(DiagramMutation::Patch { id, patch })?;
            Ok(CommandOutcome {
                created: None,
                changed: true,
            })
        }
        Command::Delete { id } => {
            session.execute(DiagramMutation::Remove { id })?;
            Ok(CommandOutcome {
                created: None,
                changed: true,
            })
        }
        Command::Duplicate { id } => {
            let created = session.execute(DiagramMutation::Duplicate { id })?;
            Ok(CommandOutcome {
                created,
                changed: true,
            })
        }
        Command::Group { ids, group_id } => {
            let group_id = group_id.unwrap_or_else(|| DiagramId::with_prefix("group"));
            let created = session.execute(DiagramMutation::Group { ids, group_id })?;
            Ok(CommandOutcome {
                created,
                changed: true,
            })
        }
        Command::Ungroup { id } => {
            session.execute(DiagramMutation::Ungroup { id })?;
            Ok(CommandOutcome {
                created: None,
                changed: true,
            })
        }
        Command::Connect { source, target } => {
            session.request_connect(source, target);
            let created = session.pump_events()?;
            Ok(CommandOutcome {
                created: created.into_iter().next(),
                changed: true,
            })
        }
        Command::Select { ids, additive } => {
            session.select(&ids, additive)?;
            Ok(CommandOutcome {
                created: None,
                changed: true,
            })
        }
        Command::SetText { id, text } => {
            session.execute(DiagramMutation::SetText { id, text })?;
            Ok(CommandOutcome {
                created: None,
                changed: true,
            })
        }
        Command::ZOrder { id, op } => {
            session.execute(DiagramMutation::ZOrder { id, op })?;
            Ok(CommandOutcome {
                created: None,
                changed: true,
            })
        }
        Command::Undo => Ok(CommandOutcome {
            created: None,
            changed: session.undo(),
        }),
        Command::Redo => Ok(CommandOutcome {
            created: None,
            changed: session.redo(),
        }),
    }
}

/// Parse and apply in one step — the whole wire path.
pub fn apply_json_command(session: &mut Session, json: &str) -> EditorResult<CommandOutcome> {
    let command = parse_command(json)?;
    apply_command(session, command)
}
