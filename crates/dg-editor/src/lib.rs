pub mod commands;
pub mod error;
pub mod events;
pub mod hit;
pub mod history;
pub mod input;
pub mod interaction;
pub mod session;
pub mod shortcuts;

pub use commands::{Command, CommandOutcome, apply_command, apply_json_command, parse_command};
pub use error::{EditorError, EditorResult};
pub use events::{EventBus, EventId, Notification};
pub use hit::{HitOptions, HitTarget, hit_test, hit_test_rect};
pub use history::{HISTORY_LIMIT, History};
pub use input::{InputEvent, Modifiers};
pub use interaction::{Interaction, InteractionState};
pub use session::{
    CANVAS_EDGE_THRESHOLD, CANVAS_EXPANSION_STEP, CanvasBounds, DiagramMutation, DiagramPatch,
    Session, ShapeInfo, ZOrderOp,
};
pub use shortcuts::{ShortcutAction, ShortcutMap, apply_action};
