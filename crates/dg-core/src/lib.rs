pub mod connect;
pub mod data;
pub mod geometry;
pub mod id;
pub mod model;

pub use connect::{Anchor, ArrowKind, ConnectLine, CurveKind, Endpoint};
pub use data::{DiagramData, Snapshot, project_to_data, rehydrate};
pub use geometry::{
    AffineParts, ResizeCursor, compose_affine, cursor_for_angle, decompose_affine,
    inverse_map_point, rectangle_vertices,
};
pub use id::DiagramId;
pub use model::*;
