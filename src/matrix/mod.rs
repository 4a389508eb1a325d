pub mod cache;
pub mod chunk;
pub mod compose;
pub mod engine;
pub mod layout;
pub mod plan;

pub use compose::{Matrix, VirtualMatrix};
pub use engine::ChunkedMatrix;
pub use plan::{plan_row_selection, BlockSpan, ReadPlan, NBLK_THRESHOLD};
