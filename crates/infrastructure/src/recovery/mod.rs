//! 恢复相关组件：检查点与事件回放

pub mod checkpoint;
pub mod replay;

pub use checkpoint::{CheckpointManager, RecordOutcome};
pub use replay::{
    deduplicate, replay, replay_converges, replay_with_windowing, verify_convergence,
    ReplayEngine,
};
