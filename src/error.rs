use crate::ids::NodeId;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ArmatureError>;

/// Structural errors reported by graph and interpolator operations.
///
/// All of these leave the graph unchanged; the failing call also emits a
/// `log::warn!` so misuse is visible even when the result is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ArmatureError {
    #[error("node handle {0} is stale or was never allocated")]
    StaleHandle(NodeId),

    #[error("node {0} cannot reference itself")]
    SelfReference(NodeId),

    #[error("setting {parent} as reference of {child} would close a cycle")]
    CyclicReference { child: NodeId, parent: NodeId },

    #[error("node {child} and reference {parent} are not both attached or both detached")]
    MixedAttachment { child: NodeId, parent: NodeId },

    #[error("node {0} is already attached to the graph")]
    AlreadyAttached(NodeId),

    #[error("subtree of {0} contains the graph eye and cannot be destroyed")]
    EyeInSubtree(NodeId),

    #[error("frustum radius must be positive, got {0}")]
    NonPositiveRadius(f32),

    #[error("keyframe index {index} out of bounds (len {len})")]
    KeyFrameOutOfBounds { index: usize, len: usize },
}
