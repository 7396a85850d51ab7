//! Error taxonomy for the summarization core.
//!
//! Only lookups and parameter validation fail. Numerically degenerate states
//! (zero out-degree, zero-sum walk vectors) and traversal dead ends are
//! ordinary control flow and never surface here.

use crate::EntityId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GlimpseError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unknown entity id: {0}")]
    UnknownEntityId(EntityId),

    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, GlimpseError>;
