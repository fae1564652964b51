//! Text processing: length estimation, body conversion and splitting

pub mod html;
pub mod length;
pub mod normalize;
pub mod split;

pub use length::estimate;
pub use normalize::{
    twitter_reply_decision, Normalized, Normalizer, Outcome, ReplyDecision, SkipReason,
};
pub use split::{split, Chunk, SplitMode, SplitOptions};
