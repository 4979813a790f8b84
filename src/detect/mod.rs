//! Word matching, detection events and tick strategies

pub mod events;
pub mod matcher;
pub mod mode;

pub use events::{DetectionEvent, EventBus, MatchedWord};
pub use matcher::{band_score, Detection, WordMatcher};
pub use mode::{
    strategy_for, ContinuousDetection, DetectionStrategy, PushToTalk, RecordOptions,
    RecordedWord, TickContext, TickOutcome,
};
