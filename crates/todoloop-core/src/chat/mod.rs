//! Chat turn handling.

pub mod turn;

pub use turn::{
    EventSink, HALT_MESSAGE, NullSink, TurnError, TurnOptions, TurnOrchestrator, TurnOutcome,
    TurnSummary,
};
