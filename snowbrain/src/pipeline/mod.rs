//! The brain build: personas, gift queries and Snowman responses, generated
//! in bounded-concurrency phases and appended to the store after each phase.

mod gate;
mod generator;
mod orchestrator;
mod phase;
mod progress;
mod retry;
mod writer;

pub use gate::{ConcurrencyGate, GatePermit};
pub use generator::{BrainGenerator, LlmBrainGenerator};
pub use orchestrator::{BrainBuilder, RunSummary, Tally};
pub use phase::{Completed, PhaseOutcome, PhaseRunner, PhaseStats};
pub use progress::phase_bar;
pub use retry::{RetryPolicy, Timed};
pub use writer::{PersistRow, PersistenceWriter, WriteOutcome};
