pub mod fetcher;
pub mod scheduler;
pub mod state;

pub use fetcher::{Fetcher, HttpFetcher, SourceKind};
pub use scheduler::{CollectionScheduler, RunOutcome, SchedulerConfig};
pub use state::{CycleStage, SchedulerState};
