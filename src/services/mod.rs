//! Service layer for tenderscout business logic.
//!
//! Domain logic lives here, separate from the CLI surface.

pub mod normalize;
pub mod pipeline;
pub mod scheduler;

pub use normalize::{NormalizeError, Normalizer};
pub use pipeline::{PipelineConfig, RunSummary, TenderPipeline};
pub use scheduler::{ScheduleConfig, Scheduler, SchedulerHandle};
