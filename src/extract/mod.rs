pub mod parallel;
pub mod plan;

pub use parallel::{default_worker_count, extract_parallel, MAX_WORKERS};
pub use plan::{plan_extraction, ExtractionPlan, PlannedFile};
