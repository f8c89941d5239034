pub mod orchestrator;

pub use orchestrator::{PipelineOrchestrator, RunStats};
