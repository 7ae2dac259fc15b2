// CV triage: turns an uploaded CV into categorized blocks (heuristic path) or
// structured records (assisted path). Persistence and rendering are collaborators.

pub mod chunker;
pub mod classifier;
pub mod export;
pub mod extractor;
pub mod handlers;
pub mod keywords;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod records;
pub mod segmenter;
pub mod store;
