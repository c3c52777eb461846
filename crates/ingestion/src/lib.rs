//! RecordFlow Ingestion
//!
//! Turns a stored upload into text and runs the background analysis
//! pipeline that records a summary and a routing suggestion.

pub mod errors;
pub mod extract;
pub mod orchestrator;

pub use errors::ExtractionError;
pub use extract::{Extraction, ExtractionMethod, TextExtractor};
pub use orchestrator::IngestionOrchestrator;
