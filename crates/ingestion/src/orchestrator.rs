//! Background analysis pipeline
//!
//! Runs once per upload, detached from the request:
//! extract -> analyze -> suggest routing -> persist. Nothing is retried and
//! every exit leaves the document in a valid state.

use crate::extract::{usable_chars, TextExtractor};
use recordflow_common::analysis::{excerpt, AnalysisProvider, DocumentContext};
use recordflow_common::config::IngestionConfig;
use recordflow_common::db::models::{Document, ProcessingState, StringList};
use recordflow_common::db::{mutate_document, Directory, DocumentStore};
use recordflow_common::errors::{AppError, Result};
use recordflow_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub struct IngestionOrchestrator {
    documents: Arc<dyn DocumentStore>,
    directory: Arc<dyn Directory>,
    extractor: Arc<TextExtractor>,
    analysis: Arc<AnalysisProvider>,
    min_usable_chars: usize,
    excerpt_chars: usize,
}

impl IngestionOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        directory: Arc<dyn Directory>,
        extractor: Arc<TextExtractor>,
        analysis: Arc<AnalysisProvider>,
        config: &IngestionConfig,
    ) -> Self {
        Self {
            documents,
            directory,
            extractor,
            analysis,
            min_usable_chars: config.min_usable_chars,
            excerpt_chars: config.excerpt_chars,
        }
    }

    /// Run the pipeline for `document_id` on a detached task
    pub fn spawn(self: &Arc<Self>, document_id: Uuid) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run(document_id).await {
                error!(document_id = %document_id, error = %e, "Ingestion pipeline aborted");
                metrics::record_pipeline_run("aborted");
            }
        })
    }

    /// Process one document and return its final processing state.
    /// Errors only come from the document store.
    #[instrument(skip(self))]
    pub async fn run(&self, document_id: Uuid) -> Result<ProcessingState> {
        let document = mutate_document(self.documents.as_ref(), document_id, |doc| {
            if doc.is_deleted {
                return Err(AppError::document_not_found(document_id));
            }
            doc.processing_state = ProcessingState::Processing;
            Ok(())
        })
        .await?;

        let started = Instant::now();
        let extracted = self
            .extractor
            .extract(&document.file_path, &document.media_type)
            .await;
        metrics::record_stage("extract", started.elapsed().as_secs_f64());

        let text = match extracted {
            Ok(text) if usable_chars(&text) >= self.min_usable_chars => text,
            Ok(text) => {
                warn!(usable = usable_chars(&text), "Extracted text is near-empty");
                return self.finish_metadata_only(&document).await;
            }
            Err(e) => {
                warn!(error = %e, "Extraction failed");
                return self.finish_metadata_only(&document).await;
            }
        };

        let context = DocumentContext {
            title: document.title.clone(),
            category: document.category,
            candidate_departments: self.candidate_departments().await,
        };

        let started = Instant::now();
        let analysis = self.analysis.analyze(&text, &context).await;
        metrics::record_stage("analyze", started.elapsed().as_secs_f64());

        mutate_document(self.documents.as_ref(), document_id, |doc| {
            doc.summary = Some(analysis.summary.clone());
            doc.key_points = StringList(analysis.key_points.clone());
            doc.ai_priority = Some(analysis.priority);
            doc.deadlines = StringList(analysis.deadlines.clone());
            doc.action_items = StringList(analysis.action_items.clone());
            Ok(())
        })
        .await?;

        let started = Instant::now();
        let routing = self.analysis.suggest_routing(&text, &context).await;
        metrics::record_stage("suggest_routing", started.elapsed().as_secs_f64());

        let state = if analysis.degraded || routing.degraded {
            ProcessingState::Degraded
        } else {
            ProcessingState::Analyzed
        };
        let kept = excerpt(&text, self.excerpt_chars);

        mutate_document(self.documents.as_ref(), document_id, |doc| {
            doc.suggested_department = Some(routing.primary_department.clone());
            doc.routing_reasoning = Some(routing.reasoning.clone());
            doc.routing_confidence = Some(i32::from(routing.confidence));
            doc.extracted_excerpt = Some(kept.clone());
            doc.processing_state = state;
            Ok(())
        })
        .await?;

        metrics::record_pipeline_run(state.as_str());
        info!(
            state = %state,
            suggested = %routing.primary_department,
            confidence = routing.confidence,
            "Ingestion pipeline complete"
        );
        Ok(state)
    }

    async fn finish_metadata_only(&self, document: &Document) -> Result<ProcessingState> {
        let (summary, key_points) = metadata_summary(document);

        mutate_document(self.documents.as_ref(), document.id, |doc| {
            doc.summary = Some(summary.clone());
            doc.key_points = StringList(key_points.clone());
            doc.extracted_excerpt = None;
            doc.processing_state = ProcessingState::MetadataOnly;
            Ok(())
        })
        .await?;

        metrics::record_pipeline_run(ProcessingState::MetadataOnly.as_str());
        info!(document_id = %document.id, "Stored metadata-only summary");
        Ok(ProcessingState::MetadataOnly)
    }

    async fn candidate_departments(&self) -> Vec<String> {
        match self.directory.list_active_departments().await {
            Ok(departments) => departments.into_iter().map(|d| d.name).collect(),
            Err(e) => {
                warn!(error = %e, "Could not list departments for routing prompt");
                Vec::new()
            }
        }
    }
}

/// Summary and key points built from the upload form alone
fn metadata_summary(document: &Document) -> (String, Vec<String>) {
    let summary = format!(
        "{} document \"{}\" marked {} urgency. No text could be extracted; manual review required.",
        capitalize(document.category.as_str()),
        document.title,
        document.urgency
    );

    let mut key_points = vec![
        format!("Title: {}", document.title),
        format!("Category: {}", document.category),
        format!("Urgency: {}", document.urgency),
    ];
    if let Some(description) = document.description.as_deref().filter(|d| !d.trim().is_empty()) {
        key_points.push(format!("Description: {}", description.trim()));
    }
    key_points.push("Text extraction failed; manual review required".to_string());

    (summary, key_points)
}

fn capitalize(s: &str) -> String {
    let spaced = s.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
