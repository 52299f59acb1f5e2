//! Stream batch job
//!
//! One pass: select every stream whose `last_updated_at` is older than the
//! staleness threshold, then for each one (strictly sequentially) ask the
//! summary model for a digest of the topic, and record it. A failing row is
//! logged and reported; it never aborts the pass. Nothing is retried.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use jurnl_core::config::{BatchConfig, JurnlConfig};
use jurnl_core::llm::{ChatTurn, GenerateRequest, LlmBackend, LlmError};
use jurnl_core::models::{Stream, StreamUpdate};
use jurnl_core::store::{Store, StoreError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamJobError {
    #[error("Summary generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Empty response from AI service")]
    EmptyResponse,

    #[error("Failed to save update: {0}")]
    Save(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFailure {
    pub stream_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub selected: usize,
    pub processed: usize,
    pub failures: Vec<StreamFailure>,
}

pub fn build_summary_prompt(topic: &str) -> String {
    format!(
        "Provide a comprehensive summary of the most important developments, news, and updates \
about \"{topic}\" from the last 7 days. Include:

1. Major news events or announcements
2. Significant market developments or trends
3. Policy changes or regulatory updates
4. Technical breakthroughs or research findings
5. Industry analysis and expert opinions

Format the response as a well-structured summary with clear sections. If no significant \
developments occurred, mention that explicitly. Always cite sources when possible and focus \
on factual, verified information.

Topic: {topic}"
    )
}

/// Run one batch pass. Only a failure to select the stale streams is
/// returned as an error; per-stream failures land in the report.
pub async fn run_batch(
    store: &dyn Store,
    llm: &dyn LlmBackend,
    config: &JurnlConfig,
) -> Result<BatchReport, StoreError> {
    let batch = &config.batch;
    let cutoff = Utc::now() - Duration::days(batch.stale_after_days);
    let streams = store.stale_streams(cutoff).await?;

    let mut report = BatchReport {
        selected: streams.len(),
        ..BatchReport::default()
    };

    if streams.is_empty() {
        tracing::info!("No streams need updating");
        return Ok(report);
    }

    tracing::info!(count = streams.len(), model = llm.model(), "Processing stale streams");

    for (i, stream) in streams.iter().enumerate() {
        if i > 0 && batch.delay_ms > 0 {
            tokio::time::sleep(StdDuration::from_millis(batch.delay_ms)).await;
        }

        match process_stream(store, llm, &config.summary.system_prompt, batch, stream).await {
            Ok(update) => {
                report.processed += 1;
                tracing::info!(
                    stream_id = stream.id,
                    update_id = update.id,
                    summary_len = update.content.len(),
                    "Stream updated"
                );
                // Email delivery needs service-side access to user emails.
                tracing::info!(
                    stream_id = stream.id,
                    user_id = %stream.user_id,
                    stream_url = %config.service.stream_url(stream.id),
                    "Would send update notification"
                );
            }
            Err(e) => {
                tracing::error!(stream_id = stream.id, error = %e, "Failed to process stream");
                report.failures.push(StreamFailure {
                    stream_id: stream.id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        processed = report.processed,
        errors = report.failures.len(),
        "Batch pass complete"
    );
    Ok(report)
}

async fn process_stream(
    store: &dyn Store,
    llm: &dyn LlmBackend,
    system_prompt: &str,
    config: &BatchConfig,
    stream: &Stream,
) -> Result<StreamUpdate, StreamJobError> {
    tracing::debug!(stream_id = stream.id, "Generating summary");

    let request = GenerateRequest {
        system: (!system_prompt.is_empty()).then(|| system_prompt.to_string()),
        messages: vec![ChatTurn::new("user", build_summary_prompt(&stream.topic))],
        max_tokens: Some(config.max_tokens),
    };

    let summary = llm.generate(&request).await?;
    if summary.trim().is_empty() {
        return Err(StreamJobError::EmptyResponse);
    }

    Ok(store.record_update(stream.id, &summary, Utc::now()).await?)
}
