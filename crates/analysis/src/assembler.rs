//! Analysis orchestration
//!
//! The assembler owns one full analysis: window parsing, two concurrent
//! sample fetches, per-window aggregation and derived PEG evaluation in
//! parallel blocking tasks, comparison, prompt rendering, the LLM round
//! trip with a single strict-JSON recovery retry, and identifier
//! resolution. Collaborators are injected, so the whole pipeline runs
//! against in-memory fakes in tests.

use crate::{aggregate, compare, derive, preview, time::TimeRangeParser};
use peg_analyzer_config::AnalyzerConfig;
use peg_analyzer_integrations::{
    extract_first_json_object, Completion, CompletionBackend, PromptTemplateStore, FALLBACK_PROMPT,
};
use peg_analyzer_store::SampleSource;
use peg_analyzer_types::peg::{AnalysisIdentifiers, Filter, PartialIdentifiers, UNKNOWN_IDENTIFIER};
use peg_analyzer_types::request::{AnalysisRequest, FilterSpec};
use peg_analyzer_types::result::{AnalysisMetadata, AnalysisResult, AnalysisStatus, LlmAnalysis};
use peg_analyzer_types::window::{TimeWindow, WindowPair, WindowTag};
use peg_analyzer_types::{AnalyzerError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

const STRICT_JSON_SUFFIX: &str =
    "\n\nReturn a single valid JSON object only, with no surrounding text.";

/// Caller-supplied wall-clock budget for one analysis
struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    fn new(budget: Option<Duration>) -> Self {
        Self {
            at: budget.map(|d| Instant::now() + d),
        }
    }

    fn remaining(&self) -> Result<Option<Duration>> {
        match self.at {
            None => Ok(None),
            Some(at) => at
                .checked_duration_since(Instant::now())
                .map(Some)
                .ok_or_else(|| AnalyzerError::internal("analysis deadline exceeded")),
        }
    }
}

/// Run a fallible future under the remaining deadline budget.
async fn bounded<T, F>(deadline: &Deadline, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline.remaining()? {
        Some(left) => timeout(left, future)
            .await
            .map_err(|_| AnalyzerError::internal("analysis deadline exceeded"))?,
        None => future.await,
    }
}

/// Top-level analysis orchestrator
pub struct AnalysisAssembler {
    store: Arc<dyn SampleSource>,
    llm: Arc<dyn CompletionBackend>,
    templates: Arc<PromptTemplateStore>,
    config: AnalyzerConfig,
}

impl AnalysisAssembler {
    pub fn new(
        store: Arc<dyn SampleSource>,
        llm: Arc<dyn CompletionBackend>,
        templates: Arc<PromptTemplateStore>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            store,
            llm,
            templates,
            config,
        }
    }

    /// Run one analysis to completion.
    ///
    /// `initial_warnings` carries non-fatal findings from request
    /// validation into the result metadata. `deadline` bounds the whole
    /// invocation; on expiry no partial result is returned.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        initial_warnings: Vec<String>,
        deadline: Option<Duration>,
    ) -> Result<AnalysisResult> {
        let started = Instant::now();
        let deadline = Deadline::new(deadline);

        let mut metadata = AnalysisMetadata {
            warnings: initial_warnings,
            choi_result: request.choi_result.clone(),
            ..AnalysisMetadata::default()
        };

        let parser = TimeRangeParser::from_offset_str(&self.config.analysis.default_tz_offset)?;
        let n1_window = parser.parse(&request.n_minus_1)?;
        let n_window = parser.parse(&request.n)?;
        info!(n1 = %n1_window, n = %n_window, "Analysis windows parsed");

        let filter = Filter {
            ne: request.filters.ne.clone(),
            cell_ids: request.filters.cellid.clone(),
            host: request.filters.host.clone(),
            peg_names: request.selected_pegs.clone(),
        };

        let fetches = async {
            tokio::try_join!(
                self.store.fetch(&n1_window, &filter, &request.columns),
                self.store.fetch(&n_window, &filter, &request.columns),
            )
        };
        let (n1_rows, n_rows) = bounded(&deadline, fetches).await?;
        debug!(
            n1_rows = n1_rows.len(),
            n_rows = n_rows.len(),
            "Sample fetches completed"
        );

        let n1_definitions = request.peg_definitions.clone();
        let n_definitions = request.peg_definitions.clone();
        let n1_task = tokio::task::spawn_blocking(move || {
            let aggregation = aggregate::aggregate(&n1_rows, WindowTag::NMinus1);
            let derived = derive::derive(&aggregation.pegs, &n1_definitions, WindowTag::NMinus1);
            (aggregation, derived)
        });
        let n_task = tokio::task::spawn_blocking(move || {
            let aggregation = aggregate::aggregate(&n_rows, WindowTag::N);
            let derived = derive::derive(&aggregation.pegs, &n_definitions, WindowTag::N);
            (aggregation, derived)
        });
        let ((n1_agg, n1_derived), (n_agg, n_derived)) = tokio::try_join!(n1_task, n_task)
            .map_err(|e| AnalyzerError::internal(format!("aggregation task failed: {e}")))?;

        metadata.warnings.extend(n1_agg.warnings.clone());
        metadata.warnings.extend(n_agg.warnings.clone());
        metadata.warnings.extend(n1_derived.warnings);
        metadata.warnings.extend(n_derived.warnings);

        // identifiers come from N-1, falling back to N field by field
        let partial = n1_agg.identifiers.clone().or(n_agg.identifiers.clone());

        let derived_names: BTreeSet<String> = request.peg_definitions.keys().cloned().collect();
        let mut n1_pegs = n1_agg.pegs;
        n1_pegs.extend(n1_derived.pegs);
        let mut n_pegs = n_agg.pegs;
        n_pegs.extend(n_derived.pegs);

        let records = compare::build_records(
            n1_pegs,
            n_pegs,
            &derived_names,
            partial.cell_id.as_deref(),
            &self.config.analysis,
        );
        let summary = compare::summarize(&records, &self.config.analysis);

        let llm = if records.is_empty() {
            debug!("No comparison records; skipping the LLM step");
            LlmAnalysis::default()
        } else {
            self.run_llm(&request, &n1_window, &n_window, &records, &mut metadata, &deadline)
                .await?
        };

        let identifiers = resolve_identifiers(partial, &request.filters);

        info!(
            records = records.len(),
            improved = summary.improved,
            declined = summary.declined,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis completed"
        );

        Ok(AnalysisResult {
            status: AnalysisStatus::Success,
            request_id: Uuid::new_v4().to_string(),
            analysis_id: Uuid::new_v4().to_string(),
            time_windows: WindowPair {
                n1: n1_window,
                n: n_window,
            },
            records,
            summary,
            llm,
            identifiers,
            metadata,
        })
    }

    async fn run_llm(
        &self,
        request: &AnalysisRequest,
        n1_window: &TimeWindow,
        n_window: &TimeWindow,
        records: &[peg_analyzer_types::peg::ComparisonRecord],
        metadata: &mut AnalysisMetadata,
        deadline: &Deadline,
    ) -> Result<LlmAnalysis> {
        let prompt = self.build_prompt(request, n1_window, n_window, records, metadata);

        let completion = bounded(deadline, self.llm.complete(&prompt)).await?;
        metadata.endpoints_attempted = completion.endpoints_attempted.clone();

        if let Some(parsed) = parse_llm_analysis(&completion) {
            return Ok(parsed);
        }

        warn!("LLM response carried no parseable JSON, retrying with a strict instruction");
        let strict_prompt = format!("{prompt}{STRICT_JSON_SUFFIX}");
        match bounded(deadline, self.llm.complete(&strict_prompt)).await {
            Ok(retry) => {
                for endpoint in &retry.endpoints_attempted {
                    if !metadata.endpoints_attempted.contains(endpoint) {
                        metadata.endpoints_attempted.push(endpoint.clone());
                    }
                }
                if let Some(parsed) = parse_llm_analysis(&retry) {
                    return Ok(parsed);
                }
                metadata.llm_parse_failed = true;
                metadata.warn("llm response could not be parsed as JSON");
                Ok(LlmAnalysis::default())
            }
            // a blown deadline aborts the analysis; transport errors on the
            // recovery attempt degrade to an empty analysis instead
            Err(e @ AnalyzerError::Internal(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "Strict-JSON retry failed");
                metadata.llm_parse_failed = true;
                metadata.warn(format!("llm recovery retry failed: {e}"));
                Ok(LlmAnalysis::default())
            }
        }
    }

    fn build_prompt(
        &self,
        request: &AnalysisRequest,
        n1_window: &TimeWindow,
        n_window: &TimeWindow,
        records: &[peg_analyzer_types::peg::ComparisonRecord],
        metadata: &mut AnalysisMetadata,
    ) -> String {
        let (n1_start, n1_end) = n1_window.format_local();
        let (n_start, n_end) = n_window.format_local();
        let selected = if request.selected_pegs.is_empty() {
            "all PEGs".to_string()
        } else {
            request.selected_pegs.join(", ")
        };

        let vars = BTreeMap::from([
            ("n1_range".to_string(), format!("{n1_start} ~ {n1_end}")),
            ("n_range".to_string(), format!("{n_start} ~ {n_end}")),
            (
                "data_preview".to_string(),
                preview::render_preview(records, self.config.prompt.preview_rows),
            ),
            ("selected_pegs".to_string(), selected),
        ]);

        match self.templates.render(request.analysis_type.as_str(), &vars) {
            Ok(prompt) => prompt,
            Err(e) => {
                // conscious degradation: a broken template must not kill
                // the analysis, the minimal prompt still yields an answer
                warn!(error = %e, "Prompt template unavailable, using fallback prompt");
                metadata.warn(format!("prompt template unavailable ({e}), fallback used"));
                FALLBACK_PROMPT.to_string()
            }
        }
    }
}

/// Parse the first JSON object out of a completion, if any.
fn parse_llm_analysis(completion: &Completion) -> Option<LlmAnalysis> {
    let object = extract_first_json_object(&completion.text)?;
    let mut analysis: LlmAnalysis = serde_json::from_str(object).ok()?;
    analysis.confidence = analysis.confidence.clamp(0.0, 1.0);
    if analysis.model_label.is_empty() {
        if let Some(model) = &completion.model {
            analysis.model_label = model.clone();
        }
    }
    Some(analysis)
}

/// Identifier precedence: aggregator capture, then request filters, then
/// the `"unknown"` sentinel.
fn resolve_identifiers(partial: PartialIdentifiers, filters: &FilterSpec) -> AnalysisIdentifiers {
    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

    AnalysisIdentifiers {
        ne_id: non_empty(partial.ne_id)
            .or_else(|| non_empty(filters.ne.clone()))
            .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string()),
        cell_id: non_empty(partial.cell_id)
            .or_else(|| non_empty(filters.cellid.first().cloned()))
            .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string()),
        sw_name: non_empty(partial.sw_name)
            .or_else(|| non_empty(filters.host.clone()))
            .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            endpoint: "http://e1".to_string(),
            endpoints_attempted: vec!["http://e1".to_string()],
            model: Some("test-model".to_string()),
        }
    }

    #[test]
    fn test_parse_llm_analysis_with_prose() {
        let parsed = parse_llm_analysis(&completion(
            "Sure! Here you go:\n{\"summary\": \"fine\", \"confidence\": 0.9}",
        ))
        .unwrap();
        assert_eq!(parsed.summary, "fine");
        assert_eq!(parsed.confidence, 0.9);
        assert_eq!(parsed.model_label, "test-model");
    }

    #[test]
    fn test_parse_llm_analysis_clamps_confidence() {
        let parsed = parse_llm_analysis(&completion("{\"confidence\": 7.5}")).unwrap();
        assert_eq!(parsed.confidence, 1.0);
    }

    #[test]
    fn test_parse_llm_analysis_rejects_non_json() {
        assert!(parse_llm_analysis(&completion("no structure here")).is_none());
        assert!(parse_llm_analysis(&completion("[1, 2, 3]")).is_none());
    }

    #[test]
    fn test_identifier_precedence() {
        let partial = PartialIdentifiers {
            ne_id: Some("nvgnb#10000".to_string()),
            cell_id: None,
            sw_name: Some(String::new()), // empty counts as absent
        };
        let filters = FilterSpec {
            ne: Some("from-filter".to_string()),
            cellid: vec!["2010".to_string()],
            host: Some("host01".to_string()),
        };
        let resolved = resolve_identifiers(partial, &filters);
        assert_eq!(resolved.ne_id, "nvgnb#10000");
        assert_eq!(resolved.cell_id, "2010");
        assert_eq!(resolved.sw_name, "host01");

        let resolved = resolve_identifiers(PartialIdentifiers::default(), &FilterSpec::default());
        assert_eq!(resolved.ne_id, UNKNOWN_IDENTIFIER);
        assert_eq!(resolved.cell_id, UNKNOWN_IDENTIFIER);
        assert_eq!(resolved.sw_name, UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn test_deadline_tracking() {
        let unbounded = Deadline::new(None);
        assert!(unbounded.remaining().unwrap().is_none());

        let generous = Deadline::new(Some(Duration::from_secs(60)));
        assert!(generous.remaining().unwrap().unwrap() > Duration::from_secs(59));

        let expired = Deadline {
            at: Some(Instant::now() - Duration::from_millis(1)),
        };
        assert!(expired.remaining().is_err());
    }
}
