//! Derived PEG evaluation
//!
//! Derived PEGs are computed per window from the aggregated averages of
//! that window. A definition that cannot be evaluated (unknown reference,
//! syntax error) is omitted for that window with a warning; it never fails
//! the analysis.

use crate::formula;
use peg_analyzer_types::peg::AggregatedPeg;
use peg_analyzer_types::window::WindowTag;
use peg_analyzer_types::AnalyzerError;
use std::collections::BTreeMap;
use tracing::warn;

/// Derived aggregates for one window plus the warnings produced on the way
#[derive(Debug, Clone, Default)]
pub struct DerivedOutcome {
    pub pegs: Vec<AggregatedPeg>,
    pub warnings: Vec<String>,
}

/// Evaluate every definition against one window's aggregates.
pub fn derive(
    base: &[AggregatedPeg],
    definitions: &BTreeMap<String, String>,
    tag: WindowTag,
) -> DerivedOutcome {
    let bindings: BTreeMap<String, f64> = base
        .iter()
        .map(|peg| (peg.peg_name.clone(), peg.avg))
        .collect();

    let mut outcome = DerivedOutcome::default();
    for (name, expression) in definitions {
        match formula::evaluate(expression, &bindings) {
            Ok(evaluation) => {
                if evaluation.divided_by_zero {
                    outcome
                        .warnings
                        .push(format!("derived {name}: division by zero in window {tag}"));
                }
                outcome.pegs.push(AggregatedPeg {
                    peg_name: name.clone(),
                    window: tag,
                    avg: evaluation.value,
                    count: 0,
                    rsd: 0.0,
                });
            }
            Err(AnalyzerError::FormulaUnknownRef { name: reference }) => {
                warn!(derived = %name, reference = %reference, window = %tag, "Derived PEG omitted");
                outcome
                    .warnings
                    .push(format!("derived {name}: unknown ref {reference}"));
            }
            Err(e) => {
                warn!(derived = %name, error = %e, window = %tag, "Derived PEG omitted");
                outcome.warnings.push(format!("derived {name}: {e}"));
            }
        }
    }
    outcome
}
