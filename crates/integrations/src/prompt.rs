//! Prompt template store
//!
//! Templates live in a YAML document (metadata + a map of prompt type to
//! template string) so prompt engineers can iterate without code changes.
//! The store holds the parsed document for the life of the process; a
//! failed reload keeps the previous document in place.

use peg_analyzer_types::{AnalyzerError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Minimal prompt callers may fall back to when rendering fails.
///
/// Using it is a conscious call-site decision, never automatic.
pub const FALLBACK_PROMPT: &str = "Analyze N-1 vs N for the provided PEGs.";

const DEFAULT_TEMPLATES: &str = include_str!("../assets/prompts.yaml");

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub format_type: String,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDocument {
    #[serde(default)]
    pub metadata: TemplateMetadata,
    pub prompts: BTreeMap<String, String>,
}

/// Process-lifetime template store
pub struct PromptTemplateStore {
    path: Option<PathBuf>,
    document: RwLock<Arc<TemplateDocument>>,
}

impl PromptTemplateStore {
    /// Load from `path`, or from the embedded default document when unset.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let document = match &path {
            Some(path) => Arc::new(read_document(path)?),
            None => Arc::new(parse_document(DEFAULT_TEMPLATES)?),
        };
        info!(
            templates = document.prompts.len(),
            version = %document.metadata.version,
            from_file = path.is_some(),
            "Loaded prompt templates"
        );
        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    /// Prompt types the current document can render.
    pub fn available(&self) -> Vec<String> {
        self.document
            .read()
            .expect("template lock poisoned")
            .prompts
            .keys()
            .cloned()
            .collect()
    }

    /// Render one template, substituting `{name}` placeholders from `vars`.
    pub fn render(&self, prompt_type: &str, vars: &BTreeMap<String, String>) -> Result<String> {
        let document = self.document.read().expect("template lock poisoned").clone();
        let template = document.prompts.get(prompt_type).ok_or_else(|| {
            AnalyzerError::TemplateLoad(format!("no template for prompt type '{prompt_type}'"))
        })?;

        let mut rendered = template.clone();
        for (name, value) in vars {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }

        if let Some(name) = first_unresolved_placeholder(&rendered) {
            return Err(AnalyzerError::TemplateVarMissing { name });
        }
        Ok(rendered)
    }

    /// Re-read the document from disk. A failure leaves the previously
    /// loaded document in place and is reported to the caller.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            // embedded templates have nothing to reload from
            return Ok(());
        };
        match read_document(path) {
            Ok(document) => {
                *self.document.write().expect("template lock poisoned") = Arc::new(document);
                info!("Reloaded prompt templates");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Template reload failed, keeping previous document");
                Err(e)
            }
        }
    }
}

fn read_document(path: &Path) -> Result<TemplateDocument> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AnalyzerError::TemplateLoad(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_document(&text)
}

fn parse_document(text: &str) -> Result<TemplateDocument> {
    let document: TemplateDocument = serde_yaml::from_str(text)
        .map_err(|e| AnalyzerError::TemplateLoad(format!("invalid template document: {e}")))?;

    if document.prompts.is_empty() {
        return Err(AnalyzerError::TemplateLoad(
            "template document defines no prompts".to_string(),
        ));
    }
    for (prompt_type, template) in &document.prompts {
        if template.trim().is_empty() {
            return Err(AnalyzerError::TemplateLoad(format!(
                "template '{prompt_type}' is empty"
            )));
        }
    }
    Ok(document)
}

/// Find a leftover `{identifier}` placeholder after substitution.
fn first_unresolved_placeholder(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while let Some(open) = text[i..].find('{').map(|p| p + i) {
        let mut end = open + 1;
        while end < bytes.len()
            && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
        {
            end += 1;
        }
        if end > open + 1
            && end < bytes.len()
            && bytes[end] == b'}'
            && (bytes[open + 1].is_ascii_alphabetic() || bytes[open + 1] == b'_')
        {
            return Some(text[open + 1..end].to_string());
        }
        i = open + 1;
    }
    None
}
