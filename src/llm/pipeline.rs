//! Higher-level LLM operations: self-consistency voting and retried
//! structured extraction.

use super::{ChatMessage, GenerateOptions, LlmProvider, extract_json_from_response};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Result of a self-consistency vote.
#[derive(Debug, Clone)]
pub struct SelfConsistency {
    /// The majority answer (an original sample, not the normalized form).
    pub answer: String,
    /// Fraction of samples agreeing with the majority, on [0, 1].
    pub agreement_rate: f32,
    /// Confidence derived from the agreement rate.
    pub confidence: f32,
}

/// Pipeline over an [`LlmProvider`].
///
/// A failed call never corrupts pipeline state; the next call proceeds
/// independently.
pub struct LlmPipeline {
    provider: Box<dyn LlmProvider>,
    /// Retries for structured extraction (default 3).
    extraction_retries: u32,
}

impl LlmPipeline {
    /// Wraps a provider.
    #[must_use]
    pub fn new(provider: Box<dyn LlmProvider>, extraction_retries: u32) -> Self {
        Self {
            provider,
            extraction_retries: extraction_retries.max(1),
        }
    }

    /// The underlying provider's name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Probes the endpoint; non-fatal, used at startup.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    /// Single completion.
    pub fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        self.provider.generate(prompt, options)
    }

    /// Multi-turn completion.
    pub fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.provider.chat(messages)
    }

    /// Draws `n` independent samples and majority-votes over normalized
    /// answers.
    ///
    /// Failed samples are skipped; the agreement rate is computed over the
    /// samples that succeeded. Fails only when every sample fails.
    pub fn self_consistency(&self, prompt: &str, n: usize) -> Result<SelfConsistency> {
        let n = n.max(1);
        let mut samples = Vec::with_capacity(n);
        let mut last_error = None;

        for i in 0..n {
            let options = GenerateOptions {
                temperature: Some(0.7),
                seed: Some(i as u64),
            };
            match self.provider.generate(prompt, &options) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    tracing::warn!(sample = i, error = %e, "self-consistency sample failed");
                    last_error = Some(e);
                },
            }
        }

        if samples.is_empty() {
            return Err(last_error.unwrap_or_else(|| Error::Llm("no samples".to_string())));
        }

        let mut votes: HashMap<String, usize> = HashMap::new();
        for sample in &samples {
            *votes.entry(normalize_answer(sample)).or_insert(0) += 1;
        }
        let (winner, count) = votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .unwrap_or_default();

        let answer = samples
            .iter()
            .find(|s| normalize_answer(s) == winner)
            .cloned()
            .unwrap_or_default();

        #[allow(clippy::cast_precision_loss)]
        let agreement_rate = count as f32 / samples.len() as f32;
        Ok(SelfConsistency {
            answer,
            agreement_rate,
            confidence: agreement_rate,
        })
    }

    /// Generates a JSON value matching `schema_hint`, retrying on parse
    /// failures with the failure reason appended to the prompt.
    ///
    /// # Errors
    ///
    /// [`Error::StructuredExtraction`] after all retries fail; LLM
    /// transport errors propagate as-is.
    pub fn extract_structured(&self, prompt: &str, schema_hint: &str) -> Result<serde_json::Value> {
        let base = format!(
            "{prompt}\n\nRespond with JSON only, matching this shape:\n{schema_hint}\nNo prose, no markdown."
        );
        let mut attempt_prompt = base.clone();
        let mut last_failure = String::new();

        for attempt in 1..=self.extraction_retries {
            let response = self
                .provider
                .generate(&attempt_prompt, &GenerateOptions::default())?;
            let json = extract_json_from_response(&response);
            match serde_json::from_str::<serde_json::Value>(json) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_failure = e.to_string();
                    tracing::debug!(attempt, error = %e, "structured extraction parse failed");
                    attempt_prompt = format!(
                        "{base}\n\nYour previous response could not be parsed as JSON ({last_failure}). \
                         Respond again with valid JSON only."
                    );
                },
            }
        }

        Err(Error::StructuredExtraction {
            attempts: self.extraction_retries,
            cause: last_failure,
        })
    }

    /// Typed variant of [`Self::extract_structured`].
    pub fn extract_structured_as<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema_hint: &str,
    ) -> Result<T> {
        let value = self.extract_structured(prompt, schema_hint)?;
        serde_json::from_value(value).map_err(|e| Error::StructuredExtraction {
            attempts: self.extraction_retries,
            cause: format!("shape mismatch: {e}"),
        })
    }
}

/// Normalizes an answer for voting: lowercase, collapsed whitespace,
/// trailing punctuation stripped.
fn normalize_answer(answer: &str) -> String {
    answer
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', '?'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Provider replaying a scripted sequence of responses.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<String>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(Error::Llm("script exhausted".to_string()));
            }
            responses.remove(0)
        }
    }

    #[test]
    fn test_self_consistency_majority() {
        let pipeline = LlmPipeline::new(
            Box::new(ScriptedProvider::new(vec![
                Ok("One hour.".to_string()),
                Ok("one hour".to_string()),
                Ok("Two hours.".to_string()),
            ])),
            3,
        );
        let result = pipeline.self_consistency("q", 3).unwrap();
        assert!(result.answer.to_lowercase().contains("one hour"));
        assert!((result.agreement_rate - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_consistency_skips_failures() {
        let pipeline = LlmPipeline::new(
            Box::new(ScriptedProvider::new(vec![
                Err(Error::Llm("down".to_string())),
                Ok("yes".to_string()),
                Ok("yes".to_string()),
            ])),
            3,
        );
        let result = pipeline.self_consistency("q", 3).unwrap();
        assert_eq!(result.answer, "yes");
        assert!((result.agreement_rate - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_consistency_all_failed() {
        let pipeline = LlmPipeline::new(
            Box::new(ScriptedProvider::new(vec![
                Err(Error::Llm("down".to_string())),
                Err(Error::Llm("down".to_string())),
            ])),
            3,
        );
        assert!(pipeline.self_consistency("q", 2).is_err());
    }

    #[test]
    fn test_extract_structured_retries_then_succeeds() {
        let pipeline = LlmPipeline::new(
            Box::new(ScriptedProvider::new(vec![
                Ok("not json at all".to_string()),
                Ok("```json\n{\"claims\": []}\n```".to_string()),
            ])),
            3,
        );
        let value = pipeline.extract_structured("extract", "{\"claims\": []}").unwrap();
        assert!(value["claims"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_extract_structured_exhausts_retries() {
        let pipeline = LlmPipeline::new(
            Box::new(ScriptedProvider::new(vec![
                Ok("nope".to_string()),
                Ok("still nope".to_string()),
                Ok("never".to_string()),
            ])),
            3,
        );
        let err = pipeline.extract_structured("extract", "{}").unwrap_err();
        assert!(matches!(
            err,
            Error::StructuredExtraction { attempts: 3, .. }
        ));
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("  One   Hour. "), "one hour");
        assert_eq!(normalize_answer("YES!"), "yes");
    }
}
