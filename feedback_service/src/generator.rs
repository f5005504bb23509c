use crate::upstream::{ServiceError, read_json};
use askama::Template;
use async_trait::async_trait;
pub use common::models::GeneratedFeedback;
use common::models::PlagiarismResult;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Configuration references of a request, handed to the generator by value for each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationContext {
    pub template: String,
    pub model: String,
}

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(
        &self,
        text: &str,
        plagiarism: &PlagiarismResult,
        context: GenerationContext,
    ) -> Result<GeneratedFeedback, ServiceError>;
}

#[derive(Template)]
#[template(path = "prompt.txt")]
struct PromptTemplate<'a> {
    template_id: &'a str,
    submission: &'a str,
    plagiarism: &'a PlagiarismResult,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StructuredFeedback {
    pub overall_feedback: String,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub learning_objectives_feedback: Vec<String>,
    pub grade_recommendation: String,
    pub encouragement: String,
}

/// Talks to an OpenAI compatible chat completions endpoint.
#[derive(Debug)]
pub struct LlmFeedbackGenerator {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LlmFeedbackGenerator {
    pub fn new(client: Client, base_url: String, api_key: String) -> Self {
        LlmFeedbackGenerator {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl FeedbackGenerator for LlmFeedbackGenerator {
    async fn generate(
        &self,
        text: &str,
        plagiarism: &PlagiarismResult,
        context: GenerationContext,
    ) -> Result<GeneratedFeedback, ServiceError> {
        let prompt = PromptTemplate {
            template_id: &context.template,
            submission: text,
            plagiarism,
        }
        .render()?;

        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": context.model,
                "messages": vec![json!({"role": "user", "content": prompt})],
                "temperature": 0,
            }))
            .send()
            .await?;
        let body: serde_json::Value = read_json(res).await?;

        let message = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ServiceError::InvalidResponse("choices[0].message.content not found".to_string())
            })?;
        debug!("llm responded with {} characters", message.len());

        let feedback = parse_feedback(message)?;
        Ok(GeneratedFeedback {
            feedback: serde_json::to_string_pretty(&feedback)?,
            summary: render_summary(&feedback),
        })
    }
}

/// Strips a markdown code fence the model may wrap its answer in.
fn strip_fence(message: &str) -> &str {
    let trimmed = message.trim();
    let inner = if let Some((_, rest)) = trimmed.split_once("```json") {
        rest
    } else if let Some((_, rest)) = trimmed.split_once("```") {
        rest
    } else {
        return trimmed;
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

pub fn parse_feedback(message: &str) -> Result<StructuredFeedback, ServiceError> {
    serde_json::from_str(strip_fence(message))
        .map_err(|e| ServiceError::InvalidResponse(format!("malformed feedback: {e}")))
}

pub fn render_summary(feedback: &StructuredFeedback) -> String {
    let mut lines = vec![
        "Overall Feedback:".to_string(),
        feedback.overall_feedback.clone(),
    ];

    let sections = [
        ("Strengths", &feedback.strengths),
        ("Areas for Improvement", &feedback.areas_for_improvement),
        (
            "Learning Objectives Feedback",
            &feedback.learning_objectives_feedback,
        ),
    ];
    for (title, items) in sections {
        lines.push(format!("\n{title}:"));
        lines.extend(items.iter().map(|item| format!("- {item}")));
    }

    lines.push(format!(
        "\nGrade Recommendation: {}",
        feedback.grade_recommendation
    ));
    lines.push(format!("\nEncouragement: {}", feedback.encouragement));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::SimilarSource;

    const FEEDBACK: &str = r#"{
        "overall_feedback": "Clear argument.",
        "strengths": ["structure", "vocabulary"],
        "areas_for_improvement": ["citations"],
        "learning_objectives_feedback": ["meets objective 1"],
        "grade_recommendation": "B+",
        "encouragement": "Keep going!"
    }"#;

    #[test]
    fn parses_plain_json() {
        let feedback = parse_feedback(FEEDBACK).unwrap();
        assert_eq!(feedback.overall_feedback, "Clear argument.");
        assert_eq!(feedback.strengths, vec!["structure", "vocabulary"]);
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("Here you go:\n```json\n{FEEDBACK}\n```\nThanks");
        let feedback = parse_feedback(&fenced).unwrap();
        assert_eq!(feedback.grade_recommendation, "B+");
    }

    #[test]
    fn missing_field_is_rejected() {
        let err = parse_feedback(r#"{"overall_feedback": "ok"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse(_)));
        assert!(err.to_string().contains("strengths"));
    }

    #[test]
    fn summary_lists_every_section() {
        let summary = render_summary(&parse_feedback(FEEDBACK).unwrap());
        assert_eq!(
            summary,
            "Overall Feedback:\nClear argument.\n\
             \nStrengths:\n- structure\n- vocabulary\n\
             \nAreas for Improvement:\n- citations\n\
             \nLearning Objectives Feedback:\n- meets objective 1\n\
             \nGrade Recommendation: B+\n\
             \nEncouragement: Keep going!"
        );
    }

    #[test]
    fn prompt_mentions_sources() {
        let plagiarism = PlagiarismResult {
            score: 0.5,
            sources: vec![SimilarSource {
                source_id: "essay-17".to_string(),
                similarity: 0.5,
                excerpt: "the quick brown fox".to_string(),
            }],
        };
        let prompt = PromptTemplate {
            template_id: "essay-v2",
            submission: "The quick brown fox",
            plagiarism: &plagiarism,
        }
        .render()
        .unwrap();
        assert!(prompt.contains("Feedback template: essay-v2"));
        assert!(prompt.contains("- essay-17 (similarity 0.5): the quick brown fox"));
        assert!(!prompt.contains("No similar sources"));
    }
}
