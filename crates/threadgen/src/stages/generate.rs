//! Thread generation: remote LLM call with a deterministic local outline
//! fallback.
//!
//! This stage never fails a job. A remote failure, or a response that does
//! not parse as the expected structure, degrades to the outline generator
//! and the job still completes, with a lower engagement tier.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{truncate_detail, ContentGenerator};
use crate::config::GenerationConfig;
use crate::job::record::{Artifact, Engagement};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("API key environment variable '{0}' is not set")]
    MissingApiKey(String),

    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Generation API returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Failed to parse model response: {0}")]
    ResponseParse(String),

    #[error("Model response violates the expected structure: {0}")]
    InvalidStructure(String),
}

/// One thread as the remote model returns it.
#[derive(Debug, Deserialize)]
struct RawThread {
    #[serde(default)]
    title: String,
    tweets: Vec<String>,
    #[serde(default)]
    engagement: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Strips a markdown code fence if the model wrapped its JSON in one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn build_prompt(config: &GenerationConfig, content: &str, title: Option<&str>) -> String {
    let title_line = title
        .map(|t| format!("Title: {}\n", t))
        .unwrap_or_default();

    format!(
        "Create {count} engaging social threads from this content. Make them viral and shareable.\n\n\
         Content: {content}\n\
         {title_line}\n\
         Return a JSON array, no prose:\n\
         [\n\
           {{\n\
             \"title\": \"Thread title\",\n\
             \"tweets\": [\"Hook tweet\", \"1/ First point...\", \"2/ Second point...\", \"Final tweet with CTA\"],\n\
             \"engagement\": \"high\"\n\
           }}\n\
         ]\n\n\
         Rules:\n\
         - First tweet must grab attention\n\
         - Use numbered format (1/, 2/, etc.)\n\
         - 5-10 tweets per thread\n\
         - End with a call-to-action\n\
         - Keep each tweet under {max_chars} characters\n\
         - engagement is one of: high, medium, low",
        count = config.thread_count,
        content = content,
        title_line = title_line,
        max_chars = config.max_segment_chars,
    )
}

/// Remote generator calling an OpenAI-compatible chat-completions endpoint
/// with a fixed prompt template.
pub struct ChatCompletionGenerator {
    client: Client,
    config: GenerationConfig,
    api_key: Option<String>,
}

impl ChatCompletionGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }

    /// Parses and validates the model's JSON into artifacts. Any violation
    /// of the expected structure rejects the whole response, which sends
    /// the caller down the fallback path.
    fn parse_artifacts(&self, content: &str) -> Result<Vec<Artifact>, GenerateError> {
        let json = strip_code_fence(content);
        let raw: Vec<RawThread> =
            serde_json::from_str(json).map_err(|e| GenerateError::ResponseParse(e.to_string()))?;

        if raw.is_empty() {
            return Err(GenerateError::InvalidStructure(
                "response contains no threads".to_string(),
            ));
        }

        let mut artifacts = Vec::with_capacity(raw.len());
        for thread in raw {
            if thread.tweets.is_empty() {
                return Err(GenerateError::InvalidStructure(
                    "thread has no segments".to_string(),
                ));
            }
            for tweet in &thread.tweets {
                let len = tweet.chars().count();
                if len > self.config.max_segment_chars {
                    return Err(GenerateError::InvalidStructure(format!(
                        "segment exceeds {} characters ({})",
                        self.config.max_segment_chars, len
                    )));
                }
            }
            artifacts.push(Artifact {
                title: if thread.title.trim().is_empty() {
                    "Generated Thread".to_string()
                } else {
                    thread.title
                },
                segments: thread.tweets,
                engagement: Engagement::parse_lenient(&thread.engagement),
            });
        }

        Ok(artifacts)
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionGenerator {
    async fn generate(
        &self,
        text: &str,
        title: Option<&str>,
    ) -> Result<Vec<Artifact>, GenerateError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| GenerateError::MissingApiKey(self.config.api_key_env.clone()))?;

        let prompt = build_prompt(&self.config, text, title);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.7,
            "max_tokens": 1500,
        });

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::ApiError {
                status: status.as_u16(),
                body: truncate_detail(&body),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::ResponseParse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GenerateError::ResponseParse("response has no choices".to_string()))?;

        let artifacts = self.parse_artifacts(content)?;
        debug!(threads = artifacts.len(), "Remote generation succeeded");
        Ok(artifacts)
    }
}

/// Deterministic local generator: segments the input into sentences,
/// prefixes each with an ordinal marker, wraps them in a hook and a fixed
/// call-to-action, and labels the result with the Medium tier.
pub struct OutlineGenerator {
    sentence_splitter: Regex,
    sentence_cap: usize,
}

impl OutlineGenerator {
    pub fn new(sentence_cap: usize) -> Self {
        Self {
            // One sentence: a run of non-terminators plus its terminator.
            sentence_splitter: Regex::new(r"[^.!?]+[.!?]*").expect("static sentence pattern"),
            sentence_cap: sentence_cap.max(1),
        }
    }

    fn split_sentences<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.sentence_splitter
            .find_iter(text)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .take(self.sentence_cap)
            .collect()
    }
}

#[async_trait]
impl ContentGenerator for OutlineGenerator {
    async fn generate(
        &self,
        text: &str,
        title: Option<&str>,
    ) -> Result<Vec<Artifact>, GenerateError> {
        let mut segments = Vec::new();
        segments.push(format!(
            "🧵 {} - Thread:",
            title.unwrap_or("Key insights")
        ));

        for (i, sentence) in self.split_sentences(text).iter().enumerate() {
            segments.push(format!("{}/ {}", i + 1, sentence));
        }

        segments.push("What do you think? Drop your thoughts below! 👇".to_string());

        Ok(vec![Artifact {
            title: title.unwrap_or("Generated Thread").to_string(),
            segments,
            engagement: Engagement::Medium,
        }])
    }
}

/// The generation fallback chain. Unlike transcription, a failed primary
/// does not fail the job: the outline generator always produces a result.
pub struct GracefulGenerator {
    primary: Box<dyn ContentGenerator>,
    fallback: OutlineGenerator,
}

impl GracefulGenerator {
    pub fn new(primary: Box<dyn ContentGenerator>, fallback: OutlineGenerator) -> Self {
        Self { primary, fallback }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(
            Box::new(ChatCompletionGenerator::new(config.clone())),
            OutlineGenerator::new(config.fallback_sentence_cap),
        )
    }
}

#[async_trait]
impl ContentGenerator for GracefulGenerator {
    async fn generate(
        &self,
        text: &str,
        title: Option<&str>,
    ) -> Result<Vec<Artifact>, GenerateError> {
        match self.primary.generate(text, title).await {
            Ok(artifacts) => Ok(artifacts),
            Err(e) => {
                warn!(error = %e, "Remote generation failed, using outline fallback");
                self.fallback.generate(text, title).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GenerationConfig {
        GenerationConfig {
            max_segment_chars: 280,
            ..GenerationConfig::default()
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl ContentGenerator for FailingGenerator {
        async fn generate(
            &self,
            _text: &str,
            _title: Option<&str>,
        ) -> Result<Vec<Artifact>, GenerateError> {
            Err(GenerateError::ResponseParse("simulated".to_string()))
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("[1]"), "[1]");
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
    }

    #[test]
    fn test_parse_artifacts_valid_response() {
        let generator = ChatCompletionGenerator::new(test_config());
        let content = r#"[
            {"title": "T1", "tweets": ["Hook", "1/ a", "2/ b"], "engagement": "high"},
            {"tweets": ["Hook only"]}
        ]"#;

        let artifacts = generator.parse_artifacts(content).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].title, "T1");
        assert_eq!(artifacts[0].engagement, Engagement::High);
        // Missing title and engagement fall back to defaults
        assert_eq!(artifacts[1].title, "Generated Thread");
        assert_eq!(artifacts[1].engagement, Engagement::Medium);
    }

    #[test]
    fn test_parse_artifacts_rejects_overlong_segment() {
        let mut config = test_config();
        config.max_segment_chars = 10;
        let generator = ChatCompletionGenerator::new(config);

        let content = r#"[{"title": "T", "tweets": ["this segment is far too long"]}]"#;
        let err = generator.parse_artifacts(content).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidStructure(_)));
    }

    #[test]
    fn test_parse_artifacts_rejects_malformed_json() {
        let generator = ChatCompletionGenerator::new(test_config());
        let err = generator.parse_artifacts("I'm sorry, I can't do that").unwrap_err();
        assert!(matches!(err, GenerateError::ResponseParse(_)));
    }

    #[test]
    fn test_parse_artifacts_rejects_empty_thread_list() {
        let generator = ChatCompletionGenerator::new(test_config());
        let err = generator.parse_artifacts("[]").unwrap_err();
        assert!(matches!(err, GenerateError::InvalidStructure(_)));
    }

    #[tokio::test]
    async fn test_outline_generator_ordinal_segments() {
        let generator = OutlineGenerator::new(8);
        let artifacts = generator.generate("A. B. C.", None).await.unwrap();

        assert_eq!(artifacts.len(), 1);
        let segments = &artifacts[0].segments;
        assert_eq!(segments[0], "🧵 Key insights - Thread:");
        assert_eq!(segments[1], "1/ A.");
        assert_eq!(segments[2], "2/ B.");
        assert_eq!(segments[3], "3/ C.");
        assert_eq!(
            segments.last().unwrap(),
            "What do you think? Drop your thoughts below! 👇"
        );
        assert_eq!(artifacts[0].engagement, Engagement::Medium);
    }

    #[tokio::test]
    async fn test_outline_generator_honors_sentence_cap() {
        let generator = OutlineGenerator::new(2);
        let artifacts = generator
            .generate("One. Two. Three. Four.", Some("Talk"))
            .await
            .unwrap();

        let segments = &artifacts[0].segments;
        // hook + 2 sentences + CTA
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], "🧵 Talk - Thread:");
        assert_eq!(artifacts[0].title, "Talk");
    }

    #[tokio::test]
    async fn test_outline_generator_empty_text_still_yields_artifact() {
        let generator = OutlineGenerator::new(8);
        let artifacts = generator.generate("", None).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].segments.len(), 2);
    }

    #[tokio::test]
    async fn test_graceful_generator_degrades_instead_of_failing() {
        let generator = GracefulGenerator::new(Box::new(FailingGenerator), OutlineGenerator::new(8));
        let artifacts = generator
            .generate("Something interesting.", Some("Talk"))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].engagement, Engagement::Medium);
        assert!(artifacts[0].segments.iter().any(|s| s.contains("1/")));
    }

    #[test]
    fn test_prompt_includes_title_and_bounds() {
        let config = test_config();
        let prompt = build_prompt(&config, "Some content", Some("My Talk"));
        assert!(prompt.contains("Some content"));
        assert!(prompt.contains("Title: My Talk"));
        assert!(prompt.contains("under 280 characters"));

        let prompt = build_prompt(&config, "Other", None);
        assert!(!prompt.contains("Title:"));
    }
}
