//! Text-generation enrichment: mnemonic bridges, examples, practice
//! questions, grammar rules and lyric translations.
//!
//! Every caller treats failures as "no enrichment" and carries on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::*;
use palabra_core::questions::{FillBlankQuestion, McqQuestion, SentenceBuildQuestion};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("api error {0}: {1}")]
    Api(u16, String),

    #[error("empty response")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0} has no generated question")]
    Unsupported(&'static str),

    #[error("deadline exceeded")]
    Timeout,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn generate_bridges(&self, term: &str, gloss: &str) -> Result<Bridges, EnrichmentError>;

    async fn generate_example(&self, term: &str, gloss: &str) -> Result<String, EnrichmentError>;

    async fn generate_question(&self, card: &Card, mode: PracticeMode) -> Result<Question, EnrichmentError>;

    /// The grammar concept that matters most for the card's word.
    async fn generate_grammar(&self, card: &Card) -> Result<NewGrammarRule, EnrichmentError>;

    /// English for each Spanish line, in the same order.
    async fn translate_lines(&self, lines: &[String]) -> Result<Vec<String>, EnrichmentError>;
}

/// Enricher backed by the Gemini `generateContent` endpoint in JSON mode.
#[derive(Clone)]
pub struct GeminiEnricher {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEnricher {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a prompt and decode the JSON answer into `T`.
    async fn generate<T: DeserializeOwned>(&self, prompt: String) -> Result<T, EnrichmentError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Api(status.as_u16(), body));
        }

        let body: GenerateResponse = response.json().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(EnrichmentError::EmptyResponse)?;

        serde_json::from_str(strip_code_fences(&text))
            .map_err(|e| EnrichmentError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Enricher for GeminiEnricher {
    async fn generate_bridges(&self, term: &str, gloss: &str) -> Result<Bridges, EnrichmentError> {
        let prompt = format!(
            "Create memory bridges for the Spanish word \"{term}\" ({gloss}). \
             For each of Hindi, Dutch and English give one short mnemonic linking a similar-sounding \
             or related word to the Spanish one, or null when there is no natural link. \
             Reply with JSON only: {{\"hindi\": string|null, \"dutch\": string|null, \"english\": string|null}}"
        );
        self.generate(prompt).await
    }

    async fn generate_example(&self, term: &str, gloss: &str) -> Result<String, EnrichmentError> {
        let prompt = format!(
            "Write one short, natural Spanish sentence for a beginner that uses \"{term}\" ({gloss}). \
             Reply with JSON only: {{\"example\": string}}"
        );
        let reply: ExampleReply = self.generate(prompt).await?;
        let example = reply.example.trim().to_string();
        if example.is_empty() {
            return Err(EnrichmentError::EmptyResponse);
        }
        Ok(example)
    }

    async fn generate_question(&self, card: &Card, mode: PracticeMode) -> Result<Question, EnrichmentError> {
        let term = &card.term;
        let gloss = &card.translation;
        let question = match mode {
            PracticeMode::Mcq => Question::Mcq(
                self.generate::<McqQuestion>(format!(
                    "Create a multiple choice question testing the meaning of the Spanish word \"{term}\" ({gloss}). \
                     Give exactly 4 English options with plausible distractors. \
                     Reply with JSON only: {{\"stem\": string, \"options\": [string, string, string, string], \
                     \"correct_index\": number, \"explanation\": string}}"
                ))
                .await?,
            ),
            PracticeMode::FillBlank => Question::FillBlank(
                self.generate::<FillBlankQuestion>(format!(
                    "Write a short Spanish sentence using \"{term}\" ({gloss}) with that word replaced by ____. \
                     Reply with JSON only: {{\"sentence\": string, \"answer\": string, \"hint\": string, \"context\": string}}"
                ))
                .await?,
            ),
            PracticeMode::SentenceBuild => Question::SentenceBuild(
                self.generate::<SentenceBuildQuestion>(format!(
                    "Write a short Spanish sentence of 4 to 7 words using \"{term}\" ({gloss}), \
                     then list its words shuffled. \
                     Reply with JSON only: {{\"target_sentence\": string, \"word_bank\": [string], \
                     \"translation\": string, \"hint\": string}}"
                ))
                .await?,
            ),
            other => return Err(EnrichmentError::Unsupported(other.as_str())),
        };

        if !question.is_well_formed() {
            return Err(EnrichmentError::Malformed(format!(
                "{} question for '{}' failed validation",
                mode.as_str(),
                term
            )));
        }
        Ok(question)
    }

    async fn generate_grammar(&self, card: &Card) -> Result<NewGrammarRule, EnrichmentError> {
        let prompt = format!(
            "Identify the most important grammar concept for the Spanish word \"{}\" ({}){}, \
             such as a conjugation pattern, gender agreement, tense or mood. \
             Keep the explanation under 150 words and give 2 or 3 practical examples. \
             Reply with JSON only: {{\"rule_key\": string in snake_case, \"title\": string, \
             \"explanation\": string, \"examples\": [{{\"spanish\": string, \"english\": string}}], \
             \"difficulty\": number from 1 to 5}}",
            card.term,
            card.translation,
            card.example
                .as_deref()
                .map(|e| format!(", as in \"{}\"", e))
                .unwrap_or_default()
        );
        let rule: NewGrammarRule = self.generate(prompt).await?;
        if !rule.is_well_formed() {
            return Err(EnrichmentError::Malformed(format!(
                "grammar rule for '{}' is missing a key, title or explanation",
                card.term
            )));
        }
        Ok(rule.normalized())
    }

    async fn translate_lines(&self, lines: &[String]) -> Result<Vec<String>, EnrichmentError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let numbered: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}. {}", i + 1, line))
            .collect();
        let prompt = format!(
            "Translate these {} Spanish song lyric lines into natural English, one translation per line, \
             keeping the order.\n{}\n\
             Reply with JSON only: {{\"translations\": [string]}}",
            lines.len(),
            numbered.join("\n")
        );
        let reply: TranslationReply = self.generate(prompt).await?;
        if reply.translations.len() != lines.len() {
            return Err(EnrichmentError::Malformed(format!(
                "expected {} translations, got {}",
                lines.len(),
                reply.translations.len()
            )));
        }
        Ok(reply.translations)
    }
}

/// Drop a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct ExampleReply {
    example: String,
}

#[derive(Debug, Deserialize)]
struct TranslationReply {
    translations: Vec<String>,
}
