//! Fills missing search keywords for product titles through a chat-completions API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::KeywordsConfig;
use crate::debug_log;
use crate::reqwest_simd_json::{ReqwestSimdJsonExt, ResponseSimdJsonExt};
use crate::types::{Dataset, KeywordStats};

/// Written into the keyword cell of rows whose generation failed.
pub const ERROR_SENTINEL: &str = "ERROR";

const SYSTEM_PROMPT: &str = "You generate concise, high-quality two-word search terms.";

#[async_trait]
pub trait KeywordGenerator: Send + Sync {
    /// A short search keyword for `title`. Implementations own their retry policy.
    async fn generate(&self, title: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

enum Attempt {
    Keyword(String),
    RateLimited,
}

/// Groq (OpenAI-compatible) chat-completions adapter with linear backoff.
pub struct GroqGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    retries: u32,
    retry_delay: Duration,
}

impl GroqGenerator {
    pub fn new(config: &KeywordsConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            retries: config.retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn request_for(&self, title: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Generate one high-quality two-word generic search term for this product title: \
                         '{title}'. Do not use brand names, numbers, or sizes. Output only the two words."
                    ),
                },
            ],
            temperature: 0.3,
            max_tokens: 20,
        }
    }

    async fn attempt(&self, request: &ChatRequest<'_>) -> Result<Attempt> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .simd_json(request)?
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Ok(Attempt::RateLimited);
        }
        if !status.is_success() {
            anyhow::bail!("API returned {status}");
        }

        let body: ChatResponse = response
            .simd_json()
            .await
            .context("Failed to parse response")?;
        let keyword = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();
        if keyword.is_empty() {
            anyhow::bail!("API returned no keyword");
        }
        Ok(Attempt::Keyword(keyword))
    }
}

#[async_trait]
impl KeywordGenerator for GroqGenerator {
    async fn generate(&self, title: &str) -> Result<String> {
        let request = self.request_for(title);
        let mut last_error = anyhow::anyhow!("Max retries exceeded");

        for attempt in 0..self.retries {
            let backoff = self.retry_delay * (attempt + 1);
            match self.attempt(&request).await {
                Ok(Attempt::Keyword(keyword)) => return Ok(keyword),
                Ok(Attempt::RateLimited) => {
                    debug_log::step("KEYWORDS", "RATE_LIMITED", || {
                        format!("attempt {}", attempt + 1)
                    });
                    last_error = anyhow::anyhow!("Rate limited");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    debug_log::step("KEYWORDS", "ATTEMPT_FAILED", || format!("{e:#}"));
                    last_error = e;
                    if attempt + 1 < self.retries {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}

/// Header names of the title, link and keyword columns, if present.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DetectedColumns {
    pub title: Option<String>,
    pub link: Option<String>,
    pub keywords: Option<String>,
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect()
}

pub fn detect_columns(headers: &[String]) -> DetectedColumns {
    const TITLE: [&str; 3] = ["producttitle", "producttitles", "title"];
    const LINK: [&str; 6] = ["link", "links", "url", "urls", "producturl", "productlink"];
    const KEYWORDS: [&str; 4] = ["keyword", "keywords", "searchterm", "searchterms"];

    let mut detected = DetectedColumns::default();
    for header in headers {
        let normalized = normalize_header(header);
        let n = normalized.as_str();
        if detected.title.is_none() && TITLE.contains(&n) {
            detected.title = Some(header.clone());
        }
        if detected.link.is_none() && LINK.contains(&n) {
            detected.link = Some(header.clone());
        }
        if detected.keywords.is_none() && KEYWORDS.contains(&n) {
            detected.keywords = Some(header.clone());
        }
    }
    detected
}

fn needs_keyword(existing: &str) -> bool {
    let existing = existing.trim();
    existing.is_empty() || existing.to_lowercase().starts_with("error")
}

/// Generate keywords row by row for rows with a title and an empty (or
/// previously failed) keyword cell.
///
/// Failures are written as `ERROR: <reason>` and counted; they never abort the
/// batch. `pause` is slept after every API call. The returned dataset holds
/// `Keywords` and, when a link column exists, `Links`.
pub async fn fill_missing_keywords<G, F>(
    dataset: &Dataset,
    generator: &G,
    pause: Duration,
    mut progress: F,
) -> Result<(Dataset, KeywordStats)>
where
    G: KeywordGenerator + ?Sized,
    F: FnMut(usize, usize),
{
    let columns = detect_columns(&dataset.headers);
    let title_idx = columns
        .title
        .as_deref()
        .and_then(|t| dataset.column_index(t))
        .context("No product title column found (expected e.g. 'Product Title' or 'Title')")?;
    let keyword_idx = columns
        .keywords
        .as_deref()
        .and_then(|k| dataset.column_index(k));
    let link_idx = columns.link.as_deref().and_then(|l| dataset.column_index(l));

    let mut headers = vec!["Keywords".to_string()];
    if link_idx.is_some() {
        headers.push("Links".to_string());
    }
    let mut output = Dataset::new(headers);
    let mut stats = KeywordStats::default();
    let total = dataset.len();

    for (i, row) in dataset.rows.iter().enumerate() {
        let title = row[title_idx].trim();
        let existing = keyword_idx.map(|k| row[k].as_str()).unwrap_or("");

        let keyword = if !title.is_empty() && needs_keyword(existing) {
            let keyword = match generator.generate(title).await {
                Ok(keyword) => {
                    stats.generated += 1;
                    keyword
                }
                Err(e) => {
                    stats.failed += 1;
                    format!("{ERROR_SENTINEL}: {e}")
                }
            };
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            keyword
        } else {
            stats.skipped += 1;
            existing.to_string()
        };

        let mut out_row = vec![keyword];
        if let Some(l) = link_idx {
            out_row.push(row[l].clone());
        }
        output.rows.push(out_row);
        progress(i + 1, total);
    }

    Ok((output, stats))
}

#[cfg(test)]
mod tests;
