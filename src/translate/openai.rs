//! OpenAI-compatible chat/completions translation client.
//! Connection pooling via reqwest, bounded request timeout, opt-in retry
//! for 429 / 5xx / timeouts.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{QualityIssue, Review, TokenUsage, TranslateError, Translation, Translator};
use crate::config::Config;
use crate::languages::language_name;

/// Reviews read many lines at once and get a longer budget than translations.
const REVIEW_TIMEOUT: Duration = Duration::from_secs(60);

const REVIEW_SYSTEM_PROMPT: &str =
    "You are a translation quality reviewer. Respond only with valid JSON.";

pub struct OpenAiTranslator {
    http: reqwest::Client,
    enabled: bool,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    /// Extra attempts after a retryable failure. 0 disables retries.
    max_retries: u32,
}

impl OpenAiTranslator {
    pub fn new(config: &Config) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.ai_timeout)
            .build()
            .map_err(|e| TranslateError::Http(e.to_string()))?;

        Ok(Self {
            http,
            enabled: config.ai_enabled && !config.ai_api_key.trim().is_empty(),
            api_key: config.ai_api_key.clone(),
            api_url: config.ai_api_url.clone(),
            model: config.ai_model.clone(),
            max_tokens: config.ai_max_tokens,
            max_retries: config.ai_max_retries,
        })
    }

    /// Send request, retrying retryable failures up to `max_retries` times.
    /// 429: Retry-After or 1s/2s/4s. 5xx: 500ms exponential. Timeout: immediate.
    /// `timeout` overrides the client-wide request timeout.
    async fn send_with_retry(
        &self,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, TranslateError> {
        let mut attempt: u32 = 0;

        loop {
            let mut request = self
                .http
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(body);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            let result = request.send().await;

            let can_retry = attempt < self.max_retries;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().as_u16() == 429 => {
                    if !can_retry {
                        return Err(TranslateError::RateLimited);
                    }
                    let wait = resp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Duration::from_secs(1 << attempt.min(2)));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "429 rate limited, retrying");
                    tokio::time::sleep(wait).await;
                }
                Ok(resp) if resp.status().is_server_error() && can_retry => {
                    let wait = Duration::from_millis(500 * (1 << attempt.min(4)));
                    warn!(
                        attempt,
                        status = resp.status().as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "5xx error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(TranslateError::Api {
                        status,
                        body: body_text.chars().take(200).collect(),
                    });
                }
                Err(e) if e.is_timeout() => {
                    if !can_retry {
                        return Err(TranslateError::Timeout);
                    }
                    warn!(attempt, "request timeout, retrying");
                }
                Err(e) => return Err(TranslateError::Http(e.to_string())),
            }

            attempt += 1;
        }
    }

    async fn chat(
        &self,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<ChatResponse, TranslateError> {
        let response = self.send_with_retry(body, timeout).await?;
        response.json().await.map_err(|e| {
            if e.is_timeout() {
                TranslateError::Timeout
            } else {
                TranslateError::MalformedResponse(e.to_string())
            }
        })
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        context: Option<&str>,
    ) -> Result<Translation, TranslateError> {
        if !self.enabled {
            return Err(TranslateError::Disabled);
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": build_system_prompt(target_lang, context)},
                {"role": "user", "content": text}
            ],
            "max_tokens": self.max_tokens,
            "temperature": 0.3
        });

        let parsed = self.chat(&body, None).await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TranslateError::MalformedResponse("no choices in response".into()))?;

        let usage = parsed.usage.unwrap_or_default();
        debug!(target_lang, total_tokens = usage.total_tokens, "translation received");

        Ok(Translation {
            text: content.trim().to_string(),
            usage,
        })
    }

    async fn review(&self, lines: &str) -> Result<Review, TranslateError> {
        if !self.enabled {
            return Err(TranslateError::Disabled);
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": REVIEW_SYSTEM_PROMPT},
                {"role": "user", "content": build_review_prompt(lines)}
            ],
            "max_tokens": self.max_tokens,
            "temperature": 0.2
        });

        let parsed = self.chat(&body, Some(REVIEW_TIMEOUT)).await?;
        // no content means nothing to report
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "[]".to_string());

        let issues: Vec<QualityIssue> = serde_json::from_str(content.trim())
            .map_err(|e| TranslateError::MalformedResponse(format!("review is not a JSON list: {e}")))?;

        let usage = parsed.usage.unwrap_or_default();
        debug!(issues = issues.len(), total_tokens = usage.total_tokens, "review received");
        Ok(Review { issues, usage })
    }
}

// --- Prompt construction ---

fn build_system_prompt(target_lang: &str, context: Option<&str>) -> String {
    let name = language_name(target_lang)
        .map(str::to_string)
        .unwrap_or_else(|| target_lang.to_uppercase());

    let mut prompt = format!(
        "You are a professional translator. Translate the given text to {name} ({target_lang}). \
         Rules:\n\
         - Return ONLY the translated text, no explanations.\n\
         - Preserve HTML tags, variables like :name or {{name}}, and markdown formatting.\n\
         - Maintain the same tone and register.\n\
         - Do not translate brand names or technical terms unless there's a standard translation."
    );
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\n- Context: {ctx}"));
    }
    prompt
}

fn build_review_prompt(lines: &str) -> String {
    format!(
        "Analyze these translations for quality. For each one with issues \
         (grammar, tone, phrasing), return a JSON array of objects with: \
         key, issue, suggestion. Return [] if all good.\n\n{lines}"
    )
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
