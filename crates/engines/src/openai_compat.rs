//! Adapter for OpenAI-compatible completions servers (vLLM and friends).
//!
//! Both co-located engines expose the same `/v1/completions` surface; one
//! instance of [`OpenAiCompatEngine`] is built per engine. The chat
//! instance streams; the classifier instance does one small blocking
//! completion per call.
//!
//! Abort is cooperative: cancelling the handle's token makes the stream
//! task stop reading and drop the response body, which closes the
//! connection to the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use bn_domain::{Error, Result};

use crate::sse::{from_reqwest, token_stream};
use crate::traits::{ChatEngine, GenerateRequest, Generation, StreamHandle, ToolClassifier};

pub struct OpenAiCompatEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatEngine {
    /// Build an adapter for one engine endpoint with a hard per-request
    /// deadline.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("engine client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.base_url)
    }

    async fn post_completions(&self, body: &CompletionsBody<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.completions_url())
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        match response.status() {
            s if s.is_success() => Ok(response),
            reqwest::StatusCode::SERVICE_UNAVAILABLE => {
                Err(Error::EngineNotReady(self.model.clone()))
            }
            s => {
                let detail = response.text().await.unwrap_or_default();
                Err(Error::Http(format!("engine returned {s}: {detail}")))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct CompletionsBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    temperature: f32,
    top_p: f32,
    repetition_penalty: f32,
    max_tokens: u32,
    /// vLLM scheduling priority extension; ignored by servers without
    /// priority scheduling.
    priority: i32,
}

impl<'a> CompletionsBody<'a> {
    fn from_request(model: &'a str, req: &'a GenerateRequest, stream: bool) -> Self {
        Self {
            model,
            prompt: &req.prompt,
            stream,
            temperature: req.sampling.temperature,
            top_p: req.sampling.top_p,
            repetition_penalty: req.sampling.repetition_penalty,
            max_tokens: req.sampling.max_tokens,
            priority: req.priority,
        }
    }
}

#[derive(Deserialize)]
struct CompletionsChunk {
    #[serde(default)]
    choices: Vec<CompletionsChoice>,
}

#[derive(Deserialize)]
struct CompletionsChoice {
    #[serde(default)]
    text: String,
}

fn parse_chunk_text(data: &str) -> Option<String> {
    match serde_json::from_str::<CompletionsChunk>(data) {
        Ok(chunk) => chunk.choices.into_iter().next().map(|c| c.text),
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable completions chunk");
            None
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait impls
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ChatEngine for OpenAiCompatEngine {
    async fn generate_stream(&self, req: GenerateRequest) -> Result<Generation> {
        let body = CompletionsBody::from_request(&self.model, &req, true);
        let response = self.post_completions(&body).await?;

        let handle = StreamHandle::new();
        let stream = token_stream(response, handle.cancel_token().clone(), parse_chunk_text);
        Ok((handle, stream))
    }
}

#[async_trait::async_trait]
impl ToolClassifier for OpenAiCompatEngine {
    async fn generate(&self, req: GenerateRequest) -> Result<String> {
        let body = CompletionsBody::from_request(&self.model, &req, false);
        let response = self.post_completions(&body).await?;

        let parsed: CompletionsChunk = response.json().await.map_err(from_reqwest)?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bn_domain::stream::SamplingParams;

    fn request() -> GenerateRequest {
        GenerateRequest {
            prompt: "hello".into(),
            sampling: SamplingParams {
                temperature: 0.8,
                top_p: 0.95,
                repetition_penalty: 1.1,
                max_tokens: 200,
            },
            priority: 1,
        }
    }

    #[test]
    fn body_carries_sampling_and_priority() {
        let req = request();
        let body = CompletionsBody::from_request("chat", &req, true);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "chat");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 200);
        assert_eq!(json["priority"], 1);
        assert!((json["repetition_penalty"].as_f64().unwrap() - 1.1).abs() < 1e-6);
    }

    #[test]
    fn chunk_text_extracted_from_first_choice() {
        let data = r#"{"id":"c1","choices":[{"index":0,"text":"Hel"}]}"#;
        assert_eq!(parse_chunk_text(data), Some("Hel".into()));
    }

    #[test]
    fn malformed_chunk_is_skipped() {
        assert_eq!(parse_chunk_text("not json"), None);
    }

    #[test]
    fn empty_choices_yield_nothing() {
        assert_eq!(parse_chunk_text(r#"{"choices":[]}"#), None);
    }

    #[test]
    fn base_url_trailing_slash_normalized() {
        let engine =
            OpenAiCompatEngine::new("http://localhost:8001/", "chat", Duration::from_secs(30))
                .unwrap();
        assert_eq!(engine.completions_url(), "http://localhost:8001/v1/completions");
    }
}
