//! Google Gemini `generateContent` client

use super::{GenerationError, GenerationProvider, Role, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: &str,
        api_key: String,
        temperature: f32,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model: model.to_string(),
            temperature,
        }
    }


    fn request_body<'a>(&self, history: &'a [Turn], prompt: &'a str) -> GenerateRequest<'a> {
        let mut contents: Vec<Content<'a>> = history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                },
                parts: [Part {
                    text: &turn.content,
                }],
            })
            .collect();
        contents.push(Content {
            role: "user",
            parts: [Part { text: prompt }],
        });

        GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn generate(&self, history: &[Turn], prompt: &str) -> Result<String, GenerationError> {
        let body = self.request_body(history, prompt);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error {status}: {body}");
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse {
                provider: "gemini".to_string(),
            });
        }

        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RateLimitSignal;
    use crate::test_support::{json_response, spawn_mock_server};

    fn provider(port: u16) -> GeminiProvider {
        GeminiProvider::new(
            format!("http://127.0.0.1:{port}/v1beta/"),
            "gemini-1.5-flash",
            "secret".to_string(),
            0.1,
        )
    }

    #[test]
    fn test_request_maps_history_roles() {
        let provider = provider(1);
        let history = vec![Turn::user("Who was seen?"), Turn::assistant("Sarah saw a man.")];

        let body = serde_json::to_value(provider.request_body(&history, "What did she see?")).unwrap();

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "What did she see?");
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[tokio::test]
    async fn test_generate_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"The car was red "},{"text":"[witness_sarah.txt]."}]}}]}"#;
        let (port, _handle) = spawn_mock_server(vec![json_response("200 OK", body)]).await;

        let text = provider(port).generate(&[], "What color?").await.unwrap();
        assert_eq!(text, "The car was red [witness_sarah.txt].");
    }

    #[tokio::test]
    async fn test_generate_rate_limited() {
        let (port, _handle) =
            spawn_mock_server(vec![json_response("429 Too Many Requests", "{}")]).await;

        let err = provider(port).generate(&[], "What color?").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_generate_empty_candidates() {
        let (port, _handle) =
            spawn_mock_server(vec![json_response("200 OK", r#"{"candidates":[]}"#)]).await;

        let err = provider(port).generate(&[], "What color?").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse { .. }));
    }

    #[test]
    fn test_debug_redacts_key() {
        assert!(!format!("{:?}", provider(1)).contains("secret"));
    }
}
