use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::MediaRef;

/// Everything the hosted model needs for one call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub output_schema: Value,
    pub media: Vec<MediaRef>,
}

/// The hosted generative model. Returns the raw response text,
/// which is expected to hold a JSON document matching `output_schema`.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    fn name(&self) -> &str;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a Value, // JSON schema for structured output
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llava".to_string(),
        )
    }

    fn build_request<'a>(&'a self, request: &'a GenerateRequest) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            format: &request.output_schema,
            images: request.media.iter().map(|m| m.data.as_str()).collect(),
        }
    }
}

#[async_trait]
impl GenerativeModel for OllamaClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self.client
            .post(&url)
            .json(&self.build_request(request))
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Google Gemini `generateContent` over REST
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiPart<'a> {
    Text(&'a str),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        data: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<&'a Value>,
}

#[derive(Deserialize)]
struct GeminiResponse {
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
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self {
            base_url,
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(api_key: String) -> Self {
        Self::new(
            "https://generativelanguage.googleapis.com".to_string(),
            "gemini-2.0-flash".to_string(),
            api_key,
        )
    }

    fn build_request<'a>(&self, request: &'a GenerateRequest) -> GeminiRequest<'a> {
        let mut parts = vec![GeminiPart::Text(&request.prompt)];
        parts.extend(request.media.iter().map(|m| GeminiPart::InlineData {
            mime_type: &m.mime_type,
            data: &m.data,
        }));

        GeminiRequest {
            contents: vec![GeminiContent { role: "user", parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_json_schema: Some(&request.output_schema).filter(|schema| !schema.is_null()),
            },
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(request))
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini request failed: {} {}", status, body.trim());
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            anyhow::bail!("Gemini returned no candidates");
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> GenerateRequest {
        GenerateRequest {
            prompt: "Describe the attached image.".to_string(),
            output_schema: json!({"type": "object"}),
            media: vec![MediaRef {
                mime_type: "image/png".to_string(),
                data: "aGVsbG8=".to_string(),
            }],
        }
    }

    #[test]
    fn test_ollama_request_body() {
        let client = OllamaClient::default();
        let request = request();
        let body = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(body["model"], "llava");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], json!({"type": "object"}));
        assert_eq!(body["images"], json!(["aGVsbG8="]));
    }

    #[test]
    fn test_ollama_request_omits_empty_images() {
        let client = OllamaClient::default();
        let mut request = request();
        request.media.clear();
        let body = serde_json::to_value(client.build_request(&request)).unwrap();
        assert!(body.get("images").is_none());
    }

    #[test]
    fn test_gemini_request_body() {
        let client = GeminiClient::with_api_key("test-key".to_string());
        let request = request();
        let body = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0], json!({"text": "Describe the attached image."}));
        assert_eq!(
            body["contents"][0]["parts"][1],
            json!({"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}})
        );
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseJsonSchema"], json!({"type": "object"}));
    }

    #[test]
    fn test_gemini_response_parts_are_joined() {
        let raw = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"title\":"}, {"text": "\"Mug\"}"}]}}]
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .filter_map(|p| p.text.clone())
            .collect();
        assert_eq!(text, "{\"title\":\"Mug\"}");
    }
}
