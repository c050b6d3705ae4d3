//! Vision LLM client for image descriptions.
//!
//! Talks to any OpenAI-compatible chat endpoint (LM Studio, Ollama with a
//! vision model, hosted APIs). The image goes along as a base64 data URL;
//! the prompt asks for strict JSON matching [`ImageDescription`] and the
//! reply is fence-stripped before parsing because local models love to wrap
//! JSON in markdown.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

use super::{request_error, ServiceError};
use crate::config::LlmConfig;
use crate::sidecar::ImageDescription;

const DESCRIPTION_PROMPT: &str = "\
Analyze this image and respond with a single JSON object, no other text, \
with exactly these fields:\n\
  \"short_description\": one sentence,\n\
  \"long_description\": a detailed paragraph,\n\
  \"keywords\": array of lowercase keywords,\n\
  \"picture_type\": one of photo, screenshot, drawing, painting, document, meme, other,\n\
  \"mood\": one word,\n\
  \"style\": one word or short phrase,\n\
  \"has_nudity\": boolean,\n\
  \"has_explicit_content\": boolean";

pub struct VisionClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl VisionClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(120))
            .build();
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            agent,
        }
    }

    /// Describe an image, returning the structured annotation the sidecar
    /// and the index store.
    pub fn describe_image(&self, image_path: &Path) -> Result<ImageDescription, ServiceError> {
        let (base64_image, mime_type) = load_and_encode_image(image_path, 1024)?;
        let data_url = format!("data:{};base64,{}", mime_type, base64_image);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: DESCRIPTION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 800,
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", self.endpoint);
        let mut req = self.agent.post(&url).set("Content-Type", "application/json");
        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| request_error(&self.endpoint, e))?;

        let chat_response: ChatResponse = response
            .into_json()
            .map_err(|e| ServiceError::BadPayload(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ServiceError::BadPayload("no choices in response".to_string()))?;

        parse_description(&content)
    }
}

/// Parse the model's reply into an [`ImageDescription`], tolerating fenced
/// or chatter-wrapped JSON. Keywords are normalized to lowercase.
fn parse_description(content: &str) -> Result<ImageDescription, ServiceError> {
    let json = extract_json_block(content)
        .ok_or_else(|| ServiceError::BadPayload("no JSON object in reply".to_string()))?;
    let mut description: ImageDescription =
        serde_json::from_str(json).map_err(|e| ServiceError::BadPayload(e.to_string()))?;
    description.keywords = description
        .keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    Ok(description)
}

/// The outermost `{ ... }` span of the reply, if any.
fn extract_json_block(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}

/// Downscale to `max_dim` and re-encode as JPEG for the data URL. Keeps
/// request bodies small enough for local model servers.
fn load_and_encode_image(
    image_path: &Path,
    max_dim: u32,
) -> Result<(String, &'static str), ServiceError> {
    let img = image::open(image_path).map_err(|e| ServiceError::BadImage {
        path: image_path.display().to_string(),
        reason: e.to_string(),
    })?;

    let (width, height) = img.dimensions();
    let img = if width > max_dim || height > max_dim {
        img.thumbnail(max_dim, max_dim)
    } else {
        img
    };

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, 85);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ServiceError::BadImage {
            path: image_path.display().to_string(),
            reason: e.to_string(),
        })?;

    Ok((BASE64.encode(buffer.into_inner()), "image/jpeg"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_block_plain() {
        let content = r#"{"short_description": "a dog"}"#;
        assert_eq!(extract_json_block(content), Some(content));
    }

    #[test]
    fn test_extract_json_block_fenced() {
        let content = "```json\n{\"mood\": \"calm\"}\n```";
        assert_eq!(extract_json_block(content), Some("{\"mood\": \"calm\"}"));
    }

    #[test]
    fn test_extract_json_block_with_chatter() {
        let content = "Sure! Here is the JSON:\n{\"style\": \"noir\"}\nHope that helps.";
        assert_eq!(extract_json_block(content), Some("{\"style\": \"noir\"}"));
    }

    #[test]
    fn test_extract_json_block_absent() {
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn test_parse_description_normalizes_keywords() {
        let content = r#"
        {
            "short_description": "A red car",
            "keywords": [" Car ", "RED", ""],
            "has_nudity": false,
            "has_explicit_content": false
        }"#;
        let description = parse_description(content).unwrap();
        assert_eq!(description.keywords, vec!["car", "red"]);
        assert_eq!(description.short_description.as_deref(), Some("A red car"));
    }

    #[test]
    fn test_parse_description_rejects_garbage() {
        assert!(parse_description("the model refused").is_err());
    }
}
