use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{parse, GuideReply, ModelGateway, TurnRequest, DEFAULT_IMAGE_PROMPT};
use crate::session::Citation;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// Shown when the model answers with no text at all.
const EMPTY_ANSWER: &str = "Maloomat dastiyaab nahi hain.";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("api key is not set")]
    MissingKey,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
}

/// Talks to the Gemini `generateContent` REST endpoint. One request per
/// turn; the maps grounding tool is always on, the location bias only when
/// the turn carries coordinates.
pub struct GeminiGateway {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    system_instruction: String,
}

impl GeminiGateway {
    pub fn new(
        api_key: String,
        model: String,
        api_base: String,
        system_instruction: String,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base,
            api_key,
            model,
            system_instruction,
        })
    }

    fn build_request(&self, turn: &TurnRequest) -> GenerateContentRequest {
        let mut parts = Vec::new();
        if let Some(image) = &turn.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type().to_string(),
                    data: image.payload().to_string(),
                },
            });
        }
        let prompt = if turn.prompt.trim().is_empty() && turn.image.is_some() {
            DEFAULT_IMAGE_PROMPT.to_string()
        } else {
            turn.prompt.clone()
        };
        parts.push(Part::Text { text: prompt });

        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            system_instruction: Content {
                role: "system".to_string(),
                parts: vec![Part::Text {
                    text: self.system_instruction.clone(),
                }],
            },
            tools: vec![Tool {
                google_maps: GoogleMaps {},
            }],
            tool_config: turn.location.map(|c| ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: c.latitude,
                        longitude: c.longitude,
                    },
                },
            }),
        }
    }

    fn request(&self, turn: &TurnRequest) -> Result<GuideReply, GatewayError> {
        if self.api_key.is_empty() {
            return Err(GatewayError::MissingKey);
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&self.build_request(turn))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let decoded: GenerateContentResponse = response.json()?;
        Ok(decode_reply(decoded))
    }
}

impl ModelGateway for GeminiGateway {
    fn send_turn(&self, turn: TurnRequest) -> GuideReply {
        match self.request(&turn) {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("model call failed: {err}");
                GuideReply {
                    display_text: format!("System error. Please try again. ({err})"),
                    citations: Vec::new(),
                    pois: Vec::new(),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "googleMaps")]
    google_maps: GoogleMaps,
}

#[derive(Debug, Serialize)]
struct GoogleMaps {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    retrieval_config: RetrievalConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfig {
    lat_lng: LatLng,
}

#[derive(Debug, Serialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ReplyContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<ChunkRef>,
    maps: Option<ChunkRef>,
}

#[derive(Debug, Deserialize)]
struct ChunkRef {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|wrapper| wrapper.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

fn decode_reply(response: GenerateContentResponse) -> GuideReply {
    let mut text = String::new();
    let mut citations = Vec::new();

    if let Some(candidate) = response.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(chunk) = part.text {
                    text.push_str(&chunk);
                }
            }
        }
        if let Some(grounding) = candidate.grounding_metadata {
            citations = collect_citations(grounding);
        }
    }

    if text.trim().is_empty() {
        text = EMPTY_ANSWER.to_string();
    }

    let (display_text, pois) = parse::split_poi_block(&text);
    GuideReply {
        display_text,
        citations,
        pois,
    }
}

fn collect_citations(grounding: GroundingMetadata) -> Vec<Citation> {
    let mut citations = Vec::new();
    for chunk in grounding.grounding_chunks {
        if let Some(ChunkRef { uri: Some(uri), title }) = chunk.web {
            let title = title.unwrap_or_else(|| uri.clone());
            citations.push(Citation::Web { uri, title });
        }
        if let Some(ChunkRef { uri: Some(uri), title }) = chunk.maps {
            let title = title.unwrap_or_else(|| uri.clone());
            citations.push(Citation::Maps { uri, title });
        }
    }
    citations
}
