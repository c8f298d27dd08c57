//! Request bodies and response decoding per wire format

use lens_core::{
  CodeFragment, ContentType, Language, QueryError, QueryParams, RawResponse,
  config::{ServiceConfig, WireFormat},
};
use serde::{Deserialize, Serialize};

/// Version header sent with the anthropic wire format
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WireBody<'a> {
  Simple(SimpleRequest<'a>),
  Chat(ChatRequest<'a>),
  Messages(MessagesRequest<'a>),
}

#[derive(Debug, Serialize)]
pub struct SimpleRequest<'a> {
  pub fragment: FragmentBody<'a>,
  pub prompt: &'a str,
  pub params: &'a QueryParams,
}

#[derive(Debug, Serialize)]
pub struct FragmentBody<'a> {
  pub unit: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<&'a str>,
  pub language: Language,
  pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
  pub role: &'static str,
  pub content: &'a str,
}

/// OpenAI-style chat completions body (also spoken by Mistral)
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
  pub model: &'a str,
  pub messages: Vec<ChatMessage<'a>>,
  pub max_tokens: u32,
  pub temperature: f32,
}

/// Anthropic messages body
#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
  pub model: &'a str,
  pub max_tokens: u32,
  pub messages: Vec<ChatMessage<'a>>,
}

/// Build the body for one outbound call
pub fn encode<'a>(
  service: &'a ServiceConfig,
  fragment: &'a CodeFragment,
  prompt: &'a str,
  params: &'a QueryParams,
) -> WireBody<'a> {
  let model = service.model().unwrap_or_default();
  let messages = vec![ChatMessage {
    role: "user",
    content: prompt,
  }];

  match service.wire_format {
    WireFormat::Simple => WireBody::Simple(SimpleRequest {
      fragment: FragmentBody {
        unit: &fragment.id().unit,
        location: fragment.id().location.as_deref(),
        language: fragment.language(),
        text: fragment.text(),
      },
      prompt,
      params,
    }),
    WireFormat::OpenAi | WireFormat::Mistral => WireBody::Chat(ChatRequest {
      model,
      messages,
      max_tokens: service.max_tokens,
      temperature: service.temperature,
    }),
    WireFormat::Anthropic => WireBody::Messages(MessagesRequest {
      model,
      max_tokens: service.max_tokens,
      messages,
    }),
  }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
  message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
  content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
  content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ContentBlock {
  Text {
    text: String,
  },
  #[serde(other)]
  Other,
}

/// Decode and validate a 2xx response body
pub fn decode(format: WireFormat, body: &str) -> Result<RawResponse, QueryError> {
  match format {
    WireFormat::Simple => serde_json::from_str::<RawResponse>(body).map_err(|e| QueryError::malformed(e.to_string())),
    WireFormat::OpenAi | WireFormat::Mistral => {
      let response: ChatResponse = serde_json::from_str(body).map_err(|e| QueryError::malformed(e.to_string()))?;
      let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| QueryError::malformed("No response content in choices"))?;
      Ok(RawResponse::new(content, ContentType::Markdown))
    }
    WireFormat::Anthropic => {
      let response: MessagesResponse = serde_json::from_str(body).map_err(|e| QueryError::malformed(e.to_string()))?;
      let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
          ContentBlock::Text { text } => Some(text),
          ContentBlock::Other => None,
        })
        .collect();
      if text.trim().is_empty() {
        return Err(QueryError::malformed("No text blocks in response content"));
      }
      Ok(RawResponse::new(text, ContentType::Markdown))
    }
  }
}
