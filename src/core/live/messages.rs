//! Live session wire messages.
//!
//! Every frame is a JSON object with exactly one top-level key naming its
//! kind.
//!
//! # Protocol Overview
//!
//! Client frames (sent to server):
//! - `setup` - session configuration, always the first frame
//! - `clientContent` - conversation turns, with a turn-complete flag
//! - `realtimeInput` - base64 media chunks (microphone audio)
//! - `toolResponse` - acknowledgements for function calls
//!
//! Server frames (received from server):
//! - `setupComplete` - setup acknowledged
//! - `serverContent` - model turn parts, `interrupted`, `turnComplete`
//! - `toolCall` - function calls with id, name and args
//! - `toolCallCancellation` - ids of withdrawn function calls

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::base::{LiveError, LiveResult};
use crate::core::audio::{AudioChunk, is_audio_mime};

// =============================================================================
// Shared Content Types
// =============================================================================

/// Inline binary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

impl Blob {
    /// Encode an audio chunk.
    pub fn from_audio(chunk: &AudioChunk) -> Self {
        Self {
            mime_type: chunk.mime_type(),
            data: BASE64_STANDARD.encode(&chunk.data),
        }
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> LiveResult<Vec<u8>> {
        BASE64_STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| LiveError::MalformedFrame(format!("invalid base64 payload: {e}")))
    }

    pub fn is_audio(&self) -> bool {
        is_audio_mime(&self.mime_type)
    }
}

/// One part of a conversation turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inline media
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    /// Fields this client does not interpret (executable code, etc.)
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub other: serde_json::Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Whether the part carries audio (by MIME-type prefix).
    pub fn is_audio(&self) -> bool {
        self.inline_data.as_ref().is_some_and(Blob::is_audio)
    }
}

/// A conversation turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Role (user, model)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts of the turn
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

// =============================================================================
// Setup
// =============================================================================

/// Session configuration sent as the first frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    /// Model resource name, e.g. `models/gemini-2.0-flash-exp`
    pub model: String,
    /// Generation parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    /// System instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Tool declarations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

/// Generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Response modalities (`AUDIO`, `TEXT`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
    /// Voice selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

impl SpeechConfig {
    pub fn prebuilt(voice_name: impl Into<String>) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.into(),
                },
            },
        }
    }
}

/// A group of function declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

// =============================================================================
// Client Frames (sent to server)
// =============================================================================

/// Conversation turns supplied by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// Streaming media input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

/// Acknowledgement for one function call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    /// Id of the function call being answered
    pub id: String,
    /// Function name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form response payload
    pub response: Value,
}

/// Batch of function call acknowledgements.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Frames sent to the server. Serialises as `{"<kind>": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundMessage {
    Setup(SetupConfig),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl OutboundMessage {
    /// Build a `realtimeInput` frame from audio chunks.
    pub fn audio(chunks: &[AudioChunk]) -> Self {
        OutboundMessage::RealtimeInput(RealtimeInput {
            media_chunks: chunks.iter().map(Blob::from_audio).collect(),
        })
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Setup(_) => "setup",
            OutboundMessage::ClientContent(_) => "clientContent",
            OutboundMessage::RealtimeInput(_) => "realtimeInput",
            OutboundMessage::ToolResponse(_) => "toolResponse",
        }
    }

    pub fn to_json(&self) -> LiveResult<String> {
        serde_json::to_string(self).map_err(|e| LiveError::SerializationError(e.to_string()))
    }
}

// =============================================================================
// Server Frames (received from server)
// =============================================================================

/// Model output for the current turn.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Parts generated so far
    #[serde(default)]
    pub model_turn: Option<Content>,
    /// The turn was abandoned mid-stream
    #[serde(default)]
    pub interrupted: bool,
    /// The turn is finished
    #[serde(default)]
    pub turn_complete: bool,
}

/// A single function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call id; echoed back in the response
    #[serde(default)]
    pub id: String,
    /// Function name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Frame shape before classification; unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCall>,
    tool_call_cancellation: Option<ToolCallCancellation>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SetupComplete,
    ServerContent(ServerContent),
    ToolCall(ToolCall),
    ToolCallCancellation(ToolCallCancellation),
}

impl InboundMessage {
    /// Classify a frame into exactly one variant.
    ///
    /// Returns `MalformedFrame` for invalid JSON and for objects carrying
    /// none of the known keys.
    pub fn parse(text: &str) -> LiveResult<Self> {
        let raw: RawInbound = serde_json::from_str(text)
            .map_err(|e| LiveError::MalformedFrame(format!("{e}")))?;

        if raw.setup_complete.is_some() {
            Ok(InboundMessage::SetupComplete)
        } else if let Some(call) = raw.tool_call {
            Ok(InboundMessage::ToolCall(call))
        } else if let Some(cancellation) = raw.tool_call_cancellation {
            Ok(InboundMessage::ToolCallCancellation(cancellation))
        } else if let Some(content) = raw.server_content {
            Ok(InboundMessage::ServerContent(content))
        } else {
            Err(LiveError::MalformedFrame(
                "frame carries no recognised message".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_frame_shape() {
        let msg = OutboundMessage::Setup(SetupConfig {
            model: "models/test".to_string(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig::prebuilt("Puck")),
                temperature: None,
            }),
            ..Default::default()
        });
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["setup"]["model"], "models/test");
        assert_eq!(
            value["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            value["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert!(value["setup"].get("tools").is_none());
    }

    #[test]
    fn test_client_content_shape() {
        let msg = OutboundMessage::ClientContent(ClientContent {
            turns: vec![Content::user_text("hello")],
            turn_complete: true,
        });
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"clientContent": {
                "turns": [{"role": "user", "parts": [{"text": "hello"}]}],
                "turnComplete": true
            }})
        );
    }

    #[test]
    fn test_realtime_input_shape() {
        let chunk = AudioChunk::new(vec![1u8, 2, 3, 4], 16000);
        let value = serde_json::to_value(OutboundMessage::audio(&[chunk])).unwrap();
        let blob = &value["realtimeInput"]["mediaChunks"][0];
        assert_eq!(blob["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(blob["data"], "AQIDBA==");
    }

    #[test]
    fn test_tool_response_shape() {
        let msg = OutboundMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: "call-1".to_string(),
                name: None,
                response: json!({"output": "ok"}),
            }],
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"toolResponse": {"functionResponses": [
                {"id": "call-1", "response": {"output": "ok"}}
            ]}})
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        assert_eq!(
            InboundMessage::parse(r#"{"setupComplete": {}}"#).unwrap(),
            InboundMessage::SetupComplete
        );
    }

    #[test]
    fn test_parse_server_content() {
        let text = r#"{"serverContent": {
            "modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                {"text": "Searching now."}
            ]},
            "turnComplete": true
        }}"#;
        match InboundMessage::parse(text).unwrap() {
            InboundMessage::ServerContent(content) => {
                assert!(content.turn_complete);
                assert!(!content.interrupted);
                let parts = content.model_turn.unwrap().parts;
                assert!(parts[0].is_audio());
                assert!(!parts[1].is_audio());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_interrupted_without_turn() {
        match InboundMessage::parse(r#"{"serverContent": {"interrupted": true}}"#).unwrap() {
            InboundMessage::ServerContent(content) => {
                assert!(content.interrupted);
                assert!(content.model_turn.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_tool_call() {
        let text = r#"{"toolCall": {"functionCalls": [
            {"id": "fc-1", "name": "browser_action",
             "args": {"action": "SEARCH", "target": "pizza", "rawText": "find pizza"}}
        ]}}"#;
        match InboundMessage::parse(text).unwrap() {
            InboundMessage::ToolCall(call) => {
                assert_eq!(call.function_calls.len(), 1);
                assert_eq!(call.function_calls[0].args["target"], "pizza");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_cancellation() {
        match InboundMessage::parse(r#"{"toolCallCancellation": {"ids": ["a", "b"]}}"#).unwrap() {
            InboundMessage::ToolCallCancellation(c) => assert_eq!(c.ids, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_invalid_frames_are_malformed() {
        for text in [r#"{"usageMetadata": {"totalTokenCount": 3}}"#, "not json", "[]"] {
            assert!(matches!(
                InboundMessage::parse(text),
                Err(LiveError::MalformedFrame(_))
            ));
        }
    }

    #[test]
    fn test_part_preserves_unknown_fields() {
        let part: Part =
            serde_json::from_value(json!({"executableCode": {"code": "1+1"}})).unwrap();
        assert!(part.text.is_none());
        assert!(part.other.contains_key("executableCode"));
    }
}
