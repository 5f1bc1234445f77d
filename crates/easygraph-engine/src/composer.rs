use std::env;

use easygraph_contracts::chart::GenAIResponse;
use easygraph_contracts::chat::{InlineFile, Message};
use easygraph_contracts::credentials::CredentialSource;
use easygraph_contracts::events::{EventLevel, EventLog, EventPayload};
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::gemini::{map_object, truncate_text, GenerationRequest, GenerationTransport, DEFAULT_MODEL, JSON_MIME_TYPE};
use crate::normalize::{normalize_response, NormalizeOutcome, Normalized};

/// Turns longer than this are left out of the transcript.
pub const HISTORY_MESSAGE_MAX_CHARS: usize = 5000;

/// Process-wide credential variables, in lookup order.
pub const DEFAULT_CREDENTIAL_ENV_KEYS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

pub const SYSTEM_INSTRUCTION: &str = r##"
You are EasyGraph, an expert data visualization AI. Your goal is to generate JSON configurations for Chart.js.

CRITICAL RULES:
1. OUTPUT PURE VALID JSON ONLY. No markdown, no ```json blocks.
2. DO NOT include comments (// or /* */) in the JSON.
3. DO NOT use JavaScript functions. Use 'null' instead of 'undefined' or any value that cannot be serialized.
4. Ensure all strings are properly escaped.
5. STYLING & COLORS:
   - If the user requests a SPECIFIC BACKGROUND or "Dark Mode":
     - YOU MUST set 'options.customCanvasBackgroundColor' to the valid HEX string (e.g., '#1e293b' or '#000000').
     - YOU MUST set text colors ('options.scales.x.ticks.color', 'options.plugins.legend.labels.color', etc.) to a contrasting color (e.g., '#ffffff') so they are visible.
   - For standard charts, default to a white background (do not set customCanvasBackgroundColor).

The JSON structure:
{
  "chartConfig": {
    "type": "line" | "bar" | "pie" | "doughnut" | "radar" | "polarArea" | "scatter" | "bubble",
    "data": { "labels": [...], "datasets": [...] },
    "options": {
      "customCanvasBackgroundColor": "#hexcode",
      "scales": { ... },
      "plugins": { ... }
    }
  },
  "extractedData": { ... },
  "userRequest": "string",
  "summary": "string"
}
"##;

const GENERATION_GUIDANCE: &str = "Generate a valid JSON object for Chart.js.
- Extract data.
- Configure \"chartConfig\".
- Provide a \"summary\".
- Ensure JSON is valid (no comments, no functions, no trailing commas).
- If modifying style, ensure all colors (background AND text) are updated for visibility.";

/// Builds one request per user turn, sends it, and normalizes the reply.
pub struct RequestComposer {
    transport: Box<dyn GenerationTransport>,
    credentials: Box<dyn CredentialSource>,
    default_api_key: Option<String>,
    model: String,
    events: Option<EventLog>,
}

impl RequestComposer {
    pub fn new(
        transport: Box<dyn GenerationTransport>,
        credentials: Box<dyn CredentialSource>,
    ) -> Self {
        Self {
            transport,
            credentials,
            default_api_key: default_api_key_from_env(),
            model: non_empty_env("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            events: None,
        }
    }

    pub fn with_default_api_key(mut self, key: Option<String>) -> Self {
        self.default_api_key = key
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// A stored custom key wins over the process default.
    pub fn resolve_api_key(&self) -> Result<String, TransportError> {
        self.credentials
            .stored_api_key()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| self.default_api_key.clone())
            .ok_or(TransportError::MissingCredential)
    }

    pub fn compose_request(
        &self,
        api_key: String,
        prompt: &str,
        attachments: &[InlineFile],
        history: &[Message],
    ) -> GenerationRequest {
        GenerationRequest {
            api_key,
            model: self.model.clone(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            text: compose_prompt_text(prompt, &flatten_history(history)),
            attachments: attachments.to_vec(),
            response_mime_type: JSON_MIME_TYPE.to_string(),
        }
    }

    pub fn generate(
        &self,
        prompt: &str,
        attachments: &[InlineFile],
        history: &[Message],
    ) -> Result<GenAIResponse, TransportError> {
        self.generate_normalized(prompt, attachments, history)
            .map(|normalized| normalized.response)
    }

    /// Same as `generate`, but keeps the normalizer outcome for reporting.
    pub fn generate_normalized(
        &self,
        prompt: &str,
        attachments: &[InlineFile],
        history: &[Message],
    ) -> Result<Normalized, TransportError> {
        let api_key = match self.resolve_api_key() {
            Ok(key) => key,
            Err(err) => {
                self.log_transport_error(&err);
                return Err(err);
            }
        };
        let request = self.compose_request(api_key, prompt, attachments, history);
        self.log(
            EventLevel::Info,
            "request_sent",
            json!({
                "model": request.model,
                "prompt_chars": prompt.chars().count(),
                "attachments": attachments.len(),
                "history_turns": history.len(),
            }),
        );

        let raw = match self.transport.generate_content(&request) {
            Ok(raw) => raw,
            Err(err) => {
                self.log_transport_error(&err);
                return Err(err);
            }
        };

        let normalized = normalize_response(&raw, prompt);
        match &normalized.outcome {
            NormalizeOutcome::Parsed => self.log(
                EventLevel::Info,
                "response_normalized",
                json!({
                    "chart_type": normalized.response.chart_config.chart_type.as_str(),
                    "datasets": normalized.response.chart_config.data.datasets.len(),
                    "reply_chars": raw.chars().count(),
                }),
            ),
            NormalizeOutcome::Fallback { reason, cleaned } => self.log(
                EventLevel::Warn,
                "normalize_fallback",
                json!({
                    "reason": reason,
                    "cleaned": truncate_text(cleaned, 2000),
                }),
            ),
        }
        Ok(normalized)
    }

    fn log_transport_error(&self, err: &TransportError) {
        self.log(
            EventLevel::Warn,
            "transport_error",
            json!({
                "kind": err.kind(),
                "error": err.to_string(),
            }),
        );
    }

    fn log(&self, level: EventLevel, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload: EventPayload = map_object(payload);
        if let Err(err) = events.emit(level, event_type, payload) {
            eprintln!("easygraph: failed to record {event_type} event: {err:#}");
        }
    }
}

/// `ROLE: content` lines for the turns worth replaying.
pub fn flatten_history(history: &[Message]) -> String {
    history
        .iter()
        .filter(|message| {
            !message.content.is_empty()
                && message.content.chars().count() < HISTORY_MESSAGE_MAX_CHARS
        })
        .map(|message| {
            format!(
                "{}: {}",
                message.role.as_str().to_ascii_uppercase(),
                message.content
            )
        })
        .collect::<Vec<String>>()
        .join("\n")
}

pub fn compose_prompt_text(prompt: &str, transcript: &str) -> String {
    let mut text = String::new();
    if !transcript.is_empty() {
        text.push_str("PREVIOUS CONTEXT:\n");
        text.push_str(transcript);
        text.push_str("\n\n");
    }
    text.push_str("CURRENT REQUEST: ");
    text.push_str(prompt);
    text.push_str("\n\n");
    text.push_str(GENERATION_GUIDANCE);
    text
}

fn default_api_key_from_env() -> Option<String> {
    DEFAULT_CREDENTIAL_ENV_KEYS
        .iter()
        .find_map(|key| non_empty_env(key))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use easygraph_contracts::chart::{ChartType, FALLBACK_SUMMARY};
    use easygraph_contracts::chat::{InlineFile, Message};
    use easygraph_contracts::credentials::CredentialSource;
    use easygraph_contracts::events::{read_events, EventLog};
    use serde_json::json;

    use super::*;

    struct FixedCredential(Option<String>);

    impl CredentialSource for FixedCredential {
        fn stored_api_key(&self) -> Option<String> {
            self.0.clone()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTransport {
        reply: Arc<Mutex<Option<String>>>,
        seen: Arc<Mutex<Vec<GenerationRequest>>>,
    }

    impl RecordingTransport {
        fn replying(reply: &str) -> Self {
            let transport = Self::default();
            if let Ok(mut slot) = transport.reply.lock() {
                *slot = Some(reply.to_string());
            }
            transport
        }

        fn requests(&self) -> Vec<GenerationRequest> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl GenerationTransport for RecordingTransport {
        fn generate_content(&self, request: &GenerationRequest) -> Result<String, TransportError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            self.reply
                .lock()
                .ok()
                .and_then(|reply| reply.clone())
                .ok_or(TransportError::EmptyResponse)
        }
    }

    fn composer(transport: &RecordingTransport, stored: Option<&str>, default: Option<&str>) -> RequestComposer {
        RequestComposer::new(
            Box::new(transport.clone()),
            Box::new(FixedCredential(stored.map(str::to_string))),
        )
        .with_default_api_key(default.map(str::to_string))
        .with_model("gemini-test")
    }

    #[test]
    fn stored_key_wins_over_default() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying("{}");
        let composer = composer(&transport, Some(" stored-key "), Some("env-key"));
        assert_eq!(composer.resolve_api_key()?, "stored-key");

        composer.generate("plot", &[], &[])?;
        assert_eq!(transport.requests()[0].api_key, "stored-key");
        Ok(())
    }

    #[test]
    fn default_key_used_when_nothing_stored() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying("{}");
        let composer = composer(&transport, Some("   "), Some("env-key"));
        assert_eq!(composer.resolve_api_key()?, "env-key");
        Ok(())
    }

    #[test]
    fn missing_credential_is_an_error_and_sends_nothing() {
        let transport = RecordingTransport::replying("{}");
        let composer = composer(&transport, None, None);
        let err = composer.generate("plot", &[], &[]).err();
        assert!(matches!(err, Some(TransportError::MissingCredential)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn transport_failure_propagates_unchanged() {
        let transport = RecordingTransport::default();
        let composer = composer(&transport, Some("key"), None);
        let err = composer.generate("plot", &[], &[]).err();
        assert!(matches!(err, Some(TransportError::EmptyResponse)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn history_skips_empty_and_oversized_turns() {
        let history = vec![
            Message::user("sales 2023: 10, 20, 30", Vec::new()),
            Message::assistant(""),
            Message::assistant("x".repeat(HISTORY_MESSAGE_MAX_CHARS)),
            Message::assistant("Here is your bar chart."),
        ];
        assert_eq!(
            flatten_history(&history),
            "USER: sales 2023: 10, 20, 30\nASSISTANT: Here is your bar chart."
        );
        assert_eq!(flatten_history(&[]), "");
    }

    #[test]
    fn prompt_text_layout() {
        let with_context = compose_prompt_text("make it a line chart", "USER: hi");
        assert!(with_context.starts_with("PREVIOUS CONTEXT:\nUSER: hi\n\nCURRENT REQUEST: make it a line chart\n"));
        assert!(with_context.ends_with("updated for visibility."));

        let fresh = compose_prompt_text("", "");
        assert!(fresh.starts_with("CURRENT REQUEST: \n\n"));
        assert!(!fresh.contains("PREVIOUS CONTEXT"));
    }

    #[test]
    fn request_carries_instruction_attachments_and_transcript() -> anyhow::Result<()> {
        let reply = json!({
            "chartConfig": {"type": "radar", "data": {"labels": ["a"], "datasets": []}, "options": {}},
            "extractedData": {"a": 1},
            "userRequest": "radar",
            "summary": "Radar chart"
        });
        let transport = RecordingTransport::replying(&format!("```json\n{reply}\n```"));
        let composer = composer(&transport, Some("key"), None);
        let files = vec![InlineFile {
            mime_type: "text/csv".to_string(),
            data: "YSwx".to_string(),
        }];
        let history = vec![Message::user("earlier turn", Vec::new())];

        let response = composer.generate("radar", &files, &history)?;
        assert_eq!(response.chart_config.chart_type, ChartType::Radar);
        assert_eq!(response.summary, "Radar chart");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gemini-test");
        assert_eq!(request.system_instruction, SYSTEM_INSTRUCTION);
        assert_eq!(request.response_mime_type, "application/json");
        assert_eq!(request.attachments, files);
        assert!(request.text.contains("PREVIOUS CONTEXT:\nUSER: earlier turn"));
        assert!(request.text.contains("CURRENT REQUEST: radar"));
        Ok(())
    }

    #[test]
    fn malformed_reply_becomes_fallback_and_is_logged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let transport = RecordingTransport::replying("Sorry, I can't help with that.");
        let composer = composer(&transport, Some("key"), None)
            .with_events(EventLog::new(&events_path, "s-1"));

        let normalized = composer.generate_normalized("chart please", &[], &[])?;
        assert!(normalized.is_fallback());
        assert_eq!(normalized.response.summary, FALLBACK_SUMMARY);
        assert_eq!(normalized.response.user_request, "chart please");

        let types: Vec<String> = read_events(&events_path)?
            .iter()
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(types, vec!["request_sent", "normalize_fallback"]);
        Ok(())
    }
}
