/// Failures before a model reply is in hand. These reach the caller unchanged;
/// anything wrong with a received reply is absorbed by the normalizer instead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No API key configured. Save a Gemini API key with `easygraph-rs key set` or set GEMINI_API_KEY.")]
    MissingCredential,

    #[error("Gemini request failed ({endpoint})")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Gemini request failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Gemini returned invalid JSON payload")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("No response from Gemini")]
    EmptyResponse,
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::MissingCredential => "missing_credential",
            TransportError::Request { .. } => "request",
            TransportError::Http { .. } => "http_status",
            TransportError::InvalidPayload(_) => "invalid_payload",
            TransportError::EmptyResponse => "empty_response",
        }
    }
}
