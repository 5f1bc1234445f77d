pub mod attachments;
pub mod composer;
pub mod error;
pub mod gemini;
pub mod normalize;
pub mod session;
pub mod styling;

pub use attachments::{load_attachment, mime_for_path};
pub use composer::RequestComposer;
pub use error::TransportError;
pub use gemini::{GeminiTransport, GenerationRequest, GenerationTransport};
pub use normalize::{clean_json_output, normalize_response, NormalizeOutcome, Normalized};
pub use session::{EditorSession, TurnOutcome, TurnReport};
pub use styling::{background_mode, render_document, render_options, BackgroundMode};
