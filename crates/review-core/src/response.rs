//! Provider response model and text extraction.
//!
//! The generation endpoint does not promise a single response shape: SDK-style
//! callers see a `{ "response": { ... } }` wrapper, the REST endpoint returns
//! the body directly, and fields come and go between API versions. The shapes
//! we understand are modelled explicitly; everything else lands in
//! [`RawResponse::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Finish reasons meaning the candidate was withheld by content filtering.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "RECITATION",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Response-level text accessor, populated by some client layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Part>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u32>,
    #[serde(default)]
    pub candidates_token_count: Option<u32>,
    #[serde(default)]
    pub total_token_count: Option<u32>,
}

impl GenerateContentResponse {
    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.as_ref()?.first()
    }

    fn first_parts(&self) -> Option<&[Part]> {
        self.first_candidate()?.content.as_ref()?.parts.as_deref()
    }

    fn accessor_text(&self) -> Option<String> {
        self.text.clone().filter(|t| !t.is_empty())
    }

    /// `candidates[0].content.parts[0].text`. Grounded answers are split
    /// across parts, so when the path resolves every part's text is joined.
    fn nested_path_text(&self) -> Option<String> {
        let parts = self.first_parts()?;
        parts.first()?.text.as_deref().filter(|t| !t.is_empty())?;
        Some(join_parts(parts))
    }

    fn concatenated_parts(&self) -> Option<String> {
        Some(join_parts(self.first_parts()?)).filter(|t| !t.is_empty())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.first_candidate()?.finish_reason.as_deref()
    }

    pub fn is_grounded(&self) -> bool {
        self.first_candidate()
            .and_then(|c| c.grounding_metadata.as_ref())
            .is_some_and(|g| !g.is_null())
    }
}

fn join_parts(parts: &[Part]) -> String {
    parts
        .iter()
        .map(|p| p.text.as_deref().unwrap_or(""))
        .collect()
}

/// A provider response in one of the shapes we know how to read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum RawResponse {
    /// `{ "response": { "candidates": [...], ... } }`
    Wrapped { response: GenerateContentResponse },
    /// `{ "candidates": [...], ... }`
    Direct(GenerateContentResponse),
    /// Anything unparseable, kept verbatim for logging.
    Unknown(Value),
}

impl From<Value> for RawResponse {
    fn from(value: Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::Unknown(value);
        };

        if let Some(inner) = map.get("response").filter(|v| v.is_object()) {
            return match serde_json::from_value(inner.clone()) {
                Ok(response) => Self::Wrapped { response },
                Err(e) => {
                    debug!(error = %e, "Unparseable wrapped provider response");
                    Self::Unknown(value)
                }
            };
        }

        let known = ["candidates", "text", "promptFeedback"];
        if known.iter().any(|k| map.contains_key(*k)) {
            return match serde_json::from_value(value.clone()) {
                Ok(response) => Self::Direct(response),
                Err(e) => {
                    debug!(error = %e, "Unparseable provider response");
                    Self::Unknown(value)
                }
            };
        }

        Self::Unknown(value)
    }
}

impl RawResponse {
    pub fn body(&self) -> Option<&GenerateContentResponse> {
        match self {
            Self::Wrapped { response } => Some(response),
            Self::Direct(response) => Some(response),
            Self::Unknown(_) => None,
        }
    }

    /// Prompt-level feedback, returned only when it carries a `blockReason`.
    /// Feedback holding nothing but safety ratings does not block the prompt.
    pub fn prompt_feedback(&self) -> Option<&Value> {
        self.body()?
            .prompt_feedback
            .as_ref()
            .filter(|f| f.get("blockReason").is_some_and(|r| !r.is_null()))
    }

    /// Finish reason of the first candidate if it signals a content block.
    pub fn blocking_finish_reason(&self) -> Option<&str> {
        self.body()?
            .finish_reason()
            .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
    }

    pub fn usage(&self) -> Option<&UsageMetadata> {
        self.body()?.usage_metadata.as_ref()
    }

    pub fn is_grounded(&self) -> bool {
        self.body().is_some_and(GenerateContentResponse::is_grounded)
    }

    /// The response as JSON, for debug dumps.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Wrapped { response } => {
                serde_json::json!({ "response": response })
            }
            Self::Direct(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            Self::Unknown(v) => v.clone(),
        }
    }
}

/// Which access path produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    TextAccessor,
    WrappedCandidate,
    DirectCandidate,
    ConcatenatedParts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub path: Option<ExtractionPath>,
}

impl Extracted {
    fn found(text: String, path: ExtractionPath) -> Self {
        Self {
            text,
            path: Some(path),
        }
    }

    fn empty() -> Self {
        Self {
            text: String::new(),
            path: None,
        }
    }
}

/// Pull the generated text out of a provider response.
///
/// Paths are tried in order: the response-level accessor, the nested
/// candidate path under the wrapper, the same path on an unwrapped body, and
/// finally a concatenation of every part with missing text read as `""`.
/// Returns empty text when nothing matches; deciding that this is an error is
/// the caller's job.
pub fn extract_text(raw: &RawResponse) -> Extracted {
    let (body, nested_path) = match raw {
        RawResponse::Wrapped { response } => (response, ExtractionPath::WrappedCandidate),
        RawResponse::Direct(response) => (response, ExtractionPath::DirectCandidate),
        RawResponse::Unknown(_) => return Extracted::empty(),
    };

    if let Some(text) = body.accessor_text() {
        return Extracted::found(text, ExtractionPath::TextAccessor);
    }
    if let Some(text) = body.nested_path_text() {
        return Extracted::found(text, nested_path);
    }
    if let Some(text) = body.concatenated_parts() {
        return Extracted::found(text, ExtractionPath::ConcatenatedParts);
    }
    Extracted::empty()
}
