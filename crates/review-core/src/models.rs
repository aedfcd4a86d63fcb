use serde::{Deserialize, Deserializer, Serialize};

/// Body of `POST /api/generate-review`.
///
/// Absent or `null` fields deserialize as empty strings so the validator
/// reports them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub focus: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ReviewRequest {
    /// Author with surrounding whitespace removed; blank counts as absent.
    pub fn author(&self) -> Option<&str> {
        self.author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// A generated review together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResult {
    pub text: String,
    pub character_count: usize,
    pub model: String,
    pub search_used: bool,
}

impl ReviewResult {
    pub fn new(text: &str, model: &str, search_used: bool) -> Self {
        let text = text.trim().to_string();
        Self {
            character_count: count_characters(&text),
            text,
            model: model.to_string(),
            search_used,
        }
    }
}

/// Wire shape of a successful response.
#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub text: String,
    pub metadata: ReviewMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewMetadata {
    pub character_count: usize,
    pub model: String,
    pub search_used: bool,
}

impl From<ReviewResult> for ReviewResponse {
    fn from(r: ReviewResult) -> Self {
        Self {
            text: r.text,
            metadata: ReviewMetadata {
                character_count: r.character_count,
                model: r.model,
                search_used: r.search_used,
            },
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Default, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }
}

/// Number of non-whitespace characters, the unit the essay length targets use.
pub fn count_characters(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
