//! Mapping from provider failures to client-facing outcomes.
//!
//! The provider gives no stable error codes, so classification looks for
//! known substrings in the error message. Keep all of that matching here.

/// Outcome category for a failed generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad or missing credential. Needs an operator; never retried.
    Authentication,
    /// Quota or rate limit hit. The caller may retry later.
    Throttling,
    /// Content filtering. The caller should rephrase, not resubmit verbatim.
    ContentPolicy,
    Unknown,
}

impl FailureKind {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication => 401,
            Self::Throttling => 429,
            Self::ContentPolicy => 400,
            Self::Unknown => 500,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Authentication => "APIキーが無効です。管理者に連絡してください。",
            Self::Throttling => {
                "リクエスト制限に達しました。しばらく待ってから再試行してください。"
            }
            Self::ContentPolicy => {
                "コンテンツが安全性フィルターによってブロックされました。別の焦点や表現で再試行してください。"
            }
            Self::Unknown => "感想文の生成中にエラーが発生しました。",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Throttling => "throttling",
            Self::ContentPolicy => "content_policy",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a provider error message. First match wins, in the order
/// authentication, throttling, content policy.
pub fn classify(message: &str) -> FailureKind {
    const RULES: &[(&[&str], FailureKind)] = &[
        (&["API key", "API_KEY"], FailureKind::Authentication),
        (&["quota", "rate limit"], FailureKind::Throttling),
        (&["SAFETY", "blocked"], FailureKind::ContentPolicy),
    ];

    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| message.contains(n)))
        .map(|(_, kind)| *kind)
        .unwrap_or(FailureKind::Unknown)
}

/// Message shown to prompt-feedback rejections, which bypass [`classify`].
pub const PROMPT_BLOCKED_MESSAGE: &str = "リクエストが安全性フィルターによってブロックされました。";
