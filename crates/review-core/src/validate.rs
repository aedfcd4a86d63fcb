use crate::config::{FOCUS_MAX, TITLE_MAX};

/// Field names the client must supply, echoed back on validation failure.
pub const REQUIRED_FIELDS: [&str; 2] = ["title", "focus"];

/// Check a review request. Returns every violated rule in order, or `None`
/// when the input is acceptable.
///
/// All rules run; a missing title does not hide an over-long focus.
pub fn validate_review_input(title: &str, _author: Option<&str>, focus: &str) -> Option<Vec<String>> {
    let title = title.trim();
    let focus = focus.trim();
    let mut errors = Vec::new();

    if title.is_empty() || focus.is_empty() {
        errors.push("タイトルと焦点は必須です。".to_string());
    }

    if title.chars().count() > TITLE_MAX {
        errors.push(format!("タイトルは{}文字以内である必要があります。", TITLE_MAX));
    }

    if focus.chars().count() > FOCUS_MAX {
        errors.push(format!("焦点は{}文字以内である必要があります。", FOCUS_MAX));
    }

    if errors.is_empty() {
        None
    } else {
        Some(errors)
    }
}
