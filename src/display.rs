//! Formatting helpers for display-ready fields and log output.

/// Formats hours as `H:MM`, truncating to the minute.
pub fn format_hours(hours: f64) -> String {
    let total_minutes = (hours.max(0.0) * 60.0 + 1e-6).floor() as u64;
    format!("{}:{:02}", total_minutes / 60, total_minutes % 60)
}

/// Issue label with the id right-aligned to the width of the newest issue id.
pub fn issue_label(id: u64, width: usize, subject: &str) -> String {
    let subject = truncate_text(&collapse_whitespace(subject), 60);
    format!("#{:>width$} {}", id, subject, width = width)
}

pub fn collapse_whitespace(value: &str) -> String {
    let mut collapsed = String::with_capacity(value.len());
    for word in value.split_whitespace() {
        if !collapsed.is_empty() {
            collapsed.push(' ');
        }
        collapsed.push_str(word);
    }
    collapsed
}

/// Cuts `value` to at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate_text(value: &str, limit: usize) -> String {
    let value = value.trim();
    match value.char_indices().nth(limit) {
        None => value.to_string(),
        Some(_) if limit == 0 => String::new(),
        Some(_) => {
            let keep = value.chars().take(limit - 1);
            keep.chain(std::iter::once('…')).collect()
        }
    }
}

/// Fragments that mean an error message may echo credentials.
const SENSITIVE_HINTS: [&str; 6] = [
    "x-redmine-api-key",
    "api_key",
    "key=",
    "token",
    "authorization",
    "password",
];

/// Condenses error details for the log. Anything that may carry the API key is reduced
/// to its leading category.
pub fn redact_log_details(value: &str) -> String {
    let collapsed = collapse_whitespace(value);
    let lowered = collapsed.to_lowercase();
    if !SENSITIVE_HINTS.iter().any(|hint| lowered.contains(hint)) {
        return truncate_text(&collapsed, 180);
    }

    let category = match collapsed.split_once(':') {
        Some((head, _)) if !head.trim().is_empty() => head.trim(),
        _ => "error",
    };
    format!("{}: <redacted>", truncate_text(category, 64))
}
