use regex::Regex;
use std::sync::OnceLock;

fn strip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid slug pattern"))
}

fn dash_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-\s]+").expect("valid slug pattern"))
}

/// Turn a permission-set name into a label.
///
/// Lower-cases, drops anything that is not a word character, whitespace or
/// hyphen, and collapses runs of whitespace and hyphens into a single `-`.
/// Underscores survive, so `"FlatPage_permission"` becomes `"flatpage_permission"`.
pub fn slugify(value: &str) -> String {
    let lowered = value.to_lowercase();
    let stripped = strip_pattern().replace_all(lowered.trim(), "");
    let dashed = dash_pattern().replace_all(stripped.trim(), "-");
    dashed.trim_matches('-').to_string()
}
