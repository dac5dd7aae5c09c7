//! Recovering structure from free-form model replies.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn trailing_comma_regex() -> &'static Regex {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    TRAILING.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma pattern"))
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[\w+\-.]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid fence pattern")
    })
}

/// The outermost `{...}` span of `text` parsed as a JSON object.
///
/// Falls back to a lenient pass that swaps single quotes for double quotes
/// and drops trailing commas.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let fragment = &text[start..=end];

    let parse = |s: &str| match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };
    parse(fragment).or_else(|| {
        let lenient = fragment.replace('\'', "\"");
        parse(&trailing_comma_regex().replace_all(&lenient, "$1"))
    })
}

/// Body of a reply wrapped in a single markdown code fence, or the trimmed reply.
pub fn strip_code_fence(text: &str) -> String {
    match fence_regex().captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().to_string(),
        None => text.trim().to_string(),
    }
}

/// String value, or list of strings joined by newlines.
pub fn string_or_list(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        _ => None,
    }
}
