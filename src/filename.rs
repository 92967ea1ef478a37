use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

const MAX_NAME_LEN: usize = 200;
const OUTPUT_SUFFIX: &str = "-edited";

// Invalid characters for Windows: < > : " / \ | ? * and control characters
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("static pattern"));

static RESERVED_NAMES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$").expect("static pattern"));

/// Make `name` safe to use as a file name on any common file system
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_CHARS.replace_all(name, "_");

    // Leading/trailing spaces and dots are problematic on Windows
    let sanitized = sanitized.trim_matches(|c| c == ' ' || c == '.');

    if RESERVED_NAMES.is_match(sanitized) {
        return format!("_{sanitized}");
    }

    let sanitized = truncate_on_char_boundary(sanitized, MAX_NAME_LEN);
    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized.to_string()
    }
}

/// Default output name for an edited copy of `source`: `<stem>-edited.pdf`
pub fn default_output_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}{OUTPUT_SUFFIX}.pdf", sanitize_filename(&stem))
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
