pub mod note_export;
pub mod page_metadata;
pub mod pdf_render;
pub mod pdf_text;
pub mod url_verification;

/// Sent by every outbound HTTP probe so sites answer as they would for a desktop browser.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const MAX_ATTACHMENT_STEM: usize = 100;
const FALLBACK_ATTACHMENT_STEM: &str = "document";

/// Turns a page title into a file-system safe attachment stem (without extension).
pub fn sanitize_attachment_name(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    for ch in title.trim().chars() {
        let mapped = if ch.is_whitespace() || ch.is_control() || r#"\/:*?"<>|"#.contains(ch) {
            '_'
        } else {
            ch
        };
        if mapped == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(mapped);
    }

    let truncated: String = sanitized.chars().take(MAX_ATTACHMENT_STEM).collect();
    let stem = truncated.trim_end_matches('_');
    if stem.is_empty() {
        FALLBACK_ATTACHMENT_STEM.to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_reserved_characters_and_whitespace() {
        assert_eq!(
            sanitize_attachment_name("Rust: What's new?  <2024>"),
            "Rust_What's_new_2024"
        );
    }

    #[test]
    fn collapses_runs_and_trims_trailing_separator() {
        assert_eq!(sanitize_attachment_name("a // b || "), "a_b");
    }

    #[test]
    fn empty_titles_fall_back() {
        assert_eq!(sanitize_attachment_name("   "), "document");
        assert_eq!(sanitize_attachment_name("???"), "document");
    }

    #[test]
    fn long_titles_are_truncated() {
        let title = "x".repeat(250);
        assert_eq!(sanitize_attachment_name(&title).chars().count(), 100);
    }
}
