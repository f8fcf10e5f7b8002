/// Maximum number of characters in a generated excerpt.
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

/// Truncate text to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Build a display excerpt starting at a character offset.
///
/// Takes up to `max` characters from `pos`, trims surrounding whitespace
/// and appends an ellipsis when the text continues past the cut.
pub fn excerpt_at(text: &str, pos: usize, max: usize) -> String {
    let tail: String = text.chars().skip(pos).collect();
    let cut = truncate_chars(&tail, max);
    let trimmed = cut.trim();
    if cut.len() < tail.len() {
        format!("{trimmed}…")
    } else {
        trimmed.to_string()
    }
}

/// Extract a title from document content.
///
/// Looks for the first markdown heading (line starting with `# `), falling
/// back to the file name without extension.
pub fn extract_title(content: &str, file_name: &str) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            let title = heading.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    let stem = file_name
        .rsplit('/')
        .next()
        .unwrap_or(file_name)
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn excerpt_from_offset() {
        let text = "first part and then the interesting middle part continues";
        let excerpt = excerpt_at(text, 15, 20);
        assert!(excerpt.starts_with("then the"));
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn excerpt_at_end_has_no_ellipsis() {
        let text = "just a short text";
        assert_eq!(excerpt_at(text, 7, 100), "short text");
    }

    #[test]
    fn excerpt_past_end_is_empty() {
        assert_eq!(excerpt_at("tiny", 100, 50), "");
    }

    #[test]
    fn extract_title_from_heading() {
        let content = "# My Document\n\nSome body text.";
        assert_eq!(extract_title(content, "file.md"), "My Document");
    }

    #[test]
    fn extract_title_skips_empty_heading() {
        let content = "# \n\nSome text with no real heading.";
        assert_eq!(extract_title(content, "notes.md"), "notes");
    }

    #[test]
    fn extract_title_fallback_to_filename() {
        let content = "No heading here, just plain text.";
        assert_eq!(extract_title(content, "dir/my-notes.md"), "my-notes");
    }
}
