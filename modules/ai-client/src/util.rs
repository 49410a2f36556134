/// Cut `s` down to at most `max_bytes` bytes without splitting a
/// multi-byte character. Prompt budgets are byte-denominated; PIR text and
/// document bodies are not.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Unwrap a payload the model fenced as a markdown code block. Plain
/// payloads pass through untouched.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
