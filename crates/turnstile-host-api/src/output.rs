//! Captured output handling

/// Marker appended when output was cut at the byte cap
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Decode captured bytes, keeping at most `max_bytes` of them.
///
/// Invalid UTF-8 is replaced rather than rejected. The cut never splits a
/// character.
pub fn decode_output(bytes: &[u8], max_bytes: usize) -> String {
    if bytes.len() <= max_bytes {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let text = String::from_utf8_lossy(&bytes[..max_bytes]);
    let mut end = text.len().min(max_bytes);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    let mut out = text[..end].to_string();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Join stdout and stderr the way a terminal would show them
pub fn combine_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => {
            let mut out = stdout.to_string();
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(stderr);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_untouched() {
        assert_eq!(decode_output(b"hello\n", 100), "hello\n");
    }

    #[test]
    fn long_output_truncated() {
        let out = decode_output(&[b'a'; 50], 10);
        assert_eq!(out, format!("{}{}", "a".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // "é" is two bytes; cutting after three bytes would split the second one
        let out = decode_output("éé".as_bytes(), 3);
        assert!(out.starts_with('é'));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn streams_combined() {
        assert_eq!(combine_streams("a", ""), "a");
        assert_eq!(combine_streams("", "b"), "b");
        assert_eq!(combine_streams("a", "b"), "a\nb");
    }
}
