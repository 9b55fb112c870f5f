/// Returns at most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_returned_whole() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn long_input_is_cut_to_limit() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("abcdef", 0), "");
    }

    #[test]
    fn multibyte_input_never_splits_a_char() {
        let text = "héllo wörld";
        assert_eq!(truncate_chars(text, 2), "hé");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }
}
