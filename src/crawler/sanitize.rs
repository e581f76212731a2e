/// Turns a record label into a filename-safe token
///
/// Keeps ASCII letters, digits and whitespace, then collapses each whitespace
/// run into a single space.
///
/// ```
/// use resume_crawl::sanitize_label;
///
/// assert_eq!(sanitize_label("Acme, Inc. (Pty) Ltd."), "Acme Inc Pty Ltd");
/// ```
pub fn sanitize_label(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_punctuation() {
        assert_eq!(sanitize_label("Acme, Inc. (Pty) Ltd."), "Acme Inc Pty Ltd");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize_label("  Globex \t  Corp\n"), "Globex Corp");
        assert_eq!(sanitize_label("A & B"), "A B");
    }

    #[test]
    fn test_drops_non_ascii_letters() {
        assert_eq!(sanitize_label("Société Générale"), "Socit Gnrale");
    }

    #[test]
    fn test_only_alphanumerics_and_single_spaces() {
        let out = sanitize_label("**Weird//Name**  & Co.");
        assert!(out.chars().all(|c| c.is_ascii_alphanumeric() || c == ' '));
        assert!(!out.contains("  "));
        assert_eq!(out, "WeirdName Co");
    }

    #[test]
    fn test_empty_when_nothing_survives() {
        assert_eq!(sanitize_label("()-,."), "");
    }
}
