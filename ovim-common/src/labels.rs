//! Kubernetes label-value sanitization for names that originate outside the
//! cluster (organization/VDC names arriving on pushed operations).

const MAX_LABEL_LEN: usize = 63;

/// Replaces characters outside `[A-Za-z0-9_.-]` with `-`, trims leading and
/// trailing `-_.`, truncates to 63 characters and re-trims. An empty result
/// becomes the literal `"unknown"`.
pub fn sanitize_label_value(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = trim_edges(&replaced);
    let truncated: String = trimmed.chars().take(MAX_LABEL_LEN).collect();
    let retrimmed = trim_edges(&truncated);
    if retrimmed.is_empty() {
        "unknown".to_string()
    } else {
        retrimmed.to_string()
    }
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_illegal_characters() {
        assert_eq!(sanitize_label_value("acme corp!"), "acme-corp");
    }

    #[test]
    fn trims_leading_and_trailing_punctuation() {
        assert_eq!(sanitize_label_value("--acme--"), "acme");
    }

    #[test]
    fn truncates_to_sixty_three_characters() {
        let long = "a".repeat(100);
        let result = sanitize_label_value(&long);
        assert_eq!(result.len(), 63);
    }

    #[test]
    fn empty_result_becomes_unknown() {
        assert_eq!(sanitize_label_value("!!!"), "unknown");
        assert_eq!(sanitize_label_value(""), "unknown");
    }
}
