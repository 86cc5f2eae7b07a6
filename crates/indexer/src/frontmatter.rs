//! Header-block parsing for knowledge-base documents.
//!
//! A document may open with a `---`-fenced block of `key: value` lines.
//! Any malformation (no closing fence, a header line without a colon)
//! makes the *whole file* body text with an empty mapping; a bad header
//! never fails a load.

use kb_chunker::{Frontmatter, FrontmatterValue};

/// Split content into `(frontmatter, body)`.
pub(crate) fn parse(content: &str) -> (Frontmatter, String) {
    let lines: Vec<&str> = content.lines().collect();
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return (Frontmatter::new(), content.to_string());
    }

    let Some(close) = lines[1..].iter().position(|l| l.trim_end() == "---") else {
        log::debug!("Unterminated header fence; treating whole file as body");
        return (Frontmatter::new(), content.to_string());
    };
    let close_line = close + 1;

    let mut frontmatter = Frontmatter::new();
    for line in &lines[1..close_line] {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            log::debug!("Malformed header line {line:?}; treating whole file as body");
            return (Frontmatter::new(), content.to_string());
        };
        let key = key.trim();
        if key.is_empty() {
            log::debug!("Empty header key in line {line:?}; treating whole file as body");
            return (Frontmatter::new(), content.to_string());
        }

        frontmatter.insert(key.to_string(), parse_value(value.trim()));
    }

    let body = lines[close_line + 1..].join("\n");
    (frontmatter, body)
}

/// A value containing commas is a list; everything else is a scalar.
/// Lists flatten back to comma-joined strings, so the two representations
/// round-trip.
fn parse_value(value: &str) -> FrontmatterValue {
    if value.contains(',') {
        FrontmatterValue::List(
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        )
    } else {
        FrontmatterValue::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_scalar_and_list_values() {
        let content = "---\ntitle: Install guide\ncategory: setup\ntags: vpn, network, remote\n---\nBody text here.";
        let (frontmatter, body) = parse(content);

        assert_eq!(
            frontmatter.get("title"),
            Some(&FrontmatterValue::Text("Install guide".to_string()))
        );
        assert_eq!(
            frontmatter.get("category"),
            Some(&FrontmatterValue::Text("setup".to_string()))
        );
        assert_eq!(
            frontmatter.get("tags"),
            Some(&FrontmatterValue::List(vec![
                "vpn".to_string(),
                "network".to_string(),
                "remote".to_string()
            ]))
        );
        assert_eq!(body, "Body text here.");
    }

    #[test]
    fn no_header_means_empty_mapping_and_full_body() {
        let content = "Just plain body text.\nSecond line.";
        let (frontmatter, body) = parse(content);
        assert!(frontmatter.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn unterminated_fence_is_malformed() {
        let content = "---\ntitle: X\nnever closed";
        let (frontmatter, body) = parse(content);
        assert!(frontmatter.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn header_line_without_colon_is_malformed() {
        let content = "---\ntitle: X\nthis line has no colon\n---\nBody.";
        let (frontmatter, body) = parse(content);
        assert!(frontmatter.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn blank_header_lines_are_ignored() {
        let content = "---\ntitle: X\n\n---\nBody.";
        let (frontmatter, body) = parse(content);
        assert_eq!(frontmatter.len(), 1);
        assert_eq!(body, "Body.");
    }

    #[test]
    fn empty_header_block_is_fine() {
        let content = "---\n---\nBody only.";
        let (frontmatter, body) = parse(content);
        assert!(frontmatter.is_empty());
        assert_eq!(body, "Body only.");
    }

    #[test]
    fn dash_fence_inside_body_is_not_a_header() {
        let content = "Intro line\n---\nnot: a header\n---\nrest";
        let (frontmatter, body) = parse(content);
        assert!(frontmatter.is_empty());
        assert_eq!(body, content);
    }
}
