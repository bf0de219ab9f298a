//! Locating SVG markup inside free-form model output.
//!
//! Completions are untrusted prose that may or may not contain markup. The
//! extractor runs an ordered list of [`ExtractStrategy`] values and returns
//! the first candidate that carries both an opening and a closing `svg` tag;
//! `None` means no usable markup and is never turned into an empty document.

use std::sync::OnceLock;

use regex::Regex;

fn svg_element_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)<svg[^>]*>.*?</svg>").expect("svg element regex is valid"))
}

fn fenced_block_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?s)```(?:svg|xml)?\n?(.*?)\n?```").expect("fenced block regex is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStrategy {
    /// Smallest `<svg ...>...</svg>` span.
    Element,
    /// Body of the first ```svg / ```xml / bare fenced block.
    FencedBlock,
    /// The whole trimmed text.
    WholeText,
}

impl ExtractStrategy {
    pub const ORDER: [ExtractStrategy; 3] = [
        ExtractStrategy::Element,
        ExtractStrategy::FencedBlock,
        ExtractStrategy::WholeText,
    ];

    pub fn apply(self, text: &str) -> Option<String> {
        let candidate = match self {
            ExtractStrategy::Element => svg_element_regex().find(text).map(|m| m.as_str().to_string()),
            ExtractStrategy::FencedBlock => fenced_block_regex()
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|body| body.as_str().trim().to_string())
                .filter(|body| body.contains("<svg")),
            ExtractStrategy::WholeText => Some(text.trim().to_string()),
        }?;
        is_complete_svg(&candidate).then_some(candidate)
    }
}

fn is_complete_svg(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.contains("<svg") && candidate.contains("</svg>")
}

pub fn extract_svg(text: &str) -> Option<String> {
    ExtractStrategy::ORDER
        .into_iter()
        .find_map(|strategy| strategy.apply(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_completion_yields_exact_element() {
        let text = "Here you go:\n```svg\n<svg viewBox=\"0 0 10 10\"></svg>\n```";
        assert_eq!(
            extract_svg(text).as_deref(),
            Some("<svg viewBox=\"0 0 10 10\"></svg>")
        );
    }

    #[test]
    fn element_match_is_non_greedy_across_lines() {
        let text = "<svg a=\"1\">\n<path d=\"M0 0\"/>\n</svg> and <svg b=\"2\"></svg>";
        assert_eq!(
            ExtractStrategy::Element.apply(text).as_deref(),
            Some("<svg a=\"1\">\n<path d=\"M0 0\"/>\n</svg>")
        );
    }

    #[test]
    fn fenced_block_requires_svg_content() {
        let with_svg = "```xml\n<?xml version=\"1.0\"?>\n<svg></svg>\n```";
        assert_eq!(
            ExtractStrategy::FencedBlock.apply(with_svg).as_deref(),
            Some("<?xml version=\"1.0\"?>\n<svg></svg>")
        );

        let without_svg = "```\nprint('hello')\n```";
        assert_eq!(ExtractStrategy::FencedBlock.apply(without_svg), None);
    }

    #[test]
    fn fenced_block_without_closing_tag_is_rejected() {
        let truncated = "```svg\n<svg width=\"10\">\n<path/>\n```";
        assert_eq!(ExtractStrategy::FencedBlock.apply(truncated), None);
        assert_eq!(extract_svg(truncated), None);
    }

    #[test]
    fn whole_text_needs_both_tags() {
        assert_eq!(
            ExtractStrategy::WholeText.apply("  <svg></svg>\n").as_deref(),
            Some("<svg></svg>")
        );
        assert_eq!(ExtractStrategy::WholeText.apply("<svg width=\"1\">"), None);
    }

    #[test]
    fn prose_without_markup_is_none() {
        assert_eq!(extract_svg("I cannot draw that, sorry."), None);
        assert_eq!(extract_svg(""), None);
    }

    #[test]
    fn extraction_is_idempotent() {
        let inputs = [
            "prefix <svg xmlns=\"http://www.w3.org/2000/svg\"><g id=\"sun\"></g></svg> suffix",
            "```svg\n<svg viewBox=\"0 0 1024 1024\">\n  <path d=\"M1 1\"/>\n</svg>\n```",
            "<svg></svg>",
        ];
        for input in inputs {
            let once = extract_svg(input).unwrap();
            let twice = extract_svg(&once).unwrap();
            assert_eq!(once, twice);
        }
    }
}
