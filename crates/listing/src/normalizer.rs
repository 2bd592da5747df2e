use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::types::ListingOutput;

pub const TITLE_TARGET_CHARS: usize = 60;

static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("static regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n(\s*\n)+").expect("static regex"));

/// Cleans model output before it goes back to the caller
pub struct ListingNormalizer {
    title_limit: usize,
    enforce_title_limit: bool,
}

impl ListingNormalizer {
    pub fn new(enforce_title_limit: bool) -> Self {
        Self {
            title_limit: TITLE_TARGET_CHARS,
            enforce_title_limit,
        }
    }

    /// Collapse runs of spaces, keep paragraph breaks (at most one blank line)
    pub fn clean_text(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n");
        let text = INLINE_SPACE.replace_all(&text, " ");
        let text = BLANK_LINES.replace_all(&text, "\n\n");
        text.lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Trim, drop empties and case-insensitive duplicates, keep first-seen order
    pub fn dedupe(&self, values: &[String]) -> Vec<String> {
        let mut seen = Vec::new();
        let mut out = Vec::new();

        for value in values {
            let cleaned = self.clean_text(value);
            if cleaned.is_empty() {
                continue;
            }
            let key = cleaned.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                out.push(cleaned);
            }
        }

        out
    }

    /// Returns the title's length when it breaks an enforced limit
    pub fn check_title(&self, title: &str) -> Result<(), usize> {
        let chars = title.chars().count();
        if chars <= self.title_limit {
            return Ok(());
        }
        if self.enforce_title_limit {
            return Err(chars);
        }
        warn!(chars, limit = self.title_limit, "Generated title exceeds target length");
        Ok(())
    }

    pub fn title_limit(&self) -> usize {
        self.title_limit
    }

    pub fn normalize(&self, listing: &mut ListingOutput) {
        listing.title = self.clean_text(&listing.title).replace('\n', " ");
        listing.description = self.clean_text(&listing.description);
        listing.category = self.clean_text(&listing.category);
        listing.sizes = self.dedupe(&listing.sizes);
        listing.colors = self.dedupe(&listing.colors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> ListingOutput {
        ListingOutput {
            title: "  Floral   Cotton\tKurta ".to_string(),
            description: "Soft cotton.  \n\n\n\nHand wash   only.".to_string(),
            category: "Clothing > Kurtas".to_string(),
            price: 0,
            sizes: vec!["S".into(), "M".into(), " m ".into(), "".into(), "XL".into()],
            colors: vec!["Red".into(), "red".into(), "Navy Blue".into()],
        }
    }

    #[test]
    fn test_normalize_listing() {
        let normalizer = ListingNormalizer::new(false);
        let mut listing = listing();
        normalizer.normalize(&mut listing);

        assert_eq!(listing.title, "Floral Cotton Kurta");
        assert_eq!(listing.description, "Soft cotton.\n\nHand wash only.");
        assert_eq!(listing.sizes, vec!["S", "M", "XL"]);
        assert_eq!(listing.colors, vec!["Red", "Navy Blue"]);
    }

    #[test]
    fn test_title_limit_advisory_by_default() {
        let long_title = "x".repeat(TITLE_TARGET_CHARS + 5);
        assert!(ListingNormalizer::new(false).check_title(&long_title).is_ok());
        assert_eq!(
            ListingNormalizer::new(true).check_title(&long_title),
            Err(TITLE_TARGET_CHARS + 5)
        );
        assert!(ListingNormalizer::new(true).check_title("Short title").is_ok());
    }

    #[test]
    fn test_title_limit_counts_chars_not_bytes() {
        let title = "é".repeat(TITLE_TARGET_CHARS);
        assert!(ListingNormalizer::new(true).check_title(&title).is_ok());
    }
}
