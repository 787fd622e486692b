//! Keyword classification of the service's free-form answer
//!
//! Pure functions, no I/O.

use crate::config_store::KeywordSettings;
use crate::status_aggregator::PrintStatus;

/// Confidence used when the answer does not report one
pub const DEFAULT_CONFIDENCE: f32 = 0.75;

/// Outcome of keyword matching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub binary_status: u8,
    /// `None` leaves the current print status unchanged
    pub print_status: Option<PrintStatus>,
    pub print_progress: u8,
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && haystack.contains(&k))
}

/// Classify answer text; groups are checked failure, warning, completed,
/// good, no-printer and the first match wins
pub fn classify(text: &str, keywords: &KeywordSettings) -> Classification {
    let lower = text.to_lowercase();

    let (binary_status, print_status, print_progress) = if contains_any(&lower, &keywords.failure) {
        (0, Some(PrintStatus::Failed), 0)
    } else if contains_any(&lower, &keywords.warning) {
        (1, Some(PrintStatus::Warning), 50)
    } else if contains_any(&lower, &keywords.completed) {
        (1, Some(PrintStatus::Completed), 100)
    } else if contains_any(&lower, &keywords.good) {
        (1, Some(PrintStatus::Printing), 100)
    } else if contains_any(&lower, &keywords.no_printer) {
        (1, Some(PrintStatus::Idle), 0)
    } else {
        (1, None, 50)
    };

    Classification {
        binary_status,
        print_status,
        print_progress,
    }
}

/// Confidence reported in the text as `confidence: 0.9` or `confidence: 90%`
pub fn extract_confidence(text: &str) -> Option<f32> {
    let lower = text.to_lowercase();
    let start = lower.find("confidence")? + "confidence".len();
    let rest = lower[start..].trim_start_matches(|c: char| c == ':' || c == '=' || c.is_whitespace());

    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let number = number.trim_end_matches('.');
    let value: f32 = number.parse().ok()?;
    let percent = rest[number.len()..].trim_start().starts_with('%');

    let value = if percent || value > 1.0 { value / 100.0 } else { value };
    (0.0..=1.0).contains(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> KeywordSettings {
        KeywordSettings::default()
    }

    #[test]
    fn test_failure_keyword_is_bad() {
        let c = classify("The part has DETACHED from the bed", &keywords());
        assert_eq!(c.binary_status, 0);
        assert_eq!(c.print_status, Some(PrintStatus::Failed));
        assert_eq!(c.print_progress, 0);
    }

    #[test]
    fn test_benign_text_is_good() {
        let c = classify("Layers are stacking up evenly on the bed", &keywords());
        assert_eq!(c.binary_status, 1);
        assert_eq!(c.print_status, None);
        assert_eq!(c.print_progress, 50);
    }

    #[test]
    fn test_group_order() {
        // failure wins over good
        let c = classify("✅ looked good earlier but now spaghetti", &keywords());
        assert_eq!(c.print_status, Some(PrintStatus::Failed));

        let c = classify("Minor concern about stringing", &keywords());
        assert_eq!(c.print_status, Some(PrintStatus::Warning));
        assert_eq!(c.binary_status, 1);

        let c = classify("Print complete, part sitting on the bed", &keywords());
        assert_eq!(c.print_status, Some(PrintStatus::Completed));

        let c = classify("✅ PRINT LOOKS GOOD: first layers", &keywords());
        assert_eq!(c.print_status, Some(PrintStatus::Printing));
        assert_eq!(c.print_progress, 100);

        let c = classify("🤷 NO PRINTER VISIBLE: a desk", &keywords());
        assert_eq!(c.print_status, Some(PrintStatus::Idle));
        assert_eq!(c.binary_status, 1);
    }

    #[test]
    fn test_default_prompt_answers_reach_each_status() {
        let statuses: Vec<Option<PrintStatus>> = crate::config_store::DEFAULT_PROMPT
            .lines()
            .filter_map(|line| line.strip_prefix('\''))
            .filter_map(|line| line.split_once(':').map(|(lead, _)| lead))
            .map(|lead| classify(lead, &keywords()).print_status)
            .collect();

        assert_eq!(
            statuses,
            vec![
                Some(PrintStatus::Printing),
                Some(PrintStatus::Warning),
                Some(PrintStatus::Failed),
                Some(PrintStatus::Idle),
            ]
        );
    }

    #[test]
    fn test_custom_keywords() {
        let mut kw = keywords();
        kw.failure = vec!["blob".to_string(), "  ".to_string()];
        assert_eq!(classify("a blob of filament", &kw).binary_status, 0);
        assert_eq!(classify("spaghetti", &kw).binary_status, 1);
    }

    #[test]
    fn test_extract_confidence() {
        assert_eq!(extract_confidence("Confidence: 0.9"), Some(0.9));
        assert_eq!(extract_confidence("confidence = 85%"), Some(0.85));
        assert_eq!(extract_confidence("confidence: 70"), Some(0.7));
        assert_eq!(extract_confidence("no number here"), None);
        assert_eq!(extract_confidence("confidence: high"), None);
    }
}
