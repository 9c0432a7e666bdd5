//! Plain-text heuristics used by the workflow strategies
//!
//! Everything here is a pure function over `&str` so each extraction rule can
//! be tested without ranking or orchestration.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Numbers followed by a unit, or currency amounts
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (?:[$€£]\s?\d+(?:,\d{3})*(?:\.\d+)?(?:\s?(?:million|billion|thousand|bn|k|m)\b)?)
        |
        (?:\b\d+(?:,\d{3})*(?:\.\d+)?\s?
            (?:%
            |(?:percent|usd|eur|dollars?|kg|g|lbs?|oz|tons?|mm|cm|m|km|ft|
               ms|s|sec|seconds?|min|minutes?|h|hrs?|hours?|days?|weeks?|months?|years?|
               w|kw|mw|v|kv|ma|mah|wh|kwh|hz|khz|mhz|ghz|kb|mb|gb|tb|fps|rpm|psi|fit)\b))",
    )
    .expect("valid quantity pattern")
});

/// Build a case-insensitive alternation over literal terms
///
/// Word boundaries are only applied on the sides of a term that start or end
/// with a word character, so terms like `e.g.` still match.
pub fn keyword_regex(terms: &[&str]) -> Regex {
    let alternatives: Vec<String> = terms
        .iter()
        .filter(|t| !t.is_empty())
        .map(|term| {
            let starts_word = term.chars().next().is_some_and(is_word_char);
            let ends_word = term.chars().last().is_some_and(is_word_char);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(term),
                if ends_word { r"\b" } else { "" }
            )
        })
        .collect();

    let pattern = if alternatives.is_empty() {
        // Matches nothing
        r"[^\s\S]".to_string()
    } else {
        format!("(?i)(?:{})", alternatives.join("|"))
    };

    Regex::new(&pattern).expect("escaped keyword alternation is always valid")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word, case-insensitive pattern for one caller-supplied term
///
/// A blank term yields a pattern that matches nothing.
pub fn term_regex(term: &str) -> Regex {
    keyword_regex(&[term.trim()])
}

/// One `term_regex` per term, in input order
pub fn term_regexes(terms: &[String]) -> Vec<Regex> {
    terms.iter().map(|term| term_regex(term)).collect()
}

/// Number of distinct (case-folded) terms of `pattern` found in `text`
pub fn distinct_matches(text: &str, pattern: &Regex) -> usize {
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect::<HashSet<_>>()
        .len()
}

/// Split text into trimmed sentences on terminal punctuation and line breaks
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let boundary = match c {
            '\n' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };

        if boundary {
            let end = idx + c.len_utf8();
            push_sentence(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_sentence(&mut sentences, &text[start..]);

    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
}

/// Sentences matching `pattern`, in text order, deduplicated, at most `cap`
pub fn matching_sentences(text: &str, pattern: &Regex, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    split_sentences(text)
        .into_iter()
        .filter(|s| pattern.is_match(s))
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(cap)
        .map(str::to_string)
        .collect()
}

/// Whether text carries a quantitative value (number with unit, or currency)
pub fn has_quantity(text: &str) -> bool {
    QUANTITY_RE.is_match(text)
}

/// Every quantitative value in text, in order
pub fn quantities(text: &str) -> Vec<String> {
    QUANTITY_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_regex_word_boundaries() {
        let re = keyword_regex(&["fix", "root cause"]);
        assert!(re.is_match("A fix was applied"));
        assert!(re.is_match("The ROOT CAUSE was moisture"));
        assert!(!re.is_match("Use the prefix table"));
    }

    #[test]
    fn test_keyword_regex_punctuated_terms() {
        let re = keyword_regex(&["e.g."]);
        assert!(re.is_match("several vendors, e.g. Acme"));
        assert!(!re.is_match("eagle"));
    }

    #[test]
    fn test_empty_keyword_regex_matches_nothing() {
        let re = keyword_regex(&[]);
        assert!(!re.is_match("anything at all"));
        assert!(!re.is_match(""));
    }

    #[test]
    fn test_split_sentences() {
        let text = "Pins corroded. Version 2.5 was used!\nNext line? Trailing";
        assert_eq!(
            split_sentences(text),
            vec![
                "Pins corroded.",
                "Version 2.5 was used!",
                "Next line?",
                "Trailing"
            ]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_matching_sentences_caps_and_dedups() {
        let re = keyword_regex(&["cause"]);
        let text = "One cause. One cause. Two cause. Three cause. Four cause.";
        let found = matching_sentences(text, &re, 3);
        assert_eq!(found, vec!["One cause.", "Two cause.", "Three cause."]);
    }

    #[test]
    fn test_quantities() {
        assert!(has_quantity("Unit cost is $1,200 per board"));
        assert!(has_quantity("Mass of 2.4 kg"));
        assert!(has_quantity("MTBF above 50000 hours"));
        assert!(!has_quantity("Version 3 of the design"));
        assert_eq!(
            quantities("Weighs 3 kg and costs $40k"),
            vec!["3 kg", "$40k"]
        );
    }

    #[test]
    fn test_distinct_matches() {
        let re = keyword_regex(&["cost", "weight"]);
        assert_eq!(distinct_matches("Cost, cost and weight", &re), 2);
        assert_eq!(distinct_matches("nothing here", &re), 0);
    }

    #[test]
    fn test_term_regex() {
        assert!(term_regex("vendor a").is_match("Vendor A offers"));
        assert!(!term_regex("Vendor A").is_match("Vendor AB offers"));
        assert!(!term_regex("  ").is_match("anything"));

        let patterns = term_regexes(&["cost".to_string(), String::new()]);
        assert_eq!(patterns.len(), 2);
        assert!(patterns[0].is_match("unit COST"));
        assert!(!patterns[1].is_match("unit cost"));
    }
}
