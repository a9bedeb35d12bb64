use crate::dsl::QueryClass;
use once_cell::sync::Lazy;
use regex::Regex;

const SECTION_TERMS: &[&str] = &[
    "timeline",
    "schedule",
    "goal",
    "goals",
    "requirements",
    "deliverables",
    "resources",
    "evaluation",
    "conclusion",
    "benefits",
    "overview",
    "introduction",
    "summary",
    "methodology",
    "approach",
    "implementation",
    "results",
];

const COMPARE_TERMS: &[&str] = &["compare", " vs ", "versus", "pros and cons", "difference"];
const OPERATOR_TERMS: &[&str] = &[">", "<", " between ", "%", " since ", " before ", " after "];

static CAPITALIZED_TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][a-zA-Z]+\b").unwrap());

/// Pure, rule-based complexity classifier. `targeted_docs` of `None` means
/// the caller doesn't know the document scope, so multi-doc handling
/// applies.
pub fn classify(query: &str, targeted_docs: Option<usize>) -> QueryClass {
    let query_lower = query.to_lowercase();
    let query_lower = query_lower.trim();
    let tokens: Vec<&str> = query_lower.split_whitespace().collect();

    let is_long = tokens.len() > 12;
    let has_sections = SECTION_TERMS.iter().any(|term| query_lower.contains(term));
    let has_compare = COMPARE_TERMS.iter().any(|term| query_lower.contains(term));
    let has_operators = OPERATOR_TERMS.iter().any(|op| query_lower.contains(op))
        || query_lower.chars().any(|c| c.is_ascii_digit());
    let is_multi_doc = targeted_docs.map(|n| n > 1).unwrap_or(true);
    let multi_entity = CAPITALIZED_TERM.find_iter(query).count() >= 2;

    if has_compare || multi_entity {
        return QueryClass::Compare;
    }
    if has_sections && is_long {
        return QueryClass::SectionSummary;
    }
    if is_long && !has_operators && (has_sections || multi_entity) {
        return QueryClass::BroadSummary;
    }
    if has_operators {
        return QueryClass::Filtering;
    }
    if is_multi_doc {
        return QueryClass::MultiDoc;
    }
    if tokens.len() <= 8 && !has_sections && !has_compare && !multi_entity {
        return QueryClass::Factoid;
    }
    QueryClass::Default
}

/// Section terms present in `query`, used to bias retrieval scores toward
/// files whose name mentions the same section.
pub fn section_boost_terms(query: &str) -> Vec<&'static str> {
    let query_lower = query.to_lowercase();
    SECTION_TERMS
        .iter()
        .copied()
        .filter(|term| query_lower.contains(term))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_wins_over_everything_else() {
        assert_eq!(classify("compare the Alpha and Beta plans", Some(1)), QueryClass::Compare);
    }

    #[test]
    fn two_capitalized_terms_trigger_compare_via_multi_entity() {
        assert_eq!(classify("What did Acme and Globex agree on", Some(1)), QueryClass::Compare);
    }

    #[test]
    fn long_query_with_section_terms_is_section_summary() {
        let query = "please walk me through the full timeline schedule goals and deliverables for this project in detail today";
        assert_eq!(classify(query, Some(1)), QueryClass::SectionSummary);
    }

    #[test]
    fn operators_trigger_filtering() {
        assert_eq!(classify("show results between 2020 and 2022", Some(1)), QueryClass::Filtering);
    }

    #[test]
    fn unknown_doc_scope_defaults_to_multi_doc() {
        assert_eq!(classify("what happened", None), QueryClass::MultiDoc);
    }

    #[test]
    fn short_plain_query_is_factoid() {
        assert_eq!(classify("what is the deadline", Some(1)), QueryClass::Factoid);
    }

    #[test]
    fn section_boost_terms_finds_every_match() {
        let terms = section_boost_terms("What are the goals and timeline?");
        assert!(terms.contains(&"goal"));
        assert!(terms.contains(&"goals"));
        assert!(terms.contains(&"timeline"));
    }
}
