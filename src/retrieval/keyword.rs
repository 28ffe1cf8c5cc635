//! Full-text helpers: Lucene escaping and a term-overlap score for the
//! in-process source.

use regex::{Captures, Regex};
use rustc_hash::FxHashSet;
use std::sync::OnceLock;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "why", "with", "you",
];

fn lucene_special() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(&&|\|\||[+\-!(){}\[\]^"~*?:\\/])"#).expect("valid lucene pattern")
    })
}

// Boolean operators are only recognised in upper case
fn lucene_operator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(AND|OR|NOT)\b").expect("valid operator pattern"))
}

/// Escape Lucene query syntax so the question is matched literally
pub fn escape_lucene(text: &str) -> String {
    let escaped = lucene_special().replace_all(text, r"\$1");
    lucene_operator()
        .replace_all(&escaped, |caps: &Captures| caps[1].to_lowercase())
        .into_owned()
}

/// Lowercased alphanumeric words of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Distinct non-stopword terms of a query
pub fn query_terms(text: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Fraction of `terms` that occur in `text`, in [0, 1]
pub fn keyword_score(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let words: FxHashSet<String> = tokenize(text).into_iter().collect();
    let hits = terms.iter().filter(|t| words.contains(*t)).count();
    hits as f32 / terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_lucene() {
        assert_eq!(escape_lucene("plain words"), "plain words");
        assert_eq!(escape_lucene("a && b || c"), "a \\&& b \\|| c");
        assert_eq!(escape_lucene("(x)[y]{z}"), "\\(x\\)\\[y\\]\\{z\\}");
        assert_eq!(escape_lucene("path/to:file~"), "path\\/to\\:file\\~");
        assert_eq!(escape_lucene("\"quoted\" -not"), "\\\"quoted\\\" \\-not");
    }

    #[test]
    fn test_escape_lucene_neutralises_operators() {
        assert_eq!(escape_lucene("Flask OR"), "Flask or");
        assert_eq!(escape_lucene("NOT AND OR"), "not and or");
        assert_eq!(escape_lucene("ORM and ANDROID"), "ORM and ANDROID");
    }

    #[test]
    fn test_query_terms_drop_stopwords_and_duplicates() {
        assert_eq!(query_terms("What is Flask? Is Flask fast?"), vec!["flask", "fast"]);
        assert!(query_terms("what is it").is_empty());
    }

    #[test]
    fn test_keyword_score() {
        let terms = query_terms("flask routing");
        assert_eq!(keyword_score(&terms, "Flask routing explained"), 1.0);
        assert_eq!(keyword_score(&terms, "Routing in Django"), 0.5);
        assert_eq!(keyword_score(&terms, "Docker networking"), 0.0);
        assert_eq!(keyword_score(&[], "anything"), 0.0);
    }
}
