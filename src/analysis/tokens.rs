//! Column name tokens and token similarity.

use inflector::Inflector;

/// Tokens with no meaning for relationship matching.
const STOPWORDS: &[&str] = &["attr", "data", "value", "info", "list", "the", "of", "text"];

/// Lower-cased, singular, stopword-free tokens of a column name.
///
/// `reward_item_ids` -> `[reward, item, id]`, `_attr_questId` -> `[quest, id]`.
pub fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for part in name.split(|c: char| c == '_' || c == '@' || c == '-' || c == '.' || c == '/') {
        if part.is_empty() {
            continue;
        }
        for word in part.to_snake_case().split('_') {
            let word = word.to_lowercase();
            if word.is_empty() || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            let singular = singular(&word);
            if !tokens.contains(&singular) {
                tokens.push(singular);
            }
        }
    }
    tokens
}

fn singular(word: &str) -> String {
    // Inflector maps these to words that no longer match their column peers.
    if word.len() < 3 || word.ends_with("ss") || word.chars().all(|c| c.is_ascii_digit()) {
        return word.to_string();
    }
    word.to_singular()
}

/// Jaccard similarity of two token sets; 0.0 when both are empty.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.iter().filter(|t| b.contains(t)).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}
