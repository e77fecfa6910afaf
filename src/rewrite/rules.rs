//! Rewrite rules and rule chains.
//!
//! Every rule targets fields by a glob over the field path: the element
//! path below the element the chain is applied to, with `@name` for
//! attributes (`reward/item`, `stats/@type`).

use std::collections::BTreeMap;
use std::sync::Arc;

use inflector::Inflector;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AiAssistant, RewriteError, RewriteResult};
use crate::xml::XmlElement;

/// Placeholder replaced by the field text in assistant templates.
const TEXT_PLACEHOLDER: &str = "{text}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    Upper,
    Lower,
    Title,
    Sentence,
}

impl TextStyle {
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Upper => text.to_uppercase(),
            Self::Lower => text.to_lowercase(),
            Self::Title => text.to_title_case(),
            Self::Sentence => text.to_sentence_case(),
        }
    }
}

/// Glob predicate over field paths.
#[derive(Debug, Clone)]
pub struct FieldMatcher(glob::Pattern);

impl FieldMatcher {
    pub fn new(pattern: &str) -> RewriteResult<Self> {
        glob::Pattern::new(pattern)
            .map(Self)
            .map_err(|e| RewriteError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    pub fn matches(&self, field: &str) -> bool {
        self.0.matches(field)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A single transform applied to matching fields.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Exact-value replacement table.
    Mapping {
        field: FieldMatcher,
        map: BTreeMap<String, String>,
    },
    Regex {
        field: FieldMatcher,
        pattern: Regex,
        replacement: String,
    },
    TextStyle {
        field: FieldMatcher,
        style: TextStyle,
    },
    /// Prompt built from `template` with `{text}` replaced by the value.
    Assistant {
        field: FieldMatcher,
        template: String,
    },
}

impl Rule {
    pub fn field(&self) -> &FieldMatcher {
        match self {
            Self::Mapping { field, .. }
            | Self::Regex { field, .. }
            | Self::TextStyle { field, .. }
            | Self::Assistant { field, .. } => field,
        }
    }

    /// Transform `value`. `None` when the field does not match.
    pub fn apply(
        &self,
        path: &str,
        value: &str,
        assistant: Option<&AiAssistant>,
    ) -> RewriteResult<Option<String>> {
        if !self.field().matches(path) {
            return Ok(None);
        }
        let out = match self {
            Self::Mapping { map, .. } => map.get(value).cloned().unwrap_or_else(|| value.to_string()),
            Self::Regex {
                pattern,
                replacement,
                ..
            } => pattern.replace_all(value, replacement.as_str()).into_owned(),
            Self::TextStyle { style, .. } => style.apply(value),
            Self::Assistant { field, template } => {
                let assistant =
                    assistant.ok_or_else(|| RewriteError::NoAssistant(field.as_str().to_string()))?;
                let response = assistant.rewrite(&template.replace(TEXT_PLACEHOLDER, value))?;
                // An empty answer leaves the text alone.
                if response.is_empty() {
                    value.to_string()
                } else {
                    response
                }
            }
        };
        Ok(Some(out))
    }
}

/// Serializable rule form used in `[[ai.rules]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    Mapping {
        field: String,
        map: BTreeMap<String, String>,
    },
    Regex {
        field: String,
        pattern: String,
        replacement: String,
    },
    TextStyle {
        field: String,
        style: TextStyle,
    },
    Assistant {
        field: String,
        template: String,
    },
}

impl RuleSpec {
    pub fn compile(&self) -> RewriteResult<Rule> {
        Ok(match self {
            Self::Mapping { field, map } => Rule::Mapping {
                field: FieldMatcher::new(field)?,
                map: map.clone(),
            },
            Self::Regex {
                field,
                pattern,
                replacement,
            } => Rule::Regex {
                field: FieldMatcher::new(field)?,
                pattern: Regex::new(pattern)?,
                replacement: replacement.clone(),
            },
            Self::TextStyle { field, style } => Rule::TextStyle {
                field: FieldMatcher::new(field)?,
                style: *style,
            },
            Self::Assistant { field, template } => Rule::Assistant {
                field: FieldMatcher::new(field)?,
                template: template.clone(),
            },
        })
    }
}

/// Ordered rules; each rule sees the output of the previous one.
#[derive(Default)]
pub struct RuleChain {
    rules: Vec<Rule>,
    assistant: Option<Arc<AiAssistant>>,
}

impl RuleChain {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            assistant: None,
        }
    }

    pub fn from_specs(specs: &[RuleSpec]) -> RewriteResult<Self> {
        Ok(Self::new(specs.iter().map(RuleSpec::compile).collect::<RewriteResult<_>>()?))
    }

    pub fn with_assistant(mut self, assistant: Arc<AiAssistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule over one field value.
    pub fn apply(&self, path: &str, value: &str) -> RewriteResult<String> {
        let mut current = value.to_string();
        for rule in &self.rules {
            if let Some(next) = rule.apply(path, &current, self.assistant.as_deref())? {
                current = next;
            }
        }
        Ok(current)
    }

    /// Rewrite every text and attribute below `element`. Returns the number
    /// of values that changed.
    pub fn apply_element(&self, element: &mut XmlElement) -> RewriteResult<usize> {
        let mut changed = 0;
        for child in &mut element.children {
            let mut path = Vec::new();
            self.visit(child, &mut path, &mut changed)?;
        }
        self.rewrite_own(element, "", &mut changed)?;
        debug!(element = %element.name, changed, "Rules applied");
        Ok(changed)
    }

    fn visit(&self, element: &mut XmlElement, path: &mut Vec<String>, changed: &mut usize) -> RewriteResult<()> {
        path.push(element.name.clone());
        let here = path.join("/");
        self.rewrite_own(element, &here, changed)?;
        for child in &mut element.children {
            self.visit(child, path, changed)?;
        }
        path.pop();
        Ok(())
    }

    fn rewrite_own(&self, element: &mut XmlElement, path: &str, changed: &mut usize) -> RewriteResult<()> {
        for (name, value) in &mut element.attributes {
            let field = if path.is_empty() {
                format!("@{}", name)
            } else {
                format!("{}/@{}", path, name)
            };
            let next = self.apply(&field, value)?;
            if next != *value {
                *value = next;
                *changed += 1;
            }
        }
        if let Some(text) = &mut element.text {
            let field = if path.is_empty() { "." } else { path };
            let next = self.apply(field, text)?;
            if next != *text {
                *text = next;
                *changed += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::{EchoService, ResponseCache};
    use crate::retry::RetryPolicy;
    use crate::xml::parse_document;

    fn specs() -> Vec<RuleSpec> {
        vec![
            RuleSpec::Mapping {
                field: "name".into(),
                map: BTreeMap::from([("Rats".to_string(), "Big Rats".to_string())]),
            },
            RuleSpec::Regex {
                field: "*/@kind".into(),
                pattern: "^item_".into(),
                replacement: "gear_".into(),
            },
            RuleSpec::TextStyle {
                field: "name".into(),
                style: TextStyle::Upper,
            },
        ]
    }

    #[test]
    fn test_chain_on_element() {
        let chain = RuleChain::from_specs(&specs()).unwrap();
        let mut record = parse_document(
            r#"<quest id="q1"><name>Rats</name><reward kind="item_sword"><count>2</count></reward></quest>"#,
        )
        .unwrap();
        let changed = chain.apply_element(&mut record).unwrap();
        assert_eq!(changed, 2);
        assert_eq!(record.child("name").unwrap().text.as_deref(), Some("BIG RATS"));
        assert_eq!(record.child("reward").unwrap().attr("kind"), Some("gear_sword"));
        assert_eq!(record.attr("id"), Some("q1"));
    }

    #[test]
    fn test_rule_spec_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            rules: Vec<RuleSpec>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [[rules]]
            kind = "text_style"
            field = "**/desc"
            style = "title"

            [[rules]]
            kind = "assistant"
            field = "name"
            template = "Translate: {text}"
            "#,
        )
        .unwrap();
        assert_eq!(
            doc.rules[0],
            RuleSpec::TextStyle {
                field: "**/desc".into(),
                style: TextStyle::Title
            }
        );
        assert!(matches!(doc.rules[1].compile().unwrap(), Rule::Assistant { .. }));
    }

    #[test]
    fn test_assistant_rule() {
        let spec = RuleSpec::Assistant {
            field: "name".into(),
            template: "{text}!".into(),
        };
        let without = RuleChain::from_specs(std::slice::from_ref(&spec)).unwrap();
        assert!(matches!(without.apply("name", "x"), Err(RewriteError::NoAssistant(_))));

        let assistant = AiAssistant::new(
            Box::new(EchoService),
            Arc::new(ResponseCache::in_memory(None)),
            RetryPolicy::once(),
        );
        let chain = RuleChain::from_specs(&[spec]).unwrap().with_assistant(Arc::new(assistant));
        assert_eq!(chain.apply("name", "Rats").unwrap(), "Rats!");
        assert_eq!(chain.apply("desc", "Rats").unwrap(), "Rats");
    }

    #[test]
    fn test_invalid_patterns() {
        let bad_glob = RuleSpec::TextStyle {
            field: "[".into(),
            style: TextStyle::Lower,
        };
        assert!(matches!(bad_glob.compile(), Err(RewriteError::Pattern { .. })));
        let bad_regex = RuleSpec::Regex {
            field: "*".into(),
            pattern: "(".into(),
            replacement: String::new(),
        };
        assert!(matches!(bad_regex.compile(), Err(RewriteError::Regex(_))));
    }
}
