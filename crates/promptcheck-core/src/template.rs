//! `{name}` placeholder templates with `{{` / `}}` escapes.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("malformed template at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },

    #[error("missing value for placeholder '{name}'")]
    MissingVar { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

/// `{name:spec}`, `{name!r}`, `{name[0]}` and `{name.attr}` are rejected.
const UNSUPPORTED_FIELD_SYNTAX: &[char] = &[':', '!', '[', '.'];

fn token_regex() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("token regex is valid")
    })
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in token_regex().captures_iter(source) {
            let token = caps.get(0).map_or("", |m| m.as_str());
            let start = caps.get(0).map_or(0, |m| m.start());
            literal.push_str(&source[last..start]);
            last = start + token.len();

            match (token, caps.get(1)) {
                ("{{", _) => literal.push('{'),
                ("}}", _) => literal.push('}'),
                (_, Some(name)) => {
                    let name = name.as_str();
                    if name.is_empty() {
                        return Err(TemplateError::Malformed {
                            offset: start,
                            reason: "positional placeholders are not supported",
                        });
                    }
                    if name.contains(UNSUPPORTED_FIELD_SYNTAX) {
                        return Err(TemplateError::Malformed {
                            offset: start,
                            reason: "format specs, conversions and field access are not supported",
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                ("{", None) => {
                    return Err(TemplateError::Malformed {
                        offset: start,
                        reason: "unmatched '{'",
                    })
                }
                _ => {
                    return Err(TemplateError::Malformed {
                        offset: start,
                        reason: "single '}' encountered",
                    })
                }
            }
        }

        literal.push_str(&source[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute every placeholder. Extra vars are ignored.
    pub fn render(&self, vars: &BTreeMap<String, Value>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = vars
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingVar { name: name.clone() })?;
                    out.push_str(&value_text(value));
                }
            }
        }
        Ok(out)
    }
}

/// Text substituted for a var, spelled the way Python's `str()` spells scalars.
pub(crate) fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        _ => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_render_named_placeholders() {
        let t = Template::parse("What is the capital of {country}? Answer in {lang}.").unwrap();
        assert_eq!(t.placeholders(), vec!["country", "lang"]);
        let out = t
            .render(&vars(&[("country", json!("France")), ("lang", json!("English"))]))
            .unwrap();
        assert_eq!(out, "What is the capital of France? Answer in English.");
    }

    #[test]
    fn test_non_string_values_and_extra_vars() {
        let t = Template::parse("{a} + {a} = ?").unwrap();
        let out = t.render(&vars(&[("a", json!(2)), ("unused", json!("x"))])).unwrap();
        assert_eq!(out, "2 + 2 = ?");
        assert_eq!(t.placeholders(), vec!["a"]);
    }

    #[test]
    fn test_escaped_braces() {
        let t = Template::parse("Return JSON like {{\"name\": \"{name}\"}}").unwrap();
        let out = t.render(&vars(&[("name", json!("Ada"))])).unwrap();
        assert_eq!(out, "Return JSON like {\"name\": \"Ada\"}");
    }

    #[test]
    fn test_missing_var() {
        let t = Template::parse("Hello {name}").unwrap();
        let err = t.render(&BTreeMap::new()).unwrap_err();
        assert_eq!(err, TemplateError::MissingVar { name: "name".into() });
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(Template::parse("oops {name"), Err(TemplateError::Malformed { .. })));
        assert!(matches!(Template::parse("oops }"), Err(TemplateError::Malformed { .. })));
        assert!(matches!(Template::parse("pos {}"), Err(TemplateError::Malformed { .. })));
    }

    #[test]
    fn test_field_syntax_rejected_at_parse() {
        for source in ["Price: {price:.2f} ok", "{x!r}", "{x[0]}", "{user.name}"] {
            match Template::parse(source) {
                Err(TemplateError::Malformed { reason, .. }) => {
                    assert!(reason.contains("not supported"), "{source}: {reason}")
                }
                other => panic!("{source}: expected Malformed, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_placeholder_name_is_not_trimmed() {
        let t = Template::parse("Hi { name }").unwrap();
        assert_eq!(t.placeholders(), vec![" name "]);
        let err = t.render(&vars(&[("name", json!("Ada"))])).unwrap_err();
        assert_eq!(err, TemplateError::MissingVar { name: " name ".into() });
        let out = t.render(&vars(&[(" name ", json!("Ada"))])).unwrap();
        assert_eq!(out, "Hi Ada");
    }

    #[test]
    fn test_scalars_render_like_python() {
        let t = Template::parse("Flag {on} {off} {none} {n} {f}").unwrap();
        let out = t
            .render(&vars(&[
                ("on", json!(true)),
                ("off", json!(false)),
                ("none", Value::Null),
                ("n", json!(7)),
                ("f", json!(2.5)),
            ]))
            .unwrap();
        assert_eq!(out, "Flag True False None 7 2.5");
    }

    #[test]
    fn test_no_placeholders() {
        let t = Template::parse("plain text").unwrap();
        assert!(t.placeholders().is_empty());
        assert_eq!(t.render(&BTreeMap::new()).unwrap(), "plain text");
    }
}
