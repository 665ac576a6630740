// src/records/jdl.rs

//! Minimal reader for ClassAd-style job descriptions.
//!
//! Only the shape the production jobs use is supported:
//!
//! ```text
//! [
//!   JobGroup = "00001234";
//!   TaskID = 7;
//!   InputData = {"LFN:/in/1.stdhep"};
//!   ProductionOutputData = {"/out/a.slcio", "/out/b.slcio"};
//! ]
//! ```
//!
//! Values are a bare token, a quoted string, or a `{...}` list of quoted
//! strings. Nested lists are not used by any production job.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$").expect("static regex")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JdlValue {
    Scalar(String),
    List(Vec<String>),
}

impl JdlValue {
    /// Either the scalar itself or every list element.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            JdlValue::Scalar(s) if s.is_empty() => Vec::new(),
            JdlValue::Scalar(s) => vec![s.clone()],
            JdlValue::List(items) => items.clone(),
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            JdlValue::Scalar(s) => Some(s),
            JdlValue::List(items) => items.first().map(String::as_str),
        }
    }
}

/// Parsed job description: attribute name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jdl {
    attributes: BTreeMap<String, JdlValue>,
}

impl Jdl {
    pub fn parse(text: &str) -> Self {
        let body = text.trim();
        let body = body.strip_prefix('[').unwrap_or(body);
        let body = body.strip_suffix(']').unwrap_or(body);

        let mut attributes = BTreeMap::new();
        for statement in split_statements(body) {
            let Some(caps) = ASSIGNMENT.captures(&statement) else {
                continue;
            };
            let key = caps[1].to_string();
            attributes.insert(key, parse_value(&caps[2]));
        }

        Self { attributes }
    }

    pub fn get(&self, key: &str) -> Option<&JdlValue> {
        self.attributes.get(key)
    }
}

/// Split on `;` outside quotes and braces.
fn split_statements(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut depth = 0usize;
    let mut prev = '\0';

    for c in body.chars() {
        match c {
            '"' if prev != '\\' => in_quote = !in_quote,
            '{' if !in_quote => depth += 1,
            '}' if !in_quote => depth = depth.saturating_sub(1),
            ';' if !in_quote && depth == 0 => {
                if !current.trim().is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                prev = c;
                continue;
            }
            _ => {}
        }
        current.push(c);
        prev = c;
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn parse_value(raw: &str) -> JdlValue {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        let items = QUOTED
            .captures_iter(inner)
            .map(|c| c[1].to_string())
            .collect();
        return JdlValue::List(items);
    }
    if let Some(caps) = QUOTED.captures(raw) {
        return JdlValue::Scalar(caps[1].to_string());
    }
    JdlValue::Scalar(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_and_lists() {
        let jdl = Jdl::parse(
            r#"[
                JobGroup = "00000042";
                TaskID = 7;
                InputData = {"LFN:/in/1.stdhep"};
                ProductionOutputData =
                    {
                        "/out/a.slcio",
                        "/out/b.slcio"
                    };
            ]"#,
        );

        assert_eq!(jdl.get("TaskID").and_then(JdlValue::as_scalar), Some("7"));
        assert_eq!(
            jdl.get("ProductionOutputData").map(JdlValue::as_list),
            Some(vec!["/out/a.slcio".to_string(), "/out/b.slcio".to_string()])
        );
        assert_eq!(
            jdl.get("JobGroup"),
            Some(&JdlValue::Scalar("00000042".into()))
        );
    }

    #[test]
    fn semicolons_inside_strings_do_not_split() {
        let jdl = Jdl::parse(r#"Arguments = "a;b"; TaskID = "3""#);
        assert_eq!(jdl.get("Arguments").and_then(JdlValue::as_scalar), Some("a;b"));
        assert_eq!(jdl.get("TaskID").and_then(JdlValue::as_scalar), Some("3"));
    }
}
