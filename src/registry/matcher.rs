//! Path-template compilation and matching: `{name}` single-segment
//! captures, `**` multi-segment, bare `*` single-element wildcard, all
//! anchored `^...$`.

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid path template {0:?}: {1}")]
    InvalidPattern(String, String),
}

/// A path template compiled once and cached alongside its owning endpoint.
#[derive(Debug)]
pub struct CompiledTemplate {
    pub source: String,
    regex: Regex,
    var_names: Vec<String>,
}

impl CompiledTemplate {
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let (pattern, var_names) = translate(template);
        let anchored = format!("^{pattern}$");
        let regex = Regex::new(&anchored)
            .map_err(|e| TemplateError::InvalidPattern(template.to_string(), e.to_string()))?;
        Ok(Self {
            source: template.to_string(),
            regex,
            var_names,
        })
    }

    /// Returns the extracted path variables if `path` matches, else `None`.
    /// Path variables never span `/`: `{name}` only captures a single
    /// segment by construction of the translated regex.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let mut vars = HashMap::new();
        for name in &self.var_names {
            if let Some(m) = caps.name(name) {
                vars.insert(name.clone(), m.as_str().to_string());
            }
        }
        Some(vars)
    }
}

/// Translate a path template into a regex pattern plus the list of
/// named captures it declares, in order of appearance.
fn translate(template: &str) -> (String, Vec<String>) {
    let mut out = String::new();
    let mut var_names = Vec::new();
    let bytes: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            '{' => {
                if let Some(end) = bytes[i..].iter().position(|c| *c == '}') {
                    let name: String = bytes[i + 1..i + end].iter().collect();
                    out.push_str(&format!("(?P<{name}>[^/]+)"));
                    var_names.push(name);
                    i += end + 1;
                } else {
                    out.push_str(&regex::escape("{"));
                    i += 1;
                }
            }
            '*' => {
                if bytes.get(i + 1) == Some(&'*') {
                    out.push_str(".*");
                    i += 2;
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    (out, var_names)
}

/// Apply `{name}` substitution to `pathRewrite` using the extracted
/// variables.
pub fn apply_rewrite(rewrite: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(rewrite.len());
    let chars: Vec<char> = rewrite.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = chars[i..].iter().position(|c| *c == '}') {
                let name: String = chars[i + 1..i + end].iter().collect();
                if let Some(value) = vars.get(&name) {
                    out.push_str(value);
                }
                i += end + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Split `/{serviceId}/{remainder}` on the first `/` after the leading one.
/// Empty path normalizes to `/` before splitting.
pub fn split_service_and_remainder(path: &str) -> (&str, &str) {
    let path = if path.is_empty() { "/" } else { path };
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => (trimmed, ""),
    }
}

/// Remainder is normalized to always begin with `/`.
pub fn normalize_remainder(remainder: &str) -> String {
    if remainder.is_empty() {
        "/".to_string()
    } else if remainder.starts_with('/') {
        remainder.to_string()
    } else {
        format!("/{remainder}")
    }
}
