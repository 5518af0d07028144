//! The string-keyed context carried across step boundaries. Sources include
//! OCR output, previous step outputs, job options, and branching results.

use std::collections::HashMap;

use crate::error::AppError;

pub const INPUT_TEXT_KEY: &str = "input_text";

#[derive(Debug, Clone, Default)]
pub struct Context {
    values: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self { values: HashMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Values set by later steps overwrite earlier ones.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn is_present_and_non_empty(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.trim().is_empty())
    }

    /// Substitutes `{input_text}` and any other `{name}` placeholder found in
    /// `template`. Unknown placeholders are an error; `input_text` is always
    /// resolvable even if never explicitly set (defaults to empty).
    pub fn substitute(&self, template: &str) -> Result<String, AppError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            let Some(end) = rest[start..].find('}') else {
                out.push_str(rest);
                return Ok(out);
            };
            let end = start + end;
            out.push_str(&rest[..start]);
            let name = &rest[start + 1..end];

            if name == INPUT_TEXT_KEY {
                out.push_str(self.get(INPUT_TEXT_KEY).unwrap_or(""));
            } else if let Some(value) = self.get(name) {
                out.push_str(value);
            } else {
                return Err(AppError::Processing {
                    step: "prompt substitution".into(),
                    message: format!("unknown placeholder {{{name}}}"),
                });
            }

            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_input_text_and_named_variables() {
        let mut ctx = Context::new();
        ctx.set(INPUT_TEXT_KEY, "Patient letter content");
        ctx.set("target_language", "en");

        let rendered = ctx.substitute("Translate to {target_language}: {input_text}").unwrap();
        assert_eq!(rendered, "Translate to en: Patient letter content");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let ctx = Context::new();
        let result = ctx.substitute("Hello {unknown_var}");
        assert!(result.is_err());
    }

    #[test]
    fn missing_input_text_defaults_to_empty_string() {
        let ctx = Context::new();
        assert_eq!(ctx.substitute("[{input_text}]").unwrap(), "[]");
    }

    #[test]
    fn later_writes_overwrite_earlier_ones() {
        let mut ctx = Context::new();
        ctx.set("document_class", "ARZTBRIEF");
        ctx.set("document_class", "LABORBEFUND");
        assert_eq!(ctx.get("document_class"), Some("LABORBEFUND"));
    }

    #[test]
    fn empty_string_value_counts_as_absent_for_required_check() {
        let mut ctx = Context::new();
        ctx.set("target_language", "");
        assert!(!ctx.is_present_and_non_empty("target_language"));
        assert!(!ctx.is_present_and_non_empty("missing"));
    }
}
