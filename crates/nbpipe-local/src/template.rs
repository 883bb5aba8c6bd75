//! Prompt templates wrapped around copied text.

use nbpipe_core::{Error, Result};
use std::str::FromStr;

pub const PLACEHOLDER: &str = "{{content}}";
pub const DEFAULT_CUSTOM: &str = "Please analyze the following notebook:\n\n{{content}}";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PromptTemplate {
    #[default]
    None,
    Explain,
    Summary,
    Debug,
    Improve,
    Custom(String),
}

impl PromptTemplate {
    pub fn body(&self) -> &str {
        match self {
            PromptTemplate::None => PLACEHOLDER,
            PromptTemplate::Explain => {
                "Please explain the following Jupyter notebook code and analysis in detail:\n\n{{content}}"
            }
            PromptTemplate::Summary => {
                "Please provide a concise summary of the following Jupyter notebook analysis:\n\n{{content}}"
            }
            PromptTemplate::Debug => {
                "Debug the following Jupyter notebook code and explain any issues or improvements:\n\n{{content}}"
            }
            PromptTemplate::Improve => {
                "Review the following Jupyter notebook code and suggest specific improvements for efficiency, readability, and best practices:\n\n{{content}}"
            }
            PromptTemplate::Custom(body) => body.as_str(),
        }
    }

    /// Substitute the first `{{content}}`. A custom body without the placeholder gets the
    /// content appended after a blank line.
    pub fn apply(&self, content: &str) -> String {
        let body = self.body();
        if body.contains(PLACEHOLDER) {
            body.replacen(PLACEHOLDER, content, 1)
        } else {
            format!("{body}\n\n{content}")
        }
    }
}

impl FromStr for PromptTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(PromptTemplate::None),
            "explain" => Ok(PromptTemplate::Explain),
            "summary" => Ok(PromptTemplate::Summary),
            "debug" => Ok(PromptTemplate::Debug),
            "improve" => Ok(PromptTemplate::Improve),
            "custom" => Ok(PromptTemplate::Custom(DEFAULT_CUSTOM.to_string())),
            other => Err(Error::InvalidInput(format!("unknown template: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        assert_eq!(PromptTemplate::None.apply("abc"), "abc");
    }

    #[test]
    fn builtin_templates_prefix_content() {
        let out = PromptTemplate::Summary.apply("X");
        assert_eq!(
            out,
            "Please provide a concise summary of the following Jupyter notebook analysis:\n\nX"
        );
        assert!(PromptTemplate::Explain.apply("X").ends_with("in detail:\n\nX"));
    }

    #[test]
    fn only_first_placeholder_is_replaced() {
        let t = PromptTemplate::Custom("A {{content}} B {{content}}".to_string());
        assert_eq!(t.apply("x"), "A x B {{content}}");
    }

    #[test]
    fn content_is_not_reinterpreted() {
        assert_eq!(
            PromptTemplate::Debug.apply("{{content}}").matches(PLACEHOLDER).count(),
            1
        );
    }

    #[test]
    fn custom_without_placeholder_appends() {
        let t = PromptTemplate::Custom("Review this".to_string());
        assert_eq!(t.apply("code"), "Review this\n\ncode");
    }

    #[test]
    fn parses_names() {
        assert_eq!("Improve".parse::<PromptTemplate>().unwrap(), PromptTemplate::Improve);
        assert_eq!(
            "custom".parse::<PromptTemplate>().unwrap().body(),
            DEFAULT_CUSTOM
        );
        assert!("haiku".parse::<PromptTemplate>().is_err());
    }
}
