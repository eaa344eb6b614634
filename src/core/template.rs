//! `{{ ... }}` placeholder rendering for step parameters and env

use crate::core::condition::{parse_expression, ConditionContext, ConditionError};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unresolved placeholder '{{{{ {0} }}}}'")]
    Unresolved(String),

    #[error("Invalid expression in '{{{{ {source_text} }}}}': {error}")]
    Expression {
        source_text: String,
        #[source]
        error: ConditionError,
    },
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("placeholder regex"))
}

fn path_regex() -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    PATH.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*(\.[A-Za-z0-9_\-]+)*$").expect("path regex"))
}

/// Inner text of every placeholder in `template`
pub fn placeholders(template: &str) -> Vec<&str> {
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Names of secrets referenced as `{{ secrets.NAME }}` or inside a placeholder expression
pub fn secret_refs(template: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for inner in placeholders(template) {
        if path_regex().is_match(inner) {
            refs.extend(inner.strip_prefix("secrets.").map(str::to_string));
        } else if let Ok(expr) = parse_expression(inner) {
            refs.extend(
                expr.paths()
                    .into_iter()
                    .filter_map(|p| p.strip_prefix("secrets."))
                    .map(str::to_string),
            );
        }
    }
    refs
}

/// Check that every placeholder is a path or a parseable expression
pub fn check(template: &str) -> Result<(), TemplateError> {
    for inner in placeholders(template) {
        if !path_regex().is_match(inner) {
            parse_expression(inner).map_err(|error| TemplateError::Expression {
                source_text: inner.to_string(),
                error,
            })?;
        }
    }
    Ok(())
}

/// Render `template`.
///
/// A placeholder holding a plain path (`vars.image`, `secrets.TOKEN`) must resolve
/// or rendering fails. Anything else is evaluated as an expression, so
/// `{{ run.event != 'pull_request' }}` renders as `true` or `false`.
pub fn render(template: &str, ctx: &dyn ConditionContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);

        let inner = inner.as_str();
        let value = if path_regex().is_match(inner) {
            ctx.lookup(inner)
                .ok_or_else(|| TemplateError::Unresolved(inner.to_string()))?
        } else {
            parse_expression(inner)
                .map_err(|error| TemplateError::Expression {
                    source_text: inner.to_string(),
                    error,
                })?
                .evaluate(ctx)
                .to_string()
        };
        out.push_str(&value);
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}
