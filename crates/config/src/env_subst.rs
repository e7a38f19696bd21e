//! `${VAR}` expansion applied to raw config text before parsing.
//!
//! - `${VAR}` is replaced by the value of `VAR`; an unset variable is an error.
//! - `${VAR:-fallback}` uses `fallback` when `VAR` is unset or empty.
//! - `$${` produces a literal `${`.
//! - A `$` not followed by `{` is copied unchanged.

/// A placeholder that could not be expanded. Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstError {
    #[error("line {line}: environment variable '{name}' is not set")]
    Unset { name: String, line: usize },

    #[error("line {line}: unterminated '${{' placeholder")]
    Unterminated { line: usize },

    #[error("line {line}: placeholder has no variable name")]
    EmptyName { line: usize },
}

/// Expand placeholders from the process environment.
pub fn substitute_env(input: &str) -> Result<String, SubstError> {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Expand placeholders, resolving names through `lookup`.
pub fn substitute_with<F>(input: &str, lookup: F) -> Result<String, SubstError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut line = 1;

    while let Some(pos) = rest.find('$') {
        let (before, tail) = rest.split_at(pos);
        line += before.matches('\n').count();
        out.push_str(before);

        if let Some(after) = tail.strip_prefix("$${") {
            out.push_str("${");
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            let end = after
                .find(['}', '\n'])
                .filter(|&i| after[i..].starts_with('}'))
                .ok_or(SubstError::Unterminated { line })?;
            out.push_str(&resolve(&after[..end], line, &lookup)?);
            rest = &after[end + 1..];
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve<F>(body: &str, line: usize, lookup: &F) -> Result<String, SubstError>
where
    F: Fn(&str) -> Option<String>,
{
    let (name, fallback) = match body.split_once(":-") {
        Some((name, fallback)) => (name.trim(), Some(fallback)),
        None => (body.trim(), None),
    };
    if name.is_empty() {
        return Err(SubstError::EmptyName { line });
    }
    match (lookup(name), fallback) {
        (Some(value), Some(fallback)) if value.is_empty() => Ok(fallback.to_string()),
        (Some(value), _) => Ok(value),
        (None, Some(fallback)) => Ok(fallback.to_string()),
        (None, None) => Err(SubstError::Unset {
            name: name.to_string(),
            line,
        }),
    }
}
