use super::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("valid placeholder regex"));

/// Distinct `:name` placeholders in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Rewrites `:name` placeholders to `?N`, where `N` is the 1-based position of
/// `name` in `declared`. Every declared parameter must appear, and nothing else.
pub fn bind_positional(query: &str, template: &str, declared: &[String]) -> QueryResult<String> {
    let found = placeholders(template);
    let missing: Vec<String> = declared
        .iter()
        .filter(|param| !found.contains(param))
        .cloned()
        .collect();
    let unexpected: Vec<String> = found
        .iter()
        .filter(|name| !declared.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(QueryError::ParameterMismatch {
            query: query.to_string(),
            missing,
            unexpected,
        });
    }

    let rewritten = PLACEHOLDER_RE.replace_all(template, |caps: &Captures<'_>| {
        let position = declared
            .iter()
            .position(|param| param == &caps[1])
            .map_or(0, |index| index + 1);
        format!("?{position}")
    });
    Ok(rewritten.into_owned())
}

#[cfg(test)]
mod tests {
    use super::{bind_positional, placeholders};
    use crate::query::QueryError;

    fn declared(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn placeholders_are_deduplicated_in_order() {
        assert_eq!(
            placeholders("m.age > :age AND m.username = :username OR m.age = :age"),
            vec!["age", "username"]
        );
    }

    #[test]
    fn rewrites_by_declared_position() {
        let sql = bind_positional(
            "find_user",
            "m.username = :username AND m.age = :age",
            &declared(&["age", "username"]),
        )
        .unwrap();
        assert_eq!(sql, "m.username = ?2 AND m.age = ?1");
    }

    #[test]
    fn misspelled_parameter_is_reported_both_ways() {
        let err = bind_positional(
            "find_user",
            "m.username = :usrname",
            &declared(&["username"]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            QueryError::ParameterMismatch {
                query: "find_user".to_string(),
                missing: declared(&["username"]),
                unexpected: declared(&["usrname"]),
            }
        );
    }
}
