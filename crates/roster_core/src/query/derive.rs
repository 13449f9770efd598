use super::{Predicate, QueryError, QueryResult};

const QUERY_PREFIXES: &[&str] = &["find_", "read_", "get_", "query_"];
const GREATER_THAN_SUFFIX: &str = "_greater_than";

/// Parses `find_[subject_]by_<clause>[_and_<clause>...]` into a predicate.
///
/// A clause is a property name, optionally suffixed with `_greater_than`.
/// Subject words (`list`, `optional`, `slice`, ...) carry no meaning.
/// Property names are only checked later, against the entity mapping.
pub fn parse_method_name(method: &str) -> QueryResult<Predicate> {
    let unparseable = |reason| QueryError::UnparseableMethodName {
        method: method.to_string(),
        reason,
    };

    let rest = QUERY_PREFIXES
        .iter()
        .find_map(|prefix| method.strip_prefix(prefix))
        .ok_or_else(|| unparseable("expected a find_/read_/get_/query_ prefix"))?;

    let criteria = match rest.strip_prefix("by_") {
        Some(criteria) => criteria,
        None => rest
            .split_once("_by_")
            .map(|(_, criteria)| criteria)
            .ok_or_else(|| unparseable("missing `by_` before the criteria"))?,
    };

    if criteria.is_empty() {
        return Err(unparseable("no criteria after `by_`"));
    }

    let mut clauses = Vec::new();
    for clause in criteria.split("_and_") {
        if clause.is_empty() {
            return Err(unparseable("empty clause"));
        }
        let predicate = match clause.strip_suffix(GREATER_THAN_SUFFIX) {
            Some("") => return Err(unparseable("`greater_than` without a property")),
            Some(property) => Predicate::greater_than(property),
            None => Predicate::eq(clause),
        };
        clauses.push(predicate);
    }

    Ok(Predicate::and(clauses))
}

#[cfg(test)]
mod tests {
    use super::parse_method_name;
    use crate::query::{Predicate, QueryError};

    #[test]
    fn parses_conjunction_with_greater_than() {
        let predicate = parse_method_name("find_by_username_and_age_greater_than").unwrap();
        assert_eq!(
            predicate,
            Predicate::And(vec![
                Predicate::eq("username"),
                Predicate::greater_than("age"),
            ])
        );
        assert_eq!(predicate.parameters(), vec!["username", "age"]);
    }

    #[test]
    fn subject_words_are_ignored() {
        for name in [
            "find_list_by_username",
            "find_optional_by_username",
            "find_entity_graph_by_username",
            "read_by_username",
        ] {
            assert_eq!(
                parse_method_name(name).unwrap(),
                Predicate::eq("username"),
                "{name}"
            );
        }
    }

    #[test]
    fn rejects_names_without_criteria() {
        for name in ["find_all", "delete_by_username", "find_by_", "find_by_age_and_"] {
            assert!(
                matches!(
                    parse_method_name(name),
                    Err(QueryError::UnparseableMethodName { .. })
                ),
                "{name}"
            );
        }
    }
}
