use super::template::bind_positional;
use super::{
    LockMode, ModifyingQuery, NamedQuery, Predicate, QueryError, QueryMethod, QueryResult,
    QuerySource, ResultShape,
};
use crate::repo::entity::{property_column, Entity};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;

static QUALIFIED_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid qualified column regex")
});

/// A read query compiled against one entity mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    name: String,
    filter: Option<String>,
    param_count: usize,
    shape: ResultShape,
    fetch: Vec<String>,
    read_only: bool,
    lock: LockMode,
}

impl PreparedQuery {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// WHERE clause body with `?N` placeholders; `None` for unfiltered reads.
    pub fn filter_sql(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    pub fn fetches(&self, association: &str) -> bool {
        self.fetch.iter().any(|path| path == association)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock
    }
}

/// A set-based write compiled to positional SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedModifying {
    name: String,
    sql: String,
    param_count: usize,
    clear_automatically: bool,
}

impl PreparedModifying {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn clears_automatically(&self) -> bool {
        self.clear_automatically
    }
}

/// What a query name dispatches to.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'r> {
    /// Hand-written implementation registered for this operation.
    Custom,
    Declared(&'r PreparedQuery),
    Modifying(&'r PreparedModifying),
}

/// Per-entity table of compiled queries.
///
/// Registration validates eagerly; a registry that was built without error
/// only ever dispatches to well-formed SQL.
pub struct QueryRegistry<E> {
    named: HashMap<String, String>,
    queries: HashMap<String, PreparedQuery>,
    modifying: HashMap<String, PreparedModifying>,
    custom: BTreeSet<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for QueryRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> QueryRegistry<E> {
    pub fn new() -> Self {
        Self {
            named: HashMap::new(),
            queries: HashMap::new(),
            modifying: HashMap::new(),
            custom: BTreeSet::new(),
            _entity: PhantomData,
        }
    }

    pub fn register_named(&mut self, named: NamedQuery) -> QueryResult<()> {
        if self.named.contains_key(&named.name) {
            return Err(QueryError::DuplicateQuery(named.name));
        }
        validate_template_columns::<E>(&named.name, &named.template)?;
        self.named.insert(named.name, named.template);
        Ok(())
    }

    pub fn register(&mut self, method: QueryMethod) -> QueryResult<()> {
        self.ensure_unique(&method.name)?;

        let filter = match &method.source {
            QuerySource::All => {
                if !method.params.is_empty() {
                    return Err(QueryError::ParameterMismatch {
                        query: method.name.clone(),
                        missing: method.params.clone(),
                        unexpected: Vec::new(),
                    });
                }
                None
            }
            QuerySource::Derived(predicate) => {
                let leaves = predicate.parameters();
                if leaves != method.params {
                    return Err(QueryError::ParameterMismatch {
                        query: method.name.clone(),
                        missing: leaves,
                        unexpected: method.params.clone(),
                    });
                }
                let mut next_position = 1;
                Some(compile_predicate::<E>(
                    &method.name,
                    predicate,
                    &mut next_position,
                )?)
            }
            QuerySource::Named(named_query) => {
                let template =
                    self.named
                        .get(named_query)
                        .ok_or_else(|| QueryError::MissingNamedQuery {
                            method: method.name.clone(),
                            named_query: named_query.clone(),
                        })?;
                Some(bind_positional(&method.name, template, &method.params)?)
            }
            QuerySource::Inline(template) => {
                validate_template_columns::<E>(&method.name, template)?;
                Some(bind_positional(&method.name, template, &method.params)?)
            }
        };

        let fetch = match &method.entity_graph {
            Some(graph) => {
                for path in &graph.attribute_paths {
                    if !E::ASSOCIATIONS.contains(&path.as_str()) {
                        return Err(QueryError::UnknownAssociation {
                            method: method.name.clone(),
                            entity: E::NAME,
                            path: path.clone(),
                        });
                    }
                }
                graph.attribute_paths.clone()
            }
            None => Vec::new(),
        };

        debug!(
            "event=query_register module=query status=ok entity={} query={} shape={} fetch={:?}",
            E::NAME,
            method.name,
            method.shape,
            fetch
        );

        let prepared = PreparedQuery {
            name: method.name.clone(),
            filter,
            param_count: method.params.len(),
            shape: method.shape,
            fetch,
            read_only: method.hints.read_only,
            lock: method.lock,
        };
        self.queries.insert(method.name, prepared);
        Ok(())
    }

    pub fn register_modifying(&mut self, query: ModifyingQuery) -> QueryResult<()> {
        self.ensure_unique(&query.name)?;

        let verb = query
            .template
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if verb != "UPDATE" && verb != "DELETE" {
            return Err(QueryError::NotModifying(query.name));
        }
        let sql = bind_positional(&query.name, &query.template, &query.params)?;

        debug!(
            "event=query_register module=query status=ok entity={} query={} shape=modifying clear_automatically={}",
            E::NAME,
            query.name,
            query.clear_automatically
        );

        let prepared = PreparedModifying {
            name: query.name.clone(),
            sql,
            param_count: query.params.len(),
            clear_automatically: query.clear_automatically,
        };
        self.modifying.insert(query.name, prepared);
        Ok(())
    }

    /// Routes `operation` to a hand-written implementation.
    ///
    /// Takes precedence over any declared query of the same name, whichever
    /// was registered first.
    pub fn register_custom(&mut self, operation: &str) {
        if self.queries.contains_key(operation) || self.modifying.contains_key(operation) {
            info!(
                "event=query_override module=query status=ok entity={} query={operation} winner=custom",
                E::NAME
            );
        }
        self.custom.insert(operation.to_string());
    }

    pub fn resolve(&self, name: &str) -> QueryResult<Resolved<'_>> {
        if self.custom.contains(name) {
            return Ok(Resolved::Custom);
        }
        if let Some(query) = self.queries.get(name) {
            return Ok(Resolved::Declared(query));
        }
        if let Some(query) = self.modifying.get(name) {
            return Ok(Resolved::Modifying(query));
        }
        Err(QueryError::UnknownQuery(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.custom.contains(name)
            || self.queries.contains_key(name)
            || self.modifying.contains_key(name)
    }

    /// Declared reads, ordered by name.
    pub fn declared(&self) -> Vec<&PreparedQuery> {
        let mut queries: Vec<_> = self.queries.values().collect();
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        queries
    }

    /// Bulk writes, ordered by name.
    pub fn modifying_queries(&self) -> Vec<&PreparedModifying> {
        let mut queries: Vec<_> = self.modifying.values().collect();
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        queries
    }

    pub fn is_custom(&self, name: &str) -> bool {
        self.custom.contains(name)
    }

    /// Number of dispatchable operations (declared, modifying and custom).
    pub fn len(&self) -> usize {
        let overridden = self
            .custom
            .iter()
            .filter(|name| self.queries.contains_key(*name) || self.modifying.contains_key(*name))
            .count();
        self.queries.len() + self.modifying.len() + self.custom.len() - overridden
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_unique(&self, name: &str) -> QueryResult<()> {
        if self.queries.contains_key(name) || self.modifying.contains_key(name) {
            return Err(QueryError::DuplicateQuery(name.to_string()));
        }
        Ok(())
    }
}

fn compile_predicate<E: Entity>(
    method: &str,
    predicate: &Predicate,
    next_position: &mut usize,
) -> QueryResult<String> {
    match predicate {
        Predicate::Eq(property) => compile_leaf::<E>(method, property, "=", next_position),
        Predicate::GreaterThan(property) => {
            compile_leaf::<E>(method, property, ">", next_position)
        }
        Predicate::And(clauses) => {
            let mut parts = Vec::with_capacity(clauses.len());
            for clause in clauses {
                parts.push(compile_predicate::<E>(method, clause, next_position)?);
            }
            Ok(format!("({})", parts.join(" AND ")))
        }
    }
}

fn compile_leaf<E: Entity>(
    method: &str,
    property: &str,
    operator: &str,
    next_position: &mut usize,
) -> QueryResult<String> {
    let column = property_column::<E>(property).ok_or_else(|| QueryError::UnknownProperty {
        method: method.to_string(),
        entity: E::NAME,
        property: property.to_string(),
    })?;
    let position = *next_position;
    *next_position += 1;
    Ok(format!("{}.{column} {operator} ?{position}", E::ALIAS))
}

/// Rejects `<alias>.<column>` references to columns the entity does not map.
fn validate_template_columns<E: Entity>(query: &str, template: &str) -> QueryResult<()> {
    for caps in QUALIFIED_COLUMN_RE.captures_iter(template) {
        if &caps[1] != E::ALIAS {
            continue;
        }
        let column = &caps[2];
        let known = column == E::ID_COLUMN || E::COLUMNS.contains(&column);
        if !known {
            return Err(QueryError::UnknownProperty {
                method: query.to_string(),
                entity: E::NAME,
                property: column.to_string(),
            });
        }
    }
    Ok(())
}
