use super::derive::parse_method_name;
use super::QueryResult;
use std::fmt::{Display, Formatter};

/// Filter tree over entity properties. Leaves bind one parameter each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Eq(String),
    GreaterThan(String),
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(property: impl Into<String>) -> Self {
        Self::Eq(property.into())
    }

    pub fn greater_than(property: impl Into<String>) -> Self {
        Self::GreaterThan(property.into())
    }

    /// Conjunction; a single clause collapses to itself.
    pub fn and(mut clauses: Vec<Predicate>) -> Self {
        if clauses.len() == 1 {
            return clauses.remove(0);
        }
        Self::And(clauses)
    }

    /// Leaf properties in binding order.
    pub fn parameters(&self) -> Vec<String> {
        match self {
            Self::Eq(property) | Self::GreaterThan(property) => vec![property.clone()],
            Self::And(clauses) => clauses.iter().flat_map(Predicate::parameters).collect(),
        }
    }
}

/// Where a query method's filter comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// No filter: every row of the entity table.
    All,
    Derived(Predicate),
    /// Reference to a registered [`NamedQuery`].
    Named(String),
    /// Filter template attached to the method itself.
    Inline(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Zero or more rows; empty when nothing matches.
    List,
    /// At most one row; more than one is an error.
    Single,
    /// Same cardinality contract as `Single`, spelled for optional lookups.
    Optional,
    /// Window plus total count.
    Page,
    /// Window plus one lookahead row for "has next".
    Slice,
}

impl Display for ResultShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::List => "list",
            Self::Single => "single",
            Self::Optional => "optional",
            Self::Page => "page",
            Self::Slice => "slice",
        };
        f.write_str(name)
    }
}

/// Associations to load in the same statement as the root entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityGraph {
    pub attribute_paths: Vec<String>,
}

impl EntityGraph {
    pub fn of(paths: &[&str]) -> Self {
        Self {
            attribute_paths: paths.iter().map(|path| (*path).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryHints {
    /// Loaded entities are not snapshotted, so flush never writes them.
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    #[default]
    None,
    /// Take the store's write lock before reading.
    PessimisticWrite,
}

/// Declarative description of one repository read method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMethod {
    pub name: String,
    pub source: QuerySource,
    pub params: Vec<String>,
    pub shape: ResultShape,
    pub entity_graph: Option<EntityGraph>,
    pub hints: QueryHints,
    pub lock: LockMode,
}

impl QueryMethod {
    fn with_source(name: impl Into<String>, source: QuerySource, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            source,
            params,
            shape: ResultShape::List,
            entity_graph: None,
            hints: QueryHints::default(),
            lock: LockMode::None,
        }
    }

    /// Unfiltered read of the whole table.
    pub fn all(name: impl Into<String>) -> Self {
        Self::with_source(name, QuerySource::All, Vec::new())
    }

    /// Explicit predicate; parameters are the predicate leaves in order.
    pub fn derived(name: impl Into<String>, predicate: Predicate) -> Self {
        let params = predicate.parameters();
        Self::with_source(name, QuerySource::Derived(predicate), params)
    }

    /// Predicate parsed from a snake_case method name such as
    /// `find_by_username_and_age_greater_than`.
    pub fn from_method_name(name: &str) -> QueryResult<Self> {
        let predicate = parse_method_name(name)?;
        Ok(Self::derived(name, predicate))
    }

    pub fn named(name: impl Into<String>, named_query: impl Into<String>, params: &[&str]) -> Self {
        Self::with_source(
            name,
            QuerySource::Named(named_query.into()),
            params.iter().map(|param| (*param).to_string()).collect(),
        )
    }

    pub fn inline(name: impl Into<String>, template: impl Into<String>, params: &[&str]) -> Self {
        Self::with_source(
            name,
            QuerySource::Inline(template.into()),
            params.iter().map(|param| (*param).to_string()).collect(),
        )
    }

    pub fn returning(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_entity_graph(mut self, paths: &[&str]) -> Self {
        self.entity_graph = Some(EntityGraph::of(paths));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.hints.read_only = true;
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.lock = mode;
        self
    }
}

/// Filter template registered once and shared by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    pub name: String,
    pub template: String,
}

impl NamedQuery {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }
}

/// Set-based UPDATE/DELETE that bypasses the identity map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyingQuery {
    pub name: String,
    pub template: String,
    pub params: Vec<String>,
    /// Clear the unit-of-work identity map after execution.
    pub clear_automatically: bool,
}

impl ModifyingQuery {
    pub fn new(name: impl Into<String>, template: impl Into<String>, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            params: params.iter().map(|param| (*param).to_string()).collect(),
            clear_automatically: false,
        }
    }

    pub fn clear_automatically(mut self, clear: bool) -> Self {
        self.clear_automatically = clear;
        self
    }
}
