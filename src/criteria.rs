//! Filter/sort criteria and their translation into path-based query requests
//!
//! Callers submit a [`FilterSortCriteria`] keyed by criterion names. A
//! [`CriteriaMapping`] binds those names to record paths, and [`translate`] turns the
//! pair into a [`FilterRequest`] a [`CriteriaTranslator`](crate::CriteriaTranslator)
//! can execute.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entity::IdValue;
use crate::error::Result;

// ============================================================================
// Conditions
// ============================================================================

/// Filter condition over record paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    /// path == value
    Eq {
        path: String,
        value: serde_json::Value,
    },
    /// All conditions hold
    And(Vec<Condition>),
    /// At least one condition holds
    Or(Vec<Condition>),
}

impl Condition {
    /// Evaluate against a record whose values are looked up by path.
    ///
    /// Values compare by their text form, so `5` matches `"5"`. A missing value only
    /// matches a null comparand.
    pub fn matches<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<serde_json::Value>,
    {
        match self {
            Condition::Eq { path, value } => match lookup(path) {
                None | Some(serde_json::Value::Null) => value.is_null(),
                Some(actual) => {
                    !value.is_null() && json_value_to_string(&actual) == json_value_to_string(value)
                }
            },
            Condition::And(conditions) => conditions.iter().all(|c| c.matches(lookup)),
            Condition::Or(conditions) => conditions.iter().any(|c| c.matches(lookup)),
        }
    }
}

/// Helper functions to create Condition instances
pub mod condition_helpers {
    use super::Condition;

    /// Create an equality condition: path == value
    pub fn eq(path: impl Into<String>, value: serde_json::Value) -> Condition {
        Condition::Eq {
            path: path.into(),
            value,
        }
    }

    /// Combine conditions with AND; a single condition is returned unchanged
    pub fn and(mut conditions: Vec<Condition>) -> Condition {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::And(conditions)
        }
    }

    /// Combine conditions with OR; a single condition is returned unchanged
    pub fn or(mut conditions: Vec<Condition>) -> Condition {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::Or(conditions)
        }
    }
}

/// Convert JSON value to its text form for comparison
pub fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}

/// Order two JSON values: numbers numerically, nulls first, everything else by text
pub fn compare_json_values(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value;

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        _ => json_value_to_string(a).cmp(&json_value_to_string(b)),
    }
}

// ============================================================================
// Filter Request
// ============================================================================

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    pub path: String,
    pub ascending: bool,
}

/// Executable request: condition, sort and paging over record paths
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Number of results to skip
    #[serde(default)]
    pub offset: i64,
    /// Maximum number of results to return; `None` returns every match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    /// Filter condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Sort directives, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortDirective>,
}

impl FilterRequest {
    /// Create an unfiltered, unpaged request
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Set pagination
    pub fn with_pagination(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Append a sort directive
    pub fn with_sort(mut self, path: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(SortDirective {
            path: path.into(),
            ascending,
        });
        self
    }
}

// ============================================================================
// Caller Criteria
// ============================================================================

/// Filter values and sort direction for one criterion name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub name: String,
    #[serde(default)]
    pub filter_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_ascending: Option<bool>,
}

/// Filter and sort criteria as submitted by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSortCriteria {
    /// Criteria in submission order (sort precedence follows this order)
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_result: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
}

impl FilterSortCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the criterion with this name
    pub fn entry(&mut self, name: &str) -> &mut Criterion {
        let index = match self.criteria.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.criteria.push(Criterion {
                    name: name.to_string(),
                    ..Criterion::default()
                });
                self.criteria.len() - 1
            }
        };
        &mut self.criteria[index]
    }

    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    /// Add a filter value
    pub fn filter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.entry(name).filter_values.push(value.into());
        self
    }

    /// Sort by the criterion
    pub fn sort(mut self, name: &str, ascending: bool) -> Self {
        self.entry(name).sort_ascending = Some(ascending);
        self
    }

    /// Set pagination
    pub fn paginate(mut self, first_result: i64, max_results: i64) -> Self {
        self.first_result = Some(first_result);
        self.max_results = Some(max_results);
        self
    }
}

// ============================================================================
// Mapping + Translation
// ============================================================================

/// How a criterion's filter values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// Values must parse as 64-bit integers
    LongEq,
    /// Values compare as text
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub path: String,
    pub kind: MappingKind,
}

/// Binds criterion names to record paths
#[derive(Debug, Clone, Default)]
pub struct CriteriaMapping {
    entries: Vec<(String, PathMapping)>,
}

impl CriteriaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a criterion name to an integer-equality filter on a path
    pub fn long_eq(self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.insert(name.into(), path.into(), MappingKind::LongEq)
    }

    /// Map a criterion name to a text-equality filter on a path
    pub fn text(self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.insert(name.into(), path.into(), MappingKind::Text)
    }

    fn insert(mut self, name: String, path: String, kind: MappingKind) -> Self {
        let mapping = PathMapping { path, kind };
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = mapping,
            None => self.entries.push((name, mapping)),
        }
        self
    }

    /// Mapping for a name; unmapped names are treated as text paths of the same name
    pub fn resolve(&self, name: &str) -> PathMapping {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.clone())
            .unwrap_or_else(|| PathMapping {
                path: name.to_string(),
                kind: MappingKind::Text,
            })
    }
}

/// Translate caller criteria into an executable request.
///
/// Criteria with several values become an OR of equalities; distinct criteria are
/// combined with AND. `default_limit` applies when the criteria carry no page size.
pub fn translate(
    criteria: &FilterSortCriteria,
    mapping: &CriteriaMapping,
    default_limit: Option<i64>,
) -> Result<FilterRequest> {
    let mut conditions = Vec::new();
    let mut request = FilterRequest::new();

    for criterion in &criteria.criteria {
        let target = mapping.resolve(&criterion.name);

        let mut alternatives = Vec::new();
        for raw in &criterion.filter_values {
            let value = match target.kind {
                MappingKind::LongEq => {
                    let id = IdValue::parse(Some(raw.as_str())).require(&criterion.name)?;
                    serde_json::Value::from(id)
                }
                MappingKind::Text => serde_json::Value::String(raw.clone()),
            };
            alternatives.push(condition_helpers::eq(target.path.clone(), value));
        }
        if !alternatives.is_empty() {
            conditions.push(condition_helpers::or(alternatives));
        }

        if let Some(ascending) = criterion.sort_ascending {
            request = request.with_sort(target.path, ascending);
        }
    }

    if !conditions.is_empty() {
        request.condition = Some(condition_helpers::and(conditions));
    }
    request.offset = criteria.first_result.unwrap_or(0).max(0);
    request.limit = criteria.max_results.or(default_limit);

    Ok(request)
}
