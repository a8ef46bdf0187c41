//! View filters and the filter registry.
//!
//! A view's filter decides which records of its source table are visible in
//! the view. Filters are either native closures or declarative
//! [`FilterRule`]s, which can be read from configuration.

use crate::{error::Result, Error, Record, ViewName};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type PredicateFn = dyn Fn(&Record) -> std::result::Result<bool, String> + Send + Sync;

/// Inclusion predicate for a view.
#[derive(Clone)]
pub enum Filter {
    /// Native predicate. An `Err` means the predicate could not decide.
    Predicate(Arc<PredicateFn>),
    /// Declarative rule.
    Rule(FilterRule),
}

impl Filter {
    /// Wrap an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Filter::Predicate(Arc::new(move |record: &Record| Ok(predicate(record))))
    }

    /// Wrap a predicate that may fail to evaluate.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> std::result::Result<bool, String> + Send + Sync + 'static,
    {
        Filter::Predicate(Arc::new(predicate))
    }

    /// Evaluate the filter against a record.
    pub fn matches(&self, record: &Record) -> std::result::Result<bool, String> {
        match self {
            Filter::Predicate(predicate) => predicate(record),
            Filter::Rule(rule) => rule.evaluate(record),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Predicate(_) => f.write_str("Filter::Predicate(..)"),
            Filter::Rule(rule) => f.debug_tuple("Filter::Rule").field(rule).finish(),
        }
    }
}

impl From<FilterRule> for Filter {
    fn from(rule: FilterRule) -> Self {
        Filter::Rule(rule)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        FilterRule::deserialize(deserializer).map(Filter::Rule)
    }
}

/// Declarative filter, in the spirit of PostgREST operators.
///
/// Fields missing from a record read as `null`. Ordering and pattern
/// operators never match `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterRule {
    Eq { field: String, value: Value },
    Neq { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    /// SQL `LIKE`: `%` matches any run, `_` one character, `\` escapes.
    Like { field: String, pattern: String },
    /// Case-insensitive `LIKE`.
    Ilike { field: String, pattern: String },
    In { field: String, values: Vec<Value> },
    IsNull { field: String },
    NotNull { field: String },
    All { rules: Vec<FilterRule> },
    Any { rules: Vec<FilterRule> },
    Not { rule: Box<FilterRule> },
}

impl FilterRule {
    /// Check the rule is well formed.
    pub fn validate(&self) -> Result<()> {
        match self {
            FilterRule::Eq { field, .. }
            | FilterRule::Neq { field, .. }
            | FilterRule::Gt { field, .. }
            | FilterRule::Gte { field, .. }
            | FilterRule::Lt { field, .. }
            | FilterRule::Lte { field, .. }
            | FilterRule::In { field, .. }
            | FilterRule::IsNull { field }
            | FilterRule::NotNull { field } => check_field(field),
            FilterRule::Like { field, pattern } | FilterRule::Ilike { field, pattern } => {
                check_field(field)?;
                if pattern.ends_with('\\') && !pattern.ends_with("\\\\") {
                    return Err(Error::InvalidFilter(format!(
                        "pattern '{pattern}' ends with a dangling escape"
                    )));
                }
                Ok(())
            }
            FilterRule::All { rules } | FilterRule::Any { rules } => {
                rules.iter().try_for_each(FilterRule::validate)
            }
            FilterRule::Not { rule } => rule.validate(),
        }
    }

    /// Evaluate the rule against a record.
    pub fn evaluate(&self, record: &Record) -> std::result::Result<bool, String> {
        match self {
            FilterRule::Eq { field, value } => Ok(values_equal(lookup(record, field), value)),
            FilterRule::Neq { field, value } => Ok(!values_equal(lookup(record, field), value)),
            FilterRule::Gt { field, value } => {
                ordered(record, field, value, |o| o == Ordering::Greater)
            }
            FilterRule::Gte { field, value } => {
                ordered(record, field, value, |o| o != Ordering::Less)
            }
            FilterRule::Lt { field, value } => ordered(record, field, value, |o| o == Ordering::Less),
            FilterRule::Lte { field, value } => {
                ordered(record, field, value, |o| o != Ordering::Greater)
            }
            FilterRule::Like { field, pattern } => pattern_match(record, field, pattern, false),
            FilterRule::Ilike { field, pattern } => pattern_match(record, field, pattern, true),
            FilterRule::In { field, values } => {
                let found = lookup(record, field);
                Ok(values.iter().any(|v| values_equal(found, v)))
            }
            FilterRule::IsNull { field } => Ok(lookup(record, field).is_null()),
            FilterRule::NotNull { field } => Ok(!lookup(record, field).is_null()),
            FilterRule::All { rules } => {
                for rule in rules {
                    if !rule.evaluate(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterRule::Any { rules } => {
                for rule in rules {
                    if rule.evaluate(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            FilterRule::Not { rule } => rule.evaluate(record).map(|matched| !matched),
        }
    }
}

fn check_field(field: &str) -> Result<()> {
    if field.is_empty() {
        return Err(Error::InvalidFilter("field name is empty".to_string()));
    }
    Ok(())
}

fn lookup<'a>(record: &'a Record, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn ordered(
    record: &Record,
    field: &str,
    value: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> std::result::Result<bool, String> {
    let found = lookup(record, field);
    let ordering = match (found, value) {
        (Value::Null, _) => return Ok(false),
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    };

    ordering.map(accept).ok_or_else(|| {
        format!(
            "cannot order field '{field}' ({}) against {}",
            type_name(found),
            type_name(value)
        )
    })
}

fn pattern_match(
    record: &Record,
    field: &str,
    pattern: &str,
    case_insensitive: bool,
) -> std::result::Result<bool, String> {
    match lookup(record, field) {
        Value::Null => Ok(false),
        Value::String(text) if case_insensitive => {
            Ok(like(&text.to_lowercase(), &pattern.to_lowercase()))
        }
        Value::String(text) => Ok(like(text, pattern)),
        other => Err(format!(
            "cannot pattern-match field '{field}' of type {}",
            type_name(other)
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    AnyRun,
    AnyOne,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::AnyRun,
            '_' => Token::AnyOne,
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            c => Token::Literal(c),
        });
    }
    tokens
}

/// SQL `LIKE` matcher, greedy with single backtrack point.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let tokens = tokenize(pattern);

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match tokens.get(p) {
            Some(Token::AnyRun) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(Token::AnyOne) => {
                t += 1;
                p += 1;
            }
            Some(Token::Literal(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    tokens[p..].iter().all(|token| *token == Token::AnyRun)
}

/// Filters by view name. A view mapped to `None` accepts every record.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<ViewName, Option<Filter>>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// Register (or replace) the filter of a view.
    pub fn register(&mut self, view: impl Into<ViewName>, filter: Option<Filter>) {
        self.filters.insert(view.into(), filter);
    }

    /// The filter of a view, if it has one.
    pub fn get(&self, view: &str) -> Option<&Filter> {
        self.filters.get(view).and_then(Option::as_ref)
    }

    /// Whether the view has an entry (filtered or not).
    pub fn contains(&self, view: &str) -> bool {
        self.filters.contains_key(view)
    }

    /// Decide whether a record belongs in a view.
    pub fn admits(&self, view: &str, record: &Record) -> Result<bool> {
        match self.get(view) {
            None => Ok(true),
            Some(filter) => filter
                .matches(record)
                .map_err(|reason| Error::FilterEvaluation {
                    view: view.to_string(),
                    reason,
                }),
        }
    }

    /// Number of registered views.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if no view is registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
