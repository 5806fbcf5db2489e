//! Query plans: parsed lookups, ordered filter/exclude steps, ordering and
//! windowing. Built by the query layer, consumed by [`crate::SyncStore`]
//! implementations.

use crate::value::Value;

/// Comparison operator parsed from a `field__lookup` key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    EndsWith,
    IsNull,
    Regex,
}

impl Lookup {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "exact" => Some(Self::Exact),
            "iexact" => Some(Self::IExact),
            "contains" => Some(Self::Contains),
            "icontains" => Some(Self::IContains),
            "in" => Some(Self::In),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            "isnull" => Some(Self::IsNull),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }
}

/// One parsed filter condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub field: String,
    pub lookup: Lookup,
    pub value: Value,
}

impl Cond {
    /// Build a condition from a keyword-style key.
    ///
    /// The segment after the last `__` selects the lookup; a key without a
    /// recognized suffix is an exact match on the whole key.
    #[must_use]
    pub fn parse(key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Some((field, suffix)) = key.rsplit_once("__") {
            if let Some(lookup) = Lookup::from_suffix(suffix) {
                return Self {
                    field: field.to_string(),
                    lookup,
                    value,
                };
            }
        }
        Self {
            field: key.to_string(),
            lookup: Lookup::Exact,
            value,
        }
    }

    /// An exact-match condition.
    #[must_use]
    pub fn exact(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            lookup: Lookup::Exact,
            value: value.into(),
        }
    }
}

/// One ordering key, parsed from Django-style `-field` notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub descending: bool,
}

impl OrderKey {
    #[must_use]
    pub fn parse(key: &str) -> Self {
        key.strip_prefix('-').map_or_else(
            || Self {
                field: key.to_string(),
                descending: false,
            },
            |field| Self {
                field: field.to_string(),
                descending: true,
            },
        )
    }
}

/// One step of a composed selection, applied left to right.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Keep rows matching all conditions.
    Filter(Vec<Cond>),
    /// Drop rows matching all conditions.
    Exclude(Vec<Cond>),
}

/// A full selection: steps, ordering, dedup, and a result window.
///
/// The related hints are advisory: an engine that can batch-load relations
/// uses them, the in-memory engine ignores them. They never change which
/// rows a plan selects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectPlan {
    pub steps: Vec<PlanStep>,
    pub order_by: Vec<OrderKey>,
    pub distinct: bool,
    /// To-one relations to resolve eagerly alongside the rows.
    pub select_related: Vec<String>,
    /// To-many relations to batch-load after the rows.
    pub prefetch_related: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SelectPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, conds: Vec<Cond>) -> Self {
        self.steps.push(PlanStep::Filter(conds));
        self
    }

    #[must_use]
    pub fn exclude(mut self, conds: Vec<Cond>) -> Self {
        self.steps.push(PlanStep::Exclude(conds));
        self
    }

    /// Replace the ordering. A later call wins over an earlier one.
    #[must_use]
    pub fn order_by(mut self, keys: Vec<OrderKey>) -> Self {
        self.order_by = keys;
        self
    }

    #[must_use]
    pub fn window(mut self, limit: Option<usize>, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}
