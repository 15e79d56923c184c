//! Aggregation pipelines for document stores
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Each stage consumes the
//! records produced by the previous one; the first stage reads the model's
//! collection. Stores that implement
//! [`AggregateStore`](super::traits::AggregateStore) execute pipelines and
//! return the materialized rows.
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{Accumulator, Filter, GroupSpec, Pipeline, Projection};
//!
//! let pipeline = Pipeline::new()
//!     .matching(Filter::new().eq("active", true))
//!     .project(vec![Projection::new("text"), Projection::aliased("score", "points")])
//!     .group(GroupSpec::by(["text"]).with(Accumulator::sum("points", "total")))
//!     .limit(5);
//!
//! assert_eq!(pipeline.stages().len(), 4);
//! ```

use super::query::Filter;

/// One field of a projection stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Source field (dot-separated for nested fields)
    pub field: String,
    /// Output name, defaults to the field itself
    pub alias: Option<String>,
}

impl Projection {
    /// Keep a field under its own name
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: None,
        }
    }

    /// Keep a field under another name
    pub fn aliased(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: Some(alias.into()),
        }
    }
}

/// Aggregate function applied per group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorFn {
    /// Number of records in the group
    Count,
    /// Sum of a numeric field
    Sum,
    /// Arithmetic mean of a numeric field
    Avg,
    /// Smallest value of a field
    Min,
    /// Largest value of a field
    Max,
}

/// Named aggregate output of a group stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    /// Output name
    pub alias: String,
    /// Function to apply
    pub function: AccumulatorFn,
    /// Input field; unused by [`AccumulatorFn::Count`]
    pub field: Option<String>,
}

impl Accumulator {
    /// Count records per group
    pub fn count(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            function: AccumulatorFn::Count,
            field: None,
        }
    }

    /// Sum `field` per group
    pub fn sum(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::over(AccumulatorFn::Sum, field, alias)
    }

    /// Average `field` per group
    pub fn avg(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::over(AccumulatorFn::Avg, field, alias)
    }

    /// Minimum of `field` per group
    pub fn min(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::over(AccumulatorFn::Min, field, alias)
    }

    /// Maximum of `field` per group
    pub fn max(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::over(AccumulatorFn::Max, field, alias)
    }

    fn over(function: AccumulatorFn, field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            function,
            field: Some(field.into()),
        }
    }
}

/// Grouping keys plus the aggregates computed for each group
///
/// No keys means a single group over every input record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSpec {
    /// Fields whose combined value identifies a group
    pub keys: Vec<String>,
    /// Aggregates to compute
    pub accumulators: Vec<Accumulator>,
}

impl GroupSpec {
    /// Group by the given keys
    pub fn by<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            accumulators: Vec::new(),
        }
    }

    /// One group over everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an aggregate output
    #[must_use]
    pub fn with(mut self, accumulator: Accumulator) -> Self {
        self.accumulators.push(accumulator);
        self
    }

    /// Whether the stage would do nothing
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.accumulators.is_empty()
    }
}

/// One step of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep records matching the filter
    Match(Filter),
    /// Reshape records to the listed fields
    Project(Vec<Projection>),
    /// Collapse records into groups
    Group(GroupSpec),
    /// Keep at most this many records
    Limit(u64),
    /// Replace the records with a single `{alias: count}` row
    Count(String),
}

/// Ordered aggregation stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Empty pipeline (returns the raw collection)
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard match, project, group, limit pipeline
    ///
    /// Each stage is included only when it is non-empty, in that order; a
    /// zero limit is treated as no limit.
    pub fn from_parts(
        matching: Filter,
        project: Vec<Projection>,
        group: Option<GroupSpec>,
        limit: u64,
    ) -> Self {
        let mut pipeline = Self::new().matching(matching).project(project);
        if let Some(group) = group {
            pipeline = pipeline.group(group);
        }
        pipeline.limit(limit)
    }

    /// Count records matching `filter`
    pub fn count_matching(filter: Filter, alias: impl Into<String>) -> Self {
        let mut pipeline = Self::new().matching(filter);
        pipeline.stages.push(Stage::Count(alias.into()));
        pipeline
    }

    /// Append a match stage (skipped for an empty filter)
    #[must_use]
    pub fn matching(mut self, filter: Filter) -> Self {
        if !filter.is_empty() {
            self.stages.push(Stage::Match(filter));
        }
        self
    }

    /// Append a projection stage (skipped when no fields are listed)
    #[must_use]
    pub fn project(mut self, fields: Vec<Projection>) -> Self {
        if !fields.is_empty() {
            self.stages.push(Stage::Project(fields));
        }
        self
    }

    /// Append a group stage (skipped when it has no keys and no aggregates)
    #[must_use]
    pub fn group(mut self, group: GroupSpec) -> Self {
        if !group.is_empty() {
            self.stages.push(Stage::Group(group));
        }
        self
    }

    /// Append a limit stage (skipped for zero)
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        if limit > 0 {
            self.stages.push(Stage::Limit(limit));
        }
        self
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Whether the pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_skips_empty_stages() {
        let pipeline = Pipeline::from_parts(Filter::new(), vec![], None, 0);
        assert!(pipeline.is_empty());

        let pipeline = Pipeline::from_parts(Filter::new(), vec![], Some(GroupSpec::all()), 3);
        assert_eq!(pipeline.stages(), &[Stage::Limit(3)]);
    }

    #[test]
    fn test_from_parts_orders_stages() {
        let pipeline = Pipeline::from_parts(
            Filter::new().eq("username", "User 1"),
            vec![Projection::new("text")],
            Some(GroupSpec::by(["text"]).with(Accumulator::count("number"))),
            10,
        );

        let kinds: Vec<_> = pipeline
            .stages()
            .iter()
            .map(|stage| match stage {
                Stage::Match(_) => "match",
                Stage::Project(_) => "project",
                Stage::Group(_) => "group",
                Stage::Limit(_) => "limit",
                Stage::Count(_) => "count",
            })
            .collect();
        assert_eq!(kinds, vec!["match", "project", "group", "limit"]);
    }

    #[test]
    fn test_count_matching() {
        let pipeline = Pipeline::count_matching(Filter::new().eq("a", 1), "number");
        assert_eq!(pipeline.stages().len(), 2);
        assert_eq!(pipeline.stages()[1], Stage::Count("number".to_string()));
    }

    #[test]
    fn test_accumulator_constructors() {
        assert_eq!(Accumulator::count("n").field, None);
        let avg = Accumulator::avg("score", "mean_score");
        assert_eq!(avg.function, AccumulatorFn::Avg);
        assert_eq!(avg.field.as_deref(), Some("score"));
    }
}
