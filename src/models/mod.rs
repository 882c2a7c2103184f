//! Declarative metric definitions and their computed results.

pub mod metric;

pub use metric::{
    AggregationKind, CustomAggregationFn, GroupKeyFn, MetricDef, MetricMetadata, MetricResult,
    Predicate, ValueExtractorFn,
};
