//! Gene filtering ahead of normalization

mod expression;

pub use expression::{filter_by_expression, FilterParams, FilteredCounts};
