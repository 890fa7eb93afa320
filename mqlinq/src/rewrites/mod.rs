use crate::usererror::UserError;
use thiserror::Error;

pub mod accumulators;
pub mod correlated_group;
pub mod skip_limit;

pub use accumulators::AccumulatorBinderPass;
pub use correlated_group::CorrelatedGroupRewritePass;


pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during rewrite passes
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("a grouping filtered by a predicate must be aggregated: {0}")]
    FilteredGroupingNotAggregated(String),
    #[error("a grouping cannot be nested inside an aggregate: {0}")]
    NestedGrouping(String),
    #[error("accumulator refers to a stage that is not a group: {0}")]
    AccumulatorWithoutGroup(String),
    #[error("duplicate output field: {0}")]
    DuplicateOutputField(String),
}

impl UserError for Error {
    fn code(&self) -> u32 {
        match self {
            Error::FilteredGroupingNotAggregated(_) => 2001,
            Error::NestedGrouping(_) => 2002,
            Error::AccumulatorWithoutGroup(_) => 2003,
            Error::DuplicateOutputField(_) => 2004,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            Error::FilteredGroupingNotAggregated(_) => Some(
                "A filtered group must be reduced with Count, Sum, Average, Min or Max."
                    .to_string(),
            ),
            Error::NestedGrouping(_) => {
                Some("Groups of groups cannot be expressed in one pipeline.".to_string())
            }
            Error::AccumulatorWithoutGroup(_) | Error::DuplicateOutputField(_) => None,
        }
    }

    fn technical_message(&self) -> String {
        self.to_string()
    }
}

/// A fallible transformation that can be applied to a pipeline
pub trait Pass<T> {
    fn apply(&self, pipeline: T) -> Result<T>;
}
