//! Finishes a bound pipeline and serializes it to aggregation stage
//! documents.

use crate::{
    codec::OutputCodec,
    ir::{Expression, FinishedPipeline, PipelineExpression, Stage},
    usererror::UserError,
};
use thiserror::Error;

mod expressions;
mod match_query;
mod stages;

#[cfg(test)]
mod test;

/// The field a scalar projection is stored under.
pub const VALUE_FIELD: &str = "_v";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("accumulator {0} is not attached to a group")]
    UnattachedAccumulator(String),
    #[error("a grouping cannot be emitted as a value: {0}")]
    UnresolvedGrouping(String),
    #[error("variable {0} is referenced outside of its sub-query")]
    UnboundVariable(String),
    #[error("sort key must be a field of the current document: {0}")]
    InvalidSortKey(String),
}

impl UserError for Error {
    fn code(&self) -> u32 {
        match self {
            Error::UnattachedAccumulator(_) => 4001,
            Error::UnresolvedGrouping(_) => 4002,
            Error::UnboundVariable(_) => 4003,
            Error::InvalidSortKey(_) => 4004,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            Error::InvalidSortKey(_) => {
                Some("Sort by a member of the document, not a computed value.".to_string())
            }
            Error::UnattachedAccumulator(_)
            | Error::UnresolvedGrouping(_)
            | Error::UnboundVariable(_) => None,
        }
    }

    fn technical_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MqlCodeGenerator {
    pub match_language: bool,
}

impl MqlCodeGenerator {
    pub fn new(match_language: bool) -> Self {
        MqlCodeGenerator { match_language }
    }

    pub fn codegen_pipeline(&self, stages: &[Stage]) -> Result<Vec<bson::Document>> {
        stages.iter().map(|s| self.codegen_stage(s)).collect()
    }
}

/// Flushes pending paging, appends the final projection unless rows are
/// already whole documents, and derives how output rows are decoded.
pub fn finish_pipeline(pipeline: PipelineExpression) -> FinishedPipeline {
    let result_operator = pipeline.result_operator.as_ref().map(|r| r.kind);
    let pipeline = pipeline.flush_paging();
    let mut stages = pipeline.stages;
    let projector = pipeline.projector;
    let output = match &projector {
        Expression::Field(f) if f.path.is_root() => OutputCodec::Document(f.codec.clone()),
        Expression::Document(d) => OutputCodec::Document(d.codec()),
        other => OutputCodec::Value {
            field: VALUE_FIELD.to_string(),
            codec: other.codec(),
        },
    };
    if !projector.is_root() {
        stages.push(Stage::Project(projector));
    }
    FinishedPipeline {
        stages,
        output,
        result_operator,
    }
}
