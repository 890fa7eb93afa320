//! Binds a host query model to the pipeline IR. Top-level clauses fold into
//! stages; calls inside expressions bind against in-document arrays or
//! groupings and produce expression nodes.

use crate::{
    ir::PipelineExpression,
    query::{MethodCall, QueryModel},
    usererror::UserError,
};
use thiserror::Error;
use tracing::debug;

mod context;
pub use context::BindingContext;
mod dispatch;
mod embedded;
mod grouping;
pub mod registry;
mod stages;

#[cfg(test)]
mod test;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("member {member} has no serialized representation in {expression}")]
    UnresolvedField { member: String, expression: String },
    #[error("{declaring_type}.{operator} is not supported: {expression}")]
    UnsupportedOperator {
        operator: String,
        declaring_type: String,
        expression: String,
    },
    #[error("unsupported query shape: {0}")]
    UnsupportedQueryShape(String),
    #[error("the item serializer of array {0} cannot be determined")]
    AmbiguousArraySerialization(String),
    #[error("no codec is registered for type {0}")]
    UnknownType(String),
}

impl Error {
    pub(crate) fn shape(at: impl ToString) -> Self {
        Error::UnsupportedQueryShape(at.to_string())
    }
}

impl UserError for Error {
    fn code(&self) -> u32 {
        match self {
            Error::UnresolvedField { .. } => 1001,
            Error::UnsupportedOperator { .. } => 1002,
            Error::UnsupportedQueryShape(_) => 1003,
            Error::AmbiguousArraySerialization(_) => 1004,
            Error::UnknownType(_) => 1005,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            Error::UnresolvedField { member, .. } => Some(format!(
                "Member `{member}` is not serialized, so it cannot be used in a query."
            )),
            Error::UnsupportedOperator {
                operator,
                declaring_type,
                ..
            } => Some(format!(
                "The `{operator}` method of `{declaring_type}` cannot be translated."
            )),
            Error::UnsupportedQueryShape(_) => None,
            Error::AmbiguousArraySerialization(_) => None,
            Error::UnknownType(t) => Some(format!("Register a class map for `{t}`.")),
        }
    }

    fn technical_message(&self) -> String {
        self.to_string()
    }
}

/// Folds the clauses of a query into a pipeline. A result operator must be
/// the last clause.
pub fn bind_query(cx: &mut BindingContext, model: &QueryModel) -> Result<PipelineExpression> {
    let item_type = &model.source.item_type;
    let root = cx
        .codecs()
        .lookup(item_type)
        .ok_or_else(|| Error::UnknownType(item_type.to_string()))?;

    let mut pipeline = PipelineExpression::new(root);
    let mut result_operator: Option<&MethodCall> = None;
    for clause in model.clauses.iter() {
        if let Some(terminal) = result_operator {
            return Err(Error::shape(format!("{clause} after {terminal}")));
        }
        let kind = cx.operators().lookup(clause)?;
        debug!(operator = %clause.method, ?kind, "binding clause");
        pipeline = match dispatch::bind_operator(cx, pipeline, kind, clause)? {
            dispatch::Step::Sequence(p) => p,
            dispatch::Step::Terminal(p) => {
                result_operator = Some(clause);
                p
            }
        };
    }
    Ok(pipeline)
}
