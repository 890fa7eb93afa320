use crate::{binder, codegen, rewrites, usererror::UserError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("bind error: {0}")]
    Bind(#[from] binder::Error),
    #[error("rewrite error: {0}")]
    Rewrite(#[from] rewrites::Error),
    #[error("codegen error: {0}")]
    Codegen(#[from] codegen::Error),
}

/// The kind of a translation failure. None of them are retryable: the same
/// query fails the same way every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnresolvedField,
    UnsupportedOperator,
    UnsupportedQueryShape,
    AmbiguousArraySerialization,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Bind(binder::Error::UnresolvedField { .. }) => ErrorKind::UnresolvedField,
            Error::Bind(binder::Error::UnsupportedOperator { .. }) => {
                ErrorKind::UnsupportedOperator
            }
            Error::Bind(binder::Error::AmbiguousArraySerialization(_)) => {
                ErrorKind::AmbiguousArraySerialization
            }
            Error::Bind(binder::Error::UnsupportedQueryShape(_))
            | Error::Bind(binder::Error::UnknownType(_))
            | Error::Rewrite(_)
            | Error::Codegen(_) => ErrorKind::UnsupportedQueryShape,
        }
    }
}

impl UserError for Error {
    fn code(&self) -> u32 {
        match self {
            Error::Bind(e) => e.code(),
            Error::Rewrite(e) => e.code(),
            Error::Codegen(e) => e.code(),
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            Error::Bind(e) => e.user_message(),
            Error::Rewrite(e) => e.user_message(),
            Error::Codegen(e) => e.user_message(),
        }
    }

    fn technical_message(&self) -> String {
        match self {
            Error::Bind(e) => e.technical_message(),
            Error::Rewrite(e) => e.technical_message(),
            Error::Codegen(e) => e.technical_message(),
        }
    }
}
