use thiserror::Error;

use crate::parser::ParseError;
use crate::tree::TreeError;

/// The file does not have the shape the presenter convention promises.
///
/// Always detected before the tree is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructuralViolation {
    #[error("`{property}` is not initialized with an object literal")]
    MissingObjectLiteral { property: String },
    #[error("the object literal assigned to `{property}` has no body")]
    MissingBody { property: String },
    #[error("the proxy object body has no closing brace to insert before")]
    MissingClosingBrace,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocateError {
    #[error("no top-level class whose name contains \"{marker}\"")]
    NoPresenterClass { marker: String },
    #[error("class `{class}` has no `{property}` property")]
    NoProxyProperty { class: String, property: String },
    #[error(transparent)]
    Structural(#[from] StructuralViolation),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactoryError {
    #[error("failed to parse generated member `{source_text}`: {error}")]
    Parse { source_text: String, error: ParseError },
    #[error("generated member `{source_text}` is not a property declaration")]
    NotAProperty { source_text: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("the caret is not on a property of a `State` class")]
    NotApplicable,
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl From<StructuralViolation> for SyncError {
    fn from(violation: StructuralViolation) -> Self {
        SyncError::Locate(LocateError::Structural(violation))
    }
}

impl SyncError {
    /// Failures the host should surface as a broken file rather than ignore.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SyncError::Locate(LocateError::Structural(_)) | SyncError::Tree(_)
        )
    }
}
