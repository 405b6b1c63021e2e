//! Shared error utilities used across the compilation pipeline.
//!
//! All errors are fatal: the first diagnostic terminates compilation, and
//! there are no warnings. The driver prefixes messages with the program and
//! source names, so errors here carry only the source position and the
//! message body. Environment and I/O failures never reach this type; the
//! driver reports those itself.

use snafu::Snafu;

use crate::token::SourcePos;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// A diagnostic pinned to a source position.
  #[snafu(display("{pos}: {message}"))]
  AtPosition { pos: SourcePos, message: String },
}

impl CompileError {
  /// Construct an error anchored at a source position.
  pub fn at(pos: SourcePos, message: impl Into<String>) -> Self {
    Self::AtPosition {
      pos,
      message: message.into(),
    }
  }

  /// The position the diagnostic points at.
  pub fn pos(&self) -> SourcePos {
    match self {
      Self::AtPosition { pos, .. } => *pos,
    }
  }
}
