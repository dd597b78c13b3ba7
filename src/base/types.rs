//! Common result types.

/// The error type used throughout the application.
pub type Err = anyhow::Error;
/// A result with the application error type.
pub type Res<T> = Result<T, Err>;
/// A result that carries no value.
pub type Void = Res<()>;
