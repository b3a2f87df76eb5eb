use thiserror::Error;

/// Errors surfaced by checked singleton access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SingletonError {
  /// The instance a handle was issued for has been destroyed.
  ///
  /// The handle stays released even if the holder later creates a new
  /// instance; ask the holder for a fresh handle instead.
  #[error("singleton instance of `{type_name}` has been released")]
  Released { type_name: &'static str },

  /// The holder was retired and will not construct another instance.
  #[error("singleton holder for `{type_name}` is retired and cannot create an instance")]
  Retired { type_name: &'static str },
}

/// A specialized `Result` type for `fibre_singleton` operations.
pub type Result<T, E = SingletonError> = std::result::Result<T, E>;
