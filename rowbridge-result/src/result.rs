use crate::error::Error;

/// Result alias used by every rowbridge crate.
pub type Result<T> = std::result::Result<T, Error>;
