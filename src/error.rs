use crate::Str;

/// Result type used throughout the crate.
///
/// The error variant is the crate-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the campaign decision core.
///
/// Note that most failures in this crate do not become an `Error`: malformed
/// targeting data, missing context and lookup timeouts all degrade to "do not
/// show this campaign" (see the module documentation of
/// [`targeting`](crate::targeting) and [`resolver`](crate::resolver)).
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// An external lookup (geo, segmentation) failed. The failing collaborator
    /// is named in the message.
    #[error("{collaborator} lookup failed: {message}")]
    LookupFailed {
        /// Which collaborator failed (e.g., "geo", "segmentation").
        collaborator: &'static str,
        /// Human-readable failure description from the collaborator.
        message: Str,
    },
}

impl Error {
    /// Convenience constructor for collaborator implementations.
    pub fn lookup_failed(collaborator: &'static str, message: impl Into<Str>) -> Error {
        Error::LookupFailed {
            collaborator,
            message: message.into(),
        }
    }
}
