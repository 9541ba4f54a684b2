// Error types for talking to the NAS.

use std::fmt;

use thiserror::Error;

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the client.
#[derive(Error, Debug)]
pub enum Error {
    /// The NAS could not be reached or the connection broke mid-request.
    #[error("network error")]
    Network(#[from] reqwest::Error),

    /// The response was not a well-formed API envelope.
    #[error("unexpected response from NAS: {0}")]
    Protocol(String),

    /// Login or logout was rejected or could not be performed.
    #[error("{stage} failed")]
    Auth {
        /// Which half of the session lifecycle failed.
        stage: AuthStage,
        /// The underlying transport or API failure.
        #[source]
        source: Box<Error>,
    },

    /// The NAS answered with `success: false`.
    #[error("API error {code}{}", code_suffix(.code))]
    Api {
        /// Error code reported by the NAS, passed through untouched.
        code: i64,
    },

    /// The batch manifest could not be decoded.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A local value was missing or malformed before any request was made.
    #[error("{field} {reason}")]
    Validation {
        /// Name of the offending value.
        field: String,
        reason: String,
    },

    /// A batch unlock stopped at a failing entry.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The command failed and the logout that followed failed as well.
    #[error("{}; additionally, {}", .primary.report(), .logout.report())]
    Teardown {
        /// Error of the requested command.
        primary: Box<Error>,
        /// Error of the logout attempted afterwards.
        logout: Box<Error>,
    },

    /// Reading local input (password, manifest) failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// `login` was called while a session was already open.
    #[error("a session is already active")]
    SessionActive,
}

impl Error {
    /// Shorthand for a [`Error::Validation`] on an empty `field`.
    pub fn validation(field: impl Into<String>) -> Self {
        Self::invalid(field, "must not be empty")
    }

    /// A [`Error::Validation`] on `field` with a custom `reason`.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the NAS error code carried by this error, looking through
    /// auth and batch wrappers.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code } => Some(*code),
            Self::Auth { source, .. } => source.api_code(),
            Self::Batch(batch) => batch.source.api_code(),
            _ => None,
        }
    }

    /// This error followed by each of its causes, joined with `: `.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = std::error::Error::source(err);
        }
        out
    }
}

/// Half of the session lifecycle an [`Error::Auth`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Login,
    Logout,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => f.write_str("login"),
            Self::Logout => f.write_str("logout"),
        }
    }
}

/// Kind of defect found in a batch manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestErrorKind {
    /// Invalid JSON syntax.
    Syntax,
    /// Valid JSON of the wrong shape, e.g. a missing field or wrong type.
    Data,
    /// The document ended early.
    Eof,
    /// Reading the input failed.
    Io,
}

/// A batch manifest that could not be decoded, with the defect's location.
#[derive(Error, Debug)]
#[error("invalid batch manifest at line {line}, column {column}: {message}")]
pub struct ManifestError {
    pub kind: ManifestErrorKind,
    /// 1-based line of the defect (0 for I/O failures).
    pub line: usize,
    /// 1-based column of the defect (0 for I/O failures).
    pub column: usize,
    pub message: String,
}

impl From<serde_json::Error> for ManifestError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        let kind = match err.classify() {
            Category::Syntax => ManifestErrorKind::Syntax,
            Category::Data => ManifestErrorKind::Data,
            Category::Eof => ManifestErrorKind::Eof,
            Category::Io => ManifestErrorKind::Io,
        };
        Self {
            kind,
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// The entry at which a batch unlock stopped.
#[derive(Error, Debug)]
#[error("unlocking share '{share}' (entry {index}) failed, aborting")]
pub struct BatchError {
    /// 0-based position of the failing entry in the manifest.
    pub index: usize,
    pub share: String,
    #[source]
    pub source: Box<Error>,
}

fn code_suffix(code: &i64) -> String {
    describe_code(*code)
        .map(|text| format!(" ({text})"))
        .unwrap_or_default()
}

/// Human readable text for the DSM error codes we know about.
pub fn describe_code(code: i64) -> Option<&'static str> {
    let text = match code {
        100 => "unknown error",
        101 => "invalid parameter",
        102 => "requested API does not exist",
        103 => "requested method does not exist",
        104 => "requested version does not support the functionality",
        105 => "insufficient user privilege",
        106 => "session timeout",
        107 => "session interrupted by duplicate login",
        119 => "session id not found",
        400 => "no such account or incorrect password",
        401 => "account disabled",
        402 => "permission denied",
        403 => "2-step verification code required",
        404 => "failed to authenticate 2-step verification code",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_mentions_known_code() {
        let err = Error::Api { code: 105 };
        assert_eq!(err.to_string(), "API error 105 (insufficient user privilege)");

        let err = Error::Api { code: 3301 };
        assert_eq!(err.to_string(), "API error 3301");
    }

    #[test]
    fn api_code_looks_through_wrappers() {
        let err = Error::Auth {
            stage: AuthStage::Login,
            source: Box::new(Error::Api { code: 400 }),
        };
        assert_eq!(err.api_code(), Some(400));
        assert_eq!(err.to_string(), "login failed");
        assert_eq!(
            err.report(),
            "login failed: API error 400 (no such account or incorrect password)"
        );

        let err = Error::Batch(BatchError {
            index: 2,
            share: "media".into(),
            source: Box::new(Error::Api { code: 3303 }),
        });
        assert_eq!(err.api_code(), Some(3303));
        assert_eq!(
            err.report(),
            "unlocking share 'media' (entry 2) failed, aborting: API error 3303"
        );
    }

    #[test]
    fn teardown_reports_both_chains() {
        let err = Error::Teardown {
            primary: Box::new(Error::Api { code: 3301 }),
            logout: Box::new(Error::Auth {
                stage: AuthStage::Logout,
                source: Box::new(Error::Protocol("HTTP status 502".into())),
            }),
        };
        assert_eq!(
            err.to_string(),
            "API error 3301; additionally, logout failed: unexpected response from NAS: HTTP status 502"
        );
    }

    #[test]
    fn manifest_error_keeps_location() {
        let err = serde_json::from_str::<Vec<String>>("[\"a\",\n  ").unwrap_err();
        let err = ManifestError::from(err);
        assert_eq!(err.kind, ManifestErrorKind::Eof);
        assert_eq!(err.line, 2);
    }
}
