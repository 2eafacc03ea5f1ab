use thiserror::Error;

/// Errors raised while configuring or applying request authentication.
///
/// Secret values never appear in the rendered messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The options passed to `authenticate` could not be interpreted
    /// (unknown `type`, wrong field shapes).
    #[error("invalid authentication options: {0}")]
    InvalidOptions(String),

    /// A scheme was selected but one of its required credentials is empty.
    #[error("{scheme} authentication requires {field} to be set")]
    MissingCredential {
        scheme: &'static str,
        field: &'static str,
    },

    /// The signature could not be computed.
    #[error("failed to sign request: {0}")]
    Signing(String),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_renders() {
        let e = AuthError::MissingCredential {
            scheme: "basic",
            field: "password",
        };
        assert_eq!(
            e.to_string(),
            "basic authentication requires password to be set"
        );
    }

    #[test]
    fn invalid_options_renders() {
        let e = AuthError::InvalidOptions("unknown variant `digest`".into());
        assert!(e.to_string().starts_with("invalid authentication options"));
    }
}
