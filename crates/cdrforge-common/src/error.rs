use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdrForgeError {
    #[error("[{target}] structure {structure_id} could not be fetched: {reason}")]
    Fetch {
        target: String,
        structure_id: String,
        reason: String,
    },

    #[error(
        "[{target}] no generation API credential configured \
         (set generation.api_key in cdrforge.toml or export CDRFORGE_API_KEY)"
    )]
    Authentication { target: String },

    #[error("[{target}] variant generation failed: {reason}")]
    Generation { target: String, reason: String },

    #[error("[{target}] structure could not be parsed: {reason}")]
    Parse { target: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sandbox policy violation: {0}")]
    Security(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdrForgeError {
    /// A missing credential stops the whole run; every other failure only
    /// drops the target it names.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, CdrForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_scoped_errors_name_their_target() {
        let err = CdrForgeError::Fetch {
            target: "EGFR".to_string(),
            structure_id: "1YY9".to_string(),
            reason: "404 Not Found".to_string(),
        };
        assert!(err.to_string().contains("[EGFR]"));
        assert!(err.to_string().contains("1YY9"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_authentication_is_fatal_and_actionable() {
        let err = CdrForgeError::Authentication { target: "PDL1".to_string() };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("CDRFORGE_API_KEY"));
    }

    #[test]
    fn test_config_errors_are_fatal() {
        let err = CdrForgeError::Config("variant_count must be positive".to_string());
        assert!(err.is_fatal());
        assert!(!CdrForgeError::Security("denied".to_string()).is_fatal());
    }
}
