//! Environment configuration

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Bearer token for the GitHub API. Without one, requests run against
    /// the much smaller anonymous quota.
    pub github_token: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("GITHUB_TOKEN").ok(),
            std::env::var("LOG_FORMAT").ok(),
        )
    }

    fn from_vars(github_token: Option<String>, log_format: Option<String>) -> Self {
        let github_token = github_token.filter(|t| !t.is_empty());
        let log_format = match log_format.as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") | None => LogFormat::Text,
            Some(other) => {
                warn!(format = other, "unknown LOG_FORMAT, using text");
                LogFormat::Text
            }
        };
        Self {
            github_token,
            log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_token_is_treated_as_absent() {
        let config = Config::from_vars(Some(String::new()), None);
        assert!(config.github_token.is_none());
    }

    #[rstest]
    #[case(None, LogFormat::Text)]
    #[case(Some("text"), LogFormat::Text)]
    #[case(Some("json"), LogFormat::Json)]
    #[case(Some("yaml"), LogFormat::Text)]
    fn log_format_parsing(#[case] value: Option<&str>, #[case] expected: LogFormat) {
        let config = Config::from_vars(None, value.map(str::to_string));
        assert_eq!(config.log_format, expected);
    }
}
