//! URL redaction for log lines.

/// Rewrites a URL before it is logged or attached to an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Redactor {
    /// Leave the URL unchanged.
    #[default]
    Identity,
    /// Replace each secret with `[REDACTED]` plus its last three characters.
    Secrets(Vec<String>),
    /// Replace the whole URL.
    Whole,
}

impl Redactor {
    /// Builds a redactor hiding every non-empty secret.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        if secrets.is_empty() {
            Redactor::Identity
        } else {
            Redactor::Secrets(secrets)
        }
    }

    /// Redactor that hides the entire URL.
    pub fn whole() -> Self {
        Redactor::Whole
    }

    /// Applies the redaction to `url`.
    pub fn apply(&self, url: &str) -> String {
        match self {
            Redactor::Identity => url.to_string(),
            Redactor::Whole => "[REDACTED_URL]".to_string(),
            Redactor::Secrets(secrets) => secrets.iter().fold(url.to_string(), |acc, secret| {
                acc.replace(secret.as_str(), &format!("[REDACTED]{}", last_three(secret)))
            }),
        }
    }
}

fn last_three(secret: &str) -> &str {
    let start = secret
        .char_indices()
        .rev()
        .nth(2)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &secret[start..]
}
