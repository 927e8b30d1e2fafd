//! Credential scrubbing for RPC endpoints and transport errors.
//!
//! Hosted RPC providers put API keys in the URL path, the query string or
//! userinfo. `reqwest` errors echo the full URL, so both endpoints and error
//! text pass through [`redact_secrets`] before they reach a log line.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Placeholder written in place of a credential.
pub const REDACTED: &str = "[REDACTED]";

/// How a matched credential is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// `scheme://user:pass@` keeps the scheme.
    Userinfo,
    /// `/v2/<key>` keeps the version segment.
    PathKey,
    /// `?apikey=<key>` keeps the parameter name.
    QueryParam,
    /// `Bearer <token>` is replaced whole.
    Bearer,
}

impl Rule {
    const fn pattern(self) -> &'static str {
        match self {
            Self::Userinfo => r"(?i)\b((?:https?|wss?)://)[^/\s:@]+:[^/\s@]+@",
            Self::PathKey => r"(/v[0-9]+/)[A-Za-z0-9_-]{16,}",
            Self::QueryParam => {
                r"(?i)([?&](?:api[_-]?key|apikey|key|token|access[_-]?token)=)[^&#\s]+"
            },
            Self::Bearer => r"(?i)\bbearer\s+[A-Za-z0-9_.=-]+",
        }
    }

    fn rewrite(self, caps: &Captures<'_>) -> String {
        match self {
            Self::Userinfo => format!("{}{REDACTED}@", &caps[1]),
            Self::PathKey | Self::QueryParam => format!("{}{REDACTED}", &caps[1]),
            Self::Bearer => REDACTED.to_string(),
        }
    }
}

static RULES: LazyLock<Vec<(Rule, Regex)>> = LazyLock::new(|| {
    [Rule::Userinfo, Rule::PathKey, Rule::QueryParam, Rule::Bearer]
        .into_iter()
        .filter_map(|rule| Regex::new(rule.pattern()).ok().map(|regex| (rule, regex)))
        .collect()
});

/// Replaces every embedded credential in `text`.
///
/// Borrows the input when nothing matched.
///
/// ```
/// use interactor_core::log::redact_secrets;
///
/// let output = redact_secrets("https://base-mainnet.g.alchemy.com/v2/abcdefghijklmnop1234");
/// assert_eq!(output, "https://base-mainnet.g.alchemy.com/v2/[REDACTED]");
/// ```
#[must_use]
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    RULES.iter().fold(Cow::Borrowed(text), |text, (rule, regex)| {
        if !regex.is_match(&text) {
            return text;
        }
        let rewritten = regex.replace_all(&text, |caps: &Captures<'_>| rule.rewrite(caps));
        Cow::Owned(rewritten.into_owned())
    })
}

/// Owned form of [`redact_secrets`] for `Debug` impls and log fields.
#[must_use]
pub fn redact_url(url: &str) -> String {
    redact_secrets(url).into_owned()
}
