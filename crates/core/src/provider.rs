//! The closed set of hosting providers.

use serde::{Deserialize, Serialize};

/// A hosting provider Slipway can publish to.
///
/// The set is closed: adding a provider means adding a variant here and an
/// adapter implementing it, wired in at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// netlify.com -- zip-based directory deploys.
    Netlify,
    /// vercel.com -- file-manifest deploys with status polling.
    Vercel,
}

impl ProviderKind {
    /// All provider kinds, in adapter registration order.
    pub const ALL: [Self; 2] = [Self::Netlify, Self::Vercel];

    /// The lowercase wire name of this provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Netlify => "netlify",
            Self::Vercel => "vercel",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netlify" => Ok(Self::Netlify),
            "vercel" => Ok(Self::Vercel),
            other => Err(crate::Error::validation(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_roundtrip() {
        for kind in ProviderKind::ALL {
            let parsed: ProviderKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        let parsed: ProviderKind = "Netlify".parse().unwrap();
        assert_eq!(parsed, ProviderKind::Netlify);
    }

    #[test]
    fn parse_unknown_fails() {
        assert!("amplify".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::Vercel).unwrap(),
            "\"vercel\""
        );
    }
}
