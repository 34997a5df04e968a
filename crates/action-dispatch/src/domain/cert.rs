//! # Certificate Hostname Validation
//!
//! A pure check of the broker's TLS certificate against the configured
//! hostname, supplied to the connection session as a callback at connect
//! time. It never panics: any internal validation failure is converted
//! into a failed result carrying the failure text.

use std::fmt;

/// Validator callback supplied to the session at connect time.
pub type CertValidator = fn(&PeerCertificate, &str) -> CertCheck;

/// The identity fields of the peer's certificate.
///
/// The session adapter extracts these from whatever certificate
/// representation its TLS stack exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Subject common name, used only when no DNS subject alternative
    /// names are present.
    pub common_name: Option<String>,
    /// DNS entries of the subject alternative name extension.
    pub dns_names: Vec<String>,
}

/// Result of a certificate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertCheck {
    /// Whether the certificate matches the expected hostname.
    pub ok: bool,
    /// Human-readable detail ("Success" or the failure text).
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MatchError {
    NoIdentity,
    NoMatch { hostname: String, tried: Vec<String> },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIdentity => write!(f, "certificate carries no subject identity"),
            Self::NoMatch { hostname, tried } => write!(
                f,
                "hostname '{}' doesn't match certificate names {:?}",
                hostname, tried
            ),
        }
    }
}

/// Validate the peer certificate against the expected hostname.
///
/// Matching follows the usual TLS identity rules: DNS subject
/// alternative names are authoritative when present, otherwise the
/// common name is used. A left-most `*` wildcard label matches exactly
/// one non-empty label; partial-label wildcards are not honored.
#[must_use]
pub fn validate_cert(cert: &PeerCertificate, hostname: &str) -> CertCheck {
    match match_hostname(cert, hostname) {
        Ok(()) => CertCheck {
            ok: true,
            detail: "Success".to_string(),
        },
        Err(err) => CertCheck {
            ok: false,
            detail: err.to_string(),
        },
    }
}

fn match_hostname(cert: &PeerCertificate, hostname: &str) -> Result<(), MatchError> {
    let candidates: Vec<&str> = if cert.dns_names.is_empty() {
        cert.common_name.as_deref().into_iter().collect()
    } else {
        cert.dns_names.iter().map(String::as_str).collect()
    };
    if candidates.is_empty() {
        return Err(MatchError::NoIdentity);
    }

    if candidates.iter().any(|name| name_matches(name, hostname)) {
        Ok(())
    } else {
        Err(MatchError::NoMatch {
            hostname: hostname.to_string(),
            tried: candidates.iter().map(ToString::to_string).collect(),
        })
    }
}

fn name_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let hostname = hostname.to_ascii_lowercase();

    let Some(rest) = pattern.strip_prefix("*.") else {
        return pattern == hostname;
    };

    // Wildcard consumes exactly one non-empty label.
    let Some((first, tail)) = hostname.split_once('.') else {
        return false;
    };
    !first.is_empty() && tail == rest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(dns_names: &[&str], common_name: Option<&str>) -> PeerCertificate {
        PeerCertificate {
            common_name: common_name.map(str::to_string),
            dns_names: dns_names.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_exact_san_match() {
        let check = validate_cert(&cert(&["broker.example.com"], None), "broker.example.com");
        assert!(check.ok);
        assert_eq!(check.detail, "Success");
    }

    #[test]
    fn test_san_mismatch() {
        let check = validate_cert(&cert(&["other.example.com"], None), "broker.example.com");
        assert!(!check.ok);
        assert!(check.detail.contains("broker.example.com"));
    }

    #[test]
    fn test_common_name_fallback() {
        let check = validate_cert(&cert(&[], Some("broker.example.com")), "broker.example.com");
        assert!(check.ok);
    }

    #[test]
    fn test_san_overrides_common_name() {
        // A CN match must not rescue a certificate whose SANs don't match.
        let check = validate_cert(
            &cert(&["other.example.com"], Some("broker.example.com")),
            "broker.example.com",
        );
        assert!(!check.ok);
    }

    #[test]
    fn test_wildcard_matches_one_label() {
        let wild = cert(&["*.example.com"], None);
        assert!(validate_cert(&wild, "broker.example.com").ok);
        assert!(!validate_cert(&wild, "a.b.example.com").ok);
        assert!(!validate_cert(&wild, "example.com").ok);
    }

    #[test]
    fn test_partial_wildcard_not_honored() {
        let check = validate_cert(&cert(&["br*.example.com"], None), "broker.example.com");
        assert!(!check.ok);
    }

    #[test]
    fn test_case_insensitive() {
        let check = validate_cert(&cert(&["Broker.Example.COM"], None), "broker.example.com");
        assert!(check.ok);
    }

    #[test]
    fn test_empty_certificate_never_panics() {
        let check = validate_cert(&PeerCertificate::default(), "broker.example.com");
        assert!(!check.ok);
        assert!(check.detail.contains("no subject identity"));
    }
}
