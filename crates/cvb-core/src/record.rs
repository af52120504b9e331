//! Heuristic parser for colon-delimited credential lines.
//!
//! The source files mix several export formats with no common header, so the
//! only reliable signal is a scheme/app marker in the first field. The rule
//! is deliberately a single documented heuristic rather than a per-format
//! grammar.

/// Markers that indicate the first field is a scheme/app indicator rather
/// than the login itself. Matched case-insensitively by substring.
const SCHEME_MARKERS: [&str; 4] = ["http", "android", "ftp", "password"];

/// Display fallback for a blank login field.
pub const NO_USERNAME: &str = "index has no username";
/// Display fallback for a blank password field.
pub const NO_PASSWORD: &str = "index has no password";

/// One parsed credential line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// The marker that matched the first field, if any. Free text used only
    /// to pick the field-selection rule.
    pub scheme_hint: Option<String>,
    /// Login/username/URL-ish value; may be empty.
    pub identity: String,
    /// Password/token value; may be empty.
    pub secret: String,
    /// The original trimmed line, kept for raw-mode output.
    pub raw: String,
}

impl Record {
    /// Parse a single line. Total: malformed input yields `None`, never an
    /// error.
    ///
    /// A line must split into at least 3 colon-delimited fields to count as
    /// a candidate. When the first field carries a known marker and the line
    /// has 4+ fields, identity/secret come from fields 2/3; otherwise from
    /// fields 0/1. The heuristic is applied exactly once; a blank marker
    /// pair does not fall back to fields 0/1.
    pub fn parse(line: &str) -> Option<Record> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() < 3 {
            return None;
        }

        let first = parts[0].to_lowercase();
        let scheme_hint = SCHEME_MARKERS
            .iter()
            .find(|m| first.contains(*m))
            .map(|m| (*m).to_string());

        let (identity, secret) = if scheme_hint.is_some() && parts.len() >= 4 {
            (parts[2], parts[3])
        } else {
            (parts[0], parts[1])
        };

        Some(Record {
            scheme_hint,
            identity: identity.trim().to_string(),
            secret: secret.trim().to_string(),
            raw: line.to_string(),
        })
    }

    /// Login for display; substitutes the placeholder when blank.
    pub fn display_identity(&self) -> &str {
        if self.identity.is_empty() {
            NO_USERNAME
        } else {
            &self.identity
        }
    }

    /// Password for display; substitutes the placeholder when blank.
    pub fn display_secret(&self) -> &str {
        if self.secret.is_empty() {
            NO_PASSWORD
        } else {
            &self.secret
        }
    }

    /// Raw-mode output: the unsubstituted selected fields joined back with
    /// the original delimiter.
    pub fn raw_pair(&self) -> String {
        format!("{}:{}", self.identity, self.secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_lines_with_fewer_than_three_fields() {
        assert_eq!(Record::parse(""), None);
        assert_eq!(Record::parse("   "), None);
        assert_eq!(Record::parse("nosplit"), None);
        assert_eq!(Record::parse("user:pass"), None);
    }

    #[test]
    fn marker_line_selects_fields_two_and_three() {
        let rec = Record::parse("http:site:user:pw").unwrap();
        assert_eq!(rec.scheme_hint.as_deref(), Some("http"));
        assert_eq!(rec.identity, "user");
        assert_eq!(rec.secret, "pw");
    }

    #[test]
    fn marker_match_is_case_insensitive_substring() {
        let rec = Record::parse("ANDROID://app:login:secret:extra").unwrap();
        assert_eq!(rec.scheme_hint.as_deref(), Some("android"));
        assert_eq!(rec.identity, "login");
        assert_eq!(rec.secret, "secret");
    }

    #[test]
    fn plain_line_selects_fields_zero_and_one() {
        let rec = Record::parse("plainuser:plainpass:extra").unwrap();
        assert_eq!(rec.scheme_hint, None);
        assert_eq!(rec.identity, "plainuser");
        assert_eq!(rec.secret, "plainpass");
    }

    #[test]
    fn marker_with_only_three_fields_keeps_leading_pair() {
        // 3 fields: the marker pair (2/3) does not exist, so 0/1 is used.
        let rec = Record::parse("http:user:pw").unwrap();
        assert_eq!(rec.scheme_hint.as_deref(), Some("http"));
        assert_eq!(rec.identity, "http");
        assert_eq!(rec.secret, "user");
    }

    #[test]
    fn blank_fields_get_display_placeholders_but_raw_pair_is_untouched() {
        let rec = Record::parse("http:site::pw").unwrap();
        assert_eq!(rec.identity, "");
        assert_eq!(rec.display_identity(), NO_USERNAME);
        assert_eq!(rec.display_secret(), "pw");
        assert_eq!(rec.raw_pair(), ":pw");
    }

    #[test]
    fn fields_are_trimmed_and_raw_is_preserved() {
        let rec = Record::parse("  user : pass :x  ").unwrap();
        assert_eq!(rec.identity, "user");
        assert_eq!(rec.secret, "pass");
        assert_eq!(rec.raw, "user : pass :x");
    }
}
