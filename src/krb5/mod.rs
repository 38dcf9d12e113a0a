//! Kerberos 5 user-to-user authentication and the sealed channel it
//! establishes (spec section 4.5/4.6).
//!
//! Split into the pieces ktalk.c itself keeps distinct, even though the C
//! original folds most of them into libkrb5 calls the caller never sees the
//! inside of:
//!
//! - [`ccache`] — reading the caller's existing credential cache (never a
//!   fresh login; ktalk requires the user already hold a TGT).
//! - [`config`] — the tiny `/etc/krb5.conf` `[realms]` reader used to find
//!   the KDC's address, standing in for the full profile library libkrb5
//!   links against.
//! - [`kdc`] — the TGS-REQ/REP exchange that asks the KDC for a
//!   user-to-user service ticket (`KRB5_GC_USER_USER`), since no single call
//!   in the pure-Rust crates performs this exchange directly the way
//!   `krb5_get_credentials` does in C.
//! - [`handshake`] — building and verifying the AP-REQ/AP-REP pair that
//!   proves both sides hold the session key from that ticket.
//! - [`channel`] — the sealed, sequence-numbered channel the handshake's
//!   session key feeds into.

pub mod ccache;
pub mod channel;
pub mod config;
pub mod handshake;
pub mod kdc;

use kerberos_constants::principal_names::NT_PRINCIPAL;

use crate::error::KtalkError;

/// A parsed `primary[/instance]@REALM` principal name.
///
/// Kept as a first-class type (rather than comparing raw strings
/// everywhere) because Open Question 2 in spec section 9 depends on it:
/// ktalk.c compares the peer's name against the CLI-supplied argument with a
/// plain case-insensitive string compare, which silently fails whenever the
/// argument omits the realm (the overwhelmingly common case — nobody types
/// `alice@EXAMPLE.ORG` at the command line). Parsing both sides into the
/// same structured type before comparing, and defaulting a missing realm to
/// the local default realm, fixes that without changing the CLI surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub primary: String,
    pub instance: Option<String>,
    pub realm: String,
}

impl Principal {
    /// Parse `name` as `primary[/instance][@REALM]`. `default_realm` is
    /// substituted when the string carries no `@REALM` suffix, which is the
    /// normal case for a name typed on ktalk's command line.
    pub fn parse(name: &str, default_realm: &str) -> Result<Self, KtalkError> {
        let (name_part, realm) = match name.split_once('@') {
            Some((n, r)) => (n, r.to_string()),
            None => (name, default_realm.to_string()),
        };
        if name_part.is_empty() || realm.is_empty() {
            return Err(KtalkError::Authentication(format!(
                "malformed principal name {name:?}"
            )));
        }
        let (primary, instance) = match name_part.split_once('/') {
            Some((p, i)) => (p.to_string(), Some(i.to_string())),
            None => (name_part.to_string(), None),
        };
        Ok(Principal { primary, instance, realm })
    }

    /// Canonical comparison: realm is compared case-sensitively (realms are
    /// case-sensitive by convention, e.g. `EXAMPLE.ORG` vs `example.org` are
    /// formally distinct), primary and instance case-insensitively to match
    /// typical KDC principal-database behavior.
    pub fn matches(&self, other: &Principal) -> bool {
        self.realm == other.realm
            && self.primary.eq_ignore_ascii_case(&other.primary)
            && self.instance.as_deref().map(|s| s.to_ascii_lowercase())
                == other.instance.as_deref().map(|s| s.to_ascii_lowercase())
    }

    /// Render in the ASN.1 `PrincipalName` shape the `kerberos` crate's
    /// request builders expect: a name-type and a sequence of components.
    pub fn components(&self) -> (i32, Vec<String>) {
        let mut parts = vec![self.primary.clone()];
        if let Some(instance) = &self.instance {
            parts.push(instance.clone());
        }
        (NT_PRINCIPAL, parts)
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}/{}@{}", self.primary, instance, self.realm),
            None => write!(f, "{}@{}", self.primary, self.realm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_realm_qualified_name() {
        let p = Principal::parse("alice@EXAMPLE.ORG", "OTHER.ORG").unwrap();
        assert_eq!(p.primary, "alice");
        assert_eq!(p.instance, None);
        assert_eq!(p.realm, "EXAMPLE.ORG");
    }

    #[test]
    fn defaults_missing_realm_to_local_default() {
        let p = Principal::parse("alice", "EXAMPLE.ORG").unwrap();
        assert_eq!(p.realm, "EXAMPLE.ORG");
    }

    #[test]
    fn parses_instance_component() {
        let p = Principal::parse("host/relay.example.org@EXAMPLE.ORG", "EXAMPLE.ORG").unwrap();
        assert_eq!(p.primary, "host");
        assert_eq!(p.instance.as_deref(), Some("relay.example.org"));
    }

    #[test]
    fn matches_is_realm_strict_but_case_insensitive_elsewhere() {
        let a = Principal::parse("Alice@EXAMPLE.ORG", "EXAMPLE.ORG").unwrap();
        let b = Principal::parse("alice@EXAMPLE.ORG", "EXAMPLE.ORG").unwrap();
        assert!(a.matches(&b));

        let c = Principal::parse("alice@example.org", "EXAMPLE.ORG").unwrap();
        assert!(!a.matches(&c));
    }

    #[test]
    fn the_open_question_case_a_bare_cli_argument_still_matches() {
        // The CLI argument has no realm; the peer's AP-REQ name does.
        let cli_argument = Principal::parse("bob", "EXAMPLE.ORG").unwrap();
        let from_ticket = Principal::parse("bob@EXAMPLE.ORG", "EXAMPLE.ORG").unwrap();
        assert!(cli_argument.matches(&from_ticket));
    }
}
