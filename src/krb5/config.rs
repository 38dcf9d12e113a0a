//! Minimal `/etc/krb5.conf` reader (spec section 4.5).
//!
//! Only the two settings ktalk actually needs are parsed: the default realm
//! from `[libdefaults]` and a realm's `kdc` entries from `[realms]`. A real
//! krb5 profile has far more structure (nested braces, include directives,
//! multiple config files merged in order) than this needs to understand —
//! MIT krb5's own `libkrb5` profile parser is the thing to reach for if this
//! ever needs to grow past a CLI chat tool's requirements, so a hand-rolled
//! reader rather than a crate dependency is the right size here.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::KtalkError;

#[derive(Debug, Default)]
pub struct Krb5Config {
    pub default_realm: Option<String>,
    kdcs: HashMap<String, Vec<String>>,
}

impl Krb5Config {
    /// Read and parse `/etc/krb5.conf`, or the path in `$KRB5_CONFIG` when
    /// set, matching libkrb5's own lookup order.
    pub fn load_default() -> Result<Self, KtalkError> {
        let path = std::env::var("KRB5_CONFIG").unwrap_or_else(|_| "/etc/krb5.conf".to_string());
        Self::load(Path::new(&path))
    }

    pub fn load(path: &Path) -> Result<Self, KtalkError> {
        let text = fs::read_to_string(path).map_err(|e| {
            KtalkError::Authentication(format!("reading {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&text))
    }

    fn parse(text: &str) -> Self {
        let mut config = Krb5Config::default();
        let mut section = String::new();
        let mut current_realm: Option<String> = None;
        let mut depth = 0i32;

        for raw_line in text.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                section = name.trim().to_string();
                depth = 0;
                current_realm = None;
                continue;
            }

            if section == "libdefaults" {
                if let Some((key, value)) = split_assignment(line) {
                    if key.eq_ignore_ascii_case("default_realm") {
                        config.default_realm = Some(value.to_string());
                    }
                }
            } else if section == "realms" {
                // Realm blocks look like:
                //   EXAMPLE.ORG = {
                //       kdc = kdc1.example.org
                //       kdc = kdc2.example.org
                //   }
                if let Some(name) = line.strip_suffix("= {").map(str::trim) {
                    current_realm = Some(name.to_string());
                    depth = 1;
                    continue;
                }
                if line == "}" {
                    depth -= 1;
                    if depth <= 0 {
                        current_realm = None;
                    }
                    continue;
                }
                if depth > 0 {
                    if let (Some(realm), Some((key, value))) = (&current_realm, split_assignment(line)) {
                        if key.eq_ignore_ascii_case("kdc") {
                            config.kdcs.entry(realm.clone()).or_default().push(value.to_string());
                        }
                    }
                }
            }
        }
        config
    }

    /// The KDC host (optionally `host:port`) to contact for `realm`, in the
    /// order listed in the config file. Empty if the realm is absent or has
    /// no `kdc` entries.
    pub fn kdcs_for(&self, realm: &str) -> &[String] {
        self.kdcs.get(realm).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [libdefaults]
            default_realm = EXAMPLE.ORG
            dns_lookup_kdc = false

        [realms]
            EXAMPLE.ORG = {
                kdc = kdc1.example.org:88
                kdc = kdc2.example.org
            }
            OTHER.ORG = {
                kdc = kdc.other.org
            }
    "#;

    #[test]
    fn parses_default_realm() {
        let config = Krb5Config::parse(SAMPLE);
        assert_eq!(config.default_realm.as_deref(), Some("EXAMPLE.ORG"));
    }

    #[test]
    fn parses_multiple_kdc_lines_in_order() {
        let config = Krb5Config::parse(SAMPLE);
        assert_eq!(
            config.kdcs_for("EXAMPLE.ORG"),
            &["kdc1.example.org:88".to_string(), "kdc2.example.org".to_string()]
        );
    }

    #[test]
    fn unknown_realm_has_no_kdcs() {
        let config = Krb5Config::parse(SAMPLE);
        assert!(config.kdcs_for("NOWHERE.ORG").is_empty());
    }

    #[test]
    fn realm_blocks_do_not_bleed_into_each_other() {
        let config = Krb5Config::parse(SAMPLE);
        assert_eq!(config.kdcs_for("OTHER.ORG"), &["kdc.other.org".to_string()]);
    }
}
