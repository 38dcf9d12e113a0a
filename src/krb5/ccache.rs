//! Reading the caller's existing credential cache (spec section 4.5).
//!
//! ktalk never performs an AS exchange itself — it requires the invoking
//! user to already hold a TGT, the same precondition as `klist` working
//! before you run it. This module's only job is locating and parsing that
//! cache; the TGS exchange that turns the TGT into a user-to-user service
//! ticket lives in [`super::kdc`].

use std::env;
use std::path::PathBuf;

use kerberos_ccache::{CCache, CredentialEntry};

use crate::error::KtalkError;
use crate::krb5::Principal;

/// A parsed credential cache, holding at minimum the client's own TGT.
pub struct Credentials {
    pub client: Principal,
    pub ccache: CCache,
}

/// Resolve the credential cache path: `$KRB5CCNAME` if set (stripping an
/// optional `FILE:` prefix, the only ccache type ktalk supports), otherwise
/// the MIT krb5 default of `/tmp/krb5cc_<uid>`.
pub fn default_ccache_path() -> PathBuf {
    if let Ok(name) = env::var("KRB5CCNAME") {
        let path = name.strip_prefix("FILE:").unwrap_or(&name);
        return PathBuf::from(path);
    }
    // SAFETY: getuid() takes no arguments and cannot fail.
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/krb5cc_{uid}"))
}

/// Load the credential cache at `path`, extracting the client principal and
/// the TGT required for the TGS-REQ in [`super::kdc`].
pub fn load(path: &std::path::Path, local_realm: &str) -> Result<Credentials, KtalkError> {
    let ccache = CCache::from_file(path).map_err(|e| {
        KtalkError::Authentication(format!("reading credential cache {}: {e}", path.display()))
    })?;

    let primary_principal = ccache
        .primary_principal
        .as_ref()
        .ok_or_else(|| KtalkError::Authentication("credential cache has no primary principal".into()))?;
    let client_name = primary_principal
        .components
        .first()
        .cloned()
        .unwrap_or_default();
    let client = Principal::parse(&format!("{client_name}@{}", primary_principal.realm), local_realm)?;

    if ccache.credentials.is_empty() {
        return Err(KtalkError::Authentication(
            "credential cache has no tickets; run kinit first".into(),
        ));
    }

    Ok(Credentials { client, ccache })
}

/// Find the client's own `krbtgt/REALM@REALM` entry — the listener's session
/// key is set directly from this ticket's key material (spec section 4.5's
/// `TicketSent -> CtxReady` transition), never from a service keytab.
/// Matches ktalk.c's `krb5_build_principal_ext(..., "krbtgt", realm, ...)`
/// followed by `krb5_get_credentials(KRB5_GC_CACHED, ...)`.
pub fn find_own_tgt<'a>(ccache: &'a CCache, realm: &str) -> Result<&'a CredentialEntry, KtalkError> {
    ccache
        .credentials
        .iter()
        .find(|entry| {
            entry.server.realm == realm
                && entry.server.components.first().map(String::as_str) == Some("krbtgt")
                && entry.server.components.get(1).map(String::as_str) == Some(realm)
        })
        .ok_or_else(|| {
            KtalkError::Authentication(format!(
                "no krbtgt/{realm}@{realm} ticket in the credential cache; run kinit first"
            ))
        })
}
