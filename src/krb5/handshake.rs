//! AP-REQ construction and verification (spec section 4.5).
//!
//! ktalk.c builds its AP-REQ with `krb5_mk_req_extended(context, &auth_context,
//! AP_OPTS_USE_SESSION_KEY, NULL, new_creds, &out_ticket)` and the listener
//! reads it back with `krb5_rd_req`. Neither side ever builds or reads an
//! AP-REP: the wire protocol (spec section 6) is exactly two frames — the
//! listener's TGT ticket, then the connector's AP-REQ — after which both
//! sides go straight to sealed chat traffic. "Mutual required" in spec
//! section 4.5 describes the *property* (neither side can produce valid
//! sealed traffic without actually holding the shared key), not an extra
//! handshake frame.
//!
//! The AP-REQ's own options bitmask still carries both flags spec section
//! 4.5 pins for it: `AP_OPTS_USE_SESSION_KEY` (the ticket is sealed under
//! the TGT's session key, not a service key) and `AP_OPTS_MUTUAL_REQUIRED`
//! (the property described above — it is this bit, not an extra frame, that
//! spec section 4.5 means by "mutual required").
//!
//! `KRB5_AUTH_CONTEXT_DO_SEQUENCE`'s starting sequence numbers are never
//! negotiated either, for the same reason: with no AP-REP to carry a
//! server-chosen value back to the connector, both sides simply start both
//! counters at the auth-context default of zero (the value
//! `krb5_auth_con_init` uses whenever the caller — as ktalk.c does — never
//! calls a seed/randomize function on it). [`super::channel::SecureChannel`]
//! never relies on the starting value being unpredictable; its replay
//! defense is the strictly-monotonic per-direction counter, which zero
//! satisfies exactly as well as a random seed would.

use kerberos::messages::ApReq;
use kerberos_constants::ap_options::{AP_OPTS_MUTUAL_REQUIRED, AP_OPTS_USE_SESSION_KEY};
use tracing::debug;

use crate::error::KtalkError;
use crate::krb5::kdc::UserToUserTicket;
use crate::krb5::Principal;

/// Both directions' initial sequence number, per this module's doc comment.
pub const INITIAL_SEQUENCE_NUMBER: u32 = 0;

/// Build the AP-REQ for the ticket obtained in
/// [`super::kdc::request_user_to_user_ticket`] (or, on the listener side,
/// never — the listener only verifies, it never sends an AP-REQ).
pub fn build_ap_req(ticket: &UserToUserTicket, client: &Principal) -> Result<Vec<u8>, KtalkError> {
    let mut req = ApReq::new(ticket.ticket_bytes.clone(), client.components().1.clone());
    req.set_options(AP_OPTS_USE_SESSION_KEY | AP_OPTS_MUTUAL_REQUIRED);
    req.set_sequence_number(INITIAL_SEQUENCE_NUMBER);

    req.build(&ticket.session_key, ticket.session_key_type)
        .map_err(|e| KtalkError::Authentication(format!("building AP-REQ: {e}")))
}

/// Verify a peer's AP-REQ against the session key the listener set from its
/// own TGT, returning the identity it cryptographically proves.
///
/// This only checks the proof, never the asserted name against
/// `expected_peer` — per spec section 8 scenario 2, a peer who authenticates
/// as someone other than the command-line argument still completes the
/// session; [`super::super::banner::StartupBanner::compose`] is what turns a
/// mismatch into a visible warning rather than a handshake failure.
pub fn verify_ap_req(
    ap_req_bytes: &[u8],
    ticket: &UserToUserTicket,
    local_realm: &str,
) -> Result<Principal, KtalkError> {
    let req = ApReq::parse(ap_req_bytes)
        .map_err(|e| KtalkError::Authentication(format!("parsing peer's AP-REQ: {e}")))?;

    let authenticator = req
        .decrypt_authenticator(&ticket.session_key, ticket.session_key_type)
        .map_err(|e| KtalkError::Authentication(format!("decrypting peer's authenticator: {e}")))?;

    let asserted = Principal::parse(&authenticator.client_name(), local_realm)?;
    debug!(peer = %asserted, "verified peer AP-REQ");
    Ok(asserted)
}
