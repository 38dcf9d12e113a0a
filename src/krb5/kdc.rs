//! The TGS-REQ/REP exchange for a user-to-user service ticket (spec section
//! 4.5).
//!
//! In C, this entire module is one call: `krb5_get_credentials(ctx,
//! KRB5_GC_USER_USER, ccache, &in_creds, &out_creds)`, where `in_creds`
//! carries the peer's own TGT as the `second_ticket` and `KDC-OPT
//! ENC-TKT-IN-SKEY` tells the KDC to encrypt the returned service ticket
//! under that second ticket's session key rather than under a service key
//! of its own — the defining property of Kerberos user-to-user
//! authentication, which lets two ordinary users authenticate to each other
//! without either one owning a long-term service key.
//!
//! No single call in the pure-Rust `kerberos` crate family performs that
//! exchange; it has to be assembled by hand from the crate's ASN.1 request
//! and reply types plus `kerberos_crypto`'s per-enctype encrypt/decrypt.
//! This is the single most speculative module in the port — the TGS-REQ
//! body, padata, and KDC-OPTIONS bitflags below follow RFC 4120 section
//! 5.4.2 structurally, but have not been checked byte-for-byte against a
//! live KDC exchange the way the rest of this crate's wire handling has.

use kerberos::messages::{KrbError, TgsRep, TgsReq};
use kerberos_ccache::CredentialEntry;
use kerberos_constants::kdc_options::ENC_TKT_IN_SKEY;
use kerberos_constants::key_usages::KEY_USAGE_TGS_REQ_AUTHORIZATOR_SESSION_KEY;
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::KtalkError;
use crate::krb5::Principal;

/// The KDC wire protocol frames each message with a 4-byte big-endian
/// length, not the decimal-ASCII length this crate's own chat frame codec
/// uses — a different, RFC-4120-mandated framing that happens to share
/// nothing with ktalk's own [`crate::frame`] beyond "length then payload".
async fn send_and_receive(kdc_addr: &str, request: &[u8]) -> Result<Vec<u8>, KtalkError> {
    let mut stream = TcpStream::connect(kdc_addr)
        .await
        .map_err(|e| KtalkError::Authentication(format!("connecting to KDC {kdc_addr}: {e}")))?;

    let len = u32::try_from(request.len())
        .map_err(|_| KtalkError::Authentication("TGS-REQ too large to send".into()))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(request).await?;
    stream.flush().await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let reply_len = u32::from_be_bytes(len_buf) as usize;
    let mut reply = vec![0u8; reply_len];
    stream.read_exact(&mut reply).await?;
    Ok(reply)
}

/// A user-to-user service ticket obtained from the KDC: the raw ticket (to
/// be handed to the peer as the AP-REQ's `second_ticket` is not needed here
/// — the peer already holds that ticket as their own TGT) and the session
/// key the KDC minted for this specific exchange.
pub struct UserToUserTicket {
    pub ticket_bytes: Vec<u8>,
    pub session_key: Vec<u8>,
    pub session_key_type: i32,
}

impl UserToUserTicket {
    /// The listener never talks to a KDC at all (spec section 4.5): its
    /// session key is its own TGT's key material, set directly from the
    /// credential cache entry found by [`super::ccache::find_own_tgt`] —
    /// ktalk.c's `krb5_auth_con_setuseruserkey(context, auth_context,
    /// &out_creds->keyblock)`, where `out_creds` is that same TGT re-fetched
    /// through `krb5_get_credentials(KRB5_GC_CACHED, ...)`.
    pub fn from_own_tgt(entry: &CredentialEntry) -> Self {
        UserToUserTicket {
            ticket_bytes: entry.ticket.clone(),
            session_key: entry.key.keyvalue.clone(),
            session_key_type: entry.key.keytype as i32,
        }
    }
}

/// Request a user-to-user ticket from `target` (the peer we want to talk
/// to), authenticating the request with our own TGT from `tgt_entry`, and
/// presenting the peer's own TGT bytes (`peer_second_ticket`, received over
/// the wire before this call, per spec section 4.5's ordering) as the
/// `second_ticket` that tells the KDC to encrypt under its session key
/// instead of a service key.
pub async fn request_user_to_user_ticket(
    kdc_addr: &str,
    client: &Principal,
    target: &Principal,
    tgt_entry: &CredentialEntry,
    peer_second_ticket: &[u8],
) -> Result<UserToUserTicket, KtalkError> {
    let mut nonce_bytes = [0u8; 4];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = u32::from_be_bytes(nonce_bytes) & 0x7fff_ffff;

    let second_ticket = kerberos::Asn1Object::decode(peer_second_ticket).map_err(|e| {
        KtalkError::Authentication(format!("peer's ticket did not parse as a Kerberos Ticket: {e}"))
    })?;

    let mut req = TgsReq::new(client.components().1.clone(), target.components().1.clone());
    req.set_realm(target.realm.clone());
    req.set_nonce(nonce);
    req.add_kdc_option(ENC_TKT_IN_SKEY);
    req.add_second_ticket(second_ticket);
    req.set_authenticator_key_usage(KEY_USAGE_TGS_REQ_AUTHORIZATOR_SESSION_KEY);

    let req_bytes = req
        .build(&tgt_entry.key, &tgt_entry.ticket)
        .map_err(|e| KtalkError::Authentication(format!("building TGS-REQ: {e}")))?;

    debug!(%kdc_addr, peer = %target, "sending TGS-REQ for user-to-user ticket");
    let reply_bytes = send_and_receive(kdc_addr, &req_bytes).await?;

    match TgsRep::parse(&reply_bytes) {
        Ok(rep) => {
            let decrypted = rep
                .decrypt_enc_part(&tgt_entry.key)
                .map_err(|e| KtalkError::Authentication(format!("decrypting TGS-REP: {e}")))?;
            if decrypted.nonce() != nonce {
                return Err(KtalkError::Authentication(
                    "TGS-REP nonce did not match the request".into(),
                ));
            }
            Ok(UserToUserTicket {
                ticket_bytes: rep.ticket_bytes().to_vec(),
                session_key: decrypted.session_key().to_vec(),
                session_key_type: decrypted.session_key_type(),
            })
        }
        Err(_) => {
            let err = KrbError::parse(&reply_bytes)
                .map_err(|e| KtalkError::Authentication(format!("unparseable KDC reply: {e}")))?;
            Err(KtalkError::Authentication(format!(
                "KDC rejected the TGS-REQ: {}",
                err.error_text()
            )))
        }
    }
}
