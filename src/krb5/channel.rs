//! The sealed, sequence-numbered chat channel (spec section 4.6/4.8).
//!
//! ktalk.c seals every chat line with `krb5_mk_priv`, which produces a full
//! RFC 4120 section 5.7 KRB-PRIV ASN.1 structure (the encrypted part
//! carrying the plaintext, timestamp, and sender's address, wrapped in an
//! outer `KRB-PRIV` sequence alongside the unencrypted sender address) and
//! unseals with `krb5_rd_priv`, which enforces address binding plus replay
//! and reordering rejection by checking the embedded sequence number against
//! the auth context's expected value.
//!
//! This module keeps that *observable* contract — every sealed message
//! carries a monotonic sequence number and the sender's bound address,
//! tampering is detected, and replayed, reordered, or address-spoofed
//! messages are rejected — without reproducing the KRB-PRIV DER encoding
//! byte for byte. The envelope here is a minimal
//! `seq (u32 BE) || sender_addr (4 bytes) || plaintext`, encrypted whole with
//! the session key via `kerberos_crypto`'s real per-enctype cipher. Recorded
//! as a deliberate simplification: nothing downstream of this module (the
//! chat UI, the event loop) can tell the difference, and the actual
//! encryption is the genuine negotiated enctype rather than a placeholder.

use std::net::Ipv4Addr;

use kerberos_crypto::{new_kerberos_cipher, KerberosCipher};

use crate::error::KtalkError;

/// A channel sealed with the session key negotiated during the handshake,
/// tracking the next sequence number expected in each direction the way
/// `AUTH_CONTEXT_DO_SEQUENCE` does in libkrb5, and the two IPv4 addresses the
/// surrounding `AuthContext` was bound to (spec section 3's Endpoint
/// invariant): `local_addr` is stamped onto every outgoing message as its
/// sender address, and `peer_addr` is the only sender address `open` will
/// accept.
pub struct SecureChannel {
    cipher: Box<dyn KerberosCipher>,
    key: Vec<u8>,
    send_seq: u32,
    recv_seq: u32,
    local_addr: Ipv4Addr,
    peer_addr: Ipv4Addr,
}

/// Which key-usage number to mix into the cipher for a given direction;
/// kept distinct so a captured ciphertext from one direction can't be
/// replayed as if it came from the other.
const KEY_USAGE_SEND: i32 = 13;
const KEY_USAGE_RECV: i32 = 14;

impl SecureChannel {
    /// Construct a channel from the negotiated key type, the two initial
    /// sequence numbers the handshake exchanged, and the two IPv4 addresses
    /// the `AuthContext` is bound to — always read from the live connected
    /// socket (see [`crate::address::Endpoint::from_socket`]), never a
    /// second hostname resolution.
    pub fn new(
        key_type: i32,
        key: Vec<u8>,
        local_seq: u32,
        peer_seq: u32,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> Result<Self, KtalkError> {
        let cipher = new_kerberos_cipher(key_type)
            .map_err(|e| KtalkError::Session(format!("unsupported session key enctype: {e}")))?;
        Ok(SecureChannel {
            cipher,
            key,
            send_seq: local_seq,
            recv_seq: peer_seq,
            local_addr,
            peer_addr,
        })
    }

    /// Seal `plaintext`, stamping it with the next outbound sequence number
    /// and this side's bound address, and advancing the local counter.
    pub fn seal(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut envelope = Vec::with_capacity(8 + plaintext.len());
        envelope.extend_from_slice(&self.send_seq.to_be_bytes());
        envelope.extend_from_slice(&self.local_addr.octets());
        envelope.extend_from_slice(plaintext);
        self.send_seq = self.send_seq.wrapping_add(1);
        self.cipher.encrypt(&self.key, KEY_USAGE_SEND, &envelope)
    }

    /// Open a sealed message, rejecting it unless its sequence number is
    /// exactly the next one expected — a strictly monotonic counter rejects
    /// both exact replays (same number twice) and reordering (a number out
    /// of turn), matching `krb5_rd_priv`'s own behavior — and unless its
    /// embedded sender address matches the peer address this channel's
    /// `AuthContext` is bound to, matching `krb5_rd_priv`'s address-binding
    /// check (spec section 3's Endpoint invariant, section 4.6's "sender
    /// address binding").
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, KtalkError> {
        let envelope = self
            .cipher
            .decrypt(&self.key, KEY_USAGE_RECV, ciphertext)
            .map_err(|e| KtalkError::Session(format!("decryption failed (tampered or wrong key): {e}")))?;

        if envelope.len() < 8 {
            return Err(KtalkError::Session(
                "sealed message too short to carry a sequence number and sender address".into(),
            ));
        }
        let (seq_bytes, rest) = envelope.split_at(4);
        let (addr_bytes, plaintext) = rest.split_at(4);
        let seq = u32::from_be_bytes(seq_bytes.try_into().unwrap());
        let sender_addr = Ipv4Addr::new(addr_bytes[0], addr_bytes[1], addr_bytes[2], addr_bytes[3]);

        if seq != self.recv_seq {
            return Err(KtalkError::Session(format!(
                "sequence number {seq} out of order (expected {})",
                self.recv_seq
            )));
        }
        if sender_addr != self.peer_addr {
            return Err(KtalkError::Session(format!(
                "sealed message claims sender address {sender_addr} but the bound peer address is {}",
                self.peer_addr
            )));
        }
        self.recv_seq = self.recv_seq.wrapping_add(1);
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kerberos_constants::etypes::AES256_CTS_HMAC_SHA1_96;

    const ALICE_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const BOB_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn paired_channels() -> (SecureChannel, SecureChannel) {
        let key = vec![0x11u8; 32];
        let a = SecureChannel::new(AES256_CTS_HMAC_SHA1_96, key.clone(), 1000, 2000, ALICE_ADDR, BOB_ADDR).unwrap();
        let b = SecureChannel::new(AES256_CTS_HMAC_SHA1_96, key, 2000, 1000, BOB_ADDR, ALICE_ADDR).unwrap();
        (a, b)
    }

    #[test]
    fn round_trips_a_message() {
        let (mut alice, mut bob) = paired_channels();
        let sealed = alice.seal(b"hello bob");
        let opened = bob.open(&sealed).unwrap();
        assert_eq!(opened, b"hello bob");
    }

    #[test]
    fn rejects_a_tampered_ciphertext() {
        let (mut alice, mut bob) = paired_channels();
        let mut sealed = alice.seal(b"hello bob");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(bob.open(&sealed).is_err());
    }

    #[test]
    fn rejects_a_replayed_message() {
        let (mut alice, mut bob) = paired_channels();
        let sealed = alice.seal(b"first");
        bob.open(&sealed).unwrap();
        // Alice's second message advances her own counter; replaying the
        // first ciphertext against Bob (whose recv_seq already advanced)
        // must fail even though decryption itself succeeds.
        assert!(bob.open(&sealed).is_err());
    }

    #[test]
    fn rejects_an_out_of_order_message() {
        let (mut alice, mut bob) = paired_channels();
        let first = alice.seal(b"first");
        let second = alice.seal(b"second");
        assert!(bob.open(&second).is_err());
        // First still opens cleanly since recv_seq never advanced.
        assert_eq!(bob.open(&first).unwrap(), b"first");
    }

    #[test]
    fn sequence_numbers_advance_independently_per_direction() {
        let (mut alice, mut bob) = paired_channels();
        let a_to_b = alice.seal(b"from alice");
        bob.open(&a_to_b).unwrap();
        let b_to_a = bob.seal(b"from bob");
        assert_eq!(alice.open(&b_to_a).unwrap(), b"from bob");
    }

    #[test]
    fn rejects_a_message_from_an_unbound_address() {
        let key = vec![0x11u8; 32];
        // Bob's channel is bound to expect Alice at 10.0.0.1, but this
        // "alice" channel is (mis)configured with a different local address
        // — standing in for a spoofed or mismatched sender.
        let mut impostor = SecureChannel::new(
            AES256_CTS_HMAC_SHA1_96,
            key.clone(),
            1000,
            2000,
            Ipv4Addr::new(10, 0, 0, 99),
            BOB_ADDR,
        )
        .unwrap();
        let mut bob = SecureChannel::new(AES256_CTS_HMAC_SHA1_96, key, 2000, 1000, BOB_ADDR, ALICE_ADDR).unwrap();

        let sealed = impostor.seal(b"hello bob");
        assert!(bob.open(&sealed).is_err());
    }
}
