//! The listener's startup banner (spec sections 3 and 4.5's `Verified` state).
//!
//! ktalk.c builds this by appending to a `startupmsg` buffer right after
//! `krb5_rd_req` succeeds: the authenticated peer's unparsed name, and — if
//! it doesn't case-insensitively match the principal named on the command
//! line — a three-line warning. The connector side never composes one: it
//! never learns the listener's identity back over the wire (no AP-REP is
//! exchanged, see [`crate::krb5::handshake`]), so only the listener has
//! anything to report.

use crate::krb5::Principal;

/// A short text naming the authenticated peer, flagging a mismatch against
/// the expected peer named on the command line.
pub struct StartupBanner {
    pub authenticated_peer: Principal,
    pub mismatch: bool,
}

impl StartupBanner {
    pub fn compose(authenticated_peer: Principal, expected_peer: &Principal) -> Self {
        let mismatch = !authenticated_peer.matches(expected_peer);
        StartupBanner { authenticated_peer, mismatch }
    }

    /// Render the banner text. Wording follows spec section 8 scenario 1's
    /// pinned string ("Foreign party authenticates as ..."), a slight
    /// rephrasing of ktalk.c's own `"Foreign principal authenticates as "`.
    pub fn render(&self) -> String {
        let mut text = format!("Foreign party authenticates as {}\n", self.authenticated_peer);
        if self.mismatch {
            text.push_str(
                "\nWARNING! This is not the principal you specified on the\n\
                 command line. An encrypted session will be established anyway;\n\
                 make sure you really want to talk to this person.\n",
            );
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_peer_has_no_warning() {
        let expected = Principal::parse("alice@TEST", "TEST").unwrap();
        let authenticated = Principal::parse("alice@TEST", "TEST").unwrap();
        let banner = StartupBanner::compose(authenticated, &expected);
        assert!(!banner.mismatch);
        assert!(banner.render().contains("Foreign party authenticates as alice@TEST"));
        assert!(!banner.render().contains("WARNING"));
    }

    #[test]
    fn mismatched_peer_is_flagged() {
        let expected = Principal::parse("alice@TEST", "TEST").unwrap();
        let authenticated = Principal::parse("bob@TEST", "TEST").unwrap();
        let banner = StartupBanner::compose(authenticated, &expected);
        assert!(banner.mismatch);
        assert!(banner.render().contains("WARNING"));
        assert!(banner.render().contains("bob@TEST"));
    }
}
