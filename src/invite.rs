//! Invitation emitter (spec section 4.4, wire strings in spec section 6).
//!
//! Ground truth is `ktalk.c`'s `send_connect_message`: it canonicalizes the
//! local hostname (stripping a trailing `.mit.edu`, case-insensitively), asks
//! Zephyr for the caller's own sender identity (stripping `@ATHENA.MIT.EDU`),
//! and then either `fork`s an external messenger (`execlp(execstr, sender,
//! host, port, NULL)`, reaped with a non-blocking `wait3`) or publishes a
//! Zephyr notice with the literal invitation text. Both strings are kept
//! byte-for-byte; only the transport underneath "publish a notice" changes,
//! since no crate in this workspace speaks the Zephyr wire protocol — spec.md
//! already documents invitation delivery as an external, pluggable
//! collaborator.
//!
//! Failure here is never fatal (spec section 4.4): the caller logs a warning
//! and falls through to `accept`, exactly as ktalk.c's listener does — a
//! human can always dial in out-of-band with the port printed to stdout.

use std::path::Path;

use gethostname::gethostname;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::KtalkError;
use crate::krb5::Principal;

const MIT_HOST_SUFFIX: &str = ".mit.edu";
const ATHENA_REALM_SUFFIX: &str = "@ATHENA.MIT.EDU";

/// Strip a trailing `.mit.edu` (case-insensitive) from a canonical hostname,
/// the short host label `ktalk %s %s %i` embeds in its instructions.
pub fn host_label(hostname: &str) -> String {
    if hostname.len() > MIT_HOST_SUFFIX.len() {
        let split_at = hostname.len() - MIT_HOST_SUFFIX.len();
        let (head, tail) = hostname.split_at(split_at);
        if tail.eq_ignore_ascii_case(MIT_HOST_SUFFIX) {
            return head.to_string();
        }
    }
    hostname.to_string()
}

/// The local machine's host label, used as the `<host>` argument of the
/// reconnect instruction.
pub fn local_host_label() -> String {
    host_label(&gethostname().to_string_lossy())
}

/// Strip the realm suffix `@ATHENA.MIT.EDU` from the sender identity, the
/// same trim `send_connect_message` applies to `ZGetSender()`'s output.
pub fn sender_label(principal: &Principal) -> String {
    let full = principal.to_string();
    full.strip_suffix(ATHENA_REALM_SUFFIX)
        .map(str::to_string)
        .unwrap_or(full)
}

/// The invitation body, reproducing `send_connect_message`'s `sprintf`
/// verbatim (spec section 6).
pub fn invitation_body(sender: &str, host: &str, port: u16) -> String {
    format!(
        "This user is requesting a krb5 user to user encrypted communication channel.\n\
         To open the channel type:\n\
         \n   add ktools\n   ktalk {sender} {host} {port}\n\
         \nat the Athena% prompt.\n"
    )
}

/// Delivers an invitation to the invited user. Implemented either by
/// spawning an external messenger or by publishing to a notification bus;
/// swapped in tests for a recording sink.
pub trait InvitationSink {
    fn deliver(&self, recipient: &str, sender: &str, host: &str, port: u16) -> Result<(), KtalkError>;
}

/// Forks `<path> <sender> <host> <port>`, matching ktalk.c's
/// `execlp(execstr, sender, hostname, port_str, NULL)`. The child's stdio is
/// inherited; its exit status is ignored by the parent (fire-and-forget),
/// reaped on a detached task instead of a blocking `wait3(NULL, WNOHANG, ...)`.
pub struct MessengerSink<'a> {
    pub path: &'a Path,
}

impl InvitationSink for MessengerSink<'_> {
    fn deliver(&self, _recipient: &str, sender: &str, host: &str, port: u16) -> Result<(), KtalkError> {
        let child = Command::new(self.path)
            .arg(sender)
            .arg(host)
            .arg(port.to_string())
            .spawn()
            .map_err(|e| {
                KtalkError::Transport(format!("could not exec {} to send connection message: {e}", self.path.display()))
            })?;
        reap_detached(child);
        Ok(())
    }
}

/// Publishes a Zephyr `message`/`personal` notice addressed to `recipient`,
/// matching `send_connect_message`'s `z_class`/`z_class_inst`/`z_kind`
/// fields and its two-element body (`list[0]` a filler "signature" line,
/// `list[1]` the invitation text).
pub struct NotificationBusSink;

impl InvitationSink for NotificationBusSink {
    fn deliver(&self, recipient: &str, sender: &str, host: &str, port: u16) -> Result<(), KtalkError> {
        let body = invitation_body(sender, host, port);
        // z_class=message, z_class_inst=personal, z_kind=ACKED (acknowledged,
        // authenticated), body = ["Advertise here", body].
        let child = Command::new("zwrite")
            .arg("-c").arg("message")
            .arg("-i").arg("personal")
            .arg("-s").arg("Advertise here")
            .arg("-m").arg(body)
            .arg(recipient)
            .spawn()
            .map_err(|e| KtalkError::Transport(format!("spawning zwrite: {e}")))?;
        reap_detached(child);
        Ok(())
    }
}

/// Reap a fire-and-forget child without blocking the caller — the async
/// equivalent of ktalk.c's `wait3(NULL, WNOHANG, NULL)` in the parent after
/// `fork`.
fn reap_detached(mut child: Child) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => debug!("invitation messenger exited successfully"),
            Ok(status) => warn!(?status, "invitation messenger exited with a non-zero status"),
            Err(e) => warn!(error = %e, "failed to reap invitation messenger child"),
        }
    });
}

/// Send the invitation, choosing the messenger sink when one is configured
/// and falling back to the notification bus otherwise (spec section 4.4).
pub fn invite(
    messenger: Option<&Path>,
    recipient: &Principal,
    local_principal: &Principal,
    host: &str,
    port: u16,
) -> Result<(), KtalkError> {
    let sender = sender_label(local_principal);
    match messenger {
        Some(path) => MessengerSink { path }.deliver(&recipient.to_string(), &sender, host, port),
        None => NotificationBusSink.deliver(&recipient.to_string(), &sender, host, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_mit_edu_suffix_case_insensitively() {
        assert_eq!(host_label("DIALUP.MIT.EDU"), "DIALUP");
        assert_eq!(host_label("dialup.mit.edu"), "dialup");
    }

    #[test]
    fn leaves_non_mit_hosts_untouched() {
        assert_eq!(host_label("workstation.example.org"), "workstation.example.org");
    }

    #[test]
    fn strips_athena_realm_suffix() {
        let p = Principal::parse("alice@ATHENA.MIT.EDU", "ATHENA.MIT.EDU").unwrap();
        assert_eq!(sender_label(&p), "alice");
    }

    #[test]
    fn keeps_foreign_realm_suffix() {
        let p = Principal::parse("alice@EXAMPLE.ORG", "ATHENA.MIT.EDU").unwrap();
        assert_eq!(sender_label(&p), "alice@EXAMPLE.ORG");
    }

    #[test]
    fn invitation_body_carries_the_literal_reconnect_command() {
        let body = invitation_body("alice", "dialup", 4115);
        assert!(body.contains("ktalk alice dialup 4115"));
        assert!(body.contains("add ktools"));
        assert!(body.contains("Athena%"));
    }

    struct RecordingSink {
        calls: std::cell::RefCell<Vec<(String, String, String, u16)>>,
    }

    impl InvitationSink for RecordingSink {
        fn deliver(&self, recipient: &str, sender: &str, host: &str, port: u16) -> Result<(), KtalkError> {
            self.calls.borrow_mut().push((recipient.to_string(), sender.to_string(), host.to_string(), port));
            Ok(())
        }
    }

    #[test]
    fn sink_trait_forwards_all_four_fields() {
        let sink = RecordingSink { calls: std::cell::RefCell::new(Vec::new()) };
        sink.deliver("bob@EXAMPLE.ORG", "alice", "dialup", 4115).unwrap();
        let calls = sink.calls.borrow();
        assert_eq!(calls[0], ("bob@EXAMPLE.ORG".into(), "alice".into(), "dialup".into(), 4115));
    }
}
