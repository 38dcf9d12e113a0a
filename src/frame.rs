//! Length-prefixed frame codec (spec section 4.1).
//!
//! A frame on the wire is a decimal ASCII length, a single NUL byte, then
//! exactly that many payload bytes. It's the one piece of wire format this
//! whole session runs on: the TGT ticket, the AP-REQ, and every sealed chat
//! line are each carried as one frame.
//!
//! Generic over `AsyncRead`/`AsyncWrite` rather than tied to `TcpStream`
//! directly, so tests can drive the codec over an in-memory duplex pipe.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::KtalkError;

/// Frames are capped at 1 KiB — large enough for any chat line (which is
/// itself capped at 1024 bytes including its terminating NUL), small enough
/// to bound scratch-buffer allocation without a streaming read path.
pub const MAX_FRAME_LEN: usize = 1024;

/// The result of attempting to read one frame: either a payload, or a clean
/// close observed before any byte of the next length prefix arrived.
///
/// Distinguishing these matters because EOF on the length prefix is the
/// ordinary way a peer hangs up (no separate "goodbye" message exists), while
/// EOF in the middle of a payload means the peer died mid-frame — a protocol
/// violation worth treating differently in logs even though both currently
/// end the session.
#[derive(Debug)]
pub enum FrameEvent {
    Frame(Vec<u8>),
    Closed,
}

/// Write one frame: `len(payload)` in decimal ASCII, a NUL, then the bytes.
///
/// `AsyncWriteExt::write_all` already retries on short writes, so there is
/// no partial-write handling to do here beyond calling it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), KtalkError>
where
    W: AsyncWrite + Unpin,
{
    if payload.is_empty() || payload.len() > MAX_FRAME_LEN {
        return Err(KtalkError::Protocol(format!(
            "refusing to write a frame of length {} (must be 1..={MAX_FRAME_LEN})",
            payload.len()
        )));
    }
    let mut header = payload.len().to_string().into_bytes();
    header.push(0);
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame: accumulate ASCII digits into a scratch buffer until a NUL
/// is seen, parse the length, then read exactly that many payload bytes.
pub async fn read_frame<R>(reader: &mut R) -> Result<FrameEvent, KtalkError>
where
    R: AsyncRead + Unpin,
{
    let mut len_digits = Vec::with_capacity(4);
    loop {
        let mut byte = [0u8; 1];
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            // EOF anywhere in the length prefix — including before any
            // digit has arrived — is a clean close, never a protocol error.
            if len_digits.is_empty() {
                return Ok(FrameEvent::Closed);
            }
            return Err(KtalkError::Protocol(
                "connection closed mid length-prefix".into(),
            ));
        }
        if byte[0] == 0 {
            break;
        }
        len_digits.push(byte[0]);
        if len_digits.len() > 10 {
            return Err(KtalkError::Protocol(
                "length prefix exceeded 10 digits without a NUL terminator".into(),
            ));
        }
    }

    let len_str = std::str::from_utf8(&len_digits)
        .map_err(|_| KtalkError::Protocol("length prefix was not valid ASCII".into()))?;
    let len: usize = len_str
        .parse()
        .map_err(|_| KtalkError::Protocol(format!("unparseable frame length {len_str:?}")))?;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(KtalkError::Protocol(format!(
            "frame length {len} out of range (must be 1..={MAX_FRAME_LEN})"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        KtalkError::Protocol(format!("connection closed mid payload ({len} bytes expected): {e}"))
    })?;
    Ok(FrameEvent::Frame(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_arbitrary_payload() {
        let (mut a, mut b) = duplex(4096);
        let payload = b"hello world\0".to_vec();
        write_frame(&mut a, &payload).await.unwrap();
        match read_frame(&mut b).await.unwrap() {
            FrameEvent::Frame(got) => assert_eq!(got, payload),
            FrameEvent::Closed => panic!("expected a frame"),
        }
    }

    #[tokio::test]
    async fn accepts_exactly_max_length() {
        let (mut a, mut b) = duplex(4096);
        let payload = vec![b'x'; MAX_FRAME_LEN];
        write_frame(&mut a, &payload).await.unwrap();
        match read_frame(&mut b).await.unwrap() {
            FrameEvent::Frame(got) => assert_eq!(got.len(), MAX_FRAME_LEN),
            FrameEvent::Closed => panic!("expected a frame"),
        }
    }

    #[tokio::test]
    async fn rejects_length_over_max() {
        let (mut a, mut b) = duplex(4096);
        // Write the raw header by hand: write_frame() itself refuses to
        // emit an over-length frame, so we bypass it to exercise the reader.
        let header = format!("{}\0", MAX_FRAME_LEN + 1);
        a.write_all(header.as_bytes()).await.unwrap();
        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(KtalkError::Protocol(_))));
    }

    #[tokio::test]
    async fn rejects_zero_length() {
        let (mut a, mut b) = duplex(4096);
        a.write_all(b"0\0").await.unwrap();
        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(KtalkError::Protocol(_))));
    }

    #[tokio::test]
    async fn rejects_unparseable_length() {
        let (mut a, mut b) = duplex(4096);
        a.write_all(b"not-a-number\0").await.unwrap();
        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(KtalkError::Protocol(_))));
    }

    #[tokio::test]
    async fn clean_close_before_any_digit() {
        let (a, mut b) = duplex(4096);
        drop(a);
        let result = read_frame(&mut b).await.unwrap();
        assert!(matches!(result, FrameEvent::Closed));
    }

    #[tokio::test]
    async fn eof_mid_payload_is_protocol_error() {
        let (mut a, mut b) = duplex(4096);
        a.write_all(b"10\0abc").await.unwrap();
        drop(a);
        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(KtalkError::Protocol(_))));
    }

    #[tokio::test]
    async fn write_frame_rejects_empty_payload() {
        let (mut a, _b) = duplex(4096);
        let result = write_frame(&mut a, b"").await;
        assert!(matches!(result, Err(KtalkError::Protocol(_))));
    }
}
