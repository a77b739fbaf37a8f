//! Message codec: framing and serialization for the wire protocol.
//!
//! Every frame is a 4-byte big-endian body length followed by the
//! bincode-encoded [`Message`]. The enum tag is the type discriminator.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Message;
use crate::ProtocolError;

/// Maximum message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Encode a message for transmission (length-prefixed bincode).
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let body = bincode::serialize(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a message from a frame body (without the length prefix).
pub fn decode(body: &[u8]) -> Result<Message, ProtocolError> {
    bincode::deserialize(body).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Write an already-encoded frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame body.
///
/// Returns `Ok(None)` on a clean close between frames. A length prefix above
/// [`MAX_MESSAGE_SIZE`] is rejected before any body bytes are read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let body_len = u32::from_be_bytes(len_buf) as usize;
    if body_len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body_len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ApplicationMessage;

    fn app(topic: &str) -> Message {
        Message::Application(ApplicationMessage {
            topic: topic.into(),
            payload: vec![1, 2, 3],
        })
    }

    #[test]
    fn encode_prefixes_body_length() {
        let frame = encode(&app("offers")).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        assert_eq!(decode(&frame[4..]).unwrap(), app("offers"));
    }

    #[test]
    fn decode_garbage_is_malformed() {
        let err = decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn deeply_nested_guarded_frame_is_malformed() {
        // 200k guarded variant tags stacked in one frame under the size cap.
        let mut body = [2u8, 0, 0, 0].repeat(200_000);
        body.extend_from_slice(&encode(&app("x")).unwrap()[4..]);
        assert!(body.len() < MAX_MESSAGE_SIZE);
        let err = decode(&body).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[tokio::test]
    async fn frames_survive_a_stream() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, &encode(&app("one")).unwrap()).await.unwrap();
        write_frame(&mut a, &encode(&app("two")).unwrap()).await.unwrap();
        drop(a);

        let first = read_frame(&mut b).await.unwrap().unwrap();
        let second = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(decode(&first).unwrap(), app("one"));
        assert_eq!(decode(&second).unwrap(), app("two"));
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let len = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
        write_frame(&mut a, &len).await.unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, &[0, 0, 0, 10, 1, 2]).await.unwrap();
        drop(a);

        assert!(read_frame(&mut b).await.is_err());
    }
}
