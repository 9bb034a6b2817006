//! Reading and writing framed messages on async byte streams

use crate::codec::{decode_message, encode};
use crate::frame::check_length;
use crate::varint::VarintDecoder;
use crate::{CodecError, Message, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Serialize `message` and write it as one frame.
///
/// The full frame is built before the first byte reaches the sink, so the
/// length prefix always matches what follows.
pub async fn write_message<W>(message: &Message, sink: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode(message)?;
    sink.write_all(&frame).await?;
    sink.flush().await?;
    debug!(
        "wrote {} (request {}, {} bytes)",
        message.name(),
        message.request_id(),
        frame.len()
    );
    Ok(())
}

/// Read exactly one frame and decode its message.
///
/// The whole body is consumed before decoding starts; when decoding fails the
/// source is already positioned at the next frame.
pub async fn read_message<R>(source: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = read_length(source).await?;
    check_length(len)?;

    let len = len as usize;
    let mut body = vec![0u8; len];
    source.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::Truncated {
                needed: len,
                have: 0,
            }
        } else {
            CodecError::Io(e)
        }
    })?;

    let message = decode_message(&body)?;
    debug!(
        "read {} (request {}, {} bytes)",
        message.name(),
        message.request_id(),
        body.len()
    );
    Ok(message)
}

async fn read_length<R>(source: &mut R) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut decoder = VarintDecoder::new();
    loop {
        let byte = match source.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(CodecError::Truncated {
                    needed: decoder.consumed() + 1,
                    have: decoder.consumed(),
                });
            }
            Err(e) => return Err(CodecError::Io(e)),
        };
        if let Some(len) = decoder.push(byte)? {
            return Ok(len);
        }
    }
}
