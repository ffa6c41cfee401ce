use super::{
    error::RelayError,
    framing::{declared_length, frame, LENGTH_PREFIX_SIZE},
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sends one query over the channel and reads back one framed response.
///
/// The returned bytes still carry the 2-byte length prefix.
pub async fn exchange<S>(channel: &mut S, query: &[u8], timeout: Duration) -> Result<Vec<u8>, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let framed_query = frame(query)?;

    tokio::time::timeout(timeout, async {
        channel.write_all(&framed_query).await?;
        channel.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    .map_err(|_| RelayError::UpstreamTimeout)??;

    tokio::time::timeout(timeout, read_framed(channel))
        .await
        .map_err(|_| RelayError::UpstreamTimeout)?
}

/// Reads the length prefix and then exactly that many bytes.
async fn read_framed<S>(channel: &mut S) -> Result<Vec<u8>, RelayError>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let received = read_until_full(channel, &mut prefix).await?;
    if received == 0 {
        return Err(RelayError::EmptyResponse);
    }
    if received < LENGTH_PREFIX_SIZE {
        return Err(RelayError::TruncatedResponse {
            expected: LENGTH_PREFIX_SIZE,
            received,
        });
    }

    let length = declared_length(prefix);
    if length == 0 {
        return Err(RelayError::EmptyResponse);
    }

    let mut framed = vec![0u8; LENGTH_PREFIX_SIZE + length];
    framed[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);
    let received = read_until_full(channel, &mut framed[LENGTH_PREFIX_SIZE..]).await?;
    if received < length {
        return Err(RelayError::TruncatedResponse {
            expected: length,
            received,
        });
    }
    Ok(framed)
}

/// Fills `buf` unless the peer closes first. Returns the number of bytes read.
async fn read_until_full<S>(channel: &mut S, buf: &mut [u8]) -> std::io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = channel.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
