//! src/services/checksum_relay.rs
//!
//! Copies a byte stream into an object sink one fixed-size chunk at a time,
//! folding each written chunk into a CRC-32 (IEEE, reflected polynomial
//! `0xEDB88320`, via `crc32fast`). At most one chunk is buffered regardless of input size.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default chunk size: 4 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Incremental CRC-32 accumulator over `crc32fast`.
#[derive(Clone, Debug, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Final value of the bytes seen so far; the accumulator stays usable.
    pub fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// Render a CRC-32 as 8 lowercase hex digits.
pub fn checksum_hex(value: u32) -> String {
    format!("{value:08x}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub crc: u32,
    /// `crc` as 8 lowercase hex digits.
    pub checksum: String,
    pub bytes: u64,
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// Caller cancelled; whatever reached the sink stays there.
    #[error("relay cancelled after {bytes} bytes")]
    Cancelled { bytes: u64 },
    #[error("reading upload stream failed after {bytes} bytes: {source}")]
    Source { bytes: u64, source: io::Error },
    #[error("writing to object sink failed after {bytes} bytes: {source}")]
    Sink { bytes: u64, source: io::Error },
}

#[derive(Clone, Debug)]
pub struct ChecksumRelay {
    buffer_size: usize,
}

impl ChecksumRelay {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Relay `reader` into `sink` until EOF, then flush and shut the sink
    /// down. The checksum covers exactly the bytes the sink accepted.
    pub async fn relay<R, W>(
        &self,
        reader: R,
        sink: W,
        cancel: &CancellationToken,
    ) -> Result<RelayOutcome, RelayError>
    where
        R: AsyncRead + Send,
        W: AsyncWrite + Send,
    {
        tokio::pin!(reader);
        tokio::pin!(sink);

        let mut buffer = vec![0u8; self.buffer_size];
        let mut crc = Crc32::new();
        let mut total: u64 = 0;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RelayError::Cancelled { bytes: total }),
                read = fill_chunk(&mut reader, &mut buffer) => {
                    read.map_err(|source| RelayError::Source { bytes: total, source })?
                }
            };
            if read == 0 {
                break;
            }

            let chunk = &buffer[..read];
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RelayError::Cancelled { bytes: total }),
                written = sink.write_all(chunk) => {
                    written.map_err(|source| RelayError::Sink { bytes: total, source })?
                }
            }
            crc.update(chunk);
            total += read as u64;
            debug!(bytes = total, "relayed chunk");
        }

        sink.flush()
            .await
            .map_err(|source| RelayError::Sink { bytes: total, source })?;
        sink.shutdown()
            .await
            .map_err(|source| RelayError::Sink { bytes: total, source })?;

        let value = crc.finalize();
        Ok(RelayOutcome {
            crc: value,
            checksum: checksum_hex(value),
            bytes: total,
        })
    }
}

impl Default for ChecksumRelay {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Read until `buffer` is full or the source is exhausted.
async fn fill_chunk<R>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[test]
    fn crc_of_check_string() {
        let mut crc = Crc32::new();
        crc.update(b"123456789");
        assert_eq!(crc.finalize(), 0xCBF4_3926);
    }

    #[test]
    fn crc_is_chunking_independent() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut crc = Crc32::new();
        for piece in data.chunks(7) {
            crc.update(piece);
        }
        let partial = crc.finalize();
        assert_eq!(partial, crc32fast::hash(&data));
        // Reading the value does not consume the accumulator.
        crc.update(b"!");
        assert_ne!(crc.finalize(), partial);
    }

    #[tokio::test]
    async fn relays_check_string() {
        let relay = ChecksumRelay::new(4);
        let mut sink = Vec::new();
        let outcome = relay
            .relay(&b"123456789"[..], &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.crc, 0xCBF4_3926);
        assert_eq!(outcome.checksum, "cbf43926");
        assert_eq!(outcome.bytes, 9);
        assert_eq!(sink, b"123456789");
    }

    #[tokio::test]
    async fn empty_input_has_zero_checksum() {
        let mut sink = Vec::new();
        let outcome = ChecksumRelay::default()
            .relay(&b""[..], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.checksum, "00000000");
        assert_eq!(outcome.bytes, 0);
    }

    #[tokio::test]
    async fn large_input_matches_reference_crc() {
        let data: Vec<u8> = (0..1_000_003u32).map(|i| (i % 253) as u8).collect();
        let mut sink = Vec::new();
        let outcome = ChecksumRelay::new(64 * 1024)
            .relay(&data[..], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.crc, crc32fast::hash(&data));
        assert_eq!(outcome.bytes, data.len() as u64);
        assert_eq!(sink.len(), data.len());
    }

    #[tokio::test]
    async fn cancellation_leaves_partial_sink_content() {
        let (mut client, server) = duplex(64);
        client.write_all(b"abcdef").await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut sink = Vec::new();
        let err = ChecksumRelay::new(3)
            .relay(server, &mut sink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Cancelled { bytes: 6 }));
        assert_eq!(sink, b"abcdef");
        drop(client);
    }

    #[tokio::test]
    async fn pre_cancelled_token_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = Vec::new();
        let err = ChecksumRelay::new(3)
            .relay(&b"abc"[..], &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Cancelled { bytes: 0 }));
        assert!(sink.is_empty());
    }
}
