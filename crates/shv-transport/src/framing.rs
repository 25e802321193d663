//! Byte-stream framing: turns a raw `AsyncRead`/`AsyncWrite` byte stream
//! into discrete message payloads (spec §4.3).
//!
//! Three framings share one contract — `read_frame`/`write_frame` — and
//! all of them recover at the next frame boundary after a decode error
//! without the caller ever seeing it as an error (spec §4.3: "recover at
//! message boundaries after a decode error").

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FramingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Block,
    Serial,
    SerialCrc,
}

pub(crate) async fn read_frame<R: AsyncRead + Unpin>(
    kind: Framing,
    r: &mut R,
) -> Result<Vec<u8>, FramingError> {
    match kind {
        Framing::Block => read_block_frame(r).await,
        Framing::Serial => read_serial_frame(r, false).await,
        Framing::SerialCrc => read_serial_frame(r, true).await,
    }
}

pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(
    kind: Framing,
    w: &mut W,
    payload: &[u8],
) -> Result<(), FramingError> {
    match kind {
        Framing::Block => write_block_frame(w, payload).await,
        Framing::Serial => write_serial_frame(w, payload, false).await,
        Framing::SerialCrc => write_serial_frame(w, payload, true).await,
    }
}

// ---- Block framing: ChainPack-UInt length prefix + payload ----

async fn read_block_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, FramingError> {
    let len = read_uint_async(r).await? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_block_frame<W: AsyncWrite + Unpin>(
    w: &mut W,
    payload: &[u8],
) -> Result<(), FramingError> {
    let mut header = Vec::new();
    shv_chainpack::write_uint_prefix(&mut header, payload.len() as u64);
    w.write_all(&header).await?;
    w.write_all(payload).await?;
    w.flush().await?;
    Ok(())
}

/// Streaming counterpart of `shv_chainpack::read_uint_prefix`, byte by
/// byte off an `AsyncRead` rather than an in-memory slice — the decode
/// rule (leading 1-bits in the first byte give the trailing byte count)
/// is identical, just driven a byte at a time.
async fn read_uint_async<R: AsyncRead + Unpin>(r: &mut R) -> Result<u64, FramingError> {
    let first = r.read_u8().await?;
    if first < 0x80 {
        return Ok(first as u64);
    }
    let l = (!first).leading_zeros();
    if l >= 8 {
        let mut buf = [0u8; 8];
        r.read_exact(&mut buf).await?;
        return Ok(u64::from_be_bytes(buf));
    }
    let databits = 7 - l;
    let trailing = l as usize;
    let mut value = if databits == 0 {
        0u64
    } else {
        (first & ((1u16 << databits) as u8).wrapping_sub(1)) as u64
    };
    let mut rest = vec![0u8; trailing];
    r.read_exact(&mut rest).await?;
    for b in rest {
        value = (value << 8) | b as u64;
    }
    Ok(value)
}

// ---- Serial / Serial-CRC framing: STX/ETX/ATX/ESC byte stuffing ----

const STX: u8 = 0xa2;
const ETX: u8 = 0xa3;
const ATX: u8 = 0xa4;
const ESC: u8 = 0xaa;

async fn write_serial_frame<W: AsyncWrite + Unpin>(
    w: &mut W,
    payload: &[u8],
    crc: bool,
) -> Result<(), FramingError> {
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.push(STX);
    push_escaped(&mut out, payload);
    if crc {
        let checksum = crc32fast::hash(payload);
        push_escaped(&mut out, &checksum.to_be_bytes());
    }
    out.push(ETX);
    w.write_all(&out).await?;
    w.flush().await?;
    Ok(())
}

fn push_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if matches!(b, STX | ETX | ATX | ESC) {
            out.push(ESC);
            out.push(b ^ 0x20);
        } else {
            out.push(b);
        }
    }
}

/// Reads frames until one decodes successfully, silently discarding
/// CRC-mismatched frames and mid-frame aborts along the way — none of
/// those advance the reader's message count or surface as an error
/// (spec §4.3, §8 property 3).
async fn read_serial_frame<R: AsyncRead + Unpin>(
    r: &mut R,
    crc: bool,
) -> Result<Vec<u8>, FramingError> {
    'frames: loop {
        // Scan for STX, the frame start marker.
        loop {
            let b = r.read_u8().await?;
            if b == STX {
                break;
            }
        }

        let mut buf = Vec::new();
        loop {
            let b = r.read_u8().await?;
            match b {
                ETX => break,
                ESC => {
                    let next = r.read_u8().await?;
                    buf.push(next ^ 0x20);
                }
                ATX => {
                    if buf.is_empty() {
                        let next = r.read_u8().await?;
                        if next == ETX {
                            return Err(FramingError::PeerReset);
                        }
                        // Malformed RESET attempt: drop and resync.
                        continue 'frames;
                    }
                    // Mid-frame abort: discard and look for the next frame.
                    continue 'frames;
                }
                STX => {
                    // Stray start marker: restart the frame from here.
                    buf.clear();
                    continue;
                }
                other => buf.push(other),
            }
        }

        if !crc {
            return Ok(buf);
        }
        if buf.len() < 4 {
            continue 'frames;
        }
        let split = buf.len() - 4;
        let (payload, checksum_bytes) = buf.split_at(split);
        let expected = u32::from_be_bytes(checksum_bytes.try_into().unwrap());
        if crc32fast::hash(payload) == expected {
            return Ok(payload.to_vec());
        }
        // CRC mismatch: drop silently per spec §4.3.
    }
}
