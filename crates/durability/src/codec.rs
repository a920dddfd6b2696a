//! Entry codec: payload framing and integrity verification.
//!
//! `encode` computes one digest over the whole payload (kind tag + bytes)
//! and splits the bytes into chunks of at most `max_entry_size`, stamping
//! every chunk with `{digest, index, total}`. `decode` requires a complete,
//! contiguous run before recomputing the digest over the reassembled bytes.
//!
//! A payload of `n` bytes always produces `max(1, ⌈n / max_entry_size⌉)`
//! frames; an empty payload is one zero-length frame.

use crate::digest::{Digest, DigestAlgorithm};
use crate::format::Frame;
use replog_core::{Error, Payload, PayloadKind, Result};
use std::sync::Arc;

/// Splits payloads into frames and reassembles them.
#[derive(Debug, Clone)]
pub struct EntryCodec {
    max_entry_size: usize,
    digest: Arc<dyn DigestAlgorithm>,
}

impl EntryCodec {
    /// Create a codec.
    ///
    /// `max_entry_size` is clamped to at least one byte.
    pub fn new(max_entry_size: usize, digest: Arc<dyn DigestAlgorithm>) -> Self {
        EntryCodec {
            max_entry_size: max_entry_size.max(1),
            digest,
        }
    }

    /// Maximum chunk size per frame
    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// Digest algorithm in use
    pub fn digest_algorithm(&self) -> &Arc<dyn DigestAlgorithm> {
        &self.digest
    }

    /// Number of frames a payload of `len` bytes encodes to.
    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            1
        } else {
            (len + self.max_entry_size - 1) / self.max_entry_size
        }
    }

    /// Split a payload into an ordered run of frames.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<Frame>> {
        let count = self.frame_count(payload.len());
        let total = u32::try_from(count).map_err(|_| {
            Error::Serialization(format!(
                "payload of {} bytes needs {} frames, more than a run can hold",
                payload.len(),
                count
            ))
        })?;
        let digest = self.payload_digest(payload.kind(), payload.data());

        if payload.is_empty() {
            return Ok(vec![Frame {
                kind: payload.kind(),
                digest,
                index: 0,
                total,
                chunk: Vec::new(),
            }]);
        }

        Ok(payload
            .data()
            .chunks(self.max_entry_size)
            .enumerate()
            .map(|(index, chunk)| Frame {
                kind: payload.kind(),
                digest: digest.clone(),
                index: index as u32,
                total,
                chunk: chunk.to_vec(),
            })
            .collect())
    }

    /// Reassemble and verify one complete run of frames.
    pub fn decode(&self, frames: &[Frame]) -> Result<Payload> {
        let first = self.check_run(frames)?;
        if frames.len() != first.total as usize {
            return Err(Error::corruption(format!(
                "incomplete run: {} of {} frames present",
                frames.len(),
                first.total
            )));
        }

        let len = frames.iter().map(|f| f.chunk.len()).sum();
        let mut data = Vec::with_capacity(len);
        for frame in frames {
            data.extend_from_slice(&frame.chunk);
        }

        let computed = self.payload_digest(first.kind, &data);
        if computed != first.digest {
            return Err(Error::corruption(format!(
                "digest mismatch ({}): stored {}, computed {}",
                self.digest.name(),
                first.digest,
                computed
            )));
        }

        Ok(Payload::new(first.kind, data))
    }

    /// Validate run metadata without requiring the run to be complete.
    ///
    /// Frames must start at index 0, be contiguous, and agree on kind,
    /// digest and total. Returns the first frame.
    pub fn check_run<'a>(&self, frames: &'a [Frame]) -> Result<&'a Frame> {
        let first = frames
            .first()
            .ok_or_else(|| Error::corruption("empty frame run"))?;
        if first.total == 0 {
            return Err(Error::corruption("frame declares a run of zero frames"));
        }
        if frames.len() > first.total as usize {
            return Err(Error::corruption(format!(
                "run has {} frames but declares {}",
                frames.len(),
                first.total
            )));
        }

        for (expected, frame) in frames.iter().enumerate() {
            if frame.index as usize != expected {
                return Err(Error::corruption(format!(
                    "non-contiguous frame: expected index {}, found {}",
                    expected, frame.index
                )));
            }
            if frame.kind != first.kind || frame.total != first.total || frame.digest != first.digest
            {
                return Err(Error::corruption(format!(
                    "frame {} does not belong to the run started by frame 0",
                    frame.index
                )));
            }
        }
        Ok(first)
    }

    fn payload_digest(&self, kind: PayloadKind, data: &[u8]) -> Digest {
        self.digest.digest(&[&[kind.as_u8()], data])
    }
}
