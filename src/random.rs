use crate::error::PkceError;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Mutex;

/// Source of uniformly distributed integers in `[0, bound)`.
///
/// Shared across concurrent authorization attempts, hence `Send + Sync`.
pub trait RandomSource: Send + Sync {
    fn next(&self, bound: usize) -> Result<usize, PkceError>;
}

/// Operating-system CSPRNG. Failures surface as `EntropyUnavailable`,
/// there is no fallback generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomSource;

impl OsRandomSource {
    pub fn new() -> Self {
        Self
    }

    fn draw_u64(&self) -> Result<u64, PkceError> {
        let mut buf = [0u8; 8];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| PkceError::EntropyUnavailable(e.to_string()))?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl RandomSource for OsRandomSource {
    fn next(&self, bound: usize) -> Result<usize, PkceError> {
        if bound == 0 {
            return Err(PkceError::InvalidArgument(
                "random bound must be positive".into(),
            ));
        }
        let bound = bound as u64;
        // 2^64 mod bound: draws below this would over-represent the low residues
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let v = self.draw_u64()?;
            if v >= threshold {
                return Ok((v % bound) as usize);
            }
        }
    }
}

/// Replays a fixed sequence of values, then reports exhaustion as
/// `EntropyUnavailable`. Used to pin verifier output in tests and demos.
#[derive(Debug)]
pub struct SequenceSource {
    values: Vec<usize>,
    pos: Mutex<usize>,
}

impl SequenceSource {
    pub fn new(values: Vec<usize>) -> Self {
        Self {
            values,
            pos: Mutex::new(0),
        }
    }

    /// Number of values handed out so far.
    pub fn consumed(&self) -> usize {
        *self.pos.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RandomSource for SequenceSource {
    fn next(&self, bound: usize) -> Result<usize, PkceError> {
        if bound == 0 {
            return Err(PkceError::InvalidArgument(
                "random bound must be positive".into(),
            ));
        }
        let mut pos = self.pos.lock().unwrap_or_else(|e| e.into_inner());
        let v = *self.values.get(*pos).ok_or_else(|| {
            PkceError::EntropyUnavailable("exhausted values in sequence source".into())
        })?;
        *pos += 1;
        Ok(v)
    }
}
