//! Sign-bit Vector Quantization
//!
//! A 384-dimension float vector is stored as 48 bytes: one bit per
//! dimension, set iff the component is strictly positive. Dimension `i`
//! lives in byte `i / 8` at bit `i % 8`.
//!
//! Dequantization recovers only the sign of each component, as `+1.0` or
//! `-1.0`. Magnitude is lost, so cosine similarity over dequantized vectors
//! is a coarse proxy for the true similarity (it tracks the fraction of
//! agreeing signs), not an exact value.

use serde::{Deserialize, Serialize};

use super::provider::{EmbeddingError, EmbeddingResult, EMBEDDING_DIMENSION};

/// Bytes in a quantized vector.
pub const QUANTIZED_BYTES: usize = EMBEDDING_DIMENSION / 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantizedVector(#[serde(with = "bytes_48")] [u8; QUANTIZED_BYTES]);

impl QuantizedVector {
    /// Quantize a 384-dimension vector.
    pub fn quantize(v: &[f32]) -> EmbeddingResult<Self> {
        if v.len() != EMBEDDING_DIMENSION {
            return Err(EmbeddingError::DimensionMismatch {
                expected: EMBEDDING_DIMENSION,
                actual: v.len(),
            });
        }
        let mut bytes = [0u8; QUANTIZED_BYTES];
        for (i, x) in v.iter().enumerate() {
            if *x > 0.0 {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        Ok(Self(bytes))
    }

    /// Rebuild a vector of `±1.0` signs. See the module docs: this is not
    /// the original vector.
    pub fn dequantize(&self) -> Vec<f32> {
        (0..EMBEDDING_DIMENSION)
            .map(|i| {
                if self.0[i / 8] & (1 << (i % 8)) != 0 {
                    1.0
                } else {
                    -1.0
                }
            })
            .collect()
    }

    /// Load from a stored blob, which must be exactly 48 bytes.
    pub fn from_bytes(bytes: &[u8]) -> EmbeddingResult<Self> {
        let array: [u8; QUANTIZED_BYTES] =
            bytes
                .try_into()
                .map_err(|_| EmbeddingError::DimensionMismatch {
                    expected: QUANTIZED_BYTES,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; QUANTIZED_BYTES] {
        &self.0
    }
}

/// Free-function form of [`QuantizedVector::quantize`].
pub fn quantize_embedding(v: &[f32]) -> EmbeddingResult<QuantizedVector> {
    QuantizedVector::quantize(v)
}

/// Free-function form of [`QuantizedVector::dequantize`].
pub fn dequantize_embedding(q: &QuantizedVector) -> Vec<f32> {
    q.dequantize()
}

mod bytes_48 {
    use super::QUANTIZED_BYTES;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; QUANTIZED_BYTES], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; QUANTIZED_BYTES], D::Error> {
        let v: Vec<u8> = Vec::deserialize(d)?;
        let len = v.len();
        v.try_into()
            .map_err(|_| D::Error::custom(format!("expected {} bytes, got {}", QUANTIZED_BYTES, len)))
    }
}
