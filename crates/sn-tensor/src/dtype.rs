use std::fmt;

use crate::error::{Result, TensorError};

/// Element encodings a checkpoint may store variables in.
///
/// Every tensor is widened to f32 once it is decoded; the dtype only
/// describes the on-disk representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-bit floating point.
    #[default]
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
}

impl DType {
    /// Returns the size in bytes of a single stored element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
        }
    }

    /// Parses the dtype names used in checkpoint manifests.
    pub fn from_manifest_name(name: &str) -> Option<DType> {
        match name {
            "float32" | "f32" => Some(DType::F32),
            "float16" | "f16" => Some(DType::F16),
            _ => None,
        }
    }

    /// Decodes `numel` little-endian elements of this dtype into f32 values.
    pub fn decode_le(&self, data: &[u8], numel: usize) -> Result<Vec<f32>> {
        let expected = numel * self.size_in_bytes();
        if data.len() != expected {
            return Err(TensorError::Other(format!(
                "{} payload holds {} bytes, expected {} for {} elements",
                self,
                data.len(),
                expected,
                numel
            )));
        }
        let out = match self {
            DType::F32 => data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            DType::F16 => data
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
        };
        Ok(out)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "float32"),
            DType::F16 => write!(f, "float16"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F16.size_in_bytes(), 2);
    }

    #[test]
    fn test_manifest_names() {
        assert_eq!(DType::from_manifest_name("float32"), Some(DType::F32));
        assert_eq!(DType::from_manifest_name("float16"), Some(DType::F16));
        assert_eq!(DType::from_manifest_name("int8"), None);
    }

    #[test]
    fn test_decode_f32() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(DType::F32.decode_le(&bytes, 2).unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_decode_f16() {
        let bytes: Vec<u8> = [0.5f32, 3.0]
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
            .collect();
        assert_eq!(DType::F16.decode_le(&bytes, 2).unwrap(), vec![0.5, 3.0]);
    }

    #[test]
    fn test_decode_length_mismatch() {
        assert!(DType::F32.decode_le(&[0u8; 6], 2).is_err());
    }
}
