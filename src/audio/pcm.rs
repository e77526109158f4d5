//! PCM16 little-endian conversion helpers.

/// Decodes PCM16 little-endian mono bytes into samples normalized to [-1, 1).
///
/// A trailing odd byte cannot form a sample and is ignored; callers that
/// care report it via [`has_partial_sample`].
pub fn pcm16_le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Encodes normalized samples as PCM16 little-endian bytes, clamping to range.
pub fn f32_to_pcm16_le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| ((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
        .collect()
}

/// True if `bytes` ends with half a sample.
pub fn has_partial_sample(bytes: &[u8]) -> bool {
    bytes.len() % 2 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_values() {
        let bytes = [0x00, 0x00, 0x00, 0x40, 0x00, 0xC0];
        let samples = pcm16_le_to_f32(&bytes);
        assert_eq!(samples, vec![0.0, 0.5, -0.5]);
    }

    #[test]
    fn test_decode_ignores_trailing_byte() {
        let bytes = [0x00, 0x40, 0x7F];
        assert!(has_partial_sample(&bytes));
        assert_eq!(pcm16_le_to_f32(&bytes), vec![0.5]);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = f32_to_pcm16_le(&[2.0, -2.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -32767);
    }

    #[test]
    fn test_empty_input() {
        assert!(pcm16_le_to_f32(&[]).is_empty());
        assert!(f32_to_pcm16_le(&[]).is_empty());
        assert!(!has_partial_sample(&[]));
    }
}
