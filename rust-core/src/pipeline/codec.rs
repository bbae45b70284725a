//! Channel de-interleaving and re-interleaving
//!
//! An interleaved frame of `L` samples over `C` channels is viewed as an
//! `(L / C) x C` row-major matrix: columns are channels, rows are sample
//! instants.

use crate::error::{PipelineError, Result};
use ndarray::{Array2, ArrayView2};

/// Split an interleaved frame into one sequence per channel
///
/// Sequence `k` holds samples `k, k + C, k + 2C, ...`.
pub fn split<T: Clone>(frame: &[T], channels: usize) -> Result<Vec<Vec<T>>> {
    if channels == 0 {
        return Err(PipelineError::Config(
            "channel count must be greater than 0".to_string(),
        ));
    }
    if frame.len() % channels != 0 {
        return Err(PipelineError::ChannelMismatch {
            len: frame.len(),
            channels,
        });
    }
    if frame.is_empty() {
        return Ok(vec![Vec::new(); channels]);
    }

    let view = ArrayView2::from_shape((frame.len() / channels, channels), frame)
        .map_err(|e| PipelineError::Config(e.to_string()))?;

    Ok(view.columns().into_iter().map(|column| column.to_vec()).collect())
}

/// Round-robin merge of equal-length channel sequences
pub fn merge<T: Clone>(sequences: &[Vec<T>]) -> Result<Vec<T>> {
    let Some(first) = sequences.first() else {
        return Ok(Vec::new());
    };

    let len = first.len();
    if let Some((k, seq)) = sequences.iter().enumerate().find(|(_, s)| s.len() != len) {
        return Err(PipelineError::Config(format!(
            "channel {} has length {}, expected {}",
            k,
            seq.len(),
            len
        )));
    }

    let interleaved = Array2::from_shape_fn((len, sequences.len()), |(i, k)| sequences[k][i].clone());
    Ok(interleaved.into_raw_vec())
}

/// Split/merge bound to a fixed channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCodec {
    channels: usize,
}

impl ChannelCodec {
    pub fn new(channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(PipelineError::Config(
                "channel count must be greater than 0".to_string(),
            ));
        }
        Ok(Self { channels })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn split<T: Clone>(&self, frame: &[T]) -> Result<Vec<Vec<T>>> {
        split(frame, self.channels)
    }

    pub fn merge<T: Clone>(&self, sequences: &[Vec<T>]) -> Result<Vec<T>> {
        if sequences.len() != self.channels {
            return Err(PipelineError::Config(format!(
                "expected {} channel sequences, got {}",
                self.channels,
                sequences.len()
            )));
        }
        merge(sequences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_stereo() {
        let channels = split(&[1, 10, 2, 20, 3, 30], 2).unwrap();
        assert_eq!(channels, vec![vec![1, 2, 3], vec![10, 20, 30]]);
    }

    #[test]
    fn test_merge_three_channels() {
        let merged = merge(&[vec![1, 4], vec![2, 5], vec![3, 6]]).unwrap();
        assert_eq!(merged, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_merge_inverts_split() {
        for channels in 1..=6 {
            for frames in 0..5 {
                let frame: Vec<i64> = (0..(channels * frames) as i64).map(|n| n * 7 - 3).collect();
                let parts = split(&frame, channels).unwrap();
                assert_eq!(parts.len(), channels);
                assert!(parts.iter().all(|p| p.len() == frames));
                assert_eq!(merge(&parts).unwrap(), frame);
            }
        }
    }

    #[test]
    fn test_split_rejects_misaligned_frame() {
        match split(&[1.0, 2.0, 3.0], 2) {
            Err(PipelineError::ChannelMismatch { len, channels }) => {
                assert_eq!(len, 3);
                assert_eq!(channels, 2);
            }
            other => panic!("expected ChannelMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_split_rejects_zero_channels() {
        assert!(matches!(split(&[1.0], 0), Err(PipelineError::Config(_))));
        assert!(ChannelCodec::new(0).is_err());
    }

    #[test]
    fn test_merge_rejects_ragged_input() {
        assert!(matches!(
            merge(&[vec![1, 2], vec![3]]),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_merge_empty() {
        let empty: Vec<Vec<f64>> = Vec::new();
        assert!(merge(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_codec_checks_sequence_count() {
        let codec = ChannelCodec::new(2).unwrap();
        assert!(codec.merge(&[vec![1.0]]).is_err());
        assert_eq!(codec.merge(&[vec![1.0], vec![2.0]]).unwrap(), vec![1.0, 2.0]);
    }
}
