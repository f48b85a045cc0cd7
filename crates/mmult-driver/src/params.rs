//! Parameter loading
//!
//! The offset vector and weight matrix arrive once per invocation, ahead of
//! any input tile:
//!
//! ```text
//! offset words : ceil(CLASSES / OUT_RATIO)   OUT_RATIO offsets per word
//! weight words : CLASSES · FEAT / W_RATIO    W_RATIO features per word, row-major
//! ```
//!
//! After loading they are read-only; the dot-product stage shares them by
//! reference across threads.

use crate::error::{EngineError, Result};
use crate::transport::{Metered, WordSource};
use mmult_chip::{Codec, Geometry};
use tracing::debug;

/// On-chip copy of the offset vector and weight matrix
#[derive(Debug, Clone)]
pub struct Parameters<G: Geometry> {
    offsets: Box<[G::Output]>,
    weights: Box<[G::Weight]>,
}

impl<G: Geometry> Parameters<G> {
    /// Zero-filled buffers sized for `G`
    pub fn zeroed() -> Self {
        let dims = G::DIMS;
        Self {
            offsets: vec![G::Output::default(); dims.classes].into_boxed_slice(),
            weights: vec![G::Weight::default(); dims.classes * dims.feat].into_boxed_slice(),
        }
    }

    /// Build from host-side buffers (`weights` row-major, `CLASSES × FEAT`)
    ///
    /// # Errors
    ///
    /// Returns error if either buffer has the wrong length.
    pub fn from_parts(offsets: &[G::Output], weights: &[G::Weight]) -> Result<Self> {
        let dims = G::DIMS;
        if offsets.len() != dims.classes {
            return Err(EngineError::shape_mismatch("offsets", offsets.len(), dims.classes));
        }
        if weights.len() != dims.classes * dims.feat {
            return Err(EngineError::shape_mismatch(
                "weights",
                weights.len(),
                dims.classes * dims.feat,
            ));
        }
        Ok(Self {
            offsets: offsets.into(),
            weights: weights.into(),
        })
    }

    /// Drain offsets then weights from `source`
    ///
    /// Consumes exactly `Dims::parameter_words()` words.
    ///
    /// # Errors
    ///
    /// Returns error if the stream ends early or the transport fails.
    pub fn load<S: WordSource<G::Word>>(&mut self, source: &mut Metered<S>) -> Result<()> {
        let dims = G::DIMS;

        for chunk in self.offsets.chunks_mut(dims.out_ratio()) {
            let word = source.pull("offset vector")?;
            Codec::<G::Word, G::Output>::unpack_into(word, chunk);
        }

        // FEAT % W_RATIO == 0, so no word straddles two weight rows
        for chunk in self.weights.chunks_exact_mut(dims.w_ratio()) {
            let word = source.pull("weight matrix")?;
            Codec::<G::Word, G::Weight>::unpack_into(word, chunk);
        }

        debug!(
            "Parameters: {} offset words, {} weight words",
            dims.offset_words(),
            dims.weight_words()
        );
        Ok(())
    }

    /// Offset vector, one value per class
    pub fn offsets(&self) -> &[G::Output] {
        &self.offsets
    }

    /// Weight matrix, row-major
    pub fn weights(&self) -> &[G::Weight] {
        &self.weights
    }

    /// Weight row of `class`
    pub fn weight_row(&self, class: usize) -> &[G::Weight] {
        let feat = G::DIMS.feat;
        &self.weights[class * feat..(class + 1) * feat]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transports::MemorySource;
    use mmult_chip::presets::{Compact, Unit};

    #[test]
    fn unit_parameters_load_in_stream_order() {
        // u32 words: one i32 offset per word, four i8 weights per word
        let words = vec![
            1u32,
            2,
            Codec::<u32, i8>::pack(&[1, 1, 1, 1]),
            Codec::<u32, i8>::pack(&[2, 0, 0, 2]),
        ];
        let mut source = MemorySource::new(words);
        let mut metered = Metered::new(&mut source, Unit::DIMS.parameter_words());
        let mut params = Parameters::<Unit>::zeroed();
        params.load(&mut metered).unwrap();

        assert_eq!(params.offsets(), &[1, 2]);
        assert_eq!(params.weights(), &[1, 1, 1, 1, 2, 0, 0, 2]);
        assert_eq!(params.weight_row(0), &[1, 1, 1, 1]);
        assert_eq!(params.weight_row(1), &[2, 0, 0, 2]);
        assert_eq!(metered.consumed(), 4);
    }

    #[test]
    fn compact_offsets_pack_two_per_word() {
        let dims = Compact::DIMS;
        let mut words = vec![
            Codec::<u64, i32>::pack(&[-1, 5]),
            Codec::<u64, i32>::pack(&[7, i32::MIN]),
        ];
        words.extend(std::iter::repeat(0u64).take(dims.weight_words()));
        let mut source = MemorySource::new(words);
        let mut metered = Metered::new(&mut source, dims.parameter_words());
        let mut params = Parameters::<Compact>::zeroed();
        params.load(&mut metered).unwrap();
        assert_eq!(params.offsets(), &[-1, 5, 7, i32::MIN]);
    }

    #[test]
    fn short_weight_stream_is_malformed() {
        let mut source = MemorySource::new(vec![1u32, 2, 0]);
        let mut metered = Metered::new(&mut source, Unit::DIMS.input_words());
        let mut params = Parameters::<Unit>::zeroed();
        let err = params.load(&mut metered).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert!(err.to_string().contains("weight matrix"));
    }

    #[test]
    fn from_parts_checks_shapes() {
        assert!(Parameters::<Unit>::from_parts(&[1, 2], &[0; 8]).is_ok());
        let err = Parameters::<Unit>::from_parts(&[1], &[0; 8]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
