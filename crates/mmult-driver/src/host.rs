//! Host side of the streams
//!
//! Builds well-formed input streams from typed buffers, decodes output beat
//! streams, and computes the dense transform directly for verification.
//!
//! | Function | Direction |
//! |----------|-----------|
//! | [`encode_parameters`] | offsets + weights → words |
//! | [`encode_inputs`] | `BATCH × FEAT` inputs → words |
//! | [`encode_stream`] | full input stream |
//! | [`decode_outputs`] | beats → `BATCH × CLASSES` values |
//! | [`reference_affine`] | `X·Wᵗ + o` in `i64` |

use crate::error::{EngineError, Result};
use mmult_chip::{Beat, Codec, Geometry, Lane};

fn check_parameters<G: Geometry>(offsets: &[G::Output], weights: &[G::Weight]) -> Result<()> {
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
    Ok(())
}

fn check_inputs<G: Geometry>(inputs: &[G::Input]) -> Result<()> {
    let dims = G::DIMS;
    if inputs.len() != dims.batch * dims.feat {
        return Err(EngineError::shape_mismatch(
            "inputs",
            inputs.len(),
            dims.batch * dims.feat,
        ));
    }
    Ok(())
}

/// Offset words followed by weight words
///
/// `weights` is row-major `CLASSES × FEAT`. The last offset word is
/// zero-padded when `CLASSES` is not a multiple of `OUT_RATIO`.
///
/// # Errors
///
/// Returns error if either buffer has the wrong length.
pub fn encode_parameters<G: Geometry>(
    offsets: &[G::Output],
    weights: &[G::Weight],
) -> Result<Vec<G::Word>> {
    check_parameters::<G>(offsets, weights)?;
    let dims = G::DIMS;

    let mut words = Vec::with_capacity(dims.parameter_words());
    words.extend(
        offsets
            .chunks(dims.out_ratio())
            .map(Codec::<G::Word, G::Output>::pack),
    );
    words.extend(
        weights
            .chunks(dims.w_ratio())
            .map(Codec::<G::Word, G::Weight>::pack),
    );
    Ok(words)
}

/// Input words for all `BATCH` rows, row-major
///
/// # Errors
///
/// Returns error if `inputs` is not `BATCH × FEAT` long.
pub fn encode_inputs<G: Geometry>(inputs: &[G::Input]) -> Result<Vec<G::Word>> {
    check_inputs::<G>(inputs)?;
    Ok(inputs
        .chunks(G::DIMS.in_ratio())
        .map(Codec::<G::Word, G::Input>::pack)
        .collect())
}

/// Complete input stream for one invocation
///
/// # Errors
///
/// Returns error if any buffer has the wrong length.
pub fn encode_stream<G: Geometry>(
    offsets: &[G::Output],
    weights: &[G::Weight],
    inputs: &[G::Input],
) -> Result<Vec<G::Word>> {
    let mut words = encode_parameters::<G>(offsets, weights)?;
    words.extend(encode_inputs::<G>(inputs)?);
    debug_assert_eq!(words.len(), G::DIMS.input_words());
    Ok(words)
}

/// Unpack an output stream into `BATCH × CLASSES` values, row-major
///
/// # Errors
///
/// Returns error if the stream has the wrong length or the end marker is
/// missing or on any word but the last.
pub fn decode_outputs<G: Geometry>(beats: &[Beat<G::Word>]) -> Result<Vec<G::Output>> {
    let dims = G::DIMS;
    let words = dims.output_words();
    if beats.len() != words {
        return Err(EngineError::shape_mismatch("output words", beats.len(), words));
    }

    if let Some(index) = beats[..words - 1].iter().position(|b| b.last) {
        return Err(EngineError::EndMarker { index, words });
    }
    if !beats[words - 1].last {
        return Err(EngineError::EndMarker { index: words, words });
    }

    Ok(beats
        .iter()
        .flat_map(|b| Codec::<G::Word, G::Output>::lanes(b.data))
        .collect())
}

/// `out[i][j] = offset[j] + Σ_k in[i][k] · weight[j][k]`, exact, row-major
///
/// # Errors
///
/// Returns error if any buffer has the wrong length.
pub fn reference_affine<G: Geometry>(
    offsets: &[G::Output],
    weights: &[G::Weight],
    inputs: &[G::Input],
) -> Result<Vec<i64>> {
    check_parameters::<G>(offsets, weights)?;
    check_inputs::<G>(inputs)?;
    let feat = G::DIMS.feat;

    Ok(inputs
        .chunks_exact(feat)
        .flat_map(|row| {
            offsets
                .iter()
                .zip(weights.chunks_exact(feat))
                .map(move |(offset, w)| {
                    offset.widen()
                        + row
                            .iter()
                            .zip(w)
                            .map(|(x, w)| x.widen() * w.widen())
                            .sum::<i64>()
                })
        })
        .collect())
}

/// Deterministic offsets, weights and inputs for geometry `G`
#[derive(Debug, Clone)]
pub struct Workload<G: Geometry> {
    /// One offset per class
    pub offsets: Vec<G::Output>,
    /// `CLASSES × FEAT`, row-major
    pub weights: Vec<G::Weight>,
    /// `BATCH × FEAT`, row-major
    pub inputs: Vec<G::Input>,
}

impl<G: Geometry> Workload<G> {
    /// Pseudo-random workload from `seed`
    ///
    /// Weights and inputs cover their whole lane range. Offsets stay within
    /// `±2^15` and half the output lane, which keeps every preset clear of
    /// overflow.
    pub fn synthetic(seed: u64) -> Self {
        let dims = G::DIMS;
        let mut rng = Xoshiro::new(seed);

        let offsets = (0..dims.classes)
            .map(|_| {
                let v = (rng.next_u64() % (1 << 16)) as i64 - (1 << 15);
                G::Output::narrow(v.clamp(G::Output::MIN / 2, G::Output::MAX / 2))
                    .unwrap_or_default()
            })
            .collect();
        let weights = (0..dims.classes * dims.feat)
            .map(|_| G::Weight::from_bits(u128::from(rng.next_u64())))
            .collect();
        let inputs = (0..dims.batch * dims.feat)
            .map(|_| G::Input::from_bits(u128::from(rng.next_u64())))
            .collect();

        Self {
            offsets,
            weights,
            inputs,
        }
    }

    /// Encoded input stream
    ///
    /// # Errors
    ///
    /// Returns error if the buffers were resized to the wrong length.
    pub fn stream(&self) -> Result<Vec<G::Word>> {
        encode_stream::<G>(&self.offsets, &self.weights, &self.inputs)
    }

    /// Expected outputs
    ///
    /// # Errors
    ///
    /// Returns error if the buffers were resized to the wrong length.
    pub fn reference(&self) -> Result<Vec<i64>> {
        reference_affine::<G>(&self.offsets, &self.weights, &self.inputs)
    }
}

/// xoshiro256++ generator
struct Xoshiro {
    s: [u64; 4],
}

impl Xoshiro {
    fn new(seed: u64) -> Self {
        let s = [
            seed ^ 0x9e37_79b9_7f4a_7c15,
            seed.wrapping_add(0x6c62_272e_07bb_0142),
            seed.rotate_left(17),
            seed.rotate_right(5),
        ];
        let mut rng = Self { s };
        for _ in 0..20 {
            rng.next_u64();
        }
        rng
    }

    fn next_u64(&mut self) -> u64 {
        let result = self.s[0]
            .wrapping_add(self.s[3])
            .rotate_left(23)
            .wrapping_add(self.s[0]);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }
}
