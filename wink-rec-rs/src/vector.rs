//! Vector helpers shared by the embedder and both ranking strategies.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};

/// Scale `v` to unit length in place. Returns `false` (and leaves `v`
/// untouched) when the norm is zero or not finite.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= 0.0 {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

fn check_dims(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(RecError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(())
}

pub fn dot(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;
    Ok(ArrayView1::from(a).dot(&ArrayView1::from(b)))
}

/// Cosine similarity in `[-1, 1]`; `0.0` when either side is a zero vector.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;
    let va = ArrayView1::from(a);
    let vb = ArrayView1::from(b);
    let na = va.dot(&va).sqrt();
    let nb = vb.dot(&vb).sqrt();
    if na == 0.0 || nb == 0.0 {
        return Ok(0.0);
    }
    Ok((va.dot(&vb) / (na * nb)).clamp(-1.0, 1.0))
}

/// A fixed-dimension embedding, unit length unless it came from a zero vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Normalize `raw` to unit length. A zero vector is kept as-is.
    pub fn normalized(mut raw: Vec<f32>) -> Self {
        l2_normalize(&mut raw);
        Self(raw)
    }

    /// Weighted mean of `vectors`, re-normalized to unit length.
    pub fn blend(vectors: &[EmbeddingVector], weights: &[f32]) -> Result<Self> {
        if vectors.len() != weights.len() {
            return Err(RecError::Invalid(format!(
                "{} vectors but {} weights",
                vectors.len(),
                weights.len()
            )));
        }
        let first = vectors
            .first()
            .ok_or_else(|| RecError::Invalid("nothing to blend".into()))?;
        let mut acc = Array1::<f32>::zeros(first.dim());
        for (v, w) in vectors.iter().zip(weights) {
            if v.dim() != first.dim() {
                return Err(RecError::DimensionMismatch {
                    expected: first.dim(),
                    got: v.dim(),
                });
            }
            acc.scaled_add(*w, &v.view());
        }
        let total: f32 = weights.iter().sum();
        if total > 0.0 {
            acc /= total;
        }
        Ok(Self::normalized(acc.to_vec()))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.0[..])
    }

    pub fn norm(&self) -> f32 {
        self.view().dot(&self.view()).sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|x| *x == 0.0)
    }

    /// Dot product; equals cosine similarity for two unit vectors.
    pub fn dot(&self, other: &EmbeddingVector) -> Result<f32> {
        dot(&self.0, &other.0)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<EmbeddingVector> for Vec<f32> {
    fn from(v: EmbeddingVector) -> Self {
        v.0
    }
}
