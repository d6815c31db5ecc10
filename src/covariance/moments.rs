//! Weighted running moments of time-lagged pairs

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Weighted means and centered second moments of pairs `(x_t, y_t)`.
///
/// Two `Moments` merge with the pairwise update of Chan et al., so the result
/// does not depend on how the data was split into chunks or in which order
/// the chunks arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    /// Total weight
    pub weight: f64,
    /// Weighted mean of x
    pub mean_x: Array1<f64>,
    /// Weighted mean of y
    pub mean_y: Array1<f64>,
    /// Σ w (x - m_x)(x - m_x)ᵀ
    pub m_xx: Array2<f64>,
    /// Σ w (x - m_x)(y - m_y)ᵀ
    pub m_xy: Array2<f64>,
    /// Σ w (y - m_y)(y - m_y)ᵀ
    pub m_yy: Array2<f64>,
}

impl Moments {
    /// Moments of one chunk. Returns `None` if the chunk carries no weight.
    pub fn from_chunk(
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        weights: Option<ArrayView1<f64>>,
    ) -> Option<Self> {
        let n = x.nrows();
        if n == 0 {
            return None;
        }

        let weights = match weights {
            Some(w) => w.to_owned(),
            None => Array1::ones(n),
        };
        let weight = weights.sum();
        if weight == 0.0 || !weight.is_finite() {
            return None;
        }

        let column = weights.view().insert_axis(Axis(1));
        let mean_x = (&x * &column).sum_axis(Axis(0)) / weight;
        let mean_y = (&y * &column).sum_axis(Axis(0)) / weight;

        let xc = &x - &mean_x;
        let yc = &y - &mean_y;
        let xw = &xc * &column;
        let yw = &yc * &column;

        Some(Self {
            weight,
            m_xx: xw.t().dot(&xc),
            m_xy: xw.t().dot(&yc),
            m_yy: yw.t().dot(&yc),
            mean_x,
            mean_y,
        })
    }

    pub fn dimension(&self) -> usize {
        self.mean_x.len()
    }

    /// Combine with the moments of another, disjoint set of pairs
    pub fn merge(&self, other: &Moments) -> Moments {
        let weight = self.weight + other.weight;
        let factor = self.weight * other.weight / weight;

        let dx = &other.mean_x - &self.mean_x;
        let dy = &other.mean_y - &self.mean_y;

        Moments {
            weight,
            mean_x: &self.mean_x + &(&dx * (other.weight / weight)),
            mean_y: &self.mean_y + &(&dy * (other.weight / weight)),
            m_xx: &self.m_xx + &other.m_xx + &(outer(dx.view(), dx.view()) * factor),
            m_xy: &self.m_xy + &other.m_xy + &(outer(dx.view(), dy.view()) * factor),
            m_yy: &self.m_yy + &other.m_yy + &(outer(dy.view(), dy.view()) * factor),
        }
    }
}

/// Outer product `a bᵀ`
pub(crate) fn outer(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array2<f64> {
    let a = a.insert_axis(Axis(1));
    let b = b.insert_axis(Axis(0));
    a.dot(&b)
}
