use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// 1, x, y, x², xy, y²
pub const TERM_COUNT: usize = 6;

const SINGULAR_EPSILON: f64 = 1e-10;

/// Independent second-degree polynomials for screen x and screen y
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolynomialFit {
    pub coeff_x: Vec<f64>,
    pub coeff_y: Vec<f64>,
}

fn terms(nx: f64, ny: f64) -> [f64; TERM_COUNT] {
    [1., nx, ny, nx * nx, nx * ny, ny * ny]
}

fn eval(coeffs: &[f64], t: &[f64; TERM_COUNT]) -> f64 {
    coeffs.iter().zip(t.iter()).map(|(c, t)| c * t).sum()
}

impl PolynomialFit {
    /// Least squares fit via SVD; with fewer distinct points than terms this
    /// yields the minimum-norm solution rather than failing.
    pub fn fit(inputs: &[(f64, f64)], outputs: &[(f64, f64)]) -> Result<Self, TrainError> {
        let n = inputs.len();
        let design = DMatrix::from_fn(n, TERM_COUNT, |r, c| {
            let (nx, ny) = inputs[r];
            terms(nx, ny)[c]
        });
        let bx = DVector::from_iterator(n, outputs.iter().map(|o| o.0));
        let by = DVector::from_iterator(n, outputs.iter().map(|o| o.1));

        let svd = design.svd(true, true);
        let coeff_x = svd
            .solve(&bx, SINGULAR_EPSILON)
            .map_err(|e| TrainError::NumericalFailure(e.to_string()))?;
        let coeff_y = svd
            .solve(&by, SINGULAR_EPSILON)
            .map_err(|e| TrainError::NumericalFailure(e.to_string()))?;

        let fit = PolynomialFit {
            coeff_x: coeff_x.iter().copied().collect(),
            coeff_y: coeff_y.iter().copied().collect(),
        };
        if !fit.is_well_formed() {
            return Err(TrainError::NumericalFailure(
                "polynomial coefficients are not finite".into(),
            ));
        }
        Ok(fit)
    }

    pub fn is_well_formed(&self) -> bool {
        self.coeff_x.len() == TERM_COUNT
            && self.coeff_y.len() == TERM_COUNT
            && self
                .coeff_x
                .iter()
                .chain(self.coeff_y.iter())
                .all(|c| c.is_finite())
    }

    pub fn predict(&self, nx: f64, ny: f64) -> (f64, f64) {
        let t = terms(nx, ny);
        (eval(&self.coeff_x, &t), eval(&self.coeff_y, &t))
    }
}
