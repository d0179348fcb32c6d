//! Closed-form least-squares regression
//!
//! [`ols`] solves the multivariate problem $\min_\beta \|X\beta - y\|_2$ with
//! an SVD of the design matrix, rejecting rank-deficient designs.
//! [`linregress`] is the single-predictor case with the usual summary
//! statistics.

use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};
use sinkflux_core::errors::{SinkfluxError, SinkfluxResult};
use sinkflux_core::timeseries::FloatValue;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Guards the t statistic when |r| is exactly one
const TINY: FloatValue = 1.0e-20;

/// Coefficients of the least-squares fit `design * beta ≈ response`
///
/// `design` has one row per observation and one column per coefficient;
/// include a column of ones for an intercept.
pub fn ols(
    design: ArrayView2<'_, FloatValue>,
    response: ArrayView1<'_, FloatValue>,
) -> SinkfluxResult<Array1<FloatValue>> {
    let (n, p) = design.dim();
    if response.len() != n {
        return Err(SinkfluxError::Configuration(format!(
            "design has {} rows but the response has {} values",
            n,
            response.len()
        )));
    }
    if n < p {
        return Err(SinkfluxError::insufficient("least-squares fit", p, n));
    }

    let x = DMatrix::from_fn(n, p, |i, j| design[[i, j]]);
    let y = DVector::from_iterator(n, response.iter().copied());

    let svd = x.svd(true, true);
    let tolerance = svd.singular_values.max() * n.max(p) as FloatValue * FloatValue::EPSILON;
    if !tolerance.is_finite() || svd.rank(tolerance) < p {
        return Err(SinkfluxError::NumericDomain(
            "design matrix is rank deficient".to_string(),
        ));
    }
    let solution = svd
        .solve(&y, tolerance)
        .map_err(|e| SinkfluxError::NumericDomain(e.to_string()))?;
    debug!("Solved a {}x{} least-squares problem", n, p);

    Ok(solution.iter().copied().collect())
}

/// Result of a simple linear regression
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: FloatValue,
    pub intercept: FloatValue,
    /// Pearson correlation coefficient
    pub r_value: FloatValue,
    /// Two-sided p-value for a zero slope (Student t with n - 2 dof)
    pub p_value: FloatValue,
    /// Standard error of the slope
    pub stderr: FloatValue,
}

/// Least-squares line through `(x, y)`
pub fn linregress(
    x: ArrayView1<'_, FloatValue>,
    y: ArrayView1<'_, FloatValue>,
) -> SinkfluxResult<LinearFit> {
    let n = x.len();
    if y.len() != n {
        return Err(SinkfluxError::Configuration(format!(
            "x has {} values but y has {}",
            n,
            y.len()
        )));
    }
    if n < 2 {
        return Err(SinkfluxError::insufficient("linear regression", 2, n));
    }

    let count = n as FloatValue;
    let x_mean = x.sum() / count;
    let y_mean = y.sum() / count;
    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    ssxm /= count;
    ssym /= count;
    ssxym /= count;

    if ssxm == 0.0 {
        return Err(SinkfluxError::NumericDomain(
            "cannot fit a line when all x values are identical".to_string(),
        ));
    }

    let r_den = (ssxm * ssym).sqrt();
    let r_value = if r_den == 0.0 {
        0.0
    } else {
        (ssxym / r_den).clamp(-1.0, 1.0)
    };
    let slope = ssxym / ssxm;
    let intercept = y_mean - slope * x_mean;

    let (p_value, stderr) = if n == 2 {
        (0.0, 0.0)
    } else {
        let df = count - 2.0;
        let t = r_value * (df / ((1.0 - r_value + TINY) * (1.0 + r_value + TINY))).sqrt();
        let distribution = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| SinkfluxError::NumericDomain(e.to_string()))?;
        let p_value = 2.0 * distribution.sf(t.abs());
        let stderr = ((1.0 - r_value * r_value) * ssym / ssxm / df).sqrt();
        (p_value, stderr)
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_value,
        p_value,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn ols_recovers_exact_plane() {
        let design = Array2::from_shape_fn((20, 3), |(i, j)| match j {
            0 => 1.0,
            1 => i as f64,
            _ => (i as f64 * 0.7).sin(),
        });
        let response = design.column(1).mapv(|v| 2.0 * v) + design.column(2).mapv(|v| -3.0 * v)
            + 5.0;
        let beta = ols(design.view(), response.view()).unwrap();
        assert_relative_eq!(beta[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(beta[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(beta[2], -3.0, epsilon = 1e-9);
    }

    #[test]
    fn ols_rejects_collinear_design() {
        let design = Array2::from_shape_fn((10, 3), |(i, j)| match j {
            0 => 1.0,
            1 => i as f64,
            _ => 2.0 * i as f64,
        });
        let response = Array1::from_iter((0..10).map(|i| i as f64));
        assert!(matches!(
            ols(design.view(), response.view()),
            Err(SinkfluxError::NumericDomain(_))
        ));
    }

    #[test]
    fn ols_needs_enough_rows() {
        let design = Array2::<f64>::ones((2, 3));
        let response = array![1.0, 2.0];
        assert!(matches!(
            ols(design.view(), response.view()),
            Err(SinkfluxError::InsufficientData { .. })
        ));
    }

    #[test]
    fn linregress_statistics() {
        let x = array![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = array![1.0, 3.1, 4.9, 7.2, 8.8];
        let fit = linregress(x.view(), y.view()).unwrap();
        assert_relative_eq!(fit.slope, 1.97, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 1.06, epsilon = 1e-12);
        assert!(fit.r_value > 0.99 && fit.r_value <= 1.0);
        assert!(fit.p_value < 1e-3);
        assert!(fit.stderr > 0.0);
    }

    #[test]
    fn linregress_perfect_line() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        let y = x.mapv(|v| 0.5 * v - 1.0);
        let fit = linregress(x.view(), y.view()).unwrap();
        assert_relative_eq!(fit.slope, 0.5, epsilon = 1e-12);
        assert_relative_eq!(fit.r_value, 1.0, epsilon = 1e-12);
        assert!(fit.p_value < 1e-6);
    }

    #[test]
    fn linregress_flat_response() {
        let x = array![1.0, 2.0, 3.0];
        let y = array![4.0, 4.0, 4.0];
        let fit = linregress(x.view(), y.view()).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_value, 0.0);
    }

    #[test]
    fn linregress_constant_x() {
        let x = array![2.0, 2.0, 2.0];
        let y = array![1.0, 2.0, 3.0];
        assert!(matches!(
            linregress(x.view(), y.view()),
            Err(SinkfluxError::NumericDomain(_))
        ));
    }
}
