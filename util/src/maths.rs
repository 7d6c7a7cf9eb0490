//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use num_traits::Float;

/// Evaluate a polynomial at the given value.
///
/// Coefficients are ordered lowest power first, i.e. if there are 4
/// coefficients the polynomial is c[0] + c[1]*x + c[2]*x^2 + c[3]*x^3.
pub fn poly_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float
{
    // Horner's scheme from the highest power down
    coeffs.iter()
        .rev()
        .fold(T::zero(), |acc, &c| acc * value + c)
}

/// Evaluate the `order`-th derivative of a polynomial at the given value.
///
/// Coefficients are ordered lowest power first, as for `poly_val`. An `order`
/// of zero is the same as `poly_val`.
pub fn poly_deriv_val<T>(value: T, coeffs: &[T], order: usize) -> T
where
    T: Float
{
    let mut res = T::zero();

    for power in (order..coeffs.len()).rev() {
        // Falling factorial power * (power - 1) * ... * (power - order + 1)
        let scale = (0..order)
            .map(|k| T::from(power - k).unwrap_or_else(T::nan))
            .fold(T::one(), |acc, f| acc * f);

        res = res * value + coeffs[power] * scale;
    }

    res
}

/// Fit a polynomial of the given order to the points by least squares.
///
/// The fit is solved with a Householder QR decomposition of the Vandermonde
/// matrix. Coefficients are returned lowest power first. `None` is returned if
/// the dimensions don't match, there are too few points for the order, or the
/// system is rank deficient.
pub fn poly_fit(x_vals: &[f64], y_vals: &[f64], order: usize) -> Option<Vec<f64>> {
    if x_vals.len() != y_vals.len() || order < 1 || x_vals.len() < order + 1 {
        return None;
    }

    let num_points = x_vals.len();

    // Build the Vandermonde matrix
    let mut a = DMatrix::<f64>::zeros(num_points, order + 1);
    for (row, &x) in x_vals.iter().enumerate() {
        a[(row, 0)] = 1.0;
        for col in 0..order {
            a[(row, col + 1)] = a[(row, col)] * x;
        }
    }

    let b = DVector::from_column_slice(y_vals);

    let qr = a.qr();
    let qtb = qr.q().transpose() * b;
    let r = qr.r();

    // A zero on the diagonal of R means the points can't pin down every
    // coefficient.
    if r.diagonal().iter().any(|d| d.abs() < 1e-12) {
        return None;
    }

    r.solve_upper_triangular(&qtb)
        .map(|c| c.iter().cloned().collect())
}
