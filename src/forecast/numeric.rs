//! Least-squares and distribution helpers for the forecast model.

/// Ridge least squares over column vectors: minimises
/// `|y - X b|² + Σ penalty_j b_j²` by Cholesky on the normal equations.
///
/// Every column must have `y.len()` entries and `penalties.len()` must equal
/// the column count. Returns `None` if the system is not positive definite.
pub fn ridge_fit(columns: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Option<Vec<f64>> {
    let p = columns.len();
    if p == 0 || penalties.len() != p || columns.iter().any(|c| c.len() != y.len()) {
        return None;
    }

    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];

    for i in 0..p {
        for j in 0..=i {
            let v: f64 = columns[i].iter().zip(&columns[j]).map(|(a, b)| a * b).sum();
            xtx[i][j] = v;
            xtx[j][i] = v;
        }
        xty[i] = columns[i].iter().zip(y).map(|(a, b)| a * b).sum();
    }

    // Small ridge on every coefficient keeps collinear bases solvable.
    for i in 0..p {
        xtx[i][i] += penalties[i] + 1e-8;
    }

    solve_symmetric(&xtx, &xty)
}

/// Solve `A x = b` for symmetric positive definite `A` (Cholesky).
pub fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    // A = L L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // L' x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}

/// `X b` for column-major `X`.
pub fn predict(columns: &[Vec<f64>], coefs: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![0.0; n];
    for (col, c) in columns.iter().zip(coefs) {
        for (o, x) in out.iter_mut().zip(col) {
            *o += c * x;
        }
    }
    out
}

/// Residual variance with `n_params` degrees of freedom removed; `None`
/// when fewer than `min_dof` remain.
pub fn residual_variance(resid: &[f64], n_params: usize, min_dof: usize) -> Option<f64> {
    let dof = resid.len().checked_sub(n_params)?;
    if dof < min_dof.max(1) {
        return None;
    }
    Some(resid.iter().map(|r| r * r).sum::<f64>() / dof as f64)
}

/// Inverse standard normal CDF (Abramowitz & Stegun 26.2.23, |error| < 4.5e-4).
pub fn quantile_normal(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let t = if p < 0.5 {
        (-2.0 * p.ln()).sqrt()
    } else {
        (-2.0 * (1.0 - p).ln()).sqrt()
    };

    let c0 = 2.515517;
    let c1 = 0.802853;
    let c2 = 0.010328;
    let d1 = 1.432788;
    let d2 = 0.189269;
    let d3 = 0.001308;

    let result = t - (c0 + c1 * t + c2 * t * t) / (1.0 + d1 * t + d2 * t * t + d3 * t * t * t);

    if p < 0.5 { -result } else { result }
}
