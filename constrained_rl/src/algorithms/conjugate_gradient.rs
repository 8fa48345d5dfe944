//! Conjugate gradient solver for `A x = b` with a symmetric positive
//! definite operator given only as a matrix-vector product.
//!
//! CPO never forms the Fisher matrix; CG needs nothing but `v ↦ F v`.
//! In exact arithmetic CG converges in at most `dim` iterations; in practice
//! a handful is enough for a usable natural-gradient direction.

/// Additive floor on `p·Ap` so a degenerate direction never divides by zero.
pub const CG_EPS: f64 = 1e-8;

/// Result of a conjugate-gradient solve.
#[derive(Debug, Clone, PartialEq)]
pub struct CgSolution {
    /// Approximate solution
    pub x: Vec<f64>,
    /// Iterations actually run
    pub iterations: usize,
    /// Squared norm of the final residual `b - A x`
    pub residual_norm_sq: f64,
}

/// Dot product of two equally long slices.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `y += alpha * x`
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// Euclidean norm.
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Solve `A x = b` starting from `x = 0`.
///
/// Stops after `max_iters` iterations or once the squared residual is at
/// most `residual_tol`, whichever comes first. An exactly zero residual always
/// stops the solve, whatever the tolerance. A zero right-hand side
/// returns immediately with `x = 0`.
pub fn conjugate_gradient<F>(
    mut avp: F,
    b: &[f64],
    max_iters: usize,
    residual_tol: f64,
) -> CgSolution
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let mut x = vec![0.0; b.len()];
    let mut r = b.to_vec();
    let mut p = b.to_vec();
    let mut rdotr = dot(&r, &r);
    let mut iterations = 0;

    // rdotr > 0 inside the loop, so beta never divides by zero
    while iterations < max_iters && rdotr > residual_tol.max(0.0) {
        let ap = avp(&p);
        let alpha = rdotr / (dot(&p, &ap) + CG_EPS);

        axpy(alpha, &p, &mut x);
        axpy(-alpha, &ap, &mut r);

        let new_rdotr = dot(&r, &r);
        let beta = new_rdotr / rdotr;
        for (pi, ri) in p.iter_mut().zip(&r) {
            *pi = ri + beta * *pi;
        }

        rdotr = new_rdotr;
        iterations += 1;
    }

    CgSolution {
        x,
        iterations,
        residual_norm_sq: rdotr,
    }
}
