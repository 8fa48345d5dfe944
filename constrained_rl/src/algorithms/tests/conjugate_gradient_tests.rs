//! Tests for the matrix-free conjugate gradient solver.

use crate::algorithms::conjugate_gradient::{conjugate_gradient, dot, norm};

/// Dense row-major matrix-vector product.
fn matvec(a: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    a.iter().map(|row| dot(row, v)).collect()
}

fn residual(a: &[Vec<f64>], x: &[f64], b: &[f64]) -> f64 {
    let ax = matvec(a, x);
    let r: Vec<f64> = b.iter().zip(&ax).map(|(bi, axi)| bi - axi).collect();
    norm(&r)
}

/// Build an SPD matrix as MᵀM + I.
fn spd(m: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = m.len();
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let mtm: f64 = (0..n).map(|k| m[k][i] * m[k][j]).sum();
                    mtm + if i == j { 1.0 } else { 0.0 }
                })
                .collect()
        })
        .collect()
}

// ============================================================================
// Convergence
// ============================================================================

/// CG solves a dense SPD system to the requested residual.
#[test]
fn test_solves_spd_system() {
    let a = spd(&[
        vec![1.0, 2.0, 0.0, -1.0],
        vec![0.5, -1.0, 3.0, 0.0],
        vec![2.0, 0.0, 1.0, 1.0],
        vec![0.0, 1.5, -0.5, 2.0],
    ]);
    let b = vec![1.0, -2.0, 0.5, 3.0];

    let sol = conjugate_gradient(|v| matvec(&a, v), &b, 50, 1e-14);

    let res = residual(&a, &sol.x, &b);
    assert!(res < 1e-4, "residual = {}", res);
}

/// For a diagonal operator with distinct entries CG terminates within `dim`
/// iterations.
#[test]
fn test_diagonal_converges_within_dimension() {
    let diag = [1.0, 3.0, 7.0, 20.0];
    let b = vec![1.0, 1.0, 1.0, 1.0];

    let sol = conjugate_gradient(
        |v| v.iter().zip(&diag).map(|(x, d)| x * d).collect(),
        &b,
        10,
        1e-10,
    );

    assert!(sol.iterations <= diag.len(), "took {} iterations", sol.iterations);
    for ((xi, bi), di) in sol.x.iter().zip(&b).zip(&diag) {
        assert!((xi - bi / di).abs() < 1e-5, "x = {}, expected {}", xi, bi / di);
    }
}

/// The returned residual matches b - Ax.
#[test]
fn test_reported_residual_is_consistent() {
    let diag = [2.0, 5.0, 9.0];
    let b = vec![1.0, -1.0, 2.0];
    let a: Vec<Vec<f64>> = (0..3)
        .map(|i| (0..3).map(|j| if i == j { diag[i] } else { 0.0 }).collect())
        .collect();

    let sol = conjugate_gradient(|v| matvec(&a, v), &b, 2, 0.0);

    let res = residual(&a, &sol.x, &b);
    assert!((res.powi(2) - sol.residual_norm_sq).abs() < 1e-6);
}

// ============================================================================
// Caps and Degenerate Inputs
// ============================================================================

/// The iteration cap is hard.
#[test]
fn test_iteration_cap_is_hard() {
    let mut calls = 0;
    let b: Vec<f64> = (1..=8).map(|i| i as f64).collect();
    let sol = conjugate_gradient(
        |v| {
            calls += 1;
            v.iter().enumerate().map(|(i, x)| (i + 1) as f64 * x).collect()
        },
        &b,
        3,
        0.0,
    );
    assert_eq!(sol.iterations, 3);
    assert_eq!(calls, 3);
}

/// A singular direction does not produce NaN thanks to the p·Ap floor.
#[test]
fn test_zero_operator_stays_finite() {
    let sol = conjugate_gradient(|v| vec![0.0; v.len()], &[1.0, 2.0], 5, 1e-10);
    assert!(sol.x.iter().all(|x| x.is_finite()));
}
