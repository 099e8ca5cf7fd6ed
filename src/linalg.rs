// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Rebalance Matrix Linear Algebra
//
// Pairwise transfer amounts between N deposits are the minimum-norm solution
// of A x = [delta, 0], where A is the incidence matrix of the complete graph
// on N nodes with a trailing row of ones enforcing sum(x) == 0.

use ndarray::{Array1, Array2};

use crate::errors::{SimError, SimResult};

/// Maximum tolerated |A x - b| component.
pub const SOLVE_TOLERANCE: f64 = 1e-3;

const MAX_SWEEPS: usize = 100;
const RELATIVE_EIGEN_CUTOFF: f64 = 1e-10;

// ─── Incidence Matrix ───────────────────────────────────────────────────────

/// Number of edge columns used for `n` nodes. Two nodes share a single edge,
/// padded with a second column so the constraint row stays independent.
pub fn edge_count(n: usize) -> usize {
    (n * n.saturating_sub(1) / 2).max(2)
}

/// Complete-graph incidence matrix with a ones row appended. Edge (i, j),
/// i < j, enumerated row-major, carries +1 at row i and -1 at row j.
pub fn constrained_incidence_matrix(n: usize) -> Array2<f64> {
    let cols = edge_count(n);
    let mut a = Array2::zeros((n + 1, cols));
    let mut e = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            a[[i, e]] = 1.0;
            a[[j, e]] = -1.0;
            e += 1;
        }
    }
    a.row_mut(n).fill(1.0);
    a
}

// ─── Pseudoinverse ──────────────────────────────────────────────────────────

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix. Returns the
/// eigenvalues and the matrix whose columns are the eigenvectors.
pub fn symmetric_eigen(m: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = m.nrows();
    let mut a = m.clone();
    let mut v = Array2::<f64>::eye(n);
    let scale: f64 = a.iter().map(|x| x * x).sum::<f64>().max(f64::MIN_POSITIVE);

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= 1e-30 * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}

/// Moore-Penrose pseudoinverse via `A⁺ = Aᵀ (A Aᵀ)⁺`.
pub fn pseudoinverse(a: &Array2<f64>) -> Array2<f64> {
    let gram = a.dot(&a.t());
    let (eigenvalues, vectors) = symmetric_eigen(&gram);
    let largest = eigenvalues.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    let cutoff = largest * RELATIVE_EIGEN_CUTOFF;

    let inverted = eigenvalues.mapv(|l| if l > cutoff { 1.0 / l } else { 0.0 });
    let gram_pinv = (&vectors * &inverted).dot(&vectors.t());
    a.t().dot(&gram_pinv)
}

// ─── Rebalance Solve ────────────────────────────────────────────────────────

/// Solve for the pairwise transfer vector that realizes `delta`.
pub fn solve_rebalance(delta: &[f64]) -> SimResult<Array1<f64>> {
    let n = delta.len();
    if n < 2 {
        return Err(SimError::InvalidConfig(format!(
            "rebalancing needs at least two deposits (got {n})"
        )));
    }
    let a = constrained_incidence_matrix(n);
    let mut b = Array1::zeros(n + 1);
    for (i, d) in delta.iter().enumerate() {
        b[i] = *d;
    }

    let x = pseudoinverse(&a).dot(&b);

    let residual = (a.dot(&x) - &b).iter().fold(0.0_f64, |m, r| m.max(r.abs()));
    if residual > SOLVE_TOLERANCE || residual.is_nan() {
        return Err(SimError::SolveResidual { residual, tolerance: SOLVE_TOLERANCE });
    }
    Ok(x)
}

/// Fill the strictly upper-triangular N x N matrix row-major from `x`.
/// Padding entries beyond the real edges are ignored.
pub fn upper_triangular(n: usize, x: &Array1<f64>) -> Array2<f64> {
    let mut m = Array2::zeros((n, n));
    let mut e = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            m[[i, j]] = x[e];
            e += 1;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_incidence_matrix_shape() {
        let a = constrained_incidence_matrix(4);
        assert_eq!(a.dim(), (5, 6));
        // Edge (0, 1)
        assert_eq!(a[[0, 0]], 1.0);
        assert_eq!(a[[1, 0]], -1.0);
        // Edge (2, 3) is last
        assert_eq!(a[[2, 5]], 1.0);
        assert_eq!(a[[3, 5]], -1.0);
        assert!(a.row(4).iter().all(|&x| x == 1.0));
        for col in a.slice(ndarray::s![..4, ..]).columns() {
            assert_eq!(col.sum(), 0.0);
        }
    }

    #[test]
    fn test_two_deposits_pad_extra_column() {
        let a = constrained_incidence_matrix(2);
        assert_eq!(a.dim(), (3, 2));
        assert_eq!(a[[0, 1]], 0.0);
        assert_eq!(a[[1, 1]], 0.0);
        assert_eq!(a[[2, 1]], 1.0);

        let x = solve_rebalance(&[50.0, -50.0]).unwrap();
        assert!((x[0] - 50.0).abs() < 1e-6);
        assert!((x[1] + 50.0).abs() < 1e-6);
        let m = upper_triangular(2, &x);
        assert!((m[[0, 1]] - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_eigen_decomposition_reconstructs() {
        let m = ndarray::arr2(&[[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 1.0]]);
        let (l, v) = symmetric_eigen(&m);
        let rebuilt = (&v * &l).dot(&v.t());
        for (a, b) in rebuilt.iter().zip(m.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_four_way_solution_reproduces_delta() {
        let delta = [-150.0, -50.0, 50.0, 150.0];
        let x = solve_rebalance(&delta).unwrap();
        assert!(x.sum().abs() < 1e-3);

        let expected = [100.0, -50.0, -200.0, 100.0, -50.0, 100.0];
        for (got, want) in x.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }

        let a = constrained_incidence_matrix(4);
        let ax = a.dot(&x);
        for i in 0..4 {
            assert!((ax[i] - delta[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_zero_delta_zero_solution() {
        let x = solve_rebalance(&[0.0; 5]).unwrap();
        assert!(x.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_single_deposit_rejected() {
        assert!(solve_rebalance(&[1.0]).is_err());
    }

    proptest! {
        #[test]
        fn prop_balanced_delta_solves(raw in proptest::collection::vec(-1e6..1e6f64, 2..7)) {
            let mean = raw.iter().sum::<f64>() / raw.len() as f64;
            let delta: Vec<f64> = raw.iter().map(|d| d - mean).collect();
            let x = solve_rebalance(&delta).unwrap();
            prop_assert!(x.sum().abs() < 1e-3);
        }
    }
}
