use approx::assert_relative_eq;
use ndarray::{array, Array1, Array2};
use ndarray_linalg::{Eigh, UPLO};

use crate::davidson::{diagonalize, DavidsonParams};

fn unit_vector(dim: usize, at: usize) -> Array1<f64> {
    let mut v = Array1::zeros(dim);
    v[at] = 1.0;
    v
}

#[test]
fn test_davidson_diagonal_matrix_converges_in_one_expansion() {
    let diag_values = array![-2.0, -1.0, 0.5, 1.5, 3.0];
    let h = Array2::from_diag(&diag_values);

    let result = diagonalize(
        2,
        &DavidsonParams::default(),
        || diag_values.clone(),
        |_diag| Ok(vec![unit_vector(5, 0), unit_vector(5, 1)]),
        |trial| h.dot(trial),
    )
    .unwrap();

    assert!(result.converged);
    assert_eq!(result.n_iterations, 1);
    assert_eq!(result.residual_history.len(), 1);
    assert_relative_eq!(result.eigenvalues[0], -2.0, max_relative = 1e-12);
    assert_relative_eq!(result.eigenvalues[1], -1.0, max_relative = 1e-12);
}

#[test]
fn test_davidson_matches_dense_eigendecomposition() {
    let h = array![
        [-3.0, 0.4, 0.0, 0.1, 0.0, 0.2],
        [0.4, -2.0, 0.3, 0.0, 0.1, 0.0],
        [0.0, 0.3, -1.0, 0.2, 0.0, 0.1],
        [0.1, 0.0, 0.2, 0.5, 0.3, 0.0],
        [0.0, 0.1, 0.0, 0.3, 1.5, 0.4],
        [0.2, 0.0, 0.1, 0.0, 0.4, 2.5],
    ];
    let diag_values = h.diag().to_owned();

    let params = DavidsonParams::builder()
        .residual_tolerance(1e-10)
        .build()
        .unwrap();
    let result = diagonalize(
        2,
        &params,
        || diag_values.clone(),
        |_diag| Ok(vec![unit_vector(6, 0), unit_vector(6, 1), unit_vector(6, 2)]),
        |trial| h.dot(trial),
    )
    .unwrap();

    let (reference, _) = h.eigh(UPLO::Lower).unwrap();
    assert!(result.converged);
    assert!(result.eigenvalues[0] <= result.eigenvalues[1]);
    assert_relative_eq!(result.eigenvalues[0], reference[0], epsilon = 1e-8);
    assert_relative_eq!(result.eigenvalues[1], reference[1], epsilon = 1e-8);

    // The Ritz vector satisfies the eigenvalue equation.
    let ground = &result.eigenvectors[0];
    let hx = h.dot(ground);
    let residual = &hx - result.eigenvalues[0] * ground;
    assert!(residual.dot(&residual).sqrt() < 1e-7);
}

#[test]
fn test_davidson_nonconvergence_returned_as_data() {
    let h = array![
        [-1.0, 0.5, 0.5],
        [0.5, 0.0, 0.5],
        [0.5, 0.5, 1.0],
    ];
    let diag_values = h.diag().to_owned();

    let params = DavidsonParams::builder()
        .residual_tolerance(1e-14)
        .max_iterations(1)
        .build()
        .unwrap();
    let result = diagonalize(
        1,
        &params,
        || diag_values.clone(),
        |_diag| Ok(vec![unit_vector(3, 0)]),
        |trial| h.dot(trial),
    )
    .unwrap();

    assert!(!result.converged);
    assert_eq!(result.n_iterations, 1);
    assert_eq!(result.residual_history.len(), 1);
    assert!(result.eigenvalues[0].is_finite());
    assert_eq!(result.eigenvectors.len(), 1);
}

#[test]
fn test_davidson_rejects_short_guess() {
    let diag_values = array![-1.0, 0.0, 1.0];
    let h = Array2::from_diag(&diag_values);
    let result = diagonalize(
        2,
        &DavidsonParams::default(),
        || diag_values.clone(),
        |_diag| Ok(vec![unit_vector(3, 0)]),
        |trial| h.dot(trial),
    );
    assert!(result.is_err());
}
