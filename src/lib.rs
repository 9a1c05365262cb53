//! # GUGA-CI: selected configuration interaction in the graphical unitary group approach
//!
//! GUGA-CI is a variational configuration-interaction engine for many-electron systems
//! written in Rust with the following capabilities:
//! - spin-adapted configuration state functions (CSFs) encoded as step vectors on the
//!   Shavitt graph and addressed through per-configuration tries,
//! - matrix-free evaluation of Hamiltonian sigma vectors from one- and two-electron
//!   molecular-orbital integrals via unitary-group coupling coefficients,
//! - iterative extraction of the lowest CI eigenpairs with the Davidson method, and
//! - adaptive growth of the variational space by CIPSI-style perturbative selection
//!
//! for wavefunctions specified by orbital count, electron count and spin multiplicity.
//!
//! Molecular integrals are consumed as opaque dense tensors over molecular-orbital
//! indices; their evaluation, as well as basis-set handling and low-level
//! multi-process communication, are the responsibility of the surrounding
//! application. The distributed reduce/broadcast capability expected by the sigma
//! and diagonal evaluators is abstracted behind the [`parallel::Collective`] trait.
//!
//! The main entry points are [`drivers::guga_ci::run`],
//! [`drivers::guga_ci::run_from_csfs`] and [`drivers::guga_ci::run_from_csfs_file`].
//!
//! ## Linear algebra backend
//!
//! There are six features defining six different ways a linear algebra backend can be
//! configured. These are inherited from the
//! [`ndarray-linalg`](https://docs.rs/ndarray-linalg/latest/ndarray_linalg/) crate. One
//! (and only one) of these must be enabled:
//! - `openblas-static`: Downloads, builds OpenBLAS, and links statically (default)
//! - `openblas-system`: Finds and links existing OpenBLAS in the system
//! - `netlib-static`: Downloads, builds LAPACK, and links statically
//! - `netlib-system`: Finds and links existing LAPACK in the system
//! - `intel-mkl-static`: Finds and links existing static Intel MKL in the system, or
//!   downloads and links statically if not found
//! - `intel-mkl-system`: Finds and links existing shared Intel MKL in the system
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod auxiliary;
pub mod connections;
pub mod coupling;
pub mod csf;
pub mod davidson;
pub mod drivers;
pub mod hamiltonian;
pub mod io;
pub mod parallel;
pub mod selection;
pub mod wavefunction;
