//! Enumeration of configuration pairs connected by one or two excitation operators.
//!
//! For every ket configuration and every pattern of the fixed closed set
//! ```text
//! Epq;  EpqEqp (diagonal);  EpqEqr, EpqErp, EpqEpq, EpqEpr, EpqErq, EpqErs
//! ```
//! the builder scans the orbitals in ascending order, applies per-role occupation
//! tests (annihilating an empty orbital or creating on a doubly-occupied one makes
//! the pattern inapplicable at that orbital) and walks the bra wavefunction's
//! occupation trie incrementally so dead prefixes prune whole orbital ranges at
//! once. Each discovered pair is recorded under the canonical
//! coupling-coefficient key of its excitation together with the packed canonical
//! orbital indices and the phase from the doubly-occupied orbitals enclosed by
//! the excitation.
//!
//! The pattern set is closed: each pattern carries its admissible operator
//! orderings and a canonicalisation rule resolving the operator-order ambiguity,
//! so symmetric discoveries of one physical excitation land on the same key.

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::auxiliary::index::{pack_pq, pack_pqrs};
use crate::coupling::{cc_info, CcKey1, CcKey2};
use crate::wavefunction::WaveFunction;

#[cfg(test)]
#[path = "connections_tests.rs"]
mod connections_tests;

// ==================
// Struct definitions
// ==================

/// A configuration pair connected by a single excitation $`\hat{E}_{pq}`$.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection1El {
    /// The bra configuration index.
    pub icfg_left: usize,

    /// The ket configuration index.
    pub icfg_right: usize,

    /// The packed orbital pair $`(p, q)`$.
    pub pq: usize,

    /// Whether the enclosed doubly-occupied orbitals flip the sign.
    pub phase: bool,
}

/// A configuration pair connected by a double excitation
/// $`\hat{E}_{pq}\hat{E}_{rs}`$.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection2El {
    /// The bra configuration index.
    pub icfg_left: usize,

    /// The ket configuration index.
    pub icfg_right: usize,

    /// The packed canonical orbital quadruple $`(p, q, r, s)`$.
    pub pqrs: usize,

    /// Whether the enclosed doubly-occupied orbitals flip the sign.
    pub phase: bool,

    /// Whether the pattern represents a genuine two-electron excitation whose
    /// integral enters with full rather than half weight.
    pub exchange: bool,
}

/// A configuration connected to itself through an excitation to the intermediate
/// space and back, $`\hat{E}_{pq}\hat{E}_{qp}`$.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionDia {
    /// The configuration index.
    pub icfg: usize,

    /// The packed orbital quadruple $`(p, q, q, p)`$.
    pub pqqp: usize,
}

/// Connections of single excitations, keyed by their coupling-coefficient key.
pub type ConnectionMap1El = IndexMap<CcKey1, Vec<Connection1El>>;

/// Connections of double excitations, keyed by their coupling-coefficient key.
pub type ConnectionMap2El = IndexMap<CcKey2, Vec<Connection2El>>;

/// Configuration-diagonal connections, keyed by their coupling-coefficient key.
pub type ConnectionMapDia = IndexMap<CcKey1, Vec<ConnectionDia>>;

/// The connection maps of one wavefunction generation. Built once per
/// wavefunction, consumed read-only by the sigma evaluator, and discarded
/// whenever the wavefunction changes.
#[derive(Clone, Debug, Default)]
pub struct ConnectionSet {
    /// Single-excitation connections.
    pub one_el: ConnectionMap1El,

    /// Double-excitation connections.
    pub two_el: ConnectionMap2El,

    /// Configuration-diagonal connections.
    pub diagonal: ConnectionMapDia,
}

impl ConnectionSet {
    fn merge(&mut self, other: ConnectionSet) {
        for (key, mut conns) in other.one_el {
            self.one_el.entry(key).or_default().append(&mut conns);
        }
        for (key, mut conns) in other.two_el {
            self.two_el.entry(key).or_default().append(&mut conns);
        }
        for (key, mut conns) in other.diagonal {
            self.diagonal.entry(key).or_default().append(&mut conns);
        }
    }
}

// ===============
// Operator roles
// ===============

/// The role an orbital plays in an excitation pattern. `Zero` marks the shared
/// orbital of a pattern whose net occupation change there vanishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Zero,
    Ann,
    Cre,
}

type OpFn = fn(usize, &mut [u8]);
type TestFn = fn(usize, &[u8]) -> bool;

fn leave(_i: usize, _occ: &mut [u8]) {}

fn annihilate(i: usize, occ: &mut [u8]) {
    occ[i] -= 1;
}

fn annihilate_twice(i: usize, occ: &mut [u8]) {
    occ[i] -= 2;
}

fn create(i: usize, occ: &mut [u8]) {
    occ[i] += 1;
}

fn create_twice(i: usize, occ: &mut [u8]) {
    occ[i] += 2;
}

fn blocks_annihilation(i: usize, occ: &[u8]) -> bool {
    occ[i] == 0
}

fn blocks_double_annihilation(i: usize, occ: &[u8]) -> bool {
    occ[i] != 2
}

fn blocks_creation(i: usize, occ: &[u8]) -> bool {
    occ[i] == 2
}

fn blocks_double_creation(i: usize, occ: &[u8]) -> bool {
    occ[i] != 0
}

// ====================
// Three-index patterns
// ====================

/// The double-excitation patterns touching three distinct orbitals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThreePattern {
    /// $`\hat{E}_{pq}\hat{E}_{qr}`$: the shared orbital is annihilated and restored.
    EpqEqr,

    /// $`\hat{E}_{pq}\hat{E}_{rp}`$: the shared orbital is created and restored.
    EpqErp,

    /// $`\hat{E}_{pq}\hat{E}_{pr}`$: the shared orbital is created twice.
    EpqEpr,

    /// $`\hat{E}_{pq}\hat{E}_{rq}`$: the shared orbital is annihilated twice.
    EpqErq,
}

impl ThreePattern {
    /// The admissible assignments of roles to the three orbitals in ascending
    /// order.
    fn orders(self) -> &'static [[Role; 3]] {
        use Role::*;
        match self {
            Self::EpqEqr | Self::EpqErp => &[
                [Zero, Ann, Cre],
                [Zero, Cre, Ann],
                [Ann, Zero, Cre],
                [Cre, Zero, Ann],
                [Ann, Cre, Zero],
                [Cre, Ann, Zero],
            ],
            Self::EpqEpr => &[[Cre, Ann, Ann], [Ann, Cre, Ann], [Ann, Ann, Cre]],
            Self::EpqErq => &[[Cre, Cre, Ann], [Cre, Ann, Cre], [Ann, Cre, Cre]],
        }
    }

    fn op(self, role: Role) -> OpFn {
        match (self, role) {
            (Self::EpqEqr | Self::EpqErp, Role::Zero) => leave,
            (Self::EpqEqr | Self::EpqErp | Self::EpqEpr, Role::Ann) => annihilate,
            (Self::EpqEqr | Self::EpqErp | Self::EpqErq, Role::Cre) => create,
            (Self::EpqEpr, Role::Cre) => create_twice,
            (Self::EpqErq, Role::Ann) => annihilate_twice,
            _ => unreachable!("Role not admissible for this pattern."),
        }
    }

    fn test(self, role: Role) -> TestFn {
        match (self, role) {
            (Self::EpqEqr, Role::Zero) => blocks_creation,
            (Self::EpqErp, Role::Zero) => blocks_annihilation,
            (Self::EpqEqr | Self::EpqErp | Self::EpqEpr, Role::Ann) => blocks_annihilation,
            (Self::EpqEqr | Self::EpqErp | Self::EpqErq, Role::Cre) => blocks_creation,
            (Self::EpqEpr, Role::Cre) => blocks_double_creation,
            (Self::EpqErq, Role::Ann) => blocks_double_annihilation,
            _ => unreachable!("Role not admissible for this pattern."),
        }
    }

    /// Resolves the operator-order ambiguity into the canonical orbital quadruple
    /// $`(p, q, r, s)`$ of $`\hat{E}_{pq}\hat{E}_{rs}`$, so symmetric discoveries
    /// of the same physical excitation yield identical keys.
    fn canonicalize(self, roles: [Role; 3], idxs: [usize; 3]) -> [usize; 4] {
        let find = |role: Role, skip: usize| {
            roles
                .iter()
                .enumerate()
                .filter(|(_, &r)| r == role)
                .map(|(i, _)| idxs[i])
                .nth(skip)
                .expect("Pattern roles are fixed per variant.")
        };
        match self {
            Self::EpqEqr => {
                let c = find(Role::Cre, 0);
                let z = find(Role::Zero, 0);
                let a = find(Role::Ann, 0);
                [c, z, z, a]
            }
            Self::EpqErp => {
                let z = find(Role::Zero, 0);
                let a = find(Role::Ann, 0);
                let c = find(Role::Cre, 0);
                [z, a, c, z]
            }
            Self::EpqEpr => {
                let c = find(Role::Cre, 0);
                let a1 = find(Role::Ann, 0);
                let a2 = find(Role::Ann, 1);
                [c, a1, c, a2]
            }
            Self::EpqErq => {
                let c1 = find(Role::Cre, 0);
                let c2 = find(Role::Cre, 1);
                let a = find(Role::Ann, 0);
                [c1, a, c2, a]
            }
        }
    }

    /// Whether the pattern's integral enters with full weight.
    fn exchange(self) -> bool {
        matches!(self, Self::EpqEpr | Self::EpqErq)
    }
}

/// The admissible role assignments of the four-orbital pattern
/// $`\hat{E}_{pq}\hat{E}_{rs}`$.
const FOUR_ORDERS: &[[Role; 4]] = {
    use Role::*;
    &[
        [Cre, Ann, Cre, Ann],
        [Cre, Cre, Ann, Ann],
        [Cre, Ann, Ann, Cre],
        [Ann, Cre, Cre, Ann],
        [Ann, Ann, Cre, Cre],
        [Ann, Cre, Ann, Cre],
    ]
};

/// Canonical orbital quadruple of the four-orbital pattern.
fn canonicalize_four(roles: [Role; 4], idxs: [usize; 4]) -> [usize; 4] {
    let mut cre = roles
        .iter()
        .enumerate()
        .filter(|(_, &r)| r == Role::Cre)
        .map(|(i, _)| idxs[i]);
    let mut ann = roles
        .iter()
        .enumerate()
        .filter(|(_, &r)| r == Role::Ann)
        .map(|(i, _)| idxs[i]);
    let c1 = cre.next().expect("Two creation roles per order.");
    let a1 = ann.next().expect("Two annihilation roles per order.");
    let c2 = cre.next().expect("Two creation roles per order.");
    let a2 = ann.next().expect("Two annihilation roles per order.");
    [c1, a1, c2, a2]
}

// ===================
// Phase determination
// ===================

/// Sign flip of a single excitation from the parity of the doubly-occupied
/// orbitals strictly between its two orbital indices.
fn one_el_phase(p: usize, q: usize, occ_right: &[u8]) -> bool {
    let (lo, hi) = if p < q { (p, q) } else { (q, p) };
    occ_right[lo + 1..hi].iter().filter(|&&d| d == 2).count() % 2 == 1
}

/// Sign flip of a double excitation: the parities of the two constituent single
/// excitations, the first counted on the intermediate configuration and the
/// second on the ket configuration.
fn two_el_phase(
    p: usize,
    q: usize,
    r: usize,
    s: usize,
    occ_ri: &[u8],
    occ_right: &[u8],
) -> bool {
    one_el_phase(p, q, occ_ri) != one_el_phase(r, s, occ_right)
}

fn count_unpaired(occ: &[u8]) -> usize {
    occ.iter().filter(|&&d| d == 1).count()
}

// ==================
// ConnectionBuilder
// ==================

/// Enumerates the excitation connections of a wavefunction generation.
#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    /// The number of molecular orbitals.
    n_orbitals: usize,

    /// Intermediate configurations with fewer unpaired electrons than this carry
    /// no CSF of the target spin and are skipped.
    min_unpaired: usize,
}

impl ConnectionBuilder {
    /// Creates a builder for `n_orbitals` orbitals and a minimum unpaired-electron
    /// count of `min_unpaired` ($`= 2S`$).
    pub fn new(n_orbitals: usize, min_unpaired: usize) -> Self {
        Self {
            n_orbitals,
            min_unpaired,
        }
    }

    /// Builds the connection maps of a wavefunction against itself. Only pairs
    /// with bra index $`\leq`$ ket index are recorded; the sigma evaluator
    /// applies the symmetric counterpart.
    pub fn build(&self, wfn: &WaveFunction) -> ConnectionSet {
        let per_cfg = (0..wfn.n_cfgs())
            .into_par_iter()
            .map(|icfg| self.scan_cfg(icfg, wfn, wfn, true, true))
            .collect::<Vec<_>>();
        let mut out = ConnectionSet::default();
        for set in per_cfg {
            out.merge(set);
        }
        out
    }

    /// Builds the cross-space connection maps with bra configurations from
    /// `wfn_left` and ket configurations from `wfn_right`, without the pair
    /// ordering constraint and without the diagonal pattern. Used for the
    /// first-order-interacting space.
    pub fn build_cross(&self, wfn_left: &WaveFunction, wfn_right: &WaveFunction) -> ConnectionSet {
        let per_cfg = (0..wfn_right.n_cfgs())
            .into_par_iter()
            .map(|icfg| self.scan_cfg(icfg, wfn_left, wfn_right, false, false))
            .collect::<Vec<_>>();
        let mut out = ConnectionSet::default();
        for set in per_cfg {
            out.merge(set);
        }
        out
    }

    /// Scans all excitation patterns of one ket configuration.
    fn scan_cfg(
        &self,
        icfg_right: usize,
        wfn_left: &WaveFunction,
        wfn_right: &WaveFunction,
        ordered: bool,
        with_diagonal: bool,
    ) -> ConnectionSet {
        let occ_right = wfn_right.cfg(icfg_right).occupation();
        let mut out = ConnectionSet::default();

        self.scan_epq(icfg_right, occ_right, wfn_left, ordered, &mut out.one_el);

        if with_diagonal {
            self.scan_epq_eqp(icfg_right, occ_right, &mut out.diagonal);
        }

        for pattern in [
            ThreePattern::EpqEqr,
            ThreePattern::EpqErp,
            ThreePattern::EpqEpr,
            ThreePattern::EpqErq,
        ] {
            for &roles in pattern.orders() {
                self.scan_three(
                    pattern,
                    roles,
                    icfg_right,
                    occ_right,
                    wfn_left,
                    ordered,
                    &mut out.two_el,
                );
            }
        }

        self.scan_epq_epq(icfg_right, occ_right, wfn_left, ordered, &mut out.two_el);

        for &roles in FOUR_ORDERS {
            self.scan_four(roles, icfg_right, occ_right, wfn_left, ordered, &mut out.two_el);
        }

        out
    }

    /// Single excitations $`\hat{E}_{pq}`$.
    fn scan_epq(
        &self,
        icfg_right: usize,
        occ_right: &[u8],
        wfn_left: &WaveFunction,
        ordered: bool,
        out: &mut ConnectionMap1El,
    ) {
        let nue_right = count_unpaired(occ_right);
        let tree = wfn_left.tree();

        // Annihilation below the creation orbital.
        for q in 0..self.n_orbitals {
            if blocks_annihilation(q, occ_right) {
                continue;
            }
            let mut occ = occ_right.to_vec();
            annihilate(q, &mut occ);
            let Some(start) = tree.search_from_root(q + 1, &occ) else {
                continue;
            };
            let mut node = Some(start);
            for p in (q + 1)..self.n_orbitals {
                if p > q + 1 {
                    node = node.and_then(|n| tree.descend(n, occ[p - 1]));
                }
                let Some(n_p) = node else {
                    break;
                };
                if blocks_creation(p, &occ) {
                    continue;
                }
                let mut occ_left = occ.clone();
                create(p, &mut occ_left);
                let Some(icfg_left) = tree.position_from(n_p, p, &occ_left) else {
                    continue;
                };
                if ordered && icfg_left > icfg_right {
                    continue;
                }
                self.push_1el(icfg_left, icfg_right, p, q, &occ_left, occ_right, nue_right, out);
            }
        }

        // Creation below the annihilation orbital.
        for p in 0..self.n_orbitals {
            if blocks_creation(p, occ_right) {
                continue;
            }
            let mut occ = occ_right.to_vec();
            create(p, &mut occ);
            let Some(start) = tree.search_from_root(p + 1, &occ) else {
                continue;
            };
            let mut node = Some(start);
            for q in (p + 1)..self.n_orbitals {
                if q > p + 1 {
                    node = node.and_then(|n| tree.descend(n, occ[q - 1]));
                }
                let Some(n_q) = node else {
                    break;
                };
                if blocks_annihilation(q, &occ) {
                    continue;
                }
                let mut occ_left = occ.clone();
                annihilate(q, &mut occ_left);
                let Some(icfg_left) = tree.position_from(n_q, q, &occ_left) else {
                    continue;
                };
                if ordered && icfg_left > icfg_right {
                    continue;
                }
                self.push_1el(icfg_left, icfg_right, p, q, &occ_left, occ_right, nue_right, out);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_1el(
        &self,
        icfg_left: usize,
        icfg_right: usize,
        p: usize,
        q: usize,
        occ_left: &[u8],
        occ_right: &[u8],
        nue_right: usize,
        out: &mut ConnectionMap1El,
    ) {
        let nue_left = count_unpaired(occ_left);
        let key = cc_info(p, q, nue_left, nue_right, occ_left, occ_right);
        out.entry(key).or_default().push(Connection1El {
            icfg_left,
            icfg_right,
            pq: pack_pq(p, q, self.n_orbitals),
            phase: one_el_phase(p, q, occ_right),
        });
    }

    /// Excitations to the intermediate space and back, $`\hat{E}_{pq}\hat{E}_{qp}`$.
    fn scan_epq_eqp(&self, icfg_right: usize, occ_right: &[u8], out: &mut ConnectionMapDia) {
        let nue_right = count_unpaired(occ_right);
        for p in 0..self.n_orbitals {
            if occ_right[p] == 0 {
                continue;
            }
            for q in 0..self.n_orbitals {
                if p == q || occ_right[q] == 2 {
                    continue;
                }
                let mut occ_ri = occ_right.to_vec();
                occ_ri[p] -= 1;
                occ_ri[q] += 1;
                let nue_ri = count_unpaired(&occ_ri);
                if nue_ri < self.min_unpaired {
                    continue;
                }
                let key = cc_info(q, p, nue_ri, nue_right, &occ_ri, occ_right);
                out.entry(key).or_default().push(ConnectionDia {
                    icfg: icfg_right,
                    pqqp: pack_pqrs(p, q, q, p, self.n_orbitals),
                });
            }
        }
    }

    /// Double excitations at two distinct orbitals, $`\hat{E}_{pq}\hat{E}_{pq}`$.
    fn scan_epq_epq(
        &self,
        icfg_right: usize,
        occ_right: &[u8],
        wfn_left: &WaveFunction,
        ordered: bool,
        out: &mut ConnectionMap2El,
    ) {
        let nue_right = count_unpaired(occ_right);
        let tree = wfn_left.tree();

        for (first_op, first_test, second_op, second_test) in [
            (
                annihilate_twice as OpFn,
                blocks_double_annihilation as TestFn,
                create_twice as OpFn,
                blocks_double_creation as TestFn,
            ),
            (create_twice, blocks_double_creation, annihilate_twice, blocks_double_annihilation),
        ] {
            for lo in 0..self.n_orbitals {
                if first_test(lo, occ_right) {
                    continue;
                }
                let mut occ = occ_right.to_vec();
                first_op(lo, &mut occ);
                let Some(start) = tree.search_from_root(lo + 1, &occ) else {
                    continue;
                };
                let mut node = Some(start);
                for hi in (lo + 1)..self.n_orbitals {
                    if hi > lo + 1 {
                        node = node.and_then(|n| tree.descend(n, occ[hi - 1]));
                    }
                    let Some(n_hi) = node else {
                        break;
                    };
                    if second_test(hi, &occ) {
                        continue;
                    }
                    let mut occ_left = occ.clone();
                    second_op(hi, &mut occ_left);
                    let Some(icfg_left) = tree.position_from(n_hi, hi, &occ_left) else {
                        continue;
                    };
                    if ordered && icfg_left > icfg_right {
                        continue;
                    }

                    // Canonically p is the doubly-created and q the
                    // doubly-annihilated orbital.
                    let (p, q) = if occ_left[lo] < occ_right[lo] {
                        (hi, lo)
                    } else {
                        (lo, hi)
                    };
                    let mut occ_ri = occ_right.to_vec();
                    occ_ri[p] += 1;
                    occ_ri[q] -= 1;
                    let nue_ri = count_unpaired(&occ_ri);
                    if nue_ri < self.min_unpaired {
                        continue;
                    }
                    let nue_left = count_unpaired(&occ_left);

                    let info1 = cc_info(p, q, nue_left, nue_ri, &occ_left, &occ_ri);
                    let info2 = cc_info(p, q, nue_ri, nue_right, &occ_ri, occ_right);
                    let key = two_el_key(&info1, &info2);
                    out.entry(key).or_default().push(Connection2El {
                        icfg_left,
                        icfg_right,
                        pqrs: pack_pqrs(p, q, p, q, self.n_orbitals),
                        phase: false,
                        exchange: false,
                    });
                }
            }
        }
    }

    /// Double excitations over three distinct orbitals.
    #[allow(clippy::too_many_arguments)]
    fn scan_three(
        &self,
        pattern: ThreePattern,
        roles: [Role; 3],
        icfg_right: usize,
        occ_right: &[u8],
        wfn_left: &WaveFunction,
        ordered: bool,
        out: &mut ConnectionMap2El,
    ) {
        let nue_right = count_unpaired(occ_right);
        let tree = wfn_left.tree();
        let (op0, op1, op2) = (
            pattern.op(roles[0]),
            pattern.op(roles[1]),
            pattern.op(roles[2]),
        );
        let (test0, test1, test2) = (
            pattern.test(roles[0]),
            pattern.test(roles[1]),
            pattern.test(roles[2]),
        );

        for p in 0..self.n_orbitals {
            if test0(p, occ_right) {
                continue;
            }
            let mut occ = occ_right.to_vec();
            op0(p, &mut occ);
            let Some(start) = tree.search_from_root(p + 1, &occ) else {
                continue;
            };
            let mut node = Some(start);
            for q in (p + 1)..self.n_orbitals {
                if q > p + 1 {
                    node = node.and_then(|n| tree.descend(n, occ[q - 1]));
                }
                let Some(n_q) = node else {
                    break;
                };
                if test1(q, &occ) {
                    continue;
                }
                let mut occ_q = occ.clone();
                op1(q, &mut occ_q);
                let Some(start_r) = tree.descend(n_q, occ_q[q]) else {
                    continue;
                };
                let mut node_r = Some(start_r);
                for r in (q + 1)..self.n_orbitals {
                    if r > q + 1 {
                        node_r = node_r.and_then(|n| tree.descend(n, occ_q[r - 1]));
                    }
                    let Some(n_r) = node_r else {
                        break;
                    };
                    if test2(r, &occ_q) {
                        continue;
                    }
                    let mut occ_left = occ_q.clone();
                    op2(r, &mut occ_left);
                    let Some(icfg_left) = tree.position_from(n_r, r, &occ_left) else {
                        continue;
                    };
                    if ordered && icfg_left > icfg_right {
                        continue;
                    }

                    let [cp, cq, cr, cs] = pattern.canonicalize(roles, [p, q, r]);
                    let mut occ_ri = occ_right.to_vec();
                    occ_ri[cr] += 1;
                    occ_ri[cs] -= 1;
                    let nue_ri = count_unpaired(&occ_ri);
                    if nue_ri < self.min_unpaired {
                        continue;
                    }
                    let nue_left = count_unpaired(&occ_left);

                    let info1 = cc_info(cp, cq, nue_left, nue_ri, &occ_left, &occ_ri);
                    let info2 = cc_info(cr, cs, nue_ri, nue_right, &occ_ri, occ_right);
                    let key = two_el_key(&info1, &info2);
                    out.entry(key).or_default().push(Connection2El {
                        icfg_left,
                        icfg_right,
                        pqrs: pack_pqrs(cp, cq, cr, cs, self.n_orbitals),
                        phase: two_el_phase(cp, cq, cr, cs, &occ_ri, occ_right),
                        exchange: pattern.exchange(),
                    });
                }
            }
        }
    }

    /// Double excitations over four distinct orbitals, $`\hat{E}_{pq}\hat{E}_{rs}`$.
    fn scan_four(
        &self,
        roles: [Role; 4],
        icfg_right: usize,
        occ_right: &[u8],
        wfn_left: &WaveFunction,
        ordered: bool,
        out: &mut ConnectionMap2El,
    ) {
        let nue_right = count_unpaired(occ_right);
        let tree = wfn_left.tree();
        let op = |role: Role| -> OpFn {
            match role {
                Role::Ann => annihilate,
                Role::Cre => create,
                Role::Zero => unreachable!("No shared orbital in the four-orbital pattern."),
            }
        };
        let test = |role: Role| -> TestFn {
            match role {
                Role::Ann => blocks_annihilation,
                Role::Cre => blocks_creation,
                Role::Zero => unreachable!("No shared orbital in the four-orbital pattern."),
            }
        };

        for p in 0..self.n_orbitals {
            if test(roles[0])(p, occ_right) {
                continue;
            }
            let mut occ = occ_right.to_vec();
            op(roles[0])(p, &mut occ);
            let Some(start) = tree.search_from_root(p + 1, &occ) else {
                continue;
            };
            let mut node = Some(start);
            for q in (p + 1)..self.n_orbitals {
                if q > p + 1 {
                    node = node.and_then(|n| tree.descend(n, occ[q - 1]));
                }
                let Some(n_q) = node else {
                    break;
                };
                if test(roles[1])(q, &occ) {
                    continue;
                }
                let mut occ_q = occ.clone();
                op(roles[1])(q, &mut occ_q);
                let Some(start_r) = tree.descend(n_q, occ_q[q]) else {
                    continue;
                };
                let mut node_r = Some(start_r);
                for r in (q + 1)..self.n_orbitals {
                    if r > q + 1 {
                        node_r = node_r.and_then(|n| tree.descend(n, occ_q[r - 1]));
                    }
                    let Some(n_r) = node_r else {
                        break;
                    };
                    if test(roles[2])(r, &occ_q) {
                        continue;
                    }
                    let mut occ_r = occ_q.clone();
                    op(roles[2])(r, &mut occ_r);
                    let Some(start_s) = tree.descend(n_r, occ_r[r]) else {
                        continue;
                    };
                    let mut node_s = Some(start_s);
                    for s in (r + 1)..self.n_orbitals {
                        if s > r + 1 {
                            node_s = node_s.and_then(|n| tree.descend(n, occ_r[s - 1]));
                        }
                        let Some(n_s) = node_s else {
                            break;
                        };
                        if test(roles[3])(s, &occ_r) {
                            continue;
                        }
                        let mut occ_left = occ_r.clone();
                        op(roles[3])(s, &mut occ_left);
                        let Some(icfg_left) = tree.position_from(n_s, s, &occ_left) else {
                            continue;
                        };
                        if ordered && icfg_left > icfg_right {
                            continue;
                        }

                        let [cp, cq, cr, cs] = canonicalize_four(roles, [p, q, r, s]);
                        let nue_left = count_unpaired(&occ_left);

                        // Both routings through the intermediate space contribute.
                        for (w, x, y, z) in [(cp, cq, cr, cs), (cp, cs, cr, cq)] {
                            let mut occ_ri = occ_right.to_vec();
                            occ_ri[y] += 1;
                            occ_ri[z] -= 1;
                            let nue_ri = count_unpaired(&occ_ri);
                            if nue_ri < self.min_unpaired {
                                continue;
                            }
                            let info1 = cc_info(w, x, nue_left, nue_ri, &occ_left, &occ_ri);
                            let info2 = cc_info(y, z, nue_ri, nue_right, &occ_ri, occ_right);
                            let key = two_el_key(&info1, &info2);
                            out.entry(key).or_default().push(Connection2El {
                                icfg_left,
                                icfg_right,
                                pqrs: pack_pqrs(w, x, y, z, self.n_orbitals),
                                phase: two_el_phase(w, x, y, z, &occ_ri, occ_right),
                                exchange: true,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Assembles the two-operator key from the two constituent one-operator keys.
fn two_el_key(info1: &CcKey1, info2: &CcKey1) -> CcKey2 {
    CcKey2 {
        kind_left: info1.kind,
        kind_right: info2.kind,
        nue_left: info1.nue_left,
        nue_ri: info1.nue_right,
        nue_right: info2.nue_right,
        prel_left: info1.prel,
        qrel_left: info1.qrel,
        prel_right: info2.prel,
        qrel_right: info2.qrel,
    }
}
