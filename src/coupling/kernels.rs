//! Recursive walk and climb kernels over paired Shavitt-graph tries.
//!
//! A *walk* descends two CSF tries synchronously, one node pair per orbital,
//! multiplying the running coefficient by the closed-form segment value of each
//! digit pair and depositing the product at every pair of terminal nodes. A
//! *climb* descends a single trie and enumerates the spin functions of the
//! intermediate configuration its CSFs connect to.
//!
//! Each excitation kind comes in an `r` variant for $`p < q`$ and an `l` variant
//! for $`p > q`$; the segment tables differ between the two directions.

use std::collections::BTreeSet;

use ndarray::Array2;

use crate::csf::CsfTree;

/// Segment value $`A(b, x, y) = \sqrt{(b + x)/(b + y)}`$.
pub(crate) fn seg_a(b: i32, x: i32, y: i32) -> f64 {
    (f64::from(b + x) / f64::from(b + y)).sqrt()
}

/// Segment value $`C(b, x) = \sqrt{(b + x - 1)(b + x + 1)}/(b + x)`$.
pub(crate) fn seg_c(b: i32, x: i32) -> f64 {
    (f64::from((b + x - 1) * (b + x + 1))).sqrt() / f64::from(b + x)
}

/// Diagonal segment value $`f(d, b)`$ of a spectator digit between the two
/// excitation orbitals.
pub(crate) fn seg_f(d: u8, b: i32) -> f64 {
    match d {
        0 | 3 => 1.0,
        1 => seg_a(b, 2, 0) * seg_a(b, -1, 1),
        2 => seg_a(b, 0, 2) * seg_a(b, 3, 1),
        _ => unreachable!("Invalid step value {d}."),
    }
}

macro_rules! on_pair {
    ($lt:ident, $ln:ident, $ld:literal, $rt:ident, $rn:ident, $rd:literal, |$l:ident, $r:ident| $body:expr) => {
        if let (Some($l), Some($r)) = ($lt.child($ln, $ld), $rt.child($rn, $rd)) {
            $body
        }
    };
}

// =============
// Walk kernels
// =============

/// DOMO→SOMO walk, $`p < q`$.
pub(crate) fn walk_ds_r(
    p: usize,
    q: usize,
    flip: bool,
    cc: f64,
    i: usize,
    lt: &CsfTree,
    ln: usize,
    rt: &CsfTree,
    rn: usize,
    out: &mut Array2<f64>,
) {
    if let (Some(lpos), Some(rpos)) = (lt.terminal(ln), rt.terminal(rn)) {
        out[(lpos, rpos)] = cc;
        return;
    }

    if i < p || i > q {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ds_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ds_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == p {
        on_pair!(lt, ln, 3, rt, rn, 1, |l, r| {
            walk_ds_r(p, q, flip, cc * seg_a(rt.b(r), 1, 0), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 3, rt, rn, 2, |l, r| {
            walk_ds_r(p, q, !flip, cc * seg_a(rt.b(r), 1, 2), i + 1, lt, l, rt, r, out)
        });
    } else if i == q {
        on_pair!(lt, ln, 1, rt, rn, 3, |l, r| {
            walk_ds_r(p, q, flip, cc * seg_a(rt.b(r), 0, 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 3, |l, r| {
            walk_ds_r(p, q, flip, cc * seg_a(rt.b(r), 2, 1), i + 1, lt, l, rt, r, out)
        });
    } else if flip {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ds_r(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| {
            walk_ds_r(p, q, flip, cc * seg_c(rt.b(r), 2), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 1, |l, r| {
            walk_ds_r(p, q, !flip, cc / f64::from(rt.b(r)), i + 1, lt, l, rt, r, out)
        });
    } else {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| {
            walk_ds_r(p, q, flip, cc * seg_c(rt.b(r), 0), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ds_r(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 1, rt, rn, 2, |l, r| {
            walk_ds_r(p, q, !flip, -cc / f64::from(rt.b(r) + 2), i + 1, lt, l, rt, r, out)
        });
    }
}

/// DOMO→SOMO walk, $`p > q`$.
pub(crate) fn walk_ds_l(
    p: usize,
    q: usize,
    flip: bool,
    cc: f64,
    i: usize,
    lt: &CsfTree,
    ln: usize,
    rt: &CsfTree,
    rn: usize,
    out: &mut Array2<f64>,
) {
    if let (Some(lpos), Some(rpos)) = (lt.terminal(ln), rt.terminal(rn)) {
        out[(lpos, rpos)] = cc;
        return;
    }

    if i < q || i > p {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ds_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ds_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == q {
        on_pair!(lt, ln, 1, rt, rn, 3, |l, r| {
            walk_ds_l(p, q, !flip, cc * seg_a(rt.b(r), 2, 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 3, |l, r| {
            walk_ds_l(p, q, flip, cc * seg_a(rt.b(r), 0, 1), i + 1, lt, l, rt, r, out)
        });
    } else if i == p {
        on_pair!(lt, ln, 3, rt, rn, 1, |l, r| {
            walk_ds_l(p, q, flip, cc * seg_a(rt.b(r), 0, 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 3, rt, rn, 2, |l, r| {
            walk_ds_l(p, q, flip, cc * seg_a(rt.b(r), 2, 1), i + 1, lt, l, rt, r, out)
        });
    } else if flip {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| {
            walk_ds_l(p, q, flip, cc * seg_c(rt.b(r), 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ds_l(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 1, |l, r| {
            walk_ds_l(p, q, !flip, -cc / f64::from(rt.b(r) + 1), i + 1, lt, l, rt, r, out)
        });
    } else {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ds_l(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| {
            walk_ds_l(p, q, flip, cc * seg_c(rt.b(r), 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 1, rt, rn, 2, |l, r| {
            walk_ds_l(p, q, !flip, cc / f64::from(rt.b(r) + 1), i + 1, lt, l, rt, r, out)
        });
    }
}

/// SOMO→SOMO walk, $`p < q`$.
pub(crate) fn walk_ss_r(
    p: usize,
    q: usize,
    flip: bool,
    cc: f64,
    i: usize,
    lt: &CsfTree,
    ln: usize,
    rt: &CsfTree,
    rn: usize,
    out: &mut Array2<f64>,
) {
    if let (Some(lpos), Some(rpos)) = (lt.terminal(ln), rt.terminal(rn)) {
        out[(lpos, rpos)] = cc;
        return;
    }

    if i < p || i > q {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ss_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ss_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == p {
        on_pair!(lt, ln, 3, rt, rn, 1, |l, r| {
            walk_ss_r(p, q, flip, cc * seg_a(rt.b(r), 1, 0), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 3, rt, rn, 2, |l, r| {
            walk_ss_r(p, q, !flip, cc * seg_a(rt.b(r), 1, 2), i + 1, lt, l, rt, r, out)
        });
    } else if i == q {
        on_pair!(lt, ln, 0, rt, rn, 1, |l, r| walk_ss_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 0, rt, rn, 2, |l, r| walk_ss_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if flip {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ss_r(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| {
            walk_ss_r(p, q, flip, cc * seg_c(rt.b(r), 2), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 1, |l, r| {
            walk_ss_r(p, q, !flip, cc / f64::from(rt.b(r)), i + 1, lt, l, rt, r, out)
        });
    } else {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| {
            walk_ss_r(p, q, flip, cc * seg_c(rt.b(r), 0), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ss_r(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 1, rt, rn, 2, |l, r| {
            walk_ss_r(p, q, !flip, -cc / f64::from(rt.b(r) + 2), i + 1, lt, l, rt, r, out)
        });
    }
}

/// SOMO→SOMO walk, $`p > q`$.
pub(crate) fn walk_ss_l(
    p: usize,
    q: usize,
    flip: bool,
    cc: f64,
    i: usize,
    lt: &CsfTree,
    ln: usize,
    rt: &CsfTree,
    rn: usize,
    out: &mut Array2<f64>,
) {
    if let (Some(lpos), Some(rpos)) = (lt.terminal(ln), rt.terminal(rn)) {
        out[(lpos, rpos)] = cc;
        return;
    }

    if i < q || i > p {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ss_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ss_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == q {
        on_pair!(lt, ln, 0, rt, rn, 1, |l, r| walk_ss_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 0, rt, rn, 2, |l, r| walk_ss_l(p, q, !flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == p {
        on_pair!(lt, ln, 3, rt, rn, 1, |l, r| {
            walk_ss_l(p, q, flip, cc * seg_a(rt.b(r), 0, 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 3, rt, rn, 2, |l, r| {
            walk_ss_l(p, q, flip, cc * seg_a(rt.b(r), 2, 1), i + 1, lt, l, rt, r, out)
        });
    } else if flip {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| {
            walk_ss_l(p, q, flip, cc * seg_c(rt.b(r), 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_ss_l(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 1, |l, r| {
            walk_ss_l(p, q, !flip, -cc / f64::from(rt.b(r) + 1), i + 1, lt, l, rt, r, out)
        });
    } else {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_ss_l(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| {
            walk_ss_l(p, q, flip, cc * seg_c(rt.b(r), 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 1, rt, rn, 2, |l, r| {
            walk_ss_l(p, q, !flip, cc / f64::from(rt.b(r) + 1), i + 1, lt, l, rt, r, out)
        });
    }
}

/// SOMO→virtual walk, $`p < q`$.
pub(crate) fn walk_sv_r(
    p: usize,
    q: usize,
    flip: bool,
    cc: f64,
    i: usize,
    lt: &CsfTree,
    ln: usize,
    rt: &CsfTree,
    rn: usize,
    out: &mut Array2<f64>,
) {
    if let (Some(lpos), Some(rpos)) = (lt.terminal(ln), rt.terminal(rn)) {
        out[(lpos, rpos)] = cc;
        return;
    }

    if i < p || i > q {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_sv_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_sv_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == p {
        on_pair!(lt, ln, 1, rt, rn, 0, |l, r| walk_sv_r(p, q, !flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 0, |l, r| walk_sv_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == q {
        on_pair!(lt, ln, 0, rt, rn, 1, |l, r| walk_sv_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 0, rt, rn, 2, |l, r| walk_sv_r(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if flip {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_sv_r(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| {
            walk_sv_r(p, q, flip, cc * seg_c(rt.b(r), 2), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 1, |l, r| {
            walk_sv_r(p, q, !flip, cc / f64::from(rt.b(r)), i + 1, lt, l, rt, r, out)
        });
    } else {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| {
            walk_sv_r(p, q, flip, cc * seg_c(rt.b(r), 0), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_sv_r(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 1, rt, rn, 2, |l, r| {
            walk_sv_r(p, q, !flip, -cc / f64::from(rt.b(r) + 2), i + 1, lt, l, rt, r, out)
        });
    }
}

/// SOMO→virtual walk, $`p > q`$.
pub(crate) fn walk_sv_l(
    p: usize,
    q: usize,
    flip: bool,
    cc: f64,
    i: usize,
    lt: &CsfTree,
    ln: usize,
    rt: &CsfTree,
    rn: usize,
    out: &mut Array2<f64>,
) {
    if let (Some(lpos), Some(rpos)) = (lt.terminal(ln), rt.terminal(rn)) {
        out[(lpos, rpos)] = cc;
        return;
    }

    if i < q || i > p {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_sv_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_sv_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == q {
        on_pair!(lt, ln, 0, rt, rn, 1, |l, r| walk_sv_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 0, rt, rn, 2, |l, r| walk_sv_l(p, q, !flip, cc, i + 1, lt, l, rt, r, out));
    } else if i == p {
        on_pair!(lt, ln, 1, rt, rn, 0, |l, r| walk_sv_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 0, |l, r| walk_sv_l(p, q, flip, cc, i + 1, lt, l, rt, r, out));
    } else if flip {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| {
            walk_sv_l(p, q, flip, cc * seg_c(rt.b(r), 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| walk_sv_l(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 1, |l, r| {
            walk_sv_l(p, q, !flip, -cc / f64::from(rt.b(r) + 1), i + 1, lt, l, rt, r, out)
        });
    } else {
        on_pair!(lt, ln, 1, rt, rn, 1, |l, r| walk_sv_l(p, q, flip, -cc, i + 1, lt, l, rt, r, out));
        on_pair!(lt, ln, 2, rt, rn, 2, |l, r| {
            walk_sv_l(p, q, flip, cc * seg_c(rt.b(r), 1), i + 1, lt, l, rt, r, out)
        });
        on_pair!(lt, ln, 1, rt, rn, 2, |l, r| {
            walk_sv_l(p, q, !flip, cc / f64::from(rt.b(r) + 1), i + 1, lt, l, rt, r, out)
        });
    }
}

// ==============
// Climb kernels
// ==============

macro_rules! on_child {
    ($t:ident, $n:ident, $d:literal, |$c:ident| $body:expr) => {
        if let Some($c) = $t.child($n, $d) {
            $body
        }
    };
}

/// DOMO→SOMO climb, $`p < q`$.
pub(crate) fn climb_ds_r(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < p || i > q {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ds_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ds_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == p {
        on_child!(t, n, 1, |c| climb_ds_r(p, q, flip, b, i + 1, sf, t, c, out));
        on_child!(t, n, 2, |c| climb_ds_r(p, q, !flip, b, i + 1, sf, t, c, out));
    } else if i == q {
        on_child!(t, n, 3, |c| {
            if b + 1 == t.b(n) {
                with_step(sf, '+', |sf| climb_ds_r(p, q, flip, b + 1, i + 1, sf, t, c, out));
            }
            if b - 1 == t.b(n) {
                with_step(sf, '-', |sf| climb_ds_r(p, q, flip, b - 1, i + 1, sf, t, c, out));
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ds_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ds_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_ds_r(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_ds_r(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        }
    }
}

/// DOMO→SOMO climb, $`p > q`$.
pub(crate) fn climb_ds_l(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < q || i > p {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ds_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ds_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == q {
        on_child!(t, n, 3, |c| {
            with_step(sf, '+', |sf| climb_ds_l(p, q, !flip, b + 1, i + 1, sf, t, c, out));
            with_step(sf, '-', |sf| climb_ds_l(p, q, flip, b - 1, i + 1, sf, t, c, out));
        });
    } else if i == p {
        on_child!(t, n, 1, |c| {
            if b == t.b(c) {
                climb_ds_l(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
        on_child!(t, n, 2, |c| {
            if b == t.b(c) {
                climb_ds_l(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ds_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ds_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_ds_l(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_ds_l(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        }
    }
}

/// DOMO→virtual climb, $`p < q`$.
pub(crate) fn climb_dv_r(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < p || i > q {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_dv_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_dv_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == p {
        on_child!(t, n, 3, |c| {
            with_step(sf, '+', |sf| climb_dv_r(p, q, flip, b + 1, i + 1, sf, t, c, out));
            with_step(sf, '-', |sf| climb_dv_r(p, q, !flip, b - 1, i + 1, sf, t, c, out));
        });
    } else if i == q {
        on_child!(t, n, 0, |c| {
            if b + 1 == t.b(n) {
                with_step(sf, '+', |sf| climb_dv_r(p, q, flip, b + 1, i + 1, sf, t, c, out));
            }
            if b - 1 == t.b(n) {
                with_step(sf, '-', |sf| climb_dv_r(p, q, flip, b - 1, i + 1, sf, t, c, out));
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_dv_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_dv_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_dv_r(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_dv_r(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        }
    }
}

/// DOMO→virtual climb, $`p > q`$.
pub(crate) fn climb_dv_l(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < q || i > p {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_dv_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_dv_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == q {
        on_child!(t, n, 0, |c| {
            with_step(sf, '+', |sf| climb_dv_l(p, q, flip, b + 1, i + 1, sf, t, c, out));
            with_step(sf, '-', |sf| climb_dv_l(p, q, !flip, b - 1, i + 1, sf, t, c, out));
        });
    } else if i == p {
        on_child!(t, n, 3, |c| {
            if b + 1 == t.b(n) {
                with_step(sf, '+', |sf| climb_dv_l(p, q, flip, b + 1, i + 1, sf, t, c, out));
            }
            if b - 1 == t.b(n) {
                with_step(sf, '-', |sf| climb_dv_l(p, q, flip, b - 1, i + 1, sf, t, c, out));
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_dv_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_dv_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_dv_l(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_dv_l(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        }
    }
}

/// SOMO→SOMO climb, $`p < q`$.
pub(crate) fn climb_ss_r(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < p || i > q {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ss_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ss_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == p {
        on_child!(t, n, 1, |c| climb_ss_r(p, q, flip, b, i + 1, sf, t, c, out));
        on_child!(t, n, 2, |c| climb_ss_r(p, q, !flip, b, i + 1, sf, t, c, out));
    } else if i == q {
        on_child!(t, n, 1, |c| {
            if b == t.b(c) {
                climb_ss_r(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
        on_child!(t, n, 2, |c| {
            if b == t.b(c) {
                climb_ss_r(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ss_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ss_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_ss_r(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_ss_r(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        }
    }
}

/// SOMO→SOMO climb, $`p > q`$.
pub(crate) fn climb_ss_l(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < q || i > p {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ss_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ss_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == q {
        on_child!(t, n, 1, |c| climb_ss_l(p, q, flip, b, i + 1, sf, t, c, out));
        on_child!(t, n, 2, |c| climb_ss_l(p, q, !flip, b, i + 1, sf, t, c, out));
    } else if i == p {
        on_child!(t, n, 1, |c| {
            if b == t.b(c) {
                climb_ss_l(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
        on_child!(t, n, 2, |c| {
            if b == t.b(c) {
                climb_ss_l(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_ss_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_ss_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_ss_l(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_ss_l(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        }
    }
}

/// SOMO→virtual climb, $`p < q`$.
pub(crate) fn climb_sv_r(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < p || i > q {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_sv_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_sv_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == p {
        on_child!(t, n, 0, |c| {
            with_step(sf, '+', |sf| climb_sv_r(p, q, !flip, b + 1, i + 1, sf, t, c, out));
            with_step(sf, '-', |sf| climb_sv_r(p, q, flip, b - 1, i + 1, sf, t, c, out));
        });
    } else if i == q {
        on_child!(t, n, 1, |c| {
            if b == t.b(c) {
                climb_sv_r(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
        on_child!(t, n, 2, |c| {
            if b == t.b(c) {
                climb_sv_r(p, q, flip, b, i + 1, sf, t, c, out);
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_sv_r(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_sv_r(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_sv_r(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_sv_r(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        }
    }
}

/// SOMO→virtual climb, $`p > q`$.
pub(crate) fn climb_sv_l(
    p: usize,
    q: usize,
    flip: bool,
    b: i32,
    i: usize,
    sf: &mut String,
    t: &CsfTree,
    n: usize,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if t.terminal(n).is_some() {
        out.insert(sf.clone());
        return;
    }

    if i < q || i > p {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_sv_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_sv_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
    } else if i == q {
        on_child!(t, n, 1, |c| climb_sv_l(p, q, flip, b, i + 1, sf, t, c, out));
        on_child!(t, n, 2, |c| climb_sv_l(p, q, !flip, b, i + 1, sf, t, c, out));
    } else if i == p {
        on_child!(t, n, 0, |c| {
            if b + 1 == t.b(n) {
                with_step(sf, '+', |sf| climb_sv_l(p, q, flip, b + 1, i + 1, sf, t, c, out));
            }
            if b - 1 == t.b(n) {
                with_step(sf, '-', |sf| climb_sv_l(p, q, flip, b - 1, i + 1, sf, t, c, out));
            }
        });
    } else {
        on_child!(t, n, 1, |c| with_step(sf, '+', |sf| climb_sv_l(p, q, flip, b + 1, i + 1, sf, t, c, out)));
        on_child!(t, n, 2, |c| with_step(sf, '-', |sf| climb_sv_l(p, q, flip, b - 1, i + 1, sf, t, c, out)));
        if flip {
            on_child!(t, n, 1, |c| with_step(sf, '-', |sf| climb_sv_l(p, q, !flip, b - 1, i + 1, sf, t, c, out)));
        } else {
            on_child!(t, n, 2, |c| with_step(sf, '+', |sf| climb_sv_l(p, q, !flip, b + 1, i + 1, sf, t, c, out)));
        }
    }
}

/// Runs `body` with `step` appended to the spin-function buffer, restoring the
/// buffer afterwards.
fn with_step(sf: &mut String, step: char, body: impl FnOnce(&mut String)) {
    sf.push(step);
    body(sf);
    sf.pop();
}
