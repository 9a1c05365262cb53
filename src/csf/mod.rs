//! Configuration state functions, their step-vector tries and configurations.
//!
//! A configuration state function (CSF) is encoded as a *step vector*: one digit per
//! orbital over $`\{0, 1, 2, 3\}`$ tracing a walk on the Shavitt graph, where `0`
//! denotes an unoccupied orbital, `1` a singly occupied orbital coupling the total
//! spin up, `2` a singly occupied orbital coupling the total spin down and `3` a
//! doubly occupied orbital. A configuration (CFG) is an occupation-number vector
//! (ONV) over $`\{0, 1, 2\}`$ that groups all CSFs sharing its orbital occupations.
//!
//! The reduced spin-coupling pattern of a CSF, its singly-occupied steps written
//! over $`\{+, -\}`$, is called a *spin function* (SF). Identical spin functions
//! recur across configurations with the same number of unpaired electrons, so they
//! are catalogued globally and configurations refer to them by index.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{self, bail};
use indexmap::IndexSet;

#[cfg(test)]
#[path = "csf_tests.rs"]
mod csf_tests;

/// Sentinel marking an absent child link in the arena trees.
pub(crate) const ABSENT: usize = usize::MAX;

// ==================
// Struct definitions
// ==================

// --------
// CsfTree
// --------

/// A node of a [`CsfTree`].
#[derive(Clone, Debug)]
pub(crate) struct CsfNode {
    /// Child links per step digit; [`ABSENT`] where no CSF continues with that digit.
    pub(crate) children: [usize; 4],

    /// The $`b`$ quantum number accumulated along the walk to this node: $`+1`$ for
    /// every step `1`, $`-1`$ for every step `2`.
    pub(crate) b: i32,

    /// The dense position of the CSF terminating at this node, if any.
    pub(crate) pos: Option<usize>,
}

impl CsfNode {
    fn new(b: i32) -> Self {
        Self {
            children: [ABSENT; 4],
            b,
            pos: None,
        }
    }
}

/// A trie over step-vector digits mapping each stored CSF to a dense position.
///
/// Nodes live in an arena and refer to their children through plain indices with
/// [`ABSENT`] as the null link, so the structure involves no per-node allocation
/// and no ownership cycles.
#[derive(Clone, Debug)]
pub struct CsfTree {
    nodes: Vec<CsfNode>,
}

impl Default for CsfTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CsfTree {
    /// Creates an empty tree holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![CsfNode::new(0)],
        }
    }

    /// The root node index.
    pub(crate) fn root(&self) -> usize {
        0
    }

    /// The child of `node` along step digit `d`, if present.
    pub(crate) fn child(&self, node: usize, d: u8) -> Option<usize> {
        let child = self.nodes[node].children[usize::from(d)];
        (child != ABSENT).then_some(child)
    }

    /// The cached $`b`$ quantum number of `node`.
    pub(crate) fn b(&self, node: usize) -> i32 {
        self.nodes[node].b
    }

    /// The dense position of the CSF terminating at `node`, if `node` is terminal.
    pub(crate) fn terminal(&self, node: usize) -> Option<usize> {
        self.nodes[node].pos
    }

    /// Inserts the digit path of `csf`, lazily allocating nodes and caching their
    /// $`b`$ quantum numbers, and marks the terminal node with `pos`.
    pub fn insert(&mut self, pos: usize, csf: &[u8]) {
        let mut current = self.root();
        for &d in csf {
            let slot = usize::from(d);
            let child = self.nodes[current].children[slot];
            current = if child == ABSENT {
                let b = match d {
                    1 => self.nodes[current].b + 1,
                    2 => self.nodes[current].b - 1,
                    _ => self.nodes[current].b,
                };
                let idx = self.nodes.len();
                self.nodes.push(CsfNode::new(b));
                self.nodes[current].children[slot] = idx;
                idx
            } else {
                child
            };
        }
        self.nodes[current].pos = Some(pos);
    }

    /// Walks the digit path of `csf` and returns the stored position, or `None`
    /// when the path is absent.
    pub fn position_of(&self, csf: &[u8]) -> Option<usize> {
        let mut current = self.root();
        for &d in csf {
            current = self.child(current, d)?;
        }
        self.terminal(current)
    }

    /// Discards all stored CSFs.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.push(CsfNode::new(0));
    }
}

// ----
// Cfg
// ----

/// A configuration: an occupation-number vector together with its CSFs, their
/// spin-function indices and a [`CsfTree`] for position lookups.
#[derive(Clone, Debug)]
pub struct Cfg {
    /// The total spin $`S`$ the CSFs couple to.
    spin: f64,

    /// The occupation-number vector, one digit over $`\{0, 1, 2\}`$ per orbital.
    occ: Vec<u8>,

    /// The number of electrons in the configuration.
    n_electrons: usize,

    /// The number of singly-occupied orbitals.
    n_unpaired: usize,

    /// The Shavitt-walk endpoint $`(a, b, c)`$ any valid CSF of this configuration
    /// must reach.
    target: [i32; 3],

    /// The CSF step vectors, in storage order.
    csfs: Vec<Vec<u8>>,

    /// Per CSF, the index of its spin function. Catalogue-resolved wherever the
    /// configuration is part of a wavefunction; local generation indices right
    /// after [`Cfg::generate_all`].
    sf_idxs: Vec<usize>,

    /// The trie addressing the stored CSFs.
    tree: CsfTree,
}

impl Cfg {
    /// Creates an empty configuration for the given occupation-number vector and
    /// total spin.
    pub fn new(spin: f64, occ: Vec<u8>) -> Self {
        let n_electrons = occ.iter().map(|&d| usize::from(d)).sum::<usize>();
        let n_unpaired = occ.iter().filter(|&&d| d == 1).count();
        let n_orbitals = occ.len();
        let a_target = ((0.5 * n_electrons as f64) - spin).round() as i32;
        let b_target = (2.0 * spin).round() as i32;
        let target = [
            a_target,
            b_target,
            n_orbitals as i32 - a_target - b_target,
        ];
        Self {
            spin,
            occ,
            n_electrons,
            n_unpaired,
            target,
            csfs: Vec::new(),
            sf_idxs: Vec::new(),
            tree: CsfTree::new(),
        }
    }

    /// Parses the occupation-number vector from a digit string and constructs an
    /// empty configuration.
    pub fn from_occupation_str(spin: f64, occ: &str) -> Result<Self, anyhow::Error> {
        Ok(Self::new(spin, parse_occupation_vector(occ)?))
    }

    /// The occupation-number vector.
    pub fn occupation(&self) -> &[u8] {
        &self.occ
    }

    /// The number of electrons.
    pub fn n_electrons(&self) -> usize {
        self.n_electrons
    }

    /// The number of unpaired (singly-occupied) electrons.
    pub fn n_unpaired(&self) -> usize {
        self.n_unpaired
    }

    /// The number of stored CSFs.
    pub fn n_csfs(&self) -> usize {
        self.csfs.len()
    }

    /// The step vector of the CSF at storage position `icsf`.
    pub fn csf(&self, icsf: usize) -> &[u8] {
        &self.csfs[icsf]
    }

    /// The stored CSFs.
    pub fn csfs(&self) -> &[Vec<u8>] {
        &self.csfs
    }

    /// The spin-function indices parallel to [`Cfg::csfs`].
    pub fn sf_idxs(&self) -> &[usize] {
        &self.sf_idxs
    }

    /// The trie addressing the stored CSFs.
    pub(crate) fn tree(&self) -> &CsfTree {
        &self.tree
    }

    /// The storage position of `csf`, or `None` when the configuration does not
    /// contain it.
    pub fn position_of(&self, csf: &[u8]) -> Option<usize> {
        self.tree.position_of(csf)
    }

    /// Appends a CSF with its spin-function index.
    pub fn insert_csf(&mut self, sf_idx: usize, csf: Vec<u8>) {
        let pos = self.csfs.len();
        self.tree.insert(pos, &csf);
        self.csfs.push(csf);
        self.sf_idxs.push(sf_idx);
    }

    /// Discards the stored CSFs and regenerates all step vectors consistent with
    /// the occupation-number vector and the target spin.
    ///
    /// The enumeration is a depth-first walk over the step digits admissible at
    /// each orbital (`0` at an empty orbital, `1` or `2` at a singly-occupied one,
    /// `3` at a doubly-occupied one), pruning any partial walk whose intermediate
    /// spin drops below zero or whose electron count overruns, and accepting only
    /// walks hitting the exact endpoint. The spin-function indices are the local
    /// generation positions afterwards; see [`Cfg::assign_sf_indices`] for
    /// resolving them through a global catalogue.
    pub fn generate_all(&mut self) {
        self.tree.reset();
        self.csfs.clear();
        self.sf_idxs.clear();

        if self.n_unpaired == 0 {
            // Closed-shell configuration: the single CSF needs no walk.
            let csf = self
                .occ
                .iter()
                .map(|&d| if d == 2 { 3 } else { 0 })
                .collect::<Vec<u8>>();
            if self.target[1] == 0 {
                self.tree.insert(0, &csf);
                self.csfs.push(csf);
                self.sf_idxs.push(0);
            }
            return;
        }

        let mut csf = vec![0u8; self.occ.len()];
        self.generate_recursive(0, [0, 0, 0], &mut csf);
    }

    fn generate_recursive(&mut self, i: usize, row: [i32; 3], csf: &mut Vec<u8>) {
        if row[1] < 0 {
            return;
        }
        if 2 * row[0] + row[1] > self.n_electrons as i32 {
            return;
        }

        if i == self.occ.len() {
            if row == self.target {
                let pos = self.csfs.len();
                self.tree.insert(pos, csf);
                self.csfs.push(csf.clone());
                self.sf_idxs.push(pos);
            }
            return;
        }

        for d in match self.occ[i] {
            0 => &[0u8][..],
            1 => &[1u8, 2u8][..],
            _ => &[3u8][..],
        } {
            csf[i] = *d;
            let step = step_row(*d);
            self.generate_recursive(
                i + 1,
                [row[0] + step[0], row[1] + step[1], row[2] + step[2]],
                csf,
            );
        }
        csf[i] = 0;
    }

    /// Discards the stored CSFs and re-derives them from externally supplied spin
    /// functions with their catalogue indices.
    pub fn csfs_from_sfs(&mut self, sfs: &BTreeMap<String, usize>) {
        self.tree.reset();
        self.csfs.clear();
        self.sf_idxs.clear();

        for (sf, &sf_idx) in sfs {
            let csf = csf_from_sf(&self.occ, sf);
            self.insert_csf(sf_idx, csf);
        }
    }

    /// The reduced $`\{+, -\}`$ spin-coupling patterns of the stored CSFs.
    pub fn extract_sfs(&self) -> Vec<String> {
        if self.n_unpaired == 0 {
            vec![String::new()]
        } else {
            self.csfs.iter().map(|csf| spin_function_of(csf)).collect()
        }
    }

    /// Resolves the spin-function indices through the global catalogue, appending
    /// spin functions the catalogue has not seen before.
    pub fn assign_sf_indices(&mut self, table: &mut SpinFunctionTable) {
        let nue = self.n_unpaired;
        for i in 0..self.csfs.len() {
            let sf = spin_function_of(&self.csfs[i]);
            self.sf_idxs[i] = table.insert(nue, sf);
        }
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", occupation_string(&self.occ))
    }
}

/// The change in the Shavitt-walk row $`(a, b, c)`$ effected by one step digit.
fn step_row(d: u8) -> [i32; 3] {
    match d {
        0 => [0, 0, 1],
        1 => [0, 1, 0],
        2 => [1, -1, 1],
        _ => [1, 0, 0],
    }
}

// ------------------
// SpinFunctionTable
// ------------------

/// The global spin-function catalogue: per unpaired-electron count, a
/// deterministically ordered index of the reduced spin-coupling patterns seen so
/// far, so identical patterns share one index across configurations.
#[derive(Clone, Debug, Default)]
pub struct SpinFunctionTable {
    by_nue: BTreeMap<usize, IndexSet<String>>,
}

impl SpinFunctionTable {
    /// Creates an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the catalogue and generates all spin functions coupling to total
    /// spin `spin` for every admissible unpaired-electron count up to
    /// `max_unpaired`, indexed in lexicographic order.
    pub fn create_all(&mut self, spin: f64, max_unpaired: usize) {
        self.by_nue.clear();

        let b_target = (2.0 * spin).round() as i32;
        let start = if b_target == 0 {
            self.by_nue
                .entry(0)
                .or_default()
                .insert(String::new());
            2
        } else {
            b_target as usize
        };

        for nue in (start..=max_unpaired).step_by(2) {
            let mut sfs = BTreeSet::new();
            let mut buf = vec![b'0'; nue];
            generate_sfs_recursive(nue, b_target, 0, 0, &mut buf, &mut sfs);
            let entry = self.by_nue.entry(nue).or_default();
            for sf in sfs {
                entry.insert(sf);
            }
        }
    }

    /// Appends a spin function for the given unpaired-electron count, returning
    /// its index; an already-catalogued pattern keeps its index.
    pub fn insert(&mut self, nue: usize, sf: String) -> usize {
        self.by_nue.entry(nue).or_default().insert_full(sf).0
    }

    /// The index of `sf` among the patterns with `nue` unpaired electrons.
    pub fn index_of(&self, nue: usize, sf: &str) -> Option<usize> {
        self.by_nue.get(&nue)?.get_index_of(sf)
    }

    /// The pattern at `idx` among the patterns with `nue` unpaired electrons.
    pub fn sf(&self, nue: usize, idx: usize) -> Option<&str> {
        self.by_nue.get(&nue)?.get_index(idx).map(String::as_str)
    }

    /// The number of catalogued patterns with `nue` unpaired electrons.
    pub fn len(&self, nue: usize) -> usize {
        self.by_nue.get(&nue).map_or(0, IndexSet::len)
    }

    /// Whether the catalogue holds no patterns at all.
    pub fn is_empty(&self) -> bool {
        self.by_nue.values().all(IndexSet::is_empty)
    }
}

/// Depth-first enumeration of the $`\{+, -\}`$ patterns of length `nue` whose
/// running doubled spin never drops below zero and ends at `b_target`.
fn generate_sfs_recursive(
    nue: usize,
    b_target: i32,
    b: i32,
    i: usize,
    buf: &mut Vec<u8>,
    out: &mut BTreeSet<String>,
) {
    if b < 0 {
        return;
    }
    if i == nue {
        if b == b_target {
            out.insert(String::from_utf8(buf.clone()).expect("Spin functions are ASCII."));
        }
        return;
    }
    buf[i] = b'+';
    generate_sfs_recursive(nue, b_target, b + 1, i + 1, buf, out);
    buf[i] = b'-';
    generate_sfs_recursive(nue, b_target, b - 1, i + 1, buf, out);
}

// =================
// Parsing utilities
// =================

/// Parses a step-vector digit string over `{0, 1, 2, 3}`.
///
/// # Errors
///
/// A character outside `{0, 1, 2, 3}` has no recoverable interpretation and is a
/// fatal input-validation failure.
pub fn parse_step_vector(s: &str) -> Result<Vec<u8>, anyhow::Error> {
    s.chars()
        .map(|c| match c {
            '0'..='3' => Ok(c as u8 - b'0'),
            _ => bail!("Malformed step value `{c}` in step vector `{s}`."),
        })
        .collect()
}

/// Parses an occupation-number digit string over `{0, 1, 2}`.
///
/// # Errors
///
/// A character outside `{0, 1, 2}` is a fatal input-validation failure.
pub fn parse_occupation_vector(s: &str) -> Result<Vec<u8>, anyhow::Error> {
    s.chars()
        .map(|c| match c {
            '0'..='2' => Ok(c as u8 - b'0'),
            _ => bail!("Malformed occupation number `{c}` in occupation vector `{s}`."),
        })
        .collect()
}

/// Renders a step vector as a digit string.
pub fn step_vector_string(csf: &[u8]) -> String {
    csf.iter().map(|&d| char::from(b'0' + d)).collect()
}

/// Renders an occupation-number vector as a digit string.
pub fn occupation_string(occ: &[u8]) -> String {
    occ.iter().map(|&d| char::from(b'0' + d)).collect()
}

/// The occupation-number vector underlying a step vector.
pub fn occupation_of_step_vector(csf: &[u8]) -> Vec<u8> {
    csf.iter()
        .map(|&d| match d {
            0 => 0,
            1 | 2 => 1,
            _ => 2,
        })
        .collect()
}

/// The step vector of the CSF with spin function `sf` over the occupation
/// vector `occ`: empty orbitals step `0`, doubly-occupied orbitals step `3` and
/// singly-occupied orbitals consume the next `+`/`-` of the spin function.
pub(crate) fn csf_from_sf(occ: &[u8], sf: &str) -> Vec<u8> {
    let mut sf_chars = sf.chars();
    occ.iter()
        .map(|&d| match d {
            0 => 0,
            2 => 3,
            _ => {
                if sf_chars.next() == Some('+') {
                    1
                } else {
                    2
                }
            }
        })
        .collect()
}

/// The reduced $`\{+, -\}`$ spin-coupling pattern of a step vector.
pub fn spin_function_of(csf: &[u8]) -> String {
    csf.iter()
        .filter_map(|&d| match d {
            1 => Some('+'),
            2 => Some('-'),
            _ => None,
        })
        .collect()
}
