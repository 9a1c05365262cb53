use crate::csf::Cfg;
use crate::wavefunction::WaveFunction;

fn cfg_with_all_csfs(spin: f64, occ: &str) -> Cfg {
    let mut cfg = Cfg::from_occupation_str(spin, occ).unwrap();
    cfg.generate_all();
    cfg
}

#[test]
fn test_wavefunction_block_layout_is_contiguous() {
    let mut wfn = WaveFunction::new(0.0);
    for occ in ["2200", "2020", "1120", "1111"] {
        wfn.insert_cfg(cfg_with_all_csfs(0.0, occ));
    }

    assert_eq!(wfn.n_cfgs(), 4);
    let mut expected_offset = 0;
    for icfg in 0..wfn.n_cfgs() {
        assert_eq!(wfn.offset(icfg), expected_offset);
        assert_eq!(wfn.block_len(icfg), wfn.cfg(icfg).n_csfs());
        expected_offset += wfn.block_len(icfg);
    }
    assert_eq!(wfn.n_csfs(), expected_offset);
    // "1111" couples four unpaired electrons into two singlet CSFs.
    assert_eq!(wfn.block_len(3), 2);
}

#[test]
fn test_wavefunction_cfg_lookup() {
    let mut wfn = WaveFunction::new(0.0);
    let i0 = wfn.insert_cfg(cfg_with_all_csfs(0.0, "220"));
    let i1 = wfn.insert_cfg(cfg_with_all_csfs(0.0, "202"));

    assert_eq!(wfn.find_cfg(&[2, 2, 0]), Some(i0));
    assert_eq!(wfn.find_cfg(&[2, 0, 2]), Some(i1));
    assert_eq!(wfn.find_cfg(&[0, 2, 2]), None);
}

#[test]
fn test_cfg_tree_incremental_descent() {
    let mut wfn = WaveFunction::new(0.0);
    wfn.insert_cfg(cfg_with_all_csfs(0.0, "2110"));
    wfn.insert_cfg(cfg_with_all_csfs(0.0, "2101"));

    let tree = wfn.tree();
    let node = tree.search_from_root(2, &[2, 1, 0, 0]).unwrap();
    assert_eq!(tree.position_from(node, 2, &[2, 1, 1, 0]), Some(0));
    assert_eq!(tree.position_from(node, 2, &[2, 1, 0, 1]), Some(1));
    assert_eq!(tree.position_from(node, 2, &[2, 1, 1, 1]), None);
    assert!(tree.search_from_root(2, &[1, 1, 0, 0]).is_none());
}
