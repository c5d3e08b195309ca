//! End-to-end pipeline tests on synthetic drifted trajectories.

mod common;

use common::{drifted_line_store, noisy_drifted_line_store};
use vishva_map::loop_closure::{ProximitySearch, ProximitySearchConfig};
use vishva_map::{CandidateSearch, GlobalMapRefinement, RefinementConfig};

fn scenario_config() -> RefinementConfig {
    let mut config = RefinementConfig::default();
    config.pose_graph.skip_first_n_submaps = 1;
    config
}

#[test]
fn alignment_then_pose_graph_recovers_straight_line() {
    // four submaps on a straight line, 1m apart, with accumulating drift
    // injected between consecutive pairs
    let store = drifted_line_store(1.0, &[0.0, 0.05, 0.09, 0.12]);
    let mut pipeline = GlobalMapRefinement::new(store, scenario_config()).unwrap();

    pipeline.run_submap_alignment(None).unwrap();
    pipeline.run_pose_graph_optimization(None).unwrap();

    // the anchor stays put
    let store = pipeline.store();
    let first = store.get(0).unwrap().pose();
    assert!(
        first.translation().norm() < 1e-4,
        "anchor moved: {:?}",
        first.translation()
    );

    // pairwise relative transforms match the drift-free ground truth
    for i in 1..store.len() {
        let rel = store
            .get(i - 1)
            .unwrap()
            .pose()
            .between(&store.get(i).unwrap().pose());
        let trans_err_mm = (rel.translation().x - 1.0).abs() * 1000.0
            + rel.translation().y.abs() * 1000.0
            + rel.translation().z.abs() * 1000.0;
        assert!(
            trans_err_mm < 10.0,
            "pair {}-{} relative translation off by {trans_err_mm:.2}mm",
            i - 1,
            i
        );
        assert!(
            rel.rotation_angle_deg() < 0.5,
            "pair {}-{} relative rotation off by {:.3}deg",
            i - 1,
            i,
            rel.rotation_angle_deg()
        );
    }

    // alignment deltas recorded for submaps 1..3, none for the anchor
    let summary = pipeline.summary();
    assert!(!summary.alignment().contains_key(&0));
    for stamp in 1..4u64 {
        let delta = summary.alignment().get(&stamp).expect("missing delta");
        assert!(
            delta.translation_mm > 1.0,
            "submap {stamp} reported no correction"
        );
    }
}

#[test]
fn full_pipeline_summary_grows_monotonically() {
    let store = drifted_line_store(1.0, &[0.0, 0.04, 0.07, 0.09]);
    let n = store.len();
    let mut pipeline = GlobalMapRefinement::new(store, scenario_config()).unwrap();

    pipeline.run_submap_refinement(None).unwrap();
    pipeline.run_submap_alignment(None).unwrap();

    let summary = pipeline.summary();
    // one refinement entry per keyframe (one keyframe per submap here)
    assert_eq!(summary.refinement().len(), n);
    // one alignment entry per consecutive pair
    assert_eq!(summary.alignment().len(), n - 1);
}

#[test]
fn stages_can_run_independently_after_pgo_failure() {
    // two submaps: too few for pose-graph optimization with skip 1
    let store = drifted_line_store(1.0, &[0.0]);
    let mut pipeline = GlobalMapRefinement::new(store, scenario_config()).unwrap();

    assert!(pipeline.run_pose_graph_optimization(None).is_err());
    // other stages still work after the precondition failure
    pipeline.run_submap_refinement(None).unwrap();
    pipeline.run_submap_alignment(None).unwrap();
}

#[test]
fn candidate_search_exclusion_holds_over_sweep_range() {
    // wide-open search radius: every submap is in range, so only the
    // exclusion window limits the result
    let store = drifted_line_store(0.5, &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let mut search = ProximitySearch::new(ProximitySearchConfig {
        max_distance: 1e6,
        max_candidates: 100,
    });

    let n = store.len();
    for query in 1..n - 1 {
        let exclude = n - query + 1;
        for candidate in search.find_candidates(&store, query, exclude, false, None) {
            assert!(
                candidate.index + 1 < query,
                "query {query} produced candidate {} inside the exclusion window",
                candidate.index
            );
        }
    }
}

#[test]
fn alignment_tolerates_measurement_noise() {
    // 2mm sensor noise on every point; drift must still be corrected to
    // well under the injected 50mm
    let store = noisy_drifted_line_store(1.0, &[0.0, 0.05, 0.08], 0.002, 42);
    let mut pipeline = GlobalMapRefinement::new(store, scenario_config()).unwrap();
    pipeline.run_submap_alignment(None).unwrap();

    let store = pipeline.store();
    for i in 1..store.len() {
        let x = store.get(i).unwrap().pose().translation().x;
        let err_mm = (x - i as f64).abs() * 1000.0;
        assert!(
            err_mm < 20.0,
            "submap {i} still off by {err_mm:.1}mm after alignment"
        );
    }
}

#[test]
fn refinement_output_dirs_receive_artifacts() {
    let store = drifted_line_store(1.0, &[0.0, 0.03]);
    let mut pipeline = GlobalMapRefinement::new(store, scenario_config()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    pipeline.run_submap_refinement(Some(dir.path())).unwrap();
    assert!(dir.path().join("submap_0/registration_map.ply").is_file());

    pipeline.run_submap_alignment(Some(dir.path())).unwrap();
    assert!(dir
        .path()
        .join("submap_1/submap_cloud_reference.ply")
        .is_file());

    pipeline.save_results(dir.path(), true).unwrap();
    assert!(dir.path().join("summary.json").is_file());
    assert!(dir.path().join("trajectory.json").is_file());
}
