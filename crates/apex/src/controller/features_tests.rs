use super::*;

#[test]
fn one_hot_topology_matches_current_topology() {
    let window = RoleWindow::new(DEFAULT_ROLE_WINDOW);
    let inputs = FeatureInputs { topology: Topology::Chain, steps_since_switch: 0, dwell_min_steps: 2, token_headroom: 1.0 };
    let features = extract(&inputs, &window);
    assert_eq!(&features[0..3], &[0.0, 1.0, 0.0]);
}

#[test]
fn dwell_progress_clips_at_one() {
    let window = RoleWindow::new(DEFAULT_ROLE_WINDOW);
    let inputs = FeatureInputs { topology: Topology::Star, steps_since_switch: 10, dwell_min_steps: 2, token_headroom: 1.0 };
    let features = extract(&inputs, &window);
    assert_eq!(features[3], 1.0);
}

#[test]
fn role_shares_are_computed_over_the_window_only() {
    let mut window = RoleWindow::new(3);
    window.record(Some(Role::Planner));
    window.record(Some(Role::Coder));
    window.record(Some(Role::Critic));
    // Pushed past capacity: Planner falls out of the window.
    window.record(Some(Role::Runner));

    let (planner, coder_runner, critic) = window.shares();
    assert_eq!(planner, 0.0);
    assert!((coder_runner - 2.0 / 3.0).abs() < 1e-9);
    assert!((critic - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn external_sender_counts_toward_window_length_but_no_share() {
    let mut window = RoleWindow::new(2);
    window.record(None);
    window.record(Some(Role::Planner));

    let (planner, coder_runner, critic) = window.shares();
    assert_eq!((coder_runner, critic), (0.0, 0.0));
    assert!((planner - 0.5).abs() < 1e-9);
}

#[test]
fn empty_window_has_zero_shares() {
    let window = RoleWindow::new(DEFAULT_ROLE_WINDOW);
    assert_eq!(window.shares(), (0.0, 0.0, 0.0));
}

#[test]
fn token_headroom_feature_is_clipped_into_unit_interval() {
    let window = RoleWindow::new(DEFAULT_ROLE_WINDOW);
    let inputs = FeatureInputs { topology: Topology::Flat, steps_since_switch: 0, dwell_min_steps: 2, token_headroom: 1.5 };
    let features = extract(&inputs, &window);
    assert_eq!(features[7], 1.0);
}
