// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_abs_diff_eq;
use homeostat_core::config::{DomainParams, Injury};
use homeostat_core::domain::Domain;
use homeostat_core::grid::grid_mean;
use homeostat_core::{Decision, HomeostatError, Orchestrator, RunConfig, RunLog};

fn tiled_config() -> RunConfig {
    RunConfig {
        grid: (8, 8),
        steps: 600,
        domains: DomainParams {
            tile: Some((4, 4)),
            ..DomainParams::default()
        },
        ..RunConfig::default()
    }
}

fn domain_mean(orchestrator: &Orchestrator, domain: &Domain) -> (f64, f64) {
    let v = orchestrator.tissue().voltage();
    let e = orchestrator.energy().energy();
    (grid_mean(&domain.view_of(&v)), grid_mean(&domain.view_of(&e)))
}

#[test]
fn tiled_run_logs_every_stride_and_recovers() {
    let mut orchestrator = Orchestrator::new(tiled_config()).unwrap();
    let mut log = RunLog::new();
    let summary = orchestrator.run(&mut log);

    assert_eq!(log.global_len(), 60);
    assert_eq!(log.domain_len(), 240);
    assert_eq!(summary.domain_count, 4);
    assert_eq!(summary.tile, (4, 4));
    assert!(summary.recovery_step.is_some());
    assert!((0.0..=1.0).contains(&summary.flicker_rate));
    assert!(summary.final_mean_energy >= 0.0);
    assert!((summary.final_mean_v + 5.0).abs() < 1.0);

    let first = log.globals().next().unwrap();
    assert_eq!(first.t, 0.0);
    assert_eq!(first.plv, None);
    assert_eq!(first.coupling, None);
    assert_eq!(first.domain_low_fraction, 1.0);
    let ts: Vec<f64> = log.globals().map(|row| row.t).collect();
    assert!(ts.windows(2).all(|pair| pair[1] - pair[0] == 10.0));
    for row in log.globals() {
        assert!(row.energy >= 0.0);
        if let Some(plv) = row.plv {
            assert!((0.0..=1.0).contains(&plv));
        }
        if let Some(coupling) = row.coupling {
            assert!((0.0..=1.0).contains(&coupling));
        }
    }
}

#[test]
fn dropped_controllers_always_rest() {
    let mut config = tiled_config();
    config.domains.dropout_fraction = 0.5;
    config.steps = 300;
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let unhealthy: Vec<usize> = orchestrator
        .controllers()
        .iter()
        .filter(|ctrl| !ctrl.is_healthy())
        .map(|ctrl| ctrl.domain().id)
        .collect();
    assert_eq!(unhealthy.len(), 2);

    let mut log = RunLog::new();
    orchestrator.run(&mut log);
    for row in log.domains() {
        if unhealthy.contains(&row.domain_id) {
            assert_eq!(row.action, Decision::Rest.code());
            assert_eq!(row.controller_health, 0.0);
        } else {
            assert_eq!(row.controller_health, 1.0);
        }
    }
    for ctrl in orchestrator.controllers().iter().filter(|c| !c.is_healthy()) {
        assert_eq!(ctrl.last_pulse(), 0.0);
        assert_eq!(ctrl.decoder().current(), Decision::Rest);
    }
}

#[test]
fn seeded_noise_is_reproducible() {
    let mut config = tiled_config();
    config.tissue.noise_rms = 0.5;
    config.steps = 200;
    config.domains.dropout_fraction = 0.25;

    let run = |config: RunConfig| {
        let mut orchestrator = Orchestrator::new(config).unwrap();
        let mut log = RunLog::new();
        let summary = orchestrator.run(&mut log);
        (summary, log.drain())
    };
    let (summary_a, rows_a) = run(config.clone());
    let (summary_b, rows_b) = run(config.clone());
    assert_eq!(summary_a, summary_b);
    assert_eq!(rows_a, rows_b);

    config.seed += 1;
    let (summary_c, _) = run(config);
    assert_ne!(summary_a.final_mean_v, summary_c.final_mean_v);
}

#[test]
fn uneven_tiles_are_rejected_before_running() {
    let mut config = tiled_config();
    config.domains.tile = Some((3, 3));
    let err = Orchestrator::new(config).unwrap_err();
    assert!(matches!(
        err,
        HomeostatError::TileMismatch {
            height: 8,
            width: 8,
            tile_h: 3,
            tile_w: 3
        }
    ));
}

#[test]
fn injuries_apply_once_and_skip_unknown_domains() {
    let mut config = tiled_config();
    config.domains.injuries = vec![
        Injury {
            id: 1,
            delta_v: Some(-10.0),
            e0: Some(0.1),
        },
        Injury {
            id: 99,
            delta_v: Some(-50.0),
            e0: None,
        },
        Injury {
            id: -1,
            delta_v: None,
            e0: Some(0.0),
        },
    ];
    let orchestrator = Orchestrator::new(config).unwrap();
    let domains: Vec<Domain> = orchestrator
        .controllers()
        .iter()
        .map(|ctrl| ctrl.domain().clone())
        .collect();

    let (v1, e1) = domain_mean(&orchestrator, &domains[1]);
    assert_abs_diff_eq!(v1, -28.0, epsilon = 1e-12);
    assert_abs_diff_eq!(e1, 0.1, epsilon = 1e-12);
    for domain in [&domains[0], &domains[2], &domains[3]] {
        let (v, e) = domain_mean(&orchestrator, domain);
        assert_abs_diff_eq!(v, -18.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e, 0.8, epsilon = 1e-12);
    }
}

#[test]
fn json_config_drives_a_run() {
    let raw = r#"{
        "grid": [8, 8],
        "steps": 50,
        "seed": 42,
        "tissue": { "boundary": "reflecting", "noise_rms": 0.1 },
        "domains": {
            "tile": [4, 8],
            "injuries": [{ "id": 0, "delta_v": -5.0 }]
        },
        "logging": { "stride": 5 }
    }"#;
    let config = RunConfig::from_json_str(raw).unwrap();
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let mut log = RunLog::new();
    let summary = orchestrator.run(&mut log);
    assert_eq!(summary.domain_count, 2);
    assert_eq!(log.global_len(), 10);
    assert_eq!(log.domain_len(), 20);
    assert!(log.to_json().unwrap().contains("\"domain_id\":1"));
}

#[test]
fn malformed_injuries_in_json_do_not_abort_construction() {
    let raw = r#"{
        "grid": [8, 8],
        "steps": 10,
        "domains": {
            "tile": [4, 4],
            "injuries": [
                null,
                "bogus",
                { "delta_v": -40.0 },
                { "id": 1, "delta_v": -6.0, "e0": 0.25 }
            ]
        }
    }"#;
    let config = RunConfig::from_json_str(raw).unwrap();
    assert_eq!(config.domains.injuries.len(), 2);

    let orchestrator = Orchestrator::new(config).unwrap();
    let domains: Vec<Domain> = orchestrator
        .controllers()
        .iter()
        .map(|ctrl| ctrl.domain().clone())
        .collect();
    let (v1, e1) = domain_mean(&orchestrator, &domains[1]);
    assert_abs_diff_eq!(v1, -24.0, epsilon = 1e-12);
    assert_abs_diff_eq!(e1, 0.25, epsilon = 1e-12);
    // The entry without an id targets no domain.
    for domain in [&domains[0], &domains[2], &domains[3]] {
        let (v, e) = domain_mean(&orchestrator, domain);
        assert_abs_diff_eq!(v, -18.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e, 0.8, epsilon = 1e-12);
    }
}
