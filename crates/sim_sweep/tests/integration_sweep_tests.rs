mod support;

use std::collections::HashSet;

use sim_sweep::{
    Artifact, BuildError, BuildPolicy, CancelToken, Experiment, Extractor, FailurePolicy, FieldPattern, GapPolicy, Injection,
    ParamValue, ParameterSpace, SeedInjection, SpaceError, StopReason, Sweep, SweepError, SweepOptions, SweepReport, TrialError,
    TrialPlan, Values,
};
use support::{defined, packet_definition, packet_output, ScriptedRunner, StubBuilder};

fn buffer_sweep() -> Experiment {
    packet_definition(ParameterSpace::grid().sweep("B", Values::range(1, 5, 1), Injection::Define))
        .compile()
        .expect("definition should compile")
}

fn packet_runner() -> ScriptedRunner<impl Fn(&Artifact, &[String]) -> Result<String, String> + Sync> {
    ScriptedRunner::new(|artifact, _args| Ok(packet_output(defined(artifact, "B"))))
}

fn metrics_of(report: &SweepReport) -> Vec<Vec<Option<f64>>> {
    report.table.rows().iter().map(|row| row.metrics.clone()).collect()
}

#[test]
fn test_sequential_sweep_rebuilds_per_configuration() {
    let builder = StubBuilder::new();
    let runner = packet_runner();

    let report = Sweep::new(buffer_sweep(), &builder, &runner)
        .run()
        .expect("sweep should run");

    assert!(report.is_complete());
    assert_eq!(report.total, 4);
    assert_eq!(report.table.parameters(), ["B"]);
    assert_eq!(report.table.metrics(), ["Rejected", "Transmitted"]);
    let parameters: Vec<Vec<ParamValue>> = report
        .table
        .rows()
        .iter()
        .map(|row| row.parameters.clone())
        .collect();
    assert_eq!(
        parameters,
        (1..=4).map(|b| vec![ParamValue::Int(b)]).collect::<Vec<_>>()
    );
    assert_eq!(
        metrics_of(&report),
        vec![
            vec![Some(10.0), Some(5.0)],
            vec![Some(20.0), Some(10.0)],
            vec![Some(30.0), Some(15.0)],
            vec![Some(40.0), Some(20.0)],
        ]
    );

    let builds = builder.builds();
    assert_eq!(builds.len(), 4);
    assert_eq!(builds[2].0, vec![("B".to_string(), "3".to_string())]);
    assert!(runner.calls().iter().all(|args| args.is_empty()));
}

#[test]
fn test_trials_average_present_values_only() {
    let experiment = buffer_sweep().trials(TrialPlan::seeds(vec![1, 2, 3]));
    let builder = StubBuilder::new();
    let runner = ScriptedRunner::new(|artifact, args| {
        let b = defined(artifact, "B");
        let seed: i64 = args.last().and_then(|seed| seed.parse().ok()).ok_or("missing seed")?;
        if seed == 2 {
            return Ok(format!("Rejected arrival count = {}\n", 10 * b + seed));
        }
        Ok(format!(
            "Rejected arrival count = {}\nTransmitted arrival count = {}\n",
            10 * b + seed,
            5 * b
        ))
    });

    let report = Sweep::new(experiment, &builder, &runner)
        .run()
        .expect("sweep should run");

    assert!(report.is_complete());
    assert_eq!(report.table.rows()[0].metrics, vec![Some(12.0), Some(5.0)]);
    assert_eq!(report.table.rows()[3].metrics, vec![Some(42.0), Some(20.0)]);
    assert_eq!(builder.count(), 4);
    let calls = runner.calls();
    assert_eq!(calls.len(), 12);
    assert_eq!(calls[0], vec!["1".to_string()]);
    assert_eq!(calls[2], vec!["3".to_string()]);
}

#[test]
fn test_absent_metric_in_every_trial_stays_empty() {
    let builder = StubBuilder::new();
    let runner = ScriptedRunner::new(|artifact, _args| {
        Ok(format!("Rejected arrival count = {}\n", 10 * defined(artifact, "B")))
    });

    let report = Sweep::new(buffer_sweep(), &builder, &runner)
        .run()
        .expect("sweep should run");

    assert_eq!(report.table.len(), 4);
    assert_eq!(report.table.rows()[1].metrics, vec![Some(20.0), None]);
}

#[test]
fn test_build_failure_aborts_and_keeps_earlier_rows() {
    let builder = StubBuilder::failing_on("B", "3");
    let runner = packet_runner();

    let report = Sweep::new(buffer_sweep(), &builder, &runner)
        .run()
        .expect("sweep should report the failure");

    assert_eq!(report.stop, Some(StopReason::Aborted { index: 2 }));
    assert_eq!(report.table.len(), 2);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.index, 2);
    assert_eq!(failure.configuration.get("B"), Some(&ParamValue::Int(3)));
    assert!(matches!(
        failure.error,
        TrialError::Build(BuildError::Failed { .. })
    ));
    assert_eq!(builder.count(), 3);
    assert_eq!(runner.calls().len(), 2);
}

#[test]
fn test_skip_policy_continues_past_failures() {
    let builder = StubBuilder::failing_on("B", "3");
    let runner = packet_runner();
    let options = SweepOptions {
        failure_policy: FailurePolicy::Skip,
        ..SweepOptions::default()
    };

    let report = Sweep::new(buffer_sweep(), &builder, &runner)
        .options(options)
        .run()
        .expect("sweep should run");

    assert_eq!(report.stop, None);
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    let recorded: Vec<&ParamValue> = report.table.rows().iter().map(|row| &row.parameters[0]).collect();
    assert_eq!(
        recorded,
        vec![&ParamValue::Int(1), &ParamValue::Int(2), &ParamValue::Int(4)]
    );
    assert_eq!(builder.count(), 4);
}

#[test]
fn test_run_failure_names_the_seed() {
    let experiment = buffer_sweep().trials(TrialPlan::seeds(vec![11, 12]));
    let builder = StubBuilder::new();
    let runner = ScriptedRunner::new(|artifact, args| {
        if defined(artifact, "B") == 2 && args.last().map(String::as_str) == Some("12") {
            return Err("segmentation fault".to_string());
        }
        Ok(packet_output(defined(artifact, "B")))
    });

    let report = Sweep::new(experiment, &builder, &runner)
        .run()
        .expect("sweep should report the failure");

    assert_eq!(report.stop, Some(StopReason::Aborted { index: 1 }));
    match &report.failures[0].error {
        TrialError::Run { seed, .. } => assert_eq!(*seed, Some(12)),
        other => panic!("expected run failure, got {other:?}"),
    }
    assert!(report.failures[0].error.to_string().contains("seed 12"));
}

#[test]
fn test_strict_gap_policy_fails_the_configuration() {
    let builder = StubBuilder::new();
    let runner = ScriptedRunner::new(|artifact, _args| {
        let b = defined(artifact, "B");
        if b == 3 {
            return Ok(format!("Rejected arrival count = {}\n", 10 * b));
        }
        Ok(packet_output(b))
    });
    let options = SweepOptions {
        failure_policy: FailurePolicy::Skip,
        gap_policy: GapPolicy::FailConfiguration,
        ..SweepOptions::default()
    };

    let report = Sweep::new(buffer_sweep(), &builder, &runner)
        .options(options)
        .run()
        .expect("sweep should run");

    assert_eq!(report.table.len(), 3);
    match &report.failures[0].error {
        TrialError::Gaps { seed, metrics } => {
            assert_eq!(*seed, None);
            assert_eq!(metrics, &vec!["Transmitted".to_string()]);
        }
        other => panic!("expected missing metrics, got {other:?}"),
    }
}

#[test]
fn test_cancellation_stops_before_next_configuration() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let builder = StubBuilder::new();
    let runner = ScriptedRunner::new(move |artifact, _args| {
        let b = defined(artifact, "B");
        if b == 2 {
            trigger.cancel();
        }
        Ok(packet_output(b))
    });
    let options = SweepOptions {
        cancel,
        ..SweepOptions::default()
    };

    let report = Sweep::new(buffer_sweep(), &builder, &runner)
        .options(options)
        .run()
        .expect("sweep should stop cleanly");

    assert_eq!(report.stop, Some(StopReason::Cancelled { index: 2 }));
    assert_eq!(report.table.len(), 2);
    assert!(report.failures.is_empty());
    assert_eq!(builder.count(), 2);
}

#[test]
fn test_parallel_sweep_preserves_order_and_isolates_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let experiment = buffer_sweep().artifact(dir.path().join("sim"));
    let builder = StubBuilder::new();
    let runner = packet_runner();
    let options = SweepOptions {
        workers: Some(3),
        ..SweepOptions::default()
    };

    let report = Sweep::new(experiment, &builder, &runner)
        .options(options)
        .run()
        .expect("sweep should run");

    assert!(report.is_complete());
    assert_eq!(
        metrics_of(&report),
        (1..=4)
            .map(|b| vec![Some(10.0 * b as f64), Some(5.0 * b as f64)])
            .collect::<Vec<_>>()
    );

    let paths: HashSet<_> = builder.builds().into_iter().map(|(_, path)| path).collect();
    let expected: HashSet<_> = (0..4).map(|index| dir.path().join(format!("sim-{index}"))).collect();
    assert_eq!(paths, expected);
}

#[test]
fn test_parallel_abort_reports_earliest_failure() {
    let builder = StubBuilder::failing_on("B", "2");
    let runner = packet_runner();
    let dir = tempfile::tempdir().expect("tempdir");
    let options = SweepOptions {
        workers: Some(2),
        ..SweepOptions::default()
    };

    let report = Sweep::new(buffer_sweep().artifact(dir.path().join("sim")), &builder, &runner)
        .options(options)
        .run()
        .expect("sweep should report the failure");

    assert_eq!(report.stop, Some(StopReason::Aborted { index: 1 }));
    assert_eq!(report.table.len(), 1);
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn test_seed_definition_builds_once_per_trial() {
    let experiment = buffer_sweep().trials(
        TrialPlan::seeds(vec![7, 8]).with_injection(SeedInjection::Define {
            name: "SEED".to_string(),
        }),
    );
    let builder = StubBuilder::new();
    let runner = ScriptedRunner::new(|artifact, args| {
        assert!(args.is_empty());
        let seed = defined(artifact, "SEED");
        Ok(format!(
            "Rejected arrival count = {}\nTransmitted arrival count = {}\n",
            10 * defined(artifact, "B") + seed,
            seed
        ))
    });

    let report = Sweep::new(experiment, &builder, &runner)
        .run()
        .expect("sweep should run");

    assert_eq!(report.table.rows()[0].metrics, vec![Some(17.5), Some(7.5)]);
    let builds = builder.builds();
    assert_eq!(builds.len(), 8);
    assert_eq!(
        builds[1].0,
        vec![
            ("B".to_string(), "1".to_string()),
            ("SEED".to_string(), "8".to_string())
        ]
    );
}

#[test]
fn test_seed_definition_may_not_reuse_a_parameter_name() {
    let experiment = buffer_sweep().trials(
        TrialPlan::seeds(vec![7, 8]).with_injection(SeedInjection::Define {
            name: "B".to_string(),
        }),
    );
    let builder = StubBuilder::new();
    let runner = packet_runner();

    let error = Sweep::new(experiment, &builder, &runner)
        .run()
        .expect_err("seed definition collides with B");

    assert!(matches!(error, SweepError::Space(SpaceError::DuplicateName(ref name)) if name == "B"));
    assert_eq!(builder.count(), 0);
}

fn token_bucket(space: ParameterSpace) -> Experiment {
    let extractor = Extractor::new(vec![
        FieldPattern::column("loss_rate", 0),
        FieldPattern::column("output_rate", 1),
    ]);
    Experiment::new("token-bucket", space, extractor)
        .trials(TrialPlan::seeds(vec![5, 6]))
        .build_policy(BuildPolicy::Once)
}

#[test]
fn test_once_policy_builds_a_single_shared_artifact() {
    let space = ParameterSpace::grid()
        .sweep("bt", Values::range(1, 4, 1), Injection::Arg)
        .fixed("bd", 10, Injection::Arg)
        .fixed("MODE", 1, Injection::Define);
    let builder = StubBuilder::new();
    let runner = ScriptedRunner::new(|_artifact, args| {
        let bt: f64 = args[0].parse().map_err(|_| "bad bt".to_string())?;
        Ok(format!("{},{}\n", bt / 10.0, 100.0 - bt))
    });

    let report = Sweep::new(token_bucket(space), &builder, &runner)
        .run()
        .expect("sweep should run");

    assert_eq!(report.table.parameters(), ["bt"]);
    assert_eq!(report.table.rows()[2].metrics, vec![Some(0.3), Some(97.0)]);
    let builds = builder.builds();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].0, vec![("MODE".to_string(), "1".to_string())]);
    let calls = runner.calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[1], vec!["1".to_string(), "10".to_string(), "6".to_string()]);
}

#[test]
fn test_once_policy_rejects_swept_definitions() {
    let space = ParameterSpace::grid().sweep("B", Values::range(1, 3, 1), Injection::Define);
    let builder = StubBuilder::new();
    let runner = packet_runner();

    let error = Sweep::new(token_bucket(space), &builder, &runner)
        .run()
        .expect_err("swept definitions need per-configuration builds");

    assert!(matches!(error, SweepError::OnceWithVaryingDefinition(name) if name == "B"));
    assert_eq!(builder.count(), 0);
}
