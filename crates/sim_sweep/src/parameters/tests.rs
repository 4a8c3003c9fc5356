use super::*;

fn names_and_values(configuration: &Configuration) -> Vec<(String, ParamValue)> {
    configuration
        .settings()
        .iter()
        .map(|setting| (setting.name.clone(), setting.value.clone()))
        .collect()
}

#[test]
fn test_grid_search_single_parameter() {
    let space = ParameterSpace::grid().sweep("B", Values::range(1, 5, 1), Injection::Define);
    let configurations: Vec<_> = space.generate().unwrap().collect();
    assert_eq!(configurations.len(), 4);
    let values: Vec<_> = configurations
        .iter()
        .map(|c| c.get("B").cloned().unwrap())
        .collect();
    assert_eq!(
        values,
        vec![
            ParamValue::Int(1),
            ParamValue::Int(2),
            ParamValue::Int(3),
            ParamValue::Int(4)
        ]
    );
}

#[test]
fn test_grid_search_outer_dimension_varies_slowest() {
    let space = ParameterSpace::grid()
        .sweep("bt", Values::list([1, 2]), Injection::Arg)
        .sweep("bd", Values::list([10, 20, 30]), Injection::Arg);
    let configurations: Vec<_> = space.generate().unwrap().collect();
    assert_eq!(configurations.len(), 6);

    let pairs: Vec<_> = configurations
        .iter()
        .map(|c| c.run_args().join(" "))
        .collect();
    assert_eq!(
        pairs,
        vec!["1 10", "1 20", "1 30", "2 10", "2 20", "2 30"]
    );
}

#[test]
fn test_generation_is_deterministic_and_restartable() {
    let space = ParameterSpace::grid()
        .sweep("rate", Values::float_range(50.0, 155.0, 5.0), Injection::Arg)
        .sweep("bt", Values::range(1, 4, 1), Injection::Arg);

    let first: Vec<_> = space.generate().unwrap().collect();
    let second: Vec<_> = space.generate().unwrap().collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 21 * 3);

    let iterator = space.generate().unwrap();
    assert_eq!(iterator.total(), first.len());
    assert_eq!(iterator.at(5), Some(first[5].clone()));
    assert_eq!(iterator.at(first.len()), None);
}

#[test]
fn test_float_range_excludes_stop() {
    let values = Values::float_range(0.1, 0.5, 0.1).materialize();
    assert_eq!(values.len(), 4);
    assert_eq!(values.last(), Some(&ParamValue::Float(0.1 + 3.0 * 0.1)));
}

#[test]
fn test_fixed_settings_are_injected_but_not_recorded() {
    let space = ParameterSpace::grid()
        .fixed("PACKET_XMT_TIME", 0.1, Injection::Define)
        .sweep("N", Values::range(3000, 5001, 1000), Injection::Define);
    let configurations: Vec<_> = space.generate().unwrap().collect();

    assert_eq!(configurations.len(), 3);
    assert_eq!(space.recorded_names(), vec!["N".to_string()]);
    assert_eq!(configurations[0].recorded_values(), vec![ParamValue::Int(3000)]);
    assert_eq!(
        configurations[0].definitions(),
        vec![
            ("PACKET_XMT_TIME".to_string(), "0.1".to_string()),
            ("N".to_string(), "3000".to_string()),
        ]
    );
}

#[test]
fn test_derived_parameter_follows_source() {
    let space = ParameterSpace::grid()
        .sweep("N", Values::range(10000, 50001, 20000), Injection::Define)
        .derived("PACKET_XMT_TIME", "N", 1.0, 1_000_000.0, Injection::Define);
    let configurations: Vec<_> = space.generate().unwrap().collect();

    assert_eq!(configurations.len(), 3);
    assert_eq!(
        names_and_values(&configurations[1]),
        vec![
            ("N".to_string(), ParamValue::Int(30000)),
            ("PACKET_XMT_TIME".to_string(), ParamValue::Float(0.03)),
        ]
    );
    assert_eq!(
        space.recorded_names(),
        vec!["N".to_string(), "PACKET_XMT_TIME".to_string()]
    );
}

#[test]
fn test_space_without_sweeps_yields_single_configuration() {
    let space = ParameterSpace::grid().fixed("B", 3, Injection::Define);
    let configurations: Vec<_> = space.generate().unwrap().collect();
    assert_eq!(configurations.len(), 1);
    assert!(configurations[0].recorded_values().is_empty());
}

#[test]
fn test_invalid_spaces_are_rejected() {
    let duplicate = ParameterSpace::grid()
        .sweep("B", Values::range(1, 3, 1), Injection::Define)
        .fixed("B", 1, Injection::Define);
    assert_eq!(
        duplicate.validate(),
        Err(SpaceError::DuplicateName("B".to_string()))
    );

    let empty = ParameterSpace::grid().sweep("B", Values::range(5, 1, 1), Injection::Define);
    assert_eq!(empty.validate(), Err(SpaceError::NoValues("B".to_string())));

    let bad_step = ParameterSpace::grid().sweep("B", Values::range(1, 5, 0), Injection::Define);
    assert_eq!(
        bad_step.validate(),
        Err(SpaceError::InvalidStep("B".to_string()))
    );

    let repeated = ParameterSpace::grid().sweep("B", Values::list([1, 1]), Injection::Define);
    assert!(matches!(
        repeated.validate(),
        Err(SpaceError::DuplicateValue { .. })
    ));

    let orphan = ParameterSpace::grid().derived("X", "N", 1.0, 2.0, Injection::Define);
    assert!(matches!(
        orphan.generate(),
        Err(SpaceError::UnknownSource { .. })
    ));

    let textual = ParameterSpace::grid()
        .sweep("mode", Values::list(["fifo", "lifo"]), Injection::Arg)
        .derived("X", "mode", 1.0, 2.0, Injection::Define);
    assert!(matches!(
        textual.validate(),
        Err(SpaceError::NonNumericSource { .. })
    ));
}

#[test]
fn test_configuration_equality_ignores_injection() {
    let defined = ParameterSpace::grid().sweep("B", Values::list([3]), Injection::Define);
    let argued = ParameterSpace::grid().sweep("B", Values::list([3]), Injection::Arg);
    let left = defined.generate().unwrap().next().unwrap();
    let right = argued.generate().unwrap().next().unwrap();
    assert_eq!(left, right);
    assert_eq!(left.to_string(), "B=3");
}

#[test]
fn test_generated_seeds_are_reproducible() {
    let first = TrialPlan::generated(4, 42);
    let second = TrialPlan::generated(4, 42);
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);

    let mut unique = first.seeds.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 4);

    assert_eq!(TrialPlan::seeds(Vec::<u64>::new()).validate(), Err(SpaceError::NoSeeds));
}

#[test]
fn test_param_value_text_round_trip() {
    for value in [
        ParamValue::Int(-7),
        ParamValue::Float(90.0),
        ParamValue::Float(0.1),
        ParamValue::Float(1e-6),
        ParamValue::Text("fifo".to_string()),
    ] {
        assert_eq!(ParamValue::parse(&value.to_string()), value);
    }
    assert_eq!(ParamValue::Float(90.0).to_string(), "90.0");
}

#[test]
fn test_space_deserializes_from_json() {
    let json = r#"[
        {"kind": "sweep", "name": "B", "values": {"type": "int_range", "start": 1, "stop": 5, "step": 1}},
        {"kind": "fixed", "name": "rate", "value": 90.0, "injection": "arg"},
        {"kind": "derived", "name": "half_b", "source": "B", "divisor": 2.0}
    ]"#;
    let space: ParameterSpace = serde_json::from_str(json).unwrap();
    assert_eq!(space.declarations().len(), 3);
    assert_eq!(
        space.declarations()[1],
        Declaration::Fixed {
            name: "rate".to_string(),
            value: ParamValue::Float(90.0),
            injection: Injection::Arg,
        }
    );
    let configurations: Vec<_> = space.generate().unwrap().collect();
    assert_eq!(configurations[0].get("half_b"), Some(&ParamValue::Float(0.5)));
}
