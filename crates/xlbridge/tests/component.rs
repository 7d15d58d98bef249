//! End-to-end tests of the bridge component against the scripted fake
//! application: marshalling, macro stages, timeout classification and
//! recovery across invocations.

mod common;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::{Event, FakeLauncher, MacroScript};
use pretty_assertions::assert_eq;
use xlbridge::{BridgeError, ExcelComponent, ExcelComponentConfig, VarMap, WRAPPER_MODULE_NAME};
use xlbridge_protocol::{CalcMode, CellError, CellValue};

fn passthrough_config() -> ExcelComponentConfig {
    let mut config = ExcelComponentConfig::new("tests/data/passthrough.xlsx");
    config.inputs = vec![VarMap::new("in", "a")];
    config.outputs = vec![VarMap::new("out", "b")];
    config
}

fn passthrough_launcher() -> FakeLauncher {
    FakeLauncher::new()
        .with_range("a")
        .with_range("b")
        .with_formula("a", "b")
}

fn inputs_of(value: f64) -> HashMap<String, Vec<f64>> {
    HashMap::from([("in".to_string(), vec![value])])
}

#[test]
fn passthrough_round_trip_is_bit_exact() {
    for &value in &[
        0.0,
        -0.0,
        1.0,
        -1.5,
        1e300,
        -1e300,
        5e-324,
        123_456.789,
        f64::MAX,
        f64::MIN,
    ] {
        let launcher = passthrough_launcher();
        let mut component =
            ExcelComponent::with_launcher(passthrough_config(), launcher).unwrap();

        let mut outputs = HashMap::new();
        component.compute(&inputs_of(value), &mut outputs).unwrap();
        component.cleanup();

        assert_eq!(outputs["out"].len(), 1);
        assert_eq!(outputs["out"][0].to_bits(), value.to_bits());
    }
}

#[test]
fn writes_happen_under_manual_calculation() {
    let launcher = passthrough_launcher();
    let mut component =
        ExcelComponent::with_launcher(passthrough_config(), launcher.clone()).unwrap();

    let mut outputs = HashMap::new();
    component.compute(&inputs_of(2.5), &mut outputs).unwrap();

    let events = launcher.state().events();
    let manual = events
        .iter()
        .position(|e| *e == Event::Calc(CalcMode::Manual))
        .unwrap();
    let write = events
        .iter()
        .position(|e| *e == Event::Write("a".to_string()))
        .unwrap();
    let automatic = events
        .iter()
        .position(|e| *e == Event::Calc(CalcMode::Automatic))
        .unwrap();
    let recalc = events.iter().position(|e| *e == Event::Recalc).unwrap();
    let read = events
        .iter()
        .position(|e| *e == Event::Read("b".to_string()))
        .unwrap();

    assert!(manual < write, "writes must run under manual calculation");
    assert!(write < automatic && automatic < recalc, "recalculation follows the writes");
    assert!(recalc < read, "reads must see the recalculated state");
}

#[test]
fn stages_run_in_pre_main_post_order() {
    let launcher = FakeLauncher::new()
        .with_script("MarkB", MacroScript::AppendMarker("B"))
        .with_script("MarkC", MacroScript::AppendMarker("C"))
        .with_script("MarkA", MacroScript::AppendMarker("A"));
    let mut config = ExcelComponentConfig::new("tests/data/markers.xlsm");
    config.pre_macros = vec!["MarkA".to_string()];
    config.main_macros = vec!["MarkB".to_string()];
    config.post_macros = vec!["MarkC".to_string()];

    let mut component = ExcelComponent::with_launcher(config, launcher.clone()).unwrap();
    let mut outputs = HashMap::new();
    component.compute(&HashMap::new(), &mut outputs).unwrap();

    assert_eq!(launcher.state().markers(), vec!["A", "B", "C"]);
}

#[test]
fn macro_failure_is_classified_with_its_stage() {
    for stage in ["pre", "main", "post"] {
        let launcher = FakeLauncher::new().with_script(
            "FudgeUp",
            MacroScript::Fail {
                code: 5,
                description: "boom".to_string(),
            },
        );
        let mut config = ExcelComponentConfig::new("tests/data/fudge_up.xlsm");
        let fudge = vec!["FudgeUp".to_string()];
        match stage {
            "pre" => config.pre_macros = fudge,
            "main" => config.main_macros = fudge,
            _ => config.post_macros = fudge,
        }

        let mut component = ExcelComponent::with_launcher(config, launcher).unwrap();
        let mut outputs = HashMap::new();
        let err = component
            .compute(&HashMap::new(), &mut outputs)
            .unwrap_err();

        match err {
            BridgeError::MacroFailed {
                ref name,
                stage: got,
                ref error,
            } => {
                assert_eq!(name, "FudgeUp");
                assert_eq!(got.as_str(), stage);
                assert_eq!(error.code, 5);
                assert_eq!(error.description, "boom");
            }
            other => panic!("expected macro failure, got {other}"),
        }
        assert!(err.to_string().contains(&format!("\"{stage}\" stage")));
    }
}

#[test]
fn workbook_is_closed_on_success_and_on_macro_failure() {
    // Success path
    let launcher = passthrough_launcher();
    let mut component =
        ExcelComponent::with_launcher(passthrough_config(), launcher.clone()).unwrap();
    let mut outputs = HashMap::new();
    component.compute(&inputs_of(1.0), &mut outputs).unwrap();
    assert!(launcher.state().events().contains(&Event::Close));

    // Macro failure path
    let launcher = FakeLauncher::new().with_script(
        "FudgeUp",
        MacroScript::Fail {
            code: 5,
            description: "boom".to_string(),
        },
    );
    let mut config = ExcelComponentConfig::new("tests/data/fudge_up.xlsm");
    config.main_macros = vec!["FudgeUp".to_string()];
    let mut component = ExcelComponent::with_launcher(config, launcher.clone()).unwrap();
    let mut outputs = HashMap::new();
    component
        .compute(&HashMap::new(), &mut outputs)
        .unwrap_err();
    assert!(launcher.state().events().contains(&Event::Close));
}

#[test]
fn timeout_wins_over_process_death_errors() {
    let launcher = passthrough_launcher().with_script("Stall", MacroScript::SleepMs(5_000));
    let mut config = passthrough_config();
    config.main_macros = vec!["Stall".to_string()];
    config.timeout = Duration::from_millis(250);

    let mut component = ExcelComponent::with_launcher(config, launcher.clone()).unwrap();
    let mut outputs = HashMap::new();

    let start = Instant::now();
    let err = component.compute(&inputs_of(1.0), &mut outputs).unwrap_err();
    let elapsed = start.elapsed();

    // The macro's own failure (connection lost after the kill) must never
    // surface; the timeout classification always wins.
    match err {
        BridgeError::Timeout { limit } => assert_eq!(limit, Duration::from_millis(250)),
        other => panic!("expected timeout, got {other}"),
    }
    assert!(launcher.state().is_killed());
    assert!(elapsed >= Duration::from_millis(250));
    assert!(elapsed < Duration::from_secs(3), "kill must unblock the body");
}

#[test]
fn next_invocation_recovers_after_a_timeout() {
    let launcher = passthrough_launcher().with_script("Stall", MacroScript::SleepOnceMs(5_000));
    let mut config = passthrough_config();
    config.main_macros = vec!["Stall".to_string()];
    config.timeout = Duration::from_millis(250);

    let mut component = ExcelComponent::with_launcher(config, launcher.clone()).unwrap();
    let mut outputs = HashMap::new();

    let err = component.compute(&inputs_of(1.0), &mut outputs).unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { .. }));
    assert_eq!(component.app_pid(), None);
    assert_eq!(launcher.launch_count(), 1);

    // The killed process must not corrupt the next invocation: a fresh
    // application starts transparently and produces correct outputs.
    component.compute(&inputs_of(7.25), &mut outputs).unwrap();
    assert_eq!(outputs["out"], vec![7.25]);
    assert_eq!(launcher.launch_count(), 2);
    assert!(component.app_pid().is_some());

    component.cleanup();
}

#[test]
fn empty_macro_set_never_touches_the_macro_project() {
    let launcher = passthrough_launcher();
    let mut component =
        ExcelComponent::with_launcher(passthrough_config(), launcher.clone()).unwrap();

    let mut outputs = HashMap::new();
    component.compute(&inputs_of(3.0), &mut outputs).unwrap();

    let state = launcher.state();
    assert!(state.modules.lock().unwrap().is_empty());
    assert!(!state
        .events()
        .iter()
        .any(|e| matches!(e, Event::AddModule(_))));
}

#[test]
fn one_module_carries_wrappers_for_the_distinct_macro_union() {
    let launcher = FakeLauncher::new()
        .with_script("Shared", MacroScript::Ok)
        .with_script("PostOnly", MacroScript::Ok);
    let mut config = ExcelComponentConfig::new("tests/data/macros.xlsm");
    config.pre_macros = vec!["Shared".to_string()];
    config.main_macros = vec!["Shared".to_string()];
    config.post_macros = vec!["PostOnly".to_string()];

    let mut component = ExcelComponent::with_launcher(config, launcher.clone()).unwrap();
    let mut outputs = HashMap::new();
    component.compute(&HashMap::new(), &mut outputs).unwrap();

    let state = launcher.state();
    let modules = state.modules.lock().unwrap();
    assert_eq!(modules.len(), 1);
    let (name, code) = &modules[0];
    assert_eq!(name, WRAPPER_MODULE_NAME);
    assert!(code.contains(&xlbridge::wrapper_name("Shared")));
    assert!(code.contains(&xlbridge::wrapper_name("PostOnly")));
    // "Shared" appears in two stages but is wrapped once.
    assert_eq!(code.matches("Function wrapped_").count(), 2);
}

#[test]
fn cleanup_swallows_quit_failure_and_still_kills() {
    let mut launcher = passthrough_launcher();
    launcher.quit_fails = true;
    let mut component =
        ExcelComponent::with_launcher(passthrough_config(), launcher.clone()).unwrap();

    component.setup().unwrap();
    assert!(component.app_pid().is_some());

    component.cleanup();
    let state = launcher.state();
    assert!(state.events().contains(&Event::Quit));
    assert!(state.is_killed());
    assert_eq!(component.app_pid(), None);

    // cleanup after teardown is a no-op
    component.cleanup();
}

#[test]
fn missing_input_value_is_reported_by_name() {
    let launcher = passthrough_launcher();
    let mut component =
        ExcelComponent::with_launcher(passthrough_config(), launcher).unwrap();

    let mut outputs = HashMap::new();
    let err = component
        .compute(&HashMap::new(), &mut outputs)
        .unwrap_err();
    match err {
        BridgeError::MissingInput { name } => assert_eq!(name, "in"),
        other => panic!("expected missing input, got {other}"),
    }
}

#[test]
fn spreadsheet_error_values_fail_the_read() {
    let mut launcher = passthrough_launcher();
    launcher.initial_ranges.insert(
        "b".to_string(),
        vec![vec![CellValue::Error(CellError {
            code: "#DIV/0!".to_string(),
        })]],
    );
    // No formula overwrite for "b": drop the passthrough wiring.
    launcher.formulas.clear();

    let mut component =
        ExcelComponent::with_launcher(passthrough_config(), launcher).unwrap();
    let mut outputs = HashMap::new();
    let err = component.compute(&inputs_of(1.0), &mut outputs).unwrap_err();

    match err {
        BridgeError::CellError { name, code, .. } => {
            assert_eq!(name, "out");
            assert_eq!(code, "#DIV/0!");
        }
        other => panic!("expected cell error, got {other}"),
    }
}

#[test]
fn array_variables_round_trip_through_one_bulk_write() {
    let launcher = FakeLauncher::new()
        .with_range("grid_in")
        .with_range("grid_out")
        .with_formula("grid_in", "grid_out");
    let mut config = ExcelComponentConfig::new("tests/data/arrays.xlsx");
    config.inputs = vec![VarMap::new("m", "grid_in").with_shape(2, 3)];
    config.outputs = vec![VarMap::new("m_out", "grid_out").with_shape(2, 3)];

    let mut component = ExcelComponent::with_launcher(config, launcher.clone()).unwrap();
    let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let inputs = HashMap::from([("m".to_string(), values.clone())]);
    let mut outputs = HashMap::new();
    component.compute(&inputs, &mut outputs).unwrap();

    assert_eq!(outputs["m_out"], values);

    // Exactly one bulk write for the whole array, never cell-by-cell.
    let writes = launcher
        .state()
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Write(_)))
        .count();
    assert_eq!(writes, 1);
}
