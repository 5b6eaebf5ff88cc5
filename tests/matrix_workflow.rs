//! End-to-end matrix workflows over a scripted engine and the built-in one.

use std::collections::BTreeMap;

use cellensemble::{
    profiles_from_json_str, BooleanNetwork, CellLineProfile, EngineError, EnsembleConfig,
    EnsembleError, ExperimentMatrix, GeneMappings, InitialState, LifecycleState, Mutation,
    NetworkModel, RunControl, RunOptions, SimulationResult, TextRenderer, TransitionRates,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine with a fixed answer per mutation state of `n1`; fails when `Doom` is ON.
#[derive(Clone, Debug, Default)]
struct ScriptedModel {
    mutations: BTreeMap<String, Mutation>,
    rates: BTreeMap<String, TransitionRates>,
    initial: BTreeMap<String, InitialState>,
}

impl ScriptedModel {
    const NODES: [&'static str; 3] = ["n1", "n2", "Doom"];

    fn check(node: &str) -> Result<(), EngineError> {
        if Self::NODES.contains(&node) {
            Ok(())
        } else {
            Err(EngineError::UnknownNode(node.to_string()))
        }
    }
}

impl NetworkModel for ScriptedModel {
    fn node_names(&self) -> Vec<String> {
        Self::NODES.iter().map(|n| n.to_string()).collect()
    }

    fn mutate(&mut self, node: &str, mutation: Mutation) -> Result<(), EngineError> {
        Self::check(node)?;
        self.mutations.insert(node.to_string(), mutation);
        Ok(())
    }

    fn set_initial_state(&mut self, node: &str, state: InitialState) -> Result<(), EngineError> {
        Self::check(node)?;
        self.initial.insert(node.to_string(), state);
        Ok(())
    }

    fn set_transition_rates(&mut self, node: &str, rates: TransitionRates) -> Result<(), EngineError> {
        Self::check(node)?;
        self.rates.insert(node.to_string(), rates);
        Ok(())
    }

    fn run(&self, control: &RunControl) -> Result<SimulationResult, EngineError> {
        control.check()?;
        if self.mutations.get("Doom") == Some(&Mutation::On) {
            return Err(EngineError::Failed("engine crashed".into()));
        }

        let mut dist = BTreeMap::new();
        if self.mutations.get("n1") == Some(&Mutation::On) {
            dist.insert("ApoptosisOn".to_string(), 0.3);
            dist.insert("ProlifOn".to_string(), 0.5);
            dist.insert("Other".to_string(), 0.2);
        } else {
            dist.insert("Other".to_string(), 1.0);
        }
        SimulationResult::new(dist).map_err(|e| EngineError::Failed(e.to_string()))
    }
}

fn profiles() -> BTreeMap<String, CellLineProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "A".to_string(),
        CellLineProfile::new("A").with_rate("R2", 4.0),
    );
    profiles.insert(
        "B".to_string(),
        CellLineProfile::new("B").with_mutation("DOOM", Mutation::Off),
    );
    profiles.insert(
        "Broken".to_string(),
        CellLineProfile::new("Broken").with_mutation("DOOM", Mutation::On),
    );
    profiles
}

fn mappings() -> GeneMappings {
    GeneMappings::default()
        .map_genes("Doom", &["DOOM"])
        .map_rate_genes("n2", &["R2"])
}

fn scripted_matrix(config: EnsembleConfig) -> ExperimentMatrix<ScriptedModel> {
    ExperimentMatrix::new(ScriptedModel::default(), profiles(), mappings(), config).unwrap()
}

fn quiet() -> RunOptions {
    RunOptions {
        quiet: true,
        ..Default::default()
    }
}

#[test]
fn test_batch_collects_failures() {
    init_tracing();
    let mut matrix = scripted_matrix(EnsembleConfig::default());

    let report = matrix
        .run_simulations("all", "base", RunOptions::default())
        .unwrap();
    assert_eq!(report.completed.len(), 2);
    assert_eq!(report.failures.len(), 1);

    let failure = &report.failures[0];
    assert_eq!(failure.cell_line, "Broken");
    assert!(matches!(
        failure.error,
        EnsembleError::SimulationEngine(EngineError::Failed(_))
    ));

    let broken = matrix.entry("base", "Broken").unwrap();
    assert_eq!(broken.status(), LifecycleState::Personalized);
    assert!(broken.result().is_none());
    assert_eq!(
        matrix.entry("base", "A").unwrap().status(),
        LifecycleState::Simulated
    );
}

#[test]
fn test_condition_survival_rates() {
    init_tracing();
    let mut matrix = scripted_matrix(EnsembleConfig::default());
    matrix.add_condition("cond1", [("n1", Mutation::On)]).unwrap();
    matrix.run_simulations(["A", "B"], "all", quiet()).unwrap();

    let report = matrix.compare_survival(["A", "B"], "all").unwrap();
    assert!(report.is_complete());
    assert_eq!(
        report.table.labels(),
        vec!["base_A", "base_B", "cond1_A", "cond1_B"]
    );

    let treated = report.table.get("cond1_A").unwrap();
    assert!((treated.survival_rate - 0.7).abs() < 1e-9);
    assert!((treated.proliferation_rate - 0.5).abs() < 1e-9);

    let untreated = report.table.get("base_B").unwrap();
    assert!((untreated.survival_rate - 1.0).abs() < 1e-9);
    assert_eq!(untreated.proliferation_rate, 0.0);
}

#[test]
fn test_rate_personalization_reaches_model() {
    let matrix = scripted_matrix(EnsembleConfig::default());
    let model = matrix.entry("base", "A").unwrap().model().unwrap();
    assert_eq!(model.rates["n2"], TransitionRates::new(4.0, 0.25));
    assert!(matrix.baseline().rates.is_empty());
}

#[test]
fn test_rebase_preserves_condition_mutations() {
    let mut matrix = scripted_matrix(EnsembleConfig::default());
    matrix.add_condition("cond1", [("n1", Mutation::On)]).unwrap();
    matrix.run_simulations("A", "cond1", quiet()).unwrap();

    matrix.rebase(None).unwrap();
    assert_eq!(matrix.revision(), 0);
    let entry = matrix.entry("cond1", "A").unwrap();
    assert_eq!(entry.status(), LifecycleState::Personalized);
    assert_eq!(
        entry.model().unwrap().mutations.get("n1"),
        Some(&Mutation::On)
    );
}

#[test]
fn test_parallel_matches_sequential() {
    let mut sequential = scripted_matrix(EnsembleConfig::default());
    let mut parallel = scripted_matrix(EnsembleConfig {
        parallel: true,
        ..Default::default()
    });
    for matrix in [&mut sequential, &mut parallel] {
        matrix.add_condition("cond1", [("n1", Mutation::On)]).unwrap();
    }

    let seq = sequential.run_simulations("all", "all", quiet()).unwrap();
    let par = parallel.run_simulations("all", "all", quiet()).unwrap();
    assert_eq!(seq.completed, par.completed);
    assert_eq!(par.failures.len(), 2);

    let a = sequential.compare_survival("all", "all").unwrap();
    let b = parallel.compare_survival("all", "all").unwrap();
    assert_eq!(a.table, b.table);
}

#[test]
fn test_cancelled_batch() {
    let mut matrix = scripted_matrix(EnsembleConfig::default());
    let handle = matrix.cancel_handle();
    handle.cancel();

    let report = matrix.run_simulations("all", "all", quiet()).unwrap();
    assert!(report.completed.is_empty());
    assert!(report.failures.iter().all(|f| matches!(
        f.error,
        EnsembleError::SimulationEngine(EngineError::Cancelled)
    )));

    handle.reset();
    let report = matrix.run_simulations("A", "base", quiet()).unwrap();
    assert!(report.is_complete());
}

#[test]
fn test_strict_gene_keys_fail_construction() {
    let config = EnsembleConfig {
        strict_gene_keys: true,
        ..Default::default()
    };
    let result = ExperimentMatrix::new(ScriptedModel::default(), profiles(), mappings(), config);
    assert!(matches!(result, Err(EnsembleError::GeneKeyMismatch { .. })));
}

#[test]
fn test_plot_reports_unsimulated() {
    let mut matrix = scripted_matrix(EnsembleConfig::default());
    matrix.run_simulations("A", "base", quiet()).unwrap();

    let mut renderer = TextRenderer::new(Vec::new());
    let report = matrix.plot_piechart(&mut renderer, "all", "base").unwrap();
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].title, "A | base");
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, EnsembleError::MissingResult { .. })));
}

#[test]
fn test_json_workflow_with_boolean_network() {
    init_tracing();
    let model = BooleanNetwork::from_json_str(
        r#"{
            "name": "fate",
            "nodes": [
                {"name": "EGFR", "initial_state": 0.5},
                {"name": "Prolif", "logic": "EGFR", "initial_state": 0.0},
                {"name": "Apoptosis", "logic": "!EGFR", "initial_state": 0.0}
            ],
            "simulation": {"max_time": 30.0, "sample_count": 100, "seed": 3}
        }"#,
    )
    .unwrap();
    let profiles = profiles_from_json_str(
        r#"{
            "Driven": {"mutations": {"EGFR_gene": "ON"}},
            "Silenced": {"mutations": {"EGFR_gene": "ON"}, "initial_states": {"EGFR": 0.0}}
        }"#,
    )
    .unwrap();
    let mappings = GeneMappings::from_json_str(r#"{"gene_nodes": {"EGFR": ["EGFR_gene"]}}"#).unwrap();

    let mut matrix =
        ExperimentMatrix::new(model, profiles, mappings, EnsembleConfig::default()).unwrap();
    matrix
        .add_condition("EGFRi", [("EGFR", Mutation::Off)])
        .unwrap();
    let report = matrix.run_simulations("all", "all", quiet()).unwrap();
    assert!(report.is_complete());

    let survival = matrix.compare_survival("all", "all").unwrap();
    let driven = survival.table.get("base_Driven").unwrap();
    assert!((driven.survival_rate - 1.0).abs() < 1e-9);
    assert!(driven.proliferation_rate > 0.9);

    let inhibited = survival.table.get("EGFRi_Driven").unwrap();
    assert!(inhibited.survival_rate < 0.1);

    let mut out = Vec::new();
    survival.table.write_csv(&mut out).unwrap();
    let csv = String::from_utf8(out).unwrap();
    assert!(csv.starts_with("label,proliferation_rates,survival_rates\n"));
    assert_eq!(csv.lines().count(), 5);
}
