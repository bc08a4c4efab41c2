use super::*;
use crate::flow::config::{FlowSources, PlatformFlow, ProjectFlowConfig};
use crate::module::{Module, ModuleArgs, ModuleIo, ModuleRegistry, Progress, Roots};
use crate::overrides::CliOverlay;

/// Declares the takes and products listed in its params; maps every product
/// under `build/`.
struct Node {
    io: ModuleIo,
}

fn names(params: &Value, key: &str) -> Result<Vec<IoName>> {
    params
        .as_map()
        .and_then(|map| map.get(key))
        .map(|list| list.strings().into_iter().map(IoName::parse).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn node(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.takes = names(args.params, "takes")?;
    io.produces = names(args.params, "produces")?;
    Ok(Box::new(Node { io }))
}

impl Module for Node {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, _ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        Ok(self
            .io
            .produces
            .iter()
            .map(|product| (product.name.clone(), Value::from(format!("build/{}", product.name))))
            .collect())
    }

    fn execute(&self, _ctx: &ModuleContext, _progress: &mut Progress) -> Result<()> {
        Ok(())
    }
}

/// Flow whose stages are `name: (takes, produces)`, with `source` bound.
fn flow(stages: &[(&str, &str, &str)]) -> Result<FlowConfig> {
    let mut yaml = String::from("stages:\n");
    for (name, takes, produces) in stages {
        yaml.push_str(&format!(
            "  {name}:\n    module: test:node\n    params: {{takes: [{takes}], produces: [{produces}]}}\n"
        ));
    }
    let platform = PlatformFlow::from_yaml(&yaml).expect("platform yaml");
    let mut project = ProjectFlowConfig::default();
    project
        .dependencies
        .insert("source".to_string(), Value::from("/src/top.v"));
    let mut registry = ModuleRegistry::new();
    registry.register("test", "node", node);
    FlowConfig::compose(
        FlowSources {
            platform: "test",
            part: "part",
            flow: &platform,
            project: &project,
            overlay: &CliOverlay::default(),
            builtins: ValueMap::new(),
            roots: Roots::default(),
        },
        &registry,
    )
}

fn stage_order(plan: &Plan) -> Vec<&str> {
    plan.steps.iter().map(|step| step.stage.as_str()).collect()
}

#[test]
fn product_of_two_stages_is_rejected() {
    let flow = flow(&[("left", "source", "net"), ("right", "source", "net")]).expect("compose");
    let err = plan(&flow, "net", None).expect_err("ambiguous producer");
    assert_eq!(
        err.to_string(),
        "dependency `net` is produced by both stage `left` and stage `right`"
    );
}

#[test]
fn missing_input_names_the_stage_that_needs_it() {
    let flow = flow(&[("place", "source, constraints", "placement")]).expect("compose");
    let err = plan(&flow, "placement", None).expect_err("missing input");
    assert_eq!(
        err.to_string(),
        "dependency `constraints` is required by stage `place` but is neither produced nor provided"
    );
}

#[test]
fn unknown_target_is_an_error() {
    let flow = flow(&[("synth", "source", "net")]).expect("compose");
    let err = plan(&flow, "bitstream", None).expect_err("unknown target");
    assert!(err.to_string().contains("target `bitstream`"));
}

#[test]
fn optional_input_without_producer_is_listed_missing() {
    let flow = flow(&[("synth", "source, \"hints?\"", "net")]).expect("compose");
    let planned = plan(&flow, "net", None).expect("plan");
    assert_eq!(stage_order(&planned), vec!["synth"]);
    assert!(planned.missing.contains("hints"));
    assert_eq!(planned.dep_status("hints", None), DepStatus::Missing);
    assert_eq!(planned.dep_status("net", None), DepStatus::Scheduled);
}

#[test]
fn stage_cycle_is_reported_in_visiting_order() {
    let flow = flow(&[("a", "y", "x"), ("b", "x", "y")]).expect("compose");
    let err = plan(&flow, "x", None).expect_err("cycle");
    assert_eq!(err.to_string(), "dependency cycle between stages: a -> b -> a");
}

#[test]
fn diamond_is_planned_once_per_stage_in_post_order() {
    let flow = flow(&[
        ("join", "left_net, right_net", "bitstream"),
        ("left", "source", "left_net"),
        ("right", "source", "right_net"),
        ("unused", "source", "other"),
    ])
    .expect("compose");
    let planned = plan(&flow, "bitstream", None).expect("plan");
    assert_eq!(stage_order(&planned), vec!["left", "right", "join"]);
    assert!(planned.steps.iter().all(|step| step.required));

    let join = &planned.steps[2];
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(
        join.inputs.takes["left_net"],
        Value::from(cwd.join("build/left_net").to_string_lossy().into_owned())
    );
    assert_eq!(
        planned.target_path(),
        Some(&Value::from(cwd.join("build/bitstream").to_string_lossy().into_owned()))
    );
    assert_eq!(planned.rebuilds["left_net"], 1);
    assert!(!planned.dep_paths.contains_key("other"));
}
