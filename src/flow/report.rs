//! Text listings printed by `build --info`, `build --stageinfo`, the
//! pre-build status summary and `showd`.
use super::config::{FlowConfig, ProjectFlowConfig};
use super::resolver::Plan;
use super::stage::Stage;
use crate::cache::FingerprintCache;
use crate::module::{IoName, Qualifier};
use std::fmt::Write;

fn guarantee(qualifier: Qualifier) -> &'static str {
    match qualifier {
        Qualifier::Required => "guaranteed",
        Qualifier::Maybe => "not guaranteed",
        Qualifier::Demand => "on-demand",
    }
}

/// Every product of the flow with its stage, guarantee and description.
pub fn product_listing(flow: &FlowConfig) -> String {
    let products: Vec<(&Stage, &IoName)> = flow
        .stages
        .values()
        .flat_map(|stage| stage.produces().iter().map(move |product| (stage, product)))
        .collect();
    let width = products
        .iter()
        .map(|(_, product)| product.name.len())
        .max()
        .unwrap_or(0);

    let mut out = String::from("Platform dependencies/targets:\n");
    for (stage, product) in products {
        let _ = writeln!(
            out,
            "    {:<width$}  stage: `{}`, {}: {}",
            product.name,
            stage.name,
            guarantee(product.qualifier),
            stage.meta(&product.name)
        );
    }
    out
}

fn group(out: &mut String, title: &str, names: &[IoName], label: fn(Qualifier) -> &'static str) {
    let _ = writeln!(out, "  {title}:");
    if names.is_empty() {
        let _ = writeln!(out, "    (none)");
        return;
    }
    for qualifier in [Qualifier::Required, Qualifier::Maybe, Qualifier::Demand] {
        let matching: Vec<&str> = names
            .iter()
            .filter(|name| name.qualifier == qualifier)
            .map(|name| name.name.as_str())
            .collect();
        if !matching.is_empty() {
            let _ = writeln!(out, "    {}: {}", label(qualifier), matching.join(", "));
        }
    }
}

fn input_label(qualifier: Qualifier) -> &'static str {
    match qualifier {
        Qualifier::Required => "required",
        Qualifier::Maybe | Qualifier::Demand => "optional",
    }
}

/// A stage's inputs, values and outputs grouped by qualifier, followed by
/// the values set for that stage alone.
pub fn stage_listing(stage: &Stage) -> String {
    let mut out = format!("Stage `{}` (module `{}`):\n", stage.name, stage.module_ref);
    group(&mut out, "Inputs", stage.takes(), input_label);
    group(&mut out, "Values", stage.values(), input_label);
    group(&mut out, "Outputs", stage.produces(), guarantee);
    if !stage.value_overrides.is_empty() {
        let _ = writeln!(out, "  Overrides:");
        for (name, value) in &stage.value_overrides {
            let _ = writeln!(out, "    {name} = {value}");
        }
    }
    out
}

/// Status marker and path of every dependency in `plan`.
pub fn status_listing(plan: &Plan, cache: Option<&FingerprintCache>) -> String {
    let mut out = String::from("Project status:\n");
    for dep in plan.listed_deps() {
        let status = plan.dep_status(dep, cache);
        let path = plan
            .dep_paths
            .get(dep)
            .map(ToString::to_string)
            .unwrap_or_else(|| "<missing>".to_string());
        let _ = writeln!(out, "    {} {dep}: {path}", status.marker());
    }
    out
}

/// Raw dependency bindings of the project for `part`, and optionally one
/// stage's value overrides.
pub fn dependency_listing(project: &ProjectFlowConfig, part: &str, stage: Option<&str>) -> String {
    let part_config = project.part(part);
    let mut out = String::new();
    let mut names: Vec<&String> = project
        .dependencies
        .keys()
        .chain(part_config.dependencies.keys())
        .collect();
    names.sort();
    names.dedup();
    for name in names {
        match part_config.dependencies.get(name) {
            Some(value) => {
                let _ = writeln!(out, "{name} = {value}  [part `{part}`]");
            }
            None => {
                if let Some(value) = project.dependencies.get(name) {
                    let _ = writeln!(out, "{name} = {value}");
                }
            }
        }
    }
    if let Some(stage) = stage {
        let _ = writeln!(out, "Value overrides of stage `{stage}`:");
        match part_config.stages.get(stage) {
            Some(overrides) if !overrides.values.is_empty() => {
                for (name, value) in &overrides.values {
                    let _ = writeln!(out, "    {name} = {value}");
                }
            }
            _ => {
                let _ = writeln!(out, "    (none)");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::config::{FlowSources, PlatformFlow};
    use crate::module::{ModuleRegistry, Roots};
    use crate::overrides::CliOverlay;
    use crate::value::ValueMap;

    fn flow() -> FlowConfig {
        let platform = PlatformFlow::from_yaml(
            "stages:\n  pack:\n    module: common:pack\n    values: {vpr_options: --seed 3}\n  build_dirs:\n    module: common:mkdirs\n    params: {build_dir: build}\n",
        )
        .expect("yaml");
        FlowConfig::compose(
            FlowSources {
                platform: "test",
                part: "part",
                flow: &platform,
                project: &ProjectFlowConfig::default(),
                overlay: &CliOverlay::default(),
                builtins: ValueMap::new(),
                roots: Roots::default(),
            },
            &ModuleRegistry::builtin(),
        )
        .expect("compose")
    }

    #[test]
    fn product_listing_names_guarantees() {
        let listing = product_listing(&flow());
        assert!(listing.contains("stage: `pack`, guaranteed: Packed netlist"));
        assert!(listing.contains("stage: `pack`, on-demand: VPR log from packing"));
        assert!(listing.contains("stage: `build_dirs`, guaranteed: <no description>"));
    }

    #[test]
    fn stage_listing_groups_by_qualifier() {
        let flow = flow();
        let listing = stage_listing(flow.stage("pack").expect("pack"));
        assert!(listing.starts_with("Stage `pack` (module `common:pack`):"));
        assert!(listing.contains("    required: eblif\n    optional: sdc\n"));
        assert!(listing.contains("    on-demand: pack_log\n"));
        assert!(listing.ends_with("  Overrides:\n    vpr_options = --seed 3\n"));

        let listing = stage_listing(flow.stage("build_dirs").expect("build_dirs"));
        assert!(!listing.contains("Overrides"));
    }

    #[test]
    fn dependency_listing_marks_part_overrides() {
        let project: ProjectFlowConfig = serde_json::from_str(
            r#"{
                "dependencies": {"sources": ["a.v"], "xdc": "top.xdc"},
                "p1": {
                    "dependencies": {"sources": ["b.v"]},
                    "synth": {"values": {"top": "counter"}}
                }
            }"#,
        )
        .expect("json");
        let listing = dependency_listing(&project, "p1", Some("synth"));
        assert_eq!(
            listing,
            "sources = [b.v]  [part `p1`]\nxdc = top.xdc\nValue overrides of stage `synth`:\n    top = counter\n"
        );
    }
}
