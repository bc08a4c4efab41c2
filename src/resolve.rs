//! `${name}` interpolation over configuration values.
//!
//! Configuration layers are stacked unresolved and settled once, so a
//! reference picks up the topmost binding of its name. Final resolution
//! drops anything still unknown.
use crate::value::{Value, ValueMap};
use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

fn reference_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^${}]*)\}").expect("valid reference pattern"))
}

/// Variable name referenced by a `${...}` body, with `?` markers removed.
fn reference_name(body: &str) -> String {
    body.replace('?', "")
}

/// Names referenced by `${...}` tokens in `text`, in order of appearance.
pub fn references(text: &str) -> Vec<String> {
    reference_regex()
        .captures_iter(text)
        .map(|caps| reference_name(&caps[1]))
        .collect()
}

/// Mapping of variable names to values used for `${...}` substitution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionEnv {
    values: ValueMap,
}

impl ResolutionEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment by binding `values` in key order.
    pub fn with_values(values: &ValueMap) -> Self {
        let mut env = Self::new();
        env.add_values(values);
        env
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    /// Resolve `value` against the current bindings and insert it.
    pub fn bind(&mut self, name: impl Into<String>, value: &Value) {
        let resolved = self.resolve(value);
        self.values.insert(name.into(), resolved);
    }

    /// Insert a binding as-is, without resolving it first.
    pub fn bind_raw(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn add_values(&mut self, values: &ValueMap) {
        for (name, value) in values {
            self.bind(name.clone(), value);
        }
    }

    /// Add a configuration layer on top of the current bindings.
    pub fn layer(&mut self, values: &ValueMap) -> Result<()> {
        self.layers([values])
    }

    /// Stack configuration layers in order, then settle once.
    ///
    /// Entries stay unresolved until every layer is in, so a reference picks
    /// up the topmost binding of its name. An entry that mentions its own name
    /// extends the binding it replaces.
    pub fn layers<'a>(&mut self, layers: impl IntoIterator<Item = &'a ValueMap>) -> Result<()> {
        for values in layers {
            for (name, value) in values {
                let value = match self.values.get(name) {
                    Some(previous) if mentions(value, name) => {
                        let mut below = ResolutionEnv::new();
                        below.bind_raw(name.clone(), previous.clone());
                        below.resolve(value)
                    }
                    _ => value.clone(),
                };
                self.values.insert(name.clone(), value);
            }
        }
        self.settle()
    }

    /// Substitute known variables; unknown ones are left for later.
    pub fn resolve(&self, value: &Value) -> Value {
        value.map_strings(&mut |text| self.resolve_text(text, false))
    }

    /// Substitute known variables and replace unknown ones with nothing.
    pub fn resolve_final(&self, value: &Value) -> Value {
        value.map_strings(&mut |text| self.resolve_text(text, true))
    }

    /// Resolve a single string. Returns a list when a list binding fans out.
    pub fn resolve_text(&self, text: &str, final_pass: bool) -> Value {
        let matches: Vec<_> = reference_regex().captures_iter(text).collect();
        if matches.is_empty() {
            return Value::from(text);
        }
        let mut pieces = vec![text.to_string()];
        let mut fanned_out = false;
        // Right to left keeps the spans of earlier matches valid in every piece.
        for caps in matches.iter().rev() {
            let Some(span) = caps.get(0) else {
                continue;
            };
            let name = reference_name(&caps[1]);
            let replacement: Vec<String> = match self.values.get(&name) {
                None | Some(Value::Null) => {
                    if final_pass {
                        vec![String::new()]
                    } else {
                        continue;
                    }
                }
                Some(Value::List(items)) => {
                    fanned_out = true;
                    items.iter().filter_map(Value::scalar_text).collect()
                }
                Some(Value::Map(_)) => continue,
                Some(scalar) => scalar.scalar_text().into_iter().collect(),
            };
            pieces = pieces
                .iter()
                .flat_map(|piece| {
                    replacement.iter().map(move |item| {
                        format!("{}{}{}", &piece[..span.start()], item, &piece[span.end()..])
                    })
                })
                .collect();
        }
        if fanned_out {
            Value::from(pieces)
        } else {
            Value::from(pieces.into_iter().next().unwrap_or_default())
        }
    }

    /// Re-resolve bindings that still reference other bound names.
    ///
    /// Bindings are revisited in dependency order so a value defined in an
    /// earlier layer can use one defined later. A reference cycle is an error.
    pub fn settle(&mut self) -> Result<()> {
        let graph: BTreeMap<String, BTreeSet<String>> = self
            .values
            .iter()
            .map(|(name, value)| {
                let deps = value
                    .strings()
                    .into_iter()
                    .flat_map(references)
                    .filter(|dep| self.values.contains_key(dep))
                    .collect();
                (name.clone(), deps)
            })
            .filter(|(_, deps): &(String, BTreeSet<String>)| !deps.is_empty())
            .collect();
        if graph.is_empty() {
            return Ok(());
        }

        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        for name in graph.keys() {
            let mut stack = Vec::new();
            visit_reference(name, &graph, &mut done, &mut stack, &mut order)?;
        }
        for name in order {
            if let Some(value) = self.values.get(&name).cloned() {
                let resolved = self.resolve(&value);
                self.values.insert(name, resolved);
            }
        }
        Ok(())
    }

    /// `${...}` tokens still present anywhere in `value`.
    pub fn unresolved_names(value: &Value) -> Vec<String> {
        value.strings().into_iter().flat_map(references).collect()
    }
}

fn mentions(value: &Value, name: &str) -> bool {
    value
        .strings()
        .into_iter()
        .any(|text| references(text).iter().any(|dep| dep == name))
}

fn visit_reference(
    name: &str,
    graph: &BTreeMap<String, BTreeSet<String>>,
    done: &mut BTreeSet<String>,
    stack: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    if done.contains(name) {
        return Ok(());
    }
    if let Some(pos) = stack.iter().position(|entry| entry == name) {
        let mut cycle = stack[pos..].to_vec();
        cycle.push(name.to_string());
        return Err(anyhow!(
            "circular variable reference: {}",
            cycle.join(" -> ")
        ));
    }
    stack.push(name.to_string());
    if let Some(deps) = graph.get(name) {
        for dep in deps {
            visit_reference(dep, graph, done, stack, order)?;
        }
    }
    stack.pop();
    done.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, Value)]) -> ResolutionEnv {
        let mut env = ResolutionEnv::new();
        for (name, value) in pairs {
            env.bind(*name, value);
        }
        env
    }

    #[test]
    fn substitutes_known_and_keeps_unknown() {
        let env = env(&[("build", Value::from("build"))]);
        assert_eq!(
            env.resolve(&Value::from("${build}/${top}.eblif")),
            Value::from("build/${top}.eblif")
        );
        assert_eq!(
            env.resolve_final(&Value::from("${build}/${top}.eblif")),
            Value::from("build/.eblif")
        );
    }

    #[test]
    fn question_mark_is_ignored_in_lookup() {
        let env = env(&[("foo", Value::from("x"))]);
        assert_eq!(env.resolve(&Value::from("${foo?}")), env.resolve(&Value::from("${foo}")));
    }

    #[test]
    fn list_binding_fans_out_containing_string() {
        let env = env(&[
            ("build", Value::from("build")),
            ("files", Value::from(vec!["a.v".to_string(), "b.v".to_string()])),
        ]);
        assert_eq!(
            env.resolve(&Value::from("${build}/${files}")),
            Value::from(vec!["build/a.v".to_string(), "build/b.v".to_string()])
        );
    }

    #[test]
    fn fan_out_applies_to_innermost_string_in_lists() {
        let env = env(&[("files", Value::from(vec!["a".to_string(), "b".to_string()]))]);
        let resolved = env.resolve(&Value::List(vec![Value::from("-f"), Value::from("${files}.v")]));
        assert_eq!(
            resolved,
            Value::List(vec![
                Value::from("-f"),
                Value::from(vec!["a.v".to_string(), "b.v".to_string()]),
            ])
        );
    }

    #[test]
    fn resolution_is_idempotent_for_known_names() {
        let env = env(&[
            ("a", Value::from("x")),
            ("b", Value::from("${a}/y")),
            ("n", Value::Int(3)),
        ]);
        let input = Value::from("${b}-${n}-${a}");
        let once = env.resolve(&input);
        assert_eq!(once, Value::from("x/y-3-x"));
        assert_eq!(env.resolve(&once), once);
    }

    #[test]
    fn bind_resolves_eagerly() {
        let mut env = env(&[("root", Value::from("/opt"))]);
        env.bind("share", &Value::from("${root}/share"));
        env.bind("root", &Value::from("/usr"));
        assert_eq!(env.get("share"), Some(&Value::from("/opt/share")));
    }

    #[test]
    fn settle_resolves_forward_references() {
        let mut env = ResolutionEnv::new();
        env.bind("path", &Value::from("${dir}/top.v"));
        env.bind("dir", &Value::from("${root}/src"));
        env.bind("root", &Value::from("/p"));
        env.settle().expect("settle");
        assert_eq!(env.get("path"), Some(&Value::from("/p/src/top.v")));
    }

    #[test]
    fn settle_reports_cycles() {
        let mut env = ResolutionEnv::new();
        env.bind("a", &Value::from("${b}"));
        env.bind("b", &Value::from("${a}"));
        let err = env.settle().expect_err("cycle");
        assert!(err.to_string().contains("circular variable reference"));
    }

    #[test]
    fn layer_lets_entries_reference_each_other() {
        let mut env = env(&[("top", Value::from("base")), ("flags", Value::from("-q"))]);
        let mut layer = ValueMap::new();
        layer.insert("out".to_string(), Value::from("${top}_out"));
        layer.insert("top".to_string(), Value::from("counter"));
        layer.insert("flags".to_string(), Value::from("${flags} -v"));
        env.layer(&layer).expect("layer");
        assert_eq!(env.get("out"), Some(&Value::from("counter_out")));
        assert_eq!(env.get("flags"), Some(&Value::from("-q -v")));
    }

    #[test]
    fn later_layers_rebind_names_used_by_earlier_ones() {
        let mut platform = ValueMap::new();
        platform.insert("top".to_string(), Value::from("counter"));
        platform.insert("out".to_string(), Value::from("${top}_out"));
        let mut project = ValueMap::new();
        project.insert("top".to_string(), Value::from("${top}_wrapper"));
        let mut part = ValueMap::new();
        part.insert("out".to_string(), Value::from("build/${out}"));

        let mut env = ResolutionEnv::new();
        env.layers([&platform, &project, &part]).expect("layers");
        assert_eq!(env.get("top"), Some(&Value::from("counter_wrapper")));
        assert_eq!(env.get("out"), Some(&Value::from("build/counter_wrapper_out")));
    }

    #[test]
    fn self_reference_without_binding_below_is_a_cycle() {
        let mut layer = ValueMap::new();
        layer.insert("top".to_string(), Value::from("${top}_wrapper"));
        let err = ResolutionEnv::new().layer(&layer).expect_err("cycle");
        assert!(err.to_string().contains("top -> top"));
    }

    #[test]
    fn unresolved_names_lists_leftover_tokens() {
        let value = Value::List(vec![Value::from("${a}/x"), Value::from("${b?}")]);
        assert_eq!(ResolutionEnv::unresolved_names(&value), vec!["a", "b"]);
    }
}
