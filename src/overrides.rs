//! Parsing of `--dep` and `--val` command-line overrides.
//!
//! Each override is `[stage.]name=value`. Values use a small grammar:
//! `[a,b]` lists, `{key:value,...}` maps (both may nest), `\` escapes the
//! next character, and the sentinels `\True`, `\False` and `\N<integer>`
//! produce booleans and numbers.
use crate::value::{Value, ValueMap};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;

/// Dependency and value overrides scoped to one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOverlay {
    pub dependencies: ValueMap,
    pub values: ValueMap,
}

/// Everything the command line overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverlay {
    pub dependencies: ValueMap,
    pub values: ValueMap,
    pub stages: BTreeMap<String, StageOverlay>,
}

impl CliOverlay {
    pub fn from_args(deps: &[String], vals: &[String]) -> Result<Self> {
        let mut overlay = Self::default();
        for text in deps {
            let parsed = parse_assignment(text).with_context(|| format!("parse --dep `{text}`"))?;
            overlay.insert(parsed, true);
        }
        for text in vals {
            let parsed = parse_assignment(text).with_context(|| format!("parse --val `{text}`"))?;
            overlay.insert(parsed, false);
        }
        Ok(overlay)
    }

    fn insert(&mut self, assignment: Assignment, dependency: bool) {
        let Assignment { stage, name, value } = assignment;
        let target = match stage {
            Some(stage) => {
                let overlay = self.stages.entry(stage).or_default();
                if dependency {
                    &mut overlay.dependencies
                } else {
                    &mut overlay.values
                }
            }
            None if dependency => &mut self.dependencies,
            None => &mut self.values,
        };
        target.insert(name, value);
    }

    /// Values scoped to `stage`, if any.
    pub fn stage_values(&self, stage: &str) -> Option<&ValueMap> {
        self.stages.get(stage).map(|overlay| &overlay.values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub stage: Option<String>,
    pub name: String,
    pub value: Value,
}

/// Parse `[stage.]name=value`.
pub fn parse_assignment(text: &str) -> Result<Assignment> {
    let parts = split_top_level(text, '=');
    let [path, value] = parts.as_slice() else {
        return Err(anyhow!(
            "expected exactly one unescaped `=` in `{text}`"
        ));
    };
    let mut components: Vec<&str> = path.split('.').collect();
    let name = components
        .pop()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("missing name before `=`"))?
        .to_string();
    let stage = match components.as_slice() {
        [] => None,
        [stage] if !stage.is_empty() => Some(stage.to_string()),
        _ => return Err(anyhow!("too many `.` components in `{path}`")),
    };
    Ok(Assignment {
        stage,
        name,
        value: parse_value(value)?,
    })
}

/// Parse the right-hand side of an override.
pub fn parse_value(text: &str) -> Result<Value> {
    if text.is_empty() {
        return Ok(Value::from(""));
    }
    if let Some(rest) = text.strip_prefix('[') {
        let inner = rest
            .strip_suffix(']')
            .ok_or_else(|| anyhow!("missing `]` delimiter in `{text}`"))?;
        if inner.is_empty() {
            return Ok(Value::List(Vec::new()));
        }
        return split_top_level(inner, ',')
            .iter()
            .map(|item| parse_value(item))
            .collect::<Result<Vec<_>>>()
            .map(Value::List);
    }
    if let Some(rest) = text.strip_prefix('{') {
        let inner = rest
            .strip_suffix('}')
            .ok_or_else(|| anyhow!("missing `}}` delimiter in `{text}`"))?;
        let mut map = ValueMap::new();
        if inner.is_empty() {
            return Ok(Value::Map(map));
        }
        for entry in split_top_level(inner, ',') {
            let parts = split_top_level(&entry, ':');
            match parts.as_slice() {
                [key, value] => {
                    map.insert(unescape(key), parse_value(value)?);
                }
                [_] => return Err(anyhow!("missing value in map entry `{entry}`")),
                _ => return Err(anyhow!("unexpected `:` in map entry `{entry}`")),
            }
        }
        return Ok(Value::Map(map));
    }
    match text {
        "\\True" => return Ok(Value::Bool(true)),
        "\\False" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Some(number) = text.strip_prefix("\\N") {
        let number = number
            .parse::<i64>()
            .with_context(|| format!("invalid number in `{text}`"))?;
        return Ok(Value::Int(number));
    }
    Ok(Value::from(unescape(text)))
}

/// Split on `separator` where it is neither escaped nor nested in `[]`/`{}`.
fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            _ if ch == separator && depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
