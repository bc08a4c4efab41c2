//! Declared inputs, outputs and values of a stage module.
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fmt;

/// How strictly a declared dependency or value must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qualifier {
    /// No suffix: must be available.
    Required,
    /// `?`: may be absent.
    Maybe,
    /// `!`: produced only when something asks for it.
    Demand,
}

impl Qualifier {
    pub fn suffix(self) -> &'static str {
        match self {
            Qualifier::Required => "",
            Qualifier::Maybe => "?",
            Qualifier::Demand => "!",
        }
    }
}

/// A dependency or value name together with its qualifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IoName {
    pub name: String,
    pub qualifier: Qualifier,
}

impl IoName {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: Qualifier::Required,
        }
    }

    pub fn maybe(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: Qualifier::Maybe,
        }
    }

    pub fn demand(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: Qualifier::Demand,
        }
    }

    /// Parse `name`, `name?` or `name!`.
    pub fn parse(text: &str) -> Result<Self> {
        let (name, qualifier) = decompose(text);
        if name.is_empty() {
            return Err(anyhow!("empty dependency name in `{text}`"));
        }
        Ok(Self {
            name: name.to_string(),
            qualifier,
        })
    }

    pub fn is_required(&self) -> bool {
        self.qualifier == Qualifier::Required
    }
}

impl fmt::Display for IoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.qualifier.suffix())
    }
}

/// Split a trailing `?`/`!` off a name.
pub fn decompose(text: &str) -> (&str, Qualifier) {
    if let Some(name) = text.strip_suffix('?') {
        (name, Qualifier::Maybe)
    } else if let Some(name) = text.strip_suffix('!') {
        (name, Qualifier::Demand)
    } else {
        (text, Qualifier::Required)
    }
}

/// Static description of what a module consumes and produces.
#[derive(Debug, Clone, Default)]
pub struct ModuleIo {
    pub name: String,
    pub no_of_phases: usize,
    pub takes: Vec<IoName>,
    pub produces: Vec<IoName>,
    pub values: Vec<IoName>,
    pub prod_meta: BTreeMap<String, String>,
}

impl ModuleIo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The declared product called `name`, if any.
    pub fn produce(&self, name: &str) -> Option<&IoName> {
        self.produces.iter().find(|item| item.name == name)
    }

    /// Description of a product, with a placeholder when none was given.
    pub fn describe(&self, name: &str) -> &str {
        self.prod_meta
            .get(name)
            .map(String::as_str)
            .unwrap_or("<no description>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifiers_round_trip() {
        for text in ["eblif", "sdc?", "pack_log!"] {
            let parsed = IoName::parse(text).expect("parse");
            assert_eq!(parsed.to_string(), text);
            assert_eq!(decompose(text), (parsed.name.as_str(), parsed.qualifier));
        }
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(IoName::parse("?").is_err());
    }

    #[test]
    fn describe_falls_back_to_placeholder() {
        let mut io = ModuleIo::new("pack");
        io.prod_meta
            .insert("net".to_string(), "Packed netlist".to_string());
        assert_eq!(io.describe("net"), "Packed netlist");
        assert_eq!(io.describe("pack_log"), "<no description>");
    }
}
