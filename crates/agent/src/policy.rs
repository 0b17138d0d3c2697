//! Which tools a run may use, and whether the model is forced to pick one.

use orchestrator_core::provider::{ToolChoice, ToolDefinition};
use orchestrator_core::tool::ToolRegistry;
use std::collections::BTreeSet;

/// Sentinel entry in `allowed_tools` that offers the whole catalog.
pub const AUTO: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// No tools offered.
    Off,
    /// Everything offered, model decides.
    Auto,
    /// A concrete subset, forced on the first iteration.
    Forced,
}

/// Resolved tool selection for one run.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    mode: Mode,
    active: BTreeSet<String>,
    definitions: Vec<ToolDefinition>,
}

impl ToolPolicy {
    /// Resolve the request's tool list against the catalog.
    ///
    /// Names in `disabled` are dropped before anything else, both for
    /// `auto` and for explicit subsets.
    pub fn resolve(
        allowed: Option<&[String]>,
        registry: &ToolRegistry,
        disabled: &BTreeSet<String>,
    ) -> Self {
        let enabled = |name: &str| !disabled.contains(name);

        let (mode, active): (Mode, BTreeSet<String>) = match allowed {
            None => (Mode::Off, BTreeSet::new()),
            Some(names) if names.iter().any(|n| n == AUTO) => (
                Mode::Auto,
                registry
                    .names()
                    .into_iter()
                    .filter(|n| enabled(*n))
                    .map(String::from)
                    .collect(),
            ),
            Some(names) => {
                let subset: BTreeSet<String> = names
                    .iter()
                    .filter(|n| registry.contains(n.as_str()) && enabled(n.as_str()))
                    .cloned()
                    .collect();
                if subset.is_empty() {
                    (Mode::Auto, subset)
                } else {
                    (Mode::Forced, subset)
                }
            }
        };

        let names: Vec<String> = active.iter().cloned().collect();
        let definitions = registry.definitions_for(&names);
        Self {
            mode,
            active,
            definitions,
        }
    }

    /// Schemas offered to the model.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Tool choice for a 1-based iteration. Forcing only applies to the first.
    pub fn choice_for(&self, iteration: u32) -> ToolChoice {
        match self.mode {
            Mode::Off => ToolChoice::None,
            Mode::Forced if iteration == 1 => ToolChoice::Required,
            Mode::Forced | Mode::Auto => ToolChoice::Auto,
        }
    }

    /// Whether a call to `name` may be dispatched in this run.
    pub fn permits(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }
}
