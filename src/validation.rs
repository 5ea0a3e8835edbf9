//! Catalog Validation - Rule/Policy Separation
//!
//! Authoring-time checks over a catalog document.
//! Rules produce structured violations.
//! Policy maps violations to actions.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::catalog::{CatalogData, ConfigOption, OptionId, OptionSetId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub subject: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub schema_version: String,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Block,
    Warn,
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation>;
}

fn option_subject(option: &ConfigOption) -> Option<String> {
    Some(format!("option {} ({})", option.id, option.name))
}

// --- Concrete Rules ---

/// Requirement cycles are tolerated at runtime but almost always a mistake
pub struct RequirementCycleRule;

impl ValidationRule for RequirementCycleRule {
    fn name(&self) -> &'static str { "requirement_cycle" }

    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation> {
        let graph: HashMap<OptionId, &[OptionId]> = data
            .options
            .iter()
            .map(|o| (o.id, o.requirements.as_slice()))
            .collect();

        let mut done: HashSet<OptionId> = HashSet::new();
        let mut reported: HashSet<Vec<OptionId>> = HashSet::new();
        let mut violations = vec![];

        for option in &data.options {
            let mut path = vec![];
            find_cycles(option.id, &graph, &mut path, &mut done, &mut |cycle| {
                let mut key = cycle.to_vec();
                key.sort();
                if reported.insert(key) {
                    let chain: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
                    violations.push(ValidationViolation {
                        rule: self.name().to_string(),
                        severity: ViolationSeverity::Error,
                        message: format!("Requirement cycle: {} -> {}", chain.join(" -> "), chain[0]),
                        subject: Some(format!("option {}", cycle[0])),
                        remediation: vec!["Remove one requirement edge from the cycle".to_string()],
                    });
                }
            });
        }
        violations
    }
}

fn find_cycles(
    node: OptionId,
    graph: &HashMap<OptionId, &[OptionId]>,
    path: &mut Vec<OptionId>,
    done: &mut HashSet<OptionId>,
    report: &mut dyn FnMut(&[OptionId]),
) {
    if done.contains(&node) {
        return;
    }
    if let Some(start) = path.iter().position(|id| *id == node) {
        report(&path[start..]);
        return;
    }
    path.push(node);
    for next in graph.get(&node).copied().unwrap_or(&[]) {
        if graph.contains_key(next) {
            find_cycles(*next, graph, path, done, report);
        }
    }
    path.pop();
    done.insert(node);
}

pub struct DanglingReferenceRule;

impl ValidationRule for DanglingReferenceRule {
    fn name(&self) -> &'static str { "dangling_reference" }

    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation> {
        let known: HashSet<OptionId> = data.options.iter().map(|o| o.id).collect();
        let mut violations = vec![];

        for option in &data.options {
            let edges = option
                .requirements
                .iter()
                .map(|id| ("requirement", id))
                .chain(option.conflicts.iter().map(|id| ("conflict", id)));
            for (kind, id) in edges {
                if !known.contains(id) {
                    violations.push(ValidationViolation {
                        rule: self.name().to_string(),
                        severity: ViolationSeverity::Error,
                        message: format!("{kind} references unknown option {id}"),
                        subject: option_subject(option),
                        remediation: vec![format!("Remove {id} from the {kind} list")],
                    });
                }
            }
        }
        violations
    }
}

pub struct SelfReferenceRule;

impl ValidationRule for SelfReferenceRule {
    fn name(&self) -> &'static str { "self_reference" }

    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation> {
        data.options
            .iter()
            .filter(|o| o.requirements.contains(&o.id) || o.conflicts.contains(&o.id))
            .map(|o| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Error,
                message: "Option requires or conflicts with itself".to_string(),
                subject: option_subject(o),
                remediation: vec!["Remove the option's own id from its lists".to_string()],
            })
            .collect()
    }
}

/// Requiring an option that conflicts (either way) can never be selected
pub struct RequirementConflictRule;

impl ValidationRule for RequirementConflictRule {
    fn name(&self) -> &'static str { "requirement_conflict" }

    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation> {
        let conflicts: HashMap<OptionId, &[OptionId]> = data
            .options
            .iter()
            .map(|o| (o.id, o.conflicts.as_slice()))
            .collect();
        let mut violations = vec![];

        for option in &data.options {
            for required in &option.requirements {
                let reverse = conflicts
                    .get(required)
                    .is_some_and(|c| c.contains(&option.id));
                if option.conflicts.contains(required) || reverse {
                    violations.push(ValidationViolation {
                        rule: self.name().to_string(),
                        severity: ViolationSeverity::Error,
                        message: format!("Requires option {required}, which it conflicts with"),
                        subject: option_subject(option),
                        remediation: vec!["Drop either the requirement or the conflict".to_string()],
                    });
                }
            }
        }
        violations
    }
}

/// A requirement inside the same single-select set would overwrite the option
pub struct SameSetRequirementRule;

impl ValidationRule for SameSetRequirementRule {
    fn name(&self) -> &'static str { "same_set_requirement" }

    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation> {
        let single: HashSet<OptionSetId> = data
            .option_sets
            .iter()
            .filter(|s| !s.allow_multiple)
            .map(|s| s.id)
            .collect();
        let set_of: HashMap<OptionId, OptionSetId> =
            data.options.iter().map(|o| (o.id, o.option_set_id)).collect();

        data.options
            .iter()
            .filter(|o| single.contains(&o.option_set_id))
            .filter(|o| {
                o.requirements
                    .iter()
                    .any(|r| *r != o.id && set_of.get(r) == Some(&o.option_set_id))
            })
            .map(|o| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Error,
                message: "Requires another option of its own single-select set".to_string(),
                subject: option_subject(o),
                remediation: vec!["Move the requirement to another set or allow multiple selections".to_string()],
            })
            .collect()
    }
}

pub struct PlacementRule;

impl ValidationRule for PlacementRule {
    fn name(&self) -> &'static str { "placement" }

    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        data.options
            .iter()
            .filter(|o| o.overlay().is_some())
            .filter(|o| {
                let p = o.placement;
                !in_range(p.x)
                    || !in_range(p.y)
                    || p.width <= 0.0
                    || p.height <= 0.0
                    || p.x + p.width > 100.0
                    || p.y + p.height > 100.0
            })
            .map(|o| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: format!(
                    "Overlay rectangle {:.2},{:.2} {:.2}x{:.2} leaves the background",
                    o.placement.x, o.placement.y, o.placement.width, o.placement.height
                ),
                subject: option_subject(o),
                remediation: vec!["Re-position the overlay inside 0-100%".to_string()],
            })
            .collect()
    }
}

pub struct PositionRule;

impl ValidationRule for PositionRule {
    fn name(&self) -> &'static str { "position" }

    fn validate(&self, data: &CatalogData) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        let mut set_positions = HashSet::new();
        for set in &data.option_sets {
            if !set_positions.insert((set.floor_id, set.position)) {
                violations.push(ValidationViolation {
                    rule: self.name().to_string(),
                    severity: ViolationSeverity::Warning,
                    message: format!("Duplicate option set position {} on floor {}", set.position, set.floor_id),
                    subject: Some(format!("option set {} ({})", set.id, set.name)),
                    remediation: vec!["Re-order the floor's option sets".to_string()],
                });
            }
        }

        let mut option_positions = HashSet::new();
        for option in &data.options {
            if !option_positions.insert((option.option_set_id, option.position)) {
                violations.push(ValidationViolation {
                    rule: self.name().to_string(),
                    severity: ViolationSeverity::Warning,
                    message: format!(
                        "Duplicate option position {} in set {}",
                        option.position, option.option_set_id
                    ),
                    subject: option_subject(option),
                    remediation: vec!["Re-order the set's options".to_string()],
                });
            }
        }
        violations
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
    failure_mode: FailureMode,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RequirementCycleRule),
                Box::new(DanglingReferenceRule),
                Box::new(SelfReferenceRule),
                Box::new(RequirementConflictRule),
                Box::new(SameSetRequirementRule),
                Box::new(PlacementRule),
                Box::new(PositionRule),
            ],
            failure_mode: FailureMode::Block,
        }
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn validate(&self, data: &CatalogData) -> ValidationResult {
        let violations: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(data))
            .collect();

        let has_errors = violations.iter().any(|v| v.severity == ViolationSeverity::Error);

        let valid = match self.failure_mode {
            FailureMode::Block => !has_errors,
            // Never block, just record
            FailureMode::Warn => true,
        };

        ValidationResult {
            valid,
            violations,
            schema_version: data.schema_version.clone(),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
