//! Constraint Resolver - atomic selection changes
//!
//! CRITICAL: resolution works on a copy of the selection. The caller only
//! ever sees the fully resolved state or a rejection; nothing in between.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{Catalog, ConfigOption, FloorId, OptionId};
use crate::selection::SelectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "option", rename_all = "snake_case")]
pub enum Action {
    Select(OptionId),
    Deselect(OptionId),
}

impl Action {
    pub fn option(&self) -> OptionId {
        match self {
            Action::Select(id) | Action::Deselect(id) => *id,
        }
    }
}

/// Why a selection change was refused. Messages are shown to the user verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("Conflict detected. {option} cannot be used with: {}. Please deselect conflicting options first.", .conflicts.join(", "))]
    ConflictDetected { option: String, conflicts: Vec<String> },

    #[error("Cannot deselect {option}. It is required by: {}. Please deselect those options first.", .dependents.join(", "))]
    RequiredByOthers { option: String, dependents: Vec<String> },

    #[error("Cannot select {option}. It requires {blocker}, which conflicts with: {}.", .conflicts.join(", "))]
    BlockedByTransitiveConflict {
        option: String,
        blocker: String,
        conflicts: Vec<String>,
    },

    #[error("Unknown option: {option}")]
    UnknownOption { option: OptionId },
}

/// Validate an action and compute the resulting selection.
///
/// `active_floor` drives elevation exclusivity: selecting inside an
/// elevation floor clears every sibling set on that floor.
pub fn resolve(
    catalog: &Catalog,
    selection: &SelectionState,
    active_floor: Option<FloorId>,
    action: Action,
) -> Result<SelectionState, Rejection> {
    let target = catalog
        .option(action.option())
        .ok_or(Rejection::UnknownOption { option: action.option() })?;

    match action {
        Action::Deselect(_) => deselect(catalog, selection, target),
        Action::Select(_) => select(catalog, selection, active_floor, target),
    }
}

fn deselect(
    catalog: &Catalog,
    selection: &SelectionState,
    target: &ConfigOption,
) -> Result<SelectionState, Rejection> {
    if !selection.is_selected(target.id) {
        return Ok(selection.clone());
    }

    let dependents = dependents_of(catalog, selection, target.id);
    if !dependents.is_empty() {
        return Err(Rejection::RequiredByOthers {
            option: target.name.clone(),
            dependents,
        });
    }

    let mut next = selection.clone();
    match catalog.set_of(target) {
        Some(set) if !set.allow_multiple => next.clear_set(set.id),
        _ => {
            next.remove(target.option_set_id, target.id);
        }
    }
    debug!(option = %target.id, "deselected");
    Ok(next)
}

fn select(
    catalog: &Catalog,
    selection: &SelectionState,
    active_floor: Option<FloorId>,
    target: &ConfigOption,
) -> Result<SelectionState, Rejection> {
    if selection.is_selected(target.id) {
        return Ok(selection.clone());
    }

    let conflicts = conflicting_names(catalog, selection, target);
    if !conflicts.is_empty() {
        return Err(Rejection::ConflictDetected {
            option: target.name.clone(),
            conflicts,
        });
    }

    // Resolve against the unchanged selection; commit only on success
    let mut visited = HashSet::new();
    let mut queue = Vec::new();
    collect_requirements(catalog, selection, target, target, &mut visited, &mut queue)?;

    let mut next = selection.clone();
    let mut touched = HashSet::new();
    for option in &queue {
        touched.insert(option.option_set_id);
        match catalog.set_of(option) {
            Some(set) if set.allow_multiple => next.append(set.id, option.id),
            _ => next.replace(option.option_set_id, option.id),
        }
    }

    if let Some(floor) = active_floor.and_then(|id| catalog.floor(id)) {
        let on_floor = catalog
            .set_of(target)
            .is_some_and(|set| set.floor_id == floor.id);
        if floor.is_elevation() && on_floor {
            for sibling in catalog.option_sets_for_floor(floor.id) {
                if !touched.contains(&sibling.id) {
                    next.discard_set(sibling.id);
                }
            }
        }
    }

    // A queued option overwritten by another one in its single-select set
    for option in &queue {
        if !next.is_selected(option.id) {
            return Err(Rejection::BlockedByTransitiveConflict {
                option: target.name.clone(),
                blocker: option.name.clone(),
                conflicts: next
                    .selected_in(option.option_set_id)
                    .iter()
                    .map(|id| catalog.option_name(*id))
                    .collect(),
            });
        }
    }

    // Requirements queued together may still exclude each other
    for option in queue.iter().skip(1).chain(queue.first()) {
        let clashes = conflicting_names(catalog, &next, option);
        if !clashes.is_empty() {
            return Err(Rejection::BlockedByTransitiveConflict {
                option: target.name.clone(),
                blocker: option.name.clone(),
                conflicts: clashes,
            });
        }
    }

    check_displaced(catalog, selection, &next)?;

    debug!(
        option = %target.id,
        pulled_in = queue.len().saturating_sub(1),
        "selected"
    );
    Ok(next)
}

/// Depth-first walk of the requirements graph. The visited set makes
/// cyclic requirement chains terminate silently.
fn collect_requirements<'a>(
    catalog: &'a Catalog,
    selection: &SelectionState,
    target: &ConfigOption,
    option: &'a ConfigOption,
    visited: &mut HashSet<OptionId>,
    queue: &mut Vec<&'a ConfigOption>,
) -> Result<(), Rejection> {
    if !visited.insert(option.id) {
        return Ok(());
    }

    if !selection.is_selected(option.id) {
        let conflicts = conflicting_names(catalog, selection, option);
        if !conflicts.is_empty() {
            return Err(Rejection::BlockedByTransitiveConflict {
                option: target.name.clone(),
                blocker: option.name.clone(),
                conflicts,
            });
        }
        queue.push(option);
    }

    for required in &option.requirements {
        if let Some(next) = catalog.option(*required) {
            collect_requirements(catalog, selection, target, next, visited, queue)?;
        }
    }
    Ok(())
}

/// Names of selected options that conflict with `option`, in either direction
fn conflicting_names(
    catalog: &Catalog,
    selection: &SelectionState,
    option: &ConfigOption,
) -> Vec<String> {
    let mut ids: Vec<OptionId> = option
        .conflicts
        .iter()
        .copied()
        .filter(|id| *id != option.id && selection.is_selected(*id))
        .collect();

    for selected in selection.all_selected() {
        if selected == option.id || ids.contains(&selected) {
            continue;
        }
        if catalog
            .option(selected)
            .is_some_and(|o| o.conflicts.contains(&option.id))
        {
            ids.push(selected);
        }
    }

    ids.into_iter().map(|id| catalog.option_name(id)).collect()
}

/// Names of selected options (other than `target`) that list it as a requirement
fn dependents_of(catalog: &Catalog, selection: &SelectionState, target: OptionId) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for id in selection.all_selected() {
        if id == target || !seen.insert(id) {
            continue;
        }
        if let Some(option) = catalog.option(id) {
            if option.requirements.contains(&target) {
                names.push(option.name.clone());
            }
        }
    }
    names
}

/// Refuse commits whose single-select overwrites or elevation clearing would
/// leave a selected option with none of its requirements selected.
fn check_displaced(
    catalog: &Catalog,
    before: &SelectionState,
    after: &SelectionState,
) -> Result<(), Rejection> {
    for removed in before.all_selected().filter(|id| !after.is_selected(*id)) {
        let orphaned: Vec<String> = after
            .all_selected()
            .filter_map(|id| catalog.option(id))
            .filter(|o| o.requirements.contains(&removed))
            .filter(|o| !o.requirements.iter().any(|r| after.is_selected(*r)))
            .map(|o| o.name.clone())
            .collect();

        if !orphaned.is_empty() {
            return Err(Rejection::RequiredByOthers {
                option: catalog.option_name(removed),
                dependents: orphaned,
            });
        }
    }
    Ok(())
}

/// Bring a selection made against an older catalog back in line with `catalog`.
///
/// Drops, in order: options that vanished or moved set, all but the first
/// option of each single-select set, any option conflicting with one kept
/// before it, then options left without a selected requirement until none
/// remain. Returns the repaired state and the dropped ids.
pub fn reconcile(catalog: &Catalog, selection: &SelectionState) -> (SelectionState, Vec<OptionId>) {
    let mut next = selection.clone();
    let mut dropped = Vec::new();

    next.retain(|set, id| {
        let keep = catalog.option(id).is_some_and(|o| o.option_set_id == set);
        if !keep {
            dropped.push(id);
        }
        keep
    });

    let mut filled = HashSet::new();
    next.retain(|set, id| {
        let single = catalog.option_set(set).is_some_and(|s| !s.allow_multiple);
        let keep = !single || filled.insert(set);
        if !keep {
            dropped.push(id);
        }
        keep
    });

    let mut kept: Vec<&ConfigOption> = Vec::new();
    next.retain(|_, id| {
        let Some(option) = catalog.option(id) else { return false };
        let clash = kept
            .iter()
            .any(|k| k.conflicts.contains(&id) || option.conflicts.contains(&k.id));
        if clash {
            dropped.push(id);
        } else {
            kept.push(option);
        }
        !clash
    });

    loop {
        let mut orphans: Vec<OptionId> = next
            .all_selected()
            .filter_map(|id| catalog.option(id))
            .filter(|o| !o.requirements.is_empty())
            .filter(|o| !o.requirements.iter().any(|r| next.is_selected(*r)))
            .map(|o| o.id)
            .collect();
        orphans.dedup();
        if orphans.is_empty() {
            break;
        }
        next.retain(|_, id| !orphans.contains(&id));
        dropped.extend(orphans);
    }

    if !dropped.is_empty() {
        debug!(dropped = ?dropped, "selection reconciled against catalog");
    }
    (next, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        CatalogData, Floor, FloorKind, Model, ModelId, OptionSet, OptionSetId, Placement,
    };

    fn option(id: u64, set: u64, requirements: &[u64], conflicts: &[u64]) -> ConfigOption {
        ConfigOption {
            id: OptionId(id),
            name: format!("Option {id}"),
            code: None,
            option_set_id: OptionSetId(set),
            position: id as u32,
            thumbnail: None,
            overlay_image: None,
            placement: Placement::default(),
            layer_order: 0,
            requirements: requirements.iter().copied().map(OptionId).collect(),
            conflicts: conflicts.iter().copied().map(OptionId).collect(),
            gallery: vec![],
            hotspot: None,
        }
    }

    fn set(id: u64, floor: u64, allow_multiple: bool) -> OptionSet {
        OptionSet {
            id: OptionSetId(id),
            name: format!("Set {id}"),
            floor_id: FloorId(floor),
            position: id as u32,
            allow_multiple,
            hotspot: None,
            icon_mode: None,
        }
    }

    fn catalog(options: Vec<ConfigOption>) -> Catalog {
        Catalog::build(CatalogData {
            schema_version: "1.0.0".to_string(),
            models: vec![Model { id: ModelId(1), name: "M".to_string(), cover_image: None }],
            floors: vec![
                Floor {
                    id: FloorId(1),
                    name: "Main".to_string(),
                    model_id: ModelId(1),
                    base_image: None,
                    kind: Some(FloorKind::Plan),
                },
                Floor {
                    id: FloorId(2),
                    name: "Front Elevation".to_string(),
                    model_id: ModelId(1),
                    base_image: None,
                    kind: None,
                },
            ],
            option_sets: vec![
                set(1, 1, false),
                set(2, 1, true),
                set(3, 1, false),
                set(8, 2, false),
                set(9, 2, false),
            ],
            options,
        })
        .unwrap()
    }

    fn apply(c: &Catalog, s: &SelectionState, action: Action) -> Result<SelectionState, Rejection> {
        resolve(c, s, Some(FloorId(1)), action)
    }

    #[test]
    fn test_select_pulls_in_transitive_requirements() {
        let c = catalog(vec![
            option(1, 2, &[2], &[]),
            option(2, 2, &[3], &[]),
            option(3, 3, &[], &[]),
        ]);
        let s = apply(&c, &SelectionState::new(), Action::Select(OptionId(1))).unwrap();
        assert!(s.is_selected(OptionId(1)));
        assert!(s.is_selected(OptionId(2)));
        assert!(s.is_selected(OptionId(3)));
    }

    #[test]
    fn test_cyclic_requirements_terminate() {
        let c = catalog(vec![option(1, 2, &[2], &[]), option(2, 2, &[1], &[])]);
        let s = apply(&c, &SelectionState::new(), Action::Select(OptionId(1))).unwrap();
        assert_eq!(s.selected_in(OptionSetId(2)), &[OptionId(1), OptionId(2)]);
    }

    #[test]
    fn test_reverse_conflict_detected() {
        let c = catalog(vec![option(1, 2, &[], &[]), option(2, 2, &[], &[1])]);
        let mut s = SelectionState::new();
        s.append(OptionSetId(2), OptionId(2));

        let err = apply(&c, &s, Action::Select(OptionId(1))).unwrap_err();
        assert_eq!(
            err,
            Rejection::ConflictDetected {
                option: "Option 1".to_string(),
                conflicts: vec!["Option 2".to_string()],
            }
        );
    }

    #[test]
    fn test_single_select_overwrites() {
        let c = catalog(vec![option(1, 1, &[], &[]), option(2, 1, &[], &[])]);
        let s = apply(&c, &SelectionState::new(), Action::Select(OptionId(1))).unwrap();
        let s = apply(&c, &s, Action::Select(OptionId(2))).unwrap();
        assert_eq!(s.selected_in(OptionSetId(1)), &[OptionId(2)]);
    }

    #[test]
    fn test_overwrite_refused_when_it_orphans_dependent() {
        let c = catalog(vec![
            option(1, 1, &[], &[]),
            option(2, 1, &[], &[]),
            option(5, 2, &[1], &[]),
        ]);
        let s = apply(&c, &SelectionState::new(), Action::Select(OptionId(5))).unwrap();
        let err = apply(&c, &s, Action::Select(OptionId(2))).unwrap_err();
        assert!(matches!(err, Rejection::RequiredByOthers { ref dependents, .. } if dependents == &["Option 5"]));
    }

    #[test]
    fn test_deselect_single_set_empties_it() {
        let c = catalog(vec![option(1, 1, &[], &[])]);
        let s = apply(&c, &SelectionState::new(), Action::Select(OptionId(1))).unwrap();
        let s = apply(&c, &s, Action::Deselect(OptionId(1))).unwrap();
        assert!(s.selected_in(OptionSetId(1)).is_empty());
    }

    #[test]
    fn test_mutually_conflicting_requirements_blocked() {
        let c = catalog(vec![
            option(1, 2, &[2, 3], &[]),
            option(2, 2, &[], &[3]),
            option(3, 3, &[], &[]),
        ]);
        let s = SelectionState::new();
        let err = apply(&c, &s, Action::Select(OptionId(1))).unwrap_err();
        assert!(matches!(err, Rejection::BlockedByTransitiveConflict { .. }));
    }

    #[test]
    fn test_requirements_sharing_single_set_blocked() {
        let c = catalog(vec![
            option(1, 2, &[2], &[]),
            option(2, 1, &[3], &[]),
            option(3, 1, &[], &[]),
        ]);
        let err = apply(&c, &SelectionState::new(), Action::Select(OptionId(1))).unwrap_err();
        assert_eq!(
            err,
            Rejection::BlockedByTransitiveConflict {
                option: "Option 1".to_string(),
                blocker: "Option 2".to_string(),
                conflicts: vec!["Option 3".to_string()],
            }
        );
    }

    #[test]
    fn test_elevation_ignored_for_plan_floor_sets() {
        let c = catalog(vec![option(1, 1, &[], &[]), option(80, 8, &[], &[]), option(90, 9, &[], &[])]);
        let mut s = SelectionState::new();
        s.replace(OptionSetId(8), OptionId(80));
        let s = resolve(&c, &s, Some(FloorId(2)), Action::Select(OptionId(1))).unwrap();
        assert!(s.is_selected(OptionId(80)));
        assert!(s.is_selected(OptionId(1)));
    }

    #[test]
    fn test_unknown_option() {
        let c = catalog(vec![]);
        let err = apply(&c, &SelectionState::new(), Action::Select(OptionId(77))).unwrap_err();
        assert_eq!(err, Rejection::UnknownOption { option: OptionId(77) });
    }

    #[test]
    fn test_rejection_message_verbatim() {
        let err = Rejection::RequiredByOthers {
            option: "Garage".to_string(),
            dependents: vec!["Workshop".to_string(), "Loft".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot deselect Garage. It is required by: Workshop, Loft. Please deselect those options first."
        );
    }

    #[test]
    fn test_reconcile_repairs_stale_selection() {
        // Selection made while set 3 allowed several options and 21 had no conflicts
        let mut stale = SelectionState::new();
        stale.append(OptionSetId(3), OptionId(30));
        stale.append(OptionSetId(3), OptionId(31));
        stale.append(OptionSetId(2), OptionId(20));
        stale.append(OptionSetId(2), OptionId(21));
        stale.append(OptionSetId(2), OptionId(22));
        stale.append(OptionSetId(2), OptionId(99));

        let c = catalog(vec![
            option(20, 2, &[], &[]),
            option(21, 2, &[], &[20]),
            option(22, 2, &[21], &[]),
            option(30, 3, &[], &[]),
            option(31, 3, &[], &[]),
        ]);
        let (repaired, dropped) = reconcile(&c, &stale);

        assert_eq!(repaired.selected_in(OptionSetId(3)), &[OptionId(30)]);
        assert_eq!(repaired.selected_in(OptionSetId(2)), &[OptionId(20)]);
        let mut dropped = dropped;
        dropped.sort();
        assert_eq!(dropped, vec![OptionId(21), OptionId(22), OptionId(31), OptionId(99)]);
    }

    #[test]
    fn test_reconcile_keeps_consistent_selection() {
        let c = catalog(vec![option(10, 1, &[20], &[]), option(20, 2, &[], &[])]);
        let s = apply(&c, &SelectionState::new(), Action::Select(OptionId(10))).unwrap();
        let (repaired, dropped) = reconcile(&c, &s);
        assert_eq!(repaired, s);
        assert!(dropped.is_empty());
    }
}
