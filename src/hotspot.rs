//! Hotspot Mapper
//!
//! Collapses co-located option-set and option entry points into one icon
//! per rounded coordinate, and expands a clicked icon back into the
//! selection panel it opens.

use serde::Serialize;
use std::collections::HashMap;

use crate::catalog::{
    Catalog, ConfigOption, FloorId, IconMode, OptionId, OptionSet, OptionSetId, PercentPoint,
};
use crate::selection::SelectionState;

/// Rounded coordinate key, e.g. `"12.5000,40.0000"` at precision 4
pub fn coordinate_key(point: PercentPoint, precision: usize) -> String {
    format!("{:.*},{:.*}", precision, point.x, precision, point.y)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum HotspotTarget {
    OptionSet(OptionSetId),
    Option(OptionId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    pub key: String,
    /// First coordinate seen for this key, unrounded
    pub point: PercentPoint,
    pub targets: Vec<HotspotTarget>,
}

/// Options of one set offered by a clicked hotspot
#[derive(Debug, Clone, Serialize)]
pub struct PanelGroup {
    pub set_id: OptionSetId,
    pub title: String,
    pub allow_multiple: bool,
    pub options: Vec<PanelOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelOption {
    pub id: OptionId,
    pub name: String,
    pub code: Option<String>,
    pub thumbnail: Option<String>,
    pub selected: bool,
}

#[derive(Debug, Clone)]
pub struct HotspotMapper {
    precision: usize,
}

impl HotspotMapper {
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn key(&self, point: PercentPoint) -> String {
        coordinate_key(point, self.precision)
    }

    /// Every visible hotspot on a floor, in set-position order.
    /// Elevation floors carry none.
    pub fn hotspots(
        &self,
        catalog: &Catalog,
        selection: &SelectionState,
        floor: FloorId,
    ) -> Vec<Hotspot> {
        let Some(f) = catalog.floor(floor) else {
            return vec![];
        };
        if f.is_elevation() {
            return vec![];
        }

        let mut order: Vec<Hotspot> = vec![];
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut push = |point: PercentPoint, target: HotspotTarget| {
            let key = self.key(point);
            match by_key.get(&key) {
                Some(&i) => order[i].targets.push(target),
                None => {
                    by_key.insert(key.clone(), order.len());
                    order.push(Hotspot { key, point, targets: vec![target] });
                }
            }
        };

        let sets = catalog.option_sets_for_floor(floor);
        for set in &sets {
            if let Some(point) = set_level_point(set) {
                push(point, HotspotTarget::OptionSet(set.id));
            }
        }
        for set in &sets {
            for option in catalog.options_for_set(set.id) {
                if let Some(point) = option_level_point(set, option, selection) {
                    push(point, HotspotTarget::Option(option.id));
                }
            }
        }
        order
    }

    /// Every option set and option sharing `key` on the floor
    pub fn resolve_hotspot(
        &self,
        catalog: &Catalog,
        selection: &SelectionState,
        floor: FloorId,
        key: &str,
    ) -> Vec<HotspotTarget> {
        self.hotspots(catalog, selection, floor)
            .into_iter()
            .find(|h| h.key == key)
            .map(|h| h.targets)
            .unwrap_or_default()
    }

    /// Group targets into per-set panels ordered by set position.
    /// A set target offers all of its options; an option target offers itself.
    pub fn panel(
        &self,
        catalog: &Catalog,
        selection: &SelectionState,
        targets: &[HotspotTarget],
    ) -> Vec<PanelGroup> {
        let mut groups: Vec<(&OptionSet, Vec<&ConfigOption>)> = vec![];

        for target in targets {
            let (set, offered) = match *target {
                HotspotTarget::OptionSet(id) => match catalog.option_set(id) {
                    Some(set) => (set, catalog.options_for_set(id)),
                    None => continue,
                },
                HotspotTarget::Option(id) => {
                    match catalog.option(id).and_then(|o| catalog.set_of(o).map(|s| (s, o))) {
                        Some((set, option)) => (set, vec![option]),
                        None => continue,
                    }
                }
            };

            let i = match groups.iter().position(|(s, _)| s.id == set.id) {
                Some(i) => i,
                None => {
                    groups.push((set, vec![]));
                    groups.len() - 1
                }
            };
            let existing = &mut groups[i].1;
            for option in offered {
                if !existing.iter().any(|o| o.id == option.id) {
                    existing.push(option);
                }
            }
        }

        groups.sort_by_key(|(set, _)| (set.position, set.id));

        let single_option_target =
            targets.len() == 1 && matches!(targets[0], HotspotTarget::Option(_));

        groups
            .into_iter()
            .map(|(set, options)| PanelGroup {
                set_id: set.id,
                title: if single_option_target && options.len() == 1 {
                    "Customize Upgrade".to_string()
                } else {
                    format!("Customize: {}", set.name)
                },
                allow_multiple: set.allow_multiple,
                options: options
                    .into_iter()
                    .map(|o| PanelOption {
                        id: o.id,
                        name: o.name.clone(),
                        code: o.code.clone(),
                        thumbnail: o.thumbnail.clone(),
                        selected: selection.is_selected(o.id),
                    })
                    .collect(),
            })
            .collect()
    }
}

fn set_level_point(set: &OptionSet) -> Option<PercentPoint> {
    match set.icon_mode() {
        IconMode::SetLevel => set.hotspot,
        IconMode::OptionLevel => None,
    }
}

/// Option icons need an option-level parent set, a coordinate, and a
/// satisfied prerequisite when the option has any.
fn option_level_point(
    set: &OptionSet,
    option: &ConfigOption,
    selection: &SelectionState,
) -> Option<PercentPoint> {
    if set.icon_mode() != IconMode::OptionLevel {
        return None;
    }
    let point = option.hotspot?;
    let satisfied = option.requirements.is_empty()
        || option.requirements.iter().any(|r| selection.is_selected(*r));
    satisfied.then_some(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogData, Floor, Model, ModelId, Placement};

    fn pt(x: f64, y: f64) -> Option<PercentPoint> {
        Some(PercentPoint { x, y })
    }

    fn set(id: u64, floor: u64, position: u32, mode: IconMode, hotspot: Option<PercentPoint>) -> OptionSet {
        OptionSet {
            id: OptionSetId(id),
            name: format!("Set {id}"),
            floor_id: FloorId(floor),
            position,
            allow_multiple: false,
            hotspot,
            icon_mode: Some(mode),
        }
    }

    fn option(id: u64, set: u64, hotspot: Option<PercentPoint>, requirements: &[u64]) -> ConfigOption {
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
            conflicts: vec![],
            gallery: vec![],
            hotspot,
        }
    }

    fn catalog() -> Catalog {
        Catalog::build(CatalogData {
            models: vec![Model { id: ModelId(1), name: "M".to_string(), cover_image: None }],
            floors: vec![
                Floor { id: FloorId(1), name: "Main".to_string(), model_id: ModelId(1), base_image: None, kind: None },
                Floor { id: FloorId(2), name: "Exterior".to_string(), model_id: ModelId(1), base_image: None, kind: None },
            ],
            option_sets: vec![
                set(1, 1, 2, IconMode::SetLevel, pt(10.0, 20.0)),
                set(2, 1, 1, IconMode::SetLevel, pt(10.00001, 20.0)),
                set(3, 1, 3, IconMode::OptionLevel, pt(90.0, 90.0)),
                set(4, 2, 0, IconMode::SetLevel, pt(50.0, 50.0)),
            ],
            options: vec![
                option(11, 1, None, &[]),
                option(12, 1, None, &[]),
                option(21, 2, None, &[]),
                option(31, 3, pt(10.0, 20.0), &[]),
                option(32, 3, pt(60.0, 60.0), &[11]),
            ],
            ..CatalogData::default()
        })
        .unwrap()
    }

    #[test]
    fn test_coordinate_key_precision() {
        let p = PercentPoint { x: 12.5, y: 3.0 };
        assert_eq!(coordinate_key(p, 4), "12.5000,3.0000");
        assert_eq!(coordinate_key(p, 0), "12,3");
    }

    #[test]
    fn test_colocated_entries_collapse() {
        let c = catalog();
        let hotspots = HotspotMapper::new(4).hotspots(&c, &SelectionState::new(), FloorId(1));
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].key, "10.0000,20.0000");
        assert_eq!(
            hotspots[0].targets,
            vec![
                HotspotTarget::OptionSet(OptionSetId(2)),
                HotspotTarget::OptionSet(OptionSetId(1)),
                HotspotTarget::Option(OptionId(31)),
            ]
        );
    }

    #[test]
    fn test_option_icon_waits_for_prerequisite() {
        let c = catalog();
        let mapper = HotspotMapper::new(4);
        let mut s = SelectionState::new();
        assert!(mapper.resolve_hotspot(&c, &s, FloorId(1), "60.0000,60.0000").is_empty());

        s.replace(OptionSetId(1), OptionId(11));
        assert_eq!(
            mapper.resolve_hotspot(&c, &s, FloorId(1), "60.0000,60.0000"),
            vec![HotspotTarget::Option(OptionId(32))]
        );
    }

    #[test]
    fn test_no_hotspots_on_elevation() {
        let c = catalog();
        assert!(HotspotMapper::new(4).hotspots(&c, &SelectionState::new(), FloorId(2)).is_empty());
    }

    #[test]
    fn test_panel_groups_by_set_position_and_dedupes() {
        let c = catalog();
        let targets = vec![
            HotspotTarget::Option(OptionId(11)),
            HotspotTarget::OptionSet(OptionSetId(1)),
            HotspotTarget::OptionSet(OptionSetId(2)),
        ];
        let panel = HotspotMapper::new(4).panel(&c, &SelectionState::new(), &targets);
        assert_eq!(panel.len(), 2);
        assert_eq!(panel[0].set_id, OptionSetId(2));
        assert_eq!(panel[0].title, "Customize: Set 2");
        let ids: Vec<u64> = panel[1].options.iter().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[test]
    fn test_single_option_panel_title() {
        let c = catalog();
        let panel = HotspotMapper::new(4).panel(&c, &SelectionState::new(), &[HotspotTarget::Option(OptionId(31))]);
        assert_eq!(panel.len(), 1);
        assert_eq!(panel[0].title, "Customize Upgrade");
    }
}
