//! Design Summary - the review page of a finished configuration

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{Catalog, FloorId, GalleryImage, ModelId, OptionId, OptionSetId};
use crate::hashing::{catalog_fingerprint, selection_fingerprint};
use crate::packages::DesignSelections;
use crate::selection::SelectionState;
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Serialize)]
pub struct DesignSummary {
    pub id: String,
    pub model_id: ModelId,
    pub model_name: String,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the canonical selection
    pub fingerprint: String,
    /// Catalog the selection was made against
    pub catalog_hash: String,
    pub floors: Vec<FloorSummary>,
}

impl DesignSummary {
    pub fn is_empty(&self) -> bool {
        self.floors.is_empty()
    }

    pub fn option_count(&self) -> usize {
        self.floors.iter().map(|f| f.items.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FloorSummary {
    pub floor_id: FloorId,
    pub floor_name: String,
    pub items: Vec<SummaryItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryItem {
    pub set_id: OptionSetId,
    pub set_name: String,
    pub option_id: OptionId,
    pub option_name: String,
    pub code: Option<String>,
    pub thumbnail: Option<String>,
    /// Picked design package, if any
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub package: Vec<GalleryImage>,
}

/// List every selected option of a model, floor by floor in display order.
/// Floors without selections are left out.
pub fn summarize(
    catalog: &Catalog,
    model: ModelId,
    selection: &SelectionState,
    designs: &DesignSelections,
) -> Result<DesignSummary, serde_json::Error> {
    let floors = catalog
        .floors_for_model(model)
        .into_iter()
        .filter_map(|floor| {
            let items: Vec<SummaryItem> = catalog
                .option_sets_for_floor(floor.id)
                .into_iter()
                .flat_map(|set| {
                    selection
                        .selected_in(set.id)
                        .iter()
                        .filter_map(|id| catalog.option(*id))
                        .map(move |o| SummaryItem {
                            set_id: set.id,
                            set_name: set.name.clone(),
                            option_id: o.id,
                            option_name: o.name.clone(),
                            code: o.code.clone(),
                            thumbnail: o.thumbnail.clone(),
                            package: designs.for_option(o.id).to_vec(),
                        })
                })
                .collect();
            (!items.is_empty()).then(|| FloorSummary {
                floor_id: floor.id,
                floor_name: floor.name.clone(),
                items,
            })
        })
        .collect();

    Ok(DesignSummary {
        id: Uuid::new_v4().to_string(),
        model_id: model,
        model_name: catalog
            .model(model)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| model.to_string()),
        engine_version: ENGINE_VERSION.to_string(),
        created_at: Utc::now(),
        fingerprint: selection_fingerprint(selection)?,
        catalog_hash: catalog_fingerprint(catalog.data(), ENGINE_VERSION)?,
        floors,
    })
}
