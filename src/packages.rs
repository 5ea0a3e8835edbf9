//! Design Packages - gallery images picked for selected options
//!
//! Picking an image picks its whole package: every image in the option's
//! gallery that shares its group. Ungrouped images are picked alone.
//!
//! CRITICAL: packages only exist for selected options. Call
//! `retain_selected` after every selection change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{ConfigOption, GalleryImage, OptionId};
use crate::selection::SelectionState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackageError {
    #[error("Option {option} has no gallery image {index}")]
    NoSuchImage { option: OptionId, index: usize },
}

/// Images of `gallery` that belong to the same package as `gallery[index]`
pub fn expand_package(gallery: &[GalleryImage], index: usize) -> Option<Vec<GalleryImage>> {
    let chosen = gallery.get(index)?;
    let images = match chosen.package() {
        Some(group) => gallery
            .iter()
            .filter(|img| img.package() == Some(group))
            .cloned()
            .collect(),
        None => vec![chosen.clone()],
    };
    Some(images)
}

/// Option -> picked gallery images
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignSelections {
    picks: BTreeMap<OptionId, Vec<GalleryImage>>,
}

impl DesignSelections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn for_option(&self, option: OptionId) -> &[GalleryImage] {
        self.picks.get(&option).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_picked(&self, option: OptionId, url: &str) -> bool {
        self.for_option(option).iter().any(|img| img.url == url)
    }

    /// Replace the option's package with the one containing image `index`
    pub fn pick(&mut self, option: &ConfigOption, index: usize) -> Result<&[GalleryImage], PackageError> {
        let images = expand_package(&option.gallery, index).ok_or(PackageError::NoSuchImage {
            option: option.id,
            index,
        })?;
        debug!(option = %option.id, images = images.len(), "design package picked");
        let slot = self.picks.entry(option.id).or_default();
        *slot = images;
        Ok(slot.as_slice())
    }

    /// Returns whether the option had a package
    pub fn clear(&mut self, option: OptionId) -> bool {
        self.picks.remove(&option).is_some()
    }

    /// Drop packages whose option is no longer selected; returns those options
    pub fn retain_selected(&mut self, selection: &SelectionState) -> Vec<OptionId> {
        let stale: Vec<OptionId> = self
            .picks
            .keys()
            .copied()
            .filter(|id| !selection.is_selected(*id))
            .collect();
        for id in &stale {
            self.picks.remove(id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{OptionSetId, Placement};

    fn image(url: &str, group: Option<&str>) -> GalleryImage {
        GalleryImage {
            url: url.to_string(),
            group: group.map(str::to_string),
            description: None,
        }
    }

    fn cabinets() -> ConfigOption {
        ConfigOption {
            id: OptionId(7),
            name: "Cabinets".to_string(),
            code: None,
            option_set_id: OptionSetId(1),
            position: 0,
            thumbnail: None,
            overlay_image: None,
            placement: Placement::default(),
            layer_order: 0,
            requirements: vec![],
            conflicts: vec![],
            gallery: vec![
                image("oak-1.jpg", Some("Oak")),
                image("loose.jpg", None),
                image("oak-2.jpg", Some("Oak")),
                image("misc.jpg", Some("Uncategorized")),
                image("maple.jpg", Some("Maple")),
            ],
            hotspot: None,
        }
    }

    #[test]
    fn test_grouped_image_picks_whole_package() {
        let option = cabinets();
        let urls: Vec<String> = expand_package(&option.gallery, 2)
            .unwrap()
            .into_iter()
            .map(|i| i.url)
            .collect();
        assert_eq!(urls, vec!["oak-1.jpg", "oak-2.jpg"]);
    }

    #[test]
    fn test_uncategorized_image_picked_alone() {
        let option = cabinets();
        assert_eq!(expand_package(&option.gallery, 3).unwrap(), vec![image("misc.jpg", Some("Uncategorized"))]);
        assert_eq!(expand_package(&option.gallery, 1).unwrap(), vec![image("loose.jpg", None)]);
        assert_eq!(expand_package(&option.gallery, 9), None);
    }

    #[test]
    fn test_pick_replaces_previous_package() {
        let option = cabinets();
        let mut designs = DesignSelections::new();
        designs.pick(&option, 0).unwrap();
        designs.pick(&option, 4).unwrap();
        assert_eq!(designs.for_option(OptionId(7)), &[image("maple.jpg", Some("Maple"))]);
        assert!(!designs.is_picked(OptionId(7), "oak-1.jpg"));

        let err = designs.pick(&option, 5).unwrap_err();
        assert_eq!(err, PackageError::NoSuchImage { option: OptionId(7), index: 5 });
    }

    #[test]
    fn test_deselected_options_lose_packages() {
        let option = cabinets();
        let mut designs = DesignSelections::new();
        designs.pick(&option, 0).unwrap();

        let mut selection = SelectionState::new();
        selection.append(OptionSetId(1), OptionId(7));
        assert!(designs.retain_selected(&selection).is_empty());

        selection.remove(OptionSetId(1), OptionId(7));
        assert_eq!(designs.retain_selected(&selection), vec![OptionId(7)]);
        assert!(designs.is_empty());
    }
}
