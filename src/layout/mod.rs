//! Layout Model
//!
//! Plain data describing where each dashboard widget sits on the grid.
//! A [`Layout`] is an ordered list of [`LayoutItem`]s; placement is driven by
//! the grid coordinates, not by list order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A full layout snapshot.
pub type Layout = Vec<LayoutItem>;

/// Placement record for a single widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutItem {
    /// Unique identifier, stable across edits.
    pub id: String,

    /// Grid column.
    pub x: u32,

    /// Grid row.
    pub y: u32,

    /// Width in grid cells.
    pub w: u32,

    /// Height in grid cells.
    pub h: u32,

    /// Widget type identifier (e.g. "sales-chart").
    pub component: String,

    /// Opaque widget configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Value>,

    /// Pinned widgets cannot be moved or resized by the grid.
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resizable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
}

impl LayoutItem {
    /// Create an item at the given position and size with no props or flags.
    pub fn new(id: impl Into<String>, component: impl Into<String>, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            w,
            h,
            component: component.into(),
            props: None,
            is_static: None,
            resizable: None,
            draggable: None,
        }
    }

    /// Attach widget configuration.
    pub fn with_props(mut self, props: serde_json::Value) -> Self {
        self.props = Some(props);
        self
    }

    /// Mark the item as static (not draggable or resizable).
    pub fn pinned(mut self) -> Self {
        self.is_static = Some(true);
        self
    }

    /// Whether the item is pinned in place.
    pub fn is_pinned(&self) -> bool {
        self.is_static.unwrap_or(false)
    }

    /// Whether two items cover at least one common grid cell.
    pub fn overlaps(&self, other: &LayoutItem) -> bool {
        if self.w == 0 || self.h == 0 || other.w == 0 || other.h == 0 {
            return false;
        }
        self.x < other.x.saturating_add(other.w)
            && other.x < self.x.saturating_add(self.w)
            && self.y < other.y.saturating_add(other.h)
            && other.y < self.y.saturating_add(self.h)
    }
}

/// Partial update for a [`LayoutItem`].
///
/// Every field except `id` can be patched; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Value>,
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resizable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
}

impl LayoutItemPatch {
    /// Patch that moves an item.
    pub fn position(x: u32, y: u32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Patch that resizes an item.
    pub fn size(w: u32, h: u32) -> Self {
        Self {
            w: Some(w),
            h: Some(h),
            ..Self::default()
        }
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to an item in place.
    pub fn apply(&self, item: &mut LayoutItem) {
        if let Some(x) = self.x {
            item.x = x;
        }
        if let Some(y) = self.y {
            item.y = y;
        }
        if let Some(w) = self.w {
            item.w = w;
        }
        if let Some(h) = self.h {
            item.h = h;
        }
        if let Some(component) = &self.component {
            item.component = component.clone();
        }
        if let Some(props) = &self.props {
            item.props = Some(props.clone());
        }
        if self.is_static.is_some() {
            item.is_static = self.is_static;
        }
        if self.resizable.is_some() {
            item.resizable = self.resizable;
        }
        if self.draggable.is_some() {
            item.draggable = self.draggable;
        }
    }
}

/// Ids that occur more than once, in first-repeat order.
pub fn duplicate_ids(layout: &[LayoutItem]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for item in layout {
        if !seen.insert(item.id.as_str()) && !duplicates.contains(&item.id) {
            duplicates.push(item.id.clone());
        }
    }
    duplicates
}

/// Number of grid rows the layout occupies.
pub fn grid_height(layout: &[LayoutItem]) -> u32 {
    layout
        .iter()
        .map(|item| item.y.saturating_add(item.h))
        .max()
        .unwrap_or(0)
}
