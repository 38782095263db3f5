//! Capture grid: categories, points and the slots they flatten into.
//!
//! Slots are ordered category-major, point-minor. Position `i` in the flat
//! ordering is the slot index used everywhere else (events, file names,
//! deletion).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{CaptureError, ConfigError};

/// One inspection category and its number of photo points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub points: u32,
    /// Pass criteria printed next to the category in the report
    #[serde(default)]
    pub criteria: Option<String>,
}

impl Category {
    pub fn new(name: impl Into<String>, points: u32) -> Self {
        Self {
            name: name.into(),
            points,
            criteria: None,
        }
    }

    /// Category name reduced to characters that are safe in a file name
    pub fn file_prefix(&self) -> String {
        self.name
            .trim()
            .chars()
            .filter_map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    Some(c)
                } else if c.is_whitespace() {
                    Some('_')
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Where a slot sits in the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotPosition {
    pub index: usize,
    pub category_index: usize,
    pub category: String,
    /// 1-based point number within the category
    pub point: u32,
}

/// Validated, immutable grid layout for one configuration profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    categories: Vec<Category>,
    offsets: Vec<usize>,
    total: usize,
}

impl Layout {
    pub fn new(categories: Vec<Category>) -> Result<Self, ConfigError> {
        if categories.is_empty() {
            return Err(ConfigError::InvalidLayout(
                "at least one category is required".into(),
            ));
        }

        let mut prefixes = HashSet::new();
        for category in &categories {
            if category.points == 0 {
                return Err(ConfigError::InvalidLayout(format!(
                    "category '{}' has no points",
                    category.name
                )));
            }
            let prefix = category.file_prefix();
            if prefix.is_empty() {
                return Err(ConfigError::InvalidLayout(format!(
                    "category '{}' has no usable characters for file names",
                    category.name
                )));
            }
            if !prefixes.insert(prefix.clone()) {
                return Err(ConfigError::InvalidLayout(format!(
                    "categories collide on file prefix '{}'",
                    prefix
                )));
            }
        }

        let mut offsets = Vec::with_capacity(categories.len());
        let mut total = 0usize;
        for category in &categories {
            offsets.push(total);
            total += category.points as usize;
        }

        Ok(Self {
            categories,
            offsets,
            total,
        })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Sum of the point counts of all categories
    pub fn total_slots(&self) -> usize {
        self.total
    }

    pub fn position(&self, index: usize) -> Option<SlotPosition> {
        if index >= self.total {
            return None;
        }
        // offsets are ascending, so the owning category is the last one
        // starting at or before `index`
        let category_index = self.offsets.partition_point(|&start| start <= index) - 1;
        let category = &self.categories[category_index];
        Some(SlotPosition {
            index,
            category_index,
            category: category.name.clone(),
            point: (index - self.offsets[category_index]) as u32 + 1,
        })
    }

    /// Canonical file stem `{category}_{point}` for a slot
    pub fn file_stem(&self, index: usize) -> Option<String> {
        let position = self.position(index)?;
        let prefix = self.categories[position.category_index].file_prefix();
        Some(format!("{}_{}", prefix, position.point))
    }
}

/// Handle to a stored capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRef {
    pub path: PathBuf,
    pub point: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Filled(SlotRef),
}

impl Slot {
    pub fn is_filled(&self) -> bool {
        matches!(self, Slot::Filled(_))
    }

    pub fn reference(&self) -> Option<&SlotRef> {
        match self {
            Slot::Filled(reference) => Some(reference),
            Slot::Empty => None,
        }
    }
}

/// Fixed-size table of capture slots.
///
/// There is no stored fill counter; counts are always derived from the
/// slots themselves.
#[derive(Debug, Clone)]
pub struct SlotTable {
    layout: Arc<Layout>,
    slots: Vec<Slot>,
}

impl SlotTable {
    pub fn new(layout: Arc<Layout>) -> Self {
        let slots = vec![Slot::Empty; layout.total_slots()];
        Self { layout, slots }
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    pub fn total_slots(&self) -> usize {
        self.slots.len()
    }

    /// Lowest-ordered empty slot, or `None` when the table is full
    pub fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.is_filled())
    }

    /// Store `reference` in an empty slot
    pub fn fill(&mut self, index: usize, reference: SlotRef) -> Result<(), CaptureError> {
        let total = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(CaptureError::InvalidSlot { index, total })?;

        if slot.is_filled() {
            return Err(CaptureError::SlotOccupied { index });
        }
        *slot = Slot::Filled(reference);
        Ok(())
    }

    /// Empty a slot, returning what it held (`None` if it was already empty)
    pub fn clear(&mut self, index: usize) -> Result<Option<SlotRef>, CaptureError> {
        let total = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(CaptureError::InvalidSlot { index, total })?;

        match std::mem::replace(slot, Slot::Empty) {
            Slot::Filled(reference) => Ok(Some(reference)),
            Slot::Empty => Ok(None),
        }
    }

    /// Forget every capture without touching stored files
    pub fn clear_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = Slot::Empty);
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_filled()).count()
    }

    pub fn is_full(&self) -> bool {
        self.filled_count() == self.total_slots()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }
}
