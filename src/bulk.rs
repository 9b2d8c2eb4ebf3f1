use crate::effect::{DomEffect, add_class, hide, remove_class, set_text, show};
use crate::markup::{SELECTED_ROW_CLASS, Target};
use crate::util::pluralize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkEvent {
    ItemChanged { index: usize, checked: bool },
    SelectAllChanged { checked: bool },
}

/// Bulk-delete selection over a table of `.checkbox-item` rows.
///
/// The bulk-actions bar is visible, and the column headers hidden, exactly
/// when at least one item is checked.
#[derive(Debug, Clone)]
pub struct BulkSelection {
    checked: Vec<bool>,
    bulk_actions_visible: bool,
}

impl BulkSelection {
    pub fn new(items: usize) -> Self {
        Self {
            checked: vec![false; items],
            bulk_actions_visible: false,
        }
    }

    pub fn handle(&mut self, event: BulkEvent) -> Vec<DomEffect> {
        match event {
            BulkEvent::ItemChanged { index, checked } => self.item_changed(index, checked),
            BulkEvent::SelectAllChanged { checked } => self.select_all(checked),
        }
    }

    pub fn checked_count(&self) -> usize {
        self.checked.iter().filter(|c| **c).count()
    }

    pub fn bulk_actions_visible(&self) -> bool {
        self.bulk_actions_visible
    }

    fn item_changed(&mut self, index: usize, checked: bool) -> Vec<DomEffect> {
        let Some(slot) = self.checked.get_mut(index) else {
            warn!(index, items = self.checked.len(), "Ignoring change for unknown checkbox item");
            return Vec::new();
        };
        *slot = checked;

        let count = self.checked_count();
        let mut effects = Vec::with_capacity(4);

        if checked {
            effects.push(add_class(Target::Row(index), SELECTED_ROW_CLASS));
            if !self.bulk_actions_visible {
                effects.push(hide(Target::ColHeader));
                effects.push(show(Target::BulkActions));
                self.bulk_actions_visible = true;
            }
        } else {
            effects.push(remove_class(Target::Row(index), SELECTED_ROW_CLASS));
            if count == 0 && self.bulk_actions_visible {
                effects.push(hide(Target::BulkActions));
                effects.push(show(Target::ColHeader));
                self.bulk_actions_visible = false;
            }
        }

        effects.push(set_text(Target::ScopeFirstOption, scope_label(count)));
        effects
    }

    /// Set every item and replay each item's own change handling.
    fn select_all(&mut self, checked: bool) -> Vec<DomEffect> {
        let mut effects = Vec::new();
        for index in 0..self.checked.len() {
            effects.push(DomEffect::SetChecked {
                target: Target::CheckboxItem(index),
                checked,
            });
            effects.extend(self.item_changed(index, checked));
        }
        effects
    }
}

/// `"3 selected items"`, `"1 selected item"`
pub fn scope_label(count: usize) -> String {
    let count = count as i64;
    format!("{count} selected {}", pluralize("item", count))
}
