use std::collections::BTreeSet;

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    Normal,
    /// Rows show a checkbox and can be marked for deletion
    Editing,
}

/// Rows marked for batch deletion. Holds indices only; acting on them is up to the caller.
#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    mode: SelectionMode,
    selected: BTreeSet<usize>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        self.mode == SelectionMode::Editing
    }

    pub fn enter_editing(&mut self) {
        self.mode = SelectionMode::Editing;
    }

    /// Back to normal mode; the selection is dropped
    pub fn exit_editing(&mut self) {
        self.mode = SelectionMode::Normal;
        self.selected.clear();
    }

    /// Flip the row's mark and return whether it is now selected.
    /// Ignored outside editing mode.
    pub fn toggle(&mut self, index: usize) -> bool {
        if !self.is_editing() {
            debug!("Ignoring selection toggle on row {} outside editing mode", index);
            return false;
        }
        if self.selected.remove(&index) {
            false
        } else {
            self.selected.insert(index)
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn selected_indices(&self) -> BTreeSet<usize> {
        self.selected.clone()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Mark rows `0..count`
    pub fn select_all(&mut self, count: usize) {
        if !self.is_editing() {
            return;
        }
        self.selected = (0..count).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }
}
