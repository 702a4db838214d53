//! In-memory model of a validated workbook
//!
//! Holds the sheets returned by validation, the set of sheets the user opted
//! out of, and the sheet currently shown in the preview. No I/O.

use std::collections::BTreeSet;

use crate::error::{ImportError, ImportResult};
use crate::models::{RowRecord, SheetDescriptor};

#[derive(Debug, Clone, Default)]
pub struct SheetRegistry {
    sheets: Vec<SheetDescriptor>,
    excluded: BTreeSet<String>,
    selected: usize,
    filename: Option<String>,
}

impl SheetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current sheets, clearing exclusions and selection.
    ///
    /// An empty sheet list is rejected and leaves the registry untouched.
    pub fn load(&mut self, sheets: Vec<SheetDescriptor>, filename: impl Into<String>) -> ImportResult<()> {
        if sheets.is_empty() {
            return Err(ImportError::Validation(
                "workbook contains no importable sheets".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for sheet in &sheets {
            if !seen.insert(sheet.name.as_str()) {
                return Err(ImportError::Validation(format!(
                    "duplicate sheet name '{}'",
                    sheet.name
                )));
            }
        }

        self.sheets = sheets;
        self.excluded.clear();
        self.selected = 0;
        self.filename = Some(filename.into());
        Ok(())
    }

    /// Select a sheet for preview and return its preview rows
    pub fn select(&mut self, index: usize) -> ImportResult<&[RowRecord]> {
        if index >= self.sheets.len() {
            return Err(ImportError::IndexOutOfRange {
                index,
                len: self.sheets.len(),
            });
        }
        self.selected = index;
        Ok(&self.sheets[index].preview)
    }

    /// Flip a sheet's membership in the exclusion set.
    ///
    /// Returns `true` if the sheet is excluded after the call.
    pub fn toggle_exclusion(&mut self, name: &str) -> ImportResult<bool> {
        if !self.sheets.iter().any(|s| s.name == name) {
            return Err(ImportError::UnknownSheet(name.to_string()));
        }

        if self.excluded.remove(name) {
            Ok(false)
        } else {
            self.excluded.insert(name.to_string());
            Ok(true)
        }
    }

    /// Sheets minus exclusions, in workbook order. This is the import work list.
    pub fn included_sheets(&self) -> Vec<&SheetDescriptor> {
        self.sheets
            .iter()
            .filter(|s| !self.excluded.contains(&s.name))
            .collect()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }

    pub fn has_exclusions(&self) -> bool {
        !self.excluded.is_empty()
    }

    pub fn excluded_names(&self) -> Vec<String> {
        self.excluded.iter().cloned().collect()
    }

    pub fn sheets(&self) -> &[SheetDescriptor] {
        &self.sheets
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}
