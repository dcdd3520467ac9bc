//! Defined names
//!
//! A defined name is a workbook-level alias for a reference, e.g. `TaxRate`
//! referring to `Inputs!$B$1`. Names may also be scoped to a single sheet, in
//! which case callers spell them `Inputs!TaxRate`.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reference::{quote_sheet_name, split_sheet_qualifier};

/// A named range definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRange {
    /// The name as defined (case preserved, matched case-insensitively)
    pub name: String,
    /// Sheet the name is local to, `None` for workbook scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// What the name refers to, e.g. `Sheet1!$A$1:$D$10`
    pub refers_to: String,
}

impl NamedRange {
    /// Create a workbook-scoped name
    pub fn workbook_scope(name: impl Into<String>, refers_to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sheet: None,
            refers_to: refers_to.into(),
        }
    }

    /// Create a name local to `sheet`
    pub fn sheet_scope(
        name: impl Into<String>,
        refers_to: impl Into<String>,
        sheet: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            sheet: Some(sheet.into()),
            refers_to: refers_to.into(),
        }
    }

    /// The name as a caller would type it (`Total` or `Inputs!Rate`)
    pub fn display_name(&self) -> String {
        match &self.sheet {
            Some(sheet) => format!("{}!{}", quote_sheet_name(sheet), self.name),
            None => self.name.clone(),
        }
    }

    /// The reference without a leading `=`
    pub fn expression(&self) -> &str {
        self.refers_to.strip_prefix('=').unwrap_or(&self.refers_to)
    }
}

/// Collection of defined names with case-insensitive lookup
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<NamedRange>", into = "Vec<NamedRange>")]
pub struct NamedRangeCollection {
    ranges: AHashMap<String, NamedRange>,
}

impl NamedRangeCollection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    fn make_key(name: &str, sheet: Option<&str>) -> String {
        match sheet {
            Some(sheet) => format!("{}!{}", sheet.to_lowercase(), name.to_lowercase()),
            None => name.to_lowercase(),
        }
    }

    /// Define a new name. Fails if the name already exists in the same scope.
    pub fn define(&mut self, range: NamedRange) -> Result<()> {
        validate_name(&range.name)?;
        let key = Self::make_key(&range.name, range.sheet.as_deref());
        if self.ranges.contains_key(&key) {
            return Err(Error::DuplicateName(range.display_name()));
        }
        self.ranges.insert(key, range);
        Ok(())
    }

    /// Look a name up the way a caller spells it: `Total` for workbook scope,
    /// `Sheet1!Total` for a sheet-local name.
    pub fn find(&self, spelled: &str) -> Option<&NamedRange> {
        match split_sheet_qualifier(spelled) {
            Ok((sheet, name)) => self.ranges.get(&Self::make_key(name, sheet.as_deref())),
            Err(_) => None,
        }
    }

    /// Remove a name
    pub fn remove(&mut self, spelled: &str) -> Option<NamedRange> {
        let (sheet, name) = split_sheet_qualifier(spelled).ok()?;
        self.ranges.remove(&Self::make_key(name, sheet.as_deref()))
    }

    /// Display names in sorted order, at most `limit` of them
    pub fn display_names(&self, limit: usize) -> Vec<String> {
        let mut names: Vec<String> = self.ranges.values().map(NamedRange::display_name).collect();
        names.sort_by_key(|n| n.to_lowercase());
        names.truncate(limit);
        names
    }

    /// Iterate over all names
    pub fn iter(&self) -> impl Iterator<Item = &NamedRange> {
        self.ranges.values()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl From<Vec<NamedRange>> for NamedRangeCollection {
    fn from(ranges: Vec<NamedRange>) -> Self {
        let ranges = ranges
            .into_iter()
            .map(|r| (Self::make_key(&r.name, r.sheet.as_deref()), r))
            .collect();
        Self { ranges }
    }
}

impl From<NamedRangeCollection> for Vec<NamedRange> {
    fn from(collection: NamedRangeCollection) -> Self {
        let mut ranges: Vec<NamedRange> = collection.ranges.into_iter().map(|(_, r)| r).collect();
        ranges.sort_by(|a, b| a.display_name().cmp(&b.display_name()));
        ranges
    }
}

/// Names start with a letter, `_` or `\`, contain no spaces, and must not
/// look like a cell reference (`A1`, `XFD100`).
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '\\');
    let rest_ok = chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '\\');
    if !first_ok || !rest_ok {
        return Err(Error::InvalidName(name.to_string()));
    }
    if crate::cell::CellAddress::parse(name).is_ok() {
        return Err(Error::InvalidName(format!("'{name}' looks like a cell reference")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut coll = NamedRangeCollection::new();
        coll.define(NamedRange::workbook_scope("TaxRate", "Inputs!$B$1"))
            .unwrap();

        assert!(coll.find("taxrate").is_some());
        assert!(coll.find("TAXRATE").is_some());
        assert!(coll
            .define(NamedRange::workbook_scope("TAXRATE", "Inputs!$B$2"))
            .is_err());
    }

    #[test]
    fn test_sheet_scoped_names() {
        let mut coll = NamedRangeCollection::new();
        coll.define(NamedRange::workbook_scope("Rate", "=Inputs!$B$1"))
            .unwrap();
        coll.define(NamedRange::sheet_scope("Rate", "Q1!$C$1", "Q1"))
            .unwrap();

        assert_eq!(coll.find("Rate").unwrap().expression(), "Inputs!$B$1");
        assert_eq!(coll.find("q1!rate").unwrap().refers_to, "Q1!$C$1");
        assert!(coll.find("Q2!Rate").is_none());
        assert_eq!(coll.display_names(10), vec!["Q1!Rate", "Rate"]);
    }

    #[test]
    fn test_invalid_names() {
        let mut coll = NamedRangeCollection::new();
        assert!(coll.define(NamedRange::workbook_scope("A1", "x")).is_err());
        assert!(coll.define(NamedRange::workbook_scope("has space", "x")).is_err());
        assert!(coll.define(NamedRange::workbook_scope("1st", "x")).is_err());
    }

    #[test]
    fn test_display_names_limit() {
        let names: Vec<NamedRange> = (0..15)
            .map(|i| NamedRange::workbook_scope(format!("Name_{i:02}"), "Sheet1!$A$1"))
            .collect();
        let coll = NamedRangeCollection::from(names);
        let listed = coll.display_names(10);
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0], "Name_00");
    }
}
