//! Sheet-qualified references (`Sheet1!A1`, `'Q1 Data'!A1:B2`)
//!
//! Sheet names that contain spaces or punctuation are wrapped in single quotes,
//! with embedded quotes doubled (`'Bob''s Sheet'!A1`).

use crate::cell::CellRange;
use crate::error::{Error, Result};
use crate::MAX_SHEET_NAME_LEN;
use std::fmt;

/// A range, optionally qualified with the sheet it lives on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetReference {
    /// Sheet qualifier, unquoted
    pub sheet: Option<String>,
    /// The range on that sheet
    pub range: CellRange,
}

impl SheetReference {
    /// Parse `[sheet!]range`
    pub fn parse(s: &str) -> Result<Self> {
        let (sheet, address) = split_sheet_qualifier(s)?;
        let range = CellRange::parse(address)?;
        Ok(Self { sheet, range })
    }
}

impl fmt::Display for SheetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "{}!{}", quote_sheet_name(sheet), self.range),
            None => write!(f, "{}", self.range),
        }
    }
}

/// Split an address into its optional sheet qualifier and the remainder.
///
/// `"A1"` yields `(None, "A1")`; `"'It''s'!B2"` yields `(Some("It's"), "B2")`.
/// The remainder is returned untouched, it is not validated here.
pub fn split_sheet_qualifier(s: &str) -> Result<(Option<String>, &str)> {
    let s = s.trim();

    if let Some(quoted) = s.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c != '\'' {
                name.push(c);
                continue;
            }
            if let Some((_, '\'')) = chars.peek() {
                name.push('\'');
                chars.next();
                continue;
            }
            // closing quote; must be followed by '!'
            let rest = &quoted[i + 1..];
            let Some(address) = rest.strip_prefix('!') else {
                return Err(Error::InvalidAddress(format!(
                    "expected '!' after quoted sheet name in '{s}'"
                )));
            };
            validate_sheet_name(&name)?;
            return Ok((Some(name), address));
        }
        return Err(Error::InvalidAddress(format!(
            "unterminated sheet name quote in '{s}'"
        )));
    }

    match s.rsplit_once('!') {
        Some((sheet, address)) => {
            validate_sheet_name(sheet)?;
            Ok((Some(sheet.to_string()), address))
        }
        None => Ok((None, s)),
    }
}

/// Quote a sheet name for use in a reference when it needs quoting.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn validate_sheet_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidSheetName("empty sheet name".into()));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(Error::InvalidSheetName(format!(
            "'{name}' is longer than {MAX_SHEET_NAME_LEN} characters"
        )));
    }
    if let Some(c) = name.chars().find(|c| "[]:*?/\\".contains(*c)) {
        return Err(Error::InvalidSheetName(format!(
            "'{name}' contains '{c}'"
        )));
    }
    Ok(())
}
