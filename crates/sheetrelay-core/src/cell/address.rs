//! Cell address and range types

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A cell address (e.g., "A1", "$B$2")
///
/// Rows and columns are 0-based internally and 1-based / lettered in display.
/// The `$` markers are remembered so a parsed address prints back the way it
/// was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    /// Row index (0-based internally, 1-based in display)
    pub row: u32,
    /// Column index (0-based, A=0, B=1, ..., XFD=16383)
    pub col: u16,
    /// Whether the row reference is absolute ($)
    pub row_absolute: bool,
    /// Whether the column reference is absolute ($)
    pub col_absolute: bool,
}

impl CellAddress {
    /// Create a new cell address with relative references
    pub fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: false,
            col_absolute: false,
        }
    }

    /// Create an absolute cell address ($A$1 style)
    pub fn absolute(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: true,
            col_absolute: true,
        }
    }

    /// Parse a cell address from A1-style notation
    ///
    /// # Examples
    /// ```
    /// use sheetrelay_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("$B$2").unwrap();
    /// assert_eq!((addr.row, addr.col), (1, 1));
    /// assert!(addr.row_absolute && addr.col_absolute);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }

        let (col, col_absolute, rest) = split_column(s)?;
        let Some(col) = col else {
            return Err(Error::InvalidAddress(format!("no column letters in '{s}'")));
        };
        let (row, row_absolute) = parse_row(rest, s)?;

        Ok(Self {
            row,
            col,
            row_absolute,
            col_absolute,
        })
    }

    /// Convert column index to letters (0 = A, 25 = Z, 26 = AA, etc.)
    pub fn column_to_letters(col: u16) -> String {
        let mut result = String::new();
        let mut n = col as u32 + 1;

        while n > 0 {
            n -= 1;
            let c = ((n % 26) as u8 + b'A') as char;
            result.insert(0, c);
            n /= 26;
        }

        result
    }

    /// Convert column letters to index (A = 0, Z = 25, AA = 26, etc.)
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() {
            return Err(Error::InvalidAddress("empty column letters".into()));
        }
        // XFD is three letters; anything longer overflows before the bounds check.
        if letters.len() > 3 {
            return Err(Error::InvalidAddress(format!(
                "column '{letters}' is beyond XFD"
            )));
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!("invalid column letter '{c}'")));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }

        let col = col - 1;
        if col >= MAX_COLS as u32 {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
        }

        Ok(col as u16)
    }

    /// Format as A1-style string, keeping the `$` markers
    pub fn to_a1_string(&self) -> String {
        let mut result = String::new();
        if self.col_absolute {
            result.push('$');
        }
        result.push_str(&Self::column_to_letters(self.col));
        if self.row_absolute {
            result.push('$');
        }
        result.push_str(&(self.row + 1).to_string());
        result
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split off the optional `$` and column letters. Returns the remaining text.
fn split_column(s: &str) -> Result<(Option<u16>, bool, &str)> {
    let bytes = s.as_bytes();
    let mut pos = 0;

    let absolute = bytes.first() == Some(&b'$')
        && bytes.get(1).is_some_and(|b| b.is_ascii_alphabetic());
    if absolute {
        pos += 1;
    }

    let start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
        pos += 1;
    }

    if pos == start {
        return Ok((None, false, s));
    }

    let col = CellAddress::letters_to_column(&s[start..pos])?;
    Ok((Some(col), absolute, &s[pos..]))
}

/// Parse an optional `$` followed by a 1-based row number.
fn parse_row(s: &str, whole: &str) -> Result<(u32, bool)> {
    let (absolute, digits) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    if digits.is_empty() {
        return Err(Error::InvalidAddress(format!("no row number in '{whole}'")));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAddress(format!(
            "invalid row number in '{whole}'"
        )));
    }

    let row: u32 = digits
        .parse()
        .map_err(|_| Error::RowOutOfBounds(u32::MAX, MAX_ROWS - 1))?;

    if row == 0 {
        return Err(Error::InvalidAddress(format!(
            "row number must be >= 1 in '{whole}'"
        )));
    }

    let row = row - 1;
    if row >= MAX_ROWS {
        return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
    }

    Ok((row, absolute))
}

/// A rectangular range of cells (e.g., "A1:B10", "C:C", "3:5")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Start address (top-left)
    pub start: CellAddress,
    /// End address (bottom-right)
    pub end: CellAddress,
}

impl CellRange {
    /// Create a new cell range, normalized so `start` is the top-left corner
    pub fn new(start: CellAddress, end: CellAddress) -> Self {
        let (start_row, end_row) = (start.row.min(end.row), start.row.max(end.row));
        let (start_col, end_col) = (start.col.min(end.col), start.col.max(end.col));

        Self {
            start: CellAddress {
                row: start_row,
                col: start_col,
                ..start
            },
            end: CellAddress {
                row: end_row,
                col: end_col,
                ..end
            },
        }
    }

    /// Create a range from row/column indices
    pub fn from_indices(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    /// Parse a range: `A1`, `A1:B10`, `$A$1:$B$10`, whole columns (`A:C`) or
    /// whole rows (`2:4`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidRange("empty range".into()));
        }

        let Some((left, right)) = s.split_once(':') else {
            let cell = CellAddress::parse(s)?;
            return Ok(Self { start: cell, end: cell });
        };

        if right.contains(':') {
            return Err(Error::InvalidRange(format!("too many ':' in '{s}'")));
        }

        match (split_column(left.trim())?, split_column(right.trim())?) {
            // Whole columns: A:C
            ((Some(c1), abs1, ""), (Some(c2), abs2, "")) => Ok(Self::new(
                CellAddress {
                    row: 0,
                    col: c1,
                    row_absolute: abs1,
                    col_absolute: abs1,
                },
                CellAddress {
                    row: MAX_ROWS - 1,
                    col: c2,
                    row_absolute: abs2,
                    col_absolute: abs2,
                },
            )),
            // Whole rows: 2:4
            ((None, _, r1), (None, _, r2)) => {
                let (r1, abs1) = parse_row(r1, s)?;
                let (r2, abs2) = parse_row(r2, s)?;
                Ok(Self::new(
                    CellAddress {
                        row: r1,
                        col: 0,
                        row_absolute: abs1,
                        col_absolute: abs1,
                    },
                    CellAddress {
                        row: r2,
                        col: MAX_COLS - 1,
                        row_absolute: abs2,
                        col_absolute: abs2,
                    },
                ))
            }
            _ => {
                let start = CellAddress::parse(left)
                    .map_err(|e| Error::InvalidRange(format!("'{s}': {e}")))?;
                let end = CellAddress::parse(right)
                    .map_err(|e| Error::InvalidRange(format!("'{s}': {e}")))?;
                Ok(Self::new(start, end))
            }
        }
    }

    /// Get the number of rows in the range
    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Get the number of columns in the range
    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    /// True when the range spans every row of its columns (`A:A`)
    pub fn is_whole_columns(&self) -> bool {
        self.start.row == 0 && self.end.row == MAX_ROWS - 1
    }

    /// True when the range spans every column of its rows (`1:1`)
    pub fn is_whole_rows(&self) -> bool {
        self.start.col == 0 && self.end.col == MAX_COLS - 1
    }

    /// Format as A1:B10, keeping the `$` markers of the parsed input. Whole
    /// columns and whole rows print collapsed (`A:C`, `$2:$4`).
    pub fn to_a1_string(&self) -> String {
        let dollar = |absolute: bool| if absolute { "$" } else { "" };
        if self.is_whole_columns() && !self.is_whole_rows() {
            return format!(
                "{}{}:{}{}",
                dollar(self.start.col_absolute),
                CellAddress::column_to_letters(self.start.col),
                dollar(self.end.col_absolute),
                CellAddress::column_to_letters(self.end.col)
            );
        }
        if self.is_whole_rows() && !self.is_whole_columns() {
            return format!(
                "{}{}:{}{}",
                dollar(self.start.row_absolute),
                self.start.row + 1,
                dollar(self.end.row_absolute),
                self.end.row + 1
            );
        }
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start.to_a1_string(), self.end.to_a1_string())
        }
    }

    /// Format the way a spreadsheet application reports a range address:
    /// fully absolute, with whole rows/columns collapsed (`$A$1:$B$2`, `$C:$C`, `$3:$3`).
    pub fn to_absolute_string(&self) -> String {
        if self.is_whole_columns() && !self.is_whole_rows() {
            return format!(
                "${}:${}",
                CellAddress::column_to_letters(self.start.col),
                CellAddress::column_to_letters(self.end.col)
            );
        }
        if self.is_whole_rows() && !self.is_whole_columns() {
            return format!("${}:${}", self.start.row + 1, self.end.row + 1);
        }

        let start = CellAddress::absolute(self.start.row, self.start.col);
        let end = CellAddress::absolute(self.end.row, self.end.col);
        if start == end {
            start.to_a1_string()
        } else {
            format!("{start}:{end}")
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
