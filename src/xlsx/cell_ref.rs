//! A1-style cell references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest column Excel addresses (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;

/// Largest row Excel addresses.
pub const MAX_ROW: u32 = 1_048_576;

/// A cell position, both coordinates 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    /// Column, `A` = 1
    pub column: u32,
    /// Row, first row = 1
    pub row: u32,
}

impl CellRef {
    /// Create a reference from 1-based coordinates.
    pub fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Parse `B5`, `aa10` or `$C$3`.
    ///
    /// ```
    /// use varsync::xlsx::CellRef;
    ///
    /// let cell = CellRef::parse("AB12")?;
    /// assert_eq!((cell.column, cell.row), (28, 12));
    /// # Ok::<(), varsync::Error>(())
    /// ```
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || Error::ValidationFailed(format!("invalid cell reference: {:?}", reference));

        let s: String = reference.trim().chars().filter(|&c| c != '$').collect();
        let split = s.find(|c: char| !c.is_ascii_alphabetic()).ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);

        if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut column: u32 = 0;
        for b in letters.bytes() {
            let value = u32::from(b.to_ascii_uppercase() - b'A') + 1;
            column = column
                .checked_mul(26)
                .and_then(|c| c.checked_add(value))
                .ok_or_else(invalid)?;
        }
        let row: u32 = digits.parse().map_err(|_| invalid())?;

        if column > MAX_COLUMN || row == 0 || row > MAX_ROW {
            return Err(invalid());
        }
        Ok(Self { column, row })
    }

    /// The same row, `n` columns to the right.
    pub fn right(self, n: u32) -> Self {
        Self {
            column: self.column + n,
            row: self.row,
        }
    }

    /// The same column, `n` rows down.
    pub fn down(self, n: u32) -> Self {
        Self {
            column: self.column,
            row: self.row + n,
        }
    }
}

/// Column letters for a 1-based column index: 1 → `A`, 27 → `AA`.
pub fn column_letters(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.column), self.row)
    }
}

impl FromStr for CellRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
