//! Candidate code extraction and normalization
//!
//! Pulls one identifier string out of a row mapping via a closed, ordered
//! list of common column-name spellings, falling back to the row's first
//! column. Failures here drop the row, never the batch.

use veritag_common::types::{ErrorCode, RowError};

use super::parser::RowRecord;
use super::{MAX_CODE_LENGTH, MIN_CODE_LENGTH};

/// Column-name aliases checked in priority order
pub const CODE_KEY_ALIASES: [&str; 8] = [
    "code",
    "Code",
    "CODE",
    "auth_code",
    "authCode",
    "AuthCode",
    "authentication_code",
    "Authentication Code",
];

/// Extract and normalize the identifier candidate from one row.
///
/// The trimmed value must be non-empty and within the inclusive length
/// bounds. An alias that matches a column wins even when the cell is empty;
/// only when no alias column exists does the first column value apply.
pub fn extract_code(record: &RowRecord) -> Result<String, RowError> {
    let raw = CODE_KEY_ALIASES
        .iter()
        .find_map(|key| record.get(key))
        .or_else(|| record.first_value())
        .unwrap_or("");

    let code = raw.trim();

    if code.is_empty() {
        return Err(RowError::new(
            record.row,
            ErrorCode::EmptyCode,
            "Empty or missing code",
        ));
    }

    let length = code.chars().count();
    if length < MIN_CODE_LENGTH || length > MAX_CODE_LENGTH {
        return Err(RowError::new(
            record.row,
            ErrorCode::InvalidLength,
            format!(
                "Code length {} outside allowed range {}-{}",
                length, MIN_CODE_LENGTH, MAX_CODE_LENGTH
            ),
        ));
    }

    Ok(code.to_string())
}
