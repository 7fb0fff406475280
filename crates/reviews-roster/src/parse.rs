//! Roster CSV parsing.
//!
//! The worksheet headers are fixed but may arrive with surrounding quotes
//! or a leading byte-order mark, so header lookup is substring-based. Rows
//! whose 2GIS id is blank, a `null`/`none` literal, or not all digits are
//! dropped with a warning.

use reviews_core::models::RosterBranch;
use tracing::warn;

pub const NAME_HEADER: &str = "Название точки";
pub const BRANCH_ID_HEADER: &str = "ИД 2gist";
pub const STEADY_ID_HEADER: &str = "ИД steady";
pub const IIKO_ID_HEADER: &str = "id_iiko";

/// Parse roster rows from CSV bytes. A UTF-8 BOM, if present, is stripped
/// before parsing.
pub fn parse_roster_csv(bytes: &[u8], delimiter: u8) -> Result<Vec<RosterBranch>, csv::Error> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let name_col = find_column(&headers, NAME_HEADER);
    let id_col = find_column(&headers, BRANCH_ID_HEADER);
    let steady_col = find_column(&headers, STEADY_ID_HEADER);
    let iiko_col = find_column(&headers, IIKO_ID_HEADER);

    let (Some(name_col), Some(id_col)) = (name_col, id_col) else {
        warn!("roster is missing the name or 2GIS id column");
        return Ok(Vec::new());
    };

    let mut branches = Vec::new();
    for record in reader.records() {
        let record = record?;
        let name = cell(&record, name_col);
        let branch_id = cell(&record, id_col);

        if name.is_empty() {
            continue;
        }
        if !is_present(&branch_id) {
            warn!(branch = %name, "roster row skipped: no 2GIS id");
            continue;
        }
        if !branch_id.chars().all(|c| c.is_ascii_digit()) {
            warn!(branch = %name, id = %branch_id, "roster row skipped: non-numeric 2GIS id");
            continue;
        }

        branches.push(RosterBranch {
            branch_id,
            name,
            id_steady: steady_col.map(|c| cell(&record, c)).filter(|v| is_present(v)),
            id_iiko: iiko_col.map(|c| cell(&record, c)).filter(|v| is_present(v)),
        });
    }
    Ok(branches)
}

fn find_column(headers: &csv::StringRecord, needle: &str) -> Option<usize> {
    headers.iter().position(|h| h.contains(needle))
}

fn cell(record: &csv::StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or("").trim().to_owned()
}

fn is_present(value: &str) -> bool {
    !value.is_empty() && !matches!(value.to_lowercase().as_str(), "null" | "none")
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Название точки;ИД 2gist;ИД steady;id_iiko\n";

    #[test]
    fn parses_valid_rows() {
        let csv = format!(
            "{HEADER}Центральный;70000001057699052;st-1;ik-1\nАэропорт;70000001057699053;;\n"
        );
        let rows = parse_roster_csv(csv.as_bytes(), b';').unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].branch_id, "70000001057699052");
        assert_eq!(rows[0].id_steady.as_deref(), Some("st-1"));
        assert_eq!(rows[0].id_iiko.as_deref(), Some("ik-1"));
        assert_eq!(rows[1].id_steady, None);
    }

    #[test]
    fn drops_null_and_non_numeric_ids() {
        let csv = format!(
            "{HEADER}Без ид;;;\nНулевой;null;;\nНоне;NONE;;\nБуквы;abc123;;\nЖивой;42;;\n"
        );
        let rows = parse_roster_csv(csv.as_bytes(), b';').unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Живой");
    }

    #[test]
    fn tolerates_byte_order_mark() {
        let csv = format!("\u{feff}{HEADER}Точка;123;;\n");
        let rows = parse_roster_csv(csv.as_bytes(), b';').unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].branch_id, "123");
    }

    #[test]
    fn comma_delimiter_for_remote_export() {
        let csv = "Название точки,ИД 2gist,ИД steady,id_iiko\nТочка,123,,ik\n";
        let rows = parse_roster_csv(csv.as_bytes(), b',').unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id_iiko.as_deref(), Some("ik"));
    }

    #[test]
    fn missing_required_headers_yields_empty() {
        let rows = parse_roster_csv(b"foo;bar\n1;2\n", b';').unwrap();
        assert!(rows.is_empty());
    }
}
