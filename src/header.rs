use tracing::{debug, warn};

use crate::models::{CellValue, ColumnMap};

/// Rows searched for the first table header.
pub const HEADER_SCAN_ROWS: usize = 15;
/// Header row assumed when nothing in the scan window qualifies.
pub const DEFAULT_HEADER_ROW: usize = 3;

pub const NUMBER_TOKEN: &str = "번호";
pub const NAME_TOKEN: &str = "성명";
const MARK_TOKENS: [&str; 3] = ["원점수", "과목평균", "성취도"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Number,
    Name,
    Grade,
    Semester,
    SubjectCategory,
    SubjectName,
    Score,
    Achievement,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Number,
        Field::Name,
        Field::Grade,
        Field::Semester,
        Field::SubjectCategory,
        Field::SubjectName,
        Field::Score,
        Field::Achievement,
    ];

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Field::Number => &["번호"],
            Field::Name => &["성명"],
            Field::Grade => &["학년"],
            Field::Semester => &["학기"],
            Field::SubjectCategory => &["교과"],
            Field::SubjectName => &["과목"],
            Field::Score => &["원점수", "과목평균"],
            Field::Achievement => &["성취도"],
        }
    }

    fn slot(self, map: &mut ColumnMap) -> &mut usize {
        match self {
            Field::Number => &mut map.number,
            Field::Name => &mut map.name,
            Field::Grade => &mut map.grade,
            Field::Semester => &mut map.semester,
            Field::SubjectCategory => &mut map.subject_category,
            Field::SubjectName => &mut map.subject_name,
            Field::Score => &mut map.score,
            Field::Achievement => &mut map.achievement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    pub row: usize,
    pub columns: ColumnMap,
    pub detected: bool,
}

fn compact_row(row: &[CellValue]) -> Vec<String> {
    row.iter().map(CellValue::compact).collect()
}

fn is_name_token(text: &str) -> bool {
    text == NAME_TOKEN || text.starts_with("성명(")
}

/// A header row names the number and name columns exactly and carries at
/// least one score/achievement column.
pub fn is_header_row(row: &[CellValue]) -> bool {
    let cells = compact_row(row);
    let has_number = cells.iter().any(|cell| cell == NUMBER_TOKEN);
    let has_name = cells.iter().any(|cell| is_name_token(cell));
    let has_marks = cells
        .iter()
        .any(|cell| MARK_TOKENS.iter().any(|token| cell.contains(token)));
    has_number && has_name && has_marks
}

/// Re-maps the fields whose keyword appears in `row`; the rest keep the
/// positions from `base`.
pub fn map_columns(row: &[CellValue], base: ColumnMap) -> ColumnMap {
    let cells = compact_row(row);
    let mut columns = base;
    for field in Field::ALL {
        let found = cells.iter().position(|cell| {
            let cell = cell.to_lowercase();
            field.keywords().iter().any(|keyword| cell.contains(keyword))
        });
        if let Some(index) = found {
            *field.slot(&mut columns) = index;
        }
    }
    columns
}

pub fn locate_header(rows: &[Vec<CellValue>]) -> HeaderLocation {
    let found = rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| is_header_row(row));

    match found {
        Some(row) => {
            let columns = map_columns(&rows[row], ColumnMap::default());
            debug!(row, ?columns, "header row detected");
            HeaderLocation {
                row,
                columns,
                detected: true,
            }
        }
        None => {
            warn!(
                row = DEFAULT_HEADER_ROW,
                "no header row found, assuming default column layout"
            );
            HeaderLocation {
                row: DEFAULT_HEADER_ROW,
                columns: ColumnMap::default(),
                detected: false,
            }
        }
    }
}
