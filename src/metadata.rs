use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::models::RawSheet;

/// File-level grade/class/term declared in the sheet banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub grade: u32,
    pub class: u32,
    pub semester: Option<u32>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            grade: 1,
            class: 1,
            semester: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeClass {
    pub grade: Option<u32>,
    pub class: Option<u32>,
}

/// One place to look for banner text. Strategies run in order and the
/// first one whose candidates parse wins.
pub struct Strategy {
    pub name: &'static str,
    candidates: fn(&RawSheet) -> Vec<String>,
}

pub const STRATEGIES: [Strategy; 3] = [
    Strategy {
        name: "banner cell A3",
        candidates: banner_cell,
    },
    Strategy {
        name: "grid A1:E8",
        candidates: grid_window,
    },
    Strategy {
        name: "row array 10x8",
        candidates: row_window,
    },
];

fn banner_cell(sheet: &RawSheet) -> Vec<String> {
    sheet
        .grid
        .as_ref()
        .and_then(|grid| grid.get("A", 3))
        .map(|cell| cell.display())
        .into_iter()
        .collect()
}

fn grid_window(sheet: &RawSheet) -> Vec<String> {
    let Some(grid) = sheet.grid.as_ref() else {
        return Vec::new();
    };
    let mut texts = Vec::new();
    for row in 1..=8 {
        for column in ["A", "B", "C", "D", "E"] {
            if let Some(cell) = grid.get(column, row) {
                texts.push(cell.display());
            }
        }
    }
    texts
}

// Needed when the decoder drops leading blank cells and the grid is absent.
fn row_window(sheet: &RawSheet) -> Vec<String> {
    sheet
        .rows
        .iter()
        .take(10)
        .flat_map(|row| row.iter().take(8))
        .filter(|cell| cell.is_present())
        .map(|cell| cell.text())
        .collect()
}

/// Runs the strategies in order; returns the parsed value and the name of
/// the strategy that produced it.
pub fn scan<T>(
    sheet: &RawSheet,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<(T, &'static str)> {
    STRATEGIES.iter().find_map(|strategy| {
        (strategy.candidates)(sheet)
            .iter()
            .find_map(|text| parse(text.as_str()))
            .map(|value| (value, strategy.name))
    })
}

fn capture_positive(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|value| *value > 0)
}

/// Reads "1학년 3반"-style text. Either half on its own is enough.
pub fn parse_grade_class(text: &str) -> Option<GradeClass> {
    static GRADE_RE: OnceLock<Regex> = OnceLock::new();
    static CLASS_RE: OnceLock<Regex> = OnceLock::new();
    let grade_re = GRADE_RE.get_or_init(|| Regex::new(r"(\d+)\s*학년").expect("valid regex"));
    let class_re = CLASS_RE.get_or_init(|| Regex::new(r"(\d+)\s*반").expect("valid regex"));

    let grade = capture_positive(grade_re, text);
    let class = capture_positive(class_re, text);
    if grade.is_none() && class.is_none() {
        return None;
    }
    Some(GradeClass { grade, class })
}

pub fn parse_semester(text: &str) -> Option<u32> {
    static SEMESTER_RE: OnceLock<Regex> = OnceLock::new();
    let re = SEMESTER_RE.get_or_init(|| Regex::new(r"(\d+)\s*학기").expect("valid regex"));
    capture_positive(re, text)
}

pub fn extract_metadata(sheet: &RawSheet) -> Metadata {
    let mut metadata = Metadata::default();

    match scan(sheet, parse_grade_class) {
        Some((found, source)) => {
            metadata.grade = found.grade.unwrap_or(metadata.grade);
            metadata.class = found.class.unwrap_or(metadata.class);
            debug!(grade = metadata.grade, class = metadata.class, source, "grade/class found");
        }
        None => debug!("no grade/class banner, using defaults"),
    }

    if let Some((semester, source)) = scan(sheet, parse_semester) {
        metadata.semester = Some(semester);
        debug!(semester, source, "semester found");
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellGrid, CellValue, GridCell};

    fn grid_with(cells: &[(&str, u32, &str)]) -> CellGrid {
        let mut grid = CellGrid::default();
        for (column, row, text) in cells {
            let col = crate::models::column_index(column).unwrap();
            grid.insert(
                row - 1,
                col,
                GridCell {
                    formatted: Some(text.to_string()),
                    raw: CellValue::from(*text),
                },
            );
        }
        grid
    }

    #[test]
    fn parses_grade_and_class_fragments() {
        assert_eq!(
            parse_grade_class("2025학년도 1학년 3반"),
            Some(GradeClass { grade: Some(2025), class: Some(3) })
        );
        assert_eq!(
            parse_grade_class("1 학년  3 반"),
            Some(GradeClass { grade: Some(1), class: Some(3) })
        );
        assert_eq!(
            parse_grade_class("5반"),
            Some(GradeClass { grade: None, class: Some(5) })
        );
        assert_eq!(parse_grade_class("성적일람표"), None);
        assert_eq!(parse_semester("2024학년도 2학기"), Some(2));
        assert_eq!(parse_semester("학기"), None);
    }

    #[test]
    fn banner_cell_wins_over_later_strategies() {
        let sheet = RawSheet::new(vec![vec![CellValue::from("3학년 9반")]])
            .with_grid(grid_with(&[("A", 3, "2학년 4반 1학기"), ("B", 1, "3학년 9반")]));
        let metadata = extract_metadata(&sheet);
        assert_eq!(metadata, Metadata { grade: 2, class: 4, semester: Some(1) });
    }

    #[test]
    fn banner_prefers_formatted_text_over_raw_value() {
        let mut grid = CellGrid::default();
        grid.insert(
            2,
            0,
            GridCell {
                formatted: Some("3학년 7반 2학기".to_string()),
                raw: CellValue::Number(45000.0),
            },
        );
        let metadata = extract_metadata(&RawSheet::new(Vec::new()).with_grid(grid));
        assert_eq!(metadata, Metadata { grade: 3, class: 7, semester: Some(2) });

        let mut raw_only = CellGrid::default();
        raw_only.insert(
            2,
            0,
            GridCell {
                formatted: None,
                raw: CellValue::from("2학년 5반"),
            },
        );
        let metadata = extract_metadata(&RawSheet::new(Vec::new()).with_grid(raw_only));
        assert_eq!(metadata, Metadata { grade: 2, class: 5, semester: None });
    }

    #[test]
    fn grid_window_is_scanned_row_major() {
        let sheet = RawSheet::new(Vec::new())
            .with_grid(grid_with(&[("E", 2, "1학년 7반"), ("C", 5, "3학년 1반")]));
        let metadata = extract_metadata(&sheet);
        assert_eq!(metadata.grade, 1);
        assert_eq!(metadata.class, 7);
    }

    #[test]
    fn falls_back_to_row_array_without_grid() {
        let sheet = RawSheet::new(vec![
            vec![CellValue::from("학업성적관리")],
            vec![CellValue::Empty, CellValue::from("2학년 5반 2학기")],
        ]);
        assert_eq!(
            extract_metadata(&sheet),
            Metadata { grade: 2, class: 5, semester: Some(2) }
        );
    }

    #[test]
    fn missing_banner_defaults_to_first_class() {
        let sheet = RawSheet::new(vec![vec![CellValue::from("번호"), CellValue::from("성명")]]);
        assert_eq!(extract_metadata(&sheet), Metadata::default());
    }
}
