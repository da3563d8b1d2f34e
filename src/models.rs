use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// One decoded cell as the spreadsheet reader hands it over.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(value) => value.clone(),
            CellValue::Number(value) => value.to_string(),
            CellValue::Bool(value) => value.to_string(),
        }
    }

    /// Empty, whitespace-only, numeric zero and `false` all count as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(value) => value.trim().is_empty(),
            CellValue::Number(value) => *value == 0.0 || value.is_nan(),
            CellValue::Bool(value) => !value,
        }
    }

    pub fn is_present(&self) -> bool {
        !self.is_blank()
    }

    /// Text with all whitespace removed, used for token comparisons.
    pub fn compact(&self) -> String {
        self.text().chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Lenient integer read: "3학년" yields 3, "학년" yields nothing.
    pub fn leading_int(&self) -> Option<i64> {
        match self {
            CellValue::Number(value) if value.is_finite() => Some(value.trunc() as i64),
            CellValue::Text(value) => leading_int(value),
            _ => None,
        }
    }

    /// Leading integer restricted to strictly positive values.
    pub fn positive_int(&self) -> Option<u32> {
        self.leading_int()
            .filter(|value| *value > 0)
            .and_then(|value| u32::try_from(value).ok())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

pub fn leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(|value| value * sign)
}

/// A cell addressed directly by position, carrying the formatted text when
/// the reader produced one alongside the raw value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridCell {
    pub formatted: Option<String>,
    pub raw: CellValue,
}

impl GridCell {
    pub fn display(&self) -> String {
        match &self.formatted {
            Some(text) => text.clone(),
            None => self.raw.text(),
        }
    }
}

/// Absolute A1-style lookup over a worksheet, independent of the row array
/// (which may start at an offset when leading cells are blank).
#[derive(Debug, Clone, Default)]
pub struct CellGrid {
    cells: HashMap<(u32, u32), GridCell>,
}

impl CellGrid {
    /// `row` and `col` are zero-based.
    pub fn insert(&mut self, row: u32, col: u32, cell: GridCell) {
        self.cells.insert((row, col), cell);
    }

    /// Looks up `column` letters (e.g. "A", "AB") at a 1-based `row`.
    pub fn get(&self, column: &str, row: u32) -> Option<&GridCell> {
        let col = column_index(column)?;
        let row = row.checked_sub(1)?;
        self.cells.get(&(row, col))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }
}

pub fn column_index(column: &str) -> Option<u32> {
    if column.is_empty() {
        return None;
    }
    let mut index: u32 = 0;
    for c in column.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub rows: Vec<Vec<CellValue>>,
    pub grid: Option<CellGrid>,
}

impl RawSheet {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows, grid: None }
    }

    pub fn with_grid(mut self, grid: CellGrid) -> Self {
        self.grid = Some(grid);
        self
    }
}

/// Column positions of the logical fields of a grade table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMap {
    pub number: usize,
    pub name: usize,
    pub grade: usize,
    pub semester: usize,
    pub subject_category: usize,
    pub subject_name: usize,
    pub score: usize,
    pub achievement: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            number: 0,
            name: 1,
            grade: 2,
            semester: 3,
            subject_category: 4,
            subject_name: 5,
            score: 6,
            achievement: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AchievementLevel {
    A,
    B,
    C,
    D,
    E,
    P,
}

impl AchievementLevel {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            'E' => Some(Self::E),
            'P' => Some(Self::P),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::P => "P",
        }
    }
}

impl fmt::Display for AchievementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw score and subject average, always read together from one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePair {
    pub original: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub level: AchievementLevel,
    pub cohort_size: Option<u32>,
}

/// Subject name qualified by the term it was taken in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubjectKey {
    pub name: String,
    pub grade: u32,
    pub semester: u32,
}

/// File-wide subject identity; also the merge key across files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubjectId {
    pub category: String,
    pub name: String,
    pub grade: u32,
    pub semester: u32,
}

impl SubjectId {
    pub fn term_key(&self) -> SubjectKey {
        SubjectKey {
            name: self.name.clone(),
            grade: self.grade,
            semester: self.semester,
        }
    }

    pub fn display_name(&self) -> String {
        display_name(&self.name, self.grade, self.semester)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.category, self.name, self.grade, self.semester
        )
    }
}

pub fn display_name(name: &str, grade: u32, semester: u32) -> String {
    format!("{name}({grade}-{semester})")
}

/// Student identity inside one file. Same number with another name is a
/// different student.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StudentId {
    pub number: u32,
    pub name: String,
}

/// Student identity across files. Names are deliberately not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StudentKey {
    pub grade: u32,
    pub class: u32,
    pub number: u32,
}

impl fmt::Display for StudentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.grade, self.class, self.number)
    }
}

impl FromStr for StudentKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.trim().split('-').collect();
        let [grade, class, number] = parts.as_slice() else {
            return Err(format!("expected GRADE-CLASS-NUMBER, got {value:?}"));
        };
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid number {part:?} in {value:?}"))
        };
        Ok(Self {
            grade: parse(grade)?,
            class: parse(class)?,
            number: parse(number)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject_category: String,
    pub subject_name: String,
    pub score: Option<ScorePair>,
    pub achievement: Option<Achievement>,
    pub grade: u32,
    pub semester: u32,
}

impl SubjectScore {
    pub fn original_score(&self) -> Option<f64> {
        self.score.map(|pair| pair.original)
    }

    pub fn achievement_level(&self) -> Option<AchievementLevel> {
        self.achievement.map(|a| a.level)
    }

    pub fn display_name(&self) -> String {
        display_name(&self.subject_name, self.grade, self.semester)
    }

    pub fn key(&self) -> SubjectKey {
        SubjectKey {
            name: self.subject_name.clone(),
            grade: self.grade,
            semester: self.semester,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub number: u32,
    pub name: String,
    pub grade: u32,
    pub class: u32,
    pub subjects: BTreeMap<SubjectKey, SubjectScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    #[serde(flatten)]
    pub id: SubjectId,
    pub display_name: String,
    pub scores: Vec<f64>,
    pub averages: Vec<f64>,
    pub class_average: f64,
    pub score_average: f64,
}

impl SubjectSummary {
    pub fn new(id: SubjectId) -> Self {
        let display_name = id.display_name();
        Self {
            id,
            display_name,
            scores: Vec::new(),
            averages: Vec::new(),
            class_average: 0.0,
            score_average: 0.0,
        }
    }
}

/// Flattened student row consumed by the cross-file merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEntry {
    pub number: u32,
    pub name: String,
    pub grade: u32,
    pub class: u32,
    pub scores: BTreeMap<String, f64>,
    pub achievements: BTreeMap<String, String>,
    pub average_score: f64,
    pub total_subjects: usize,
}

impl StudentEntry {
    pub fn key(&self) -> StudentKey {
        StudentKey {
            grade: self.grade,
            class: self.class,
            number: self.number,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub file_name: String,
    pub grade: u32,
    pub class: u32,
    pub students: Vec<StudentRecord>,
    pub subjects: Vec<SubjectSummary>,
    pub students_array: Vec<StudentEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSubject {
    #[serde(flatten)]
    pub id: SubjectId,
    pub display_name: String,
    pub scores: Vec<f64>,
    pub averages: Vec<f64>,
    pub class_averages: Vec<f64>,
    pub score_averages: Vec<f64>,
    pub average: f64,
    pub score_average: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedDataset {
    pub subjects: Vec<CombinedSubject>,
    pub students: Vec<StudentEntry>,
    pub file_names: Vec<String>,
    pub grades: Vec<u32>,
    pub classes: Vec<String>,
}

impl CombinedDataset {
    pub fn student(&self, key: StudentKey) -> Option<&StudentEntry> {
        self.students.iter().find(|s| s.key() == key)
    }
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
