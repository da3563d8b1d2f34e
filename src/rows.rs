use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, trace};

use crate::cells::{is_non_subject_cell, is_page_artifact_row, parse_achievement, parse_score};
use crate::header::{is_header_row, map_columns, NAME_TOKEN, NUMBER_TOKEN};
use crate::metadata::Metadata;
use crate::models::{
    Achievement, CellValue, ColumnMap, RawSheet, ScorePair, StudentId, StudentRecord,
    SubjectId, SubjectScore, SubjectSummary,
};

/// Grade or semester column of one row. Vertically merged cells leave it
/// blank; text that does not start with a number is unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermCell {
    Blank,
    Value(u32),
    Unreadable,
}

impl TermCell {
    fn read(cell: &CellValue) -> Self {
        if cell.is_blank() {
            return TermCell::Blank;
        }
        match cell.positive_int() {
            Some(value) => TermCell::Value(value),
            None => TermCell::Unreadable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectCells {
    /// Only set when the row itself carries the category.
    pub category: Option<String>,
    pub name: String,
    pub score: Option<ScorePair>,
    pub achievement: Option<Achievement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    /// Set when the row opens (or re-opens) a student.
    pub student: Option<StudentId>,
    pub grade: TermCell,
    pub semester: TermCell,
    pub subject: Option<SubjectCells>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowClass {
    Ignorable,
    HeaderRowDetected,
    PageArtifactDetected,
    Data(DataRow),
}

fn cell<'a>(row: &'a [CellValue], index: usize) -> &'a CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    row.get(index).unwrap_or(&EMPTY)
}

fn present_text(cell: &CellValue) -> Option<String> {
    cell.is_present().then(|| cell.text())
}

/// Decides what a row means under the active column layout. Pure: all
/// carried context is applied later by [`RowPass::step`].
pub fn classify_row(row: &[CellValue], columns: &ColumnMap) -> RowClass {
    if row.iter().all(CellValue::is_blank) {
        return RowClass::Ignorable;
    }
    if is_header_row(row) {
        return RowClass::HeaderRowDetected;
    }
    if is_page_artifact_row(row) {
        return RowClass::PageArtifactDetected;
    }

    let number_cell = cell(row, columns.number);
    let mut student = None;
    if number_cell.is_present() && number_cell.compact() != NUMBER_TOKEN {
        if let Some(number) = number_cell.positive_int() {
            let name = present_text(cell(row, columns.name))
                .unwrap_or_else(|| format!("학생{number}"));
            let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
            if compact == NAME_TOKEN {
                return RowClass::Ignorable;
            }
            student = Some(StudentId { number, name });
        }
    }

    let name_cell = cell(row, columns.subject_name);
    let subject = (name_cell.is_present() && !is_non_subject_cell(name_cell)).then(|| {
        let score_cell = cell(row, columns.score);
        let achievement_cell = cell(row, columns.achievement);
        SubjectCells {
            category: present_text(cell(row, columns.subject_category)),
            name: name_cell.text(),
            score: score_cell
                .is_present()
                .then(|| parse_score(&score_cell.text()))
                .flatten(),
            achievement: achievement_cell
                .is_present()
                .then(|| parse_achievement(&achievement_cell.text()))
                .flatten(),
        }
    });

    RowClass::Data(DataRow {
        student,
        grade: TermCell::read(cell(row, columns.grade)),
        semester: TermCell::read(cell(row, columns.semester)),
        subject,
    })
}

/// Accumulator threaded through the rows of one sheet: carried context plus
/// the records collected so far.
#[derive(Debug)]
pub struct RowPass {
    defaults: Metadata,
    columns: ColumnMap,
    current_student: Option<usize>,
    current_grade: Option<u32>,
    current_semester: Option<u32>,
    last_category: Option<String>,
    students: Vec<StudentRecord>,
    student_index: HashMap<StudentId, usize>,
    subjects: Vec<SubjectSummary>,
    subject_index: HashSet<SubjectId>,
    pub sections: usize,
    pub page_rows: usize,
}

impl RowPass {
    pub fn new(defaults: Metadata, columns: ColumnMap) -> Self {
        Self {
            defaults,
            columns,
            current_student: None,
            current_grade: Some(defaults.grade),
            current_semester: defaults.semester,
            last_category: None,
            students: Vec::new(),
            student_index: HashMap::new(),
            subjects: Vec::new(),
            subject_index: HashSet::new(),
            sections: 1,
            page_rows: 0,
        }
    }

    pub fn step(mut self, index: usize, row: &[CellValue]) -> Self {
        match classify_row(row, &self.columns) {
            RowClass::Ignorable => {}
            RowClass::HeaderRowDetected => {
                self.columns = map_columns(row, self.columns);
                self.last_category = None;
                self.sections += 1;
                debug!(row = index + 1, columns = ?self.columns, "section header re-detected");
            }
            RowClass::PageArtifactDetected => {
                self.page_rows += 1;
                trace!(row = index + 1, "page marker row skipped");
            }
            RowClass::Data(data) => self.apply(index, data),
        }
        self
    }

    fn apply(&mut self, index: usize, data: DataRow) {
        if let Some(id) = data.student {
            self.current_student = Some(self.open_student(id));
        }

        if data.grade != TermCell::Blank {
            self.current_grade = term_value(data.grade);
        }
        if data.semester != TermCell::Blank {
            self.current_semester = term_value(data.semester);
        }

        let Some(subject) = data.subject else {
            return;
        };
        let Some(category) = subject.category.clone().or_else(|| self.last_category.clone())
        else {
            return;
        };
        let Some(student_index) = self.current_student else {
            return;
        };
        let grade = match data.grade {
            TermCell::Blank => Some(self.current_grade.unwrap_or(self.defaults.grade)),
            other => term_value(other),
        };
        let semester = match data.semester {
            TermCell::Blank => Some(
                self.current_semester
                    .or(self.defaults.semester)
                    .unwrap_or(1),
            ),
            other => term_value(other),
        };
        let (Some(grade), Some(semester)) = (grade, semester) else {
            return;
        };

        let score = SubjectScore {
            subject_category: category.clone(),
            subject_name: subject.name.clone(),
            score: subject.score,
            achievement: subject.achievement,
            grade,
            semester,
        };
        trace!(
            row = index + 1,
            student = %self.students[student_index].name,
            subject = %score.display_name(),
            "subject row"
        );
        self.students[student_index]
            .subjects
            .insert(score.key(), score);

        let id = SubjectId {
            category,
            name: subject.name,
            grade,
            semester,
        };
        if self.subject_index.insert(id.clone()) {
            self.subjects.push(SubjectSummary::new(id));
        }

        if subject.category.is_some() {
            self.last_category = subject.category;
        }
    }

    fn open_student(&mut self, id: StudentId) -> usize {
        if let Some(&existing) = self.student_index.get(&id) {
            return existing;
        }
        let position = self.students.len();
        self.students.push(StudentRecord {
            number: id.number,
            name: id.name.clone(),
            grade: self.defaults.grade,
            class: self.defaults.class,
            subjects: BTreeMap::new(),
        });
        self.student_index.insert(id, position);
        position
    }

    pub fn into_parts(self) -> (Vec<StudentRecord>, Vec<SubjectSummary>) {
        (self.students, self.subjects)
    }
}

fn term_value(cell: TermCell) -> Option<u32> {
    match cell {
        TermCell::Value(value) => Some(value),
        TermCell::Blank | TermCell::Unreadable => None,
    }
}

/// Runs the single sequential pass over the rows below `header_row`.
pub fn run_rows(
    sheet: &RawSheet,
    header_row: usize,
    columns: ColumnMap,
    defaults: Metadata,
) -> RowPass {
    sheet
        .rows
        .iter()
        .enumerate()
        .skip(header_row + 1)
        .fold(RowPass::new(defaults, columns), |pass, (index, row)| {
            pass.step(index, row)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AchievementLevel, SubjectKey};

    fn row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    fn defaults() -> Metadata {
        Metadata {
            grade: 1,
            class: 3,
            semester: None,
        }
    }

    fn run(rows: Vec<Vec<CellValue>>) -> RowPass {
        let sheet = RawSheet::new(rows);
        run_rows(&sheet, 0, ColumnMap::default(), defaults())
    }

    fn key(name: &str, grade: u32, semester: u32) -> SubjectKey {
        SubjectKey {
            name: name.to_string(),
            grade,
            semester,
        }
    }

    #[test]
    fn classifies_a_full_student_row() {
        let class = classify_row(
            &row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            &ColumnMap::default(),
        );
        let RowClass::Data(data) = class else {
            panic!("expected a data row");
        };
        assert_eq!(
            data.student,
            Some(StudentId { number: 1, name: "홍길동".to_string() })
        );
        assert_eq!(data.grade, TermCell::Value(1));
        let subject = data.subject.unwrap();
        assert_eq!(subject.category.as_deref(), Some("국어"));
        assert_eq!(subject.score, Some(ScorePair { original: 79.0, average: 83.8 }));
        assert_eq!(subject.achievement.unwrap().level, AchievementLevel::B);
    }

    #[test]
    fn classifies_markers_and_fragments() {
        let columns = ColumnMap::default();
        assert_eq!(classify_row(&row(&["1 / 37"]), &columns), RowClass::PageArtifactDetected);
        assert_eq!(classify_row(&row(&["", " "]), &columns), RowClass::Ignorable);
        assert_eq!(classify_row(&row(&["3", "성 명"]), &columns), RowClass::Ignorable);
        assert_eq!(
            classify_row(&row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수"]), &columns),
            RowClass::HeaderRowDetected
        );
    }

    #[test]
    fn continuation_rows_attach_to_the_current_student() {
        let pass = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["", "", "", "", "수학", "수학Ⅰ", "88/70.1", "A(195)"]),
            row(&["", "", "", "", "", "확률과 통계", "65/60", "C(120)"]),
            row(&["", "", "", "2", "", "미적분", "90/72", "A(80)"]),
        ]);
        let (students, subjects) = pass.into_parts();
        assert_eq!(students.len(), 1);
        let student = &students[0];
        assert_eq!(student.grade, 1);
        assert_eq!(student.class, 3);
        assert_eq!(student.subjects.len(), 4);

        let stats = &student.subjects[&key("확률과 통계", 1, 1)];
        assert_eq!(stats.subject_category, "수학");
        let calculus = &student.subjects[&key("미적분", 1, 2)];
        assert_eq!(calculus.subject_category, "수학");
        assert_eq!(calculus.original_score(), Some(90.0));

        let names: Vec<&str> = subjects.iter().map(|s| s.id.name.as_str()).collect();
        assert_eq!(names, vec!["국어", "수학Ⅰ", "확률과 통계", "미적분"]);
    }

    #[test]
    fn page_marker_rows_do_not_touch_students() {
        let pass = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["1 / 37"]),
            row(&["", "", "", "", "", "", "", ""]),
        ]);
        assert_eq!(pass.page_rows, 1);
        let (students, subjects) = pass.into_parts();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].subjects.len(), 1);
        assert_eq!(subjects.len(), 1);
    }

    #[test]
    fn same_number_with_another_name_is_another_student() {
        let (students, _) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["1", "김철수", "1", "1", "국어", "국어", "91/83.8", "A(195)"]),
            row(&["1", "홍길동", "1", "1", "영어", "영어", "70/65", "C(195)"]),
        ])
        .into_parts();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].name, "홍길동");
        assert_eq!(students[0].subjects.len(), 2);
        assert_eq!(students[1].name, "김철수");
    }

    #[test]
    fn missing_name_gets_a_placeholder() {
        let (students, _) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["7", "", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
        ])
        .into_parts();
        assert_eq!(students[0].name, "학생7");
    }

    #[test]
    fn new_section_keeps_term_columns_it_does_not_name() {
        let (students, subjects) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["번호", "성명", "과목", "성취도"]),
            row(&["1", "홍길동", "체육", "P"]),
        ])
        .into_parts();
        // Grade/semester keep their old indices, which now hold the subject
        // and the achievement: both are unreadable, so nothing is recorded.
        assert_eq!(students[0].subjects.len(), 1);
        assert_eq!(subjects.len(), 1);
    }

    #[test]
    fn section_header_clears_the_carried_category() {
        let pass = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["2", "김", "1", "1", "", "영어", "70/60", "C(195)"]),
        ]);
        assert_eq!(pass.sections, 2);
        let (students, subjects) = pass.into_parts();

        assert_eq!(students.len(), 2);
        assert_eq!(students[1].name, "김");
        assert!(students[1].subjects.is_empty());
        let keys: Vec<String> = subjects.iter().map(|s| s.id.to_string()).collect();
        assert_eq!(keys, vec!["국어_국어_1_1"]);
    }

    #[test]
    fn category_carries_within_a_section() {
        let (students, subjects) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["2", "김", "1", "1", "", "영어", "70/60", "C(195)"]),
        ])
        .into_parts();
        assert_eq!(students[1].subjects[&key("영어", 1, 1)].subject_category, "국어");
        assert_eq!(subjects.len(), 2);
    }

    #[test]
    fn new_section_with_category_column_is_read_with_new_layout() {
        let (students, _) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["번호", "성명", "교과", "과목", "성취도", "학년", "학기"]),
            row(&["1", "홍길동", "체육", "체육", "P", "1", "2"]),
        ])
        .into_parts();
        let pe = &students[0].subjects[&key("체육", 1, 2)];
        assert_eq!(pe.achievement_level(), Some(AchievementLevel::P));
        assert_eq!(pe.original_score(), None);
    }

    #[test]
    fn unreadable_term_cell_skips_the_subject() {
        let (students, subjects) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "가", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["", "", "", "", "수학", "수학", "80/70", "B(195)"]),
        ])
        .into_parts();
        // The unreadable grade also clears the carried grade, so the next row
        // falls back to the file default.
        assert_eq!(students[0].subjects.len(), 1);
        assert!(students[0].subjects.contains_key(&key("수학", 1, 1)));
        assert_eq!(subjects.len(), 1);
    }

    #[test]
    fn last_occurrence_of_a_subject_key_wins() {
        let (students, subjects) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
            row(&["", "", "", "", "국어", "국어", "85/83.8", "B(195)"]),
        ])
        .into_parts();
        assert_eq!(
            students[0].subjects[&key("국어", 1, 1)].original_score(),
            Some(85.0)
        );
        assert_eq!(subjects.len(), 1);
    }

    #[test]
    fn rows_before_any_student_are_dropped() {
        let (students, subjects) = run(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["", "", "1", "1", "국어", "국어", "79/83.8", "B(195)"]),
        ])
        .into_parts();
        assert!(students.is_empty());
        assert!(subjects.is_empty());
    }

    #[test]
    fn semester_defaults_to_sheet_value_then_first_term() {
        let sheet = RawSheet::new(vec![
            row(&["번호", "성명", "학년", "학기", "교과", "과목", "원점수/과목평균", "성취도"]),
            row(&["1", "홍길동", "", "", "국어", "국어", "79/83.8", "B(195)"]),
        ]);
        let with_banner = Metadata {
            grade: 2,
            class: 1,
            semester: Some(2),
        };
        let (students, _) =
            run_rows(&sheet, 0, ColumnMap::default(), with_banner).into_parts();
        assert!(students[0].subjects.contains_key(&key("국어", 2, 2)));

        let (students, _) = run_rows(&sheet, 0, ColumnMap::default(), defaults()).into_parts();
        assert!(students[0].subjects.contains_key(&key("국어", 1, 1)));
    }
}
