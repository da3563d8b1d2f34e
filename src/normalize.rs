use std::collections::BTreeMap;

use tracing::info;

use crate::header::locate_header;
use crate::metadata::extract_metadata;
use crate::models::{mean, ParsedFile, RawSheet, StudentEntry, StudentRecord, SubjectSummary};
use crate::rows::run_rows;

/// Turns one decoded sheet into the per-file model.
pub fn normalize_file(file_name: &str, sheet: &RawSheet) -> ParsedFile {
    let metadata = extract_metadata(sheet);
    let header = locate_header(&sheet.rows);

    let pass = run_rows(sheet, header.row, header.columns, metadata);
    let (sections, page_rows) = (pass.sections, pass.page_rows);
    let (students, mut subjects) = pass.into_parts();

    fill_subject_statistics(&mut subjects, &students);
    let students_array = students.iter().map(flatten_student).collect();

    info!(
        file = file_name,
        grade = metadata.grade,
        class = metadata.class,
        header_row = header.row + 1,
        header_detected = header.detected,
        students = students.len(),
        subjects = subjects.len(),
        sections,
        page_rows,
        "normalized grade report"
    );

    ParsedFile {
        file_name: file_name.to_string(),
        grade: metadata.grade,
        class: metadata.class,
        students,
        subjects,
        students_array,
    }
}

/// Collects every student's score and average for each subject's term key.
/// Lookups ignore the category, matching how students store their subjects.
pub fn fill_subject_statistics(subjects: &mut [SubjectSummary], students: &[StudentRecord]) {
    for summary in subjects.iter_mut() {
        let key = summary.id.term_key();
        let held = students.iter().filter_map(|student| student.subjects.get(&key));

        let (scores, averages): (Vec<f64>, Vec<f64>) = held
            .filter_map(|subject| subject.score)
            .map(|pair| (pair.original, pair.average))
            .unzip();

        summary.class_average = mean(&averages);
        summary.score_average = mean(&scores);
        summary.scores = scores;
        summary.averages = averages;
    }
}

pub fn flatten_student(student: &StudentRecord) -> StudentEntry {
    let mut scores = BTreeMap::new();
    let mut achievements = BTreeMap::new();
    for subject in student.subjects.values() {
        let display = subject.display_name();
        scores.insert(display.clone(), subject.original_score().unwrap_or(0.0));
        achievements.insert(
            display,
            subject
                .achievement_level()
                .map(|level| level.to_string())
                .unwrap_or_default(),
        );
    }

    let positive: Vec<f64> = student
        .subjects
        .values()
        .filter_map(|subject| subject.original_score())
        .filter(|score| *score > 0.0)
        .collect();

    StudentEntry {
        number: student.number,
        name: student.name.clone(),
        grade: student.grade,
        class: student.class,
        scores,
        achievements,
        average_score: mean(&positive),
        total_subjects: student.subjects.len(),
    }
}
