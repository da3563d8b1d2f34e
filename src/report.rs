use std::collections::HashMap;
use std::fmt::Write;
use std::io;

use anyhow::Context;
use chrono::NaiveDateTime;

use crate::analysis::{
    category_stats, class_ranks, group_by_semester, letter_distribution, overall_stats,
    top_students, OverallStats,
};
use crate::models::{CombinedDataset, StudentEntry, StudentKey};

const TOP_STUDENTS: usize = 10;

fn write_overall(output: &mut String, stats: Option<OverallStats>) {
    match stats {
        Some(stats) => {
            let _ = writeln!(
                output,
                "- {} students averaged {:.1} (std dev {:.2}), best {:.1}, worst {:.1}",
                stats.count, stats.mean, stats.std_dev, stats.best, stats.worst
            );
        }
        None => {
            let _ = writeln!(output, "- No student has a positive average.");
        }
    }
}

/// Console summary printed by `analyze`.
pub fn render_summary(dataset: &CombinedDataset) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Files: {}", dataset.file_names.join(", "));
    let grades: Vec<String> = dataset.grades.iter().map(|g| g.to_string()).collect();
    let _ = writeln!(output, "Grades: {}", grades.join(", "));
    let _ = writeln!(output, "Classes: {}", dataset.classes.join(", "));
    let _ = writeln!(
        output,
        "{} subjects, {} students",
        dataset.subjects.len(),
        dataset.students.len()
    );
    write_overall(&mut output, overall_stats(&dataset.students));
    output
}

pub fn build_report(dataset: &CombinedDataset, generated_at: NaiveDateTime) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Grade Report Summary");
    let _ = writeln!(
        output,
        "Generated {} from {} files ({})",
        generated_at.format("%Y-%m-%d %H:%M"),
        dataset.file_names.len(),
        dataset.file_names.join(", ")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if dataset.subjects.is_empty() {
        let _ = writeln!(output, "No subjects found in the input files.");
    } else {
        let _ = writeln!(output, "| Subject | Category | Average | Score average | Scores |");
        let _ = writeln!(output, "| --- | --- | ---: | ---: | ---: |");
        for subject in dataset.subjects.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {:.1} | {:.1} | {} |",
                subject.display_name,
                subject.id.category,
                subject.average,
                subject.score_average,
                subject.scores.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    write_overall(&mut output, overall_stats(&dataset.students));
    for (letter, count) in letter_distribution(&dataset.students) {
        let _ = writeln!(output, "- {letter}: {count} students");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Students");

    let ranks = class_ranks(&dataset.students);
    let top = top_students(&dataset.students, TOP_STUDENTS);
    if top.is_empty() {
        let _ = writeln!(output, "No students with scored subjects.");
    } else {
        for student in top {
            let _ = writeln!(
                output,
                "- {} {} averaged {:.1} across {} subjects (class rank {})",
                student.key(),
                student.name,
                student.average_score,
                student.total_subjects,
                ranks.get(&student.key()).copied().unwrap_or_default()
            );
        }
    }

    output
}

pub fn render_students(students: &[&StudentEntry], ranks: &HashMap<StudentKey, usize>) -> String {
    let mut output = String::new();
    if students.is_empty() {
        let _ = writeln!(output, "No students match the filter.");
        return output;
    }
    for student in students {
        let _ = writeln!(
            output,
            "- {} {}: average {:.1}, {} subjects, class rank {}",
            student.key(),
            student.name,
            student.average_score,
            student.total_subjects,
            ranks.get(&student.key()).copied().unwrap_or_default()
        );
    }
    output
}

/// Detail view for one student: marks by term, then category statistics.
pub fn render_student(dataset: &CombinedDataset, student: &StudentEntry) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} {} (average {:.1}, {} subjects)",
        student.key(),
        student.name,
        student.average_score,
        student.total_subjects
    );

    for ((grade, semester), marks) in group_by_semester(student) {
        let _ = writeln!(output);
        let _ = writeln!(output, "{grade}학년 {semester}학기");
        for mark in marks {
            let _ = writeln!(
                output,
                "- {}: {} {}",
                mark.name,
                mark.score,
                mark.achievement.as_deref().unwrap_or("-")
            );
        }
    }

    let stats = category_stats(dataset, student);
    if !stats.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Categories");
    }
    for category in stats {
        let change = match category.change_pct {
            Some(pct) => format!("{pct:+.1}%"),
            None => "n/a".to_string(),
        };
        let _ = writeln!(
            output,
            "- {}: average {:.1} over {} subjects, change {} [{}]",
            category.category,
            category.overall_average,
            category.subject_count,
            change,
            category.labels.join(", ")
        );
    }

    output
}

/// Subject display names in dataset order, each listed once.
fn subject_columns(dataset: &CombinedDataset) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for subject in &dataset.subjects {
        if !columns.contains(&subject.display_name) {
            columns.push(subject.display_name.clone());
        }
    }
    columns
}

pub fn write_students_csv<W: io::Write>(
    writer: W,
    dataset: &CombinedDataset,
    students: &[&StudentEntry],
) -> anyhow::Result<()> {
    let columns = subject_columns(dataset);
    let mut csv = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = [
        "grade",
        "class",
        "number",
        "name",
        "averageScore",
        "totalSubjects",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    header.extend(columns.iter().cloned());
    csv.write_record(&header)?;

    for student in students {
        let mut record = vec![
            student.grade.to_string(),
            student.class.to_string(),
            student.number.to_string(),
            student.name.clone(),
            format!("{:.2}", student.average_score),
            student.total_subjects.to_string(),
        ];
        record.extend(columns.iter().map(|column| {
            student
                .scores
                .get(column)
                .map(|score| score.to_string())
                .unwrap_or_default()
        }));
        csv.write_record(&record)
            .with_context(|| format!("failed to write student {}", student.key()))?;
    }

    csv.flush()?;
    Ok(())
}

pub fn write_dataset_json<W: io::Write>(
    writer: W,
    dataset: &CombinedDataset,
) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(writer, dataset).context("failed to serialize dataset")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{mean, CombinedSubject, SubjectId};
    use chrono::NaiveDate;

    fn dataset() -> CombinedDataset {
        let id = SubjectId {
            category: "국어".to_string(),
            name: "문학".to_string(),
            grade: 2,
            semester: 1,
        };
        let subject = CombinedSubject {
            display_name: id.display_name(),
            id,
            scores: vec![79.0, 91.0],
            averages: vec![83.8, 83.8],
            class_averages: vec![83.8],
            score_averages: vec![85.0],
            average: 83.8,
            score_average: 85.0,
        };
        let student = |number: u32, name: &str, score: Option<f64>| {
            let scores: std::collections::BTreeMap<String, f64> = score
                .into_iter()
                .map(|s| ("문학(2-1)".to_string(), s))
                .collect();
            let positive: Vec<f64> = scores.values().copied().filter(|v| *v > 0.0).collect();
            StudentEntry {
                number,
                name: name.to_string(),
                grade: 2,
                class: 4,
                achievements: scores.keys().map(|k| (k.clone(), "B".to_string())).collect(),
                average_score: mean(&positive),
                total_subjects: scores.len(),
                scores,
            }
        };
        CombinedDataset {
            subjects: vec![subject],
            students: vec![
                student(1, "홍길동", Some(79.0)),
                student(2, "김영희", Some(91.0)),
                student(3, "박지성", None),
            ],
            file_names: vec!["2-4.xlsx".to_string()],
            grades: vec![2],
            classes: vec!["2-4".to_string()],
        }
    }

    #[test]
    fn report_lists_subjects_overall_and_top_students() {
        let generated_at = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let report = build_report(&dataset(), generated_at);

        assert!(report.starts_with("# Grade Report Summary"));
        assert!(report.contains("Generated 2026-03-02 09:30 from 1 files (2-4.xlsx)"));
        assert!(report.contains("| 문학(2-1) | 국어 | 83.8 | 85.0 | 2 |"));
        assert!(report.contains(
            "- 2 students averaged 85.0 (std dev 6.00), best 91.0, worst 79.0"
        ));
        assert!(report.contains("- A: 1 students"));
        assert!(report.contains("- C: 1 students"));

        let top = report.split("## Top Students").nth(1).unwrap();
        let first = top.lines().find(|l| l.starts_with("- ")).unwrap();
        assert!(first.starts_with("- 2-4-2 김영희 averaged 91.0"));
        assert!(first.ends_with("(class rank 1)"));
        assert!(!top.contains("박지성"));
    }

    #[test]
    fn empty_dataset_report_says_so() {
        let generated_at = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let report = build_report(&CombinedDataset::default(), generated_at);
        assert!(report.contains("No subjects found in the input files."));
        assert!(report.contains("- No student has a positive average."));
        assert!(report.contains("No students with scored subjects."));
    }

    #[test]
    fn csv_has_one_column_per_subject_and_blank_gaps() {
        let data = dataset();
        let students: Vec<&StudentEntry> = data.students.iter().collect();
        let mut buffer = Vec::new();
        write_students_csv(&mut buffer, &data, &students).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "grade,class,number,name,averageScore,totalSubjects,문학(2-1)"
        );
        assert_eq!(lines[1], "2,4,1,홍길동,79.00,1,79");
        assert_eq!(lines[3], "2,4,3,박지성,0.00,0,");
    }

    #[test]
    fn json_uses_camel_case_dataset_shape() {
        let mut buffer = Vec::new();
        write_dataset_json(&mut buffer, &dataset()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        assert_eq!(value["fileNames"][0], "2-4.xlsx");
        assert_eq!(value["classes"][0], "2-4");
        let subject = &value["subjects"][0];
        assert_eq!(subject["category"], "국어");
        assert_eq!(subject["displayName"], "문학(2-1)");
        assert_eq!(subject["classAverages"][0], 83.8);
        let student = &value["students"][1];
        assert_eq!(student["averageScore"], 91.0);
        assert_eq!(student["totalSubjects"], 1);
        assert_eq!(student["achievements"]["문학(2-1)"], "B");
    }

    #[test]
    fn student_detail_groups_terms_and_categories() {
        let data = dataset();
        let text = render_student(&data, &data.students[0]);
        assert!(text.starts_with("2-4-1 홍길동 (average 79.0, 1 subjects)"));
        assert!(text.contains("2학년 1학기\n- 문학: 79 B"));
        assert!(text.contains("- 국어: average 79.0 over 1 subjects, change +0.0% [2-1]"));
    }

    #[test]
    fn student_listing_shows_rank() {
        let data = dataset();
        let ranks = class_ranks(&data.students);
        let students: Vec<&StudentEntry> = data.students.iter().take(2).collect();
        let text = render_students(&students, &ranks);
        assert!(text.contains("- 2-4-1 홍길동: average 79.0, 1 subjects, class rank 2"));
        assert!(text.contains("- 2-4-2 김영희: average 91.0, 1 subjects, class rank 1"));
        assert_eq!(render_students(&[], &ranks), "No students match the filter.\n");
    }
}
