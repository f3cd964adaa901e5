use std::fmt::Write;
use std::path::Path;

use anyhow::Context;

use crate::models::{
    ImprovingRow, SemesterAverage, StudentAverage, Subject, SubjectScores, Summary,
};

fn cell(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}"),
        None => "NaN".to_string(),
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let index_width = rows.len().saturating_sub(1).to_string().len();
    let mut widths: Vec<usize> = headers.iter().map(|header| header.len()).collect();
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.len());
        }
    }

    let mut output = String::new();
    let _ = write!(output, "{:index_width$}", "");
    for (header, width) in headers.iter().zip(&widths) {
        let _ = write!(output, "  {header:>width$}");
    }
    let _ = writeln!(output);

    for (index, row) in rows.iter().enumerate() {
        let _ = write!(output, "{index:<index_width$}");
        for (value, width) in row.iter().zip(&widths) {
            let _ = write!(output, "  {value:>width$}");
        }
        let _ = writeln!(output);
    }

    output
}

fn subject_headers<'a>(leading: &[&'a str]) -> Vec<&'a str> {
    leading
        .iter()
        .copied()
        .chain(Subject::COLUMNS.iter().map(|subject| subject.name()))
        .collect()
}

fn score_cells(scores: &SubjectScores) -> impl Iterator<Item = String> + '_ {
    scores.values().map(cell)
}

pub fn semester_table(averages: &[SemesterAverage]) -> String {
    if averages.is_empty() {
        return "Empty table\n".to_string();
    }
    let rows: Vec<Vec<String>> = averages
        .iter()
        .map(|row| {
            std::iter::once(row.semester.clone())
                .chain(score_cells(&row.averages))
                .collect()
        })
        .collect();
    render_table(&subject_headers(&["Semester"]), &rows)
}

pub fn top_student_table(students: &[StudentAverage]) -> String {
    if students.is_empty() {
        return "Empty table\n".to_string();
    }
    let mut headers = subject_headers(&["Student"]);
    headers.push("Overall Average");
    let rows: Vec<Vec<String>> = students
        .iter()
        .map(|row| {
            std::iter::once(row.student.clone())
                .chain(score_cells(&row.subject_means))
                .chain(std::iter::once(format!("{:.2}", row.overall_average)))
                .collect()
        })
        .collect();
    render_table(&headers, &rows)
}

pub fn improving_table(rows: &[ImprovingRow]) -> String {
    if rows.is_empty() {
        return "Empty table\n".to_string();
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.student.clone(),
                row.semester.clone(),
                format!("{:.2}", row.average),
            ]
        })
        .collect();
    render_table(&["Student", "Semester", "Grade"], &cells)
}

pub fn hardest_sentence(summary: &Summary) -> String {
    match &summary.hardest_subject {
        Some(hardest) => format!(
            "The hardest subject to pass across all semesters is '{}' with an average score of {:.2}.",
            hardest.subject, hardest.average
        ),
        None => "No grades recorded; there is no hardest subject.".to_string(),
    }
}

/// Console report, sections in fixed order.
pub fn render_console(summary: &Summary, failing_limit: usize) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "Failed Student List (first {failing_limit} Student): "
    );
    let shown: Vec<&str> = summary
        .failing_students
        .iter()
        .take(failing_limit)
        .map(String::as_str)
        .collect();
    let _ = writeln!(output, "{shown:?}");
    let _ = writeln!(output);

    let _ = writeln!(output, "Average grades by semester:");
    let _ = writeln!(output, "{}", semester_table(&summary.semester_averages));

    let _ = writeln!(output, "Student(s) with the highest average grade:");
    let _ = writeln!(output, "{}", top_student_table(&summary.top_students));

    let _ = writeln!(output, "{}", hardest_sentence(summary));
    let _ = writeln!(output);

    let _ = writeln!(
        output,
        "Students with consistently improved average grades sorted by Student and Grade:"
    );
    match &summary.improving_error {
        Some(err) => {
            let _ = writeln!(output, "Could not determine improving students: {err}");
        }
        None => {
            let _ = writeln!(output, "{}", improving_table(&summary.improving_students));
        }
    }

    output
}

fn markdown_scores(scores: &SubjectScores) -> String {
    scores.values().map(cell).collect::<Vec<_>>().join(" | ")
}

pub fn build_report(source: &str, summary: &Summary, failing_limit: usize) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Grade Report");
    let _ = writeln!(
        output,
        "Generated from {} on {} ({} records)",
        source,
        summary.generated_at.format("%Y-%m-%d %H:%M UTC"),
        summary.record_count
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Failing Students");
    if summary.failing_students.is_empty() {
        let _ = writeln!(output, "No student scored below the passing grade.");
    } else {
        for student in summary.failing_students.iter().take(failing_limit) {
            let _ = writeln!(output, "- {student}");
        }
        let hidden = summary.failing_students.len().saturating_sub(failing_limit);
        if hidden > 0 {
            let _ = writeln!(output, "- ...and {hidden} more");
        }
    }

    let columns = Subject::COLUMNS
        .iter()
        .map(|subject| subject.name())
        .collect::<Vec<_>>()
        .join(" | ");
    let rule = vec!["---"; Subject::COLUMNS.len()].join(" | ");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Grades by Semester");
    if summary.semester_averages.is_empty() {
        let _ = writeln!(output, "No semesters recorded.");
    } else {
        let _ = writeln!(output, "| Semester | {columns} |");
        let _ = writeln!(output, "| --- | {rule} |");
        for row in &summary.semester_averages {
            let _ = writeln!(
                output,
                "| {} | {} |",
                row.semester,
                markdown_scores(&row.averages)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Average");
    if summary.top_students.is_empty() {
        let _ = writeln!(output, "No student has a recorded grade.");
    } else {
        for student in &summary.top_students {
            let _ = writeln!(
                output,
                "- {} with an overall average of {:.2}",
                student.student, student.overall_average
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hardest Subject");
    let _ = writeln!(output, "{}", hardest_sentence(summary));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Consistently Improving Students");
    if let Some(err) = &summary.improving_error {
        let _ = writeln!(output, "Could not determine improving students: {err}");
    } else if summary.improving_students.is_empty() {
        let _ = writeln!(output, "No student improved every semester.");
    } else {
        for row in &summary.improving_students {
            let _ = writeln!(
                output,
                "- {} ({}): {:.2}",
                row.student, row.semester, row.average
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Score per Subject");
    for entry in &summary.subject_averages {
        let _ = writeln!(output, "- {}: {}", entry.subject, cell(entry.average));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Overall Score by Semester");
    for entry in &summary.semester_overall {
        let _ = writeln!(output, "- {}: {}", entry.semester, cell(entry.average));
    }

    output
}

/// Writes the per-semester averages with a leading `Index` column. Absent
/// averages are left as empty cells.
pub fn write_semester_averages(path: &Path, averages: &[SemesterAverage]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(subject_headers(&["Index", "Semester"]))?;
    for (index, row) in averages.iter().enumerate() {
        let mut record = vec![index.to_string(), row.semester.clone()];
        record.extend(
            row.averages
                .values()
                .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;
    use crate::loader::parse_grade;
    use crate::models::{GradeRecord, GradeTable};

    fn read_semester_averages(path: &Path) -> anyhow::Result<Vec<SemesterAverage>> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut averages = Vec::new();
        for result in reader.records() {
            let record = result?;
            let semester = record.get(1).context("missing Semester column")?.to_string();
            let value = |position: usize| record.get(position).and_then(parse_grade);
            averages.push(SemesterAverage {
                semester,
                averages: SubjectScores {
                    math: value(2),
                    physics: value(3),
                    chemistry: value(4),
                    biology: value(5),
                    english: value(6),
                },
            });
        }

        Ok(averages)
    }

    fn sample_table() -> GradeTable {
        let record = |student: &str, semester: &str, math, physics, english| GradeRecord {
            student: student.to_string(),
            semester: semester.to_string(),
            grades: SubjectScores {
                math,
                physics,
                chemistry: Some(70.0),
                biology: None,
                english,
            },
        };
        GradeTable::new(vec![
            record("Avery Lee", "Semester 1", Some(45.0), Some(88.0), Some(91.0)),
            record("Avery Lee", "Semester 2", Some(65.0), Some(92.0), Some(93.0)),
            record("Jules Moreno", "Semester 1", Some(77.0), None, Some(61.0)),
            record("Jules Moreno", "Semester 2", Some(81.0), Some(40.0), None),
        ])
    }

    #[test]
    fn console_report_sections_in_order() {
        let summary = summarize(&sample_table());
        let text = render_console(&summary, 10);

        let failing = text.find("Failed Student List").unwrap();
        let semesters = text.find("Average grades by semester:").unwrap();
        let top = text.find("Student(s) with the highest average grade:").unwrap();
        let hardest = text.find("The hardest subject").unwrap();
        let improving = text.find("consistently improved").unwrap();
        assert!(failing < semesters && semesters < top && top < hardest && hardest < improving);

        assert!(text.contains("[\"Avery Lee\", \"Jules Moreno\"]"));
    }

    #[test]
    fn hardest_sentence_uses_two_decimals() {
        let summary = summarize(&sample_table());
        // Math: (45 + 65 + 77 + 81) / 4 = 67
        assert_eq!(
            hardest_sentence(&summary),
            "The hardest subject to pass across all semesters is 'Math' with an average score of 67.00."
        );
    }

    #[test]
    fn failing_list_respects_limit() {
        let summary = summarize(&sample_table());
        let text = render_console(&summary, 1);
        assert!(text.contains("[\"Avery Lee\"]"));
        assert!(!text.contains("[\"Avery Lee\", \"Jules Moreno\"]"));
    }

    #[test]
    fn markdown_report_lists_every_section() {
        let summary = summarize(&sample_table());
        let report = build_report("grades.csv", &summary, 10);

        assert!(report.starts_with("# Student Grade Report"));
        assert!(report.contains("Generated from grades.csv"));
        assert!(report.contains("| Semester | Math | Physics | Chemistry | Biology | English |"));
        assert!(report.contains("| Semester 2 | 73.00 | 66.00 | 70.00 | NaN | 93.00 |"));
        assert!(report.contains("## Consistently Improving Students"));
        assert!(report.contains("- Avery Lee (Semester 2)"));
    }

    #[test]
    fn semester_averages_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("average_grades_by_semester.csv");
        let summary = summarize(&sample_table());

        write_semester_averages(&path, &summary.semester_averages).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("Index,Semester,Math,Physics,Chemistry,Biology,English")
        );
        assert_eq!(lines.next(), Some("0,Semester 1,61,88,70,,76"));

        let reread = read_semester_averages(&path).unwrap();
        assert_eq!(reread, summary.semester_averages);
    }

    #[test]
    fn empty_averages_write_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("averages.csv");

        write_semester_averages(&path, &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(read_semester_averages(&path).unwrap().is_empty());
    }

    #[test]
    fn unnumbered_semester_still_reports_earlier_sections() {
        let mut table_rows = sample_table().records().to_vec();
        table_rows.push(GradeRecord {
            student: "Kiara Patel".to_string(),
            semester: "Fall".to_string(),
            grades: SubjectScores {
                math: Some(40.0),
                ..SubjectScores::default()
            },
        });
        let summary = summarize(&GradeTable::new(table_rows));

        let text = render_console(&summary, 10);
        assert!(text.contains("[\"Avery Lee\", \"Jules Moreno\", \"Kiara Patel\"]"));
        assert!(text.contains("The hardest subject to pass across all semesters is 'Math'"));
        assert!(text.contains("Could not determine improving students: semester 'Fall'"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("average_grades_by_semester.csv");
        write_semester_averages(&path, &summary.semester_averages).unwrap();
        let reread = read_semester_averages(&path).unwrap();
        let semesters: Vec<&str> = reread.iter().map(|row| row.semester.as_str()).collect();
        assert_eq!(semesters, vec!["Fall", "Semester 1", "Semester 2"]);
    }
}
