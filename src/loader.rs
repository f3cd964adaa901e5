use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::models::{GradeRecord, GradeTable, SubjectScores};

const REQUIRED_COLUMNS: [&str; 7] = [
    "Student",
    "Semester",
    "Math",
    "Physics",
    "Chemistry",
    "Biology",
    "English",
];

#[derive(Deserialize)]
struct CsvRow {
    #[serde(rename = "Student")]
    student: String,
    #[serde(rename = "Semester")]
    semester: String,
    #[serde(rename = "Math", deserialize_with = "grade_cell")]
    math: Option<f64>,
    #[serde(rename = "Physics", deserialize_with = "grade_cell")]
    physics: Option<f64>,
    #[serde(rename = "Chemistry", deserialize_with = "grade_cell")]
    chemistry: Option<f64>,
    #[serde(rename = "Biology", deserialize_with = "grade_cell")]
    biology: Option<f64>,
    #[serde(rename = "English", deserialize_with = "grade_cell")]
    english: Option<f64>,
}

impl From<CsvRow> for GradeRecord {
    fn from(row: CsvRow) -> Self {
        GradeRecord {
            student: row.student,
            semester: row.semester,
            grades: SubjectScores {
                math: row.math,
                physics: row.physics,
                chemistry: row.chemistry,
                biology: row.biology,
                english: row.english,
            },
        }
    }
}

/// Empty cells, non-numeric text and non-finite numbers load as missing.
fn grade_cell<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|cell| parse_grade(&cell)))
}

pub fn parse_grade(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

pub fn load_grades(path: &Path) -> anyhow::Result<GradeTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open grade table {}", path.display()))?;
    let table = read_grades(file)
        .with_context(|| format!("failed to read grade table {}", path.display()))?;
    debug!(path = %path.display(), records = table.len(), "parsed grade rows");
    Ok(table)
}

pub fn read_grades<R: Read>(source: R) -> anyhow::Result<GradeTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader.headers().context("missing header row")?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| header == column) {
            bail!("missing required column '{column}'");
        }
    }

    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed row {}", line + 1))?;
        records.push(GradeRecord::from(row));
    }

    Ok(GradeTable::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Student,Semester,Math,Physics,Chemistry,Biology,English
Avery Lee,Semester 1,72,48.5,,90,81
Jules Moreno,Semester 1, 65 ,abc,70,NaN,55
";

    #[test]
    fn reads_records_with_missing_cells() {
        let table = read_grades(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);

        let first = &table.records()[0];
        assert_eq!(first.student, "Avery Lee");
        assert_eq!(first.semester, "Semester 1");
        assert_eq!(first.grades.math, Some(72.0));
        assert_eq!(first.grades.physics, Some(48.5));
        assert_eq!(first.grades.chemistry, None);

        let second = &table.records()[1];
        assert_eq!(second.grades.math, Some(65.0));
        assert_eq!(second.grades.physics, None);
        assert_eq!(second.grades.biology, None);
    }

    #[test]
    fn rejects_missing_column() {
        let input = "Student,Semester,Math\nAvery Lee,Semester 1,70\n";
        let err = read_grades(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Physics"));
    }

    #[test]
    fn rejects_ragged_rows() {
        let input = format!("{SAMPLE}Kiara Patel,Semester 2,1,2\n");
        assert!(read_grades(input.as_bytes()).is_err());
    }

    #[test]
    fn header_only_is_empty_table() {
        let input = "Student,Semester,Math,Physics,Chemistry,Biology,English\n";
        let table = read_grades(input.as_bytes()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_grades(&dir.path().join("nope.csv")).unwrap_err();
        assert!(err.to_string().contains("failed to open grade table"));
    }

    #[test]
    fn parse_grade_rejects_text() {
        assert_eq!(parse_grade(" 88.25 "), Some(88.25));
        assert_eq!(parse_grade("absent"), None);
        assert_eq!(parse_grade(""), None);
    }

    #[test]
    fn infinite_cells_load_as_missing() {
        assert_eq!(parse_grade("inf"), None);
        assert_eq!(parse_grade("-inf"), None);
        assert_eq!(parse_grade("NaN"), None);

        let input = "Student,Semester,Math,Physics,Chemistry,Biology,English\nAvery Lee,Semester 1,inf,-inf,60,,\n";
        let table = read_grades(input.as_bytes()).unwrap();
        let grades = &table.records()[0].grades;
        assert_eq!(grades.math, None);
        assert_eq!(grades.physics, None);
        assert_eq!(grades.chemistry, Some(60.0));
    }
}
