use std::ops::Range;
use std::path::Path;

use anyhow::Context;
use plotters::prelude::*;
use tracing::{debug, warn};

use crate::models::{SemesterOverall, SubjectAverage};

const CHART_SIZE: (u32, u32) = (800, 600);
const SKY_BLUE: RGBColor = RGBColor(135, 206, 235);

type Point = (String, Option<f64>);

fn category_label(value: &SegmentValue<usize>, points: &[Point]) -> String {
    match value {
        SegmentValue::CenterOf(index) => points
            .get(*index)
            .map(|(label, _)| label.clone())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn padded_range(values: &[f64]) -> Range<f64> {
    let low = values.iter().copied().fold(f64::INFINITY, f64::min);
    let high = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pad = if high > low { (high - low) * 0.1 } else { 1.0 };
    (low - pad)..(high + pad)
}

fn bar_chart(
    path: &Path,
    title: &str,
    x_desc: &str,
    y_desc: &str,
    bars: &[Point],
) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0..bars.len()).into_segmented(), 0f64..100f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len())
        .x_label_formatter(&|value| category_label(value, bars))
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().filter_map(|(index, (_, value))| {
        value.map(|value| {
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(index), 0.0),
                    (SegmentValue::Exact(index + 1), value),
                ],
                SKY_BLUE.filled(),
            );
            bar.set_margin(0, 0, 12, 12);
            bar
        })
    }))?;

    root.present()
        .with_context(|| format!("failed to write chart {}", path.display()))?;
    Ok(())
}

fn line_chart(
    path: &Path,
    title: &str,
    x_desc: &str,
    y_desc: &str,
    points: &[Point],
    values: &[f64],
) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0..points.len()).into_segmented(), padded_range(values))?;

    chart
        .configure_mesh()
        .x_labels(points.len())
        .x_label_formatter(&|value| category_label(value, points))
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    // A missing value breaks the line instead of bridging it.
    let mut runs: Vec<Vec<(SegmentValue<usize>, f64)>> = vec![Vec::new()];
    for (index, (_, value)) in points.iter().enumerate() {
        match value {
            Some(value) => {
                if let Some(run) = runs.last_mut() {
                    run.push((SegmentValue::CenterOf(index), *value));
                }
            }
            None => runs.push(Vec::new()),
        }
    }
    for run in runs.into_iter().filter(|run| !run.is_empty()) {
        chart.draw_series(LineSeries::new(run, &BLUE))?;
    }

    chart.draw_series(points.iter().enumerate().filter_map(|(index, (_, value))| {
        value.map(|value| Circle::new((SegmentValue::CenterOf(index), value), 4, BLUE.filled()))
    }))?;

    root.present()
        .with_context(|| format!("failed to write chart {}", path.display()))?;
    Ok(())
}

/// Bar chart of each subject's average on a fixed 0-100 axis. Returns `false`
/// without touching the file system when no subject has a grade.
pub fn subject_averages_chart(path: &Path, averages: &[SubjectAverage]) -> anyhow::Result<bool> {
    let bars: Vec<Point> = averages
        .iter()
        .map(|entry| (entry.subject.to_string(), entry.average))
        .collect();

    if bars.iter().all(|(_, value)| value.is_none()) {
        warn!(path = %path.display(), "no subject averages, skipping bar chart");
        return Ok(false);
    }

    bar_chart(
        path,
        "Average Score per Subject Across All Semesters",
        "Subject",
        "Average Score",
        &bars,
    )?;
    debug!(path = %path.display(), bars = bars.len(), "bar chart rendered");
    Ok(true)
}

/// Line chart of the overall average per semester, with markers and grid.
pub fn semester_trend_chart(path: &Path, overall: &[SemesterOverall]) -> anyhow::Result<bool> {
    let points: Vec<Point> = overall
        .iter()
        .map(|entry| (entry.semester.clone(), entry.average))
        .collect();
    let values: Vec<f64> = points.iter().filter_map(|(_, value)| *value).collect();

    if values.is_empty() {
        warn!(path = %path.display(), "no semester averages, skipping line chart");
        return Ok(false);
    }

    line_chart(
        path,
        "Average Overall Score by Semester",
        "Semester",
        "Average Overall Score",
        &points,
        &values,
    )?;
    debug!(path = %path.display(), points = points.len(), "line chart rendered");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;

    #[test]
    fn bar_chart_is_written_as_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("average_score_per_subject.svg");
        let averages = vec![
            SubjectAverage {
                subject: Subject::Biology,
                average: Some(72.5),
            },
            SubjectAverage {
                subject: Subject::Chemistry,
                average: None,
            },
            SubjectAverage {
                subject: Subject::Math,
                average: Some(64.0),
            },
        ];

        assert!(subject_averages_chart(&path, &averages).unwrap());
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<rect"));
        assert!(svg.contains("Average Score per Subject Across All Semesters"));
    }

    #[test]
    fn line_chart_tolerates_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("average_overall_score_by_semester.svg");
        let overall = vec![
            SemesterOverall {
                semester: "Semester 1".to_string(),
                average: Some(61.0),
            },
            SemesterOverall {
                semester: "Semester 2".to_string(),
                average: None,
            },
            SemesterOverall {
                semester: "Semester 3".to_string(),
                average: Some(70.5),
            },
        ];

        assert!(semester_trend_chart(&path, &overall).unwrap());
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("Average Overall Score by Semester"));
        assert!(svg.contains("<circle"));
    }

    #[test]
    fn charts_without_data_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bar_path = dir.path().join("bars.svg");
        let line_path = dir.path().join("line.svg");

        assert!(!subject_averages_chart(&bar_path, &[]).unwrap());
        assert!(!semester_trend_chart(&line_path, &[]).unwrap());
        assert!(!bar_path.exists());
        assert!(!line_path.exists());
    }

    #[test]
    fn padded_range_handles_flat_series() {
        let range = padded_range(&[70.0, 70.0]);
        assert_eq!(range, 69.0..71.0);

        let range = padded_range(&[50.0, 60.0]);
        assert!(range.start < 50.0 && range.end > 60.0);
    }
}
