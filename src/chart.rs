//! Per-model aggregation and the comparison chart.

use crate::error::{BenchError, Result};
use crate::section::Section;
use crate::table::{EvaluatedResult, timestamp};
use plotters::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name prefix of rendered charts.
pub const CHART_PREFIX: &str = "model_similarity_chart_";

const SECTION_COLORS: [RGBColor; 5] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
];

/// Average similarity of one model, per section.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model_id: String,
    /// Rows seen for this model.
    pub rows: usize,
    /// Mean of defined scores; `None` when no score was defined.
    pub means: [Option<f64>; 5],
    /// Number of defined scores behind each mean.
    pub counts: [usize; 5],
}

impl ModelSummary {
    pub fn mean(&self, section: Section) -> Option<f64> {
        self.means[section.index()]
    }
}

/// Mean of the defined values. Sentinels are excluded, not counted as zero.
pub fn mean_defined(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Group rows by model, in first-seen order.
pub fn aggregate(evaluated: &[EvaluatedResult]) -> Vec<ModelSummary> {
    let mut order: Vec<&str> = Vec::new();
    for row in evaluated {
        if !order.contains(&row.result.model_id.as_str()) {
            order.push(&row.result.model_id);
        }
    }

    order
        .into_iter()
        .map(|model_id| {
            let rows: Vec<&EvaluatedResult> = evaluated
                .iter()
                .filter(|r| r.result.model_id == model_id)
                .collect();

            let mut means = [None; 5];
            let mut counts = [0; 5];
            for section in Section::ALL {
                let scores: Vec<Option<f64>> = rows.iter().map(|r| r.score(section)).collect();
                means[section.index()] = mean_defined(&scores);
                counts[section.index()] = scores.iter().flatten().count();
            }

            ModelSummary {
                model_id: model_id.to_string(),
                rows: rows.len(),
                means,
                counts,
            }
        })
        .collect()
}

fn chart_err<E: std::fmt::Display>(e: E) -> BenchError {
    BenchError::Chart(e.to_string())
}

/// Render the grouped bar chart into `charts_dir` and return its path.
pub fn render(evaluated: &[EvaluatedResult], charts_dir: &Path) -> Result<PathBuf> {
    let summaries = aggregate(evaluated);
    if summaries.is_empty() {
        return Err(BenchError::Input("No evaluated rows to chart".to_string()));
    }

    fs::create_dir_all(charts_dir).map_err(|e| BenchError::io(charts_dir, e))?;
    let path = charts_dir.join(format!("{}{}.svg", CHART_PREFIX, timestamp()));
    draw(&summaries, &path)?;

    info!(path = %path.display(), models = summaries.len(), "chart written");
    Ok(path)
}

fn draw(summaries: &[ModelSummary], path: &Path) -> Result<()> {
    let n = summaries.len();
    let names: Vec<String> = summaries.iter().map(|s| s.model_id.clone()).collect();

    let lowest = summaries
        .iter()
        .flat_map(|s| s.means.iter().flatten())
        .fold(0.0f64, |acc, v| acc.min(*v));
    let y_min = if lowest < 0.0 { lowest - 0.05 } else { 0.0 };

    let root = SVGBackend::new(path, (1400, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Average similarity per section by model", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_min..1.05f64)
        .map_err(chart_err)?;

    let label = |x: &f64| {
        let i = x.round();
        if (x - i).abs() < 1e-6 && i >= 0.0 && (i as usize) < n {
            names[i as usize].clone()
        } else {
            String::new()
        }
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&label)
        .x_desc("Model")
        .y_desc("Average cosine similarity")
        .draw()
        .map_err(chart_err)?;

    let group_width = 0.8;
    let bar_width = group_width / Section::ALL.len() as f64;

    for section in Section::ALL {
        let color = SECTION_COLORS[section.index()];
        let bars = summaries.iter().enumerate().filter_map(|(i, summary)| {
            let mean = summary.mean(section)?;
            let x0 = i as f64 - group_width / 2.0 + section.index() as f64 * bar_width;
            Some(Rectangle::new(
                [(x0, 0.0), (x0 + bar_width, mean)],
                color.filled(),
            ))
        });

        chart
            .draw_series(bars)
            .map_err(chart_err)?
            .label(section.name())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

/// Print the per-model means as a fixed-width table.
pub fn print_summary(summaries: &[ModelSummary]) {
    let width = summaries
        .iter()
        .map(|s| s.model_id.len())
        .max()
        .unwrap_or(0)
        .max("model".len());

    let mut header = format!("{:<width$}", "model", width = width);
    for section in Section::ALL {
        header.push_str(&format!(" {:>9}", section.name()));
    }
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));

    for summary in summaries {
        let mut line = format!("{:<width$}", summary.model_id, width = width);
        for section in Section::ALL {
            match summary.mean(section) {
                Some(mean) => line.push_str(&format!(" {:>9.4}", mean)),
                None => line.push_str(&format!(" {:>9}", "-")),
            }
        }
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::BenchmarkResult;
    use tempfile::TempDir;

    fn evaluated(model: &str, scores: [Option<f64>; 5]) -> EvaluatedResult {
        EvaluatedResult {
            result: BenchmarkResult {
                model_id: model.into(),
                case_name: "c".into(),
                ai_facts: String::new(),
                ai_issue: String::new(),
                ai_decision: String::new(),
                ai_reasons: String::new(),
                ai_ratio: String::new(),
                human_facts: String::new(),
                human_issue: String::new(),
                human_decision: String::new(),
                human_reasons: String::new(),
                human_ratio: String::new(),
            },
            scores,
        }
    }

    #[test]
    fn test_mean_excludes_sentinel() {
        let mean = mean_defined(&[Some(0.8), None, Some(0.6)]).unwrap();
        assert!((mean - 0.7).abs() < 1e-9);
        assert_eq!(mean_defined(&[None, None]), None);
        assert_eq!(mean_defined(&[]), None);
    }

    #[test]
    fn test_aggregate_first_seen_order() {
        let rows = vec![
            evaluated("gpt", [Some(0.8), Some(1.0), None, Some(0.5), None]),
            evaluated("claude", [Some(0.4), None, None, None, None]),
            evaluated("gpt", [None, Some(0.5), None, Some(0.7), None]),
        ];

        let summaries = aggregate(&rows);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].model_id, "gpt");
        assert_eq!(summaries[1].model_id, "claude");

        let gpt = &summaries[0];
        assert_eq!(gpt.rows, 2);
        assert_eq!(gpt.mean(Section::Facts), Some(0.8));
        assert_eq!(gpt.mean(Section::Issue), Some(0.75));
        assert_eq!(gpt.mean(Section::Decision), None);
        assert_eq!(gpt.counts, [1, 2, 0, 2, 0]);
    }

    #[test]
    fn test_render_writes_svg() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            evaluated("gpt-4o", [Some(0.8), Some(0.7), Some(0.9), Some(0.6), None]),
            evaluated("claude", [Some(0.5), Some(-0.1), None, Some(0.4), Some(0.3)]),
        ];

        let path = render(&rows, dir.path()).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(CHART_PREFIX));
        assert!(name.ends_with(".svg"));

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("ratio"));
    }

    #[test]
    fn test_render_empty_input() {
        let dir = TempDir::new().unwrap();
        let err = render(&[], dir.path()).unwrap_err();
        assert!(matches!(err, BenchError::Input(_)));
    }
}
