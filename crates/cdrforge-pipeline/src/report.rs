//! Combined dataset and summary report.

use std::path::{Path, PathBuf};

use cdrforge_common::{CdrRegion, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::artifacts::{write_artifact, ArtifactStore, TargetArtifacts};
use crate::regions::{AnnotatedVariant, DiversityReport};

/// Marker rendered for a statistic with no defined inputs.
pub const NOT_AVAILABLE: &str = "N/A";

/// Column order of every annotated-variant table.
pub const TABLE_HEADER: [&str; 15] = [
    "target",
    "variant_index",
    "heavy",
    "light",
    "score",
    "global_score",
    "mutations",
    "seq_recovery",
    "heavy_cdr1",
    "heavy_cdr2",
    "heavy_cdr3",
    "light_cdr1",
    "light_cdr2",
    "light_cdr3",
    "region_source",
];

/// Annotated variants and diversity for one successfully processed target.
#[derive(Debug, Clone)]
pub struct TargetTable {
    pub artifacts: TargetArtifacts,
    pub rows: Vec<AnnotatedVariant>,
    pub diversity: DiversityReport,
}

impl TargetTable {
    pub fn target(&self) -> &str {
        &self.artifacts.target
    }
}

/// A target that dropped out of the run, with its diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub stage: String,
    pub message: String,
}

/// One row of the combined dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedRow {
    pub target: String,
    pub variant_index: usize,
    pub heavy: String,
    pub light: String,
    pub score: Option<f64>,
    pub global_score: Option<f64>,
    pub mutations: Option<u32>,
    pub seq_recovery: Option<f64>,
    pub heavy_cdr1: Option<String>,
    pub heavy_cdr2: Option<String>,
    pub heavy_cdr3: Option<String>,
    pub light_cdr1: Option<String>,
    pub light_cdr2: Option<String>,
    pub light_cdr3: Option<String>,
    pub region_source: String,
}

impl CombinedRow {
    fn from_annotated(target: &str, index: usize, a: &AnnotatedVariant) -> Self {
        let region = |r: CdrRegion| a.region(r).map(str::to_string);
        Self {
            target: target.to_string(),
            variant_index: index,
            heavy: a.variant.heavy.clone(),
            light: a.variant.light.clone(),
            score: a.variant.score,
            global_score: a.variant.global_score,
            mutations: a.variant.mutation_count,
            seq_recovery: a.variant.sequence_recovery,
            heavy_cdr1: region(CdrRegion::H1),
            heavy_cdr2: region(CdrRegion::H2),
            heavy_cdr3: region(CdrRegion::H3),
            light_cdr1: region(CdrRegion::L1),
            light_cdr2: region(CdrRegion::L2),
            light_cdr3: region(CdrRegion::L3),
            region_source: a.source.as_str().to_string(),
        }
    }
}

/// Headline statistics for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSummary {
    pub target: String,
    pub variant_count: usize,
    pub mean_score: Option<f64>,
    pub mean_global_score: Option<f64>,
    pub mean_mutations: Option<f64>,
    pub diversity: DiversityReport,
}

impl TargetSummary {
    pub fn from_table(table: &TargetTable) -> Self {
        let variants = table.rows.iter().map(|a| &a.variant);
        Self {
            target: table.target().to_string(),
            variant_count: table.rows.len(),
            mean_score: mean(variants.clone().map(|v| v.score)),
            mean_global_score: mean(variants.clone().map(|v| v.global_score)),
            mean_mutations: mean(variants.map(|v| v.mutation_count.map(f64::from))),
            diversity: table.diversity.clone(),
        }
    }
}

/// Mean of the defined values, `None` if there are none.
pub fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Row-wise union of all target tables, in the order given.
pub fn combine(tables: &[TargetTable]) -> Vec<CombinedRow> {
    tables
        .iter()
        .flat_map(|t| {
            t.rows
                .iter()
                .enumerate()
                .map(move |(i, a)| CombinedRow::from_annotated(t.target(), i, a))
        })
        .collect()
}

/// CSV bytes for `rows`, header always present.
pub fn table_csv(rows: &[CombinedRow]) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(TABLE_HEADER)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()).into())
}

pub fn diversity_csv(report: &DiversityReport) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["region", "unique", "total", "ratio"])?;
    for r in &report.regions {
        wtr.write_record([
            r.region.column_name().to_string(),
            r.unique.to_string(),
            r.total.to_string(),
            format!("{:.4}", r.ratio),
        ])?;
    }
    wtr.into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()).into())
}

/// What the assembler wrote.
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub combined_path: PathBuf,
    pub summary_path: PathBuf,
    pub combined_rows: usize,
    pub summaries: Vec<TargetSummary>,
}

/// Writes per-target tables, the combined dataset and the summary page.
pub struct ReportAssembler {
    store: ArtifactStore,
}

impl ReportAssembler {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub async fn assemble(
        &self,
        tables: &[TargetTable],
        failures: &[TargetFailure],
        run_id: Uuid,
    ) -> Result<ReportOutput> {
        for table in tables {
            let rows = combine(std::slice::from_ref(table));
            write_artifact(&table.artifacts.annotated_csv, &table_csv(&rows)?).await?;
            write_artifact(&table.artifacts.diversity_csv, &diversity_csv(&table.diversity)?).await?;
        }

        let rows = combine(tables);
        let combined_path = self.store.combined_path();
        write_artifact(&combined_path, &table_csv(&rows)?).await?;

        let summaries: Vec<TargetSummary> = tables.iter().map(TargetSummary::from_table).collect();
        let html = render_summary(&summaries, failures, run_id, Utc::now());
        let summary_path = self.store.summary_path();
        write_artifact(&summary_path, html.as_bytes()).await?;

        info!(
            "Combined dataset: {} rows from {} targets -> {:?}",
            rows.len(),
            tables.len(),
            combined_path
        );

        Ok(ReportOutput {
            combined_path,
            summary_path,
            combined_rows: rows.len(),
            summaries,
        })
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Summary page: one section per target plus the failures.
pub fn render_summary(
    summaries: &[TargetSummary],
    failures: &[TargetFailure],
    run_id: Uuid,
    generated_at: DateTime<Utc>,
) -> String {
    let sections: String = if summaries.is_empty() {
        r#"<p class="muted">No target produced variants in this run.</p>"#.to_string()
    } else {
        summaries.iter().map(render_target).collect()
    };

    let failure_rows: String = if failures.is_empty() {
        r#"<tr><td colspan="3" class="muted">None</td></tr>"#.to_string()
    } else {
        failures
            .iter()
            .map(|f| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape_html(&f.target),
                    escape_html(&f.stage),
                    escape_html(&f.message)
                )
            })
            .collect()
    };

    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>cdrforge | Antibody Variant Summary</title>
    <style>
        body {{ font-family: sans-serif; margin: 2rem; color: #1f2933; }}
        table {{ border-collapse: collapse; margin-bottom: 1.5rem; }}
        th, td {{ border: 1px solid #cbd2d9; padding: 0.3rem 0.7rem; text-align: left; }}
        th {{ background: #f0f4f8; }}
        .muted {{ color: #7b8794; }}
    </style>
</head>
<body>
<h1>Antibody Variant Summary</h1>
<p class="muted">Run {run_id} · generated {generated}</p>
{sections}
<h2>Failed targets</h2>
<table>
<tr><th>Target</th><th>Stage</th><th>Diagnostic</th></tr>
{failure_rows}
</table>
</body>
</html>
"#,
        run_id = run_id,
        generated = generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        sections = sections,
        failure_rows = failure_rows,
    )
}

fn render_target(s: &TargetSummary) -> String {
    let diversity_rows: String = s
        .diversity
        .regions
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.3}</td></tr>\n",
                r.region.wire_name(),
                r.unique,
                r.total,
                r.ratio
            )
        })
        .collect();

    format!(r#"<h2>{target}</h2>
<table>
<tr><th>Variants</th><td>{count}</td></tr>
<tr><th>Mean score</th><td>{score}</td></tr>
<tr><th>Mean global score</th><td>{global}</td></tr>
<tr><th>Mean mutations</th><td>{mutations}</td></tr>
</table>
<table>
<tr><th>Region</th><th>Unique</th><th>Total</th><th>Ratio</th></tr>
{diversity_rows}</table>
"#,
        target = escape_html(&s.target),
        count = s.variant_count,
        score = format_stat(s.mean_score),
        global = format_stat(s.mean_global_score),
        mutations = format_stat(s.mean_mutations),
        diversity_rows = diversity_rows,
    )
}

/// Read back a CSV table written by [`table_csv`].
pub fn read_table(path: &Path) -> Result<Vec<csv::StringRecord>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for rec in rdr.records() {
        records.push(rec?);
    }
    Ok(records)
}
