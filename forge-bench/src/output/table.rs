//! comfy-table rendering with columns:
//! Size | Engine (ms) | Seq (ms) | Rayon (ms) | vs Seq | vs Rayon | GB/s | Blocks | CV% | OK

use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::harness::{format_size, DataPoint};

fn speedup_cell(speedup: f64) -> Cell {
    let color = if speedup >= 2.0 {
        Color::Green
    } else if speedup >= 1.0 {
        Color::Yellow
    } else {
        Color::Red
    };
    Cell::new(format!("{:.2}x", speedup)).fg(color)
}

fn metric(dp: &DataPoint, key: &str, precision: usize) -> String {
    dp.metrics
        .get(key)
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

/// Render the points of one experiment.
pub fn render_table(experiment: &str, points: &[&DataPoint]) {
    let mut table = Table::new();
    let header = [
        "Size", "Engine (ms)", "Seq (ms)", "Rayon (ms)", "vs Seq", "vs Rayon", "GB/s", "Blocks",
        "CV%", "OK",
    ];
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    for dp in points {
        let ok = if dp.validated {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("NO").fg(Color::Red)
        };
        let row = vec![
            Cell::new(format_size(dp.size)),
            Cell::new(format!("{:.3}", dp.engine_stats.mean)),
            Cell::new(format!("{:.3}", dp.cpu_stats.mean)),
            Cell::new(format!("{:.3}", dp.rayon_stats.mean)),
            speedup_cell(dp.speedup),
            speedup_cell(dp.speedup_vs_rayon),
            Cell::new(metric(dp, "gb_per_sec", 2)),
            Cell::new(metric(dp, "blocks", 0)),
            Cell::new(format!("{:.1}", dp.engine_stats.cv_percent)),
            ok,
        ];
        table.add_row(
            row.into_iter()
                .map(|c| c.set_alignment(CellAlignment::Right)),
        );
    }

    println!("\n=== {} ===", experiment);
    println!("{table}");
}

/// Render one table per experiment, in first-seen order.
pub fn render_all_tables(data: &[DataPoint]) {
    if data.is_empty() {
        println!("No results to display.");
        return;
    }

    let mut groups: Vec<(&str, Vec<&DataPoint>)> = Vec::new();
    for dp in data {
        match groups.iter_mut().find(|(name, _)| *name == dp.experiment) {
            Some((_, points)) => points.push(dp),
            None => groups.push((&dp.experiment, vec![dp])),
        }
    }

    for (name, points) in &groups {
        render_table(name, points);
    }
}
