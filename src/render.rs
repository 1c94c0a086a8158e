//! Shape aggregated rows into chart frames and format them for a terminal.

use serde::Serialize;
use serde_json::Value;

use crate::chart::{ChartConfig, ChartType};
use crate::record::{numeric, Record};

pub const DEFAULT_PALETTE: [&str; 5] = [
    "hsl(var(--chart-1))",
    "hsl(var(--chart-2))",
    "hsl(var(--chart-3))",
    "hsl(var(--chart-4))",
    "hsl(var(--chart-5))",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub value: f64,
    pub share: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChartFrame {
    Bar {
        orientation: Orientation,
        series: String,
        color: String,
        points: Vec<Point>,
    },
    Line {
        series: String,
        color: String,
        points: Vec<Point>,
    },
    Pie {
        slices: Vec<Slice>,
    },
}

fn label_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn color_at(config: &ChartConfig, i: usize) -> String {
    if config.colors.is_empty() {
        DEFAULT_PALETTE[i % DEFAULT_PALETTE.len()].to_string()
    } else {
        config.colors[i % config.colors.len()].clone()
    }
}

/// Map aggregated rows onto the shape named by `config.chart_type`.
pub fn frame(rows: &[Record], config: &ChartConfig) -> ChartFrame {
    let points: Vec<Point> = rows
        .iter()
        .map(|r| Point {
            label: label_of(r.get(&config.x_axis)),
            value: numeric(r.get(&config.y_axis)),
        })
        .collect();
    let series = config.y_axis.clone();

    match config.chart_type {
        ChartType::Bar => ChartFrame::Bar {
            orientation: Orientation::Vertical,
            series,
            color: color_at(config, 0),
            points,
        },
        ChartType::HorizontalBar => ChartFrame::Bar {
            orientation: Orientation::Horizontal,
            series,
            color: color_at(config, 0),
            points,
        },
        ChartType::Line => ChartFrame::Line {
            series,
            color: color_at(config, 0),
            points,
        },
        ChartType::Pie => {
            let total: f64 = points
                .iter()
                .filter(|p| p.value.is_finite())
                .map(|p| p.value)
                .sum();
            let slices = points
                .into_iter()
                .enumerate()
                .map(|(i, p)| Slice {
                    share: if total != 0.0 && p.value.is_finite() {
                        p.value / total
                    } else {
                        0.0
                    },
                    color: color_at(config, i),
                    label: p.label,
                    value: p.value,
                })
                .collect();
            ChartFrame::Pie { slices }
        }
    }
}

/// Value-axis tick: `₩1.2M`, `₩350K`, `₩900`, `-₩2.5M`.
pub fn axis_tick(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{}₩{:.1}M", sign, magnitude / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{}₩{:.0}K", sign, magnitude / 1_000.0)
    } else {
        format!("{}₩{}", sign, trim_float(magnitude))
    }
}

/// KRW currency string without decimals: `₩1,234,567`.
pub fn format_krw(value: f64) -> String {
    let v = if value.is_finite() { value.round() } else { 0.0 };
    let digits = group_digits(v.abs() as u64);
    if v < 0.0 {
        format!("-₩{}", digits)
    } else {
        format!("₩{}", digits)
    }
}

pub fn group_digits(n: u64) -> String {
    let raw = n.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, ch) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

const BAR_WIDTH: usize = 40;

/// Plain-text rendering for the CLI.
pub fn render_text(frame: &ChartFrame) -> String {
    let mut out = String::new();
    match frame {
        ChartFrame::Bar { points, series, .. } | ChartFrame::Line { points, series, .. } => {
            let max = points
                .iter()
                .filter(|p| p.value.is_finite())
                .fold(0.0f64, |m, p| m.max(p.value.abs()));
            let width = points.iter().map(|p| p.label.chars().count()).max().unwrap_or(0);
            let glyph = if matches!(frame, ChartFrame::Line { .. }) { '·' } else { '█' };
            out.push_str(&format!("{}\n", series));
            for p in points {
                let len = if max > 0.0 && p.value.is_finite() {
                    ((p.value.abs() / max) * BAR_WIDTH as f64).round() as usize
                } else {
                    0
                };
                out.push_str(&format!(
                    "{:<width$} │{} {}\n",
                    p.label,
                    glyph.to_string().repeat(len),
                    axis_tick(p.value),
                    width = width
                ));
            }
        }
        ChartFrame::Pie { slices } => {
            let width = slices.iter().map(|s| s.label.chars().count()).max().unwrap_or(0);
            for s in slices {
                out.push_str(&format!(
                    "{:<width$} {:>6.1}%  {}\n",
                    s.label,
                    s.share * 100.0,
                    axis_tick(s.value),
                    width = width
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Aggregation;
    use crate::record::record;
    use serde_json::json;

    fn rows() -> Vec<Record> {
        vec![
            record(&[("m", json!("Jan")), ("v", json!(30))]),
            record(&[("m", json!("Feb")), ("v", json!(10))]),
        ]
    }

    #[test]
    fn test_horizontal_bar_orientation() {
        let cfg = ChartConfig::new(ChartType::HorizontalBar, "m", "v", Aggregation::Sum);
        match frame(&rows(), &cfg) {
            ChartFrame::Bar { orientation, points, .. } => {
                assert_eq!(orientation, Orientation::Horizontal);
                assert_eq!(points[0], Point { label: "Jan".into(), value: 30.0 });
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_pie_shares_and_colors() {
        let mut cfg = ChartConfig::new(ChartType::Pie, "m", "v", Aggregation::Sum);
        cfg.colors = vec!["red".into()];
        match frame(&rows(), &cfg) {
            ChartFrame::Pie { slices } => {
                assert!((slices[0].share - 0.75).abs() < 1e-9);
                assert!((slices[1].share - 0.25).abs() < 1e-9);
                assert_eq!(slices[1].color, "red");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_axis_tick() {
        assert_eq!(axis_tick(2_500_000.0), "₩2.5M");
        assert_eq!(axis_tick(35_000.0), "₩35K");
        assert_eq!(axis_tick(900.0), "₩900");
        assert_eq!(axis_tick(-2_500_000.0), "-₩2.5M");
        assert_eq!(axis_tick(-35_000.0), "-₩35K");
        assert_eq!(axis_tick(-900.0), "-₩900");
    }

    #[test]
    fn test_format_krw() {
        assert_eq!(format_krw(1_234_567.0), "₩1,234,567");
        assert_eq!(format_krw(-5_200.0), "-₩5,200");
        assert_eq!(format_krw(0.0), "₩0");
        assert_eq!(format_krw(f64::NAN), "₩0");
    }

    #[test]
    fn test_render_text_lists_every_label() {
        let cfg = ChartConfig::new(ChartType::Bar, "m", "v", Aggregation::Sum);
        let text = render_text(&frame(&rows(), &cfg));
        assert!(text.contains("Jan"));
        assert!(text.contains("Feb"));
    }
}
