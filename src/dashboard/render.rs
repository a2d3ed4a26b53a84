//! Chart models and their SVG rendering.
//!
//! Models are built straight from the aggregate views; rendering only lays
//! them out. Undefined rates are drawn as "n/a" markers, never as zero.

use std::fmt::Write as _;

use crate::analysis::{
    MitigationPeriod, NoiseRange, PeriodAggregate, PivotView, RangeAggregate, RangeBin, TempRange,
};

/// Bar colour for the pre-mitigation series.
pub const PRE_COLOR: &str = "#1f3b4d";
/// Bar colour for the post-mitigation series.
pub const POST_COLOR: &str = "#5ca4a9";

/// Upper end of the heatmap colour scale.
pub const HEATMAP_MAX: f64 = 0.5;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 150.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;

/// Candidate y-axis tick steps for rate charts.
const TICK_STEPS: [f64; 5] = [0.01, 0.02, 0.05, 0.1, 0.2];

pub fn period_color(period: MitigationPeriod) -> &'static str {
    match period {
        MitigationPeriod::Pre => PRE_COLOR,
        MitigationPeriod::Post => POST_COLOR,
    }
}

/// One bar of a bar chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub period: MitigationPeriod,
    pub rate: Option<f64>,
    /// Text drawn above the bar.
    pub annotation: Option<String>,
}

/// Bars sharing one x-axis category.
#[derive(Debug, Clone, PartialEq)]
pub struct BarGroup {
    pub label: String,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub groups: Vec<BarGroup>,
    pub legend: bool,
}

/// Defect rate by range bin, one bar per mitigation period.
pub fn range_bar_chart<B: RangeBin>(title: &'static str, agg: &RangeAggregate<B>) -> BarChart {
    let groups = B::ALL
        .into_iter()
        .map(|bin| BarGroup {
            label: bin.label().to_string(),
            bars: MitigationPeriod::ALL
                .into_iter()
                .map(|period| Bar {
                    period,
                    rate: agg.get(period, bin).and_then(|r| r.defect_rate),
                    annotation: None,
                })
                .collect(),
        })
        .collect();

    BarChart {
        title,
        x_label: B::AXIS_LABEL,
        y_label: "Defect Rate",
        groups,
        legend: true,
    }
}

/// Overall defect rate per mitigation period, annotated with defect counts.
pub fn total_bar_chart(title: &'static str, agg: &PeriodAggregate) -> BarChart {
    let groups = agg
        .rows
        .iter()
        .map(|row| BarGroup {
            label: row.mitigation_period.label().to_string(),
            bars: vec![Bar {
                period: row.mitigation_period,
                rate: row.defect_rate,
                annotation: Some(row.defect_count.to_string()),
            }],
        })
        .collect();

    BarChart {
        title,
        x_label: "Total Defects",
        y_label: "Defect Rate",
        groups,
        legend: false,
    }
}

/// Top of the y-axis and the tick step for a maximum rate.
fn y_scale(max_rate: f64) -> (f64, f64) {
    if max_rate.is_nan() || max_rate <= 0.0 {
        return (0.1, 0.02);
    }
    let step = TICK_STEPS
        .iter()
        .copied()
        .find(|s| max_rate / s <= 6.0)
        .unwrap_or(0.2);
    let top = (max_rate / step).ceil() * step;
    (top.max(step), step)
}

/// Formats a rate as a whole percentage, e.g. `0.25` -> `25%`.
pub fn percent_label(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

impl BarChart {
    pub fn max_rate(&self) -> f64 {
        self.groups
            .iter()
            .flat_map(|g| g.bars.iter())
            .filter_map(|b| b.rate)
            .fold(0.0, f64::max)
    }

    pub fn to_svg(&self) -> String {
        let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        let baseline = MARGIN_TOP + plot_h;
        let (top, step) = y_scale(self.max_rate());
        let y_of = |rate: f64| baseline - rate / top * plot_h;

        let mut svg = svg_open(self.title);

        // Grid and y ticks.
        let ticks = (top / step).round() as usize;
        for i in 0..=ticks {
            let value = step * i as f64;
            let y = y_of(value);
            let _ = write!(
                svg,
                r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#e5e5e5"/><text x="{:.1}" y="{:.1}" text-anchor="end" font-size="12">{}</text>"##,
                MARGIN_LEFT + plot_w,
                MARGIN_LEFT - 8.0,
                y + 4.0,
                percent_label(value),
            );
        }

        let group_w = plot_w / self.groups.len().max(1) as f64;
        for (gi, group) in self.groups.iter().enumerate() {
            let group_x = MARGIN_LEFT + group_w * gi as f64;
            let inner = group_w * 0.8;
            let bar_w = inner / group.bars.len().max(1) as f64;
            let start = group_x + (group_w - inner) / 2.0;

            for (bi, bar) in group.bars.iter().enumerate() {
                let x = start + bar_w * bi as f64;
                let cx = x + bar_w / 2.0;
                match bar.rate {
                    Some(rate) => {
                        let y = y_of(rate);
                        let _ = write!(
                            svg,
                            r#"<rect class="bar {}" x="{x:.1}" y="{y:.1}" width="{:.1}" height="{:.1}" fill="{}"><title>{}: {:.1}%</title></rect>"#,
                            bar.period.as_str(),
                            bar_w - 2.0,
                            baseline - y,
                            period_color(bar.period),
                            bar.period.as_str(),
                            rate * 100.0,
                        );
                        if let Some(text) = &bar.annotation {
                            let _ = write!(
                                svg,
                                r#"<text x="{cx:.1}" y="{:.1}" text-anchor="middle" font-size="12">{text}</text>"#,
                                y - 4.0,
                            );
                        }
                    }
                    None => {
                        let _ = write!(
                            svg,
                            r##"<text class="no-data" x="{cx:.1}" y="{:.1}" text-anchor="middle" font-size="10" fill="#888">n/a</text>"##,
                            baseline - 4.0,
                        );
                    }
                }
            }

            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="12">{}</text>"#,
                group_x + group_w / 2.0,
                baseline + 18.0,
                group.label,
            );
        }

        axis_labels(&mut svg, self.x_label, self.y_label);

        if self.legend {
            let lx = WIDTH - MARGIN_RIGHT + 20.0;
            let _ = write!(
                svg,
                r#"<text x="{lx}" y="{}" font-size="13" font-weight="bold">Mitigation</text>"#,
                MARGIN_TOP + 10.0,
            );
            for (i, period) in MitigationPeriod::ALL.into_iter().enumerate() {
                let y = MARGIN_TOP + 24.0 + 20.0 * i as f64;
                let _ = write!(
                    svg,
                    r#"<rect x="{lx}" y="{y}" width="14" height="14" fill="{}"/><text x="{}" y="{}" font-size="12">{}</text>"#,
                    period_color(period),
                    lx + 20.0,
                    y + 12.0,
                    period.as_str(),
                );
            }
        }

        svg.push_str("</svg>");
        svg
    }
}

/// One heatmap cell.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatCell {
    pub rate: Option<f64>,
    /// Fill colour; `None` for an empty cell.
    pub color: Option<String>,
    /// Annotation, blank for an empty cell.
    pub text: String,
}

/// Defect rate by temperature and noise range for one period.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub title: &'static str,
    /// Row labels top to bottom: highest temperature first.
    pub row_labels: Vec<&'static str>,
    pub col_labels: Vec<&'static str>,
    /// Rows in display order, matching `row_labels`.
    pub cells: Vec<Vec<HeatCell>>,
}

pub fn heatmap(title: &'static str, pivot: &PivotView) -> Heatmap {
    let rows: Vec<TempRange> = TempRange::ALL.into_iter().rev().collect();

    let cells = rows
        .iter()
        .map(|&t| {
            NoiseRange::ALL
                .into_iter()
                .map(|n| {
                    let rate = pivot.cell(t, n);
                    HeatCell {
                        rate,
                        color: rate.map(coolwarm),
                        text: rate
                            .map(|r| format!("{:.1}%", r * 100.0))
                            .unwrap_or_default(),
                    }
                })
                .collect()
        })
        .collect();

    Heatmap {
        title,
        row_labels: rows.iter().map(|t| t.label()).collect(),
        col_labels: NoiseRange::ALL.into_iter().map(|n| n.label()).collect(),
        cells,
    }
}

/// Diverging blue-grey-red colour for a rate on the [0, 0.5] scale.
pub fn coolwarm(rate: f64) -> String {
    const COOL: (f64, f64, f64) = (59.0, 76.0, 192.0);
    const MID: (f64, f64, f64) = (221.0, 221.0, 221.0);
    const WARM: (f64, f64, f64) = (180.0, 4.0, 38.0);

    let t = if rate.is_nan() {
        0.0
    } else {
        (rate / HEATMAP_MAX).clamp(0.0, 1.0)
    };
    let (from, to, f) = if t < 0.5 {
        (COOL, MID, t * 2.0)
    } else {
        (MID, WARM, (t - 0.5) * 2.0)
    };
    let lerp = |a: f64, b: f64| (a + (b - a) * f).round() as u8;

    format!(
        "#{:02x}{:02x}{:02x}",
        lerp(from.0, to.0),
        lerp(from.1, to.1),
        lerp(from.2, to.2)
    )
}

impl Heatmap {
    pub fn to_svg(&self) -> String {
        let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        let cell_w = plot_w / self.col_labels.len().max(1) as f64;
        let cell_h = plot_h / self.row_labels.len().max(1) as f64;

        let mut svg = svg_open(self.title);

        for (ri, row) in self.cells.iter().enumerate() {
            let y = MARGIN_TOP + cell_h * ri as f64;
            for (ci, cell) in row.iter().enumerate() {
                let x = MARGIN_LEFT + cell_w * ci as f64;
                let fill = cell.color.as_deref().unwrap_or("none");
                let _ = write!(
                    svg,
                    r##"<rect class="cell" x="{x:.1}" y="{y:.1}" width="{cell_w:.1}" height="{cell_h:.1}" fill="{fill}" stroke="#ffffff" stroke-width="0.5"/>"##,
                );
                if !cell.text.is_empty() {
                    let _ = write!(
                        svg,
                        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="12">{}</text>"#,
                        x + cell_w / 2.0,
                        y + cell_h / 2.0 + 4.0,
                        cell.text,
                    );
                }
            }
        }

        for (ri, label) in self.row_labels.iter().enumerate() {
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="end" font-size="12">{label}</text>"#,
                MARGIN_LEFT - 8.0,
                MARGIN_TOP + cell_h * ri as f64 + cell_h / 2.0 + 4.0,
            );
        }
        for (ci, label) in self.col_labels.iter().enumerate() {
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="12">{label}</text>"#,
                MARGIN_LEFT + cell_w * ci as f64 + cell_w / 2.0,
                MARGIN_TOP + plot_h + 18.0,
            );
        }

        axis_labels(&mut svg, NoiseRange::AXIS_LABEL, TempRange::AXIS_LABEL);
        color_bar(&mut svg, MARGIN_TOP, plot_h);

        svg.push_str("</svg>");
        svg
    }
}

fn svg_open(title: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {WIDTH} {HEIGHT}" width="{WIDTH}" height="{HEIGHT}" font-family="sans-serif"><text x="{:.1}" y="28" text-anchor="middle" font-size="18">{title}</text>"#,
        WIDTH / 2.0,
    )
}

fn axis_labels(svg: &mut String, x_label: &str, y_label: &str) {
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let _ = write!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="14">{x_label}</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        HEIGHT - 20.0,
    );
    let cy = MARGIN_TOP + plot_h / 2.0;
    let _ = write!(
        svg,
        r#"<text x="20" y="{cy:.1}" text-anchor="middle" font-size="14" transform="rotate(-90 20 {cy:.1})">{y_label}</text>"#,
    );
}

fn color_bar(svg: &mut String, top: f64, height: f64) {
    const STEPS: usize = 20;
    let x = WIDTH - MARGIN_RIGHT + 30.0;
    let step_h = height / STEPS as f64;

    for i in 0..STEPS {
        // Top of the bar is the hottest colour.
        let rate = HEATMAP_MAX * (STEPS - i) as f64 / STEPS as f64;
        let _ = write!(
            svg,
            r#"<rect x="{x}" y="{:.1}" width="18" height="{:.1}" fill="{}"/>"#,
            top + step_h * i as f64,
            step_h + 0.5,
            coolwarm(rate),
        );
    }
    for rate in [0.0, 0.1, 0.2, 0.3, 0.4, 0.5] {
        let _ = write!(
            svg,
            r#"<text x="{}" y="{:.1}" font-size="11">{}</text>"#,
            x + 24.0,
            top + height * (1.0 - rate / HEATMAP_MAX) + 4.0,
            percent_label(rate),
        );
    }
}
