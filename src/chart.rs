use std::fmt;

use askama::Template;
use chrono::NaiveDate;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use rusty_money::{iso, FormattableCurrency};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::pipeline::{day_name, format_date, PriceReport, View};

const CHEAP_COLOR: BarColor = BarColor(255, 255, 0);
const TODAY_COLOR: BarColor = BarColor(0, 0, 205);
const NEXT_DAY_COLOR: BarColor = BarColor(178, 34, 34);
const HIGHLIGHT_OUTLINE: RGBColor = RED;
const CHART_SIZE: (u32, u32) = (1400, 700);
/// Share of one hour slot taken by the bars of all series together.
const GROUP_WIDTH: f64 = 0.8;
const TERMINAL_BAR_WIDTH: usize = 40;

#[derive(Debug, Error)]
pub(crate) enum RenderError {
    #[error("failed to draw chart: {0}")]
    Draw(String),
    #[error("failed to render chart page: {0}")]
    Page(#[from] askama::Error),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for RenderError {
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        RenderError::Draw(e.to_string())
    }
}

/// Fill color of a bar, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BarColor(u8, u8, u8);

impl fmt::Display for BarColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl Serialize for BarColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<BarColor> for RGBColor {
    fn from(color: BarColor) -> Self {
        RGBColor(color.0, color.1, color.2)
    }
}

/// Everything a renderer needs to draw the bar chart of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ChartSpec {
    pub(crate) view: View,
    pub(crate) title: String,
    pub(crate) x_axis_title: &'static str,
    pub(crate) y_axis_title: String,
    pub(crate) legend_title: &'static str,
    pub(crate) source_currency: &'static str,
    pub(crate) currency: &'static str,
    pub(crate) currency_symbol: &'static str,
    pub(crate) exchange_rate: f64,
    pub(crate) cheap_threshold: Option<f64>,
    pub(crate) current_hour: Option<usize>,
    pub(crate) series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ChartSeries {
    pub(crate) name: String,
    pub(crate) date: NaiveDate,
    pub(crate) bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Bar {
    pub(crate) hour: String,
    pub(crate) price: f64,
    pub(crate) label: String,
    pub(crate) color: BarColor,
    /// Below the view's cheap threshold.
    pub(crate) cheap: bool,
    /// The running hour in views that track it.
    pub(crate) highlighted: bool,
}

pub(crate) fn build_chart(report: &PriceReport) -> ChartSpec {
    let symbol = iso::CZK.symbol();

    let title = match (report.view, report.days.first()) {
        (View::NextDay, Some(day)) => format!(
            "Spotové ceny v Česku k: {} za jednu kWh.",
            format_date(day.date)
        ),
        (View::CurrentHour, Some(day)) => format!(
            "Spotové ceny elektřiny v Česku k {}",
            day.date.format("%d.%m.%Y")
        ),
        _ => "Spotové ceny elektřiny v Česku".to_string(),
    };

    let (min_price, max_price) = price_bounds(report);

    let series = report
        .days
        .iter()
        .map(|day| ChartSeries {
            name: format!("{} ({})", day_name(day.day_offset), format_date(day.date)),
            date: day.date,
            bars: day
                .prices
                .iter()
                .enumerate()
                .map(|(hour, price)| {
                    let cheap = report
                        .policy
                        .cheap_threshold
                        .is_some_and(|threshold| price.czk_per_kwh < threshold);

                    let color = if cheap {
                        CHEAP_COLOR
                    } else if report.view == View::NextDay {
                        red_yellow_green(price.czk_per_kwh, min_price, max_price)
                    } else {
                        series_color(day.day_offset)
                    };

                    Bar {
                        hour: price.hour.clone(),
                        price: price.czk_per_kwh,
                        label: format!("{:.2} {}", price.czk_per_kwh, symbol),
                        color,
                        cheap,
                        highlighted: report.current_hour == Some(hour),
                    }
                })
                .collect(),
        })
        .collect();

    ChartSpec {
        view: report.view,
        title,
        x_axis_title: "Hodina",
        y_axis_title: format!("Cena v {}", symbol),
        legend_title: "Legenda",
        source_currency: iso::EUR.code(),
        currency: iso::CZK.code(),
        currency_symbol: symbol,
        exchange_rate: report.rate.czk_per_eur(),
        cheap_threshold: report.policy.cheap_threshold,
        current_hour: report.current_hour,
        series,
    }
}

fn series_color(day_offset: u64) -> BarColor {
    match day_offset {
        0 => TODAY_COLOR,
        _ => NEXT_DAY_COLOR,
    }
}

fn price_bounds(report: &PriceReport) -> (f64, f64) {
    report
        .days
        .iter()
        .flat_map(|day| day.prices.iter().map(|p| p.czk_per_kwh))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), price| {
            (min.min(price), max.max(price))
        })
}

/// Continuous red-yellow-green scale: the lowest price is red, the highest green.
fn red_yellow_green(price: f64, min: f64, max: f64) -> BarColor {
    const RED: (f64, f64, f64) = (165.0, 0.0, 38.0);
    const YELLOW: (f64, f64, f64) = (255.0, 255.0, 191.0);
    const GREEN: (f64, f64, f64) = (0.0, 104.0, 55.0);

    let position = if max > min {
        ((price - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let (from, to, t) = if position < 0.5 {
        (RED, YELLOW, position * 2.0)
    } else {
        (YELLOW, GREEN, (position - 0.5) * 2.0)
    };

    let mix = |a: f64, b: f64| (a + (b - a) * t).round() as u8;

    BarColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

/// Plain text bar chart, one line per hour and series.
pub(crate) fn render_terminal(spec: &ChartSpec) -> String {
    let scale = spec
        .series
        .iter()
        .flat_map(|s| s.bars.iter().map(|b| b.price.abs()))
        .fold(0.0_f64, f64::max);

    let mut lines = Vec::new();

    if let Some(note) = price_date_note(spec) {
        lines.push(note);
    }

    lines.push(spec.title.clone());
    lines.push(format!(
        "{}: 1 {} = {} {}",
        spec.legend_title, spec.source_currency, spec.exchange_rate, spec.currency
    ));

    for series in &spec.series {
        lines.push(String::new());
        lines.push(series.name.clone());

        for bar in &series.bars {
            let length = if scale > 0.0 {
                (bar.price.abs() / scale * TERMINAL_BAR_WIDTH as f64).round() as usize
            } else {
                0
            };
            let glyph = if bar.price < 0.0 { "░" } else { "█" };
            let marker = match (bar.cheap, bar.highlighted) {
                (_, true) => " ◀",
                (true, false) => " *",
                (false, false) => "",
            };

            lines.push(format!(
                "{:>5} {:<width$} {:>10}{}",
                bar.hour,
                glyph.repeat(length),
                bar.label,
                marker,
                width = TERMINAL_BAR_WIDTH
            ));
        }
    }

    if let Some(threshold) = spec.cheap_threshold {
        lines.push(String::new());
        lines.push(format!(
            "* cena pod {:.2} {}",
            threshold, spec.currency_symbol
        ));
    }

    lines.push(String::new());
    lines.join("\n")
}

/// The line announcing which day a next-day chart is for, e.g. "cena spotu k 16.6.2024".
pub(crate) fn price_date_note(spec: &ChartSpec) -> Option<String> {
    match (spec.view, spec.series.first()) {
        (View::NextDay, Some(series)) => {
            Some(format!("cena spotu k {}", format_date(series.date)))
        }
        _ => None,
    }
}

/// Grouped bar chart as a standalone SVG document.
///
/// Bars are filled with their own color, the value label sits on top of each
/// bar and a highlighted bar gets a red outline. Each series is listed in the
/// legend with its date.
pub(crate) fn render_svg(spec: &ChartSpec) -> Result<String, RenderError> {
    let mut svg_data = String::new();

    {
        let root = SVGBackend::with_string(&mut svg_data, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let (min_price, max_price) = spec
            .series
            .iter()
            .flat_map(|s| s.bars.iter().map(|b| b.price))
            .fold((0.0_f64, 0.0_f64), |(min, max), price| {
                (min.min(price), max.max(price))
            });

        // Leaves room for the value labels above the tallest bar
        let padding = ((max_price - min_price) * 0.15).max(0.1);
        let y_min = if min_price < 0.0 { min_price - padding } else { 0.0 };
        let y_max = max_price + padding;

        let hours = spec
            .series
            .iter()
            .map(|s| s.bars.len())
            .max()
            .unwrap_or(0)
            .max(1);
        let hour_labels = spec
            .series
            .iter()
            .max_by_key(|s| s.bars.len())
            .map(|s| s.bars.iter().map(|b| b.hour.as_str()).collect::<Vec<&str>>())
            .unwrap_or_default();

        let mut chart = ChartBuilder::on(&root)
            .caption(&spec.title, ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5..hours as f64 - 0.5, y_min..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(spec.x_axis_title)
            .y_desc(spec.y_axis_title.as_str())
            .x_labels(hours)
            .y_labels(10)
            .x_label_formatter(&|x| {
                let hour = x.round();
                if (x - hour).abs() > f64::EPSILON || hour < 0.0 {
                    return String::new();
                }
                hour_labels
                    .get(hour as usize)
                    .map(|label| label.to_string())
                    .unwrap_or_default()
            })
            .y_label_formatter(&|price| format!("{:.2}", price))
            .label_style(("sans-serif", 14))
            .draw()?;

        let bar_width = GROUP_WIDTH / spec.series.len().max(1) as f64;
        let value_style =
            TextStyle::from(("sans-serif", 10)).pos(Pos::new(HPos::Center, VPos::Bottom));

        for (index, series) in spec.series.iter().enumerate() {
            let left = |hour: usize| hour as f64 - GROUP_WIDTH / 2.0 + index as f64 * bar_width;
            let legend_color = RGBColor::from(
                series
                    .bars
                    .iter()
                    .find(|bar| !bar.cheap)
                    .map_or(CHEAP_COLOR, |bar| bar.color),
            );

            chart
                .draw_series(series.bars.iter().enumerate().map(|(hour, bar)| {
                    let x = left(hour);
                    Rectangle::new(
                        [(x, 0.0), (x + bar_width, bar.price)],
                        RGBColor::from(bar.color).filled(),
                    )
                }))?
                .label(series.name.as_str())
                .legend(move |(x, y)| {
                    Rectangle::new([(x - 15, y - 6), (x - 3, y + 6)], legend_color.filled())
                });

            chart.draw_series(
                series
                    .bars
                    .iter()
                    .enumerate()
                    .filter(|(_, bar)| bar.highlighted)
                    .map(|(hour, bar)| {
                        let x = left(hour);
                        PathElement::new(
                            vec![
                                (x, 0.0),
                                (x, bar.price),
                                (x + bar_width, bar.price),
                                (x + bar_width, 0.0),
                                (x, 0.0),
                            ],
                            HIGHLIGHT_OUTLINE.stroke_width(3),
                        )
                    }),
            )?;

            chart.draw_series(series.bars.iter().enumerate().map(|(hour, bar)| {
                Text::new(
                    bar.label.clone(),
                    (left(hour) + bar_width / 2.0, bar.price.max(0.0)),
                    value_style.clone(),
                )
            }))?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 16))
            .draw()?;

        root.present()?;
    } // root is dropped here, releasing the borrow on svg_data

    Ok(svg_data)
}

#[derive(Template)]
#[template(path = "chart.html")]
struct ChartPage<'a> {
    title: &'a str,
    legend_title: &'a str,
    source_currency: &'a str,
    currency: &'a str,
    exchange_rate: f64,
    svg: String,
}

/// Standalone HTML page around the SVG chart.
pub(crate) fn render_html(spec: &ChartSpec) -> Result<String, RenderError> {
    let page = ChartPage {
        title: &spec.title,
        legend_title: spec.legend_title,
        source_currency: spec.source_currency,
        currency: spec.currency,
        exchange_rate: spec.exchange_rate,
        svg: render_svg(spec)?,
    };

    Ok(page.render()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExchangeRate, HourlyPrice};
    use crate::pipeline::{tests::date, DaySeries};

    fn day(date: NaiveDate, day_offset: u64, prices: &[f64]) -> DaySeries {
        DaySeries {
            date,
            day_offset,
            prices: prices
                .iter()
                .enumerate()
                .map(|(hour, price)| HourlyPrice {
                    hour: format!("{hour}:00"),
                    czk_per_kwh: *price,
                })
                .collect(),
        }
    }

    fn report(view: View, days: Vec<DaySeries>, current_hour: Option<usize>) -> PriceReport {
        PriceReport {
            view,
            policy: view.policy(),
            rate: ExchangeRate::new(25.0).unwrap(),
            days,
            current_hour,
        }
    }

    fn alternating_day() -> Vec<f64> {
        (0..24)
            .map(|hour| if hour % 2 == 0 { 0.35 } else { 2.5 })
            .collect()
    }

    #[test]
    fn test_two_day_flags_cheap_bars() {
        let spec = build_chart(&report(
            View::TwoDay,
            vec![
                day(date(2024, 6, 15), 0, &alternating_day()),
                day(date(2024, 6, 16), 1, &[0.4; 24]),
            ],
            None,
        ));

        let today = &spec.series[0];
        assert_eq!(today.name, "Aktuální den (15.6.2024)");
        assert!(today.bars[0].cheap);
        assert_eq!(today.bars[0].color, CHEAP_COLOR);
        assert!(!today.bars[1].cheap);
        assert_eq!(today.bars[1].color, TODAY_COLOR);

        let tomorrow = &spec.series[1];
        assert_eq!(tomorrow.name, "Následující den (16.6.2024)");
        assert!(tomorrow.bars.iter().all(|bar| !bar.cheap));
        assert!(tomorrow.bars.iter().all(|bar| bar.color == NEXT_DAY_COLOR));

        assert_eq!(spec.title, "Spotové ceny elektřiny v Česku");
        assert_eq!(spec.cheap_threshold, Some(0.4));
    }

    #[test]
    fn test_current_hour_highlights_one_bar() {
        let spec = build_chart(&report(
            View::CurrentHour,
            vec![day(date(2024, 6, 15), 0, &alternating_day())],
            Some(13),
        ));

        let highlighted = spec.series[0]
            .bars
            .iter()
            .enumerate()
            .filter(|(_, bar)| bar.highlighted)
            .map(|(hour, _)| hour)
            .collect::<Vec<usize>>();

        assert_eq!(highlighted, vec![13]);
        assert_eq!(spec.title, "Spotové ceny elektřiny v Česku k 15.06.2024");
    }

    #[test]
    fn test_next_day_uses_color_scale_without_threshold() {
        let prices = (0..24).map(|hour| hour as f64 * 0.1).collect::<Vec<f64>>();
        let spec = build_chart(&report(
            View::NextDay,
            vec![day(date(2024, 6, 16), 1, &prices)],
            None,
        ));

        let bars = &spec.series[0].bars;
        assert!(bars.iter().all(|bar| !bar.cheap && !bar.highlighted));
        assert_eq!(bars[0].color.to_string(), "#a50026");
        assert_eq!(bars[23].color.to_string(), "#006837");
        assert_eq!(
            spec.title,
            "Spotové ceny v Česku k: 16.6.2024 za jednu kWh."
        );
    }

    #[test]
    fn test_labels_use_koruna_symbol() {
        let spec = build_chart(&report(
            View::NextDay,
            vec![day(date(2024, 6, 16), 1, &[2.5; 24])],
            None,
        ));

        assert_eq!(spec.series[0].bars[0].label, "2.50 Kč");
        assert_eq!(spec.y_axis_title, "Cena v Kč");
        assert_eq!(spec.currency, "CZK");
        assert_eq!(spec.source_currency, "EUR");
    }

    #[test]
    fn test_render_terminal() {
        let spec = build_chart(&report(
            View::CurrentHour,
            vec![day(date(2024, 6, 15), 0, &alternating_day())],
            Some(1),
        ));

        let text = render_terminal(&spec);

        assert!(text.starts_with("Spotové ceny elektřiny v Česku k 15.06.2024\n"));
        assert!(text.contains("2.50 Kč ◀"));
        assert!(text.contains("0.35 Kč *"));
        assert!(text.contains("* cena pod 0.40 Kč"));
        assert_eq!(text.lines().filter(|l| l.contains(":00 ")).count(), 24);
    }

    #[test]
    fn test_next_day_terminal_output_names_the_day() {
        let spec = build_chart(&report(
            View::NextDay,
            vec![day(date(2024, 6, 16), 1, &[2.5; 24])],
            None,
        ));

        assert_eq!(
            price_date_note(&spec).as_deref(),
            Some("cena spotu k 16.6.2024")
        );
        assert!(render_terminal(&spec).starts_with(
            "cena spotu k 16.6.2024\nSpotové ceny v Česku k: 16.6.2024 za jednu kWh.\n"
        ));
    }

    #[test]
    fn test_only_next_day_names_the_day() {
        let spec = build_chart(&report(
            View::TwoDay,
            vec![day(date(2024, 6, 15), 0, &[2.5; 24])],
            None,
        ));

        assert_eq!(price_date_note(&spec), None);
    }

    #[test]
    fn test_render_svg_draws_bars_in_their_colors() {
        let spec = build_chart(&report(
            View::TwoDay,
            vec![
                day(date(2024, 6, 15), 0, &alternating_day()),
                day(date(2024, 6, 16), 1, &[-0.1; 24]),
            ],
            None,
        ));

        let svg = render_svg(&spec).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("fill=\"#FFFF00\""));
        assert!(svg.contains("fill=\"#0000CD\""));
        assert!(svg.contains("Aktuální den (15.6.2024)"));
        assert!(svg.contains("Následující den (16.6.2024)"));
        assert!(svg.contains("2.50 Kč"));
        assert!(!svg.contains("stroke-width=\"3\""));
    }

    #[test]
    fn test_render_svg_outlines_highlighted_bar() {
        let spec = build_chart(&report(
            View::CurrentHour,
            vec![day(date(2024, 6, 15), 0, &alternating_day())],
            Some(5),
        ));

        let svg = render_svg(&spec).unwrap();

        let outlines = svg
            .lines()
            .filter(|line| line.contains("stroke=\"#FF0000\"") && line.contains("stroke-width=\"3\""))
            .count();
        assert_eq!(outlines, 1);
    }

    #[test]
    fn test_render_html() {
        let spec = build_chart(&report(
            View::TwoDay,
            vec![
                day(date(2024, 6, 15), 0, &alternating_day()),
                day(date(2024, 6, 16), 1, &[-0.1; 24]),
            ],
            None,
        ));

        let html = render_html(&spec).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Spotové ceny elektřiny v Česku</title>"));
        assert!(html.contains("<svg"));
        assert!(html.contains("Legenda: 1 EUR = 25 CZK"));
    }

    #[test]
    fn test_chart_spec_serializes() {
        let spec = build_chart(&report(
            View::TwoDay,
            vec![day(date(2024, 6, 15), 0, &[1.0; 24])],
            None,
        ));

        let json = serde_json::to_value(&spec).unwrap();

        assert_eq!(json["view"], "two-day");
        assert_eq!(json["series"][0]["date"], "2024-06-15");
        assert_eq!(json["series"][0]["bars"][0]["label"], "1.00 Kč");
    }
}
