use std::{collections::BTreeSet, time::Duration};

use hyped::*;
use plotly::{
    color::Rgb,
    common::{Line, Mode},
    layout::{Axis, AxisType},
    Layout, Plot, Scatter,
};
use serde::Deserialize;

use crate::{
    buffer::{SharedBuffer, DAY, MONTH, WEEK},
    Fields, Time, MEMORY_FREE, MEMORY_USED,
};

const MAX_DISPLAY_DATA_POINTS: usize = 1024;
const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.12.1.min.js";
pub const CHART_DIV_ID: &str = "memory-chart";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartView {
    #[default]
    Daily,
    Weekly,
    Monthly,
}
impl ChartView {
    pub const ALL: [ChartView; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
    pub fn span(&self) -> Duration {
        match self {
            Self::Daily => DAY,
            Self::Weekly => WEEK,
            Self::Monthly => MONTH,
        }
    }
    pub fn title(&self) -> &'static str {
        match self {
            Self::Daily => "Memory Usage (Last 24 hours)",
            Self::Weekly => "Memory Usage (Last 7 days, hourly mean)",
            Self::Monthly => "Memory Usage (Last 4 weeks, 3-hourly mean)",
        }
    }

    /// Copies the points of this view out of the buffer, newest first.
    pub fn points(&self, buffer: &SharedBuffer, now: Time) -> Vec<(Time, Fields)> {
        match self {
            Self::Daily => buffer
                .daily(now)
                .into_iter()
                .map(|sample| (sample.time, sample.fields))
                .collect(),
            Self::Weekly => buffer
                .weekly(now)
                .into_iter()
                .map(|bucket| (bucket.start, bucket.fields))
                .collect(),
            Self::Monthly => buffer
                .monthly(now)
                .into_iter()
                .map(|bucket| (bucket.start, bucket.fields))
                .collect(),
        }
    }
}

fn trace_style(key: &str) -> (String, Option<Rgb>) {
    match key {
        MEMORY_FREE => ("Memory Free".into(), Some(Rgb::new(0x88, 0x23, 0x34))),
        MEMORY_USED => ("Memory Used".into(), Some(Rgb::new(0xa7, 0xbb, 0x99))),
        _ => (key.into(), None),
    }
}

/// Keeps the last element of each of at most `max` equal chunks.
fn downsample<T: Copy>(values: &[T], max: usize) -> Vec<T> {
    let chunk_size = values.len().div_ceil(max.max(1)).max(1);
    values
        .chunks(chunk_size)
        .filter_map(|chunk| chunk.last().copied())
        .collect()
}

/// Renders one line per field over `time_range`. `points` may come in any order and may be empty.
pub fn memory_chart_html(
    points: &[(Time, Fields)],
    time_range: (Time, Time),
    title: &str,
    div_id: Option<&str>,
) -> String {
    let mut points: Vec<&(Time, Fields)> = points.iter().collect();
    points.sort_by_key(|(time, _)| *time);
    let keys: BTreeSet<&str> = points
        .iter()
        .flat_map(|(_, fields)| fields.keys().map(String::as_str))
        .collect();

    let mut plot = Plot::new();
    for key in keys {
        let (x, y): (Vec<u64>, Vec<f64>) = points
            .iter()
            .filter_map(|(time, fields)| fields.get(key).map(|value| (time * 1000, *value)))
            .unzip();
        let x = downsample(&x, MAX_DISPLAY_DATA_POINTS);
        let y = downsample(&y, MAX_DISPLAY_DATA_POINTS);
        let (name, color) = trace_style(key);
        let trace = Scatter::new(x, y).name(name).mode(Mode::LinesMarkers);
        let trace = match color {
            Some(color) => trace.line(Line::new().color(color)),
            None => trace,
        };
        plot.add_trace(trace);
    }
    let (start, end) = time_range;
    let x = Axis::default()
        .title("Time")
        .type_(AxisType::Date)
        .range(vec![(start * 1000) as f64, (end * 1000) as f64]);
    let layout = Layout::default()
        .title(title)
        .x_axis(x)
        .y_axis(Axis::default().title("Bytes"));
    plot.set_layout(layout);
    plot.to_inline_html(div_id)
}

/// Wraps a rendered chart into a full page with links to every view.
pub fn page_html(chart: String, current: ChartView) -> String {
    let nav = ChartView::ALL
        .iter()
        .map(|view| {
            if *view == current {
                format!("<b>{}</b>", view.as_str())
            } else {
                format!(r#"<a href="/?view={0}">{0}</a>"#, view.as_str())
            }
        })
        .collect::<Vec<_>>()
        .join(" | ");
    let plotly = script(()).src(PLOTLY_JS);
    let root_div = div((plotly, danger(nav), danger(chart)));
    let body = hyped::body(root_div);
    let root = (doctype(), html(body));
    render(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(free: f64, used: f64) -> Fields {
        Fields::from([(MEMORY_FREE.into(), free), (MEMORY_USED.into(), used)])
    }

    #[test]
    fn downsample_keeps_chunk_tails() {
        let values: Vec<u32> = (0..10).collect();
        assert_eq!(downsample(&values, 5), [1, 3, 5, 7, 9]);
        assert_eq!(downsample(&values, 3), [3, 7, 9]);
        assert_eq!(downsample(&values, 100), values);
        assert!(downsample::<u32>(&[], 4).is_empty());
    }

    #[test]
    fn empty_chart_renders() {
        let html = memory_chart_html(&[], (0, 86_400), ChartView::Daily.title(), Some(CHART_DIV_ID));
        assert!(html.contains(CHART_DIV_ID));
        assert!(html.contains("Memory Usage"));
    }

    #[test]
    fn chart_has_one_trace_per_field() {
        let points = vec![(120, memory(1.0, 2.0)), (60, memory(3.0, 4.0))];
        let html = memory_chart_html(&points, (0, 180), "test", Some(CHART_DIV_ID));
        assert!(html.contains("Memory Free"));
        assert!(html.contains("Memory Used"));
    }

    #[test]
    fn page_links_other_views() {
        let page = page_html(String::from("<div>chart</div>"), ChartView::Weekly);
        assert!(page.contains("<div>chart</div>"));
        assert!(page.contains(PLOTLY_JS));
        assert!(page.contains(r#"href="/?view=daily""#));
        assert!(page.contains(r#"href="/?view=monthly""#));
        assert!(!page.contains(r#"href="/?view=weekly""#));
    }

    #[test]
    fn views_read_the_buffer() {
        let buffer = SharedBuffer::default();
        let now = 1_700_000_000;
        for i in 0..8 {
            buffer.insert(Some(now - i * 900), memory(i as f64, 0.0));
        }
        assert_eq!(ChartView::Daily.points(&buffer, now).len(), 8);
        let weekly = ChartView::Weekly.points(&buffer, now);
        assert!(!weekly.is_empty() && weekly.len() <= 3);
        assert!(!ChartView::Monthly.points(&buffer, now).is_empty());
    }
}
