use std::path::Path;

use plotters::{
    prelude::{ChartBuilder, IntoDrawingArea, PathElement, SVGBackend, SeriesLabelPosition},
    series::LineSeries,
    style::{Color, RGBColor, ShapeStyle, BLACK, BLUE, GREEN, MAGENTA, RED, WHITE},
};

use crate::error::{EngineError, Result};

const CHART_SIZE: (u32, u32) = (1280, 720);
const PALETTE: [RGBColor; 4] = [BLUE, RED, GREEN, MAGENTA];

fn chart_error(error: impl std::fmt::Display) -> EngineError {
    EngineError::Chart(error.to_string())
}

/// y range padded by 5% so flat series still render
fn value_range<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|value| value.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
            (min.min(*value), max.max(*value))
        });
    if !min.is_finite() {
        return None;
    }
    let range = (max - min).max(0.01);
    Some((min - range * 0.05, max + range * 0.05))
}

pub fn simple_chart(dir: &Path, name: &str, data: &[f64]) -> Result<()> {
    multi_line_chart(dir, name, &[(name, data)])
}

/// Draws every series on shared axes into `<dir>/<name>.svg`. Empty input
/// writes nothing.
pub fn multi_line_chart(dir: &Path, name: &str, series: &[(&str, &[f64])]) -> Result<()> {
    let Some((y_min, y_max)) = value_range(series.iter().flat_map(|(_, data)| data.iter())) else {
        return Ok(());
    };
    let x_max = series.iter().map(|(_, data)| data.len()).max().unwrap_or(1).max(2) as u32;

    let path = dir.join(format!("{name}.svg"));
    let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(name, ("sans-serif", 20))
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0..x_max, y_min..y_max)
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .light_line_style(WHITE)
        .draw()
        .map_err(chart_error)?;

    for (index, (label, data)) in series.iter().enumerate() {
        let color = PALETTE[index % PALETTE.len()];
        chart
            .draw_series(LineSeries::new(
                data.iter()
                    .enumerate()
                    .filter(|(_, value)| value.is_finite())
                    .map(|(index, value)| (index as u32, *value)),
                ShapeStyle::from(&color).stroke_width(1),
            ))
            .map_err(chart_error)?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], ShapeStyle::from(&color)));
    }

    if series.len() > 1 {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_error)?;
    }

    root.present().map_err(chart_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        simple_chart(dir.path(), "reward", &[1.0, -2.0, 3.0]).unwrap();
        let written = std::fs::read_to_string(dir.path().join("reward.svg")).unwrap();
        assert!(written.contains("<svg"));
    }

    #[test]
    fn test_empty_series_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        simple_chart(dir.path(), "empty", &[]).unwrap();
        assert!(!dir.path().join("empty.svg").exists());
    }
}
