use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;
use crate::analysis::AnalysisError;
use crate::types::{AxisLimits, WaveformFrame};
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub cell_width: u32,
    pub cell_height: u32,
    pub background: RGBColor,
    pub line: RGBColor,
    pub highlight: RGBColor,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            cell_width: 320,
            cell_height: 220,
            background: RGBColor(10, 10, 10),
            line: CYAN,
            highlight: YELLOW,
        }
    }
}
/// Draws every class average into its own cell of a `rows x cols` grid.
///
/// Cells are filled row by row in ascending class order; cells without a
/// class stay empty. `highlight` marks the currently selected class.
pub fn render_class_grid_png(
    frame: &WaveformFrame,
    limits: AxisLimits,
    rows: usize,
    cols: usize,
    highlight: Option<u32>,
    style: &PlotStyle,
) -> Result<Vec<u8>, AnalysisError> {
    if rows == 0 || cols == 0 {
        return Err(AnalysisError::Plot(format!("empty grid {rows}x{cols}")));
    }
    if frame.trial_len() == 0 {
        return Err(AnalysisError::Plot("waveform frame has no samples".into()));
    }
    if !(limits.max > limits.min) {
        return Err(AnalysisError::Plot(format!(
            "y limits must be increasing, got {} .. {}",
            limits.min, limits.max
        )));
    }
    let width = style.cell_width * cols as u32;
    let height = style.cell_height * rows as u32;
    let mut buffer = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&style.background)?;
        let time_ms = frame.time_axis_ms();
        let x_max = time_ms.last().copied().unwrap_or(0.0).max(1.0);
        let cells = root.split_evenly((rows, cols));
        for (idx, cell) in cells.iter().enumerate() {
            let Some(&class_id) = frame.class_ids.get(idx) else {
                continue;
            };
            let color = if highlight == Some(class_id) {
                style.highlight
            } else {
                style.line
            };
            let caption = format!(
                "class {class_id} (n={})",
                frame.trial_counts.get(idx).copied().unwrap_or(0)
            );
            let mut chart = ChartBuilder::on(cell)
                .margin(6)
                .caption(caption, ("sans-serif", 14).into_font().color(&WHITE))
                .set_label_area_size(LabelAreaPosition::Left, 36)
                .set_label_area_size(LabelAreaPosition::Bottom, 24)
                .build_cartesian_2d(0f64..x_max, limits.min..limits.max)?;
            chart
                .configure_mesh()
                .light_line_style(&WHITE.mix(0.1))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .x_labels(4)
                .y_labels(4)
                .draw()?;
            let row = frame.waveforms.row(idx);
            let series = time_ms
                .iter()
                .copied()
                .zip(row.iter().copied())
                .map(|(t, v)| (t, v.clamp(limits.min, limits.max)));
            chart.draw_series(LineSeries::new(series, &color))?;
        }
        root.present()?;
    }
    encode_png(&buffer, width, height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, AnalysisError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| AnalysisError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    fn frame(classes: usize, len: usize) -> WaveformFrame {
        WaveformFrame {
            class_ids: (1..=classes as u32).collect(),
            trial_counts: vec![6; classes],
            channel: 0,
            sample_rate_hz: len as f64,
            squared: false,
            waveforms: Array2::from_shape_fn((classes, len), |(c, t)| {
                (t as f64 * 0.05 + c as f64).sin() * 40.0 + 50.0
            }),
        }
    }
    #[test]
    fn grid_png_has_expected_size() {
        let style = PlotStyle {
            cell_width: 120,
            cell_height: 90,
            ..PlotStyle::default()
        };
        let png =
            render_class_grid_png(&frame(6, 250), AxisLimits::default(), 2, 3, Some(4), &style)
                .unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (360, 180));
    }
    #[test]
    fn rejects_inverted_limits_and_empty_grid() {
        let limits = AxisLimits { min: 10.0, max: -10.0 };
        assert!(render_class_grid_png(&frame(2, 50), limits, 1, 2, None, &PlotStyle::default()).is_err());
        assert!(render_class_grid_png(&frame(2, 50), AxisLimits::default(), 0, 2, None, &PlotStyle::default()).is_err());
    }
}
