use plotters::prelude::*;
use crate::display::encode_png;
use crate::error::MonitorError;
use crate::spectrum::Spectrum;
#[derive(Clone, Debug)]
pub struct ReportStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub trace: RGBColor,
    pub peaks: RGBColor,
    pub spectrum: RGBColor,
}
impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            background: RGBColor(10, 10, 10),
            trace: BLUE,
            peaks: RED,
            spectrum: GREEN,
        }
    }
}
/// Capture report: the filtered block with detected R peaks on top, its
/// magnitude spectrum below. Returns PNG bytes.
pub fn render_report_png(
    filtered: &[f32],
    peaks: &[usize],
    spectrum: &Spectrum,
    style: &ReportStyle,
) -> Result<Vec<u8>, MonitorError> {
    if filtered.is_empty() || spectrum.is_empty() {
        return Err(MonitorError::Plot("capture report needs samples".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let panels = root.split_evenly((2, 1));
        let (y_min, y_max) = bounds(filtered.iter().copied());
        let mut wave = ChartBuilder::on(&panels[0])
            .margin(10)
            .build_cartesian_2d(0f32..filtered.len() as f32, y_min..y_max)?;
        wave.draw_series(LineSeries::new(
            filtered.iter().enumerate().map(|(i, v)| (i as f32, *v)),
            &style.trace,
        ))?;
        wave.draw_series(
            peaks
                .iter()
                .filter_map(|&i| filtered.get(i).map(|v| (i as f32, *v)))
                .map(|point| Cross::new(point, 5, style.peaks.stroke_width(2))),
        )?;
        let (db_min, db_max) = bounds(spectrum.magnitudes_db.iter().copied());
        let f_max = spectrum.frequencies_hz.last().copied().unwrap_or(0.0).max(1.0);
        let mut fft = ChartBuilder::on(&panels[1])
            .margin(10)
            .build_cartesian_2d(0f32..f_max, db_min..db_max)?;
        fft.draw_series(LineSeries::new(
            spectrum
                .frequencies_hz
                .iter()
                .copied()
                .zip(spectrum.magnitudes_db.iter().copied()),
            &style.spectrum,
        ))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn bounds(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let (lo, hi) = values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < f32::EPSILON {
        (lo.min(0.0) - 1.0, hi.max(0.0) + 1.0)
    } else {
        (lo, hi)
    }
}
