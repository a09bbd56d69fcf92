/// One display column: the representative value of its decimation window and
/// the index (within the block) of the sample it came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayColumn {
    pub value: f32,
    pub sample_index: usize,
}
/// Peak-preserving decimation of a filtered block into a fixed number of
/// columns. Window `i` covers `[i * step, (i + 1) * step)` with
/// `step = floor(len / columns)`; trailing samples beyond `columns * step`
/// are not represented.
#[derive(Clone, Copy, Debug)]
pub struct Downsampler {
    columns: usize,
}
impl Downsampler {
    pub fn new(columns: usize) -> Self {
        Self { columns }
    }
    pub fn columns(&self) -> usize {
        self.columns
    }
    pub fn step(&self, block_len: usize) -> usize {
        if self.columns == 0 {
            0
        } else {
            block_len / self.columns
        }
    }
    pub fn downsample(&self, block: &[f32]) -> Vec<f32> {
        self.downsample_with_positions(block)
            .into_iter()
            .map(|c| c.value)
            .collect()
    }
    /// Empty when the block is shorter than the column count.
    pub fn downsample_with_positions(&self, block: &[f32]) -> Vec<DisplayColumn> {
        let step = self.step(block.len());
        if step == 0 {
            return Vec::new();
        }
        block
            .chunks_exact(step)
            .take(self.columns)
            .enumerate()
            .map(|(i, window)| representative(window, i * step))
            .collect()
    }
}
fn representative(window: &[f32], offset: usize) -> DisplayColumn {
    let mut min = (f32::INFINITY, 0);
    let mut max = (f32::NEG_INFINITY, 0);
    for (j, &v) in window.iter().enumerate() {
        if v < min.0 {
            min = (v, j);
        }
        if v > max.0 {
            max = (v, j);
        }
    }
    // Widened so the midpoint distances are exact; equidistant resolves to max.
    let (lo, hi) = (min.0 as f64, max.0 as f64);
    let mean = (lo + hi) / 2.0;
    let (value, j) = if (mean - lo).abs() > (hi - mean).abs() {
        min
    } else {
        max
    };
    DisplayColumn {
        value,
        sample_index: offset + j,
    }
}
