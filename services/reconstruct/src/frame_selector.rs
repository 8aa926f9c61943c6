use tracing::debug;

/// Default cap on samples handed to reconstruction.
pub const DEFAULT_MAX_SAMPLE_COUNT: usize = 120;

/// Outcome of stride selection over the candidate indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<u32>,
    pub dropped: Vec<u32>,
    /// Distance between kept positions; 1 when nothing was dropped
    pub stride: usize,
}

/// Caps a sorted candidate list with uniform stride selection.
///
/// When there are more candidates than `max_count`, every `stride`-th position
/// is kept with `stride = ceil(candidates / max_count)`. The result can hold
/// fewer than `max_count` indices; it is never padded.
#[derive(Debug, Clone)]
pub struct FrameSelector {
    max_count: usize,
}

impl FrameSelector {
    pub fn new(max_count: usize) -> Self {
        Self { max_count }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Split `candidates` into kept and dropped indices, preserving order.
    pub fn select(&self, candidates: &[u32]) -> Selection {
        if candidates.len() <= self.max_count {
            return Selection {
                selected: candidates.to_vec(),
                dropped: Vec::new(),
                stride: 1,
            };
        }

        // A zero cap keeps nothing
        if self.max_count == 0 {
            return Selection {
                selected: Vec::new(),
                dropped: candidates.to_vec(),
                stride: 0,
            };
        }

        let stride = candidates.len().div_ceil(self.max_count);
        let (selected, dropped): (Vec<(usize, u32)>, Vec<(usize, u32)>) = candidates
            .iter()
            .copied()
            .enumerate()
            .partition(|(offset, _)| offset % stride == 0);

        let selection = Selection {
            selected: selected.into_iter().map(|(_, index)| index).collect(),
            dropped: dropped.into_iter().map(|(_, index)| index).collect(),
            stride,
        };

        debug!(
            candidates = candidates.len(),
            max_count = self.max_count,
            stride,
            selected = selection.selected.len(),
            "Stride selection applied"
        );

        selection
    }
}

impl Default for FrameSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLE_COUNT)
    }
}

/// Builder for creating FrameSelector with custom settings
pub struct FrameSelectorBuilder {
    max_count: usize,
}

impl FrameSelectorBuilder {
    pub fn new() -> Self {
        Self {
            max_count: DEFAULT_MAX_SAMPLE_COUNT,
        }
    }

    pub fn max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn build(self) -> FrameSelector {
        FrameSelector::new(self.max_count)
    }
}

impl Default for FrameSelectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
