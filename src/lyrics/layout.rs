use unicode_segmentation::UnicodeSegmentation;

use super::timeline::LyricTimeline;

/// Lines shown on each side of the active line.
pub const CONTEXT_LINES: usize = 4;

/// Distance from the anchor at which lines start to fade.
pub const FADE_START: f32 = 230.0;
/// Distance over which alpha falls from 1 to 0.
pub const FADE_SPAN: f32 = 70.0;

/// Typographic role of a lyric line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineStyle {
    Active,
    Context,
}

impl LineStyle {
    pub fn font_size(self) -> f32 {
        match self {
            LineStyle::Active => 36.0,
            LineStyle::Context => 26.0,
        }
    }

    pub fn line_height(self) -> f32 {
        match self {
            LineStyle::Active => 48.0,
            LineStyle::Context => 34.0,
        }
    }
}

/// Width of a string in logical pixels when set in a given style.
pub trait TextMeasure {
    fn measure(&self, text: &str, style: LineStyle) -> f32;
}

/// Geometry of the lyric column, in logical canvas units.
#[derive(Clone, Copy, Debug)]
pub struct LyricLayout {
    pub x: f32,
    pub anchor_y: f32,
    pub max_width: f32,
    pub gap: f32,
}

impl Default for LyricLayout {
    fn default() -> Self {
        Self {
            x: 600.0,
            anchor_y: 360.0,
            max_width: 1280.0 - 600.0 - 40.0,
            gap: 20.0,
        }
    }
}

/// A wrapped visual line ready to draw. `y` is the vertical middle.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub alpha: f32,
    pub style: LineStyle,
}

struct Block {
    lines: Vec<String>,
    style: LineStyle,
    start_y: f32,
}

impl Block {
    fn height(&self) -> f32 {
        self.lines.len().saturating_sub(1) as f32 * self.style.line_height()
    }
}

/// Source indices visible around `active`, clipped to the timeline.
pub fn visible_range(timeline: &LyricTimeline, active: usize) -> std::ops::Range<usize> {
    let start = active.saturating_sub(CONTEXT_LINES);
    let end = (active + CONTEXT_LINES + 1).min(timeline.len());
    start..end
}

impl LyricLayout {
    /// Lay out the lyric block for one frame. Nothing is shown before the
    /// first line starts.
    pub fn place(
        &self,
        timeline: &LyricTimeline,
        active: Option<usize>,
        measure: &dyn TextMeasure,
    ) -> Vec<PlacedLine> {
        let Some(active) = active.filter(|&a| a < timeline.len()) else {
            return Vec::new();
        };

        let range = visible_range(timeline, active);
        let active_pos = active - range.start;
        let mut blocks: Vec<Block> = range
            .map(|idx| {
                let style = if idx == active {
                    LineStyle::Active
                } else {
                    LineStyle::Context
                };
                let text = timeline.get(idx).map_or("", |l| l.text.as_str());
                Block {
                    lines: wrap_text(text, self.max_width, style, measure),
                    style,
                    start_y: 0.0,
                }
            })
            .collect();

        blocks[active_pos].start_y = self.anchor_y - blocks[active_pos].height() / 2.0;
        for i in active_pos + 1..blocks.len() {
            let prev = &blocks[i - 1];
            let start = prev.start_y
                + prev.height()
                + self.gap
                + prev.style.line_height() / 2.0
                + blocks[i].style.line_height() / 2.0;
            blocks[i].start_y = start;
        }
        for i in (0..active_pos).rev() {
            let next = &blocks[i + 1];
            let start = next.start_y
                - blocks[i].height()
                - self.gap
                - next.style.line_height() / 2.0
                - blocks[i].style.line_height() / 2.0;
            blocks[i].start_y = start;
        }

        let mut placed = Vec::new();
        for block in blocks {
            let mut y = block.start_y;
            for text in block.lines {
                let alpha = fade_alpha((y - self.anchor_y).abs());
                if alpha > 0.0 {
                    placed.push(PlacedLine {
                        text,
                        x: self.x,
                        y,
                        alpha,
                        style: block.style,
                    });
                }
                y += block.style.line_height();
            }
        }
        placed
    }
}

/// Linear falloff past [`FADE_START`], fully transparent at 300px.
pub fn fade_alpha(distance: f32) -> f32 {
    if distance > FADE_START {
        (1.0 - (distance - FADE_START) / FADE_SPAN).max(0.0)
    } else {
        1.0
    }
}

/// Greedy character wrap. When an ASCII letter overflows a line that
/// already contains a space, the line breaks at that space so latin words
/// stay whole; anything else breaks right before the overflowing character.
pub fn wrap_text(
    text: &str,
    max_width: f32,
    style: LineStyle,
    measure: &dyn TextMeasure,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for grapheme in text.graphemes(true) {
        let mut candidate = current.clone();
        candidate.push_str(grapheme);
        if measure.measure(&candidate, style) > max_width && !current.is_empty() {
            let latin = grapheme.starts_with(|c: char| c.is_ascii_alphabetic());
            match current.rfind(' ') {
                Some(space) if latin => {
                    lines.push(current[..space].to_string());
                    current = format!("{}{}", &current[space + 1..], grapheme);
                }
                _ => {
                    lines.push(std::mem::take(&mut current));
                    current.push_str(grapheme);
                }
            }
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
