/// One time-tagged lyric line.
#[derive(Clone, Debug, PartialEq)]
pub struct LyricLine {
    /// Seconds from track start.
    pub time: f64,
    pub text: String,
}

/// Lyric lines in transcript order.
#[derive(Clone, Debug, Default)]
pub struct LyricTimeline {
    lines: Vec<LyricLine>,
}

impl LyricTimeline {
    /// Parse a `[MM:SS.ff]` / `[MM:SS.fff]` transcript.
    ///
    /// The first timestamp tag on a line gives its time; every bracketed tag
    /// is stripped from the text. Lines without a timestamp or without text
    /// are skipped. Order is kept as written.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<LyricLine> = text
            .split('\n')
            .filter_map(|raw| {
                let time = find_timestamp(raw)?;
                let content = strip_tags(raw);
                let content = content.trim();
                if content.is_empty() {
                    return None;
                }
                Some(LyricLine {
                    time,
                    text: content.to_string(),
                })
            })
            .collect();

        log::debug!("Parsed {} lyric lines", lines.len());
        Self { lines }
    }

    pub fn from_lines(lines: Vec<LyricLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&LyricLine> {
        self.lines.get(idx)
    }

    /// Index of the last line whose time is `<= time`, scanning forward and
    /// stopping at the first line that starts later.
    pub fn active_index(&self, time: f64) -> Option<usize> {
        let mut active = None;
        for (i, line) in self.lines.iter().enumerate() {
            if time >= line.time {
                active = Some(i);
            } else {
                break;
            }
        }
        active
    }
}

/// First `[dd:dd.dd]` or `[dd:dd.ddd]` tag anywhere in the line.
fn find_timestamp(line: &str) -> Option<f64> {
    let bytes = line.as_bytes();
    (0..bytes.len())
        .filter(|&i| bytes[i] == b'[')
        .find_map(|i| parse_tag(&bytes[i + 1..]))
}

fn parse_tag(rest: &[u8]) -> Option<f64> {
    // mm:ss.f{2,3}]
    if rest.len() < 9 {
        return None;
    }
    let minutes = two_digits(&rest[0..2])?;
    if rest[2] != b':' {
        return None;
    }
    let seconds = two_digits(&rest[3..5])?;
    if rest[5] != b'.' {
        return None;
    }
    let frac_len = rest[6..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if !(2..=3).contains(&frac_len) || rest.get(6 + frac_len) != Some(&b']') {
        return None;
    }
    let frac: u32 = rest[6..6 + frac_len]
        .iter()
        .fold(0, |acc, b| acc * 10 + (b - b'0') as u32);
    // Two digits are hundredths, three are thousandths.
    let divisor = if frac_len == 2 { 100.0 } else { 1000.0 };
    Some(minutes as f64 * 60.0 + seconds as f64 + frac as f64 / divisor)
}

fn two_digits(b: &[u8]) -> Option<u32> {
    if b.len() == 2 && b[0].is_ascii_digit() && b[1].is_ascii_digit() {
        Some(((b[0] - b'0') * 10 + (b[1] - b'0')) as u32)
    } else {
        None
    }
}

/// Remove every `[...]` group (shortest match); an unclosed `[` is kept.
fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        match rest[open + 1..].find(']') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + 1 + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_resolves_active_line() {
        let timeline = LyricTimeline::parse("[00:01.50]a\n[00:03.00]b\n");
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.lines()[0].time, 1.5);
        assert_eq!(timeline.lines()[1].time, 3.0);
        assert_eq!(timeline.lines()[0].text, "a");

        assert_eq!(timeline.active_index(0.0), None);
        assert_eq!(timeline.active_index(1.5), Some(0));
        assert_eq!(timeline.active_index(2.0), Some(0));
        assert_eq!(timeline.active_index(5.0), Some(1));
    }

    #[test]
    fn fraction_digit_count_sets_the_unit() {
        let three = LyricTimeline::parse("[00:01.250]x");
        assert_eq!(three.lines()[0].time, 1.25);
        let two = LyricTimeline::parse("[00:01.25]x");
        assert_eq!(two.lines()[0].time, 1.25);
        let minutes = LyricTimeline::parse("[02:03.004]y");
        assert!((minutes.lines()[0].time - 123.004).abs() < 1e-9);
    }

    #[test]
    fn drops_untimed_and_empty_lines() {
        let text = "[ti:Some Song]\n\
                    [ar:Someone]\n\
                    plain text\n\
                    [00:05.00]   \n\
                    [00:06.00]kept\r\n\
                    [0:07.00]bad minutes\n\
                    [00:08.0]one digit fraction\n\
                    [00:09.1234]four digits";
        let timeline = LyricTimeline::parse(text);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.lines()[0].text, "kept");
    }

    #[test]
    fn strips_every_bracket_tag() {
        let timeline = LyricTimeline::parse("[00:10.00][00:20.00]hello [x]world");
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.lines()[0].time, 10.0);
        assert_eq!(timeline.lines()[0].text, "hello world");
    }

    #[test]
    fn timestamp_may_follow_other_tags() {
        let timeline = LyricTimeline::parse("[offset][00:04.00]later tag");
        assert_eq!(timeline.lines()[0].time, 4.0);
        assert_eq!(timeline.lines()[0].text, "later tag");
    }

    #[test]
    fn out_of_order_lines_are_not_sorted() {
        let timeline = LyricTimeline::parse("[00:05.00]five\n[00:02.00]two\n[00:08.00]eight");
        assert_eq!(timeline.lines()[1].text, "two");
        // The scan stops at the first later line.
        assert_eq!(timeline.active_index(6.0), Some(0));
        assert_eq!(timeline.active_index(9.0), Some(2));
        assert_eq!(timeline.active_index(3.0), None);
    }

    #[test]
    fn empty_transcript_has_no_active_line() {
        let timeline = LyricTimeline::parse("");
        assert!(timeline.is_empty());
        assert_eq!(timeline.active_index(10.0), None);
    }
}
