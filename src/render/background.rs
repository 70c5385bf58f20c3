use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use serde::Deserialize;

use crate::error::{RenderError, RenderResult};

const PLACEHOLDER_SIZE: u32 = 600;
const PLACEHOLDER_COLOR: Rgba<u8> = Rgba([204, 204, 204, 255]);

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "m4v", "avi"];

/// Whether a background path names a video, judged by extension.
pub fn looks_like_video(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext))
}

/// Neutral grey square used when the real background cannot be loaded.
pub fn placeholder() -> RgbaImage {
    RgbaImage::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, PLACEHOLDER_COLOR)
}

/// Background and cover media for one render.
pub enum Background {
    Still(RgbaImage),
    Video(VideoBackground),
}

impl Background {
    /// Load a still image or open a video. Failures are logged and replaced
    /// by the placeholder so the render can continue.
    pub fn load(source: &str, video: bool, load_timeout: Duration, seek_timeout: Duration) -> Self {
        let loaded = if video {
            VideoBackground::open(Path::new(source), seek_timeout).map(Background::Video)
        } else {
            load_still(source, load_timeout).map(Background::Still)
        };
        match loaded {
            Ok(background) => background,
            Err(err) => {
                log::warn!("{}; using placeholder background", err);
                Background::Still(placeholder())
            }
        }
    }

    pub fn is_still(&self) -> bool {
        matches!(self, Background::Still(_))
    }

    /// The image to draw at `time`. Videos seek; stills never change.
    pub fn frame_at(&mut self, time: f64) -> &RgbaImage {
        match self {
            Background::Still(image) => image,
            Background::Video(video) => video.frame_at(time),
        }
    }
}

/// Load a still image from a file path or an http(s) URL, giving up after
/// `timeout`.
pub fn load_still(source: &str, timeout: Duration) -> RenderResult<RgbaImage> {
    let (tx, rx) = mpsc::channel();
    let owned = source.to_string();
    std::thread::spawn(move || {
        let _ = tx.send(fetch_and_decode(&owned, timeout));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(RenderError::resource(format!(
            "background {} did not load within {:?}",
            source, timeout
        ))),
    }
}

fn fetch_and_decode(source: &str, timeout: Duration) -> RenderResult<RgbaImage> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::resource(e.to_string()))?;
        let response = client
            .get(source)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| RenderError::resource(format!("fetching {}: {}", source, e)))?;
        response
            .bytes()
            .map_err(|e| RenderError::resource(format!("reading {}: {}", source, e)))?
            .to_vec()
    } else {
        std::fs::read(source)
            .map_err(|e| RenderError::resource(format!("reading {}: {}", source, e)))?
    };

    let image = image::load_from_memory(&bytes)
        .map_err(|e| RenderError::resource(format!("decoding {}: {}", source, e)))?
        .to_rgba8();
    log::info!(
        "Loaded background {} ({}x{})",
        source,
        image.width(),
        image.height()
    );
    Ok(image)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Video background read one frame at a time through ffmpeg.
pub struct VideoBackground {
    path: PathBuf,
    width: u32,
    height: u32,
    duration: f64,
    seek_timeout: Duration,
    current: RgbaImage,
}

impl VideoBackground {
    pub fn open(path: &Path, seek_timeout: Duration) -> RenderResult<Self> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height:format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .stderr(Stdio::null())
            .output()
            .map_err(|e| RenderError::resource(format!("failed to run ffprobe: {}", e)))?;
        if !output.status.success() {
            return Err(RenderError::resource(format!(
                "ffprobe could not read {}",
                path.display()
            )));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| RenderError::resource(format!("unexpected ffprobe output: {}", e)))?;
        let (width, height, duration) = parse_probe(&probe).ok_or_else(|| {
            RenderError::resource(format!("{} has no usable video stream", path.display()))
        })?;

        log::info!(
            "Video background {}: {}x{}, {:.1}s",
            path.display(),
            width,
            height,
            duration
        );

        let mut video = Self {
            path: path.to_path_buf(),
            width,
            height,
            duration,
            seek_timeout,
            current: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
        };
        video.frame_at(0.0);
        Ok(video)
    }

    /// Seek to `time` (looping) and return that frame, or the previous one
    /// if the seek does not finish within the timeout.
    pub fn frame_at(&mut self, time: f64) -> &RgbaImage {
        let target = time % self.duration;
        match self.extract_frame(target) {
            Ok(frame) => self.current = frame,
            Err(err) => log::warn!("Reusing previous background frame: {}", err),
        }
        &self.current
    }

    fn extract_frame(&self, time: f64) -> RenderResult<RgbaImage> {
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-ss", &format!("{:.3}", time), "-i"])
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RenderError::resource(format!("failed to spawn ffmpeg: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::resource("ffmpeg stdout not available"))?;
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let result = stdout.read_to_end(&mut buf).map(|_| buf);
            let _ = tx.send(result);
        });

        let result = rx.recv_timeout(self.seek_timeout);
        if result.is_err() {
            let _ = child.kill();
        }
        let _ = child.wait();

        let bytes = match result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(RenderError::resource(e.to_string())),
            Err(_) => {
                return Err(RenderError::resource(format!(
                    "seek to {:.3}s timed out after {:?}",
                    time, self.seek_timeout
                )))
            }
        };

        RgbaImage::from_raw(self.width, self.height, bytes).ok_or_else(|| {
            RenderError::resource(format!("short frame read at {:.3}s", time))
        })
    }
}

fn parse_probe(probe: &ProbeOutput) -> Option<(u32, u32, f64)> {
    let stream = probe.streams.first()?;
    let duration: f64 = probe.format.as_ref()?.duration.as_deref()?.parse().ok()?;
    if stream.width == 0 || stream.height == 0 || duration <= 0.0 {
        return None;
    }
    Some((stream.width, stream.height, duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_video_by_extension() {
        assert!(looks_like_video("clip.MP4"));
        assert!(looks_like_video("https://host/bg.webm?x=1"));
        assert!(!looks_like_video("cover.jpg"));
        assert!(!looks_like_video("noextension"));
    }

    #[test]
    fn missing_still_falls_back_to_placeholder() {
        let mut bg = Background::load(
            "/nonexistent/cover.png",
            false,
            Duration::from_secs(2),
            Duration::from_millis(500),
        );
        assert!(bg.is_still());
        let frame = bg.frame_at(3.0);
        assert_eq!(frame.dimensions(), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
        assert_eq!(*frame.get_pixel(0, 0), PLACEHOLDER_COLOR);
    }

    #[test]
    fn loads_still_from_disk() {
        let dir = std::env::temp_dir().join("vinylcast-bg-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cover.png");
        RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let image = load_still(path.to_str().unwrap(), Duration::from_secs(5)).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(*image.get_pixel(1, 1), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn unanswered_download_times_out_to_placeholder() {
        // Accepts connections into the backlog but never replies.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/cover.png", listener.local_addr().unwrap());
        let timeout = Duration::from_millis(300);

        let err = load_still(&url, timeout).unwrap_err();
        assert!(matches!(err, RenderError::ResourceLoad(_)), "{:?}", err);

        let mut bg = Background::load(&url, false, timeout, Duration::from_millis(500));
        assert!(bg.is_still());
        assert_eq!(bg.frame_at(0.0).dimensions(), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
        drop(listener);
    }

    #[test]
    fn failed_seek_keeps_previous_frame() {
        let previous = RgbaImage::from_pixel(8, 6, Rgba([40, 80, 120, 255]));
        let mut video = VideoBackground {
            path: PathBuf::from("/nonexistent/background.mp4"),
            width: 8,
            height: 6,
            duration: 10.0,
            seek_timeout: Duration::from_millis(200),
            current: previous.clone(),
        };
        assert_eq!(*video.frame_at(4.2), previous);
        // Past the end loops, and still falls back.
        assert_eq!(*video.frame_at(14.2), previous);
    }

    #[test]
    fn probe_output_requires_stream_and_duration() {
        let ok: ProbeOutput = serde_json::from_str(
            r#"{"streams":[{"width":640,"height":360}],"format":{"duration":"12.5"}}"#,
        )
        .unwrap();
        assert_eq!(parse_probe(&ok), Some((640, 360, 12.5)));

        let no_stream: ProbeOutput =
            serde_json::from_str(r#"{"streams":[],"format":{"duration":"3.0"}}"#).unwrap();
        assert_eq!(parse_probe(&no_stream), None);
    }
}
