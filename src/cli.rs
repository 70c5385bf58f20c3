use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "vinylcast",
    about = "Render a track into a spinning-disc lyric video, frame by frame"
)]
pub struct Cli {
    /// Local audio file (MP3, FLAC, OGG, WAV, AAC). Uploaded to the service
    /// instead of letting it look the track up.
    pub input: Option<PathBuf>,

    /// Track identifier known to the render service
    #[arg(long)]
    pub track_id: Option<String>,

    /// Catalogue the track identifier belongs to
    #[arg(long, default_value = "local")]
    pub source: String,

    /// Time-tagged lyric transcript ([mm:ss.xx] lines)
    #[arg(short, long)]
    pub lyrics: Option<PathBuf>,

    /// Background and cover media: image path/URL or video file
    #[arg(short, long)]
    pub cover: Option<String>,

    /// Treat the cover as a video (detected from the extension otherwise)
    #[arg(long)]
    pub video_bg: bool,

    /// Track title shown under the disc
    #[arg(long)]
    pub title: Option<String>,

    /// Artist shown under the title
    #[arg(long)]
    pub artist: Option<String>,

    /// Base URL of the render service
    #[arg(long, default_value = "http://localhost:8080/music")]
    pub api_root: String,

    /// Mux locally with ffmpeg into this file instead of using the service
    #[arg(long)]
    pub local_output: Option<PathBuf>,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Frames per upload batch
    #[arg(long, default_value_t = 30)]
    pub batch_size: usize,

    /// Supersampling factor over the 1280x720 layout
    #[arg(long, default_value_t = 1.5)]
    pub scale: f32,

    /// Smoothing factor for spectrum analysis (0.0-1.0)
    #[arg(long, default_value_t = 0.65)]
    pub smoothing: f32,

    /// Analysis window length in samples (power of two)
    #[arg(long, default_value_t = 2048)]
    pub window_size: usize,

    /// JPEG quality of uploaded frames (1-100)
    #[arg(long, default_value_t = 95)]
    pub jpeg_quality: u8,

    /// Extra attempts for a batch whose upload failed
    #[arg(long, default_value_t = 1)]
    pub upload_retries: u32,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,

    /// Regular font file (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Bold font file used for the active lyric line and title
    #[arg(long)]
    pub font_bold: Option<PathBuf>,

    /// FFmpeg video codec for --local-output
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// H.264 CRF quality for --local-output (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// FFmpeg executable used for --local-output
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Render only the frame at this many seconds into a PNG and exit
    #[arg(long)]
    pub preview_frame: Option<f64>,

    /// Output path for --preview-frame
    #[arg(long, default_value = "preview.png")]
    pub preview_output: PathBuf,

    /// Config file (defaults to vinylcast.toml or ~/.config/vinylcast/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_render() {
        let cli = Cli::parse_from(["vinylcast", "song.mp3"]);
        assert_eq!(cli.input, Some(PathBuf::from("song.mp3")));
        assert_eq!(cli.fps, 30);
        assert_eq!(cli.batch_size, 30);
        assert_eq!(cli.scale, 1.5);
        assert_eq!(cli.smoothing, 0.65);
        assert_eq!(cli.window_size, 2048);
        assert_eq!(cli.jpeg_quality, 95);
        assert_eq!(cli.upload_retries, 1);
        assert!(cli.local_output.is_none());
    }

    #[test]
    fn server_side_track_lookup() {
        let cli = Cli::parse_from([
            "vinylcast",
            "--track-id",
            "1901371647",
            "--source",
            "netease",
            "--cover",
            "bg.mp4",
            "--preview-frame",
            "12.5",
        ]);
        assert!(cli.input.is_none());
        assert_eq!(cli.track_id.as_deref(), Some("1901371647"));
        assert_eq!(cli.source, "netease");
        assert_eq!(cli.preview_frame, Some(12.5));
    }
}
