mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod lyrics;
mod pipeline;
mod render;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

use audio::decode::{AudioDecoder, SymphoniaDecoder};
use cli::Cli;
use encode::ffmpeg::MuxerSettings;
use lyrics::timeline::LyricTimeline;
use pipeline::controller::{RenderController, RenderJob, RenderSettings};
use pipeline::frames::FrameProducer;
use pipeline::progress::BarProgress;
use render::background::{self, Background};
use render::compositor::FrameCompositor;
use render::text::FontSet;
use session::http::HttpSession;
use session::local::LocalSession;
use session::{AudioPayload, InitRequest, SessionService};

const BACKGROUND_LOAD_TIMEOUT: Duration = Duration::from_secs(15);
const VIDEO_SEEK_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if let Some(ref path) = config::discover(cli.config.as_deref()) {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.fps == 30 { cli.fps = cfg.render.fps; }
            if cli.batch_size == 30 { cli.batch_size = cfg.render.batch_size; }
            if cli.scale == 1.5 { cli.scale = cfg.render.scale; }
            if cli.jpeg_quality == 95 { cli.jpeg_quality = cfg.render.jpeg_quality; }
            if cli.smoothing == 0.65 { cli.smoothing = cfg.audio.smoothing; }
            if cli.window_size == 2048 { cli.window_size = cfg.audio.window_size; }
            if cli.codec == "libx264" { cli.codec = cfg.output.codec; }
            if cli.crf == 18 { cli.crf = cfg.output.crf; }
            if cli.api_root == "http://localhost:8080/music" {
                if let Some(root) = cfg.session.api_root {
                    cli.api_root = root;
                }
            }
            if cli.upload_retries == 1 {
                if let Some(retries) = cfg.session.upload_retries {
                    cli.upload_retries = retries;
                }
            }
            if cli.timeout == 120 {
                if let Some(timeout) = cfg.session.timeout {
                    cli.timeout = timeout;
                }
            }
            if cli.font.is_none() {
                cli.font = cfg.fonts.regular;
            }
            if cli.font_bold.is_none() {
                cli.font_bold = cfg.fonts.bold;
            }
            if cli.ffmpeg.is_none() {
                cli.ffmpeg = cfg.output.ffmpeg;
            }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    if cli.input.is_none() && cli.track_id.is_none() {
        anyhow::bail!("Provide an audio file or --track-id");
    }
    if let Some(ref input) = cli.input {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
    }

    let settings = RenderSettings {
        fps: cli.fps,
        batch_size: cli.batch_size,
        window_size: cli.window_size,
        smoothing: cli.smoothing,
        jpeg_quality: cli.jpeg_quality,
        upload_retries: cli.upload_retries,
        scale: cli.scale,
    };
    settings.validate().context("Invalid render settings")?;

    log::info!("vinylcast - lyric video renderer");
    log::info!(
        "Canvas: {}x{} @ {}fps",
        (1280.0 * cli.scale).round(),
        (720.0 * cli.scale).round(),
        cli.fps
    );

    let fonts = match FontSet::load(cli.font.as_deref(), cli.font_bold.as_deref()) {
        Ok(fonts) => Some(fonts),
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    };

    if let Some(seconds) = cli.preview_frame {
        return render_preview(&cli, &settings, seconds, fonts);
    }

    let remote = if cli.local_output.is_none() {
        let http = HttpSession::new(&cli.api_root, Duration::from_secs(cli.timeout))?;
        log::info!("Render service: {}", http.api_root());
        Some(http)
    } else {
        None
    };

    let lyrics = load_lyrics(&cli, remote.as_ref());
    let background = load_background(&cli, remote.as_ref());
    let title = display_title(&cli);
    let artist = cli.artist.clone().unwrap_or_default();

    let audio = match cli.input {
        Some(ref path) => Some(read_payload(path)?),
        None => None,
    };
    let request = InitRequest {
        track_id: cli.track_id.clone().unwrap_or_else(|| title.clone()),
        source: cli.source.clone(),
        audio,
    };

    let mut session: Box<dyn SessionService> = match remote {
        Some(http) => Box::new(http),
        None => {
            let output = cli
                .local_output
                .clone()
                .context("--local-output is required without a render service")?;
            let input = cli
                .input
                .clone()
                .context("--local-output needs a local audio file")?;
            let mut muxer = MuxerSettings {
                codec: cli.codec.clone(),
                crf: cli.crf,
                ..MuxerSettings::default()
            };
            if let Some(ref program) = cli.ffmpeg {
                muxer.program = program.clone();
            }
            Box::new(LocalSession::new(input, output, cli.fps, muxer))
        }
    };

    let job = RenderJob {
        request,
        title,
        artist,
        lyrics,
        background,
        fonts,
    };

    let decoder = SymphoniaDecoder;
    let mut progress = BarProgress::new();
    let result = RenderController::new(settings, session.as_mut(), &decoder, &mut progress).run(job);

    match result {
        Ok(outcome) => {
            progress.finish("Rendering complete");
            log::info!(
                "Done! {} frames in {} batches (session {})",
                outcome.frames,
                outcome.batches,
                outcome.session_id
            );
            println!("{}", outcome.download_url);
            Ok(())
        }
        Err(e) => {
            progress.abandon("Rendering failed");
            Err(e).context("Render failed")
        }
    }
}

fn render_preview(
    cli: &Cli,
    settings: &RenderSettings,
    seconds: f64,
    fonts: Option<FontSet>,
) -> Result<()> {
    let input = cli
        .input
        .as_ref()
        .context("--preview-frame needs a local audio file")?;
    let payload = read_payload(input)?;
    let samples = SymphoniaDecoder
        .decode(&payload.bytes, payload.extension())?
        .into_first_channel()?;

    let compositor = FrameCompositor::new(
        settings.scale,
        load_lyrics(cli, None),
        fonts,
        display_title(cli),
        cli.artist.clone().unwrap_or_default(),
    );
    let mut producer = FrameProducer::new(
        samples,
        settings.window_size,
        compositor,
        load_background(cli, None),
        settings.fps,
        settings.smoothing,
    )?;

    let total = producer.total_frames();
    if total == 0 {
        anyhow::bail!("Audio is too short to render a frame");
    }
    let index = ((seconds.max(0.0) * settings.fps as f64) as usize).min(total - 1);
    log::info!("Rendering preview of frame {} ({:.2}s)", index, seconds);

    producer.skip_to(index)?;
    let image = producer
        .render_next()?
        .into_image()
        .context("Frame buffer has unexpected size")?;
    image
        .save(&cli.preview_output)
        .with_context(|| format!("Failed to write {}", cli.preview_output.display()))?;

    log::info!("Done! Preview: {}", cli.preview_output.display());
    Ok(())
}

fn read_payload(path: &Path) -> Result<AudioPayload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    Ok(AudioPayload { file_name, bytes })
}

fn display_title(cli: &Cli) -> String {
    cli.title
        .clone()
        .or_else(|| {
            cli.input
                .as_ref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
        .or_else(|| cli.track_id.clone())
        .unwrap_or_default()
}

/// Lyrics from `--lyrics`, else from the service for `--track-id`. A missing
/// transcript renders without lyrics.
fn load_lyrics(cli: &Cli, remote: Option<&HttpSession>) -> LyricTimeline {
    let text = if let Some(ref path) = cli.lyrics {
        match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("Failed to read lyrics {}: {}", path.display(), e);
                None
            }
        }
    } else if let (Some(http), Some(id)) = (remote, cli.track_id.as_deref()) {
        match http.fetch_lyrics(id, &cli.source) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    } else {
        None
    };

    let timeline = text.map(|t| LyricTimeline::parse(&t)).unwrap_or_default();
    log::info!("Lyrics: {} timed lines", timeline.len());
    timeline
}

fn load_background(cli: &Cli, remote: Option<&HttpSession>) -> Background {
    let Some(ref cover) = cli.cover else {
        log::warn!("No cover given; using placeholder background");
        return Background::Still(background::placeholder());
    };
    let video = cli.video_bg || background::looks_like_video(cover);
    let is_remote = cover.starts_with("http://") || cover.starts_with("https://");
    let source = match remote {
        Some(http) if is_remote && !video => http.cover_url(cover),
        _ => cover.clone(),
    };
    Background::load(&source, video, BACKGROUND_LOAD_TIMEOUT, VIDEO_SEEK_TIMEOUT)
}
