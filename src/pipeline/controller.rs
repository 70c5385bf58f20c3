use crate::audio::buffer::SampleBuffer;
use crate::audio::decode::AudioDecoder;
use crate::audio::spectrum::DEFAULT_WINDOW_SIZE;
use crate::encode::jpeg::{encode_jpeg, EncodedFrame, DEFAULT_QUALITY};
use crate::error::{RenderError, RenderResult};
use crate::lyrics::timeline::LyricTimeline;
use crate::render::background::Background;
use crate::render::compositor::FrameCompositor;
use crate::render::text::FontSet;
use crate::session::{extension_of, InitRequest, SessionHandle, SessionService};

use super::frames::FrameProducer;
use super::progress::ProgressSink;

/// Where a render currently is. `Rendering` and `Uploading` alternate once
/// per batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Initializing,
    Decoding,
    Rendering,
    Uploading,
    Finalizing,
    Completed,
    Failed,
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub fps: u32,
    pub batch_size: usize,
    pub window_size: usize,
    pub smoothing: f32,
    pub jpeg_quality: u8,
    /// Extra attempts per batch after a failed upload.
    pub upload_retries: u32,
    /// Device pixels per logical pixel of the 1280x720 canvas.
    pub scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            batch_size: 30,
            window_size: DEFAULT_WINDOW_SIZE,
            smoothing: 0.65,
            jpeg_quality: DEFAULT_QUALITY,
            upload_retries: 1,
            scale: 1.5,
        }
    }
}

impl RenderSettings {
    /// Largest accepted `scale`, a 5120x2880 canvas.
    pub const MAX_SCALE: f32 = 4.0;

    pub fn validate(&self) -> RenderResult<()> {
        if self.fps == 0 {
            return Err(RenderError::invalid_setting("fps must be positive"));
        }
        if self.batch_size == 0 {
            return Err(RenderError::invalid_setting("batch size must be positive"));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(RenderError::invalid_setting(format!(
                "smoothing must be in [0, 1), got {}",
                self.smoothing
            )));
        }
        if !(self.scale > 0.0 && self.scale <= Self::MAX_SCALE) {
            return Err(RenderError::invalid_setting(format!(
                "scale must be in (0, {}], got {}",
                Self::MAX_SCALE,
                self.scale
            )));
        }
        Ok(())
    }
}

/// Inputs of one render besides the audio.
pub struct RenderJob {
    pub request: InitRequest,
    pub title: String,
    pub artist: String,
    pub lyrics: LyricTimeline,
    pub background: Background,
    pub fonts: Option<FontSet>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOutcome {
    pub session_id: String,
    pub download_url: String,
    pub frames: usize,
    pub batches: usize,
}

/// Drives one render from session creation to the finished video.
pub struct RenderController<'a> {
    settings: RenderSettings,
    session: &'a mut dyn SessionService,
    decoder: &'a dyn AudioDecoder,
    progress: &'a mut dyn ProgressSink,
    state: RenderState,
    percent: f32,
}

impl<'a> RenderController<'a> {
    pub fn new(
        settings: RenderSettings,
        session: &'a mut dyn SessionService,
        decoder: &'a dyn AudioDecoder,
        progress: &'a mut dyn ProgressSink,
    ) -> Self {
        Self {
            settings,
            session,
            decoder,
            progress,
            state: RenderState::Initializing,
            percent: 0.0,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Run the whole render. Any error leaves the controller in
    /// [`RenderState::Failed`]; the session is abandoned as is.
    pub fn run(&mut self, job: RenderJob) -> RenderResult<RenderOutcome> {
        match self.run_stages(job) {
            Ok(outcome) => {
                self.state = RenderState::Completed;
                self.report("Done", 100.0);
                Ok(outcome)
            }
            Err(err) => {
                log::error!("Render failed while {:?}: {}", self.state, err);
                self.state = RenderState::Failed;
                Err(err)
            }
        }
    }

    fn run_stages(&mut self, job: RenderJob) -> RenderResult<RenderOutcome> {
        let RenderJob {
            request,
            title,
            artist,
            lyrics,
            background,
            fonts,
        } = job;

        self.state = RenderState::Initializing;
        self.report("Creating render session", 5.0);
        let handle = self.session.init(&request)?;

        self.state = RenderState::Decoding;
        self.report("Decoding audio", 15.0);
        let samples = self.decode(&request, &handle)?;

        self.report("Preparing canvas", 25.0);
        let compositor = FrameCompositor::new(
            self.settings.scale,
            lyrics,
            fonts,
            title.clone(),
            artist.clone(),
        );
        let mut producer = FrameProducer::new(
            samples,
            self.settings.window_size,
            compositor,
            background,
            self.settings.fps,
            self.settings.smoothing,
        )?;

        let total = producer.total_frames();
        log::info!(
            "Rendering {} frames at {}fps in batches of {}",
            total,
            self.settings.fps,
            self.settings.batch_size
        );
        self.report("Rendering frames", 30.0);

        let batch_size = self.settings.batch_size.max(1);
        let mut batches = 0;
        while producer.next_index() < total {
            self.state = RenderState::Rendering;
            let start = producer.next_index();
            let end = (start + batch_size).min(total);
            let mut frames = Vec::with_capacity(end - start);
            for index in start..end {
                let canvas = producer.render_next()?;
                frames.push(encode_jpeg(&canvas, index, self.settings.jpeg_quality)?);
            }

            self.state = RenderState::Uploading;
            self.upload(&handle.session_id, start, &frames)?;
            batches += 1;

            let pct = (end as f32 / total as f32 * 100.0).round();
            self.report(&format!("Rendered {}/{} frames", end, total), 30.0 + pct * 0.65);
        }

        self.state = RenderState::Finalizing;
        self.report("Muxing video", 98.0);
        let name = format!("{} - {}", title, artist);
        let download_url = self.session.finish(&handle.session_id, &name)?;
        log::info!("Video ready: {}", download_url);

        Ok(RenderOutcome {
            session_id: handle.session_id,
            download_url,
            frames: total,
            batches,
        })
    }

    fn decode(
        &mut self,
        request: &InitRequest,
        handle: &SessionHandle,
    ) -> RenderResult<SampleBuffer> {
        let decoded = match &request.audio {
            Some(payload) => self.decoder.decode(&payload.bytes, payload.extension())?,
            None => {
                let bytes = self.session.fetch_audio(handle)?;
                self.decoder
                    .decode(&bytes, extension_of(&handle.audio_locator))?
            }
        };
        let samples = decoded.into_first_channel()?;
        if samples.sample_rate() == 0 {
            return Err(RenderError::decode("sample rate is zero"));
        }
        log::info!(
            "Audio ready: {:.2}s at {}Hz",
            samples.duration(),
            samples.sample_rate()
        );
        Ok(samples)
    }

    /// Send one batch, re-sending the identical batch under the same
    /// `(session_id, start_index)` on failure.
    fn upload(
        &mut self,
        session_id: &str,
        start_index: usize,
        frames: &[EncodedFrame],
    ) -> RenderResult<()> {
        let mut attempt = 0;
        loop {
            match self.session.push_frames(session_id, start_index, frames) {
                Ok(()) => {
                    log::debug!(
                        "Batch at frame {} ({} frames) delivered",
                        start_index,
                        frames.len()
                    );
                    return Ok(());
                }
                Err(err) if attempt < self.settings.upload_retries => {
                    attempt += 1;
                    log::warn!(
                        "Upload of batch at frame {} failed ({}); retry {}/{}",
                        start_index,
                        err,
                        attempt,
                        self.settings.upload_retries
                    );
                }
                Err(err) => {
                    if attempt > 0 {
                        log::error!(
                            "Batch at frame {} rejected after {} attempts",
                            start_index,
                            attempt + 1
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    fn report(&mut self, stage: &str, percent: f32) {
        // Progress never moves backwards.
        self.percent = self.percent.max(percent);
        self.progress.report(stage, self.percent);
    }
}
