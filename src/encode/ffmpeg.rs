use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Output codec settings for locally muxed videos.
#[derive(Clone, Debug)]
pub struct MuxerSettings {
    /// ffmpeg executable, looked up on `PATH` when not absolute.
    pub program: PathBuf,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
}

impl Default for MuxerSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            codec: "libx264".to_string(),
            pix_fmt: "yuv420p".to_string(),
            crf: 18,
        }
    }
}

/// A file written under a hidden sibling name and moved onto its target
/// only by `commit`. Dropping it uncommitted deletes the partial file.
struct StagedOutput {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedOutput {
    fn new(target: &Path) -> Self {
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        // Keep the extension; ffmpeg picks the container from it.
        let name = match target.extension() {
            Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
            None => format!(".{}.partial", stem),
        };
        Self {
            staging: target.with_file_name(name),
            target: target.to_path_buf(),
            committed: false,
        }
    }

    fn commit(&mut self) -> Result<PathBuf> {
        std::fs::rename(&self.staging, &self.target).with_context(|| {
            format!(
                "Failed to move {} to {}",
                self.staging.display(),
                self.target.display()
            )
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            match std::fs::remove_file(&self.staging) {
                Ok(()) => log::info!("Removed partial output {}", self.staging.display()),
                Err(e) => log::warn!("Failed to remove {}: {}", self.staging.display(), e),
            }
        }
    }
}

/// ffmpeg process fed a stream of JPEG frames on stdin, muxed with an audio
/// file. The video appears at its output path only after `finish` succeeds;
/// a muxer dropped before that kills ffmpeg and leaves nothing behind.
pub struct FfmpegMuxer {
    child: Option<Child>,
    output: StagedOutput,
    frames_written: usize,
}

impl FfmpegMuxer {
    pub fn new(
        output_path: &Path,
        input_audio: &Path,
        fps: u32,
        settings: &MuxerSettings,
    ) -> Result<Self> {
        let output = StagedOutput::new(output_path);
        let args: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(), "error".into(),
            "-f".into(), "image2pipe".into(),
            "-c:v".into(), "mjpeg".into(),
            "-framerate".into(), fps.to_string(),
            "-i".into(), "pipe:0".into(),
            "-i".into(), input_audio.display().to_string(),
            "-c:v".into(), settings.codec.clone(),
            "-pix_fmt".into(), settings.pix_fmt.clone(),
            "-crf".into(), settings.crf.to_string(),
            "-preset".into(), "medium".into(),
            "-c:a".into(), "aac".into(),
            "-b:a".into(), "192k".into(),
            "-shortest".into(),
            output.staging.display().to_string(),
        ];

        let child = Command::new(&settings.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to spawn {}. Is ffmpeg installed?",
                    settings.program.display()
                )
            })?;

        log::info!(
            "FFmpeg muxer started: {}fps, codec={}, output={}",
            fps,
            settings.codec,
            output_path.display()
        );

        Ok(Self {
            child: Some(child),
            output,
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        let stdin = self
            .child
            .as_mut()
            .and_then(|c| c.stdin.as_mut())
            .context("FFmpeg stdin not available")?;
        stdin.write_all(jpeg).context("Failed to write frame to ffmpeg")?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close the frame stream, wait for the container to be written and move
    /// it onto the output path.
    pub fn finish(mut self) -> Result<PathBuf> {
        let mut child = self.child.take().context("FFmpeg already finished")?;
        drop(child.stdin.take());

        let output = child.wait_with_output().context("Failed to wait for ffmpeg")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        let path = self.output.commit()?;
        log::info!(
            "FFmpeg muxing complete: {} frames -> {}",
            self.frames_written,
            path.display()
        );
        Ok(path)
    }
}

impl Drop for FfmpegMuxer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            log::warn!(
                "Aborting ffmpeg after {} frames; {} will not be written",
                self.frames_written,
                self.output.target.display()
            );
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vinylcast-mux-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn staging_name_keeps_extension() {
        let staged = StagedOutput::new(Path::new("/videos/song.mp4"));
        assert_eq!(staged.staging, PathBuf::from("/videos/.song.partial.mp4"));
        let bare = StagedOutput::new(Path::new("clip"));
        assert_eq!(bare.staging, PathBuf::from(".clip.partial"));
    }

    #[test]
    fn dropped_staging_file_is_removed_and_target_untouched() {
        let dir = scratch("drop");
        let target = dir.join("out.mp4");
        std::fs::write(&target, b"previous render").unwrap();

        let staged = StagedOutput::new(&target);
        std::fs::write(&staged.staging, b"half a video").unwrap();
        let staging = staged.staging.clone();
        drop(staged);

        assert!(!staging.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"previous render");
    }

    #[test]
    fn commit_moves_file_into_place() {
        let dir = scratch("commit");
        let target = dir.join("out.mp4");
        let mut staged = StagedOutput::new(&target);
        std::fs::write(&staged.staging, b"video").unwrap();
        let staging = staged.staging.clone();

        assert_eq!(staged.commit().unwrap(), target);
        assert!(!staging.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"video");
    }

    #[test]
    fn missing_program_is_reported() {
        let settings = MuxerSettings {
            program: PathBuf::from("/nonexistent/ffmpeg"),
            ..MuxerSettings::default()
        };
        let err = FfmpegMuxer::new(Path::new("/tmp/x.mp4"), Path::new("a.mp3"), 30, &settings)
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("Failed to spawn"));
    }
}
