use std::path::PathBuf;

use super::{InitRequest, SessionHandle, SessionService};
use crate::encode::ffmpeg::{FfmpegMuxer, MuxerSettings};
use crate::encode::jpeg::EncodedFrame;
use crate::error::{RenderError, RenderResult};

/// Session service backed by a local ffmpeg process instead of a server.
pub struct LocalSession {
    audio_path: PathBuf,
    output_path: PathBuf,
    fps: u32,
    settings: MuxerSettings,
    session_id: Option<String>,
    next_index: usize,
    muxer: Option<FfmpegMuxer>,
}

impl LocalSession {
    pub fn new(audio_path: PathBuf, output_path: PathBuf, fps: u32, settings: MuxerSettings) -> Self {
        Self {
            audio_path,
            output_path,
            fps,
            settings,
            session_id: None,
            next_index: 0,
            muxer: None,
        }
    }

    fn check_session(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }
}

impl SessionService for LocalSession {
    fn init(&mut self, request: &InitRequest) -> RenderResult<SessionHandle> {
        if self.session_id.is_some() {
            return Err(RenderError::initialization("local session already started"));
        }
        if request.audio.is_none() && !self.audio_path.is_file() {
            return Err(RenderError::initialization(format!(
                "audio file {} not found",
                self.audio_path.display()
            )));
        }
        let session_id = format!("local-{}", std::process::id());
        log::info!(
            "Local session {} writing to {}",
            session_id,
            self.output_path.display()
        );
        self.session_id = Some(session_id.clone());
        Ok(SessionHandle {
            session_id,
            audio_locator: self.audio_path.display().to_string(),
        })
    }

    fn fetch_audio(&mut self, _handle: &SessionHandle) -> RenderResult<Vec<u8>> {
        std::fs::read(&self.audio_path).map_err(|e| {
            RenderError::decode(format!("reading {}: {}", self.audio_path.display(), e))
        })
    }

    fn push_frames(
        &mut self,
        session_id: &str,
        start_index: usize,
        frames: &[EncodedFrame],
    ) -> RenderResult<()> {
        if !self.check_session(session_id) {
            return Err(RenderError::upload(
                start_index,
                format!("unknown session {}", session_id),
            ));
        }
        if start_index != self.next_index {
            return Err(RenderError::upload(
                start_index,
                format!("expected batch to start at frame {}", self.next_index),
            ));
        }

        if self.muxer.is_none() {
            let muxer = FfmpegMuxer::new(&self.output_path, &self.audio_path, self.fps, &self.settings)
                .map_err(|e| RenderError::upload(start_index, format!("{:#}", e)))?;
            self.muxer = Some(muxer);
        }
        let muxer = self
            .muxer
            .as_mut()
            .ok_or_else(|| RenderError::upload(start_index, "muxer not running"))?;
        for frame in frames {
            muxer
                .write_frame(&frame.jpeg)
                .map_err(|e| RenderError::upload(frame.index, format!("{:#}", e)))?;
        }
        self.next_index += frames.len();
        Ok(())
    }

    fn finish(&mut self, session_id: &str, _title: &str) -> RenderResult<String> {
        if !self.check_session(session_id) {
            return Err(RenderError::finalize(format!("unknown session {}", session_id)));
        }
        let muxer = self
            .muxer
            .take()
            .ok_or_else(|| RenderError::finalize("no frames were rendered"))?;
        let path = muxer
            .finish()
            .map_err(|e| RenderError::finalize(format!("{:#}", e)))?;
        self.session_id = None;
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> LocalSession {
        LocalSession::new(
            PathBuf::from("/nonexistent/audio.mp3"),
            PathBuf::from("/tmp/out.mp4"),
            30,
            MuxerSettings::default(),
        )
    }

    fn request_with_payload() -> InitRequest {
        InitRequest {
            track_id: "t".into(),
            source: "local".into(),
            audio: Some(crate::session::AudioPayload {
                file_name: "audio.mp3".into(),
                bytes: vec![1, 2, 3],
            }),
        }
    }

    #[test]
    fn init_requires_audio() {
        let mut s = session();
        let req = InitRequest {
            track_id: "t".into(),
            source: "local".into(),
            audio: None,
        };
        assert!(matches!(s.init(&req), Err(RenderError::Initialization(_))));
    }

    #[test]
    fn rejects_gaps_before_touching_ffmpeg() {
        let mut s = session();
        let handle = s.init(&request_with_payload()).unwrap();
        let err = s.push_frames(&handle.session_id, 30, &[]).unwrap_err();
        assert!(matches!(err, RenderError::Upload { start_index: 30, .. }));

        let err = s.push_frames("other", 0, &[]).unwrap_err();
        assert!(matches!(err, RenderError::Upload { .. }));
    }

    #[test]
    fn finish_without_frames_fails() {
        let mut s = session();
        let handle = s.init(&request_with_payload()).unwrap();
        let err = s.finish(&handle.session_id, "x").unwrap_err();
        assert!(matches!(err, RenderError::Finalize(_)));
    }

    /// Stand-in for ffmpeg that copies stdin to its last argument.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nfor last; do :; done\nexec cat >\"$last\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn frames(start: usize, count: usize) -> Vec<EncodedFrame> {
        (start..start + count)
            .map(|index| EncodedFrame {
                index,
                jpeg: vec![0xFF, 0xD8, index as u8, 0xFF, 0xD9],
            })
            .collect()
    }

    #[cfg(unix)]
    fn scratch_session(name: &str) -> (LocalSession, PathBuf) {
        let dir = std::env::temp_dir().join(format!("vinylcast-local-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let audio = dir.join("audio.mp3");
        std::fs::write(&audio, [0u8; 16]).unwrap();
        let output = dir.join("out.mp4");
        let settings = MuxerSettings {
            program: fake_ffmpeg(&dir),
            ..MuxerSettings::default()
        };
        (LocalSession::new(audio, output.clone(), 30, settings), output)
    }

    #[cfg(unix)]
    #[test]
    fn failed_render_leaves_no_partial_video() {
        let (mut s, output) = scratch_session("failed");
        std::fs::write(&output, b"previous render").unwrap();

        let handle = s.init(&request_with_payload()).unwrap();
        s.push_frames(&handle.session_id, 0, &frames(0, 30)).unwrap();
        assert!(s.push_frames(&handle.session_id, 60, &frames(60, 30)).is_err());
        drop(s);

        assert_eq!(std::fs::read(&output).unwrap(), b"previous render");
        let leftovers: Vec<_> = std::fs::read_dir(output.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn finished_render_is_moved_into_place() {
        let (mut s, output) = scratch_session("finished");
        let handle = s.init(&request_with_payload()).unwrap();
        let batch = frames(0, 3);
        s.push_frames(&handle.session_id, 0, &batch).unwrap();

        let path = s.finish(&handle.session_id, "Song - Artist").unwrap();
        assert_eq!(PathBuf::from(path), output);
        let expected: Vec<u8> = batch.iter().flat_map(|f| f.jpeg.clone()).collect();
        assert_eq!(std::fs::read(&output).unwrap(), expected);
    }
}
