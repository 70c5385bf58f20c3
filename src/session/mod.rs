pub mod http;
pub mod local;

use crate::encode::jpeg::EncodedFrame;
use crate::error::RenderResult;

/// Locally supplied audio that replaces the service's own lookup.
#[derive(Clone, Debug)]
pub struct AudioPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl AudioPayload {
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.file_name)
    }
}

#[derive(Clone, Debug)]
pub struct InitRequest {
    pub track_id: String,
    pub source: String,
    pub audio: Option<AudioPayload>,
}

/// What the service hands back for a new render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    /// Where the track's encoded audio can be fetched from.
    pub audio_locator: String,
}

/// The external render service: creates sessions, accepts frame batches in
/// order and muxes the result.
pub trait SessionService {
    fn init(&mut self, request: &InitRequest) -> RenderResult<SessionHandle>;

    /// Encoded audio for a session created without a local payload.
    fn fetch_audio(&mut self, handle: &SessionHandle) -> RenderResult<Vec<u8>>;

    /// `start_index` must continue exactly where the previous batch ended.
    fn push_frames(
        &mut self,
        session_id: &str,
        start_index: usize,
        frames: &[EncodedFrame],
    ) -> RenderResult<()>;

    /// Returns the download locator of the finished video.
    fn finish(&mut self, session_id: &str, title: &str) -> RenderResult<String>;
}

/// Lowercase file extension of a path or URL, ignoring any query string.
pub fn extension_of(locator: &str) -> Option<&str> {
    let path = locator.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_ignores_query_and_directories() {
        assert_eq!(extension_of("song.flac"), Some("flac"));
        assert_eq!(extension_of("https://cdn/x/track.mp3?sig=a.b"), Some("mp3"));
        assert_eq!(extension_of("/tmp/dir.v2/noext"), None);
        assert_eq!(extension_of(".hidden"), None);
    }
}
