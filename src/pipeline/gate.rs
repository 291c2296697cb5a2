//! Format negotiation and start gate
//!
//! Recording may only begin once the capability descriptors of both tracks
//! are known. The video descriptor is gated behind the render stage's lazy
//! prepare (which runs on the first frame), while the audio descriptor
//! arrives with the first audio callback; the two orders are equally
//! likely, so the gate is symmetric and fires exactly once whichever side
//! completes the pair. A degraded session tells the gate up front which
//! kinds to expect, so video-only and audio-only recordings start from the
//! single available descriptor.

use crate::capture::{AudioFormat, VideoFormat};

/// Descriptor pair released by the gate; a `None` side was not expected.
#[derive(Debug, Clone, Copy)]
pub struct TrackFormats {
    pub video: Option<VideoFormat>,
    pub audio: Option<AudioFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Readiness {
    NoneReady,
    VideoReady(VideoFormat),
    AudioReady(AudioFormat),
    BothReady,
}

pub struct StartGate {
    state: Readiness,
    expect_video: bool,
    expect_audio: bool,
}

impl StartGate {
    pub fn new(expect_video: bool, expect_audio: bool) -> Self {
        Self {
            state: Readiness::NoneReady,
            expect_video,
            expect_audio,
        }
    }

    /// Offer the video descriptor. Returns the released pair exactly once,
    /// when every expected descriptor is known.
    pub fn offer_video(&mut self, format: VideoFormat) -> Option<TrackFormats> {
        match self.state {
            Readiness::NoneReady => {
                if self.expect_audio {
                    self.state = Readiness::VideoReady(format);
                    None
                } else {
                    self.state = Readiness::BothReady;
                    Some(TrackFormats {
                        video: Some(format),
                        audio: None,
                    })
                }
            }
            Readiness::AudioReady(audio) => {
                self.state = Readiness::BothReady;
                Some(TrackFormats {
                    video: Some(format),
                    audio: Some(audio),
                })
            }
            // Repeat offers are ignored; descriptors are fixed per session
            Readiness::VideoReady(_) | Readiness::BothReady => None,
        }
    }

    /// Offer the audio descriptor; symmetric to [`offer_video`].
    ///
    /// [`offer_video`]: StartGate::offer_video
    pub fn offer_audio(&mut self, format: AudioFormat) -> Option<TrackFormats> {
        match self.state {
            Readiness::NoneReady => {
                if self.expect_video {
                    self.state = Readiness::AudioReady(format);
                    None
                } else {
                    self.state = Readiness::BothReady;
                    Some(TrackFormats {
                        video: None,
                        audio: Some(format),
                    })
                }
            }
            Readiness::VideoReady(video) => {
                self.state = Readiness::BothReady;
                Some(TrackFormats {
                    video: Some(video),
                    audio: Some(format),
                })
            }
            Readiness::AudioReady(_) | Readiness::BothReady => None,
        }
    }

    /// Whether the video side is known but the gate is still waiting on
    /// the audio descriptor.
    pub fn waiting_for_audio(&self) -> bool {
        matches!(self.state, Readiness::VideoReady(_)) && self.expect_audio
    }

    pub fn fired(&self) -> bool {
        self.state == Readiness::BothReady
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelLayout, Rotation};

    fn video_format() -> VideoFormat {
        VideoFormat {
            width: 640,
            height: 480,
            frame_rate: 30,
            layout: PixelLayout::Nv12,
            rotation: Rotation::None,
        }
    }

    fn audio_format() -> AudioFormat {
        AudioFormat {
            sample_rate: 48_000,
            channels: 1,
        }
    }

    #[test]
    fn test_video_first() {
        let mut gate = StartGate::new(true, true);
        assert!(gate.offer_video(video_format()).is_none());
        assert!(gate.waiting_for_audio());
        let formats = gate.offer_audio(audio_format()).expect("gate should fire");
        assert_eq!(formats.video.unwrap(), video_format());
        assert_eq!(formats.audio.unwrap(), audio_format());
        assert!(gate.fired());
    }

    #[test]
    fn test_audio_first() {
        let mut gate = StartGate::new(true, true);
        assert!(gate.offer_audio(audio_format()).is_none());
        assert!(!gate.waiting_for_audio());
        let formats = gate.offer_video(video_format()).expect("gate should fire");
        assert_eq!(formats.video.unwrap(), video_format());
        assert_eq!(formats.audio.unwrap(), audio_format());
    }

    #[test]
    fn test_fires_exactly_once() {
        let mut gate = StartGate::new(true, true);
        gate.offer_video(video_format());
        assert!(gate.offer_audio(audio_format()).is_some());
        assert!(gate.offer_audio(audio_format()).is_none());
        assert!(gate.offer_video(video_format()).is_none());
    }

    #[test]
    fn test_video_only_session() {
        let mut gate = StartGate::new(true, false);
        let formats = gate.offer_video(video_format()).expect("gate should fire");
        assert!(formats.audio.is_none());
        assert!(gate.fired());
    }

    #[test]
    fn test_audio_only_session() {
        let mut gate = StartGate::new(false, true);
        let formats = gate.offer_audio(audio_format()).expect("gate should fire");
        assert!(formats.video.is_none());
    }

    #[test]
    fn test_repeat_descriptor_is_ignored_before_fire() {
        let mut gate = StartGate::new(true, true);
        assert!(gate.offer_video(video_format()).is_none());
        assert!(gate.offer_video(video_format()).is_none());
        assert!(gate.offer_audio(audio_format()).is_some());
    }
}
