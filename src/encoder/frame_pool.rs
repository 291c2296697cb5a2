use ac_ffmpeg::codec::video::{PixelFormat, VideoFrame, VideoFrameMut};
use ac_ffmpeg::time::TimeBase;
use std::collections::VecDeque;

/// Pool of reusable NV12 frames for the note encoder. The encoder keeps a
/// reference to pushed frames for a while, so returned frames are only
/// handed out again once they are exclusively owned.
pub(crate) struct FramePool {
    frames: VecDeque<VideoFrame>,
    side: usize,
    time_base: TimeBase,
    pixel_format: PixelFormat,
}

const POOL_SIZE: usize = 4;

impl FramePool {
    pub fn new(side: usize, time_base: TimeBase, pixel_format: PixelFormat) -> Self {
        let mut frames = VecDeque::with_capacity(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            let frame = VideoFrameMut::black(pixel_format, side, side)
                .with_time_base(time_base)
                .freeze();
            frames.push_back(frame);
        }

        Self {
            frames,
            side,
            time_base,
            pixel_format,
        }
    }

    /// Return a frame after the encoder consumed it.
    #[inline]
    pub fn put(&mut self, frame: VideoFrame) {
        if self.frames.len() < POOL_SIZE * 2 {
            self.frames.push_back(frame);
        }
    }

    /// Take a writable frame, reusing a pooled one when possible.
    #[inline]
    pub fn take(&mut self) -> VideoFrameMut {
        // Scan each pooled frame at most once; frames the encoder still
        // references go back to the queue.
        for _ in 0..self.frames.len() {
            let Some(frame) = self.frames.pop_front() else {
                break;
            };
            match frame.try_into_mut() {
                Ok(frame) => return frame,
                Err(frame) => self.frames.push_back(frame),
            }
        }

        VideoFrameMut::black(self.pixel_format, self.side, self.side)
            .with_time_base(self.time_base)
    }
}
