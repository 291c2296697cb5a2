use std::time::Duration;

/// Combined audio+video events swallowed before any frame is processed,
/// giving camera auto-exposure and auto-gain time to settle.
pub const WARMUP_EVENTS: u32 = 35;

/// Recordings shorter than this are discarded instead of finalized.
pub const MIN_DURATION: Duration = Duration::from_millis(500);

/// Hard cap on a single video note.
pub const MAX_DURATION: Duration = Duration::from_secs(60);

/// Rendered-buffer budget for the render stage pool.
pub const RETAINED_BUFFERS: usize = 16;

// default video-note geometry (square message attachment)
pub const NOTE_SIDE: u32 = 384;
pub const FRAME_RATE: u32 = 30;

/// Mic level reporting: peak window length and normalization divisor.
pub const POWER_WINDOW_SAMPLES: usize = 1200;
pub const POWER_PEAK_DIVISOR: f32 = 4000.0;
