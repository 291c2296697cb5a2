//! Recording state management

/// Recording state machine
///
/// State transitions are validated so track creation, finalization, and
/// teardown can each happen at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Nothing captured yet
    Idle,

    /// Capture requested, waiting for track capability descriptors
    StartingRecording,

    /// Video descriptor known, still waiting on the audio descriptor
    WaitingForAudioFormat,

    /// Tracks open, samples being appended
    Recording,

    /// Stop requested; no sample is appended past this point
    StoppingRecording,

    /// Container finalized, output file is playable
    Finished,

    /// Recording discarded (disposed or too short); no output file remains
    Stopped,
}

impl RecordingState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &RecordingState) -> bool {
        use RecordingState::*;

        match (self, target) {
            // From Idle
            (Idle, StartingRecording) => true,
            (Idle, Stopped) => true, // Disposed before start

            // From StartingRecording
            (StartingRecording, WaitingForAudioFormat) => true,
            (StartingRecording, Recording) => true,
            (StartingRecording, StoppingRecording) => true,

            // From WaitingForAudioFormat
            (WaitingForAudioFormat, Recording) => true,
            (WaitingForAudioFormat, StoppingRecording) => true,

            // From Recording
            (Recording, StoppingRecording) => true,

            // From StoppingRecording
            (StoppingRecording, Finished) => true,
            (StoppingRecording, Stopped) => true,

            // Terminal states - no transitions allowed
            (Finished, _) => false,
            (Stopped, _) => false,

            // Self-transitions
            (a, b) if a == b => true,

            // All other transitions invalid
            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RecordingState::Idle => "Idle",
            RecordingState::StartingRecording => "StartingRecording",
            RecordingState::WaitingForAudioFormat => "WaitingForAudioFormat",
            RecordingState::Recording => "Recording",
            RecordingState::StoppingRecording => "StoppingRecording",
            RecordingState::Finished => "Finished",
            RecordingState::Stopped => "Stopped",
        }
    }

    /// Check if samples may be appended in this state
    pub fn accepts_samples(&self) -> bool {
        matches!(self, RecordingState::Recording)
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingState::Finished | RecordingState::Stopped)
    }

    /// Check if capture is underway (tracks may or may not be open yet)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RecordingState::StartingRecording
                | RecordingState::WaitingForAudioFormat
                | RecordingState::Recording
        )
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
