//! Live-upload collaborator interface
//!
//! Upload of the output file may begin while it is still being written.
//! The pipeline notifies the collaborator after every appended sample that
//! the file grew, and once more when the container is finalized.

/// External collaborator informed of output file growth.
pub trait LiveUpload: Send + Sync {
    /// Called after every appended sample (`is_final == false`) and once
    /// after finalization (`is_final == true`).
    fn file_grew(&self, is_final: bool);

    /// Stable identifier of the in-flight upload, surfaced with the
    /// finished recording so the caller can attach to it.
    fn id(&self) -> Option<i64> {
        None
    }
}
