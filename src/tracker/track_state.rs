/// Track lifecycle state.
///
/// Newly created tracks start out `Tentative` until enough consecutive
/// measurement updates have been collected, then become `Confirmed`.
/// `Deleted` is terminal; the tracker drops deleted tracks from the live
/// set at the end of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Newly created track, not yet confirmed
    #[default]
    Tentative,
    /// Confirmed track with a stable identity
    Confirmed,
    /// Dead track, removed at the next frame boundary
    Deleted,
}
