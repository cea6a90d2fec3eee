pub mod cursor;
pub mod doctor;
pub mod error;
pub mod feedback;
pub mod frames;
pub mod options;
pub mod predict;
pub mod session;
pub mod track;

pub use cursor::AutoTrackCursor;
pub use error::{ConfigError, TrackError};
pub use feedback::{NoFeedback, TrackFeedback};
pub use frames::{FrameData, FrameStatus, FrameStore, KeyInfo};
pub use options::{AutoTrackerOptions, OptionChange, OptionsObserver, TrackerSettings};
pub use session::Session;
pub use track::{AutoTrack, TrackExport};
