use autotrack_proto::report::StepReport;

/// Notifications from a track to whatever presents it. Every method has an
/// empty default so sinks only implement what they show.
pub trait TrackFeedback {
    fn before_key_frame(&mut self, _track: &str, _frame: u32) {}
    fn after_key_frame(&mut self, _track: &str, _frame: u32) {}
    fn template_set(&mut self, _track: &str, _frame: u32) {}
    fn bound(&mut self, _track: &str) {}
    fn unbound(&mut self, _track: &str) {}
    fn selected_track_changed(&mut self, _track: Option<&str>) {}
    fn step_reported(&mut self, _track: &str, _report: &StepReport) {}
}

/// Sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl TrackFeedback for NoFeedback {}
