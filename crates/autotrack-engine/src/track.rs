use std::sync::Arc;

use autotrack_proto::record::{FrameRecord, RecordOrigin};
use autotrack_proto::report::{CursorState, StallReport, StepOutcome, StepReport};
use autotrack_proto::Point;
use autotrack_vision::evolve::evolve;
use autotrack_vision::{FrameStepper, MaskShape, SsdMatcher, Template, TemplateSearch, VisionError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::frames::{FrameData, FrameStatus, FrameStore, KeyInfo};
use crate::{AutoTrackCursor, AutoTrackerOptions, TrackError, TrackFeedback, TrackerSettings};

/// Everything needed to rebuild a track's data: option values and the
/// frame records in frame order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackExport {
    pub name: String,
    pub settings: TrackerSettings,
    pub frames: Vec<FrameRecord>,
}

/// One tracked feature: its options, its frame data and the cursor that
/// extends it.
#[derive(Debug)]
pub struct AutoTrack<M: TemplateSearch = SsdMatcher> {
    name: String,
    options: AutoTrackerOptions,
    frames: FrameStore,
    cursor: AutoTrackCursor,
    matcher: M,
}

impl AutoTrack<SsdMatcher> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_matcher(name, SsdMatcher)
    }

    pub fn from_export(export: &TrackExport) -> Result<Self, TrackError> {
        let mut track = Self::new(export.name.clone());
        track.options = AutoTrackerOptions::with_settings(export.settings)?;
        let restore = |s: f64| if s == f64::MAX { f64::INFINITY } else { s };
        for r in &export.frames {
            let template = Arc::new(Template::from_data(&r.template)?);
            let key = r.key_frame.then(|| {
                let (kind, spread) = match r.key_mask {
                    Some(m) => (m.kind, m.line_spread),
                    None => (export.settings.mask_kind, export.settings.line_spread),
                };
                KeyInfo {
                    shape: MaskShape::new(template.width(), template.height(), kind, spread),
                    target_offset: r.target_offset.map(|[x, y]| (x, y)).unwrap_or_default(),
                }
            });
            let data = FrameData {
                position: Point::new(r.x, r.y),
                template,
                score: r.score.map(restore),
                runner_up: r.runner_up.map(restore),
                origin: r.origin,
                generation: r.template_generation,
                region: None,
                key,
            };
            if data.is_key_frame() {
                track.frames.set_key_frame(r.frame, data);
            } else {
                track.frames.commit(r.frame, data);
            }
        }
        Ok(track)
    }
}

impl<M: TemplateSearch> AutoTrack<M> {
    pub fn with_matcher(name: impl Into<String>, matcher: M) -> Self {
        Self {
            name: name.into(),
            options: AutoTrackerOptions::new(),
            frames: FrameStore::new(),
            cursor: AutoTrackCursor::new(),
            matcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &AutoTrackerOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut AutoTrackerOptions {
        &mut self.options
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn cursor(&self) -> &AutoTrackCursor {
        &self.cursor
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }

    pub fn stall(&self) -> Option<StallReport> {
        self.cursor.stall()
    }

    /// Marks the feature at `position` in the stepper's current frame.
    pub fn add_key_frame<S>(&mut self, stepper: &S, position: Point, feedback: &mut dyn TrackFeedback) -> Result<u32, TrackError>
    where
        S: FrameStepper + ?Sized,
    {
        self.add_key_frame_with_mask(stepper, position, position, feedback)
    }

    /// Like [`add_key_frame`](Self::add_key_frame) with the template cut
    /// around `mask_center` instead of the tracked point.
    pub fn add_key_frame_with_mask<S>(
        &mut self,
        stepper: &S,
        position: Point,
        mask_center: Point,
        feedback: &mut dyn TrackFeedback,
    ) -> Result<u32, TrackError>
    where
        S: FrameStepper + ?Sized,
    {
        if !stepper.is_video_valid() {
            return Err(TrackError::VideoUnavailable);
        }
        let frame = stepper.frame_number();
        let image = stepper.image().ok_or(TrackError::VideoUnavailable)?;
        let (width, height) = image.dimensions();
        let inside = |p: Point| p.x >= 0.0 && p.y >= 0.0 && p.x < width as f64 && p.y < height as f64;
        if !inside(position) || !inside(mask_center) {
            return Err(TrackError::KeyFrameOutsideImage { x: position.x, y: position.y, width, height });
        }

        let shape = self.options.settings().mask_shape();
        let (cx, cy) = mask_center.round();
        let template = Template::capture(image, (cx, cy), &shape).map_err(|e| match e {
            VisionError::MaskTooSmall { cols, rows, .. } => TrackError::MaskTooSmall { frame, cols, rows },
            other => TrackError::Vision(other),
        })?;

        feedback.before_key_frame(&self.name, frame);
        let data = FrameData {
            position,
            template: Arc::new(template),
            score: None,
            runner_up: None,
            origin: RecordOrigin::Key,
            generation: 0,
            region: None,
            key: Some(KeyInfo { shape, target_offset: (position.x - cx as f64, position.y - cy as f64) }),
        };
        self.cursor.anchor_on_key(frame, &data);
        self.frames.set_key_frame(frame, data);
        info!(track = %self.name, frame, x = position.x, y = position.y, "key frame set");
        feedback.after_key_frame(&self.name, frame);
        feedback.template_set(&self.name, frame);
        Ok(frame)
    }

    /// Advances the stepper one frame and tracks into it.
    pub fn step<S>(&mut self, stepper: &mut S, feedback: &mut dyn TrackFeedback) -> Result<StepReport, TrackError>
    where
        S: FrameStepper + ?Sized,
    {
        let settings = self.options.snapshot();
        let report = self.cursor.step(&settings, &mut self.frames, stepper, &self.matcher)?;
        if report.outcome == StepOutcome::Good && settings.evolve_rate > 0 {
            feedback.template_set(&self.name, report.frame);
        }
        feedback.step_reported(&self.name, &report);
        Ok(report)
    }

    /// Accepts a stored possible match as if it were good, evolving its template.
    pub fn force_accept(&mut self, frame: u32, feedback: &mut dyn TrackFeedback) -> Result<(), TrackError> {
        let rate = self.options.evolve_rate();
        let Some(data) = self.frames.get_mut(frame) else {
            return Err(TrackError::NotAPossibleMatch(frame));
        };
        let Some(region) = data.region.as_ref().filter(|_| data.origin == RecordOrigin::Possible) else {
            return Err(TrackError::NotAPossibleMatch(frame));
        };
        let evolved = Arc::new(evolve(&data.template, region, rate)?);
        let generation = if rate > 0 { data.generation + 1 } else { data.generation };
        data.template = evolved.clone();
        data.generation = generation;
        data.origin = RecordOrigin::Accepted;
        data.region = None;
        self.cursor.adopt_template(frame, evolved, generation);
        info!(track = %self.name, frame, "possible match accepted");
        feedback.template_set(&self.name, frame);
        Ok(())
    }

    pub fn list_key_frames(&self) -> Vec<u32> {
        self.frames.list_key_frames()
    }

    pub fn status(&self, frame: u32) -> FrameStatus {
        self.frames.status(frame)
    }

    pub fn delete_later(&mut self, frame: u32) -> usize {
        let removed = self.frames.delete_after(frame);
        self.drop_stale_anchor();
        removed
    }

    pub fn delete_frame(&mut self, frame: u32) -> bool {
        let removed = self.frames.delete_frame(frame);
        self.drop_stale_anchor();
        removed
    }

    pub fn delete_key_frame(&mut self, frame: u32) -> bool {
        let removed = self.frames.delete_key_frame(frame);
        if removed {
            info!(track = %self.name, frame, "key frame deleted");
        }
        self.drop_stale_anchor();
        removed
    }

    pub fn clear_range(&mut self, from: u32, to: u32) -> usize {
        let removed = self.frames.clear_range(from, to);
        self.drop_stale_anchor();
        removed
    }

    pub fn export(&self) -> TrackExport {
        TrackExport {
            name: self.name.clone(),
            settings: self.options.snapshot(),
            frames: self.frames.records(),
        }
    }

    // After an edit the anchor must sit on stored data governed by a key
    // frame. Falls back to the nearest stored frame before it, or resets.
    fn drop_stale_anchor(&mut self) {
        let Some(anchor) = self.cursor.anchor_frame() else { return };
        let governing = self
            .frames
            .key_frame_for(anchor, false)
            .or_else(|| self.frames.key_frame_for(anchor, true))
            .and_then(|(n, f)| f.key.map(|k| (n, k)));
        let Some((key_frame, key)) = governing else {
            self.cursor.reset();
            return;
        };
        if self.frames.get(anchor).is_some() {
            return;
        }
        match self.frames.nearest_at_or_before(anchor, key_frame > anchor) {
            Some((frame, data)) => {
                let data = data.clone();
                self.cursor.anchor_on(frame, &data, key);
                info!(track = %self.name, frame, "anchor data deleted, re-anchored");
            }
            None => self.cursor.reset(),
        }
    }
}
