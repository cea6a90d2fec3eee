use std::sync::Arc;

use autotrack_proto::record::RecordOrigin;
use autotrack_proto::report::{CursorState, MissReason, StallReason, StallReport, StepOutcome, StepReport};
use autotrack_proto::Point;
use autotrack_vision::evolve::evolve;
use autotrack_vision::{FrameStepper, MaskShape, MatchResult, SearchWindow, Template, TemplateSearch, VisionError};
use tracing::{debug, info, warn};

use crate::frames::{FrameData, FrameStore, KeyInfo};
use crate::predict::predict;
use crate::{TrackError, TrackerSettings};

/// Where the next search is centred and what it looks for.
#[derive(Debug, Clone)]
struct Anchor {
    frame: u32,
    /// Template centre in the anchor frame.
    center: Point,
    template: Arc<Template>,
    shape: MaskShape,
    target_offset: (f64, f64),
    generation: u32,
}

/// Per-frame decision state machine of one track.
///
/// Each [`step`](Self::step) moves the stepper one frame and makes at most one
/// matcher call. Frame data is only written when a match is accepted.
#[derive(Debug, Clone)]
pub struct AutoTrackCursor {
    state: CursorState,
    anchor: Option<Anchor>,
    misses: u32,
    look_ahead_spent: bool,
    probes_done: u32,
    failed_frame: Option<u32>,
    last_good_frame: u32,
    stall: Option<StallReport>,
}

impl Default for AutoTrackCursor {
    fn default() -> Self {
        Self {
            state: CursorState::AwaitingKeyFrame,
            anchor: None,
            misses: 0,
            look_ahead_spent: false,
            probes_done: 0,
            failed_frame: None,
            last_good_frame: 0,
            stall: None,
        }
    }
}

impl AutoTrackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn stall(&self) -> Option<StallReport> {
        self.stall
    }

    pub fn anchor_frame(&self) -> Option<u32> {
        self.anchor.as_ref().map(|a| a.frame)
    }

    pub fn last_good_frame(&self) -> u32 {
        self.last_good_frame
    }

    /// Restarts from a key frame stored at `frame`.
    pub fn anchor_on_key(&mut self, frame: u32, data: &FrameData) {
        if let Some(key) = data.key {
            self.anchor_on(frame, data, key);
        }
    }

    /// Restarts from accepted data at `frame`, searching with the mask and
    /// offset of the key frame `key` that governs it.
    pub fn anchor_on(&mut self, frame: u32, data: &FrameData, key: KeyInfo) {
        let center = data.position.offset(-key.target_offset.0, -key.target_offset.1);
        self.anchor = Some(Anchor {
            frame,
            center,
            template: data.template.clone(),
            shape: key.shape,
            target_offset: key.target_offset,
            generation: data.generation,
        });
        self.state = CursorState::Searching;
        self.misses = 0;
        self.look_ahead_spent = false;
        self.probes_done = 0;
        self.failed_frame = None;
        self.last_good_frame = frame;
        self.stall = None;
    }

    /// Drops the anchor, e.g. after its key frame was deleted.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// A possible match at `frame` was accepted by the user and evolved.
    pub fn adopt_template(&mut self, frame: u32, template: Arc<Template>, generation: u32) {
        if let Some(a) = self.anchor.as_mut().filter(|a| a.frame == frame) {
            a.template = template;
            a.generation = generation;
        }
    }

    pub fn step<S, M>(
        &mut self,
        settings: &TrackerSettings,
        frames: &mut FrameStore,
        stepper: &mut S,
        matcher: &M,
    ) -> Result<StepReport, TrackError>
    where
        S: FrameStepper + ?Sized,
        M: TemplateSearch + ?Sized,
    {
        match self.state {
            CursorState::AwaitingKeyFrame => return Err(TrackError::NoReferenceTemplate),
            CursorState::Stalled => {
                return Err(self.stall.map(TrackError::EngineStalled).unwrap_or(TrackError::NoReferenceTemplate))
            }
            _ => {}
        }
        if !stepper.is_video_valid() {
            return Err(TrackError::VideoUnavailable);
        }
        if !stepper.can_step() {
            debug!(frame = stepper.frame_number(), "end of clip");
            return Ok(self.report(stepper.frame_number(), StepOutcome::EndOfClip, None));
        }
        stepper.step();
        let n = stepper.frame_number();

        if let Some(key) = frames.get(n).filter(|f| f.is_key_frame()) {
            let key = key.clone();
            self.anchor_on_key(n, &key);
            info!(frame = n, "reached key frame, re-anchored");
            let mut r = self.report(n, StepOutcome::KeyFrame, None);
            r.position = Some(key.position);
            return Ok(r);
        }

        let image = stepper.image().ok_or(TrackError::VideoUnavailable)?;
        let (width, height) = image.dimensions();
        let Some(anchor) = self.anchor.clone() else {
            return Err(TrackError::NoReferenceTemplate);
        };

        if self.state == CursorState::LookingAhead {
            let k = self.probes_done;
            let history = self.history(frames, &*stepper, settings, &anchor);
            let ahead = stepper.frame_to_step(n).abs_diff(stepper.frame_to_step(anchor.frame));
            let center = predict(&history, ahead, width, height).unwrap_or(anchor.center);
            let radius = settings.search_radius.saturating_mul(k + 1);
            let line = anchor.shape.is_line().then(|| stepper.coords(n).axis());
            let found = match SearchWindow::around(center, radius, &anchor.shape, width, height, line) {
                Ok(window) => Some(matcher.search(&anchor.template, image, &window)?),
                Err(VisionError::SearchWindowEmpty) => None,
                Err(e) => return Err(e.into()),
            };
            self.probes_done += 1;
            return match found {
                Some(m) if settings.is_match_good(m.score) => Ok(self.recover(n, m, &anchor, frames)),
                found => {
                    let reason = match found {
                        Some(_) => MissReason::BelowThreshold,
                        None => MissReason::WindowEmpty,
                    };
                    frames.record_miss(n, reason);
                    debug!(frame = n, probe = k + 1, "look-ahead probe missed");
                    if self.probes_done >= settings.look_ahead_bound() {
                        Ok(self.stall_at(n, StallReason::LookAheadExhausted, reason))
                    } else {
                        let mut r = self.report(n, StepOutcome::Missed(reason), None);
                        r.score = found.map(|m| m.score);
                        Ok(r)
                    }
                }
            };
        }

        let line = anchor.shape.is_line().then(|| stepper.coords(n).axis());
        let window = match SearchWindow::around(anchor.center, settings.search_radius, &anchor.shape, width, height, line) {
            Ok(w) => w,
            Err(VisionError::SearchWindowEmpty) => {
                return Ok(self.fail(n, settings, frames, MissReason::WindowEmpty, None));
            }
            Err(e) => return Err(e.into()),
        };
        let m = matcher.search(&anchor.template, image, &window)?;
        let ambiguous = m.runner_up.is_some_and(|r| settings.is_match_good(r));
        if ambiguous {
            warn!(frame = n, score = m.score, runner_up = ?m.runner_up, "ambiguous match");
        }

        let mut report = if settings.is_match_good(m.score) {
            let evolved = Arc::new(evolve(&anchor.template, &m.region, settings.evolve_rate)?);
            let generation = if settings.evolve_rate > 0 { anchor.generation + 1 } else { anchor.generation };
            let position = m.center.offset(anchor.target_offset.0, anchor.target_offset.1);
            frames.commit(
                n,
                FrameData {
                    position,
                    template: evolved.clone(),
                    score: Some(m.score),
                    runner_up: m.runner_up,
                    origin: RecordOrigin::Good,
                    generation,
                    region: None,
                    key: None,
                },
            );
            self.anchor = Some(Anchor { frame: n, center: m.center, template: evolved, generation, ..anchor });
            self.misses = 0;
            self.look_ahead_spent = false;
            self.failed_frame = None;
            self.last_good_frame = n;
            self.state = CursorState::AcceptedGood;
            debug!(frame = n, score = m.score, x = position.x, y = position.y, "good match");
            self.report(n, StepOutcome::Good, Some(&m))
        } else if settings.is_match_possible(m.score) {
            let position = m.center.offset(anchor.target_offset.0, anchor.target_offset.1);
            frames.commit(
                n,
                FrameData {
                    position,
                    template: anchor.template.clone(),
                    score: Some(m.score),
                    runner_up: m.runner_up,
                    origin: RecordOrigin::Possible,
                    generation: anchor.generation,
                    region: Some(m.region.clone()),
                    key: None,
                },
            );
            self.anchor = Some(Anchor { frame: n, center: m.center, ..anchor });
            self.last_good_frame = n;
            self.state = CursorState::AcceptedPossible;
            debug!(frame = n, score = m.score, "possible match");
            self.report(n, StepOutcome::Possible, Some(&m))
        } else {
            self.fail(n, settings, frames, MissReason::BelowThreshold, Some(&m))
        };
        report.ambiguous = ambiguous;
        Ok(report)
    }

    fn fail(
        &mut self,
        n: u32,
        settings: &TrackerSettings,
        frames: &mut FrameStore,
        reason: MissReason,
        m: Option<&MatchResult>,
    ) -> StepReport {
        frames.record_miss(n, reason);
        self.misses += 1;
        if self.misses <= settings.autoskip {
            self.state = CursorState::Skipping;
            debug!(frame = n, misses = self.misses, ?reason, "skipping frame");
            return self.report(n, StepOutcome::Missed(reason), m);
        }
        self.failed_frame.get_or_insert(n);
        if settings.look_ahead && !self.look_ahead_spent {
            self.look_ahead_spent = true;
            self.probes_done = 0;
            self.state = CursorState::LookingAhead;
            info!(frame = n, probes = settings.look_ahead_bound(), "autoskip exhausted, looking ahead");
            return self.report(n, StepOutcome::Missed(reason), m);
        }
        let mut r = self.stall_at(n, StallReason::AutoskipExhausted, reason);
        r.score = m.map(|m| m.score);
        r.runner_up = m.and_then(|m| m.runner_up);
        r
    }

    fn recover(&mut self, n: u32, m: MatchResult, anchor: &Anchor, frames: &mut FrameStore) -> StepReport {
        let position = m.center.offset(anchor.target_offset.0, anchor.target_offset.1);
        frames.commit(
            n,
            FrameData {
                position,
                template: anchor.template.clone(),
                score: Some(m.score),
                runner_up: m.runner_up,
                origin: RecordOrigin::Recovered,
                generation: anchor.generation,
                region: None,
                key: None,
            },
        );
        self.anchor = Some(Anchor { frame: n, center: m.center, ..anchor.clone() });
        self.misses = 0;
        self.look_ahead_spent = false;
        self.probes_done = 0;
        self.failed_frame = None;
        self.last_good_frame = n;
        self.state = CursorState::Searching;
        info!(frame = n, score = m.score, "look-ahead recovered the feature");
        self.report(n, StepOutcome::Recovered, Some(&m))
    }

    fn stall_at(&mut self, n: u32, reason: StallReason, miss: MissReason) -> StepReport {
        let report = StallReport {
            failed_frame: self.failed_frame.unwrap_or(n),
            last_good_frame: self.last_good_frame,
            reason,
        };
        self.stall = Some(report);
        self.state = CursorState::Stalled;
        warn!(
            failed_frame = report.failed_frame,
            last_good_frame = report.last_good_frame,
            %reason,
            "autotrack stalled"
        );
        self.report(n, StepOutcome::Missed(miss), None)
    }

    /// Positions at the anchor step and the steps before it, newest first.
    fn history<S>(&self, frames: &FrameStore, stepper: &S, settings: &TrackerSettings, anchor: &Anchor) -> Vec<Option<Point>>
    where
        S: FrameStepper + ?Sized,
    {
        let base = stepper.frame_to_step(anchor.frame);
        let (ox, oy) = anchor.target_offset;
        (0..settings.prediction_lookback)
            .map(|j| {
                let step = if stepper.is_reverse() { base.checked_add(j) } else { base.checked_sub(j) }?;
                let frame = stepper.step_to_frame(step);
                if frame == anchor.frame {
                    return Some(anchor.center);
                }
                frames.get(frame).map(|f| f.position.offset(-ox, -oy))
            })
            .collect()
    }

    fn report(&self, frame: u32, outcome: StepOutcome, m: Option<&MatchResult>) -> StepReport {
        let position = match outcome {
            StepOutcome::Good | StepOutcome::Possible | StepOutcome::Recovered => self
                .anchor
                .as_ref()
                .map(|a| a.center.offset(a.target_offset.0, a.target_offset.1)),
            _ => None,
        };
        StepReport {
            frame,
            outcome,
            state: self.state,
            position,
            score: m.map(|m| m.score),
            runner_up: m.and_then(|m| m.runner_up),
            ambiguous: false,
            misses: self.misses,
        }
    }
}
