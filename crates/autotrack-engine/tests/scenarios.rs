use std::cell::RefCell;
use std::collections::HashMap;

use autotrack_engine::{AutoTrack, FrameStatus, NoFeedback, TrackError, TrackerSettings};
use autotrack_proto::record::RecordOrigin;
use autotrack_proto::report::{CursorState, MissReason, StallReason, StepOutcome};
use autotrack_proto::Point;
use autotrack_vision::{
    ClipSpec, ImageSequence, MatchResult, Patch, RgbImage, SearchWindow, Template, TemplateSearch, VisionError,
};

/// Matcher that reads the frame number from pixel (0, 0) and answers with a
/// scripted score, moving the match by a fixed drift from the window centre.
struct Scripted {
    scores: HashMap<u32, f64>,
    fallback: f64,
    drift: (f64, f64),
    seen: RefCell<Vec<(u32, Point)>>,
}

impl Scripted {
    fn new(fallback: f64) -> Self {
        Self { scores: HashMap::new(), fallback, drift: (0.0, 0.0), seen: RefCell::new(Vec::new()) }
    }

    fn score(mut self, frame: u32, score: f64) -> Self {
        self.scores.insert(frame, score);
        self
    }

    fn drift(mut self, dx: f64, dy: f64) -> Self {
        self.drift = (dx, dy);
        self
    }
}

impl TemplateSearch for Scripted {
    fn search(&self, template: &Template, image: &RgbImage, window: &SearchWindow) -> Result<MatchResult, VisionError> {
        let frame = image.get_pixel(0, 0).0[0] as u32;
        let c = window.center();
        self.seen.borrow_mut().push((frame, c));
        let center = c.offset(self.drift.0, self.drift.1);
        let (bx, by) = center.round();
        let shape = window.shape();
        let (region, _) = Patch::cut(
            image,
            bx - shape.left() as i64,
            by - shape.top() as i64,
            template.width(),
            template.height(),
        );
        Ok(MatchResult {
            offset: (bx - c.round().0, by - c.round().1),
            center,
            score: *self.scores.get(&frame).unwrap_or(&self.fallback),
            runner_up: None,
            region,
        })
    }
}

fn clip(n: u32) -> ImageSequence {
    let frames = (0..n)
        .map(|k| {
            let mut img = RgbImage::from_fn(200, 200, |x, y| image::Rgb([40 + (x % 7) as u8, 60 + (y % 5) as u8, 90]));
            img.put_pixel(0, 0, image::Rgb([k as u8, 0, 0]));
            img
        })
        .collect();
    ImageSequence::new(frames, ClipSpec::default()).unwrap()
}

fn track(matcher: Scripted, settings: TrackerSettings) -> AutoTrack<Scripted> {
    let mut t = AutoTrack::with_matcher("ball", matcher);
    t.options_mut().apply(settings).unwrap();
    t
}

fn scenario_settings() -> TrackerSettings {
    TrackerSettings {
        good_match: 4.0,
        possible_match: 1.0,
        evolve_rate: 63,
        autoskip: 2,
        look_ahead: true,
        ..Default::default()
    }
}

#[test]
fn good_matches_follow_drift_and_evolve() {
    let mut t = track(Scripted::new(5.0).drift(1.0, 0.0), scenario_settings());
    let mut seq = clip(4);
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();
    let key_template = t.frames().get(0).unwrap().template.clone();

    for n in 1..=3 {
        let r = t.step(&mut seq, &mut NoFeedback).unwrap();
        assert_eq!(r.frame, n);
        assert_eq!(r.outcome, StepOutcome::Good);
        assert_eq!(r.state, CursorState::AcceptedGood);
        assert_eq!(r.position, Some(Point::new(100.0 + n as f64, 100.0)));
    }

    let autos: Vec<_> = t.frames().iter().filter(|(_, f)| !f.is_key_frame()).collect();
    assert_eq!(autos.len(), 3);
    let last = t.frames().get(3).unwrap();
    assert_eq!(last.generation, 3);
    assert_eq!(last.origin, RecordOrigin::Good);
    assert_ne!(*last.template, *key_template);
    assert_eq!(t.status(2), FrameStatus::GoodMatch);

    let r = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r.outcome, StepOutcome::EndOfClip);
}

#[test]
fn skip_then_look_ahead_then_stall() {
    let matcher = Scripted::new(0.5);
    let mut t = track(matcher, scenario_settings());
    let mut seq = clip(12);
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();

    let r1 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r1.outcome, StepOutcome::Missed(MissReason::BelowThreshold));
    assert_eq!(r1.state, CursorState::Skipping);
    assert!(t.frames().get(1).is_none());

    let r2 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r2.state, CursorState::Skipping);
    let r3 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r3.frame, 3);
    assert_eq!(r3.state, CursorState::LookingAhead);

    // frames 1..=3 all searched around the key frame position
    let seen = t.matcher().seen.borrow().clone();
    assert!(seen[..3].iter().all(|(_, c)| *c == Point::new(100.0, 100.0)));

    let bound = scenario_settings().look_ahead_bound();
    for k in 0..bound {
        let r = t.step(&mut seq, &mut NoFeedback).unwrap();
        if k + 1 < bound {
            assert_eq!(r.state, CursorState::LookingAhead);
        } else {
            assert_eq!(r.state, CursorState::Stalled);
        }
    }

    let stall = t.stall().unwrap();
    assert_eq!(stall.failed_frame, 3);
    assert_eq!(stall.last_good_frame, 0);
    assert_eq!(stall.reason, StallReason::LookAheadExhausted);
    assert_eq!(t.step(&mut seq, &mut NoFeedback), Err(TrackError::EngineStalled(stall)));
    assert_eq!(t.frames().len(), 1);
    assert_eq!(t.status(2), FrameStatus::NoMatch);
}

#[test]
fn always_failing_run_is_bounded() {
    for look_ahead in [true, false] {
        let settings = TrackerSettings { look_ahead, ..scenario_settings() };
        let mut t = track(Scripted::new(0.0), settings);
        let mut seq = clip(30);
        t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();

        let mut visited = 0;
        loop {
            match t.step(&mut seq, &mut NoFeedback) {
                Ok(r) => {
                    visited += 1;
                    if r.state == CursorState::Stalled {
                        break;
                    }
                }
                Err(e) => panic!("unexpected error {e}"),
            }
            assert!(visited < 30, "never stalled");
        }
        let bound = if look_ahead { settings.look_ahead_bound() } else { 0 };
        assert_eq!(visited, settings.autoskip + bound + 1);
        let reason = if look_ahead { StallReason::LookAheadExhausted } else { StallReason::AutoskipExhausted };
        assert_eq!(t.stall().map(|s| s.reason), Some(reason));
        assert_eq!(t.stall().map(|s| s.failed_frame), Some(settings.autoskip + 1));
    }
}

#[test]
fn look_ahead_recovers_without_evolving() {
    let matcher = Scripted::new(0.2).score(5, 9.0).score(6, 9.0);
    let mut t = track(matcher, scenario_settings());
    let mut seq = clip(10);
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();

    for _ in 1..=3 {
        t.step(&mut seq, &mut NoFeedback).unwrap();
    }
    assert_eq!(t.state(), CursorState::LookingAhead);
    let r4 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r4.outcome, StepOutcome::Missed(MissReason::BelowThreshold));
    let r5 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r5.outcome, StepOutcome::Recovered);
    assert_eq!(t.status(5), FrameStatus::Recovered);
    assert_eq!(t.frames().get(5).unwrap().generation, 0);
    assert!(t.frames().get(4).is_none());

    let r6 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r6.outcome, StepOutcome::Good);
    assert_eq!(t.frames().get(6).unwrap().generation, 1);
}

#[test]
fn possible_match_moves_anchor_and_can_be_accepted() {
    let matcher = Scripted::new(5.0).score(1, 2.0).drift(2.0, 1.0);
    let mut t = track(matcher, scenario_settings());
    let mut seq = clip(4);
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();

    let r1 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r1.outcome, StepOutcome::Possible);
    assert_eq!(r1.position, Some(Point::new(102.0, 101.0)));
    let possible = t.frames().get(1).unwrap();
    assert!(possible.region.is_some());
    assert_eq!(possible.generation, 0);

    let r2 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r2.position, Some(Point::new(104.0, 102.0)));

    assert_eq!(t.force_accept(2, &mut NoFeedback), Err(TrackError::NotAPossibleMatch(2)));
    t.force_accept(1, &mut NoFeedback).unwrap();
    assert_eq!(t.status(1), FrameStatus::AcceptedByUser);
    assert_eq!(t.frames().get(1).unwrap().generation, 1);
    assert!(t.frames().get(1).unwrap().region.is_none());
}

#[test]
fn key_frames_are_reanchored_not_overwritten() {
    let matcher = Scripted::new(6.0).drift(1.0, 0.0);
    let mut t = track(matcher, scenario_settings());
    let mut seq = clip(5);
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();
    assert!(seq.seek_frame(2));
    t.add_key_frame(&seq, Point::new(150.0, 60.0), &mut NoFeedback).unwrap();
    assert!(seq.seek_frame(0));
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();

    t.step(&mut seq, &mut NoFeedback).unwrap();
    let r2 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r2.outcome, StepOutcome::KeyFrame);
    assert_eq!(t.frames().get(2).unwrap().position, Point::new(150.0, 60.0));
    assert!(t.frames().get(2).unwrap().is_key_frame());

    let r3 = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r3.position, Some(Point::new(151.0, 60.0)));
    assert_eq!(t.list_key_frames(), vec![0, 2]);
}

#[test]
fn reverse_tracking_walks_backwards() {
    let matcher = Scripted::new(5.0).drift(-1.0, 0.0);
    let mut t = track(matcher, scenario_settings());
    let frames = (0..5)
        .map(|k| {
            let mut img = RgbImage::from_pixel(200, 200, image::Rgb([50, 50, 50]));
            img.put_pixel(0, 0, image::Rgb([k as u8, 0, 0]));
            img
        })
        .collect();
    let mut seq = ImageSequence::new(frames, ClipSpec { start: 0, stride: 1, reverse: true }).unwrap();
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();
    let visited: Vec<u32> = (0..4).map(|_| t.step(&mut seq, &mut NoFeedback).unwrap().frame).collect();
    assert_eq!(visited, vec![3, 2, 1, 0]);
    assert_eq!(t.frames().get(0).unwrap().position, Point::new(96.0, 100.0));
}

#[test]
fn new_key_frame_clears_stall() {
    let mut t = track(Scripted::new(0.0), TrackerSettings { look_ahead: false, autoskip: 0, ..scenario_settings() });
    let mut seq = clip(6);
    t.add_key_frame(&seq, Point::new(100.0, 100.0), &mut NoFeedback).unwrap();
    let r = t.step(&mut seq, &mut NoFeedback).unwrap();
    assert_eq!(r.state, CursorState::Stalled);
    assert!(matches!(t.step(&mut seq, &mut NoFeedback), Err(TrackError::EngineStalled(_))));

    t.add_key_frame(&seq, Point::new(90.0, 90.0), &mut NoFeedback).unwrap();
    assert_eq!(t.state(), CursorState::Searching);
    assert!(t.stall().is_none());
}
