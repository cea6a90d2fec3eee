use std::collections::BTreeMap;
use std::sync::Arc;

use autotrack_proto::record::{FrameRecord, KeyMask, RecordOrigin};
use autotrack_proto::report::MissReason;
use autotrack_proto::Point;
use autotrack_vision::{MaskShape, Patch, Template};

/// Extra data of a frame the user marked by hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyInfo {
    pub shape: MaskShape,
    /// Tracked point minus the integer template centre.
    pub target_offset: (f64, f64),
}

#[derive(Debug, Clone)]
pub struct FrameData {
    pub position: Point,
    pub template: Arc<Template>,
    pub score: Option<f64>,
    pub runner_up: Option<f64>,
    pub origin: RecordOrigin,
    /// Evolutions applied since the governing key frame.
    pub generation: u32,
    /// Matched image region, kept for possible matches until accepted.
    pub region: Option<Patch>,
    pub key: Option<KeyInfo>,
}

impl FrameData {
    pub fn is_key_frame(&self) -> bool {
        self.key.is_some()
    }

    pub fn to_record(&self, frame: u32) -> FrameRecord {
        let finite = |s: f64| if s.is_finite() { s } else { f64::MAX };
        FrameRecord {
            frame,
            x: self.position.x,
            y: self.position.y,
            key_frame: self.is_key_frame(),
            origin: self.origin,
            score: self.score.map(finite),
            runner_up: self.runner_up.map(finite),
            template_generation: self.generation,
            target_offset: self.key.map(|k| [k.target_offset.0, k.target_offset.1]),
            key_mask: self.key.map(|k| KeyMask { kind: k.shape.kind, line_spread: k.shape.line_spread }),
            template: self.template.to_data(),
        }
    }
}

/// Per-frame status as shown next to a track's frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    KeyFrame,
    GoodMatch,
    PossibleMatch,
    Recovered,
    AcceptedByUser,
    /// Searched, best score at or below the possible threshold.
    NoMatch,
    /// Search window fell outside the image.
    Unsearchable,
    NeverSearched,
}

/// Sparse, frame-ordered data of one track plus the frames that were searched
/// without result.
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    frames: BTreeMap<u32, FrameData>,
    misses: BTreeMap<u32, MissReason>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, frame: u32) -> Option<&FrameData> {
        self.frames.get(&frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &FrameData)> {
        self.frames.iter().map(|(n, f)| (*n, f))
    }

    pub fn set_key_frame(&mut self, frame: u32, data: FrameData) {
        self.misses.remove(&frame);
        self.frames.insert(frame, data);
    }

    /// Stores automatic data. Key frames are never overwritten; returns false then.
    pub fn commit(&mut self, frame: u32, data: FrameData) -> bool {
        if self.frames.get(&frame).is_some_and(FrameData::is_key_frame) {
            return false;
        }
        self.misses.remove(&frame);
        self.frames.insert(frame, data);
        true
    }

    pub fn record_miss(&mut self, frame: u32, reason: MissReason) {
        if !self.frames.contains_key(&frame) {
            self.misses.insert(frame, reason);
        }
    }

    /// Swaps in a new template for a stored frame.
    pub(crate) fn get_mut(&mut self, frame: u32) -> Option<&mut FrameData> {
        self.frames.get_mut(&frame)
    }

    /// Key frame governing `frame`: the nearest one at or before it in the
    /// tracking direction.
    pub fn key_frame_for(&self, frame: u32, reverse: bool) -> Option<(u32, &FrameData)> {
        let mut it: Box<dyn Iterator<Item = (&u32, &FrameData)>> = if reverse {
            Box::new(self.frames.range(frame..))
        } else {
            Box::new(self.frames.range(..=frame).rev())
        };
        it.find(|(_, f)| f.is_key_frame()).map(|(n, f)| (*n, f))
    }

    /// Nearest stored frame at or before `frame` in the tracking direction.
    pub fn nearest_at_or_before(&self, frame: u32, reverse: bool) -> Option<(u32, &FrameData)> {
        let found = if reverse {
            self.frames.range(frame..).next()
        } else {
            self.frames.range(..=frame).next_back()
        };
        found.map(|(n, f)| (*n, f))
    }

    pub fn list_key_frames(&self) -> Vec<u32> {
        self.iter().filter(|(_, f)| f.is_key_frame()).map(|(n, _)| n).collect()
    }

    /// Drops everything after `frame`, key frames included. Returns the number
    /// of frames removed.
    pub fn delete_after(&mut self, frame: u32) -> usize {
        let Some(start) = frame.checked_add(1) else { return 0 };
        let removed = self.frames.split_off(&start).len();
        self.misses.retain(|n, _| *n < start);
        removed
    }

    /// Drops the automatic data of one frame. Key frames stay.
    pub fn delete_frame(&mut self, frame: u32) -> bool {
        self.misses.remove(&frame);
        match self.frames.get(&frame) {
            Some(f) if !f.is_key_frame() => self.frames.remove(&frame).is_some(),
            _ => false,
        }
    }

    /// Turns a key frame into ordinary data. When no earlier key frame
    /// remains, everything up to the next key frame is cleared as well.
    pub fn delete_key_frame(&mut self, frame: u32) -> bool {
        let Some(data) = self.frames.get_mut(&frame) else { return false };
        if !data.is_key_frame() {
            return false;
        }
        data.key = None;
        data.origin = RecordOrigin::Accepted;

        let has_earlier = self.frames.range(..frame).any(|(_, f)| f.is_key_frame());
        if !has_earlier {
            let next = self
                .frames
                .range(frame..)
                .find(|(_, f)| f.is_key_frame())
                .map(|(n, _)| *n);
            match next {
                Some(next) => {
                    self.frames = self.frames.split_off(&next);
                    self.misses = self.misses.split_off(&next);
                }
                None => {
                    self.frames.clear();
                    self.misses.clear();
                }
            }
        }
        true
    }

    /// Removes all data in `from..=to`.
    pub fn clear_range(&mut self, from: u32, to: u32) -> usize {
        if from > to {
            return 0;
        }
        let doomed: Vec<u32> = self.frames.range(from..=to).map(|(n, _)| *n).collect();
        for n in &doomed {
            self.frames.remove(n);
        }
        let misses: Vec<u32> = self.misses.range(from..=to).map(|(n, _)| *n).collect();
        for n in misses {
            self.misses.remove(&n);
        }
        doomed.len()
    }

    pub fn status(&self, frame: u32) -> FrameStatus {
        if let Some(f) = self.frames.get(&frame) {
            if f.is_key_frame() {
                return FrameStatus::KeyFrame;
            }
            return match f.origin {
                RecordOrigin::Key | RecordOrigin::Accepted => FrameStatus::AcceptedByUser,
                RecordOrigin::Good => FrameStatus::GoodMatch,
                RecordOrigin::Possible => FrameStatus::PossibleMatch,
                RecordOrigin::Recovered => FrameStatus::Recovered,
            };
        }
        match self.misses.get(&frame) {
            Some(MissReason::BelowThreshold) => FrameStatus::NoMatch,
            Some(MissReason::WindowEmpty) => FrameStatus::Unsearchable,
            None => FrameStatus::NeverSearched,
        }
    }

    pub fn records(&self) -> Vec<FrameRecord> {
        self.iter().map(|(n, f)| f.to_record(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrack_vision::{MaskKind, RgbImage};

    fn template() -> Arc<Template> {
        let img = RgbImage::from_fn(30, 30, |x, y| image::Rgb([x as u8 * 5, y as u8 * 5, 7]));
        let shape = MaskShape::new(9, 9, MaskKind::Ellipse, -1);
        Arc::new(Template::capture(&img, (15, 15), &shape).unwrap())
    }

    fn auto(origin: RecordOrigin) -> FrameData {
        FrameData {
            position: Point::new(1.0, 2.0),
            template: template(),
            score: Some(5.0),
            runner_up: None,
            origin,
            generation: 1,
            region: None,
            key: None,
        }
    }

    fn key() -> FrameData {
        FrameData {
            score: None,
            origin: RecordOrigin::Key,
            generation: 0,
            key: Some(KeyInfo {
                shape: MaskShape::new(9, 9, MaskKind::Ellipse, -1),
                target_offset: (0.25, 0.0),
            }),
            ..auto(RecordOrigin::Key)
        }
    }

    fn store(keys: &[u32], autos: &[u32]) -> FrameStore {
        let mut s = FrameStore::new();
        for k in keys {
            s.set_key_frame(*k, key());
        }
        for a in autos {
            s.commit(*a, auto(RecordOrigin::Good));
        }
        s
    }

    #[test]
    fn commit_never_replaces_key_frame() {
        let mut s = store(&[3], &[]);
        assert!(!s.commit(3, auto(RecordOrigin::Good)));
        assert_eq!(s.status(3), FrameStatus::KeyFrame);
    }

    #[test]
    fn governing_key_frame_follows_direction() {
        let s = store(&[2, 8], &[3, 4, 9]);
        assert_eq!(s.key_frame_for(5, false).map(|(n, _)| n), Some(2));
        assert_eq!(s.key_frame_for(5, true).map(|(n, _)| n), Some(8));
        assert_eq!(s.key_frame_for(1, false).map(|(n, _)| n), None);
        assert_eq!(s.list_key_frames(), vec![2, 8]);
    }

    #[test]
    fn delete_after_and_frame() {
        let mut s = store(&[0, 6], &[1, 2, 7]);
        assert_eq!(s.delete_after(2), 2);
        assert_eq!(s.list_key_frames(), vec![0]);
        assert!(s.delete_frame(2));
        assert!(!s.delete_frame(0));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn deleting_first_key_clears_up_to_next() {
        let mut s = store(&[2, 6], &[3, 4, 7]);
        assert!(s.delete_key_frame(2));
        assert_eq!(s.iter().map(|(n, _)| n).collect::<Vec<_>>(), vec![6, 7]);

        let mut s = store(&[2, 6], &[3, 7]);
        assert!(s.delete_key_frame(6));
        assert_eq!(s.status(6), FrameStatus::AcceptedByUser);
        assert_eq!(s.len(), 4);
        assert!(!s.delete_key_frame(7));
    }

    #[test]
    fn status_covers_misses() {
        let mut s = store(&[0], &[1]);
        s.commit(2, auto(RecordOrigin::Possible));
        s.record_miss(3, MissReason::BelowThreshold);
        s.record_miss(4, MissReason::WindowEmpty);
        s.record_miss(1, MissReason::BelowThreshold);
        assert_eq!(s.status(1), FrameStatus::GoodMatch);
        assert_eq!(s.status(2), FrameStatus::PossibleMatch);
        assert_eq!(s.status(3), FrameStatus::NoMatch);
        assert_eq!(s.status(4), FrameStatus::Unsearchable);
        assert_eq!(s.status(5), FrameStatus::NeverSearched);
        s.commit(3, auto(RecordOrigin::Recovered));
        assert_eq!(s.status(3), FrameStatus::Recovered);
        assert_eq!(s.clear_range(0, 4), 4);
        assert_eq!(s.status(4), FrameStatus::NeverSearched);
    }

    #[test]
    fn records_write_finite_scores() {
        let mut s = store(&[0], &[]);
        let mut exact = auto(RecordOrigin::Good);
        exact.score = Some(f64::INFINITY);
        s.commit(1, exact);
        let r = s.records();
        assert_eq!(r[0].target_offset, Some([0.25, 0.0]));
        assert_eq!(r[1].score, Some(f64::MAX));
        assert!(r[1].target_offset.is_none());
    }
}
