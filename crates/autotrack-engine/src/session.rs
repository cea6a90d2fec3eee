use autotrack_vision::{SsdMatcher, TemplateSearch};

use crate::{AutoTrack, TrackError, TrackFeedback};

/// The tracks of one analysis plus which of them the user is working on.
#[derive(Debug)]
pub struct Session<M: TemplateSearch = SsdMatcher> {
    tracks: Vec<AutoTrack<M>>,
    selected: Option<usize>,
}

impl<M: TemplateSearch> Default for Session<M> {
    fn default() -> Self {
        Self { tracks: Vec::new(), selected: None }
    }
}

impl<M: TemplateSearch> Session<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tracks.iter().map(|t| t.name())
    }

    pub fn add(&mut self, track: AutoTrack<M>, feedback: &mut dyn TrackFeedback) -> Result<(), TrackError> {
        if self.position(track.name()).is_some() {
            return Err(TrackError::DuplicateTrack(track.name().to_string()));
        }
        feedback.bound(track.name());
        self.tracks.push(track);
        Ok(())
    }

    pub fn remove(&mut self, name: &str, feedback: &mut dyn TrackFeedback) -> Option<AutoTrack<M>> {
        let k = self.position(name)?;
        let track = self.tracks.remove(k);
        feedback.unbound(track.name());
        match self.selected {
            Some(s) if s == k => {
                self.selected = None;
                feedback.selected_track_changed(None);
            }
            Some(s) if s > k => self.selected = Some(s - 1),
            _ => {}
        }
        Some(track)
    }

    /// Selects a track by name, or clears the selection with `None`.
    pub fn select(&mut self, name: Option<&str>, feedback: &mut dyn TrackFeedback) -> bool {
        let next = match name {
            Some(n) => match self.position(n) {
                Some(k) => Some(k),
                None => return false,
            },
            None => None,
        };
        if next != self.selected {
            self.selected = next;
            feedback.selected_track_changed(self.selected().map(|t| t.name()));
        }
        true
    }

    pub fn selected(&self) -> Option<&AutoTrack<M>> {
        self.selected.map(|k| &self.tracks[k])
    }

    pub fn selected_mut(&mut self) -> Option<&mut AutoTrack<M>> {
        self.selected.map(|k| &mut self.tracks[k])
    }

    pub fn get(&self, name: &str) -> Option<&AutoTrack<M>> {
        self.position(name).map(|k| &self.tracks[k])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AutoTrack<M>> {
        self.position(name).map(|k| &mut self.tracks[k])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Vec<String>);

    impl TrackFeedback for Log {
        fn bound(&mut self, track: &str) {
            self.0.push(format!("bound {track}"));
        }
        fn unbound(&mut self, track: &str) {
            self.0.push(format!("unbound {track}"));
        }
        fn selected_track_changed(&mut self, track: Option<&str>) {
            self.0.push(format!("selected {track:?}"));
        }
    }

    #[test]
    fn add_select_remove() {
        let mut log = Log::default();
        let mut s: Session = Session::new();
        s.add(AutoTrack::new("a"), &mut log).unwrap();
        s.add(AutoTrack::new("b"), &mut log).unwrap();
        assert!(matches!(s.add(AutoTrack::new("a"), &mut log), Err(TrackError::DuplicateTrack(_))));
        assert!(s.select(Some("b"), &mut log));
        assert!(!s.select(Some("zzz"), &mut log));
        assert_eq!(s.selected().map(|t| t.name()), Some("b"));

        s.remove("a", &mut log);
        assert_eq!(s.selected().map(|t| t.name()), Some("b"));
        s.remove("b", &mut log);
        assert!(s.selected().is_none());
        assert!(s.is_empty());
        assert_eq!(
            log.0,
            vec!["bound a", "bound b", "selected Some(\"b\")", "unbound a", "unbound b", "selected None"]
        );
    }
}
