use autotrack_vision::{MaskKind, MaskShape, MAX_MASK_EXTENT};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Plain option values of one track. Missing TOML fields take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub good_match: f64,
    pub possible_match: f64,
    /// Percent of a good match blended into the template.
    pub evolve_rate: u32,
    pub autoskip: u32,
    pub mask_width: u32,
    pub mask_height: u32,
    /// > 0 selects 1-D tracking along the x-axis with this strip half-width.
    pub line_spread: i32,
    pub look_ahead: bool,
    pub search_radius: u32,
    pub mask_kind: MaskKind,
    pub prediction_lookback: u32,
    pub look_ahead_factor: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            good_match: 4.0,
            possible_match: 1.0,
            evolve_rate: 20,
            autoskip: 2,
            mask_width: 21,
            mask_height: 21,
            line_spread: -1,
            look_ahead: true,
            search_radius: 20,
            mask_kind: MaskKind::Ellipse,
            prediction_lookback: 4,
            look_ahead_factor: 2,
        }
    }
}

pub const MAX_EVOLVE_RATE: u32 = 100;
pub const LOOKBACK_RANGE: std::ops::RangeInclusive<u32> = 2..=8;

impl TrackerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (option, value) in [("goodMatch", self.good_match), ("possibleMatch", self.possible_match)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::BadThreshold { option, value });
            }
        }
        if self.good_match <= self.possible_match {
            return Err(ConfigError::ThresholdOrder { good: self.good_match, possible: self.possible_match });
        }
        let ranged = [
            ("maskWidth", self.mask_width, 1..=MAX_MASK_EXTENT, "1..=4096"),
            ("maskHeight", self.mask_height, 1..=MAX_MASK_EXTENT, "1..=4096"),
            ("searchRadius", self.search_radius, 1..=u32::MAX, ">= 1"),
            ("predictionLookback", self.prediction_lookback, LOOKBACK_RANGE, "2..=8"),
            ("lookAheadFactor", self.look_ahead_factor, 1..=u32::MAX, ">= 1"),
        ];
        for (option, value, range, label) in ranged {
            if !range.contains(&value) {
                return Err(ConfigError::OutOfRange { option, value: value as i64, range: label });
            }
        }
        Ok(())
    }

    pub fn mask_shape(&self) -> MaskShape {
        MaskShape::new(self.mask_width, self.mask_height, self.mask_kind, self.line_spread)
    }

    /// Most frames probed by one look-ahead.
    pub fn look_ahead_bound(&self) -> u32 {
        self.look_ahead_factor * self.autoskip.max(1)
    }

    pub fn is_match_good(&self, score: f64) -> bool {
        score > self.good_match
    }

    pub fn is_match_possible(&self, score: f64) -> bool {
        score > self.possible_match
    }
}

/// Which option changed; `name()` is the notification name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionChange {
    GoodMatch,
    PossibleMatch,
    EvolveAlpha,
    Autoskip,
    MaskWidth,
    MaskHeight,
    LineSpread,
    LookAhead,
    SearchRadius,
    MaskKind,
    PredictionLookback,
    LookAheadFactor,
}

impl OptionChange {
    pub fn name(self) -> &'static str {
        match self {
            OptionChange::GoodMatch => "goodMatch",
            OptionChange::PossibleMatch => "possibleMatch",
            OptionChange::EvolveAlpha => "evolveAlpha",
            OptionChange::Autoskip => "autoskip",
            OptionChange::MaskWidth => "maskWidth",
            OptionChange::MaskHeight => "maskHeight",
            OptionChange::LineSpread => "lineSpread",
            OptionChange::LookAhead => "lookAhead",
            OptionChange::SearchRadius => "searchRadius",
            OptionChange::MaskKind => "maskKind",
            OptionChange::PredictionLookback => "predictionLookback",
            OptionChange::LookAheadFactor => "lookAheadFactor",
        }
    }

    fn differs(self, a: &TrackerSettings, b: &TrackerSettings) -> bool {
        match self {
            OptionChange::GoodMatch => a.good_match != b.good_match,
            OptionChange::PossibleMatch => a.possible_match != b.possible_match,
            OptionChange::EvolveAlpha => a.evolve_rate != b.evolve_rate,
            OptionChange::Autoskip => a.autoskip != b.autoskip,
            OptionChange::MaskWidth => a.mask_width != b.mask_width,
            OptionChange::MaskHeight => a.mask_height != b.mask_height,
            OptionChange::LineSpread => a.line_spread != b.line_spread,
            OptionChange::LookAhead => a.look_ahead != b.look_ahead,
            OptionChange::SearchRadius => a.search_radius != b.search_radius,
            OptionChange::MaskKind => a.mask_kind != b.mask_kind,
            OptionChange::PredictionLookback => a.prediction_lookback != b.prediction_lookback,
            OptionChange::LookAheadFactor => a.look_ahead_factor != b.look_ahead_factor,
        }
    }

    const ALL: [OptionChange; 12] = [
        OptionChange::GoodMatch,
        OptionChange::PossibleMatch,
        OptionChange::EvolveAlpha,
        OptionChange::Autoskip,
        OptionChange::MaskWidth,
        OptionChange::MaskHeight,
        OptionChange::LineSpread,
        OptionChange::LookAhead,
        OptionChange::SearchRadius,
        OptionChange::MaskKind,
        OptionChange::PredictionLookback,
        OptionChange::LookAheadFactor,
    ];
}

pub trait OptionsObserver {
    fn option_changed(&mut self, change: OptionChange, settings: &TrackerSettings);
}

impl<F> OptionsObserver for F
where
    F: FnMut(OptionChange, &TrackerSettings),
{
    fn option_changed(&mut self, change: OptionChange, settings: &TrackerSettings) {
        (*self)(change, settings)
    }
}

/// Options of one track: validated setters over [`TrackerSettings`] plus a
/// list of observers told about every accepted change. Cloning copies the
/// values only.
pub struct AutoTrackerOptions {
    settings: TrackerSettings,
    observers: Vec<Box<dyn OptionsObserver + Send>>,
}

impl Default for AutoTrackerOptions {
    fn default() -> Self {
        Self { settings: TrackerSettings::default(), observers: Vec::new() }
    }
}

impl Clone for AutoTrackerOptions {
    fn clone(&self) -> Self {
        Self { settings: self.settings, observers: Vec::new() }
    }
}

impl std::fmt::Debug for AutoTrackerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoTrackerOptions")
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl AutoTrackerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: TrackerSettings) -> Result<Self, ConfigError> {
        let mut settings = settings;
        settings.evolve_rate = settings.evolve_rate.min(MAX_EVOLVE_RATE);
        settings.validate()?;
        Ok(Self { settings, observers: Vec::new() })
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Copy handed to the engine for one step.
    pub fn snapshot(&self) -> TrackerSettings {
        self.settings
    }

    pub fn add_observer(&mut self, observer: Box<dyn OptionsObserver + Send>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn good_match(&self) -> f64 {
        self.settings.good_match
    }

    pub fn possible_match(&self) -> f64 {
        self.settings.possible_match
    }

    pub fn evolve_rate(&self) -> u32 {
        self.settings.evolve_rate
    }

    pub fn autoskip(&self) -> u32 {
        self.settings.autoskip
    }

    pub fn mask_width(&self) -> u32 {
        self.settings.mask_width
    }

    pub fn mask_height(&self) -> u32 {
        self.settings.mask_height
    }

    pub fn line_spread(&self) -> i32 {
        self.settings.line_spread
    }

    pub fn is_look_ahead(&self) -> bool {
        self.settings.look_ahead
    }

    pub fn search_radius(&self) -> u32 {
        self.settings.search_radius
    }

    pub fn mask_kind(&self) -> MaskKind {
        self.settings.mask_kind
    }

    pub fn prediction_lookback(&self) -> u32 {
        self.settings.prediction_lookback
    }

    pub fn look_ahead_factor(&self) -> u32 {
        self.settings.look_ahead_factor
    }

    pub fn set_good_match(&mut self, value: f64) -> Result<(), ConfigError> {
        self.update(OptionChange::GoodMatch, |s| s.good_match = value)
    }

    pub fn set_possible_match(&mut self, value: f64) -> Result<(), ConfigError> {
        self.update(OptionChange::PossibleMatch, |s| s.possible_match = value)
    }

    /// Clamps to 0..=100.
    pub fn set_evolve_rate(&mut self, rate: i64) -> Result<(), ConfigError> {
        let rate = rate.clamp(0, MAX_EVOLVE_RATE as i64) as u32;
        self.update(OptionChange::EvolveAlpha, |s| s.evolve_rate = rate)
    }

    pub fn set_autoskip(&mut self, frames: u32) -> Result<(), ConfigError> {
        self.update(OptionChange::Autoskip, |s| s.autoskip = frames)
    }

    pub fn set_mask_width(&mut self, width: u32) -> Result<(), ConfigError> {
        self.update(OptionChange::MaskWidth, |s| s.mask_width = width)
    }

    pub fn set_mask_height(&mut self, height: u32) -> Result<(), ConfigError> {
        self.update(OptionChange::MaskHeight, |s| s.mask_height = height)
    }

    pub fn set_line_spread(&mut self, spread: i32) -> Result<(), ConfigError> {
        self.update(OptionChange::LineSpread, |s| s.line_spread = spread)
    }

    pub fn set_look_ahead(&mut self, on: bool) -> Result<(), ConfigError> {
        self.update(OptionChange::LookAhead, |s| s.look_ahead = on)
    }

    pub fn set_search_radius(&mut self, radius: u32) -> Result<(), ConfigError> {
        self.update(OptionChange::SearchRadius, |s| s.search_radius = radius)
    }

    pub fn set_mask_kind(&mut self, kind: MaskKind) -> Result<(), ConfigError> {
        self.update(OptionChange::MaskKind, |s| s.mask_kind = kind)
    }

    pub fn set_prediction_lookback(&mut self, steps: u32) -> Result<(), ConfigError> {
        self.update(OptionChange::PredictionLookback, |s| s.prediction_lookback = steps)
    }

    pub fn set_look_ahead_factor(&mut self, factor: u32) -> Result<(), ConfigError> {
        self.update(OptionChange::LookAheadFactor, |s| s.look_ahead_factor = factor)
    }

    /// Replaces every value at once; observers hear about each field that changed.
    pub fn apply(&mut self, settings: TrackerSettings) -> Result<(), ConfigError> {
        let mut next = settings;
        next.evolve_rate = next.evolve_rate.min(MAX_EVOLVE_RATE);
        next.validate()?;
        let prev = std::mem::replace(&mut self.settings, next);
        for change in OptionChange::ALL {
            if change.differs(&prev, &self.settings) {
                self.notify(change);
            }
        }
        Ok(())
    }

    fn update(&mut self, change: OptionChange, edit: impl FnOnce(&mut TrackerSettings)) -> Result<(), ConfigError> {
        let mut next = self.settings;
        edit(&mut next);
        next.validate()?;
        if next == self.settings {
            return Ok(());
        }
        self.settings = next;
        self.notify(change);
        Ok(())
    }

    fn notify(&mut self, change: OptionChange) {
        tracing::debug!(option = change.name(), "option changed");
        for o in &mut self.observers {
            o.option_changed(change, &self.settings);
        }
    }
}
