/// Direction shown next to a position change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// Places gained or lost relative to the reference position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PositionChange {
    /// No reading, or the reading is not a number.
    Unknown,
    Gained(f64),
    /// Stored as a positive number of places.
    Lost(f64),
    Unchanged,
}

impl PositionChange {
    pub fn from_value(value: Option<f64>) -> Self {
        match value {
            None => PositionChange::Unknown,
            Some(v) if v.is_nan() => PositionChange::Unknown,
            Some(v) if v > 0. => PositionChange::Gained(v),
            Some(v) if v < 0. => PositionChange::Lost(v.abs()),
            Some(_) => PositionChange::Unchanged,
        }
    }

    pub fn trend(&self) -> Trend {
        match self {
            PositionChange::Gained(_) => Trend::Up,
            PositionChange::Lost(_) => Trend::Down,
            PositionChange::Unchanged | PositionChange::Unknown => Trend::Flat,
        }
    }

    /// Label shown beside the trend marker, `None` when there is nothing to show.
    pub fn text(&self) -> Option<String> {
        match self {
            PositionChange::Unknown => None,
            PositionChange::Gained(places) | PositionChange::Lost(places) => {
                Some(places.to_string())
            }
            PositionChange::Unchanged => Some("0".to_string()),
        }
    }
}

/// Content of the position-change column for one driver row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionChangeCell {
    pub hidden: bool,
    pub change: PositionChange,
}

impl PositionChangeCell {
    pub fn new(hidden: bool, value: Option<f64>) -> Self {
        Self {
            hidden,
            change: PositionChange::from_value(value),
        }
    }

    /// Trend and label to render, or `None` for a hidden cell.
    pub fn content(&self) -> Option<(Trend, Option<String>)> {
        if self.hidden {
            return None;
        }
        Some((self.change.trend(), self.change.text()))
    }
}
