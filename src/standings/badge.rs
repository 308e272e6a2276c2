use super::position_change::PositionChange;

/// What the licence and rating badge shows for one driver row.
#[derive(Clone, Debug, PartialEq)]
pub struct Badge {
    pub license: Option<String>,
    pub rating: Option<f64>,
    /// Only present when rating changes are enabled for the column.
    pub rating_change: Option<PositionChange>,
}

/// Content of the badge column for one driver row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BadgeCell {
    pub hidden: bool,
    pub license: Option<String>,
    pub rating: Option<f64>,
    pub rating_change: Option<f64>,
    pub rating_change_enabled: bool,
}

impl BadgeCell {
    /// The badge to render, or `None` for a hidden cell.
    pub fn content(&self) -> Option<Badge> {
        if self.hidden {
            return None;
        }
        Some(Badge {
            license: self.license.clone(),
            rating: self.rating,
            rating_change: self
                .rating_change_enabled
                .then(|| PositionChange::from_value(self.rating_change)),
        })
    }
}
