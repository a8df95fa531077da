use std::{collections::BTreeSet, fmt};

use color_eyre::eyre::{Result, bail};
use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::remote::{IntensityAxis, IntensityRatings, NoteDraft, Rating, TastingNote};

/// Local field state of the tasting note editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TastingForm {
    pub rating: Option<Rating>,
    pub note: String,
    pub flavors: BTreeSet<String>,
    pub intensity: IntensityRatings,
}

impl TastingForm {
    pub fn from_note(note: &TastingNote) -> Self {
        Self {
            rating: note.rating,
            note: note.note.clone().unwrap_or_default(),
            flavors: note.flavors.clone(),
            intensity: note.intensity_ratings.clone(),
        }
    }

    pub fn to_draft(&self) -> NoteDraft {
        let note = self.note.trim();
        NoteDraft {
            rating: self.rating,
            note: (!note.is_empty()).then(|| note.to_string()),
            flavors: self.flavors.clone(),
            intensity_ratings: self.intensity.clone(),
        }
    }

    /// Returns whether the tag is selected afterwards.
    pub fn toggle_flavor(&mut self, tag: &str) -> Result<bool> {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            bail!("flavor tag must not be empty");
        }
        if self.flavors.remove(&tag) {
            Ok(false)
        } else {
            self.flavors.insert(tag);
            Ok(true)
        }
    }
}

impl fmt::Display for TastingForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stars = match self.rating {
            Some(rating) => "★".repeat(rating.stars() as usize),
            None => "-".to_string(),
        };
        writeln!(f, "Rating:    {stars}")?;
        let flavors = if self.flavors.is_empty() {
            "-".to_string()
        } else {
            self.flavors.iter().join(", ")
        };
        writeln!(f, "Flavors:   {flavors}")?;
        let intensity = IntensityAxis::iter()
            .map(|axis| format!("{axis} {}", self.intensity.level(axis)))
            .join("  ");
        writeln!(f, "Intensity: {intensity}")?;
        let note = if self.note.is_empty() { "-" } else { &self.note };
        write!(f, "Note:      {note}")
    }
}
