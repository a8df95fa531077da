use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use color_eyre::eyre::{Result, bail};
use derive_deref::Deref;
use educe::Educe;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use time::OffsetDateTime;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(NoteId);
uuid_id!(WhiskyId);
uuid_id!(UserId);
uuid_id!(GuestSessionId);

impl GuestSessionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Star rating, 1 to 5 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MAX: u8 = 5;

    pub fn new(stars: u8) -> Result<Self> {
        if !(1..=Self::MAX).contains(&stars) {
            bail!("rating must be between 1 and {}, got {stars}", Self::MAX);
        }
        Ok(Self(stars))
    }

    pub fn stars(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Rating::new(value).map_err(|err| err.to_string())
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum IntensityAxis {
    Fruit,
    Floral,
    Oak,
    Smoke,
    Spice,
}

/// Slider levels per axis. Axes that were never touched are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<IntensityAxis, u8>")]
pub struct IntensityRatings(BTreeMap<IntensityAxis, u8>);

impl IntensityRatings {
    pub const MAX_LEVEL: u8 = 4;

    pub fn set(&mut self, axis: IntensityAxis, level: u8) -> Result<()> {
        if level > Self::MAX_LEVEL {
            bail!(
                "{axis} intensity must be between 0 and {}, got {level}",
                Self::MAX_LEVEL
            );
        }
        self.0.insert(axis, level);
        Ok(())
    }

    pub fn level(&self, axis: IntensityAxis) -> u8 {
        self.0.get(&axis).copied().unwrap_or_default()
    }
}

impl TryFrom<BTreeMap<IntensityAxis, u8>> for IntensityRatings {
    type Error = String;

    fn try_from(value: BTreeMap<IntensityAxis, u8>) -> std::result::Result<Self, Self::Error> {
        let mut ratings = Self::default();
        for (axis, level) in value {
            ratings.set(axis, level).map_err(|err| err.to_string())?;
        }
        Ok(ratings)
    }
}

/// Who a note belongs to. Exactly one of the two owner columns is set remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    User(UserId),
    Guest(GuestSessionId),
}

impl Owner {
    /// PostgREST filter selecting rows of this owner.
    pub fn filter(&self) -> (&'static str, String) {
        match self {
            Owner::User(id) => ("user_id", format!("eq.{id}")),
            Owner::Guest(id) => ("guest_session_id", format!("eq.{id}")),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::User(id) => write!(f, "user {id}"),
            Owner::Guest(id) => write!(f, "guest {id}"),
        }
    }
}

#[derive(Educe, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[educe(Debug)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: String,
    #[educe(Debug(ignore))]
    pub access_token: String,
}

/// Which identity a request is made under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Anonymous,
    Guest(GuestSessionId),
    User(AuthSession),
}

impl Scope {
    pub fn owner(&self) -> Option<Owner> {
        match self {
            Scope::Anonymous => None,
            Scope::Guest(id) => Some(Owner::Guest(*id)),
            Scope::User(session) => Some(Owner::User(session.user_id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TastingNote {
    pub id: NoteId,
    pub user_id: Option<UserId>,
    pub guest_session_id: Option<GuestSessionId>,
    pub whisky_id: WhiskyId,
    pub rating: Option<Rating>,
    pub note: Option<String>,
    #[serde(default)]
    pub flavors: BTreeSet<String>,
    #[serde(default)]
    pub intensity_ratings: IntensityRatings,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TastingNote {
    pub fn owner(&self) -> Option<Owner> {
        match (self.user_id, self.guest_session_id) {
            (Some(user), None) => Some(Owner::User(user)),
            (None, Some(guest)) => Some(Owner::Guest(guest)),
            _ => None,
        }
    }
}

/// The editable part of a note, i.e. the full form state at the time of saving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub rating: Option<Rating>,
    pub note: Option<String>,
    pub flavors: BTreeSet<String>,
    pub intensity_ratings: IntensityRatings,
}

/// Row body for inserts and updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteRow<'a> {
    pub user_id: Option<UserId>,
    pub guest_session_id: Option<GuestSessionId>,
    pub whisky_id: WhiskyId,
    pub rating: Option<Rating>,
    pub note: Option<&'a str>,
    pub flavors: &'a BTreeSet<String>,
    pub intensity_ratings: &'a IntensityRatings,
}

impl<'a> NoteRow<'a> {
    pub fn new(owner: Owner, whisky_id: WhiskyId, draft: &'a NoteDraft) -> Self {
        let (user_id, guest_session_id) = match owner {
            Owner::User(id) => (Some(id), None),
            Owner::Guest(id) => (None, Some(id)),
        };
        Self {
            user_id,
            guest_session_id,
            whisky_id,
            rating: draft.rating,
            note: draft.note.as_deref(),
            flavors: &draft.flavors,
            intensity_ratings: &draft.intensity_ratings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whisky {
    pub id: WhiskyId,
    pub name: String,
    pub distillery: Option<String>,
    #[serde(default)]
    pub flavor_profile: IntensityRatings,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(5).unwrap().stars(), 5);
    }

    #[test]
    fn test_intensity_rejects_out_of_range() {
        let mut ratings = IntensityRatings::default();
        assert!(ratings.set(IntensityAxis::Smoke, 5).is_err());
        ratings.set(IntensityAxis::Smoke, 4).unwrap();
        assert_eq!(ratings.level(IntensityAxis::Smoke), 4);
        assert_eq!(ratings.level(IntensityAxis::Oak), 0);
    }

    #[test]
    fn test_axis_parses_case_insensitive() {
        assert_eq!("Smoke".parse::<IntensityAxis>().unwrap(), IntensityAxis::Smoke);
        assert!("peat".parse::<IntensityAxis>().is_err());
    }

    #[test]
    fn test_note_row_sets_exactly_one_owner_column() {
        let guest = GuestSessionId::random();
        let whisky = WhiskyId(Uuid::new_v4());
        let mut draft = NoteDraft {
            rating: Some(Rating::new(4).unwrap()),
            flavors: ["smoke".to_string(), "honey".to_string()].into(),
            ..Default::default()
        };
        draft.intensity_ratings.set(IntensityAxis::Smoke, 3).unwrap();

        let row = serde_json::to_value(NoteRow::new(Owner::Guest(guest), whisky, &draft)).unwrap();

        assert_eq!(
            row,
            json!({
                "user_id": null,
                "guest_session_id": guest.to_string(),
                "whisky_id": whisky.to_string(),
                "rating": 4,
                "note": null,
                "flavors": ["honey", "smoke"],
                "intensity_ratings": { "smoke": 3 },
            })
        );
    }

    #[test]
    fn test_tasting_note_from_backend_row() {
        let id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let whisky = Uuid::new_v4();
        let row = json!({
            "id": id,
            "user_id": user,
            "guest_session_id": null,
            "whisky_id": whisky,
            "rating": 3,
            "note": "sea spray",
            "flavors": ["smoke"],
            "intensity_ratings": { "smoke": 4, "fruit": 1 },
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:05:00+00:00",
        });

        let note: TastingNote = serde_json::from_value(row).unwrap();

        assert_eq!(note.owner(), Some(Owner::User(UserId(user))));
        assert_eq!(note.rating, Some(Rating::new(3).unwrap()));
        assert_eq!(note.intensity_ratings.level(IntensityAxis::Fruit), 1);
    }

    #[test]
    fn test_rejects_invalid_rating_from_backend() {
        let result: Result<Rating, _> = serde_json::from_value(json!(9));
        assert!(result.is_err());
    }

    #[test]
    fn test_auth_session_debug_hides_token() {
        let session = AuthSession {
            user_id: UserId(Uuid::new_v4()),
            email: "a@b.c".into(),
            access_token: "secret-token".into(),
        };
        assert!(!format!("{session:?}").contains("secret-token"));
    }
}
