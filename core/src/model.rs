use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROFILES_RELATION: &str = "children";
pub const TASKS_RELATION: &str = "chores";

/// A child profile, one row of `children`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub parent_user_id: Uuid,
    pub name: String,
    #[serde(default, with = "date_only")]
    pub birthdate: Option<NaiveDate>,
    /// Storage object path of the avatar inside the avatar bucket.
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Whole years between the birthdate and `today`.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let born = self.birthdate?;
        if today < born {
            return None;
        }
        let mut years = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// A chore, one row of `chores`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,
    pub parent_user_id: Uuid,
    #[serde(default)]
    pub child_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, with = "date_only")]
    pub due_date: Option<NaiveDate>,
    pub points: i32,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Encoded image bytes picked for a profile photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl AvatarImage {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/jpeg")
    }

    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/heic" => "heic",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub name: String,
    pub birthdate: Option<NaiveDate>,
    pub avatar: Option<AvatarImage>,
}

impl NewProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            birthdate: None,
            avatar: None,
        }
    }

    pub fn born(mut self, birthdate: NaiveDate) -> Self {
        self.birthdate = Some(birthdate);
        self
    }

    pub fn with_avatar(mut self, avatar: AvatarImage) -> Self {
        self.avatar = Some(avatar);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub notes: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub points: i32,
    pub child_id: Option<Uuid>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, points: i32) -> Self {
        Self {
            title: title.into(),
            notes: None,
            due_date: None,
            points,
            child_id: None,
        }
    }

    pub fn assigned_to(mut self, child_id: Uuid) -> Self {
        self.child_id = Some(child_id);
        self
    }

    pub fn due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Postgres `DATE` columns: written as `yyyy-MM-dd`, read from either that
/// form or a full timestamp.
pub mod date_only {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn format(date: NaiveDate) -> String {
        date.format(FORMAT).to_string()
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.date_naive()))
            .or_else(|| raw.get(..10).and_then(|head| NaiveDate::parse_from_str(head, FORMAT).ok()))
    }

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&format(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => parse(&text)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date `{text}`"))),
        }
    }
}
