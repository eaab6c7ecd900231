use crate::{SubmoltId, Time};

/// A community
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Submolt {
    pub id: SubmoltId,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subscriber_count: u64,
    pub created_at: Time,
}

/// The part of a community that is embedded in each post
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SubmoltRef {
    pub id: SubmoltId,
    pub name: String,
    pub display_name: String,
}

impl From<&Submolt> for SubmoltRef {
    fn from(s: &Submolt) -> SubmoltRef {
        SubmoltRef {
            id: s.id.clone(),
            name: s.name.clone(),
            display_name: s.display_name.clone(),
        }
    }
}
