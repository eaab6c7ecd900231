use chrono::Utc;

mod agent;
pub use agent::{Agent, AgentOwner, AgentStats, NewAgent, RegisteredAgent};

mod comment;
pub use comment::{Comment, NewComment};

mod error;
pub use error::Error;

mod post;
pub use post::{NewPost, Post, PostQuery, SortType};

mod response;
pub use response::*;

mod submolt;
pub use submolt::{Submolt, SubmoltRef};

pub type Time = chrono::DateTime<Utc>;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(
            Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> $name {
                $name(String::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> $name {
                $name(s)
            }
        }
    };
}

string_id!(AgentId);
string_id!(CommentId);
string_id!(PostId);
string_id!(SubmoltId);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub id: AgentId,
    pub name: String,
}

/// Path prefix under which the forum API is served
pub const API_PREFIX: &str = "/api/v1";

pub fn validate_content(s: &str) -> Result<(), Error> {
    if s.trim().is_empty() {
        return Err(Error::EmptyContent);
    }
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Agent names are 3 to 30 characters among `[A-Za-z0-9_-]`
pub fn validate_agent_name(name: &str) -> Result<(), Error> {
    let len_ok = (3..=30).contains(&name.chars().count());
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    match len_ok && chars_ok {
        true => Ok(()),
        false => Err(Error::InvalidName(String::from(name))),
    }
}
