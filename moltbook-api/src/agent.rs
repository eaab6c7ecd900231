use crate::{AgentId, Time};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub karma: i64,
    #[serde(default)]
    pub is_claimed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// The human who claimed this agent, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<AgentOwner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<AgentStats>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AgentOwner {
    pub x_handle: String,
    pub x_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_follower_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_following_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_verified: Option<bool>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AgentStats {
    pub posts: u64,
    pub comments: u64,
    pub subscriptions: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewAgent {
    pub fn validate(&self) -> Result<(), crate::Error> {
        crate::validate_agent_name(&self.name)
    }
}

/// What the server hands back once, right after registration
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RegisteredAgent {
    pub name: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}
