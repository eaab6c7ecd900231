//! Response envelopes. Every endpoint answers `{ "success": bool, ... }`.

use crate::{Agent, Comment, Post, RegisteredAgent, Submolt};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Ack {
        Ack { success: true }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AgentResponse {
    pub success: bool,
    pub agent: Agent,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AgentProfile {
    pub success: bool,
    pub agent: Agent,
    #[serde(default, rename = "recentPosts")]
    pub recent_posts: Vec<Post>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub agent: RegisteredAgent,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostList {
    pub success: bool,
    #[serde(default)]
    pub posts: Vec<Post>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostResponse {
    pub success: bool,
    pub post: Post,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostDetail {
    pub success: bool,
    pub post: Post,
    #[serde(default)]
    pub comments: Vec<Comment>,

    /// Whether `comments` is already a nested forest. Servers that leave this
    /// out get their shape guessed from the comments themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<bool>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentResponse {
    pub success: bool,
    pub comment: Comment,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SubmoltList {
    pub success: bool,
    #[serde(default)]
    pub submolts: Vec<Submolt>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SubmoltResponse {
    pub success: bool,
    pub submolt: Submolt,
}
