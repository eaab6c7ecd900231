use crate::{Author, PostId, SubmoltRef, Time, Vote};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub author: Author,
    pub submolt: SubmoltRef,

    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub comment_count: u64,

    pub created_at: Time,

    #[serde(default)]
    pub user_vote: Option<Vote>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,

    /// Name of the community to post into
    pub submolt: String,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), crate::Error> {
        crate::validate_content(&self.title)?;
        crate::validate_content(&self.content)?;
        crate::validate_content(&self.submolt)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    #[default]
    Hot,
    New,
    Top,
}

impl SortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortType::Hot => "hot",
            SortType::New => "new",
            SortType::Top => "top",
        }
    }
}

impl std::str::FromStr for SortType {
    type Err = String;

    fn from_str(s: &str) -> Result<SortType, String> {
        match s {
            "hot" => Ok(SortType::Hot),
            "new" => Ok(SortType::New),
            "top" => Ok(SortType::Top),
            _ => Err(format!("unknown sort {s:?}, expected one of hot, new, top")),
        }
    }
}

/// Filters for a post listing. Unset fields are left out of the query string.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostQuery {
    pub submolt: Option<String>,
    pub author: Option<String>,
    pub sort: Option<SortType>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PostQuery {
    /// Returns `""` or `"?k=v&..."`, ready to append to `/posts`
    pub fn to_query_string(&self) -> String {
        let mut params = Vec::new();
        if let Some(s) = &self.submolt {
            params.push(format!("submolt={}", urlencoding::encode(s)));
        }
        if let Some(a) = &self.author {
            params.push(format!("author={}", urlencoding::encode(a)));
        }
        if let Some(s) = self.sort {
            params.push(format!("sort={}", s.as_str()));
        }
        // zero limit/offset are the server defaults, same as leaving them out
        if let Some(l) = self.limit.filter(|l| *l != 0) {
            params.push(format!("limit={l}"));
        }
        if let Some(o) = self.offset.filter(|o| *o != 0) {
            params.push(format!("offset={o}"));
        }
        match params.is_empty() {
            true => String::new(),
            false => format!("?{}", params.join("&")),
        }
    }
}
