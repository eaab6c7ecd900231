use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Duration;
use moltbook_api::{
    self as api, Agent, AgentId, Author, CommentId, Error, NewAgent, NewComment, NewPost, PostId,
    PostQuery, SortType, Submolt, SubmoltId, SubmoltRef, Time, Vote,
};
use uuid::Uuid;

mod http;
pub use http::{router, spawn, Shared};

const DEFAULT_LIMIT: usize = 25;

/// The whole forum, in memory
pub struct MockServer {
    agents: BTreeMap<AgentId, MockAgent>,
    submolts: BTreeMap<String, MockSubmolt>,
    posts: Vec<MockPost>,
    comments: Vec<MockComment>,

    /// Answer comments already nested instead of flat
    nested: bool,

    /// Number of upcoming requests to fail with a 503
    failures: u32,
    requests_seen: u64,

    clock: Time,
    next_id: u64,
}

#[derive(Debug)]
struct MockAgent {
    agent: Agent,
    api_key: String,
}

#[derive(Debug)]
struct MockSubmolt {
    submolt: Submolt,
    subscribers: HashSet<AgentId>,
}

#[derive(Debug)]
struct MockPost {
    post: api::Post,
    votes: HashMap<AgentId, Vote>,
}

#[derive(Debug)]
struct MockComment {
    comment: api::Comment,
    votes: HashMap<AgentId, Vote>,
}

fn tally(votes: &HashMap<AgentId, Vote>) -> (i64, i64) {
    let up = votes.values().filter(|v| **v == Vote::Up).count() as i64;
    let down = votes.len() as i64 - up;
    (up, down)
}

impl MockServer {
    pub fn new(start: Time) -> MockServer {
        MockServer {
            agents: BTreeMap::new(),
            submolts: BTreeMap::new(),
            posts: Vec::new(),
            comments: Vec::new(),
            nested: false,
            failures: 0,
            requests_seen: 0,
            clock: start,
            next_id: 0,
        }
    }

    /// Every creation happens one second after the previous one
    fn tick(&mut self) -> Time {
        self.clock = self.clock + Duration::seconds(1);
        self.clock
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    pub fn test_set_nested(&mut self, nested: bool) {
        self.nested = nested;
    }

    pub fn test_fail_next(&mut self, n: u32) {
        self.failures = n;
    }

    pub fn test_requests_seen(&self) -> u64 {
        self.requests_seen
    }

    /// Counts a request, and returns whether it should be failed
    pub(crate) fn take_failure(&mut self) -> bool {
        self.requests_seen += 1;
        match self.failures {
            0 => false,
            _ => {
                self.failures -= 1;
                true
            }
        }
    }

    pub fn admin_create_submolt(&mut self, name: &str, display_name: &str, description: &str) {
        let created_at = self.tick();
        let id = SubmoltId(self.fresh_id("s"));
        self.submolts.insert(
            String::from(name),
            MockSubmolt {
                submolt: Submolt {
                    id,
                    name: String::from(name),
                    display_name: String::from(display_name),
                    description: String::from(description),
                    subscriber_count: 0,
                    created_at,
                },
                subscribers: HashSet::new(),
            },
        );
    }

    fn resolve(&self, key: Option<&str>) -> Result<&MockAgent, Error> {
        let key = key.ok_or(Error::Unauthorized)?;
        self.agents
            .values()
            .find(|a| a.api_key == key)
            .ok_or(Error::Unauthorized)
    }

    fn author(&self, key: Option<&str>) -> Result<(AgentId, Author), Error> {
        let a = &self.resolve(key)?.agent;
        Ok((
            a.id.clone(),
            Author {
                id: a.id.clone(),
                name: a.name.clone(),
            },
        ))
    }

    fn viewer(&self, key: Option<&str>) -> Option<AgentId> {
        self.resolve(key).ok().map(|a| a.agent.id.clone())
    }

    pub fn register(&mut self, new: NewAgent) -> Result<api::RegisterResponse, Error> {
        new.validate()?;
        if self.agents.values().any(|a| a.agent.name == new.name) {
            return Err(Error::NameAlreadyUsed(new.name));
        }
        let id = AgentId(self.fresh_id("agent"));
        let api_key = format!("moltbook_sk_{}", Uuid::new_v4().simple());
        let created_at = self.tick();
        self.agents.insert(
            id.clone(),
            MockAgent {
                agent: Agent {
                    id,
                    name: new.name.clone(),
                    description: new.description,
                    karma: 0,
                    is_claimed: false,
                    created_at: Some(created_at),
                    last_active: None,
                    is_active: Some(true),
                    follower_count: Some(0),
                    following_count: Some(0),
                    avatar_url: None,
                    owner: None,
                    stats: None,
                },
                api_key: api_key.clone(),
            },
        );
        Ok(api::RegisterResponse {
            success: true,
            agent: api::RegisteredAgent {
                name: new.name,
                api_key,
                claim_url: None,
                verification_code: None,
            },
            message: String::from("Welcome to moltbook!"),
        })
    }

    /// Register `name` and return its api key
    pub fn test_add_agent(&mut self, name: &str) -> String {
        self.register(NewAgent {
            name: String::from(name),
            description: None,
        })
        .unwrap_or_else(|e| panic!("registering {name}: {e}"))
        .agent
        .api_key
    }

    fn agent_with_stats(&self, id: &AgentId) -> Option<Agent> {
        let mut agent = self.agents.get(id)?.agent.clone();
        agent.stats = Some(api::AgentStats {
            posts: self.posts.iter().filter(|p| p.post.author.id == *id).count() as u64,
            comments: self
                .comments
                .iter()
                .filter(|c| c.comment.author.as_ref().map(|a| &a.id) == Some(id))
                .count() as u64,
            subscriptions: self
                .submolts
                .values()
                .filter(|s| s.subscribers.contains(id))
                .count() as u64,
        });
        Some(agent)
    }

    pub fn me(&self, key: Option<&str>) -> Result<api::AgentResponse, Error> {
        let id = self.resolve(key)?.agent.id.clone();
        Ok(api::AgentResponse {
            success: true,
            agent: self.agent_with_stats(&id).ok_or(Error::Unauthorized)?,
        })
    }

    pub fn profile(&self, key: Option<&str>, name: &str) -> Result<api::AgentProfile, Error> {
        let id = self
            .agents
            .values()
            .find(|a| a.agent.name == name)
            .map(|a| a.agent.id.clone())
            .ok_or(Error::NotFound)?;
        let mut recent_posts = self.posts_view(key, |p| p.author.id == id);
        recent_posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_posts.truncate(10);
        Ok(api::AgentProfile {
            success: true,
            agent: self.agent_with_stats(&id).ok_or(Error::NotFound)?,
            recent_posts,
        })
    }

    fn posts_view(
        &self,
        key: Option<&str>,
        filter: impl Fn(&api::Post) -> bool,
    ) -> Vec<api::Post> {
        let viewer = self.viewer(key);
        self.posts
            .iter()
            .filter(|p| filter(&p.post))
            .map(|p| {
                let mut post = p.post.clone();
                post.user_vote = viewer.as_ref().and_then(|v| p.votes.get(v)).copied();
                post
            })
            .collect()
    }

    pub fn posts(&self, key: Option<&str>, q: &PostQuery) -> Result<api::PostList, Error> {
        let mut posts = self.posts_view(key, |p| {
            q.submolt.as_ref().map_or(true, |s| p.submolt.name == *s)
                && q.author.as_ref().map_or(true, |a| p.author.name == *a)
        });
        match q.sort.unwrap_or_default() {
            SortType::New => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortType::Top => posts.sort_by(|a, b| b.score.cmp(&a.score)),
            SortType::Hot => posts.sort_by(|a, b| {
                (b.score + b.comment_count as i64)
                    .cmp(&(a.score + a.comment_count as i64))
                    .then(b.created_at.cmp(&a.created_at))
            }),
        }
        let offset = q.offset.unwrap_or(0) as usize;
        let limit = q.limit.map_or(DEFAULT_LIMIT, |l| l as usize);
        Ok(api::PostList {
            success: true,
            posts: posts.into_iter().skip(offset).take(limit).collect(),
        })
    }

    fn comment_view(&self, c: &MockComment, viewer: &Option<AgentId>) -> api::Comment {
        let mut comment = c.comment.clone();
        comment.user_vote = viewer.as_ref().and_then(|v| c.votes.get(v)).copied();
        comment
    }

    fn nest(&self, parent: &CommentId, all: &[api::Comment]) -> Vec<api::Comment> {
        all.iter()
            .filter(|c| c.parent_id.as_ref() == Some(parent))
            .map(|c| {
                let mut c = c.clone();
                c.replies = self.nest(&c.id, all);
                c
            })
            .collect()
    }

    pub fn post(&self, key: Option<&str>, id: &PostId) -> Result<api::PostDetail, Error> {
        let post = self
            .posts_view(key, |p| p.id == *id)
            .pop()
            .ok_or(Error::NotFound)?;
        let viewer = self.viewer(key);
        let flat = self
            .comments
            .iter()
            .filter(|c| c.comment.post_id.as_ref() == Some(id))
            .map(|c| self.comment_view(c, &viewer))
            .collect::<Vec<_>>();
        let comments = match self.nested {
            false => flat,
            true => flat
                .iter()
                .filter(|c| c.parent_id.is_none())
                .map(|c| {
                    let mut c = c.clone();
                    c.replies = self.nest(&c.id, &flat);
                    c
                })
                .collect(),
        };
        Ok(api::PostDetail {
            success: true,
            post,
            comments,
            nested: Some(self.nested),
        })
    }

    pub fn create_post(
        &mut self,
        key: Option<&str>,
        new: NewPost,
    ) -> Result<api::PostResponse, Error> {
        new.validate()?;
        let (_, author) = self.author(key)?;
        let submolt = SubmoltRef::from(
            &self
                .submolts
                .get(&new.submolt)
                .ok_or(Error::NotFound)?
                .submolt,
        );
        let post = api::Post {
            id: PostId(self.fresh_id("p")),
            title: new.title,
            content: new.content,
            author,
            submolt,
            upvotes: 0,
            downvotes: 0,
            score: 0,
            comment_count: 0,
            created_at: self.tick(),
            user_vote: None,
        };
        self.posts.push(MockPost {
            post: post.clone(),
            votes: HashMap::new(),
        });
        Ok(api::PostResponse {
            success: true,
            post,
        })
    }

    pub fn delete_post(&mut self, key: Option<&str>, id: &PostId) -> Result<api::Ack, Error> {
        let (me, _) = self.author(key)?;
        let idx = self
            .posts
            .iter()
            .position(|p| p.post.id == *id)
            .ok_or(Error::NotFound)?;
        if self.posts[idx].post.author.id != me {
            return Err(Error::Unauthorized);
        }
        self.posts.remove(idx);
        self.comments
            .retain(|c| c.comment.post_id.as_ref() != Some(id));
        Ok(api::Ack::ok())
    }

    pub fn vote_post(
        &mut self,
        key: Option<&str>,
        id: &PostId,
        vote: Vote,
    ) -> Result<api::Ack, Error> {
        let (me, _) = self.author(key)?;
        let p = self
            .posts
            .iter_mut()
            .find(|p| p.post.id == *id)
            .ok_or(Error::NotFound)?;
        p.votes.insert(me, vote);
        let (up, down) = tally(&p.votes);
        p.post.upvotes = up;
        p.post.downvotes = down;
        p.post.score = up - down;
        Ok(api::Ack::ok())
    }

    pub fn create_comment(
        &mut self,
        key: Option<&str>,
        post_id: &PostId,
        new: NewComment,
    ) -> Result<api::CommentResponse, Error> {
        new.validate()?;
        let (_, author) = self.author(key)?;
        if !self.posts.iter().any(|p| p.post.id == *post_id) {
            return Err(Error::NotFound);
        }
        if let Some(parent) = &new.parent_id {
            let same_post = self.comments.iter().any(|c| {
                c.comment.id == *parent && c.comment.post_id.as_ref() == Some(post_id)
            });
            if !same_post {
                return Err(Error::NotFound);
            }
        }
        let comment = api::Comment {
            id: CommentId(self.fresh_id("c")),
            content: new.content,
            author: Some(author),
            post_id: Some(post_id.clone()),
            parent_id: new.parent_id,
            upvotes: 0,
            downvotes: 0,
            score: 0,
            created_at: self.tick(),
            user_vote: None,
            replies: Vec::new(),
        };
        self.comments.push(MockComment {
            comment: comment.clone(),
            votes: HashMap::new(),
        });
        if let Some(p) = self.posts.iter_mut().find(|p| p.post.id == *post_id) {
            p.post.comment_count += 1;
        }
        Ok(api::CommentResponse {
            success: true,
            comment,
        })
    }

    pub fn upvote_comment(
        &mut self,
        key: Option<&str>,
        id: &CommentId,
    ) -> Result<api::Ack, Error> {
        let (me, _) = self.author(key)?;
        let c = self
            .comments
            .iter_mut()
            .find(|c| c.comment.id == *id)
            .ok_or(Error::NotFound)?;
        c.votes.insert(me, Vote::Up);
        let (up, down) = tally(&c.votes);
        c.comment.upvotes = up;
        c.comment.downvotes = down;
        c.comment.score = up - down;
        Ok(api::Ack::ok())
    }

    pub fn submolts(&self) -> api::SubmoltList {
        api::SubmoltList {
            success: true,
            submolts: self.submolts.values().map(|s| s.submolt.clone()).collect(),
        }
    }

    pub fn submolt(&self, name: &str) -> Result<api::SubmoltResponse, Error> {
        let s = self.submolts.get(name).ok_or(Error::NotFound)?;
        Ok(api::SubmoltResponse {
            success: true,
            submolt: s.submolt.clone(),
        })
    }

    pub fn set_subscribed(
        &mut self,
        key: Option<&str>,
        name: &str,
        subscribed: bool,
    ) -> Result<api::Ack, Error> {
        let (me, _) = self.author(key)?;
        let s = self.submolts.get_mut(name).ok_or(Error::NotFound)?;
        match subscribed {
            true => s.subscribers.insert(me),
            false => s.subscribers.remove(&me),
        };
        s.submolt.subscriber_count = s.subscribers.len() as u64;
        Ok(api::Ack::ok())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn server() -> (MockServer, String) {
        let mut s = MockServer::new(chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        s.admin_create_submolt("general", "General", "anything goes");
        let key = s.test_add_agent("molty");
        (s, key)
    }

    fn new_post(submolt: &str) -> NewPost {
        NewPost {
            title: String::from("hello"),
            content: String::from("world"),
            submolt: String::from(submolt),
        }
    }

    fn reply(content: &str, parent: Option<&CommentId>) -> NewComment {
        NewComment {
            content: String::from(content),
            parent_id: parent.cloned(),
        }
    }

    #[test]
    fn auth_required() {
        let (mut s, _) = server();
        assert_eq!(s.me(None).unwrap_err(), Error::Unauthorized);
        assert_eq!(s.me(Some("bogus")).unwrap_err(), Error::Unauthorized);
        assert_eq!(
            s.create_post(None, new_post("general")).unwrap_err(),
            Error::Unauthorized
        );
    }

    #[test]
    fn duplicate_names() {
        let (mut s, _) = server();
        assert_eq!(
            s.register(NewAgent {
                name: String::from("molty"),
                description: None,
            })
            .unwrap_err(),
            Error::NameAlreadyUsed(String::from("molty"))
        );
    }

    #[test]
    fn comments_flat_and_nested() {
        let (mut s, key) = server();
        let key = Some(key.as_str());
        let post = s.create_post(key, new_post("general")).unwrap().post;
        let a = s.create_comment(key, &post.id, reply("a", None)).unwrap().comment;
        let b = s
            .create_comment(key, &post.id, reply("b", Some(&a.id)))
            .unwrap()
            .comment;
        s.create_comment(key, &post.id, reply("c", Some(&b.id)))
            .unwrap();

        let flat = s.post(key, &post.id).unwrap();
        assert_eq!(flat.nested, Some(false));
        assert_eq!(flat.comments.len(), 3);
        assert_eq!(flat.post.comment_count, 3);

        s.test_set_nested(true);
        let nested = s.post(key, &post.id).unwrap();
        assert_eq!(nested.comments.len(), 1);
        assert_eq!(nested.comments[0].replies[0].replies[0].content, "c");
    }

    #[test]
    fn reply_parent_must_be_on_post() {
        let (mut s, key) = server();
        let key = Some(key.as_str());
        let p1 = s.create_post(key, new_post("general")).unwrap().post;
        let p2 = s.create_post(key, new_post("general")).unwrap().post;
        let a = s.create_comment(key, &p1.id, reply("a", None)).unwrap().comment;
        assert_eq!(
            s.create_comment(key, &p2.id, reply("b", Some(&a.id)))
                .unwrap_err(),
            Error::NotFound
        );
    }

    #[test]
    fn votes_are_per_agent() {
        let (mut s, k1) = server();
        let k2 = s.test_add_agent("other");
        let post = s.create_post(Some(&k1), new_post("general")).unwrap().post;
        s.vote_post(Some(&k1), &post.id, Vote::Up).unwrap();
        s.vote_post(Some(&k1), &post.id, Vote::Up).unwrap();
        s.vote_post(Some(&k2), &post.id, Vote::Down).unwrap();
        let seen = s.post(Some(&k1), &post.id).unwrap().post;
        assert_eq!((seen.upvotes, seen.downvotes, seen.score), (1, 1, 0));
        assert_eq!(seen.user_vote, Some(Vote::Up));
        assert_eq!(s.post(Some(&k2), &post.id).unwrap().post.user_vote, Some(Vote::Down));
        assert_eq!(s.post(None, &post.id).unwrap().post.user_vote, None);
    }

    #[test]
    fn listing() {
        let (mut s, key) = server();
        s.admin_create_submolt("rust", "Rust", "crabs");
        let key = Some(key.as_str());
        let first = s.create_post(key, new_post("general")).unwrap().post;
        let second = s.create_post(key, new_post("rust")).unwrap().post;
        s.vote_post(key, &first.id, Vote::Up).unwrap();

        let ids = |q: PostQuery| -> Vec<PostId> {
            s.posts(None, &q).unwrap().posts.into_iter().map(|p| p.id).collect()
        };
        assert_eq!(
            ids(PostQuery {
                sort: Some(SortType::New),
                ..PostQuery::default()
            }),
            vec![second.id.clone(), first.id.clone()]
        );
        assert_eq!(
            ids(PostQuery {
                sort: Some(SortType::Top),
                ..PostQuery::default()
            }),
            vec![first.id.clone(), second.id.clone()]
        );
        assert_eq!(
            ids(PostQuery {
                submolt: Some(String::from("rust")),
                ..PostQuery::default()
            }),
            vec![second.id.clone()]
        );
        assert_eq!(
            ids(PostQuery {
                sort: Some(SortType::New),
                offset: Some(1),
                limit: Some(5),
                ..PostQuery::default()
            }),
            vec![first.id]
        );
    }

    #[test]
    fn subscriptions() {
        let (mut s, key) = server();
        s.set_subscribed(Some(&key), "general", true).unwrap();
        s.set_subscribed(Some(&key), "general", true).unwrap();
        assert_eq!(s.submolt("general").unwrap().submolt.subscriber_count, 1);
        assert_eq!(s.me(Some(&key)).unwrap().agent.stats.unwrap().subscriptions, 1);
        s.set_subscribed(Some(&key), "general", false).unwrap();
        assert_eq!(s.submolt("general").unwrap().submolt.subscriber_count, 0);
        assert_eq!(
            s.set_subscribed(Some(&key), "nowhere", true).unwrap_err(),
            Error::NotFound
        );
    }
}
