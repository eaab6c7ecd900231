use std::fmt::Display;

use crate::{
    api::{self, CommentId, PostId, Vote},
    transport::Transport,
    Client, CommentForest, CommentShape, CommentThreads, DEFAULT_PAGE_SIZE,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadedPost {
    pub post: api::Post,
    pub threads: CommentThreads,
}

/// Handed out when a load starts, and needed to apply its result
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadTicket {
    generation: u64,
    post_id: PostId,
}

impl LoadTicket {
    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }
}

/// What is shown of one post and its comments.
///
/// Loads are started with `navigate` and finished with `resolve`. Only the
/// result of the latest load is ever applied: answers that arrive after the
/// user went elsewhere are dropped.
#[derive(Clone, Debug)]
pub struct PostView {
    generation: u64,
    page_size: usize,
    loading: Option<PostId>,
    loaded: Option<LoadedPost>,
    last_error: Option<String>,
}

impl Default for PostView {
    fn default() -> PostView {
        PostView::new()
    }
}

impl PostView {
    pub fn new() -> PostView {
        PostView::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> PostView {
        PostView {
            generation: 0,
            page_size,
            loading: None,
            loaded: None,
            last_error: None,
        }
    }

    /// Start showing `post_id`. Whatever is displayed for another post goes
    /// away; a reload of the same post keeps it until the new data is in.
    pub fn navigate(&mut self, post_id: PostId) -> LoadTicket {
        self.generation += 1;
        if self.loaded.as_ref().map(|l| &l.post.id) != Some(&post_id) {
            self.loaded = None;
        }
        self.loading = Some(post_id.clone());
        self.last_error = None;
        LoadTicket {
            generation: self.generation,
            post_id,
        }
    }

    /// Stop showing anything. Loads still in flight will be discarded.
    pub fn leave(&mut self) {
        self.generation += 1;
        self.loading = None;
        self.loaded = None;
        self.last_error = None;
    }

    /// Apply the outcome of a load. Returns whether the view changed.
    ///
    /// On failure, what was displayed stays displayed and the error is kept
    /// for `last_error`.
    pub fn resolve<E: Display>(
        &mut self,
        ticket: LoadTicket,
        result: Result<api::PostDetail, E>,
    ) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(post_id = %ticket.post_id, "discarding stale post load");
            return false;
        }
        self.loading = None;
        match result {
            Ok(detail) => {
                let shape = CommentShape::from_flag(detail.nested, &detail.comments);
                let forest = CommentForest::build_with(detail.comments, shape);
                self.loaded = Some(LoadedPost {
                    post: detail.post,
                    threads: CommentThreads::with_page_size(forest, self.page_size),
                });
                true
            }
            Err(err) => {
                tracing::warn!(post_id = %ticket.post_id, "failed loading post: {err}");
                self.last_error = Some(err.to_string());
                false
            }
        }
    }

    /// Fetch and show `post_id`
    pub async fn load<T: Transport>(&mut self, client: &Client<T>, post_id: PostId) -> bool {
        let ticket = self.navigate(post_id);
        let res = client.post(ticket.post_id()).await;
        self.resolve(ticket, res)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn loaded(&self) -> Option<&LoadedPost> {
        self.loaded.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn show_more(&mut self) -> usize {
        match &mut self.loaded {
            Some(l) => l.threads.show_more(),
            None => 0,
        }
    }

    pub fn upvote_post(&mut self) -> bool {
        self.vote_post(Vote::Up, 1)
    }

    pub fn downvote_post(&mut self) -> bool {
        self.vote_post(Vote::Down, -1)
    }

    fn vote_post(&mut self, vote: Vote, delta: i64) -> bool {
        match &mut self.loaded {
            Some(l) => {
                l.post.score += delta;
                l.post.user_vote = Some(vote);
                true
            }
            None => false,
        }
    }

    pub fn upvote_comment(&mut self, id: &CommentId) -> bool {
        match &mut self.loaded {
            Some(l) => l.threads.upvote(id),
            None => false,
        }
    }

    /// Show a comment the server just accepted, as a new thread or as a reply
    /// depending on its `parent_id`. Comments made on another post are ignored.
    pub fn add_comment(&mut self, comment: api::Comment) -> bool {
        let loaded = match &mut self.loaded {
            Some(l) => l,
            None => return false,
        };
        if matches!(&comment.post_id, Some(p) if *p != loaded.post.id) {
            return false;
        }
        let added = match comment.parent_id.clone() {
            Some(parent) => loaded.threads.insert_reply(&parent, comment),
            None => {
                loaded.threads.push_root(comment);
                true
            }
        };
        if added {
            loaded.post.comment_count += 1;
        }
        added
    }
}
