use crate::{
    api::{self, CommentId},
    CommentForest, CommentNode,
};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// The comment section of a post: the whole forest is built up front, and root
/// threads are revealed one page at a time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentThreads {
    forest: CommentForest,
    page_size: usize,

    /// Number of root threads revealed so far, never more than there are
    shown: usize,
}

impl CommentThreads {
    pub fn new(forest: CommentForest) -> CommentThreads {
        CommentThreads::with_page_size(forest, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(forest: CommentForest, page_size: usize) -> CommentThreads {
        let page_size = page_size.max(1);
        let shown = page_size.min(forest.roots().len());
        CommentThreads {
            forest,
            page_size,
            shown,
        }
    }

    pub fn forest(&self) -> &CommentForest {
        &self.forest
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The root threads currently revealed, with all their replies
    pub fn visible(&self) -> &[CommentNode] {
        &self.forest.roots()[..self.shown]
    }

    pub fn has_more(&self) -> bool {
        self.shown < self.total_roots()
    }

    /// Reveal the next page of root threads. Returns how many were added.
    pub fn show_more(&mut self) -> usize {
        let before = self.shown;
        self.shown = (self.shown + self.page_size).min(self.total_roots());
        self.shown - before
    }

    pub fn total_roots(&self) -> usize {
        self.forest.roots().len()
    }

    pub fn total_comments(&self) -> usize {
        self.forest.total_count()
    }

    pub fn find(&self, id: &CommentId) -> Option<&CommentNode> {
        self.forest.find(id)
    }

    pub fn upvote(&mut self, id: &CommentId) -> bool {
        self.forest.upvote(id)
    }

    pub fn insert_reply(&mut self, parent_id: &CommentId, reply: api::Comment) -> bool {
        self.forest.insert_reply(parent_id, reply)
    }

    /// Add a top-level comment. It shows up right away unless some older
    /// threads are still hidden, in which case it waits for its page.
    pub fn push_root(&mut self, comment: api::Comment) {
        let all_shown = !self.has_more();
        self.forest.push_root(comment);
        if all_shown {
            self.shown += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comment::tests::comment;

    fn forest_of(roots: usize) -> CommentForest {
        let mut comments = Vec::new();
        for i in 0..roots {
            let id = format!("r{i}");
            comments.push(comment(&id, None, i as i64));
            comments.push(comment(&format!("{id}-reply"), Some(&id), 1000 + i as i64));
        }
        CommentForest::build(comments)
    }

    #[test]
    fn first_page() {
        let threads = CommentThreads::new(forest_of(45));
        assert_eq!(threads.visible().len(), DEFAULT_PAGE_SIZE);
        assert_eq!(threads.visible()[0].id().as_str(), "r0");
        assert_eq!(threads.visible()[0].replies().len(), 1);
        assert!(threads.has_more());
        assert_eq!(threads.total_roots(), 45);
        assert_eq!(threads.total_comments(), 90);
    }

    #[test]
    fn paging_through() {
        let mut threads = CommentThreads::new(forest_of(45));
        assert_eq!(threads.show_more(), 20);
        assert_eq!(threads.visible().len(), 40);
        assert_eq!(threads.show_more(), 5);
        assert_eq!(threads.visible().len(), 45);
        assert!(!threads.has_more());
        assert_eq!(threads.show_more(), 0);
        assert_eq!(threads.visible()[44].id().as_str(), "r44");
    }

    #[test]
    fn small_and_empty() {
        let threads = CommentThreads::new(forest_of(3));
        assert_eq!(threads.visible().len(), 3);
        assert!(!threads.has_more());

        let threads = CommentThreads::new(CommentForest::default());
        assert!(threads.visible().is_empty());
        assert!(!threads.has_more());
    }

    #[test]
    fn zero_page_size_is_one() {
        let mut threads = CommentThreads::with_page_size(forest_of(3), 0);
        assert_eq!(threads.visible().len(), 1);
        threads.show_more();
        assert_eq!(threads.visible().len(), 2);
    }

    #[test]
    fn mutations_keep_page() {
        let mut threads = CommentThreads::with_page_size(forest_of(5), 2);
        assert!(threads.upvote(&CommentId::from("r4-reply")));
        assert!(threads.insert_reply(&CommentId::from("r0"), comment("n", Some("r0"), 9999)));
        assert_eq!(threads.visible().len(), 2);
        assert_eq!(threads.find(&CommentId::from("r4-reply")).unwrap().comment().score, 1);
        assert_eq!(threads.visible()[0].replies().len(), 2);
    }

    #[test]
    fn new_root_shown_when_everything_is() {
        let mut threads = CommentThreads::with_page_size(forest_of(2), 5);
        threads.push_root(comment("new", None, 5000));
        assert_eq!(threads.visible().len(), 3);
        assert_eq!(threads.visible()[2].id().as_str(), "new");

        let mut threads = CommentThreads::with_page_size(forest_of(4), 2);
        threads.push_root(comment("new", None, 5000));
        assert_eq!(threads.visible().len(), 2);
        assert_eq!(threads.total_roots(), 5);
    }
}
