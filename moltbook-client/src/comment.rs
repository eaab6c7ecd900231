use std::{collections::HashMap, sync::Arc};

use crate::api::{self, CommentId, Vote};

/// How the comments of a post were laid out by the server
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommentShape {
    /// Top-level comments already carry their `replies`
    Nested,

    /// Every comment is listed once, linked through `parent_id`
    Flat,
}

impl CommentShape {
    /// Guess the shape from the comments alone: any non-empty `replies` means the
    /// server nested them. A nested thread in which nobody replied looks flat,
    /// which is harmless as long as every listed comment is then a root.
    pub fn detect(comments: &[api::Comment]) -> CommentShape {
        match comments.iter().any(|c| !c.replies.is_empty()) {
            true => CommentShape::Nested,
            false => CommentShape::Flat,
        }
    }

    /// Use the server's explicit flag when it sent one
    pub fn from_flag(nested: Option<bool>, comments: &[api::Comment]) -> CommentShape {
        match nested {
            Some(true) => CommentShape::Nested,
            Some(false) => CommentShape::Flat,
            None => CommentShape::detect(comments),
        }
    }
}

/// A comment and its replies.
///
/// Both halves sit behind an `Arc`: cloning a node is cheap, and updating one
/// only copies what lies on the path from the root to the updated comment.
///
/// Reply chains can be arbitrarily deep, so nothing here recurses: walking,
/// comparing and dropping nodes all use explicit stacks.
#[derive(Clone, Debug)]
pub struct CommentNode {
    /// Always has an empty `replies`, children live in `replies` below
    comment: Arc<api::Comment>,
    replies: Arc<Vec<CommentNode>>,
}

impl CommentNode {
    /// Turn an already-nested comment into a node, keeping its replies as-is
    pub fn nested(comment: api::Comment) -> CommentNode {
        let open = |mut comment: api::Comment| {
            let pending = std::mem::take(&mut comment.replies).into_iter();
            Building::new(comment, pending)
        };
        let mut current = open(comment);
        let mut ancestors = Vec::new();
        loop {
            match current.pending.next() {
                Some(child) => ancestors.push(std::mem::replace(&mut current, open(child))),
                None => {
                    let node = current.finish();
                    match ancestors.pop() {
                        Some(parent) => {
                            current = parent;
                            current.replies.push(node);
                        }
                        None => return node,
                    }
                }
            }
        }
    }

    /// A node without replies, whatever `comment.replies` held
    pub fn leaf(comment: api::Comment) -> CommentNode {
        Building::new(comment, ()).finish()
    }

    pub fn id(&self) -> &CommentId {
        &self.comment.id
    }

    pub fn comment(&self) -> &api::Comment {
        &self.comment
    }

    pub fn replies(&self) -> &[CommentNode] {
        &self.replies
    }

    /// Number of comments in this subtree, this one included
    pub fn count(&self) -> usize {
        1 + count_all(&self.replies)
    }

    /// Back to the wire representation, replies nested inside
    pub fn to_api(&self) -> api::Comment {
        fn open(n: &CommentNode) -> (api::Comment, std::slice::Iter<'_, CommentNode>) {
            let mut comment = api::Comment::clone(&n.comment);
            comment.replies.clear();
            (comment, n.replies.iter())
        }
        let mut current = open(self);
        let mut ancestors = Vec::new();
        loop {
            match current.1.next() {
                Some(child) => ancestors.push(std::mem::replace(&mut current, open(child))),
                None => {
                    let (done, _) = current;
                    match ancestors.pop() {
                        Some(mut parent) => {
                            parent.0.replies.push(done);
                            current = parent;
                        }
                        None => return done,
                    }
                }
            }
        }
    }
}

impl PartialEq for CommentNode {
    fn eq(&self, other: &CommentNode) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if !Arc::ptr_eq(&a.comment, &b.comment) && a.comment != b.comment {
                return false;
            }
            if Arc::ptr_eq(&a.replies, &b.replies) {
                continue;
            }
            if a.replies.len() != b.replies.len() {
                return false;
            }
            pending.extend(a.replies.iter().zip(b.replies.iter()));
        }
        true
    }
}

impl Eq for CommentNode {}

impl Drop for CommentNode {
    fn drop(&mut self) {
        // replies only we hold are moved out and dropped one by one, shared
        // ones just lose a reference
        let mut pending = Vec::new();
        take_unshared(&mut self.replies, &mut pending);
        while let Some(mut node) = pending.pop() {
            take_unshared(&mut node.replies, &mut pending);
        }
    }
}

fn take_unshared(replies: &mut Arc<Vec<CommentNode>>, into: &mut Vec<CommentNode>) {
    if let Some(replies) = Arc::get_mut(replies) {
        into.append(replies);
    }
}

/// A node whose replies are still being assembled
struct Building<I> {
    comment: api::Comment,
    pending: I,
    replies: Vec<CommentNode>,
}

impl<I> Building<I> {
    fn new(comment: api::Comment, pending: I) -> Building<I> {
        Building {
            comment,
            pending,
            replies: Vec::new(),
        }
    }

    fn finish(mut self) -> CommentNode {
        self.comment.replies.clear();
        CommentNode {
            comment: Arc::new(self.comment),
            replies: Arc::new(self.replies),
        }
    }
}

/// The comments of one post, as an ordered list of threads.
///
/// Root threads are ordered by creation date, oldest first. Replies keep the
/// order in which they were listed by the server, then the order in which they
/// were added locally.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentForest {
    roots: Arc<Vec<CommentNode>>,
}

impl CommentForest {
    pub fn build(comments: Vec<api::Comment>) -> CommentForest {
        let shape = CommentShape::detect(&comments);
        CommentForest::build_with(comments, shape)
    }

    pub fn build_with(comments: Vec<api::Comment>, shape: CommentShape) -> CommentForest {
        let mut roots = match shape {
            CommentShape::Nested => comments
                .into_iter()
                .filter(|c| c.parent_id.is_none())
                .map(CommentNode::nested)
                .collect(),
            CommentShape::Flat => link_flat(comments),
        };
        // stable, so roots created at the same time keep the server's order
        roots.sort_by(|a, b| a.comment.created_at.cmp(&b.comment.created_at));
        CommentForest {
            roots: Arc::new(roots),
        }
    }

    pub fn roots(&self) -> &[CommentNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of comments at every depth
    pub fn total_count(&self) -> usize {
        count_all(&self.roots)
    }

    pub fn find(&self, id: &CommentId) -> Option<&CommentNode> {
        let path = find_path(&self.roots, id)?;
        let (last, ancestors) = path.split_last()?;
        let mut nodes: &[CommentNode] = &self.roots;
        for &i in ancestors {
            nodes = &nodes[i].replies;
        }
        nodes.get(*last)
    }

    /// Count one more upvote on comment `id`, and remember it was ours.
    ///
    /// Returns `false`, leaving the forest untouched, if there is no such comment.
    pub fn upvote(&mut self, id: &CommentId) -> bool {
        self.update(id, |node| {
            let c = Arc::make_mut(&mut node.comment);
            c.score += 1;
            c.user_vote = Some(Vote::Up);
        })
    }

    /// Append `reply` to the replies of comment `parent_id`.
    ///
    /// Returns `false`, leaving the forest untouched, if there is no such comment.
    pub fn insert_reply(&mut self, parent_id: &CommentId, reply: api::Comment) -> bool {
        self.update(parent_id, move |node| {
            Arc::make_mut(&mut node.replies).push(CommentNode::leaf(reply))
        })
    }

    /// Append a new top-level comment. Being the newest, it goes last.
    pub fn push_root(&mut self, comment: api::Comment) {
        Arc::make_mut(&mut self.roots).push(CommentNode::leaf(comment))
    }

    pub fn to_api(&self) -> Vec<api::Comment> {
        self.roots.iter().map(CommentNode::to_api).collect()
    }

    fn update(&mut self, id: &CommentId, f: impl FnOnce(&mut CommentNode)) -> bool {
        let path = match find_path(&self.roots, id) {
            Some(path) => path,
            None => return false,
        };
        let (last, ancestors) = match path.split_last() {
            Some(p) => p,
            None => return false,
        };
        let mut nodes = &mut self.roots;
        for &i in ancestors {
            nodes = &mut Arc::make_mut(nodes)[i].replies;
        }
        f(&mut Arc::make_mut(nodes)[*last]);
        true
    }
}

/// Depth-first search, returns the indices leading to `id`
fn find_path(roots: &[CommentNode], id: &CommentId) -> Option<Vec<usize>> {
    // path[d] indexes into levels[d]
    let mut levels = vec![roots];
    let mut path = vec![0];
    loop {
        let depth = path.len() - 1;
        let level: &[CommentNode] = levels[depth];
        match level.get(path[depth]) {
            Some(n) if n.comment.id == *id => return Some(path),
            Some(n) => {
                levels.push(n.replies());
                path.push(0);
            }
            None => {
                levels.pop();
                path.pop();
                *path.last_mut()? += 1;
            }
        }
    }
}

fn count_all(nodes: &[CommentNode]) -> usize {
    let mut total = 0;
    let mut pending = vec![nodes];
    while let Some(level) = pending.pop() {
        total += level.len();
        pending.extend(level.iter().map(CommentNode::replies));
    }
    total
}

fn link_flat(comments: Vec<api::Comment>) -> Vec<CommentNode> {
    let num_comments = comments.len();

    // first occurrence wins for duplicated ids
    let mut index = HashMap::with_capacity(num_comments);
    for (i, c) in comments.iter().enumerate() {
        index.entry(c.id.clone()).or_insert(i);
    }

    let mut children = vec![Vec::new(); num_comments];
    let mut roots = Vec::new();
    for (i, c) in comments.iter().enumerate() {
        match c.parent_id.as_ref().and_then(|p| index.get(p)) {
            Some(&parent) => children[parent].push(i),
            // also a root if the parent is not part of this response
            None => roots.push(i),
        }
    }

    let mut slots = comments.into_iter().map(Some).collect::<Vec<_>>();
    let res = roots
        .into_iter()
        .filter_map(|i| assemble(i, &mut slots, &children))
        .collect::<Vec<_>>();

    let linked = count_all(&res);
    if linked != num_comments {
        tracing::warn!(
            num_comments,
            linked,
            "some comments are only reachable through a parent_id cycle, dropping them"
        );
    }
    res
}

/// Build the subtree under comment `root`, depth-first without recursion
fn assemble(
    root: usize,
    slots: &mut [Option<api::Comment>],
    children: &[Vec<usize>],
) -> Option<CommentNode> {
    let mut current = Building::new(slots[root].take()?, children[root].iter());
    let mut ancestors = Vec::new();
    loop {
        match current.pending.next() {
            Some(&c) => {
                // taking the slot means a node is never assembled twice
                if let Some(comment) = slots[c].take() {
                    let child = Building::new(comment, children[c].iter());
                    ancestors.push(std::mem::replace(&mut current, child));
                }
            }
            None => {
                let node = current.finish();
                match ancestors.pop() {
                    Some(parent) => {
                        current = parent;
                        current.replies.push(node);
                    }
                    None => return Some(node),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::api::Time;

    pub fn at(secs: i64) -> Time {
        chrono::Utc.timestamp_opt(secs, 0).unwrap()
    }

    pub fn comment(id: &str, parent: Option<&str>, secs: i64) -> api::Comment {
        api::Comment {
            id: CommentId::from(id),
            content: format!("comment {id}"),
            author: None,
            post_id: None,
            parent_id: parent.map(CommentId::from),
            upvotes: 0,
            downvotes: 0,
            score: 0,
            created_at: at(secs),
            user_vote: None,
            replies: Vec::new(),
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id().as_str()).collect()
    }

    fn node<'a>(forest: &'a CommentForest, id: &str) -> &'a CommentNode {
        forest
            .find(&CommentId::from(id))
            .unwrap_or_else(|| panic!("comment {id} is not in the forest"))
    }

    #[test]
    fn builds_example_thread() {
        let forest = CommentForest::build(vec![
            comment("a", None, 2),
            comment("b", Some("a"), 3),
            comment("c", None, 1),
        ]);
        assert_eq!(ids(forest.roots()), vec!["c", "a"]);
        assert_eq!(ids(node(&forest, "a").replies()), vec!["b"]);
        assert!(node(&forest, "c").replies().is_empty());
    }

    #[test]
    fn every_comment_lands_under_its_parent() {
        let input = vec![
            comment("r1", None, 10),
            comment("x", Some("r2"), 14),
            comment("r2", None, 11),
            comment("y", Some("x"), 15),
            comment("z", Some("r1"), 12),
            comment("w", Some("x"), 13),
        ];
        let forest = CommentForest::build(input.clone());
        assert_eq!(forest.total_count(), input.len());
        for c in &input {
            if let Some(parent) = &c.parent_id {
                let parent = forest.find(parent).unwrap();
                assert!(parent.replies().iter().any(|r| r.id() == &c.id));
            }
        }
        // siblings keep input order, not creation order
        assert_eq!(ids(node(&forest, "x").replies()), vec!["y", "w"]);
    }

    #[test]
    fn orphans_become_roots() {
        let forest = CommentForest::build(vec![
            comment("a", None, 1),
            comment("lost", Some("deleted"), 2),
        ]);
        assert_eq!(ids(forest.roots()), vec!["a", "lost"]);
        assert_eq!(
            forest.roots()[1].comment().parent_id,
            Some(CommentId::from("deleted"))
        );
    }

    #[test]
    fn roots_sorted_oldest_first() {
        let forest = CommentForest::build(vec![
            comment("t3", None, 3),
            comment("t1", None, 1),
            comment("t2", None, 2),
        ]);
        assert_eq!(ids(forest.roots()), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn nested_input_passes_through() {
        let mut a = comment("a", None, 1);
        let mut b = comment("b", Some("a"), 2);
        b.replies.push(comment("d", Some("b"), 4));
        a.replies.push(b.clone());
        let c = comment("c", None, 3);
        let input = vec![a.clone(), b, c.clone()];

        assert_eq!(CommentShape::detect(&input), CommentShape::Nested);
        let forest = CommentForest::build(input);
        assert_eq!(forest.to_api(), vec![a, c]);
        assert_eq!(forest.total_count(), 4);
    }

    #[test]
    fn explicit_shape_overrides_detection() {
        // nested server, but nobody replied: would be detected as flat anyway
        let input = vec![comment("a", None, 1), comment("b", None, 2)];
        assert_eq!(
            CommentShape::from_flag(Some(true), &input),
            CommentShape::Nested
        );
        assert_eq!(CommentShape::from_flag(None, &input), CommentShape::Flat);

        // flat server forced to flat even if some replies are attached
        let mut a = comment("a", None, 1);
        a.replies.push(comment("ignored", Some("a"), 2));
        let forest =
            CommentForest::build_with(vec![a, comment("b", Some("a"), 3)], CommentShape::Flat);
        assert_eq!(ids(node(&forest, "a").replies()), vec!["b"]);
    }

    #[test]
    fn cycles_orphan_instead_of_looping() {
        let forest = CommentForest::build(vec![
            comment("root", None, 1),
            comment("a", Some("b"), 2),
            comment("b", Some("a"), 3),
            comment("self", Some("self"), 4),
        ]);
        assert_eq!(ids(forest.roots()), vec!["root"]);
        assert_eq!(forest.total_count(), 1);
    }

    #[test]
    fn upvote_bumps_only_target() {
        let mut forest = CommentForest::build(vec![
            comment("a", None, 1),
            comment("b", Some("a"), 2),
            comment("c", Some("b"), 3),
            comment("d", None, 4),
        ]);
        let before = forest.clone();

        assert!(forest.upvote(&CommentId::from("c")));
        let c = node(&forest, "c").comment();
        assert_eq!(c.score, 1);
        assert_eq!(c.user_vote, Some(Vote::Up));
        for other in ["a", "b", "d"] {
            assert_eq!(node(&forest, other).comment(), node(&before, other).comment());
        }
        assert_eq!(ids(forest.roots()), vec!["a", "d"]);

        // the snapshot taken before did not move
        assert_eq!(node(&before, "c").comment().score, 0);
        // untouched subtrees are still shared
        assert!(Arc::ptr_eq(&forest.roots()[1].comment, &before.roots()[1].comment));
    }

    #[test]
    fn upvote_unknown_is_noop() {
        let mut forest = CommentForest::build(vec![
            comment("a", None, 1),
            comment("b", Some("a"), 2),
        ]);
        let before = forest.clone();
        assert!(!forest.upvote(&CommentId::from("nope")));
        assert_eq!(forest, before);
    }

    #[test]
    fn reply_is_appended_last() {
        let mut forest = CommentForest::build(vec![
            comment("a", None, 1),
            comment("b", Some("a"), 2),
            comment("c", None, 3),
        ]);
        let before = forest.clone();

        let mut reply = comment("new", Some("a"), 10);
        reply.replies.push(comment("junk", Some("new"), 11));
        assert!(forest.insert_reply(&CommentId::from("a"), reply));

        assert_eq!(ids(node(&forest, "a").replies()), vec!["b", "new"]);
        let new = node(&forest, "new");
        assert_eq!(new.comment().content, "comment new");
        assert!(new.replies().is_empty());
        assert_eq!(forest.total_count(), before.total_count() + 1);
        assert_eq!(forest.roots()[1], before.roots()[1]);
    }

    #[test]
    fn reply_to_unknown_is_noop() {
        let mut forest = CommentForest::build(vec![comment("a", None, 1)]);
        let before = forest.clone();
        assert!(!forest.insert_reply(&CommentId::from("b"), comment("x", Some("b"), 2)));
        assert_eq!(forest, before);
    }

    #[test]
    fn deep_reply() {
        let mut forest = CommentForest::build(vec![
            comment("a", None, 1),
            comment("b", Some("a"), 2),
            comment("c", Some("b"), 3),
        ]);
        assert!(forest.insert_reply(&CommentId::from("c"), comment("d", Some("c"), 4)));
        assert_eq!(ids(node(&forest, "c").replies()), vec!["d"]);
        assert_eq!(forest.total_count(), 4);
    }

    #[test]
    fn counts_every_depth() {
        assert_eq!(CommentForest::default().total_count(), 0);
        let forest = CommentForest::build(vec![
            comment("a", None, 1),
            comment("b", Some("a"), 2),
            comment("c", Some("b"), 3),
            comment("d", Some("a"), 4),
            comment("e", None, 5),
        ]);
        assert_eq!(forest.total_count(), 5);
        assert_eq!(node(&forest, "a").count(), 4);
    }

    #[test]
    fn new_root_goes_last() {
        let mut forest = CommentForest::build(vec![comment("a", None, 1)]);
        forest.push_root(comment("b", None, 2));
        assert_eq!(ids(forest.roots()), vec!["a", "b"]);
    }

    fn chain(len: usize) -> Vec<api::Comment> {
        (0..len)
            .map(|i| {
                let parent = i.checked_sub(1).map(|p| format!("c{p}"));
                comment(&format!("c{i}"), parent.as_deref(), i as i64)
            })
            .collect()
    }

    #[test]
    fn deep_flat_chain() {
        const LEN: usize = 100_000;
        let mut forest = CommentForest::build(chain(LEN));
        assert_eq!(forest.total_count(), LEN);
        assert_eq!(ids(forest.roots()), vec!["c0"]);

        let last = CommentId(format!("c{}", LEN - 1));
        let snapshot = forest.clone();
        assert!(forest.upvote(&last));
        assert!(forest.insert_reply(&last, comment("tip", Some(last.as_str()), 0)));
        assert_eq!(forest.find(&last).map(|n| n.comment().score), Some(1));
        assert_eq!(forest.total_count(), LEN + 1);
        assert!(forest != snapshot);
        assert!(snapshot == CommentForest::build(chain(LEN)));
    }

    #[test]
    fn deep_nested_chain() {
        const LEN: usize = 100_000;
        let mut input = chain(LEN);
        let mut nested = input.pop().unwrap();
        while let Some(mut parent) = input.pop() {
            parent.replies.push(nested);
            nested = parent;
        }
        let forest = CommentForest::build(vec![nested]);
        assert_eq!(forest.total_count(), LEN);
        assert!(forest.find(&CommentId(format!("c{}", LEN - 1))).is_some());
    }

    /// Flat comment lists in which every `parent_id` names another comment of
    /// the list. `kind` picks between a root, a reply to the previous comment
    /// (building long chains) and a reply to any earlier comment.
    fn generated(shape: &[(u16, u8, i16)], reversed: bool) -> Vec<api::Comment> {
        let mut res = Vec::with_capacity(shape.len());
        for (i, &(pick, kind, secs)) in shape.iter().enumerate() {
            let parent = match (i, kind % 4) {
                (0, _) | (_, 0) => None,
                (_, 1) => Some(i - 1),
                _ => Some(pick as usize % i),
            };
            let parent = parent.map(|p| format!("c{p}"));
            res.push(comment(&format!("c{i}"), parent.as_deref(), secs as i64));
        }
        if reversed {
            res.reverse();
        }
        res
    }

    #[test]
    fn flat_lists_link_fully() {
        bolero::check!()
            .with_type::<(bool, Vec<(u16, u8, i16)>)>()
            .for_each(|(reversed, shape)| {
                let input = generated(shape, *reversed);
                let forest = CommentForest::build(input.clone());
                assert_eq!(forest.total_count(), input.len());

                for c in &input {
                    let node = forest.find(&c.id).expect("every comment is linked");
                    assert_eq!(node.comment(), c);
                    // replies are exactly the comments naming it, in input order
                    let expected = input
                        .iter()
                        .filter(|r| r.parent_id.as_ref() == Some(&c.id))
                        .map(|r| &r.id)
                        .collect::<Vec<_>>();
                    let got = node.replies().iter().map(CommentNode::id).collect::<Vec<_>>();
                    assert_eq!(got, expected);
                }

                let mut roots = input
                    .iter()
                    .filter(|c| c.parent_id.is_none())
                    .collect::<Vec<_>>();
                roots.sort_by_key(|c| c.created_at);
                let got = forest.roots().iter().map(CommentNode::comment).collect::<Vec<_>>();
                assert_eq!(got, roots);
            });
    }

    #[test]
    fn upvote_touches_only_its_target() {
        bolero::check!()
            .with_type::<(u16, Vec<(u16, u8, i16)>)>()
            .for_each(|(pick, shape)| {
                let input = generated(shape, false);
                if input.is_empty() {
                    return;
                }
                let before = CommentForest::build(input.clone());
                let mut after = before.clone();
                let target = &input[*pick as usize % input.len()].id;
                assert!(after.upvote(target));

                for c in &input {
                    let old = before.find(&c.id).expect("linked before").comment();
                    let new = after.find(&c.id).expect("linked after").comment();
                    if c.id == *target {
                        assert_eq!(new.score, old.score + 1);
                        assert_eq!(new.user_vote, Some(Vote::Up));
                    } else {
                        assert_eq!(new, old);
                    }
                }
                assert_eq!(after.total_count(), before.total_count());
            });
    }
}
