mod accounts;
pub use accounts::{
    Account, AccountError, AccountStorage, AccountStore, AccountsState, FileStorage,
    MemoryStorage, StorageError,
};

mod client;
pub use client::{Client, Error};

mod comment;
pub use comment::{CommentForest, CommentNode, CommentShape};

mod retry;
pub use retry::{Backoff, RetryPolicy, TimedOut};

mod thread;
pub use thread::{CommentThreads, DEFAULT_PAGE_SIZE};

pub mod transport;

mod util;
pub use util::time_ago;

mod view;
pub use view::{LoadTicket, LoadedPost, PostView};

pub mod api {
    pub use moltbook_api::*;
}
