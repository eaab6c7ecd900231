use std::path::PathBuf;

use anyhow::Context;
use moltbook_client::{
    api::{self, CommentId, PostId, PostQuery, SortType},
    time_ago, AccountStore, Client, CommentNode, FileStorage, PostView,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, env = "MOLTBOOK_HOST", default_value = "https://www.moltbook.com")]
    host: String,

    /// Where known accounts are kept, defaults to ~/.moltbook-accounts.json
    #[structopt(long, env = "MOLTBOOK_ACCOUNTS", parse(from_os_str))]
    accounts_file: Option<PathBuf>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List posts
    Posts {
        /// hot, new or top
        #[structopt(long, default_value = "hot")]
        sort: SortType,

        /// Only posts from this community
        #[structopt(long)]
        submolt: Option<String>,

        /// Only posts by this agent
        #[structopt(long)]
        author: Option<String>,

        #[structopt(long, default_value = "25")]
        limit: u32,

        #[structopt(long, default_value = "0")]
        offset: u32,
    },

    /// Show a post and its comment threads
    Show {
        id: String,

        /// Pages of threads to show
        #[structopt(long, default_value = "1")]
        pages: usize,
    },

    /// Create a post
    Submit {
        submolt: String,
        title: String,
        content: String,
    },

    /// Comment on a post
    Comment {
        post: String,
        text: String,

        /// Comment to reply to
        #[structopt(long)]
        parent: Option<String>,
    },

    UpvoteComment {
        id: String,
    },

    Upvote {
        post: String,
    },

    Downvote {
        post: String,
    },

    /// Delete one of your posts
    Delete {
        post: String,
    },

    /// List communities
    Communities,

    Community {
        name: String,
    },

    Subscribe {
        name: String,
    },

    Unsubscribe {
        name: String,
    },

    /// Show the agent of the current account
    Whoami,

    /// Register a new agent, and add it to the known accounts
    Register {
        name: String,

        #[structopt(long)]
        description: Option<String>,
    },

    /// Show an agent's profile
    Profile {
        name: String,
    },

    /// Manage known accounts
    Account {
        #[structopt(subcommand)]
        cmd: AccountCommand,
    },
}

#[derive(structopt::StructOpt)]
enum AccountCommand {
    List,

    /// Check an api key, then remember it under its agent's name
    Add {
        api_key: String,
    },

    Switch {
        name: String,
    },

    Remove {
        name: String,
    },
}

fn accounts_path(opt: &Opt) -> anyhow::Result<PathBuf> {
    if let Some(path) = &opt.accounts_file {
        return Ok(path.clone());
    }
    let home = std::env::var_os("HOME").context("retrieving HOME environment variable")?;
    Ok(PathBuf::from(home).join(".moltbook-accounts.json"))
}

fn print_post(p: &api::Post, now: api::Time) {
    println!("{}", post_header(p, p.comment_count, now));
}

fn post_header(p: &api::Post, comments: u64, now: api::Time) -> String {
    format!(
        "[{}] {} ({} points, {comments} comments)\n    m/{} by {} {}",
        p.id,
        p.title,
        p.score,
        p.submolt.name,
        p.author.name,
        time_ago(p.created_at, now)
    )
}

fn print_thread(node: &CommentNode, depth: usize, now: api::Time) {
    let c = node.comment();
    let indent = "  ".repeat(depth);
    let author = c.author.as_ref().map_or("[deleted]", |a| &a.name as &str);
    println!(
        "{indent}[{}] {author} ({} points) {}",
        c.id,
        c.score,
        time_ago(c.created_at, now)
    );
    for line in c.content.lines() {
        println!("{indent}  {line}");
    }
    for reply in node.replies() {
        print_thread(reply, depth + 1, now);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let path = accounts_path(&opt)?;
    let mut accounts = AccountStore::open(FileStorage::new(&path))
        .with_context(|| format!("opening accounts file {path:?}"))?;

    let mut client = Client::new(&opt.host);
    client.set_api_key(accounts.current_api_key().map(String::from));
    let now = chrono::Utc::now();

    match opt.cmd {
        Command::Posts {
            sort,
            submolt,
            author,
            limit,
            offset,
        } => {
            let query = PostQuery {
                submolt,
                author,
                sort: Some(sort),
                limit: Some(limit),
                offset: Some(offset),
            };
            for p in client.posts(&query).await.context("listing posts")? {
                print_post(&p, now);
            }
        }
        Command::Show { id, pages } => {
            let mut view = PostView::new();
            if !view.load(&client, PostId(id.clone())).await {
                anyhow::bail!(
                    "loading post {id}: {}",
                    view.last_error().unwrap_or("unknown error")
                );
            }
            for _ in 1..pages {
                view.show_more();
            }
            let loaded = view.loaded().context("post vanished while loading")?;
            // the loaded threads are fresher than the post's own counter
            let comments = loaded.threads.total_comments() as u64;
            println!("{}", post_header(&loaded.post, comments, now));
            println!();
            println!("{}", loaded.post.content);
            println!();
            for node in loaded.threads.visible() {
                print_thread(node, 0, now);
            }
            if loaded.threads.has_more() {
                let left = loaded.threads.total_roots() - loaded.threads.visible().len();
                println!("... {left} more threads, use --pages to see them");
            }
        }
        Command::Submit {
            submolt,
            title,
            content,
        } => {
            let post = client
                .create_post(&api::NewPost {
                    title,
                    content,
                    submolt,
                })
                .await
                .context("creating post")?;
            print_post(&post, now);
        }
        Command::Comment { post, text, parent } => {
            let parent = parent.map(CommentId);
            let c = client
                .create_comment(&PostId(post), &text, parent.as_ref())
                .await
                .context("creating comment")?;
            println!("created comment {}", c.id);
        }
        Command::UpvoteComment { id } => {
            client
                .upvote_comment(&CommentId(id))
                .await
                .context("upvoting comment")?;
        }
        Command::Upvote { post } => {
            client
                .upvote_post(&PostId(post))
                .await
                .context("upvoting post")?;
        }
        Command::Downvote { post } => {
            client
                .downvote_post(&PostId(post))
                .await
                .context("downvoting post")?;
        }
        Command::Delete { post } => {
            client
                .delete_post(&PostId(post))
                .await
                .context("deleting post")?;
        }
        Command::Communities => {
            for s in client.submolts().await.context("listing communities")? {
                println!(
                    "m/{} - {} ({} subscribers)",
                    s.name, s.display_name, s.subscriber_count
                );
            }
        }
        Command::Community { name } => {
            let s = client
                .submolt(&name)
                .await
                .with_context(|| format!("fetching community {name}"))?;
            println!("m/{} - {}", s.name, s.display_name);
            println!("{} subscribers, created {}", s.subscriber_count, time_ago(s.created_at, now));
            if !s.description.is_empty() {
                println!();
                println!("{}", s.description);
            }
        }
        Command::Subscribe { name } => {
            client.subscribe(&name).await.context("subscribing")?;
        }
        Command::Unsubscribe { name } => {
            client.unsubscribe(&name).await.context("unsubscribing")?;
        }
        Command::Whoami => {
            let me = client.me().await.context("fetching current agent")?;
            println!("{} ({} karma)", me.name, me.karma);
            if let Some(d) = &me.description {
                println!("{d}");
            }
        }
        Command::Register { name, description } => {
            let res = client
                .register_agent(&api::NewAgent { name, description })
                .await
                .context("registering agent")?;
            accounts
                .add(&res.agent.name, &res.agent.api_key)
                .context("saving new account")?;
            tracing::info!(agent = %res.agent.name, "registered agent, saved as current account");
            println!("{}", res.message);
            println!("registered {}, now the current account", res.agent.name);
            if let Some(url) = &res.agent.claim_url {
                println!("claim it at {url}");
            }
        }
        Command::Profile { name } => {
            let profile = client
                .agent_profile(&name)
                .await
                .with_context(|| format!("fetching profile of {name}"))?;
            let a = &profile.agent;
            println!("{} ({} karma)", a.name, a.karma);
            if let Some(d) = &a.description {
                println!("{d}");
            }
            if let Some(s) = &a.stats {
                println!("{} posts, {} comments", s.posts, s.comments);
            }
            for p in &profile.recent_posts {
                print_post(p, now);
            }
        }
        Command::Account { cmd } => match cmd {
            AccountCommand::List => {
                let current = accounts.current().map(|a| a.name.clone());
                for a in accounts.list() {
                    let mark = if Some(&a.name) == current.as_ref() { "*" } else { " " };
                    println!("{mark} {}", a.name);
                }
            }
            AccountCommand::Add { api_key } => {
                let agent = client
                    .verify_api_key(&api_key)
                    .await
                    .context("api key was not accepted")?;
                accounts
                    .add(&agent.name, &api_key)
                    .context("saving account")?;
                tracing::info!(agent = %agent.name, "added account");
                println!("added {}, now the current account", agent.name);
            }
            AccountCommand::Switch { name } => {
                accounts.switch(&name).context("switching account")?;
                tracing::info!(account = %name.trim(), "switched account");
            }
            AccountCommand::Remove { name } => {
                accounts.remove(&name).context("removing account")?;
                tracing::info!(
                    account = %name.trim(),
                    current = ?accounts.current().map(|a| &a.name),
                    "removed account"
                );
                match accounts.current() {
                    Some(a) => println!("now using {}", a.name),
                    None => println!("no account left"),
                }
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use moltbook_client::{CommentForest, CommentThreads};

    #[test]
    fn header_counts_loaded_comments() {
        let now = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let post = api::Post {
            id: PostId::from("p1"),
            title: String::from("Crabs"),
            content: String::from("Do agents dream of crabs?"),
            author: api::Author {
                id: api::AgentId::from("a1"),
                name: String::from("molty"),
            },
            submolt: api::SubmoltRef {
                id: api::SubmoltId::from("s1"),
                name: String::from("general"),
                display_name: String::from("General"),
            },
            upvotes: 3,
            downvotes: 0,
            score: 3,
            comment_count: 0,
            created_at: now - chrono::Duration::hours(2),
            user_vote: None,
        };
        let comment = |id: &str, parent: Option<&str>| api::Comment {
            id: CommentId::from(id),
            content: String::from("hi"),
            author: None,
            post_id: None,
            parent_id: parent.map(CommentId::from),
            upvotes: 0,
            downvotes: 0,
            score: 0,
            created_at: now,
            user_vote: None,
            replies: Vec::new(),
        };
        let threads = CommentThreads::new(CommentForest::build(vec![
            comment("c1", None),
            comment("c2", Some("c1")),
            comment("c3", None),
        ]));
        let header = post_header(&post, threads.total_comments() as u64, now);
        assert_eq!(
            header,
            "[p1] Crabs (3 points, 3 comments)\n    m/general by molty 2 hours ago"
        );
    }
}
