use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    load_settings, load_settings_from, CommunitySource, FeedController, FeedQuery, FeedScope,
    FeedState, HttpCommunitySource, PostDetailController,
};
use shared::{
    domain::{CommentId, PostCategory, PostId},
    protocol::{CommentDraft, Post, PostDraft},
};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feed_cli", about = "Browse and post to the community feed")]
struct Cli {
    /// Settings file; defaults to ./feed.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long, requires = "password")]
    email: Option<String>,
    #[arg(long, requires = "email")]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List posts, following pages until `--pages` is reached or the feed ends.
    Feed {
        #[arg(long)]
        category: Option<PostCategory>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Only posts written by the signed-in user.
        #[arg(long)]
        mine: bool,
    },
    Show {
        post_id: String,
    },
    Like {
        post_id: String,
    },
    Post(PostArgs),
    Comment {
        post_id: String,
        content: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Delete one of your own posts.
    Delete {
        post_id: String,
    },
    DeleteComment {
        comment_id: String,
    },
}

#[derive(Args, Debug)]
struct PostArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    #[arg(long)]
    summary: Option<String>,
    #[arg(long)]
    category: Option<PostCategory>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long = "symbol")]
    symbols: Vec<String>,
}

impl PostArgs {
    fn into_draft(self) -> PostDraft {
        PostDraft {
            title: self.title,
            content: self.content,
            summary: self.summary,
            category: self.category,
            tags: self.tags,
            symbols: self.symbols,
            ..PostDraft::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };
    if let Some(url) = cli.server_url.clone() {
        settings.api_base_url = url;
    }

    let source = Arc::new(HttpCommunitySource::new(&settings)?);
    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        let user = source.login(email, password).await?;
        info!(user_id = %user.id, "signed in");
        println!("Signed in as {} <{}>", user.name, user.email);
    }
    let source: Arc<dyn CommunitySource> = source;

    match cli.command {
        Command::Feed {
            category,
            search,
            pages,
            mine,
        } => {
            let query = feed_query(mine, category, search.as_deref());
            let feed = FeedController::with_runtime(source, query, Handle::current())
                .with_page_size(settings.page_size);
            let state = browse(&feed, pages).await?;
            for post in &state.items {
                println!("{}", summary_line(post));
            }
            println!(
                "{} posts{}",
                state.items.len(),
                if state.has_more { ", more available" } else { "" }
            );
        }
        Command::Show { post_id } => {
            let detail = PostDetailController::new(source);
            let post = open(&detail, &post_id).await?;
            println!("{}", summary_line(&post));
            println!("{}", post.content);
            for comment in post.comments.iter().flatten() {
                let reply = comment
                    .parent_id
                    .as_ref()
                    .map(|parent| format!(" (reply to {parent})"))
                    .unwrap_or_default();
                println!(
                    "  [{}] {}: {} ({} likes){reply}",
                    comment.id, comment.author.name, comment.content, comment.likes
                );
            }
        }
        Command::Like { post_id } => {
            let detail = PostDetailController::new(source);
            open(&detail, &post_id).await?;
            let likes = match detail.like_post() {
                Some(task) => task.await?,
                None => None,
            };
            match likes {
                Some(likes) => println!("{post_id} now has {likes} likes"),
                None => bail!(failure(detail.snapshot().last_error)),
            }
        }
        Command::Post(args) => {
            let draft = args.into_draft();
            draft.validate().context("invalid post")?;
            let feed = FeedController::new(source);
            match feed.create_item(draft).await? {
                Some(post) => println!("created {}", summary_line(&post)),
                None => bail!(failure(feed.snapshot().last_error)),
            }
        }
        Command::Comment {
            post_id,
            content,
            reply_to,
        } => {
            let draft = CommentDraft {
                content,
                parent_id: reply_to.map(CommentId::new),
            };
            draft.validate().context("invalid comment")?;
            let detail = PostDetailController::new(source);
            open(&detail, &post_id).await?;
            let comment = match detail.add_comment(draft) {
                Some(task) => task.await?,
                None => None,
            };
            match comment {
                Some(comment) => println!("commented [{}] on {post_id}", comment.id),
                None => bail!(failure(detail.snapshot().last_error)),
            }
        }
        Command::Delete { post_id } => {
            let feed = FeedController::mine(source);
            if !feed.remove_item(&PostId::new(post_id.as_str())).await? {
                bail!(failure(feed.snapshot().last_error));
            }
            println!("deleted {post_id}");
        }
        Command::DeleteComment { comment_id } => {
            let detail = PostDetailController::new(source);
            if !detail.delete_comment(&CommentId::new(comment_id.as_str())).await? {
                bail!(failure(detail.snapshot().last_error));
            }
            println!("deleted comment {comment_id}");
        }
    }

    Ok(())
}

/// Blank search text means no search, as with `FeedController::set_search`.
fn feed_query(mine: bool, category: Option<PostCategory>, search: Option<&str>) -> FeedQuery {
    FeedQuery {
        scope: if mine { FeedScope::Mine } else { FeedScope::Community },
        category,
        search: search
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string),
    }
}

/// Loads the first page, then keeps paging until `pages` pages are in or the feed ends.
async fn browse(feed: &FeedController, pages: u32) -> Result<FeedState> {
    if let Some(task) = feed.load_initial() {
        task.await?;
    }
    for _ in 1..pages {
        match feed.load_more() {
            Some(task) => task.await?,
            None => break,
        }
    }
    let state = feed.snapshot();
    if let Some(err) = &state.last_error {
        bail!("feed request failed: {}", err.message);
    }
    Ok(state)
}

async fn open(detail: &PostDetailController, post_id: &str) -> Result<Post> {
    detail.open(&PostId::new(post_id)).await?;
    let state = detail.snapshot();
    state.post.ok_or_else(|| anyhow::anyhow!(failure(state.last_error)))
}

fn failure(err: Option<client_core::FeedError>) -> String {
    err.map(|err| format!("{:?} error: {}", err.kind, err.message))
        .unwrap_or_else(|| "request did not complete".to_string())
}

fn summary_line(post: &Post) -> String {
    let pin = if post.is_pinned { "*" } else { " " };
    let symbols = if post.symbols.is_empty() {
        String::new()
    } else {
        format!(" [{}]", post.symbols.join(", "))
    };
    format!(
        "{pin} {} | {:<10} | {} by {}{symbols} ({} likes, {} views)",
        post.id, post.category.as_str(), post.title, post.author.name, post.likes, post.views
    )
}
