//! Terminal rendering of command results, as text or JSON.

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use community_core::models::{Comment, CommentThread, Post, PostPage, UserProfile, UserStats};
use community_core::utils::relative_time;
use serde::Serialize;

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Status line; suppressed in JSON mode so stdout stays parseable
    pub fn message(&self, text: &str) {
        if self.json {
            eprintln!("{}", text);
        } else {
            println!("{}", text);
        }
    }

    pub fn user(&self, user: &UserProfile) -> Result<()> {
        if self.json {
            return self.print_json(user);
        }
        println!("{} (@{})", user.display_name(), user.username);
        if let Some(email) = &user.email {
            println!("  email:   {}", email);
        }
        if let Some(url) = &user.profile_image_url {
            println!("  avatar:  {}", url);
        }
        if let Some(joined) = user.created_at {
            println!("  joined:  {}", age(joined));
        }
        Ok(())
    }

    pub fn stats(&self, stats: &UserStats) -> Result<()> {
        if self.json {
            return self.print_json(stats);
        }
        println!(
            "{} posts, {} comments",
            stats.post_count, stats.comment_count
        );
        Ok(())
    }

    pub fn page(&self, page: &PostPage) -> Result<()> {
        if self.json {
            return self.print_json(page);
        }
        if page.list.is_empty() {
            println!("No posts yet.");
            return Ok(());
        }
        for post in &page.list {
            println!(
                "#{:<5} {}  [{}{}]",
                post.id,
                post.title,
                post.author_display(),
                post.created_at
                    .map(|at| format!(", {}", age(at)))
                    .unwrap_or_default()
            );
            let preview = post.preview();
            if !preview.is_empty() {
                println!("       {}", preview);
            }
        }
        println!(
            "page {} of {} ({} posts){}",
            page.page_num,
            page.pages.max(1),
            page.total,
            page.next_page()
                .map(|next| format!(", next: --page {}", next))
                .unwrap_or_default()
        );
        Ok(())
    }

    pub fn post(&self, post: &Post, threads: &[CommentThread]) -> Result<()> {
        if self.json {
            return self.print_json(&serde_json::json!({
                "post": post,
                "threads": threads,
            }));
        }

        println!("{}", post.title);
        println!(
            "by {}{} | {} views",
            post.author_display(),
            post.created_at
                .map(|at| format!(", {}", age(at)))
                .unwrap_or_default(),
            post.view_count
        );
        if let Some(url) = &post.image_url {
            println!("image: {}", url);
        }
        println!();
        println!("{}", post.content);
        println!();

        if threads.is_empty() {
            println!("No comments.");
        }
        for thread in threads {
            comment_line(&thread.comment, "");
            for reply in &thread.replies {
                comment_line(reply, "    ");
            }
        }
        Ok(())
    }
}

fn comment_line(comment: &Comment, indent: &str) {
    let author = comment.user_nickname.as_deref().unwrap_or("Unknown");
    let when = comment.created_at.map(age).unwrap_or_default();
    println!("{}[{}] {} {}", indent, comment.id, author, when);
    println!("{}  {}", indent, comment.content);
}

fn age(at: NaiveDateTime) -> String {
    relative_time(at, Local::now().naive_local())
}
