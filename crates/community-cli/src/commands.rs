//! Command handlers. Each one assumes the session has been restored.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use community_core::api::DEFAULT_UPLOAD_FOLDER;
use community_core::models::{
    organize_comments, Comment, CommentRequest, Post, PostRequest, RegisterRequest, UserProfile,
};
use community_core::validation::{validate_comment, validate_login, validate_post, validate_register};
use community_core::{Config, SessionManager};
use tracing::{info, warn};

use crate::output::Output;
use crate::Command;

pub async fn run(
    command: Command,
    session: &SessionManager,
    config: &mut Config,
    out: &Output,
) -> Result<()> {
    match command {
        Command::Login { username } => login(session, config, out, username).await,
        Command::Logout => {
            session.logout().await;
            out.message("Logged out.");
            Ok(())
        }
        Command::Whoami => match session.current_user() {
            Some(user) => out.user(&user),
            None => {
                out.message("Not logged in.");
                Ok(())
            }
        },
        Command::Register {
            username,
            email,
            nickname,
        } => register(session, out, username, email, nickname).await,
        Command::Posts { page, size } => {
            let page = session.api().list_posts(page.max(1), size.max(1)).await?;
            out.page(&page)
        }
        Command::Post { id } => {
            let (post, comments) = post_with_comments(session, id).await?;
            out.post(&post, &organize_comments(comments))
        }
        Command::NewPost {
            title,
            content,
            image,
        } => new_post(session, out, title, content, image.as_deref()).await,
        Command::Comment {
            post_id,
            content,
            reply_to,
        } => comment(session, out, post_id, content, reply_to).await,
        Command::Stats { user_id } => {
            let user_id = match user_id {
                Some(id) => id,
                None => require_login(session)?
                    .id
                    .context("Your profile has no id; pass a user id explicitly")?,
            };
            let stats = session.api().user_stats(user_id).await?;
            out.stats(&stats)
        }
        Command::Avatar { url } => {
            require_login(session)?;
            let outcome = session.update_profile_image(&url).await;
            if !outcome.success {
                bail!(outcome.message.unwrap_or_else(|| "Update failed".to_string()));
            }
            out.message("Profile image updated.");
            Ok(())
        }
    }
}

fn require_login(session: &SessionManager) -> Result<UserProfile> {
    session
        .current_user()
        .context("Not logged in. Run `community login` first.")
}

async fn post_with_comments(
    session: &SessionManager,
    post_id: i64,
) -> Result<(Post, Vec<Comment>)> {
    let api = session.api();
    let (post, comments) = tokio::try_join!(api.get_post(post_id), api.list_comments(post_id))?;
    Ok((post, comments))
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(
    session: &SessionManager,
    config: &mut Config,
    out: &Output,
    username: Option<String>,
) -> Result<()> {
    let username = match username.or_else(|| config.default_username()) {
        Some(name) => name,
        None => prompt_line("Username: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;
    validate_login(&username, &password)?;

    let outcome = session.login(&username, &password).await;
    if !outcome.success {
        bail!(outcome.message.unwrap_or_else(|| "Login failed".to_string()));
    }

    config.last_username = Some(username.trim().to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to remember username");
    }

    let name = session
        .current_user()
        .map(|u| u.display_name().to_string())
        .unwrap_or(username);
    out.message(&format!("Welcome, {}!", name));
    Ok(())
}

async fn register(
    session: &SessionManager,
    out: &Output,
    username: String,
    email: String,
    nickname: String,
) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;

    let request = RegisterRequest {
        username: username.trim().to_string(),
        email: email.trim().to_string(),
        password,
        nickname: nickname.trim().to_string(),
    };
    validate_register(&request, &confirm)?;

    let outcome = session.register(&request).await;
    if !outcome.success {
        bail!(outcome
            .message
            .unwrap_or_else(|| "Registration failed".to_string()));
    }
    out.message(&format!(
        "{} Run `community login {}` to sign in.",
        outcome.message.as_deref().unwrap_or("Account created."),
        request.username
    ));
    Ok(())
}

async fn new_post(
    session: &SessionManager,
    out: &Output,
    title: String,
    content: String,
    image: Option<&Path>,
) -> Result<()> {
    require_login(session)?;
    let mut request = PostRequest::new(title.trim(), content.trim());
    validate_post(&request)?;

    if let Some(path) = image {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image");
        let upload = session
            .api()
            .upload_image(bytes, file_name, DEFAULT_UPLOAD_FOLDER)
            .await?;
        info!(url = %upload.image_url, "Image uploaded");
        request = request.with_image(upload.image_url);
    }

    let response = session.api().create_post(&request).await?;
    if !response.success {
        bail!(response
            .message
            .unwrap_or_else(|| "Post was not created".to_string()));
    }
    match response.post_id {
        Some(id) => out.message(&format!("Created post #{}.", id)),
        None => out.message("Post created."),
    }
    Ok(())
}

async fn comment(
    session: &SessionManager,
    out: &Output,
    post_id: i64,
    content: String,
    reply_to: Option<i64>,
) -> Result<()> {
    require_login(session)?;
    let content = content.trim().to_string();

    let request = match reply_to {
        Some(parent_id) => {
            let comments = session.api().list_comments(post_id).await?;
            let parent = comments
                .iter()
                .find(|c| c.id == parent_id)
                .with_context(|| format!("Comment {} is not on post {}", parent_id, post_id))?;
            CommentRequest::reply_to(content, parent)
        }
        None => CommentRequest::new(content),
    };
    validate_comment(&request)?;

    let response = session.api().create_comment(post_id, &request).await?;
    if !response.success {
        bail!(response
            .message
            .unwrap_or_else(|| "Comment was not added".to_string()));
    }
    out.message("Comment added.");
    Ok(())
}
