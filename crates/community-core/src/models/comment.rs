use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Option<i64>,
    #[serde(default)]
    pub content: String,
    pub parent_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub user_nickname: Option<String>,
    pub user_profile_image_url: Option<String>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_authored_by(&self, user_id: Option<i64>) -> bool {
        matches!((self.user_id, user_id), (Some(a), Some(b)) if a == b)
    }

    /// Parent to use when replying to this comment.
    /// Threads are two levels deep, so replying to a reply targets its root.
    pub fn reply_parent_id(&self) -> i64 {
        self.parent_id.unwrap_or(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

impl CommentRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            parent_id: None,
        }
    }

    pub fn reply_to(content: impl Into<String>, parent: &Comment) -> Self {
        Self {
            content: content.into(),
            parent_id: Some(parent.reply_parent_id()),
        }
    }
}

/// A top-level comment and the replies attached to it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CommentThread {
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// Group a flat comment list into threads, preserving server order.
///
/// Replies whose parent is not in the list are kept as their own thread so
/// nothing the server returned is dropped.
pub fn organize_comments(comments: Vec<Comment>) -> Vec<CommentThread> {
    let roots: std::collections::HashSet<i64> = comments
        .iter()
        .filter(|c| !c.is_reply())
        .map(|c| c.id)
        .collect();

    let (replies, tops): (Vec<Comment>, Vec<Comment>) = comments
        .into_iter()
        .partition(|c| c.parent_id.is_some_and(|p| roots.contains(&p)));

    let mut threads: Vec<CommentThread> = tops
        .into_iter()
        .map(|comment| CommentThread {
            comment,
            replies: Vec::new(),
        })
        .collect();

    for reply in replies {
        if let Some(thread) = threads
            .iter_mut()
            .find(|t| Some(t.comment.id) == reply.parent_id)
        {
            thread.replies.push(reply);
        }
    }

    threads
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: i64, parent_id: Option<i64>) -> Comment {
        Comment {
            id,
            post_id: 1,
            user_id: Some(id * 10),
            content: format!("comment {}", id),
            parent_id,
            created_at: None,
            updated_at: None,
            user_nickname: None,
            user_profile_image_url: None,
        }
    }

    #[test]
    fn test_organize_comments_groups_replies() {
        let threads = organize_comments(vec![
            comment(1, None),
            comment(2, None),
            comment(3, Some(1)),
            comment(4, Some(2)),
            comment(5, Some(1)),
        ]);

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.id, 1);
        let ids: Vec<i64> = threads[0].replies.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(threads[1].replies[0].id, 4);
    }

    #[test]
    fn test_organize_comments_keeps_orphan_replies() {
        let threads = organize_comments(vec![comment(1, None), comment(9, Some(42))]);

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[1].comment.id, 9);
        assert!(threads[1].replies.is_empty());
    }

    #[test]
    fn test_organize_comments_empty() {
        assert!(organize_comments(Vec::new()).is_empty());
    }

    #[test]
    fn test_reply_to_reply_targets_root() {
        let root = comment(1, None);
        let reply = comment(3, Some(1));

        assert_eq!(CommentRequest::reply_to("hi", &root).parent_id, Some(1));
        assert_eq!(CommentRequest::reply_to("hi", &reply).parent_id, Some(1));
    }

    #[test]
    fn test_comment_request_serialization() {
        let req = CommentRequest::new("hello");
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"{"content":"hello"}"#);
    }
}
