//! Flat records built from the actor's dataset items.
//!
//! Vendor items are loosely shaped; every field is defaulted when absent or
//! of the wrong type.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub username: String,
    pub full_name: String,
    pub biography: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub is_verified: bool,
    pub profile_pic_url: String,
    pub profile_url: String,
    pub external_url: String,
    pub business_category: String,
    pub total_posts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_number: String,
    pub username: String,
    pub post_id: String,
    pub post_type: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub timestamp: String,
    pub profile_url: String,
    pub caption: String,
    pub video_views: i64,
    /// Whole seconds.
    pub video_duration: i64,
}

impl PostRecord {
    pub fn is_video(&self) -> bool {
        self.post_type.eq_ignore_ascii_case("video")
    }
}

/// One post as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostEntry {
    pub post_id: String,
    pub post_data: PostRecord,
    pub post_number: String,
    pub db_insert_status: bool,
    pub insert_message: String,
}

pub fn profile_url(username: &str) -> String {
    format!("https://www.instagram.com/{username}/")
}

fn text(item: &Value, key: &str, default: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn int(item: &Value, key: &str) -> i64 {
    item.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
        .unwrap_or(0)
}

fn has_error(item: &Value) -> bool {
    item.get("error").is_some()
}

/// Build the profile from the first `details` item.
pub fn build_profile(items: &[Value], username: &str) -> Result<ProfileRecord> {
    let Some(item) = items.first() else {
        bail!("No profile data found");
    };
    if has_error(item) {
        bail!("Error in profile data");
    }

    Ok(ProfileRecord {
        username: text(item, "username", username),
        full_name: text(item, "fullName", ""),
        biography: text(item, "biography", ""),
        followers_count: int(item, "followersCount"),
        following_count: int(item, "followsCount"),
        is_verified: item
            .get("verified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        profile_pic_url: text(item, "profilePicUrl", ""),
        profile_url: profile_url(username),
        external_url: text(item, "externalUrl", ""),
        business_category: text(item, "businessCategoryName", ""),
        total_posts: int(item, "postsCount"),
    })
}

/// Newest first, at most `limit`, numbered `post_N` in that order.
///
/// Items carrying an `error` key are dropped after numbering, so the
/// remaining posts keep their position-based numbers.
pub fn build_posts(mut items: Vec<Value>, username: &str, limit: usize) -> Vec<PostEntry> {
    // Timestamps are ISO-8601 strings, so lexical order is chronological.
    items.sort_by_key(|item| {
        Reverse(
            item.get("timestamp")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )
    });
    items.truncate(limit);

    items
        .iter()
        .enumerate()
        .filter(|(_, item)| !has_error(item))
        .map(|(idx, item)| {
            let post_number = format!("post_{}", idx + 1);
            let post_type = text(item, "type", "unknown");
            let video = post_type.eq_ignore_ascii_case("video");
            let post = PostRecord {
                post_number: post_number.clone(),
                username: username.to_string(),
                post_id: text(item, "id", "unknown"),
                post_type,
                likes: int(item, "likesCount"),
                comments: int(item, "commentsCount"),
                shares: int(item, "sharesCount"),
                timestamp: text(item, "timestamp", "unknown"),
                profile_url: text(item, "url", ""),
                caption: text(item, "caption", ""),
                video_views: if video { int(item, "videoViewCount") } else { 0 },
                video_duration: if video { int(item, "videoDuration") } else { 0 },
            };
            PostEntry {
                post_id: post.post_id.clone(),
                post_number,
                post_data: post,
                db_insert_status: true,
                insert_message: "Post data ready".to_string(),
            }
        })
        .collect()
}
