use std::sync::Arc;

use anyhow::{Context, Result};

use crate::hackernews::{self, Section, UserInfo};
use crate::items::{Story, Thread};

pub trait FeedService: Send + Sync {
    fn stories(&self, section: Section, limit: Option<usize>) -> Result<Vec<Story>>;
}

pub trait ThreadService: Send + Sync {
    fn thread(&self, story_id: i64) -> Result<Thread>;
}

pub trait AccountService: Send + Sync {
    fn login(&self, user: &str, password: &str) -> Result<UserInfo>;
    fn reply(&self, parent_id: i64, text: &str) -> Result<()>;
    fn submit(&self, title: &str, url: Option<&str>, text: Option<&str>) -> Result<()>;
}

pub struct HnFeedService {
    client: Arc<hackernews::Client>,
}

impl HnFeedService {
    pub fn new(client: Arc<hackernews::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for HnFeedService {
    fn stories(&self, section: Section, limit: Option<usize>) -> Result<Vec<Story>> {
        self.client
            .stories(section, limit)
            .with_context(|| format!("fetch {} listing", section.display_name()))
    }
}

pub struct HnThreadService {
    client: Arc<hackernews::Client>,
}

impl HnThreadService {
    pub fn new(client: Arc<hackernews::Client>) -> Self {
        Self { client }
    }
}

impl ThreadService for HnThreadService {
    fn thread(&self, story_id: i64) -> Result<Thread> {
        self.client
            .thread(story_id)
            .with_context(|| format!("fetch comments for story {story_id}"))
    }
}

pub struct HnAccountService {
    client: Arc<hackernews::Client>,
}

impl HnAccountService {
    pub fn new(client: Arc<hackernews::Client>) -> Self {
        Self { client }
    }
}

impl AccountService for HnAccountService {
    fn login(&self, user: &str, password: &str) -> Result<UserInfo> {
        self.client.login(user, password)
    }

    fn reply(&self, parent_id: i64, text: &str) -> Result<()> {
        self.client.reply(parent_id, text)
    }

    fn submit(&self, title: &str, url: Option<&str>, text: Option<&str>) -> Result<()> {
        self.client.submit(title, url, text)
    }
}

/// Serves a fixed listing to every section; the shell tests drive the
/// command loop against these instead of the network.
#[derive(Default)]
pub struct MockFeedService {
    pub stories: Vec<Story>,
}

impl FeedService for MockFeedService {
    fn stories(&self, _section: Section, limit: Option<usize>) -> Result<Vec<Story>> {
        let mut stories = self.stories.clone();
        if let Some(limit) = limit {
            stories.truncate(limit);
        }
        Ok(stories)
    }
}

#[derive(Default)]
pub struct MockThreadService {
    pub thread: Thread,
}

impl ThreadService for MockThreadService {
    fn thread(&self, _story_id: i64) -> Result<Thread> {
        Ok(self.thread.clone())
    }
}

/// Accepts one password and records every post it receives.
#[derive(Default)]
pub struct MockAccountService {
    pub password: String,
    pub karma: i64,
    pub replies: std::sync::Mutex<Vec<(i64, String)>>,
}

impl AccountService for MockAccountService {
    fn login(&self, user: &str, password: &str) -> Result<UserInfo> {
        if password == self.password {
            Ok(UserInfo {
                name: user.to_string(),
                karma: self.karma,
            })
        } else {
            Err(hackernews::AuthError::BadLogin.into())
        }
    }

    fn reply(&self, parent_id: i64, text: &str) -> Result<()> {
        self.replies
            .lock()
            .expect("mock replies lock")
            .push((parent_id, text.to_string()));
        Ok(())
    }

    fn submit(&self, title: &str, _url: Option<&str>, _text: Option<&str>) -> Result<()> {
        self.replies
            .lock()
            .expect("mock replies lock")
            .push((0, title.to_string()));
        Ok(())
    }
}
