use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::data::AccountService;
use crate::hackernews::UserInfo;

const PROMPT: &str = "hn$";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotLoggedIn,
}

/// An authenticated site session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserInfo,
    pub since: DateTime<Utc>,
}

/// Tracks the active login and gates the operations that need one.
pub struct Manager {
    accounts: Arc<dyn AccountService>,
    active: Option<Session>,
}

impl Manager {
    pub fn new(accounts: Arc<dyn AccountService>) -> Self {
        Self {
            accounts,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    pub fn login(&mut self, user: &str, password: &str) -> Result<&Session> {
        let user = self.accounts.login(user, password)?;
        self.active = Some(Session {
            user,
            since: Utc::now(),
        });
        Ok(self.active.as_ref().expect("session just stored"))
    }

    pub fn reply(&self, parent_id: i64, text: &str) -> Result<()> {
        if self.active.is_none() {
            bail!(SessionError::NotLoggedIn);
        }
        self.accounts.reply(parent_id, text)
    }

    pub fn submit(&self, title: &str, url: Option<&str>, text: Option<&str>) -> Result<()> {
        if self.active.is_none() {
            bail!(SessionError::NotLoggedIn);
        }
        self.accounts.submit(title, url, text)
    }

    /// The shell prompt, decorated with user and karma when logged in,
    /// e.g. `alice:321@hn$ `.
    pub fn prompt(&self) -> String {
        match &self.active {
            Some(session) => format!("{}:{}@{} ", session.user.name, session.user.karma, PROMPT),
            None => format!("{PROMPT} "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockAccountService;

    fn manager(password: &str) -> Manager {
        Manager::new(Arc::new(MockAccountService {
            password: password.into(),
            karma: 42,
            ..Default::default()
        }))
    }

    #[test]
    fn prompt_is_bare_until_login() {
        let mut mgr = manager("secret");
        assert_eq!(mgr.prompt(), "hn$ ");

        mgr.login("alice", "secret").unwrap();
        assert_eq!(mgr.prompt(), "alice:42@hn$ ");
    }

    #[test]
    fn failed_login_leaves_no_session() {
        let mut mgr = manager("secret");
        assert!(mgr.login("alice", "wrong").is_err());
        assert!(mgr.active().is_none());
        assert_eq!(mgr.prompt(), "hn$ ");
    }

    #[test]
    fn posting_requires_a_session() {
        let mut mgr = manager("secret");
        let err = mgr.reply(1, "hello").unwrap_err();
        assert!(err.to_string().contains("not logged in"));

        mgr.login("alice", "secret").unwrap();
        mgr.reply(1, "hello").unwrap();
    }
}
