use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use thiserror::Error;
use url::Url;

use crate::items::{Story, Thread};
use crate::scrape;

pub const HN_BASE_URL: &str = "https://news.ycombinator.com/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Sections of the site that render a story listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Section {
    #[default]
    Top,
    Newest,
    Ask,
    Jobs,
}

impl Section {
    /// Page path under the site root.
    pub fn as_path(&self) -> &'static str {
        match self {
            Section::Top => "news",
            Section::Newest => "newest",
            Section::Ask => "ask",
            Section::Jobs => "jobs",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Section::Top => "front page",
            Section::Newest => "newest",
            Section::Ask => "Ask HN",
            Section::Jobs => "jobs",
        }
    }

    pub fn all() -> [Section; 4] {
        [Section::Top, Section::Newest, Section::Ask, Section::Jobs]
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("bad login")]
    BadLogin,
    #[error("not logged in")]
    NotLoggedIn,
}

/// The authenticated user as shown in the page header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub karma: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// Blocking client over the rendered site. Holds the session cookie jar,
/// so one instance serves both anonymous browsing and a logged-in session.
#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    base: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("hackernews client user agent required");
        }

        let base = if config.base_url.trim().is_empty() {
            Url::parse(HN_BASE_URL).expect("valid default base url")
        } else {
            Url::parse(&config.base_url).context("hackernews: parse base url")?
        };

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .user_agent(config.user_agent)
                .cookie_store(true)
                .build()
                .context("hackernews: build http client")?,
        };

        Ok(Client { http, base })
    }

    /// Scrapes a section listing in rank order, truncated to `limit`
    /// stories when given. Story URLs come back absolute.
    pub fn stories(&self, section: Section, limit: Option<usize>) -> Result<Vec<Story>> {
        let html = self.get_page(section.as_path())?;
        let mut stories = scrape::stories(&html)
            .with_context(|| format!("scrape {} listing", section.display_name()))?;
        if let Some(limit) = limit {
            stories.truncate(limit);
        }
        for story in &mut stories {
            if let Ok(absolute) = self.base.join(&story.url) {
                story.url = absolute.into();
            }
        }
        Ok(stories)
    }

    /// Fetches one story's comment page and links the scraped flat
    /// sequence into a thread. A page with no comments short-circuits to
    /// an empty thread without running the builder.
    pub fn thread(&self, story_id: i64) -> Result<Thread> {
        let html = self.get_page(&format!("item?id={story_id}"))?;
        let comments = scrape::comments(&html, story_id);
        if comments.is_empty() {
            return Ok(Thread::empty(story_id));
        }
        Ok(Thread::from_flat(story_id, comments))
    }

    /// Logs in with the site's form flow: fetch the login page, carry its
    /// hidden fields over, post the credentials. The session lives in the
    /// cookie jar afterwards.
    pub fn login(&self, acct: &str, pw: &str) -> Result<UserInfo> {
        let form_page = self.get_page("login?goto=news")?;

        let mut form: Vec<(String, String)> = scrape::hidden_fields(&form_page);
        form.push(("acct".into(), acct.into()));
        form.push(("pw".into(), pw.into()));

        let response = self
            .http
            .post(self.url("login")?)
            .form(&form)
            .send()
            .context("hackernews: login request")?;
        let body = response.text().context("hackernews: read login response")?;

        if body.contains("Bad login") {
            bail!(AuthError::BadLogin);
        }
        match scrape::logged_in_user(&body) {
            Some((name, karma)) => Ok(UserInfo { name, karma }),
            None => bail!(AuthError::BadLogin),
        }
    }

    /// Re-reads the page header; `None` when the session cookie is gone.
    pub fn me(&self) -> Result<Option<UserInfo>> {
        let html = self.get_page("news")?;
        Ok(scrape::logged_in_user(&html).map(|(name, karma)| UserInfo { name, karma }))
    }

    /// Posts a reply under a story or comment. The reply form's hidden
    /// fields (`parent`, `goto`, `hmac`) are scraped and echoed back, the
    /// same dance a browser performs.
    pub fn reply(&self, parent_id: i64, text: &str) -> Result<()> {
        let form_page = self.get_page(&format!("reply?id={parent_id}"))?;
        if scrape::logged_in_user(&form_page).is_none() {
            bail!(AuthError::NotLoggedIn);
        }

        let mut form = scrape::hidden_fields(&form_page);
        if !form.iter().any(|(name, _)| name == "parent") {
            bail!(scrape::ScrapeError::MissingForm("reply"));
        }
        form.push(("text".into(), text.into()));

        let response = self
            .http
            .post(self.url("comment")?)
            .form(&form)
            .send()
            .context("hackernews: post reply")?;
        if !response.status().is_success() {
            bail!("reply failed with status {}", response.status());
        }
        Ok(())
    }

    /// Submits a new story. `url` and `text` are mutually exclusive on the
    /// site; passing both lets the server decide, as the form does.
    pub fn submit(&self, title: &str, url: Option<&str>, text: Option<&str>) -> Result<()> {
        let form_page = self.get_page("submit")?;
        if scrape::logged_in_user(&form_page).is_none() {
            bail!(AuthError::NotLoggedIn);
        }
        let fnid = scrape::hidden_field(&form_page, "fnid", "submit")?;

        let form = [
            ("fnid", fnid.as_str()),
            ("fnop", "submit-page"),
            ("title", title),
            ("url", url.unwrap_or_default()),
            ("text", text.unwrap_or_default()),
        ];
        let response = self
            .http
            .post(self.url("r")?)
            .form(&form)
            .send()
            .context("hackernews: submit story")?;
        if !response.status().is_success() {
            bail!("submit failed with status {}", response.status());
        }
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("hackernews: build url for {path}"))
    }

    fn get_page(&self, path: &str) -> Result<String> {
        let url = self.url(path)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| format!("hackernews: fetch {url}"))?;
        if !response.status().is_success() {
            bail!("{} returned status {}", url, response.status());
        }
        response
            .text()
            .with_context(|| format!("hackernews: read body of {url}"))
    }
}
