use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::data;
use crate::hackernews;
use crate::session;
use crate::shell;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let user_agent = if cfg.hn.user_agent.trim().is_empty() {
        format!("hncli/{}", crate::VERSION)
    } else {
        cfg.hn.user_agent.clone()
    };

    let client = Arc::new(
        hackernews::Client::new(hackernews::ClientConfig {
            base_url: cfg.hn.base_url.clone(),
            user_agent,
            timeout: Some(cfg.hn.timeout),
            http_client: None,
        })
        .context("build hackernews client")?,
    );

    let feeds: Arc<dyn data::FeedService> = Arc::new(data::HnFeedService::new(client.clone()));
    let threads: Arc<dyn data::ThreadService> =
        Arc::new(data::HnThreadService::new(client.clone()));
    let accounts: Arc<dyn data::AccountService> = Arc::new(data::HnAccountService::new(client));
    let session = session::Manager::new(accounts);

    println!(
        "hncli {} — cd around /, /newest, /ask, /jobs; 'help' lists commands.",
        crate::VERSION
    );

    let mut shell = shell::Shell::new(shell::Options {
        feeds,
        threads,
        session,
        ui: cfg.ui.clone(),
    });
    shell.run()
}
