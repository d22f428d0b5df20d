use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use tokio::time::sleep;

// the site serves a trimmed page to unknown agents
const USER_AGENT: &str = "Mozilla/5.0";

/// Day-page fetcher. Today is served at the bare base url, any other day
/// through a `?date=` query. Each day gets a bounded number of attempts with
/// a linearly growing pause in between; a day that exhausts them is the
/// caller's to skip.
pub(crate) struct Fetcher {
    client: Client,
    base_url: String,
    attempts: u32,
    backoff: Duration,
}

impl Fetcher {
    pub(crate) fn new(
        base_url: &str,
        timeout: Duration,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            attempts: attempts.max(1),
            backoff,
        })
    }

    pub(crate) fn day_url(&self, date: NaiveDate, is_today: bool) -> String {
        if is_today {
            self.base_url.clone()
        } else {
            format!("{}?date={}", self.base_url, date.format("%Y-%m-%d"))
        }
    }

    pub(crate) async fn fetch_day(&self, date: NaiveDate, is_today: bool) -> Result<String> {
        let url = self.day_url(date, is_today);
        let mut last_err = None;
        for attempt in 1..=self.attempts {
            debug!("GET {url} (attempt {attempt}/{})", self.attempts);
            match self.try_get(&url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!("{url}: attempt {attempt} failed: {e:#}");
                    last_err = Some(e);
                    if attempt < self.attempts {
                        sleep(self.backoff * attempt).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no attempts made")))
            .with_context(|| format!("giving up on {url}"))
    }

    async fn try_get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
