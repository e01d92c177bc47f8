use {
    async_trait::async_trait,
    courier_channels::{OutboundSender, OutboxAction, OutboxTarget, SendError, SendReceipt},
    courier_config::GithubConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::json,
    tracing::debug,
};

use crate::types::CreatedComment;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Posts replies as issue (or pull-request conversation) comments.
pub struct GithubSender {
    http: reqwest::Client,
    token: Secret<String>,
    api_base_url: String,
}

/// Repository coordinates of the conversation being replied to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IssueCoordinates {
    owner: String,
    repo: String,
    number: u64,
}

impl IssueCoordinates {
    /// From target metadata, falling back to the `{owner}/{repo}#{number}`
    /// thread key.
    fn from_target(target: &OutboxTarget) -> Option<Self> {
        let from_meta = || {
            Some(Self {
                owner: target.meta_str("owner")?.to_string(),
                repo: target.meta_str("repo")?.to_string(),
                number: target.metadata.get("number")?.as_u64()?,
            })
        };
        from_meta().or_else(|| {
            let (repo_path, number) = target.thread_id.rsplit_once('#')?;
            let (owner, repo) = repo_path.split_once('/')?;
            Some(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number: number.parse().ok()?,
            })
        })
    }
}

impl GithubSender {
    pub fn new(config: &GithubConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &GithubConfig) -> Self {
        Self {
            http,
            token: config.token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl OutboundSender for GithubSender {
    async fn send(&self, action: &OutboxAction) -> Result<SendReceipt, SendError> {
        let issue = IssueCoordinates::from_target(&action.target).ok_or_else(|| {
            SendError::permanent(
                "INVALID_TARGET",
                format!("cannot derive issue from thread {}", action.target.thread_id),
            )
        })?;

        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base_url, issue.owner, issue.repo, issue.number
        );
        debug!(action_id = %action.id, owner = %issue.owner, repo = %issue.repo, number = issue.number, "github: creating comment");

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&json!({ "body": action.payload.text }))
            .send()
            .await
            .map_err(|e| SendError::transient(format!("github request failed: {e}")))?;

        let status = resp.status().as_u16();
        let rate_limited = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");
        let text = resp.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            let mut err = SendError::from_http_status(status, text);
            // Secondary rate limits come back as 403.
            if status == 403 && rate_limited {
                err.retryable = true;
            }
            return Err(err);
        }

        let created: CreatedComment = serde_json::from_str(&text).map_err(|e| SendError {
            response_status: Some(status),
            response_body: Some(text.clone()),
            ..SendError::transient(format!("unreadable github response: {e}"))
        })?;
        debug!(comment_id = created.id, url = ?created.html_url, "github: comment created");

        Ok(SendReceipt {
            provider_message_id: Some(created.id.to_string()),
            response_status: Some(status),
            response_body: Some(text),
        })
    }
}
