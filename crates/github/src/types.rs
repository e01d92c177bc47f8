use serde::Deserialize;

/// Fields shared by the issue and pull-request webhook payloads. Everything
/// is optional; the normalizer decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub action: Option<String>,
    pub repository: Option<Repository>,
    pub issue: Option<Issue>,
    pub pull_request: Option<Issue>,
    pub comment: Option<Comment>,
    pub sender: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: User,
}

/// An issue or a pull request; both share these fields.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub body: Option<String>,
    pub user: Option<User>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Present on issues that are pull requests.
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: Option<String>,
    pub user: Option<User>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(rename = "type")]
    pub user_type: Option<String>,
}

impl User {
    /// App and bot accounts, plus the configured login of our own bot.
    pub fn is_bot(&self, bot_login: Option<&str>) -> bool {
        self.user_type.as_deref() == Some("Bot")
            || self.login.ends_with("[bot]")
            || bot_login.is_some_and(|own| own.eq_ignore_ascii_case(&self.login))
    }
}

impl WebhookPayload {
    /// The issue or pull request the event is about.
    pub fn subject(&self) -> Option<&Issue> {
        self.issue.as_ref().or(self.pull_request.as_ref())
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
            || self
                .issue
                .as_ref()
                .is_some_and(|issue| issue.pull_request.is_some())
    }

    /// Author of the content the event carries: the comment author for
    /// comment events, else the issue/PR author, else the webhook sender.
    pub fn author(&self) -> Option<&User> {
        self.comment
            .as_ref()
            .and_then(|c| c.user.as_ref())
            .or_else(|| self.subject().and_then(|s| s.user.as_ref()))
            .or(self.sender.as_ref())
    }
}

/// Response body of the create-comment endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedComment {
    pub id: u64,
    pub html_url: Option<String>,
}
