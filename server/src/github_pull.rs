use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::Deserialize;
use shared::{ContributionCalendar, QuestEvidence, RawContributionDay, RepoRef};
use tracing::instrument;

use crate::quests::QuestEvidenceSource;
use crate::sync::ContributionSource;

const CONTRIBUTION_CALENDAR_QUERY: &str = r#"
query($login: String!) {
  user(login: $login) {
    contributionsCollection {
      contributionCalendar {
        totalContributions
        weeks {
          contributionDays {
            date
            contributionCount
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CalendarData {
    user: Option<CalendarUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarUser {
    contributions_collection: ContributionsCollection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContributionsCollection {
    contribution_calendar: CalendarPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarPayload {
    total_contributions: i64,
    weeks: Vec<CalendarWeek>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarWeek {
    contribution_days: Vec<RawContributionDay>,
}

impl From<CalendarPayload> for ContributionCalendar {
    fn from(payload: CalendarPayload) -> Self {
        let total = u32::try_from(payload.total_contributions).ok();
        ContributionCalendar::from_raw(
            payload
                .weeks
                .iter()
                .flat_map(|week| week.contribution_days.iter()),
        )
        .with_reported_total(total)
    }
}

/// GitHub access on behalf of one connected user.
pub struct GithubClient {
    pub octocrab: Octocrab,
    pub login: String,
}

impl GithubClient {
    pub async fn new(github_token: String) -> anyhow::Result<Self> {
        let octocrab = octocrab::Octocrab::builder()
            .personal_token(github_token)
            .build()?;
        let login = octocrab.current().user().await?.login;
        Ok(Self { octocrab, login })
    }

    #[instrument(skip(self))]
    async fn find_fork(&self, login: &str, upstream: &RepoRef) -> anyhow::Result<Option<String>> {
        let page = self
            .octocrab
            .repos(&upstream.owner, &upstream.name)
            .list_forks()
            .per_page(100)
            .send()
            .await?;
        let forks = self.octocrab.all_pages(page).await?;
        Ok(forks
            .into_iter()
            .find(|fork| {
                fork.owner
                    .as_ref()
                    .is_some_and(|owner| owner.login.eq_ignore_ascii_case(login))
            })
            .map(|fork| {
                fork.html_url
                    .map(|url| url.to_string())
                    .unwrap_or_else(|| format!("https://github.com/{login}/{}", fork.name))
            }))
    }

    #[instrument(skip(self))]
    async fn has_commits(
        &self,
        login: &str,
        repo: &RepoRef,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let page = self
            .octocrab
            .repos(&repo.owner, &repo.name)
            .list_commits()
            .author(login)
            .since(since)
            .per_page(1)
            .send()
            .await?;
        Ok(!page.items.is_empty())
    }

    #[instrument(skip(self))]
    async fn has_pull_request(
        &self,
        login: &str,
        upstream: &RepoRef,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let query = format!(
            "type:pr author:{login} repo:{} created:>={}",
            upstream.full_name(),
            since.format("%Y-%m-%d")
        );
        let page = self
            .octocrab
            .search()
            .issues_and_pull_requests(&query)
            .per_page(1)
            .send()
            .await?;
        Ok(page.total_count.unwrap_or_default() > 0 || !page.items.is_empty())
    }
}

#[async_trait]
impl ContributionSource for GithubClient {
    #[instrument(skip(self))]
    async fn contribution_calendar(&self, login: &str) -> anyhow::Result<ContributionCalendar> {
        let payload = serde_json::json!({
            "query": CONTRIBUTION_CALENDAR_QUERY,
            "variables": { "login": login },
        });
        let response: GraphqlResponse<CalendarData> = self.octocrab.graphql(&payload).await?;
        if let Some(error) = response.errors.first() {
            anyhow::bail!("GitHub GraphQL error for {login}: {}", error.message);
        }
        let user = response
            .data
            .and_then(|data| data.user)
            .ok_or_else(|| anyhow::anyhow!("GitHub user {login} not found"))?;
        Ok(user.contributions_collection.contribution_calendar.into())
    }
}

#[async_trait]
impl QuestEvidenceSource for GithubClient {
    #[instrument(skip(self))]
    async fn quest_evidence(
        &self,
        login: &str,
        upstream: &RepoRef,
        since: DateTime<Utc>,
    ) -> anyhow::Result<QuestEvidence> {
        let Some(fork_url) = self.find_fork(login, upstream).await? else {
            return Ok(QuestEvidence::default());
        };
        let fork = RepoRef::parse(&fork_url).unwrap_or_else(|| RepoRef {
            owner: login.to_string(),
            name: upstream.name.clone(),
        });
        let has_qualifying_activity = self.has_commits(login, &fork, since).await?
            || self.has_pull_request(login, upstream, since).await?;
        Ok(QuestEvidence {
            fork_exists: true,
            fork_url: Some(fork_url),
            has_qualifying_activity,
        })
    }
}
