//! GitHub activity providers (REST v3).
//!
//! Listings used here (issue comments, pull request commits) are returned
//! oldest-first, so the newest element is the sole element of the last page
//! at `per_page=1`. Repository listings are requested newest-first instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use linkwatch_common::types::{ActivityDetail, LinkDescriptor, LinkType, TrackedResource};

use crate::client::SourceClient;
use crate::pagination::{latest_by_pagination, sole_element};
use crate::text::{preview, str_at, timestamp_at};
use crate::{ActivityProvider, ProviderError, absent_on_client_error, latest_of};

fn repo_path(owner: &str, repo: &str) -> String {
    format!("repos/{owner}/{repo}")
}

fn login(value: &Value) -> &str {
    str_at(value, "/user/login").unwrap_or("unknown")
}

/// Latest comment on an issue or pull request conversation.
async fn latest_comment(
    client: &dyn SourceClient,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<Option<ActivityDetail>, ProviderError> {
    let url = client.endpoint(
        &format!("{}/issues/{number}/comments", repo_path(owner, repo)),
        &[],
    )?;
    let comment = absent_on_client_error(latest_by_pagination(client, url).await)?;
    Ok(comment.as_ref().and_then(|c| comment_detail(c, number)))
}

fn comment_detail(comment: &Value, number: i64) -> Option<ActivityDetail> {
    let occurred_at = timestamp_at(comment, "/created_at")?;
    let author = login(comment);
    let body = preview(str_at(comment, "/body").unwrap_or_default());
    Some(ActivityDetail::new(
        occurred_at,
        author,
        format!("New comment by {author} on #{number}: {body}"),
    ))
}

/// Commit author: GitHub account if linked, otherwise the git author name.
fn commit_author(commit: &Value) -> &str {
    str_at(commit, "/author/login")
        .or_else(|| str_at(commit, "/commit/author/name"))
        .unwrap_or("unknown")
}

fn commit_detail(commit: &Value, context: &str) -> Option<ActivityDetail> {
    let occurred_at = timestamp_at(commit, "/commit/committer/date")
        .or_else(|| timestamp_at(commit, "/commit/author/date"))?;
    let author = commit_author(commit);
    let sha: String = str_at(commit, "/sha").unwrap_or_default().chars().take(7).collect();
    let message = preview(str_at(commit, "/commit/message").unwrap_or_default());
    Some(ActivityDetail::new(
        occurred_at,
        author,
        format!("New commit {sha} by {author} in {context}: {message}"),
    ))
}

fn wrong_descriptor(provider: LinkType, resource: &TrackedResource) -> ProviderError {
    ProviderError::WrongDescriptor {
        provider,
        actual: resource.link_type(),
    }
}

/// Issues: the latest comment if the issue was touched since creation,
/// otherwise the issue itself.
pub struct IssueProvider {
    client: Arc<dyn SourceClient>,
}

impl IssueProvider {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }

    fn issue_detail(issue: &Value, number: i64) -> Option<ActivityDetail> {
        let occurred_at = timestamp_at(issue, "/updated_at")
            .or_else(|| timestamp_at(issue, "/created_at"))?;
        let title = preview(str_at(issue, "/title").unwrap_or("untitled"));
        let body = preview(str_at(issue, "/body").unwrap_or_default());
        Some(ActivityDetail::new(
            occurred_at,
            &title,
            format!("Issue #{number} \"{title}\" by {}: {body}", login(issue)),
        ))
    }
}

#[async_trait]
impl ActivityProvider for IssueProvider {
    fn link_type(&self) -> LinkType {
        LinkType::GithubIssue
    }

    async fn latest_activity(
        &self,
        resource: &TrackedResource,
    ) -> Result<ActivityDetail, ProviderError> {
        let LinkDescriptor::GithubIssue {
            owner,
            repo,
            number,
        } = &resource.descriptor
        else {
            return Err(wrong_descriptor(self.link_type(), resource));
        };
        let client = self.client.as_ref();

        let url = client.endpoint(&format!("{}/issues/{number}", repo_path(owner, repo)), &[])?;
        let issue = client.get_json(&url).await?.body;

        let touched = match (
            timestamp_at(&issue, "/created_at"),
            timestamp_at(&issue, "/updated_at"),
        ) {
            (Some(created), Some(updated)) => updated != created,
            _ => false,
        };

        if touched && let Some(comment) = latest_comment(client, owner, repo, *number).await? {
            return Ok(comment);
        }

        Self::issue_detail(&issue, *number).ok_or(ProviderError::NoActivity(resource.id))
    }

    fn name(&self) -> &'static str {
        "GitHub issue"
    }
}

/// Pull requests: the later of the latest comment and the latest commit.
///
/// When both carry the same timestamp the comment wins.
pub struct PullRequestProvider {
    client: Arc<dyn SourceClient>,
}

impl PullRequestProvider {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }

    async fn latest_commit(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Option<ActivityDetail>, ProviderError> {
        let client = self.client.as_ref();
        let url = client.endpoint(
            &format!("{}/pulls/{number}/commits", repo_path(owner, repo)),
            &[],
        )?;
        let commit = absent_on_client_error(latest_by_pagination(client, url).await)?;
        Ok(commit
            .as_ref()
            .and_then(|c| commit_detail(c, &format!("PR #{number}"))))
    }

    fn pull_detail(pull: &Value, number: i64) -> Option<ActivityDetail> {
        let occurred_at = timestamp_at(pull, "/updated_at")
            .or_else(|| timestamp_at(pull, "/created_at"))?;
        let title = preview(str_at(pull, "/title").unwrap_or("untitled"));
        let body = preview(str_at(pull, "/body").unwrap_or_default());
        Some(ActivityDetail::new(
            occurred_at,
            &title,
            format!("Pull request #{number} \"{title}\" by {}: {body}", login(pull)),
        ))
    }
}

#[async_trait]
impl ActivityProvider for PullRequestProvider {
    fn link_type(&self) -> LinkType {
        LinkType::GithubPullRequest
    }

    async fn latest_activity(
        &self,
        resource: &TrackedResource,
    ) -> Result<ActivityDetail, ProviderError> {
        let LinkDescriptor::GithubPullRequest {
            owner,
            repo,
            number,
        } = &resource.descriptor
        else {
            return Err(wrong_descriptor(self.link_type(), resource));
        };
        let client = self.client.as_ref();

        let (comment, commit) = tokio::join!(
            latest_comment(client, owner, repo, *number),
            self.latest_commit(owner, repo, *number),
        );

        // Comment listed first: it wins ties.
        if let Some(latest) = latest_of([comment?, commit?]) {
            return Ok(latest);
        }

        let url = client.endpoint(&format!("{}/pulls/{number}", repo_path(owner, repo)), &[])?;
        let pull = client.get_json(&url).await?.body;
        Self::pull_detail(&pull, *number).ok_or(ProviderError::NoActivity(resource.id))
    }

    fn name(&self) -> &'static str {
        "GitHub pull request"
    }
}

/// Repositories: the latest of the newest commit, the newest pull request and
/// the newest issue. Ties go to commit, then pull request, then issue.
pub struct RepositoryProvider {
    client: Arc<dyn SourceClient>,
}

impl RepositoryProvider {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }

    /// First element of a newest-first listing.
    async fn newest(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<Value>, ProviderError> {
        let url = self.client.endpoint(path, params)?;
        let fetched = self
            .client
            .get_json(&url)
            .await
            .map(|res| sole_element(res.body));
        absent_on_client_error(fetched)
    }

    async fn newest_commit(&self, full_name: &str) -> Result<Option<ActivityDetail>, ProviderError> {
        let commit = self
            .newest(&format!("repos/{full_name}/commits"), &[("per_page", "1")])
            .await?;
        Ok(commit.as_ref().and_then(|c| commit_detail(c, full_name)))
    }

    async fn newest_created(
        &self,
        full_name: &str,
        listing: &str,
    ) -> Result<Option<ActivityDetail>, ProviderError> {
        let item = self
            .newest(
                &format!("repos/{full_name}/{listing}"),
                &[
                    ("state", "all"),
                    ("sort", "created"),
                    ("direction", "desc"),
                    ("per_page", "1"),
                ],
            )
            .await?;

        Ok(item.as_ref().and_then(|item| {
            let occurred_at = timestamp_at(item, "/created_at")?;
            let kind = if listing == "pulls" || item.get("pull_request").is_some() {
                "pull request"
            } else {
                "issue"
            };
            let number = item.get("number").and_then(Value::as_i64).unwrap_or_default();
            let title = preview(str_at(item, "/title").unwrap_or("untitled"));
            let author = login(item);
            Some(ActivityDetail::new(
                occurred_at,
                author,
                format!("New {kind} #{number} \"{title}\" by {author} in {full_name}"),
            ))
        }))
    }

    fn repository_detail(repository: &Value, full_name: &str) -> Option<ActivityDetail> {
        let occurred_at = timestamp_at(repository, "/pushed_at")
            .or_else(|| timestamp_at(repository, "/updated_at"))
            .or_else(|| timestamp_at(repository, "/created_at"))?;
        let description = preview(str_at(repository, "/description").unwrap_or_default());
        Some(ActivityDetail::new(
            occurred_at,
            full_name,
            format!("Repository {full_name} updated: {description}"),
        ))
    }
}

#[async_trait]
impl ActivityProvider for RepositoryProvider {
    fn link_type(&self) -> LinkType {
        LinkType::GithubRepository
    }

    async fn latest_activity(
        &self,
        resource: &TrackedResource,
    ) -> Result<ActivityDetail, ProviderError> {
        let LinkDescriptor::GithubRepository { owner, repo } = &resource.descriptor else {
            return Err(wrong_descriptor(self.link_type(), resource));
        };
        let full_name = format!("{owner}/{repo}");

        let (commit, pull, issue) = tokio::join!(
            self.newest_commit(&full_name),
            self.newest_created(&full_name, "pulls"),
            self.newest_created(&full_name, "issues"),
        );

        if let Some(latest) = latest_of([commit?, pull?, issue?]) {
            return Ok(latest);
        }

        let url = self.client.endpoint(&repo_path(owner, repo), &[])?;
        let repository = self.client.get_json(&url).await?.body;
        Self::repository_detail(&repository, &full_name)
            .ok_or(ProviderError::NoActivity(resource.id))
    }

    fn name(&self) -> &'static str {
        "GitHub repository"
    }
}
