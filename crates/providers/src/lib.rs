pub mod client;
pub mod github;
pub mod pagination;
pub mod stackoverflow;
pub mod text;


use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use linkwatch_common::types::{ActivityDetail, LinkType, TrackedResource};
use thiserror::Error;

use crate::client::SourceClient;

/// Failure to determine activity for a single resource.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),

    #[error("{provider} provider cannot handle {actual} links")]
    WrongDescriptor {
        provider: LinkType,
        actual: LinkType,
    },

    #[error("link {0} has no usable activity timestamp")]
    NoActivity(i64),
}

impl ProviderError {
    pub(crate) fn from_reqwest(url: &reqwest::Url, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProviderError::Timeout {
                url: url.to_string(),
            }
        } else {
            ProviderError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }

    /// 4xx from the source: the requested item does not exist or is not visible.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProviderError::Status { status, .. } if (400..500).contains(status))
    }
}

/// Treat a 4xx on a sub-resource as "no signal from that branch".
pub(crate) fn absent_on_client_error<T>(
    result: Result<Option<T>, ProviderError>,
) -> Result<Option<T>, ProviderError> {
    match result {
        Err(e) if e.is_client_error() => {
            tracing::debug!(error = %e, "Sub-resource unavailable, skipping branch");
            Ok(None)
        }
        other => other,
    }
}

/// Pick the latest candidate. On equal timestamps the earlier candidate wins.
pub fn latest_of<I>(candidates: I) -> Option<ActivityDetail>
where
    I: IntoIterator<Item = Option<ActivityDetail>>,
{
    candidates
        .into_iter()
        .flatten()
        .fold(None, |best: Option<ActivityDetail>, candidate| match best {
            Some(b) if candidate.occurred_at <= b.occurred_at => Some(b),
            _ => Some(candidate),
        })
}

/// Strategy that determines the most recent activity of one kind of link.
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    /// The link type this provider handles.
    fn link_type(&self) -> LinkType;

    /// Return the single most recent activity for `resource`, falling back to
    /// the resource's own metadata when no finer-grained signal exists.
    async fn latest_activity(
        &self,
        resource: &TrackedResource,
    ) -> Result<ActivityDetail, ProviderError>;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str;
}

/// Startup misconfiguration of the provider set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("no activity provider registered for {0} links")]
    Unregistered(LinkType),

    #[error("more than one activity provider registered for {0} links")]
    Duplicate(LinkType),
}

/// Maps each link type to its provider. Built once at startup.
pub struct UpdateRouter {
    providers: HashMap<LinkType, Arc<dyn ActivityProvider>>,
}

impl std::fmt::Debug for UpdateRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.providers.keys().collect();
        types.sort();
        f.debug_struct("UpdateRouter")
            .field("types", &types)
            .finish()
    }
}

impl UpdateRouter {
    /// Build a router from the full provider set.
    ///
    /// Fails if any [`LinkType`] is left without a provider or claimed twice.
    pub fn new(providers: Vec<Arc<dyn ActivityProvider>>) -> Result<Self, RouterError> {
        let mut map: HashMap<LinkType, Arc<dyn ActivityProvider>> = HashMap::new();
        for provider in providers {
            let link_type = provider.link_type();
            if map.insert(link_type, provider).is_some() {
                return Err(RouterError::Duplicate(link_type));
            }
        }

        if let Some(missing) = LinkType::ALL.into_iter().find(|t| !map.contains_key(t)) {
            return Err(RouterError::Unregistered(missing));
        }

        for (link_type, provider) in &map {
            tracing::debug!(link_type = %link_type, provider = provider.name(), "Registered provider");
        }

        Ok(Self { providers: map })
    }

    /// Router with the built-in GitHub and Stack Overflow providers.
    pub fn with_defaults(
        github: Arc<dyn SourceClient>,
        stackoverflow: Arc<dyn SourceClient>,
    ) -> Result<Self, RouterError> {
        Self::new(vec![
            Arc::new(github::IssueProvider::new(github.clone())),
            Arc::new(github::PullRequestProvider::new(github.clone())),
            Arc::new(github::RepositoryProvider::new(github)),
            Arc::new(stackoverflow::QuestionProvider::new(stackoverflow)),
        ])
    }

    /// Provider registered for `link_type`.
    pub fn route(&self, link_type: LinkType) -> Result<&Arc<dyn ActivityProvider>, RouterError> {
        self.providers
            .get(&link_type)
            .ok_or(RouterError::Unregistered(link_type))
    }

    /// Delegate to the provider registered for the resource's type.
    pub async fn latest_activity(
        &self,
        resource: &TrackedResource,
    ) -> Result<ActivityDetail, RouteError> {
        let provider = self.route(resource.link_type())?;
        tracing::debug!(
            link_id = resource.id,
            provider = provider.name(),
            "Fetching latest activity"
        );
        Ok(provider.latest_activity(resource).await?)
    }
}

/// Error returned by [`UpdateRouter::latest_activity`].
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
