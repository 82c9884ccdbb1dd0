//! Stack Overflow questions via the Stack Exchange API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use linkwatch_common::types::{ActivityDetail, LinkDescriptor, LinkType, TrackedResource};

use crate::client::SourceClient;
use crate::text::{decode_entities, html_to_text, preview, str_at, timestamp_at};
use crate::{ActivityProvider, ProviderError, absent_on_client_error};

const SITE: &str = "stackoverflow";

/// Questions: the newest answer if there is one, otherwise the question.
pub struct QuestionProvider {
    client: Arc<dyn SourceClient>,
}

impl QuestionProvider {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }

    /// First entry of a Stack Exchange `items` wrapper.
    fn first_item(body: Value) -> Option<Value> {
        match body {
            Value::Object(mut wrapper) => match wrapper.remove("items") {
                Some(Value::Array(items)) => items.into_iter().next(),
                _ => None,
            },
            _ => None,
        }
    }

    async fn question(&self, question_id: i64) -> Result<Option<Value>, ProviderError> {
        let url = self.client.endpoint(
            &format!("questions/{question_id}"),
            &[("site", SITE), ("filter", "withbody")],
        )?;
        Ok(Self::first_item(self.client.get_json(&url).await?.body))
    }

    async fn newest_answer(&self, question_id: i64) -> Result<Option<Value>, ProviderError> {
        let url = self.client.endpoint(
            &format!("questions/{question_id}/answers"),
            &[
                ("site", SITE),
                ("order", "desc"),
                ("sort", "creation"),
                ("pagesize", "1"),
                ("filter", "withbody"),
            ],
        )?;
        let fetched = self
            .client
            .get_json(&url)
            .await
            .map(|res| Self::first_item(res.body));
        absent_on_client_error(fetched)
    }

    fn owner(value: &Value) -> String {
        decode_entities(str_at(value, "/owner/display_name").unwrap_or("anonymous"))
    }

    fn answer_detail(answer: &Value, title: &str) -> Option<ActivityDetail> {
        let occurred_at = timestamp_at(answer, "/creation_date")?;
        let author = Self::owner(answer);
        let body = preview(&html_to_text(str_at(answer, "/body").unwrap_or_default()));
        Some(ActivityDetail::new(
            occurred_at,
            author.clone(),
            format!("New answer by {author} to \"{title}\": {body}"),
        ))
    }

    fn question_detail(question: &Value, title: &str) -> Option<ActivityDetail> {
        let occurred_at = timestamp_at(question, "/last_activity_date")
            .or_else(|| timestamp_at(question, "/creation_date"))?;
        let body = preview(&html_to_text(str_at(question, "/body").unwrap_or_default()));
        Some(ActivityDetail::new(
            occurred_at,
            title,
            format!("Question \"{title}\" by {}: {body}", Self::owner(question)),
        ))
    }
}

#[async_trait]
impl ActivityProvider for QuestionProvider {
    fn link_type(&self) -> LinkType {
        LinkType::StackoverflowQuestion
    }

    async fn latest_activity(
        &self,
        resource: &TrackedResource,
    ) -> Result<ActivityDetail, ProviderError> {
        let LinkDescriptor::StackoverflowQuestion { question_id } = &resource.descriptor else {
            return Err(ProviderError::WrongDescriptor {
                provider: self.link_type(),
                actual: resource.link_type(),
            });
        };

        let (question, answer) =
            tokio::join!(self.question(*question_id), self.newest_answer(*question_id));
        // An empty `items` list means the question was deleted or never existed.
        let question = question?.ok_or(ProviderError::NoActivity(resource.id))?;
        let title = preview(&decode_entities(str_at(&question, "/title").unwrap_or("untitled")));

        if let Some(detail) = answer?.as_ref().and_then(|a| Self::answer_detail(a, &title)) {
            return Ok(detail);
        }

        Self::question_detail(&question, &title).ok_or(ProviderError::NoActivity(resource.id))
    }

    fn name(&self) -> &'static str {
        "Stack Overflow question"
    }
}
