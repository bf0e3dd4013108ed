//! Publishing generated content as articles.

use async_trait::async_trait;
use chrono::Utc;
use socialflow_shared::{
    PublishedArticle, Result, SocialFlowError, TopicId, article_slug, article_title,
};
use socialflow_storage::{Storage, new_article_id};
use tracing::{info, instrument};

/// Destination for published articles. Writing an existing slug replaces it.
#[async_trait]
pub trait ArticleSink: Send + Sync {
    async fn upsert(&self, article: &PublishedArticle) -> Result<PublishedArticle>;
}

#[async_trait]
impl ArticleSink for Storage {
    async fn upsert(&self, article: &PublishedArticle) -> Result<PublishedArticle> {
        self.upsert_article(article).await
    }
}

/// Publish `content` as the `language` article for `topic_id`.
#[instrument(skip_all, fields(topic = %topic_id, language = language.trim()))]
pub async fn publish(
    sink: &dyn ArticleSink,
    content: &str,
    language: &str,
    topic_id: &TopicId,
) -> Result<PublishedArticle> {
    if content.trim().is_empty() {
        return Err(SocialFlowError::validation("article content is required"));
    }
    if language.trim().is_empty() {
        return Err(SocialFlowError::validation("article language is required"));
    }

    let article = PublishedArticle {
        id: new_article_id(),
        title: article_title(language),
        content: content.to_string(),
        language: language.trim().to_string(),
        topic_id: topic_id.clone(),
        slug: article_slug(language, topic_id),
        created_at: Utc::now(),
    };

    let stored = sink.upsert(&article).await?;
    info!(slug = %stored.slug, id = %stored.id, "article published");
    Ok(stored)
}
