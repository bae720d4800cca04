//! Chat orchestration: question → knowledge base → citations → formatted turn.

use anyhow::{bail, Context, Result};

use crate::citations;
use crate::config::Config;
use crate::format::AnswerFormatter;
use crate::models::{ChatTurn, Reference};
use crate::query::{BedrockClient, QueryClient, RetrieveAndGenerate};
use crate::session::ChatSession;

/// A formatted answer and the citations behind it.
#[derive(Debug, Clone)]
pub struct Reply {
    pub content: String,
    pub references: Vec<Reference>,
}

pub struct Assistant {
    query: QueryClient,
    formatter: AnswerFormatter,
}

impl Assistant {
    pub fn new(backend: Box<dyn RetrieveAndGenerate>, formatter: AnswerFormatter) -> Self {
        Self {
            query: QueryClient::new(backend),
            formatter,
        }
    }

    /// Assistant backed by Bedrock with credentials from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = BedrockClient::from_env(&config.knowledge_base)
            .context("Failed to build the knowledge base client")?;
        let formatter = AnswerFormatter::new(
            config.citations.style,
            config.citations.link_base_url.clone(),
        );
        Ok(Self::new(Box::new(backend), formatter))
    }

    /// Answer a question without touching any session.
    pub async fn reply(&self, question: &str) -> Result<Reply> {
        let question = question.trim();
        if question.is_empty() {
            bail!("question must not be empty");
        }
        let raw = self.query.ask(question).await;
        let references = citations::normalize(&raw.references);
        let content = self.formatter.format(&raw.answer, &references);
        Ok(Reply {
            content,
            references,
        })
    }

    /// Answer a question inside `session`, recording both turns.
    ///
    /// The user turn is recorded only once the question has been accepted,
    /// and the assistant turn stores the formatted text so citations persist
    /// in the history.
    pub async fn respond(&self, session: &mut ChatSession, question: &str) -> Result<ChatTurn> {
        if !session.is_authenticated() {
            bail!("session is not authenticated");
        }
        let question = question.trim();
        if question.is_empty() {
            bail!("question must not be empty");
        }
        session.push(ChatTurn::user(question));
        let reply = self.reply(question).await?;
        let turn = ChatTurn::assistant(reply.content);
        session.push(turn.clone());
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::RetrievedReference;
    use crate::format::CitationStyle;
    use crate::models::Role;
    use crate::query::{QueryError, RagResponse};
    use async_trait::async_trait;

    struct Canned(RagResponse);

    #[async_trait]
    impl RetrieveAndGenerate for Canned {
        async fn retrieve_and_generate(&self, _q: &str) -> Result<RagResponse, QueryError> {
            Ok(self.0.clone())
        }
    }

    fn reference(uri: &str) -> RetrievedReference {
        serde_json::from_value(serde_json::json!({"location": {"s3Location": {"uri": uri}}}))
            .unwrap()
    }

    fn assistant(answer: &str, uris: &[&str]) -> Assistant {
        let resp = RagResponse {
            answer: answer.to_string(),
            references: uris.iter().map(|u| reference(u)).collect(),
        };
        Assistant::new(
            Box::new(Canned(resp)),
            AnswerFormatter::new(CitationStyle::Brace, ""),
        )
    }

    #[tokio::test]
    async fn duplicate_citations_collapse() {
        let a = assistant("Permits are required", &["s3://b/a.pdf", "s3://b/a.pdf"]);
        let reply = a.reply("Do I need a permit?").await.unwrap();
        assert_eq!(reply.content, "Permits are required. {a.pdf}");
        assert_eq!(reply.references.len(), 1);
    }

    #[tokio::test]
    async fn respond_records_both_turns() {
        let a = assistant("Yes", &["s3://b/x.pdf"]);
        let mut session = ChatSession::new(true);
        let turn = a.respond(&mut session, "  Is it?  ").await.unwrap();
        assert_eq!(turn.content, "Yes. {x.pdf}");
        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ChatTurn::user("Is it?"));
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn locked_session_is_refused() {
        let a = assistant("Yes", &[]);
        let mut session = ChatSession::new(false);
        assert!(a.respond(&mut session, "q").await.is_err());
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_refused() {
        let a = assistant("Yes", &[]);
        let mut session = ChatSession::new(true);
        assert!(a.respond(&mut session, "   ").await.is_err());
        assert!(session.turns().is_empty());
    }
}
