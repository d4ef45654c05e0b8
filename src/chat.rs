//! One chat turn, from question to committed answer.
//!
//! ```text
//! Idle ─▶ AwaitingBudgetCheck ─┬─▶ BudgetExceeded ─▶ Idle (error returned)
//!                              └─▶ Streaming ─┬─▶ Completed ─┐
//!                                             ├─▶ Cancelled ─┼─▶ commit if non-empty ─▶ Idle
//!                                             └─▶ Failed ────┘
//! ```
//!
//! Errors raised before streaming starts (no user turn, budget exceeded,
//! request rejected) are returned as `Err` and leave the conversation as it
//! was. Once streaming has begun the turn always returns `Ok`; a
//! cancellation or mid-stream failure is reported in
//! [`TurnReport::interruption`] and any partial text is committed exactly
//! like a completed answer.

use tracing::info;

use paper_analyst_core::context::assemble_messages;
use paper_analyst_core::models::{Message, TurnUsage, UsageStats};
use paper_analyst_core::session::SessionContext;
use paper_analyst_core::{AnalystError, Result};

use crate::client::{ChatClient, ChatRequest};
use crate::stream::{accumulate, CancelFlag};
use crate::tokens::{check_budget, count_messages, TokenCount, TokenCounter};

/// Everything a turn needs besides the session.
pub struct TurnContext<'a> {
    pub client: &'a dyn ChatClient,
    pub counter: &'a dyn TokenCounter,
    pub model: &'a str,
    pub max_input_tokens: u64,
    pub max_completion_tokens: u32,
    pub instruction: &'a str,
}

/// Hooks for progressive display.
pub trait TurnObserver {
    /// Called with the exact message list about to be sent.
    fn on_prompt(&mut self, _messages: &[Message]) {}
    /// Called with the accumulated response after every fragment.
    fn on_partial(&mut self, _text: &str) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl TurnObserver for Silent {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// The committed response (empty if nothing was received).
    pub response: String,
    /// Usage recorded for this turn; `None` when nothing was committed.
    pub usage: Option<TurnUsage>,
    /// `GenerationCancelled` or `RemoteCallFailure` when the stream did not
    /// complete normally.
    pub interruption: Option<AnalystError>,
}

/// Assemble the outgoing messages for `question` without touching history.
pub fn preview_messages(
    session: &SessionContext,
    question: &str,
    instruction: &str,
) -> Result<Vec<Message>> {
    let mut history = session.messages.clone();
    history.push(Message::user(question));
    assemble_messages(
        &history,
        &session.loaded_documents,
        &session.selection,
        instruction,
    )
}

/// Run one turn against the model.
pub async fn run_turn(
    session: &mut SessionContext,
    question: &str,
    ctx: &TurnContext<'_>,
    cancel: &CancelFlag,
    observer: &mut dyn TurnObserver,
) -> Result<TurnReport> {
    session.begin_turn(question)?;

    let prepared = prepare(session, ctx);
    let (outgoing, input) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            session.abandon_turn();
            return Err(e);
        }
    };
    observer.on_prompt(&outgoing);

    let request = ChatRequest {
        messages: outgoing,
        max_completion_tokens: ctx.max_completion_tokens,
        stream: true,
    };
    let stream = match ctx.client.stream_chat(request).await {
        Ok(stream) => stream,
        Err(e) => {
            session.abandon_turn();
            return Err(e);
        }
    };

    let outcome = accumulate(stream, cancel, |partial| observer.on_partial(partial)).await;
    let interruption = outcome.error();

    if outcome.text.is_empty() {
        session.abandon_turn();
        return Ok(TurnReport {
            response: String::new(),
            usage: None,
            interruption,
        });
    }

    let output = ctx.counter.count(&outcome.text);
    let usage = TurnUsage {
        usage: UsageStats::new(input.tokens, output.tokens),
        ceiling: ctx.max_input_tokens,
        approximate: input.approximate || output.approximate,
    };
    session.commit_response(outcome.text.clone(), usage);
    session.end_turn();

    info!(
        input_tokens = usage.usage.input_tokens,
        output_tokens = usage.usage.output_tokens,
        session_total = session.total_usage.total_tokens,
        "turn committed"
    );

    Ok(TurnReport {
        response: outcome.text,
        usage: Some(usage),
        interruption,
    })
}

fn prepare(
    session: &SessionContext,
    ctx: &TurnContext<'_>,
) -> Result<(Vec<Message>, TokenCount)> {
    let outgoing = assemble_messages(
        &session.messages,
        &session.loaded_documents,
        &session.selection,
        ctx.instruction,
    )?;
    let input = count_messages(ctx.counter, &outgoing)?;
    check_budget(input, ctx.model, ctx.max_input_tokens)?;
    Ok((outgoing, input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Fragment, FragmentStream};
    use async_trait::async_trait;
    use futures::stream;
    use paper_analyst_core::models::{Document, LoadReport, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCounter;

    impl TokenCounter for FixedCounter {
        fn count(&self, text: &str) -> TokenCount {
            TokenCount {
                tokens: text.len() as u64,
                approximate: false,
            }
        }
    }

    struct CannedClient {
        fragments: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatClient for CannedClient {
        async fn stream_chat(&self, _request: ChatRequest) -> Result<FragmentStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<Fragment>> = self
                .fragments
                .iter()
                .map(|f| Ok(Fragment::text(*f)))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn session() -> SessionContext {
        let mut s = SessionContext::new();
        s.select_model("M");
        s.replace_documents(LoadReport {
            documents: vec![Document::new("a.txt", "alpha")],
            warnings: Vec::new(),
        })
        .unwrap();
        s.define_system_role("sys").unwrap();
        s
    }

    #[tokio::test]
    async fn completed_turn_commits_answer_and_usage() {
        let client = CannedClient {
            fragments: vec!["An", "swer"],
            calls: AtomicUsize::new(0),
        };
        let ctx = TurnContext {
            client: &client,
            counter: &FixedCounter,
            model: "M",
            max_input_tokens: 10_000,
            max_completion_tokens: 100,
            instruction: "I",
        };
        let mut s = session();
        let report = run_turn(&mut s, "Q?", &ctx, &CancelFlag::new(), &mut Silent)
            .await
            .unwrap();

        assert_eq!(report.response, "Answer");
        assert!(report.interruption.is_none());
        let usage = report.usage.unwrap();
        assert_eq!(usage.usage.output_tokens, 6);
        assert_eq!(s.total_usage, usage.usage);
        let roles: Vec<Role> = s.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(s.messages[1].content, "Q?");
        assert!(!s.is_generating);
    }

    #[tokio::test]
    async fn budget_rejection_never_calls_client() {
        let client = CannedClient {
            fragments: vec!["x"],
            calls: AtomicUsize::new(0),
        };
        let ctx = TurnContext {
            client: &client,
            counter: &FixedCounter,
            model: "M",
            max_input_tokens: 5,
            max_completion_tokens: 100,
            instruction: "I",
        };
        let mut s = session();
        let before = s.messages.clone();
        let err = run_turn(&mut s, "Q?", &ctx, &CancelFlag::new(), &mut Silent)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalystError::TokenBudgetExceeded { ceiling: 5, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.messages, before);
        assert!(!s.is_generating);
    }

    #[tokio::test]
    async fn observer_sees_prompt_with_documents() {
        struct Capture(Vec<Message>);
        impl TurnObserver for Capture {
            fn on_prompt(&mut self, messages: &[Message]) {
                self.0 = messages.to_vec();
            }
        }
        let client = CannedClient {
            fragments: vec!["ok"],
            calls: AtomicUsize::new(0),
        };
        let ctx = TurnContext {
            client: &client,
            counter: &FixedCounter,
            model: "M",
            max_input_tokens: 10_000,
            max_completion_tokens: 100,
            instruction: "I",
        };
        let mut s = session();
        let mut capture = Capture(Vec::new());
        run_turn(&mut s, "Q?", &ctx, &CancelFlag::new(), &mut capture)
            .await
            .unwrap();
        let last = capture.0.last().unwrap();
        assert!(last.content.contains("alpha"));
        assert!(last.content.ends_with("Question: Q?"));
    }

    #[test]
    fn preview_does_not_mutate_history() {
        let s = session();
        let msgs = preview_messages(&s, "Q?", "I").unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(s.messages.len(), 1);
    }
}
