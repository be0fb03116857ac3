use std::sync::Arc;

use async_trait::async_trait;
use lantern_protocol::{
    content::{CompleteReply, ReplyStatus},
    Content,
};
use tracing::warn;

use super::{next_event_for, HandlerError, RequestHandler};
use crate::{
    context::RequestContext,
    engine::{CommandKind, EventKind, ExecutionEngine, KernelCommand},
};

pub struct CompleteHandler {
    engine: Arc<dyn ExecutionEngine>,
}

impl CompleteHandler {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RequestHandler for CompleteHandler {
    fn name(&self) -> &'static str {
        "complete"
    }

    async fn handle(&self, context: RequestContext) -> Result<(), HandlerError> {
        let Content::CompleteRequest(request) = context.content() else {
            return Err(HandlerError::unexpected(self.name(), &context));
        };
        let cursor_end = request.cursor_pos.min(request.code.chars().count());
        let cursor_start = completion_start(&request.code, cursor_end);

        let command = KernelCommand::new(CommandKind::RequestCompletions {
            code: request.code.clone(),
            cursor: cursor_end,
        });
        let mut events = self.engine.subscribe();

        let matches = match self.engine.send(command.clone()).await {
            Ok(()) => loop {
                match next_event_for(&mut events, &command).await.map(|e| e.kind) {
                    Some(EventKind::CompletionsProduced { matches }) => break Some(matches),
                    Some(EventKind::CommandFailed { message, .. }) => {
                        warn!(%message, "completion failed");
                        break None;
                    }
                    Some(_) => continue,
                    None => break None,
                }
            },
            Err(e) => {
                warn!(error = %e, "completion request was not accepted");
                None
            }
        };
        drop(events);

        let reply = match matches {
            Some(matches) => CompleteReply {
                matches,
                cursor_start,
                cursor_end,
                status: ReplyStatus::Ok,
            },
            None => CompleteReply {
                matches: Vec::new(),
                cursor_start: cursor_end,
                cursor_end,
                status: ReplyStatus::Error,
            },
        };
        context.reply(reply)?;
        context.complete();
        Ok(())
    }
}

/// Where the replaced text starts for a completion at `cursor` (in chars).
///
/// Walks back over the token under the cursor; if the token is a member
/// access, only the part after its last `.` is replaced.
pub fn completion_start(code: &str, cursor: usize) -> usize {
    let before: Vec<char> = code.chars().take(cursor).collect();
    let token_start = before
        .iter()
        .rposition(|c| c.is_whitespace())
        .map_or(0, |i| i + 1);

    match before[token_start..].iter().rposition(|c| *c == '.') {
        Some(dot) => token_start + dot + 1,
        None => token_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[googletest::test]
    fn trailing_dot_starts_replacement_at_cursor() {
        expect_that!(completion_start("System.Console.", 15), eq(15));
    }

    #[googletest::test]
    fn member_fragment_is_replaced_after_last_dot() {
        expect_that!(completion_start("System.Console.Wri", 18), eq(15));
    }

    #[googletest::test]
    fn plain_token_is_replaced_whole() {
        expect_that!(completion_start("var x = Sys", 11), eq(8));
        expect_that!(completion_start("Sys", 3), eq(0));
    }

    #[googletest::test]
    fn cursor_after_whitespace_replaces_nothing() {
        expect_that!(completion_start("var ", 4), eq(4));
        expect_that!(completion_start("", 0), eq(0));
    }

    #[googletest::test]
    fn offsets_count_characters_not_bytes() {
        expect_that!(completion_start("let é = a.b", 11), eq(10));
    }

    #[googletest::test]
    fn cursor_in_the_middle_ignores_text_after_it() {
        expect_that!(completion_start("Console.Wri ignored", 11), eq(8));
    }
}
