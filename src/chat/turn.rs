use log::{debug, error};
use std::collections::VecDeque;

use crate::chat::framing::{DONE_FRAME, EMPTY_RESPONSE, ERROR_FRAME, FrameBuffer};
use crate::chat::memory::ConversationMemory;
use crate::llm::FragmentStream;

/// One query's response as transport frames.
///
/// Pulls model fragments lazily, so frames go out while the model is still
/// writing. The turn is committed to memory only when the stream ends cleanly.
/// The last frame is always [`DONE_FRAME`].
pub struct QueryTurn<'a> {
    state: TurnState<'a>,
    pending: VecDeque<String>,
}

enum TurnState<'a> {
    Streaming {
        input: String,
        fragments: FragmentStream<'a>,
        memory: &'a mut ConversationMemory,
        framer: FrameBuffer,
        response: String,
    },
    Finished,
}

impl<'a> QueryTurn<'a> {
    pub fn streaming(
        input: impl Into<String>,
        fragments: FragmentStream<'a>,
        memory: &'a mut ConversationMemory,
    ) -> Self {
        Self {
            state: TurnState::Streaming {
                input: input.into(),
                fragments,
                memory,
                framer: FrameBuffer::new(),
                response: String::new(),
            },
            pending: VecDeque::new(),
        }
    }

    /// A turn that failed before any output: error frame, then done.
    pub fn failed() -> Self {
        Self {
            state: TurnState::Finished,
            pending: VecDeque::from([ERROR_FRAME.to_string(), DONE_FRAME.to_string()]),
        }
    }

    fn complete(&mut self) {
        let state = std::mem::replace(&mut self.state, TurnState::Finished);
        if let TurnState::Streaming {
            input,
            memory,
            mut framer,
            response,
            ..
        } = state
        {
            if let Some(rest) = framer.finish() {
                self.pending.push_back(rest);
            }
            debug!("response complete: {} chars", response.chars().count());
            let answer = if response.is_empty() {
                EMPTY_RESPONSE.to_string()
            } else {
                response
            };
            memory.save_turn(input, answer);
            self.pending.push_back(DONE_FRAME.to_string());
        }
    }

    fn abort(&mut self, err: anyhow::Error) {
        error!("error in chat stream: {err:#}");
        self.state = TurnState::Finished;
        self.pending.push_back(ERROR_FRAME.to_string());
        self.pending.push_back(DONE_FRAME.to_string());
    }
}

impl Iterator for QueryTurn<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }

            let TurnState::Streaming {
                fragments,
                framer,
                response,
                ..
            } = &mut self.state
            else {
                return None;
            };

            match fragments.next() {
                Some(Ok(text)) => {
                    response.push_str(&text);
                    let frames = framer.push(&text);
                    self.pending.extend(frames);
                }
                Some(Err(e)) => self.abort(e),
                None => self.complete(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn fragments(items: Vec<anyhow::Result<String>>) -> FragmentStream<'static> {
        Box::new(items.into_iter())
    }

    #[test]
    fn clean_stream_commits_and_ends_with_done() {
        let mut memory = ConversationMemory::new();
        let frames: Vec<String> = QueryTurn::streaming(
            "hi",
            fragments(vec![Ok("Hello ".into()), Ok("there".into())]),
            &mut memory,
        )
        .collect();

        assert_eq!(frames, vec!["Hello there".to_string(), DONE_FRAME.to_string()]);
        assert_eq!(memory.turns()[0].human, "hi");
        assert_eq!(memory.turns()[0].ai, "Hello there");
    }

    #[test]
    fn frames_are_emitted_before_the_stream_ends() {
        let mut memory = ConversationMemory::new();
        let long = "b".repeat(60);
        let items = vec![Ok(long), Err(anyhow!("boom"))];
        let mut turn = QueryTurn::streaming("q", fragments(items), &mut memory);

        assert_eq!(turn.next().unwrap().len(), 50);
        assert_eq!(turn.next().unwrap(), ERROR_FRAME);
        assert_eq!(turn.next().unwrap(), DONE_FRAME);
        assert_eq!(turn.next(), None);
        drop(turn);
        assert!(memory.is_empty());
    }

    #[test]
    fn empty_response_stores_apology() {
        let mut memory = ConversationMemory::new();
        let frames: Vec<String> =
            QueryTurn::streaming("q", fragments(vec![]), &mut memory).collect();
        assert_eq!(frames, vec![DONE_FRAME.to_string()]);
        assert_eq!(memory.turns()[0].ai, EMPTY_RESPONSE);
    }

    #[test]
    fn failed_turn_is_error_then_done() {
        let frames: Vec<String> = QueryTurn::failed().collect();
        assert_eq!(frames, vec![ERROR_FRAME.to_string(), DONE_FRAME.to_string()]);
    }
}
