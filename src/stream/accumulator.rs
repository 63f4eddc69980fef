use crate::protocol::chat::{
    Choice, CompletionResult, DeltaChunk, Message, Usage, CHAT_COMPLETION_OBJECT,
};

/// Folds delta chunks into a single completion.
///
/// `id`, `created` and `model` each latch from the first chunk that carries a
/// non-empty value and never change afterwards. `kind` is the buffered
/// completion type once any chunk has been folded. `finish_reason` and `usage`
/// are last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    id: String,
    kind: String,
    created: i64,
    model: String,
    content: String,
    finish_reason: Option<String>,
    usage: Usage,
    chunks_folded: usize,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk, returning the content fragment it contributed, if any.
    pub fn fold(&mut self, chunk: DeltaChunk) -> Option<String> {
        self.chunks_folded += 1;
        if self.kind.is_empty() {
            self.kind = CHAT_COMPLETION_OBJECT.to_owned();
        }

        if chunk.has_metadata() {
            if self.id.is_empty() {
                self.id = chunk.id;
            }
            if self.created == 0 {
                self.created = chunk.created;
            }
            if self.model.is_empty() {
                self.model = chunk.model;
            }
        }

        let choice = chunk.choices.into_iter().next()?;

        if let Some(finish_reason) = choice.finish_reason {
            self.finish_reason = Some(finish_reason);
        }
        if let Some(usage) = choice.usage {
            self.usage = usage;
        }

        match choice.delta.content {
            Some(fragment) if !fragment.is_empty() => {
                self.content.push_str(&fragment);
                Some(fragment)
            }
            _ => None,
        }
    }

    /// Content accumulated so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn chunks_folded(&self) -> usize {
        self.chunks_folded
    }

    /// Build the completion from everything folded so far.
    ///
    /// Calling this repeatedly without folding in between yields equal results.
    #[must_use]
    pub fn assemble(&self) -> CompletionResult {
        CompletionResult {
            id: self.id.clone(),
            kind: self.kind.clone(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(self.content.clone()),
                finish_reason: self.finish_reason.clone(),
            }],
            usage: self.usage,
        }
    }

    /// Consume the accumulator, moving the content into the result.
    #[must_use]
    pub fn into_result(self) -> CompletionResult {
        CompletionResult {
            id: self.id,
            kind: self.kind,
            created: self.created,
            model: self.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(self.content),
                finish_reason: self.finish_reason,
            }],
            usage: self.usage,
        }
    }
}
