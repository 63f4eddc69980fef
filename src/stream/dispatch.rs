/// Progress event produced while decoding a completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A non-empty content fragment, in arrival order.
    Fragment(String),
    /// The stream was closed with `data: [DONE]`. Emitted at most once.
    Done,
}

/// Adapts [`StreamEvent`]s to a `(fragment, finished)` notifier.
///
/// Fragments are reported as `(text, false)`; the terminator as `("", true)`.
/// The notifier runs on the decoding task, so a slow notifier slows the
/// decode.
pub struct CallbackDispatcher<F> {
    notifier: Option<F>,
    finished: bool,
}

impl<F> CallbackDispatcher<F>
where
    F: FnMut(&str, bool),
{
    #[must_use]
    pub fn new(notifier: Option<F>) -> Self {
        Self {
            notifier,
            finished: false,
        }
    }

    pub fn dispatch(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Fragment(text) => {
                if let Some(notify) = self.notifier.as_mut() {
                    notify(text, false);
                }
            }
            StreamEvent::Done => {
                if self.finished {
                    return;
                }
                self.finished = true;
                if let Some(notify) = self.notifier.as_mut() {
                    notify("", true);
                }
            }
        }
    }

    /// Whether the finished notification has been delivered.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }
}
