use crate::assistant::AssistEvent;

/// Conversation lines kept for display; older lines scroll away
const MAX_DISPLAY_LINES: usize = 200;

/// Everything the window needs to render one frame.
///
/// Built purely from drained pipeline events, so the renderer never touches
/// pipeline state.
#[derive(Debug, Clone)]
pub struct UiState {
    pub status: String,
    pub speaking: bool,
    pub conversation: Vec<String>,
    pub answer: String,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            status: "Starting...".to_string(),
            speaking: false,
            conversation: Vec::new(),
            answer: String::new(),
        }
    }

    /// Fold one pipeline event into the view
    pub fn apply(&mut self, event: AssistEvent) {
        match event {
            AssistEvent::Utterance(utterance) => {
                self.conversation.push(utterance.display_line());
                if self.conversation.len() > MAX_DISPLAY_LINES {
                    let excess = self.conversation.len() - MAX_DISPLAY_LINES;
                    self.conversation.drain(..excess);
                }
            }
            AssistEvent::Status(status) => {
                self.status = status;
            }
            AssistEvent::Speaking(speaking) => {
                self.speaking = speaking;
            }
            AssistEvent::Answer(answer) => {
                self.answer = answer;
            }
            AssistEvent::Cleared => {
                self.conversation.clear();
                self.answer.clear();
            }
        }
    }

    /// Status text with the live speech indicator folded in
    pub fn status_line(&self) -> String {
        if self.speaking {
            format!("{} (speech detected)", self.status)
        } else {
            self.status.clone()
        }
    }

    /// The most recent conversation lines, newest last
    pub fn recent_conversation(&self, n: usize) -> String {
        let skip = self.conversation.len().saturating_sub(n);
        self.conversation[skip..].join("\n\n")
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Utterance;

    #[test]
    fn events_fold_into_view() {
        let mut state = UiState::new();

        state.apply(AssistEvent::Status("Listening...".to_string()));
        assert_eq!(state.status, "Listening...");

        state.apply(AssistEvent::Utterance(Utterance::new("Speaker 1", "hello")));
        assert_eq!(state.conversation.len(), 1);
        assert!(state.conversation[0].ends_with("Speaker 1: hello"));

        state.apply(AssistEvent::Answer("An answer.".to_string()));
        assert_eq!(state.answer, "An answer.");

        state.apply(AssistEvent::Cleared);
        assert!(state.conversation.is_empty());
        assert!(state.answer.is_empty());
        // Status survives a clear
        assert_eq!(state.status, "Listening...");
    }

    #[test]
    fn speaking_indicator_wraps_status() {
        let mut state = UiState::new();
        state.apply(AssistEvent::Status("Listening...".to_string()));
        state.apply(AssistEvent::Speaking(true));
        assert_eq!(state.status_line(), "Listening... (speech detected)");
        state.apply(AssistEvent::Speaking(false));
        assert_eq!(state.status_line(), "Listening...");
    }

    #[test]
    fn display_lines_are_bounded() {
        let mut state = UiState::new();
        for i in 0..(MAX_DISPLAY_LINES + 50) {
            state.apply(AssistEvent::Utterance(Utterance::new(
                "Speaker 1",
                format!("line {}", i),
            )));
        }
        assert_eq!(state.conversation.len(), MAX_DISPLAY_LINES);
        assert!(state
            .conversation
            .last()
            .unwrap()
            .ends_with(&format!("line {}", MAX_DISPLAY_LINES + 49)));
    }

    #[test]
    fn recent_conversation_takes_tail() {
        let mut state = UiState::new();
        for i in 0..5 {
            state.apply(AssistEvent::Utterance(Utterance::new(
                "Speaker 1",
                format!("line {}", i),
            )));
        }
        let text = state.recent_conversation(2);
        assert!(text.contains("line 3"));
        assert!(text.contains("line 4"));
        assert!(!text.contains("line 2"));
    }
}
