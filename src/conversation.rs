//! Rolling conversation state and prompt assembly.

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// One transcribed utterance attributed to a synthetic speaker
#[derive(Debug, Clone)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl Utterance {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            timestamp: Local::now(),
        }
    }

    /// "Speaker 1: text" form used inside prompts
    pub fn line(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }

    /// "[HH:MM:SS] Speaker 1: text" form shown in the UI
    pub fn display_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.speaker,
            self.text
        )
    }
}

/// Cycles synthetic speaker labels between two participants.
///
/// There is no diarization; alternating labels just keeps the transcript
/// readable.
#[derive(Debug)]
pub struct SpeakerCycle {
    current: usize,
}

impl SpeakerCycle {
    pub fn new() -> Self {
        Self { current: 1 }
    }

    pub fn next(&mut self) -> String {
        let label = format!("Speaker {}", self.current);
        self.current = (self.current % 2) + 1;
        label
    }
}

impl Default for SpeakerCycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded log of recent utterances; the oldest entry is evicted when full
#[derive(Debug)]
pub struct ConversationLog {
    entries: VecDeque<Utterance>,
    max_entries: usize,
}

impl ConversationLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&mut self, utterance: Utterance) {
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(utterance);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The last `n` utterances, oldest first
    pub fn recent(&self, n: usize) -> Vec<&Utterance> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }
}

/// A chat turn for the linear voice-chat history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Linear conversation history for the chat loop; grows for the process
/// lifetime
#[derive(Debug, Default)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Role-prefixed history ending with an open "Assistant:" cue
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        for turn in &self.turns {
            prompt.push_str(turn.role.label());
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push_str("Assistant:");
        prompt
    }
}

/// Prompt for the one-shot question surfaces
pub fn concise_answer_prompt(question: &str) -> String {
    format!("Answer this question concisely: {}", question)
}

/// Prompt asking for help with the recent conversation
pub fn meeting_help_prompt(context: &[&Utterance]) -> String {
    let mut lines = String::from("Recent meeting conversation:\n");
    for utterance in context {
        lines.push_str(&format!("\u{2022} {}\n", utterance.line()));
    }

    format!(
        "You are an AI meeting assistant helping someone who got confused during a conversation.\n\
        \n\
        {}\n\
        Please provide a helpful response that:\n\
        1. Briefly summarizes what was just discussed\n\
        2. Explains any technical terms or complex topics mentioned\n\
        3. Suggests what the person might say or ask for clarification\n\
        4. Keep it concise (2-3 sentences max)\n\
        \n\
        Be helpful and practical, like a knowledgeable colleague whispering advice.",
        lines
    )
}

/// Canned notice when help is requested before anything was said
pub const NO_CONTEXT_NOTICE: &str =
    "No recent conversation to analyze. Start speaking to capture audio.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_evicts_oldest_when_full() {
        let mut log = ConversationLog::new(3);
        for i in 0..5 {
            log.push(Utterance::new("Speaker 1", format!("line {}", i)));
        }

        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert_eq!(recent[0].text, "line 2");
        assert_eq!(recent[2].text, "line 4");
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut log = ConversationLog::new(10);
        for i in 0..6 {
            log.push(Utterance::new("Speaker 1", format!("line {}", i)));
        }

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "line 4");
        assert_eq!(recent[1].text, "line 5");
    }

    #[test]
    fn clear_empties_log() {
        let mut log = ConversationLog::new(4);
        log.push(Utterance::new("Speaker 1", "hello"));
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn speakers_alternate() {
        let mut cycle = SpeakerCycle::new();
        assert_eq!(cycle.next(), "Speaker 1");
        assert_eq!(cycle.next(), "Speaker 2");
        assert_eq!(cycle.next(), "Speaker 1");
        assert_eq!(cycle.next(), "Speaker 2");
    }

    #[test]
    fn chat_prompt_shape() {
        let mut history = ChatHistory::new();
        history.push_user("what is a borrow checker?");
        history.push_assistant("It enforces ownership rules.");
        history.push_user("and lifetimes?");

        let prompt = history.prompt();
        assert_eq!(
            prompt,
            "User: what is a borrow checker?\n\
             Assistant: It enforces ownership rules.\n\
             User: and lifetimes?\n\
             Assistant:"
        );
    }

    #[test]
    fn concise_prompt_shape() {
        let prompt = concise_answer_prompt("what is rust?");
        assert_eq!(prompt, "Answer this question concisely: what is rust?");
    }

    #[test]
    fn help_prompt_contains_context_and_instructions() {
        let a = Utterance::new("Speaker 1", "we should shard the index");
        let b = Utterance::new("Speaker 2", "what about consistency?");
        let prompt = meeting_help_prompt(&[&a, &b]);

        assert!(prompt.starts_with("You are an AI meeting assistant"));
        assert!(prompt.contains("Recent meeting conversation:"));
        assert!(prompt.contains("\u{2022} Speaker 1: we should shard the index"));
        assert!(prompt.contains("\u{2022} Speaker 2: what about consistency?"));
        assert!(prompt.contains("2-3 sentences max"));
        assert!(prompt.ends_with("whispering advice."));
    }

    #[test]
    fn utterance_lines() {
        let u = Utterance::new("Speaker 2", "hello there");
        assert_eq!(u.line(), "Speaker 2: hello there");
        let display = u.display_line();
        assert!(display.starts_with('['));
        assert!(display.ends_with("] Speaker 2: hello there"));
    }
}
