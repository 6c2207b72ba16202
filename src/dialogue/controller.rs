//! Conversation controller: utterance in, spoken reply out

use std::sync::Arc;

use serde::Serialize;

use super::{AudioSink, Chat, Conversation, Recognizer, Synthesizer};
use crate::config::ConversationConfig;
use crate::voice::{EngineEvent, EventReceiver, PlaybackOutcome, SystemSpeaking, Utterance};
use crate::{Error, Result};

/// Totals for one controller run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerReport {
    /// Turns that produced a spoken reply
    pub turns: u64,
    /// Turns skipped because transcription or reply was empty
    pub skipped_turns: u64,
    /// Turns aborted by a backend error
    pub failed_turns: u64,
    /// Utterances discarded because they arrived during a turn
    pub dropped_utterances: u64,
    /// Barge-ins reported by the engine
    pub interruptions: u64,
    /// Replies cut short by a barge-in
    pub aborted_playbacks: u64,
}

enum TurnOutcome {
    Spoken(PlaybackOutcome),
    Skipped(&'static str),
}

/// Builder for [`ConversationController`]
pub struct ControllerBuilder {
    config: ConversationConfig,
    system_speaking: SystemSpeaking,
    recognizer: Option<Arc<dyn Recognizer>>,
    chat: Option<Arc<dyn Chat>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    sink: Option<Arc<dyn AudioSink>>,
}

impl ControllerBuilder {
    /// Speech-to-text backend
    #[must_use]
    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Reply generator
    #[must_use]
    pub fn chat(mut self, chat: Arc<dyn Chat>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Text-to-speech backend
    #[must_use]
    pub fn synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Audio output
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the controller
    ///
    /// # Errors
    ///
    /// Returns error if a backend was not provided
    pub fn build(self) -> Result<ConversationController> {
        let missing = |name: &str| Error::Config(format!("conversation controller needs a {name}"));

        Ok(ConversationController {
            conversation: Conversation::new(
                self.config.max_history,
                self.config.system_prompt.clone(),
            ),
            welcome_message: self.config.welcome_message,
            system_speaking: self.system_speaking,
            recognizer: self.recognizer.ok_or_else(|| missing("recognizer"))?,
            chat: self.chat.ok_or_else(|| missing("chat backend"))?,
            synthesizer: self.synthesizer.ok_or_else(|| missing("synthesizer"))?,
            sink: self.sink.ok_or_else(|| missing("audio sink"))?,
            report: ControllerReport::default(),
        })
    }
}

/// Drives one spoken conversation from engine events
pub struct ConversationController {
    conversation: Conversation,
    welcome_message: Option<String>,
    system_speaking: SystemSpeaking,
    recognizer: Arc<dyn Recognizer>,
    chat: Arc<dyn Chat>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    report: ControllerReport,
}

impl ConversationController {
    /// Start building a controller that raises `system_speaking` around playback
    #[must_use]
    pub fn builder(config: ConversationConfig, system_speaking: SystemSpeaking) -> ControllerBuilder {
        ControllerBuilder {
            config,
            system_speaking,
            recognizer: None,
            chat: None,
            synthesizer: None,
            sink: None,
        }
    }

    /// Conversation so far
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Consume events until the engine goes away
    pub async fn run(mut self, mut events: EventReceiver) -> ControllerReport {
        tracing::info!("conversation controller started");

        if let Some(welcome) = self.welcome_message.clone() {
            tracing::info!(text = %welcome, "speaking welcome message");
            if let Err(e) = self.speak(&welcome).await {
                tracing::error!(error = %e, "failed to play welcome message");
            }
            self.drain_backlog(&mut events);
        }

        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::UtteranceReady(utterance) => {
                    self.handle_utterance(&utterance).await;
                    self.drain_backlog(&mut events);
                }
                EngineEvent::Interrupted => self.note_interruption(),
                EngineEvent::SpeechStarted => tracing::debug!("user speech started"),
                EngineEvent::SpeechEnded => tracing::debug!("user speech ended"),
            }
        }

        tracing::info!(report = ?self.report, "conversation controller stopped");
        self.report
    }

    async fn handle_utterance(&mut self, utterance: &Utterance) {
        match self.take_turn(utterance).await {
            Ok(TurnOutcome::Spoken(outcome)) => {
                self.report.turns += 1;
                if outcome == PlaybackOutcome::Aborted {
                    self.report.aborted_playbacks += 1;
                    tracing::info!("reply interrupted by user");
                } else {
                    tracing::info!("reply complete");
                }
            }
            Ok(TurnOutcome::Skipped(reason)) => {
                self.report.skipped_turns += 1;
                tracing::warn!(reason, "turn skipped");
            }
            Err(e) => {
                self.report.failed_turns += 1;
                tracing::error!(error = %e, "turn failed");
            }
        }
    }

    async fn take_turn(&mut self, utterance: &Utterance) -> Result<TurnOutcome> {
        tracing::debug!(
            duration_ms = utterance.duration().as_millis(),
            "transcribing utterance"
        );

        let text = self
            .recognizer
            .transcribe(&utterance.pcm, utterance.sample_rate)
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Skipped("no text recognized"));
        }

        tracing::info!(text, "user");
        self.conversation.add_user(text);

        let reply = self.chat.respond(&self.conversation.messages()).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Ok(TurnOutcome::Skipped("no reply generated"));
        }

        tracing::info!(text = reply, "assistant");
        self.conversation.add_assistant(reply);

        let outcome = self.speak(reply).await?;
        Ok(TurnOutcome::Spoken(outcome))
    }

    async fn speak(&self, text: &str) -> Result<PlaybackOutcome> {
        let audio = self.synthesizer.synthesize(text).await?;

        self.sink.prepare();
        self.system_speaking.set(true);
        let result = self.sink.play(audio).await;
        self.system_speaking.set(false);

        result
    }

    fn drain_backlog(&mut self, events: &mut EventReceiver) {
        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::UtteranceReady(utterance) => {
                    self.report.dropped_utterances += 1;
                    tracing::warn!(
                        duration_ms = utterance.duration().as_millis(),
                        "utterance arrived while busy, dropping"
                    );
                }
                EngineEvent::Interrupted => self.note_interruption(),
                EngineEvent::SpeechStarted | EngineEvent::SpeechEnded => {}
            }
        }
    }

    fn note_interruption(&mut self) {
        self.report.interruptions += 1;
        tracing::info!(total = self.report.interruptions, "user interrupted playback");
    }
}
