//! Conversation controller integration tests
//!
//! Backends are in-memory fakes; no audio hardware or network is used

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use livetalk::config::ConversationConfig;
use livetalk::dialogue::{
    AudioSink, Chat, ChatMessage, ConversationController, Recognizer, Role, Synthesizer,
};
use livetalk::voice::{
    EngineEvent, PlaybackAbort, PlaybackControl, PlaybackOutcome, SynthesizedAudio,
    SystemSpeaking, Utterance,
};
use livetalk::{Error, Result};

mod common;

use common::SAMPLE_RATE;

struct ScriptedRecognizer {
    replies: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedRecognizer {
    fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn transcribe(&self, pcm: &[u8], sample_rate: u32) -> Result<String> {
        assert_eq!(sample_rate, SAMPLE_RATE);
        assert!(!pcm.is_empty());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("hello".to_string()))
    }
}

#[derive(Default)]
struct EchoChat {
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl Chat for EchoChat {
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("you said {last}"))
    }
}

#[derive(Default)]
struct RecordingSynthesizer {
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(SynthesizedAudio::Pcm {
            samples: vec![0.1; 240],
            sample_rate: 24_000,
        })
    }
}

struct FakeSink {
    flag: SystemSpeaking,
    outcomes: Mutex<VecDeque<Result<PlaybackOutcome>>>,
    speaking_during_play: Mutex<Vec<bool>>,
}

impl FakeSink {
    fn new(flag: SystemSpeaking, outcomes: Vec<Result<PlaybackOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            flag,
            outcomes: Mutex::new(outcomes.into()),
            speaking_during_play: Mutex::new(Vec::new()),
        })
    }

    fn plays(&self) -> Vec<bool> {
        self.speaking_during_play.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, _audio: SynthesizedAudio) -> Result<PlaybackOutcome> {
        self.speaking_during_play.lock().unwrap().push(self.flag.get());
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PlaybackOutcome::Completed))
    }
}

/// Sink with a slow decode step during which the user barges in
struct SlowDecodeSink {
    flag: SystemSpeaking,
    abort: PlaybackAbort,
    barge_in: bool,
    speaking_at_prepare: Mutex<Vec<bool>>,
}

impl SlowDecodeSink {
    fn new(flag: SystemSpeaking, barge_in: bool) -> Arc<Self> {
        Arc::new(Self {
            flag,
            abort: PlaybackAbort::default(),
            barge_in,
            speaking_at_prepare: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AudioSink for SlowDecodeSink {
    fn prepare(&self) {
        self.speaking_at_prepare.lock().unwrap().push(self.flag.get());
        self.abort.reset();
    }

    async fn play(&self, _audio: SynthesizedAudio) -> Result<PlaybackOutcome> {
        if self.barge_in && self.flag.get() {
            // what the engine does on a confirmed interruption
            self.abort.abort().unwrap();
            self.flag.set(false);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        if self.abort.is_set() {
            Ok(PlaybackOutcome::Aborted)
        } else {
            Ok(PlaybackOutcome::Completed)
        }
    }
}

struct Harness {
    recognizer: Arc<ScriptedRecognizer>,
    chat: Arc<EchoChat>,
    synthesizer: Arc<RecordingSynthesizer>,
    sink: Arc<FakeSink>,
    flag: SystemSpeaking,
}

impl Harness {
    fn new(transcripts: Vec<Result<String>>, outcomes: Vec<Result<PlaybackOutcome>>) -> Self {
        let flag = SystemSpeaking::new();
        Self {
            recognizer: ScriptedRecognizer::new(transcripts),
            chat: Arc::new(EchoChat::default()),
            synthesizer: Arc::new(RecordingSynthesizer::default()),
            sink: FakeSink::new(flag.clone(), outcomes),
            flag,
        }
    }

    fn controller(&self, config: ConversationConfig) -> ConversationController {
        ConversationController::builder(config, self.flag.clone())
            .recognizer(self.recognizer.clone())
            .chat(self.chat.clone())
            .synthesizer(self.synthesizer.clone())
            .sink(self.sink.clone())
            .build()
            .unwrap()
    }
}

fn quiet_config() -> ConversationConfig {
    ConversationConfig {
        welcome_message: None,
        system_prompt: Some("be brief".to_string()),
        ..ConversationConfig::default()
    }
}

fn utterance() -> EngineEvent {
    EngineEvent::UtteranceReady(Utterance {
        pcm: vec![1; 2048],
        sample_rate: SAMPLE_RATE,
        chunks: 1,
        started_at: Duration::ZERO,
    })
}

/// Queue `events`, close the channel and run the controller to completion
async fn run_with(
    controller: ConversationController,
    events: Vec<EngineEvent>,
) -> livetalk::dialogue::ControllerReport {
    let (tx, rx) = mpsc::unbounded_channel();
    for event in events {
        tx.send(event).unwrap();
    }
    drop(tx);
    controller.run(rx).await
}

#[tokio::test]
async fn test_turn_flow() {
    let harness = Harness::new(vec![Ok("what time is it".to_string())], vec![]);
    let report = run_with(harness.controller(quiet_config()), vec![utterance()]).await;

    assert_eq!(report.turns, 1);
    assert_eq!(harness.sink.plays(), vec![true]);
    assert!(!harness.flag.get());

    let seen = harness.chat.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![vec![
            ChatMessage::new(Role::System, "be brief"),
            ChatMessage::new(Role::User, "what time is it"),
        ]]
    );
    assert_eq!(
        *harness.synthesizer.texts.lock().unwrap(),
        vec!["you said what time is it".to_string()]
    );
}

#[tokio::test]
async fn test_welcome_message_spoken_first() {
    let harness = Harness::new(vec![], vec![]);
    let config = ConversationConfig {
        welcome_message: Some("hi there".to_string()),
        ..quiet_config()
    };

    let report = run_with(harness.controller(config), vec![]).await;

    assert_eq!(report.turns, 0);
    assert_eq!(*harness.synthesizer.texts.lock().unwrap(), vec!["hi there".to_string()]);
    assert_eq!(harness.sink.plays(), vec![true]);
    assert!(!harness.flag.get());
}

#[tokio::test]
async fn test_empty_transcript_skips_turn() {
    let harness = Harness::new(vec![Ok("   ".to_string())], vec![]);
    let report = run_with(harness.controller(quiet_config()), vec![utterance()]).await;

    assert_eq!(report.skipped_turns, 1);
    assert_eq!(report.turns, 0);
    assert!(harness.chat.seen.lock().unwrap().is_empty());
    assert!(harness.sink.plays().is_empty());
}

#[tokio::test]
async fn test_recognizer_error_aborts_only_that_turn() {
    let harness = Harness::new(
        vec![Err(Error::Recognizer("timeout".to_string())), Ok("again".to_string())],
        vec![],
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = harness.controller(quiet_config());
    let task = tokio::spawn(controller.run(rx));

    tx.send(utterance()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(utterance()).unwrap();
    drop(tx);

    let report = task.await.unwrap();
    assert_eq!(report.failed_turns, 1);
    assert_eq!(report.turns, 1);
}

#[tokio::test]
async fn test_playback_error_clears_system_speaking() {
    let harness = Harness::new(vec![], vec![Err(Error::Playback("device lost".to_string()))]);
    let report = run_with(harness.controller(quiet_config()), vec![utterance()]).await;

    assert_eq!(report.failed_turns, 1);
    assert_eq!(harness.sink.plays(), vec![true]);
    assert!(!harness.flag.get());
}

#[tokio::test]
async fn test_backlog_dropped_after_turn() {
    let harness = Harness::new(vec![], vec![]);
    let report = run_with(
        harness.controller(quiet_config()),
        vec![utterance(), utterance(), EngineEvent::Interrupted, utterance()],
    )
    .await;

    assert_eq!(report.turns, 1);
    assert_eq!(report.dropped_utterances, 2);
    assert_eq!(report.interruptions, 1);
}

#[tokio::test]
async fn test_aborted_playback_counted() {
    let harness = Harness::new(vec![], vec![Ok(PlaybackOutcome::Aborted)]);
    let report = run_with(
        harness.controller(quiet_config()),
        vec![utterance(), EngineEvent::SpeechStarted],
    )
    .await;

    assert_eq!(report.turns, 1);
    assert_eq!(report.aborted_playbacks, 1);
}

#[tokio::test]
async fn test_history_window_bounds_chat_context() {
    let harness = Harness::new(vec![], vec![]);
    let config = ConversationConfig {
        max_history: 1,
        ..quiet_config()
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(harness.controller(config).run(rx));

    for _ in 0..3 {
        tx.send(utterance()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    drop(tx);
    let report = task.await.unwrap();
    assert_eq!(report.turns, 3);

    // system + previous exchange trimmed to one turn + the new user message
    let seen = harness.chat.seen.lock().unwrap().clone();
    assert_eq!(seen[2].len(), 3);
    assert_eq!(seen[2][0].role, Role::System);
    assert_eq!(seen[2][2].role, Role::User);
}

fn controller_with_sink(flag: &SystemSpeaking, sink: Arc<SlowDecodeSink>) -> ConversationController {
    ConversationController::builder(quiet_config(), flag.clone())
        .recognizer(ScriptedRecognizer::new(vec![]))
        .chat(Arc::new(EchoChat::default()))
        .synthesizer(Arc::new(RecordingSynthesizer::default()))
        .sink(sink)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_barge_in_before_audio_starts_aborts_reply() {
    let flag = SystemSpeaking::new();
    let sink = SlowDecodeSink::new(flag.clone(), true);

    let report = run_with(controller_with_sink(&flag, sink.clone()), vec![utterance()]).await;

    assert_eq!(report.turns, 1);
    assert_eq!(report.aborted_playbacks, 1);
    assert_eq!(*sink.speaking_at_prepare.lock().unwrap(), vec![false]);
    assert!(!flag.get());
}

#[tokio::test]
async fn test_stale_stop_cleared_before_next_reply() {
    let flag = SystemSpeaking::new();
    let sink = SlowDecodeSink::new(flag.clone(), false);
    sink.abort.abort().unwrap();

    let report = run_with(controller_with_sink(&flag, sink.clone()), vec![utterance()]).await;

    assert_eq!(report.turns, 1);
    assert_eq!(report.aborted_playbacks, 0);
}

#[test]
fn test_missing_backend_rejected() {
    let result = ConversationController::builder(quiet_config(), SystemSpeaking::new())
        .chat(Arc::new(EchoChat::default()))
        .build();
    assert!(result.is_err());
}
