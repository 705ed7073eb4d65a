use async_trait::async_trait;
use casefile::embedding::{BatchEmbedder, EmbeddingError, EmbeddingProvider};
use casefile::generation::{
    AnswerKind, ConversationHistory, Detective, GenerationError, GenerationProvider, Turn,
    INSUFFICIENT_EVIDENCE,
};
use casefile::ingest::{EvidenceChunk, EvidenceDocument};
use casefile::retrieval::Retriever;
use casefile::retry::{RetryOutcome, RetryPolicy, UNAVAILABLE_MESSAGE};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Two-dimensional embedding: mentions of "car" and of "knife"
struct TopicProvider;

#[async_trait]
impl EmbeddingProvider for TopicProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                vec![
                    lower.matches("car").count() as f32,
                    lower.matches("knife").count() as f32,
                ]
            })
            .collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(2)
    }

    fn model_name(&self) -> &str {
        "topics"
    }
}

/// Replays scripted replies and records what it was asked
#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
    history_lengths: Mutex<Vec<usize>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn replying(replies: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, history: &[Turn], prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.history_lengths.lock().unwrap().push(history.len());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::RateLimited))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(5))
}

async fn built_retriever(dir: &TempDir, chunks: Vec<EvidenceChunk>) -> Arc<Retriever> {
    let embedder = BatchEmbedder::new(Arc::new(TopicProvider), 8, policy());
    let retriever = Retriever::new(embedder, dir.path().join("vector_store.zst"));
    retriever.build_store(chunks).await.unwrap();
    Arc::new(retriever)
}

fn case_chunks() -> Vec<EvidenceChunk> {
    vec![
        EvidenceChunk::new("The car was red.", "witness_sarah.txt"),
        EvidenceChunk::new("A knife was found in the alley.", "police_log.txt"),
    ]
}

#[tokio::test]
async fn test_answer_cites_retrieved_evidence() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, case_chunks()).await;
    let generator = Arc::new(ScriptedGenerator::replying(vec![Ok(
        "  The car was red [witness_sarah.txt].\n".to_string(),
    )]));
    let detective = Detective::new(retriever, generator.clone(), policy(), 1);

    let answer = detective.ask("What color was the car?", &[]).await.unwrap();

    assert_eq!(answer.kind, AnswerKind::Generated);
    assert_eq!(answer.text, "The car was red [witness_sarah.txt].");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source, "witness_sarah.txt");

    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("SOURCE: witness_sarah.txt"));
    assert!(prompts[0].contains("QUESTION: What color was the car?"));
    assert!(!prompts[0].contains("police_log.txt"));
}

#[tokio::test]
async fn test_empty_store_answers_without_generation() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, Vec::new()).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let detective = Detective::new(retriever, generator.clone(), policy(), 3);

    let answer = detective.ask("Who did it?", &[]).await.unwrap();

    assert_eq!(answer.kind, AnswerKind::NoEvidence);
    assert_eq!(answer.text, INSUFFICIENT_EVIDENCE);
    assert!(answer.sources.is_empty());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generation_rate_limit_becomes_unavailable_answer() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, case_chunks()).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let detective = Detective::new(retriever, generator.clone(), policy(), 2);

    let answer = detective.ask("What was found?", &[]).await.unwrap();

    assert_eq!(answer.kind, AnswerKind::Unavailable);
    assert_eq!(answer.text, UNAVAILABLE_MESSAGE);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_generation_recovers_after_rate_limit() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, case_chunks()).await;
    let generator = Arc::new(ScriptedGenerator::replying(vec![
        Err(GenerationError::RateLimited),
        Ok("A knife [police_log.txt].".to_string()),
    ]));
    let detective = Detective::new(retriever, generator.clone(), policy(), 1);

    let answer = detective.ask("What knife?", &[]).await.unwrap();

    assert_eq!(answer.kind, AnswerKind::Generated);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_other_generation_errors_propagate() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, case_chunks()).await;
    let generator = Arc::new(ScriptedGenerator::replying(vec![Err(GenerationError::Api {
        status: 500,
        body: "boom".to_string(),
    })]));
    let detective = Detective::new(retriever, generator.clone(), policy(), 1);

    assert!(detective.ask("What car?", &[]).await.is_err());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_history_is_passed_through() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, case_chunks()).await;
    let generator = Arc::new(ScriptedGenerator::replying(vec![
        Ok("The car was red [witness_sarah.txt].".to_string()),
        Ok("It was seen by Sarah [witness_sarah.txt].".to_string()),
    ]));
    let detective = Detective::new(retriever, generator.clone(), policy(), 1);
    let mut history = ConversationHistory::new(5);

    let first = detective.ask("What car?", history.turns()).await.unwrap();
    history.record_exchange("What car?", &first.text);
    detective.ask("Who saw the car?", history.turns()).await.unwrap();

    assert_eq!(*generator.history_lengths.lock().unwrap(), vec![0, 2]);
}

#[tokio::test]
async fn test_chat_turn_survives_generation_error() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, case_chunks()).await;
    let generator = Arc::new(ScriptedGenerator::replying(vec![
        Err(GenerationError::Api {
            status: 500,
            body: "internal".to_string(),
        }),
        Ok("The car was red [witness_sarah.txt].".to_string()),
    ]));
    let detective = Detective::new(retriever, generator.clone(), policy(), 1);
    let mut history = ConversationHistory::new(5);

    let failed = detective.converse("What car?", &mut history).await;
    assert_eq!(failed.kind, AnswerKind::Failed);
    assert!(failed.text.starts_with("Error:"));
    assert!(history.is_empty());

    let answered = detective.converse("What car?", &mut history).await;
    assert_eq!(answered.kind, AnswerKind::Generated);
    assert_eq!(
        history.turns(),
        &[
            Turn::user("What car?"),
            Turn::assistant("The car was red [witness_sarah.txt]."),
        ]
    );
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_chat_turn_without_evidence_is_not_recorded() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, Vec::new()).await;
    let detective = Detective::new(
        retriever,
        Arc::new(ScriptedGenerator::default()),
        policy(),
        3,
    );
    let mut history = ConversationHistory::new(5);

    let answer = detective.converse("Who did it?", &mut history).await;

    assert_eq!(answer.kind, AnswerKind::NoEvidence);
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_timeline_extraction() {
    let dir = TempDir::new().unwrap();
    let retriever = built_retriever(&dir, case_chunks()).await;
    let reply = "```json\n[{\"time\": \"2023-10-14 21:00\", \"event\": \"Scream heard\", \"source\": \"witness_sarah.txt\"}]\n```";
    let generator = Arc::new(ScriptedGenerator::replying(vec![
        Ok(reply.to_string()),
        Ok("No events found.".to_string()),
    ]));
    let detective = Detective::new(retriever, generator.clone(), policy(), 3);
    let documents = vec![EvidenceDocument::new(
        "At 21:00 I heard a scream.",
        "witness_sarah.txt",
    )];

    let events = detective
        .extract_timeline(&documents)
        .await
        .unwrap()
        .succeeded()
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "Scream heard");

    let unparseable = detective.extract_timeline(&documents).await.unwrap();
    assert_eq!(unparseable, RetryOutcome::Succeeded(Vec::new()));

    let nothing = detective.extract_timeline(&[]).await.unwrap();
    assert_eq!(nothing, RetryOutcome::Succeeded(Vec::new()));
    assert_eq!(generator.calls(), 2);
}
