//! GeminiClient against a local fake of the generateContent endpoint
//!
//! The fake answers from a scripted list of (status, body) pairs and records
//! every request it receives.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use clara_ap::audio::pcm;
use clara_ap::config::GeminiConfig;
use clara_ap::narration::TextSegment;
use clara_ap::synthesis::{DocumentAssistant, GeminiClient, SpeechSynthesizer, SynthesisError, TextExtractor};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct RecordedRequest {
    model: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Default)]
struct FakeGemini {
    responses: Mutex<VecDeque<(StatusCode, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeGemini {
    fn respond(&self, status: StatusCode, body: Value) {
        self.responses.lock().push_back((status, body.to_string()));
    }

    fn respond_raw(&self, status: StatusCode, body: &str) {
        self.responses.lock().push_back((status, body.to_string()));
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

async fn generate_content(
    State(fake): State<Arc<FakeGemini>>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    fake.requests.lock().push(RecordedRequest {
        model,
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    let (status, body) = fake
        .responses
        .lock()
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "no scripted response".to_string()));
    (status, [("content-type", "application/json")], body)
}

async fn start_fake() -> (Arc<FakeGemini>, GeminiClient) {
    let fake = Arc::new(FakeGemini::default());
    let app = Router::new()
        .route("/v1beta/models/:model", post(generate_content))
        .with_state(Arc::clone(&fake));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = GeminiConfig {
        base_url: format!("http://{}", addr),
        ..GeminiConfig::default()
    };
    let client = GeminiClient::new(config, Some("test-key".to_string())).unwrap();
    (fake, client)
}

fn text_answer(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

#[tokio::test]
async fn test_synthesize_sends_voice_and_returns_payload() {
    let (fake, client) = start_fake().await;
    let audio = pcm::encode_samples(&[0.0, 0.5, -0.5]);
    fake.respond(
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [
            { "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": audio.as_str() } }
        ] } }] }),
    );

    let payload = client.synthesize(&TextSegment::new(0, "Hola amigo.")).await.unwrap();
    assert_eq!(payload.as_str(), audio.as_str());
    assert_eq!(pcm::decode(&payload).unwrap().sample_count(), 3);

    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.model, "gemini-2.5-flash-preview-tts:generateContent");
    assert_eq!(request.api_key.as_deref(), Some("test-key"));
    assert_eq!(request.body["generationConfig"]["responseModalities"][0], "AUDIO");
    assert_eq!(
        request.body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Kore"
    );
    let spoken = request.body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(spoken.starts_with("Lee con voz clara y amigable: "));
    assert!(spoken.ends_with("Hola amigo."));
}

#[tokio::test]
async fn test_synthesize_error_mapping() {
    let (fake, client) = start_fake().await;
    let segment = TextSegment::new(0, "Hola amigo.");

    fake.respond_raw(StatusCode::TOO_MANY_REQUESTS, "quota exhausted");
    assert!(matches!(client.synthesize(&segment).await, Err(SynthesisError::Quota(_))));

    fake.respond_raw(StatusCode::INTERNAL_SERVER_ERROR, "backend down");
    assert!(matches!(
        client.synthesize(&segment).await,
        Err(SynthesisError::Service { status: 500, .. })
    ));

    fake.respond_raw(StatusCode::OK, "not json");
    assert!(matches!(
        client.synthesize(&segment).await,
        Err(SynthesisError::MalformedResponse(_))
    ));

    fake.respond(StatusCode::OK, text_answer("I cannot speak"));
    assert_eq!(client.synthesize(&segment).await, Err(SynthesisError::EmptyAudio));
}

#[tokio::test]
async fn test_extract_text_trims_and_rejects_illegible() {
    let (fake, client) = start_fake().await;

    fake.respond(StatusCode::OK, text_answer("\n  Érase una vez un castillo.  \n"));
    let text = client.extract_text(b"%PDF-1.7", "application/pdf").await.unwrap();
    assert_eq!(text, "Érase una vez un castillo.");

    let requests = fake.requests();
    let request = &requests[0];
    assert_eq!(request.model, "gemini-3-flash-preview:generateContent");
    assert_eq!(request.body["contents"][0]["parts"][0]["inlineData"]["mimeType"], "application/pdf");
    assert_eq!(request.body["contents"][0]["parts"][0]["inlineData"]["data"], "JVBERi0xLjc=");

    fake.respond(StatusCode::OK, text_answer(" ok "));
    assert_eq!(
        client.extract_text(b"\x89PNG", "image/png").await,
        Err(SynthesisError::NoLegibleText)
    );
}

#[tokio::test]
async fn test_questions_fall_back_on_unparsable_answer() {
    let (fake, client) = start_fake().await;

    fake.respond(StatusCode::OK, text_answer(r#"["¿Quién?","¿Dónde?","¿Cuándo?"]"#));
    let questions = client.suggest_questions("Un cuento.").await.unwrap();
    assert_eq!(questions, vec!["¿Quién?", "¿Dónde?", "¿Cuándo?"]);

    fake.respond(StatusCode::OK, text_answer("Aquí tienes tres preguntas"));
    let questions = client.suggest_questions("Un cuento.").await.unwrap();
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[0], "¿De qué trata la historia?");

    let requests = fake.requests();
    let request = &requests[0];
    assert_eq!(request.body["generationConfig"]["responseMimeType"], "application/json");
}

#[tokio::test]
async fn test_question_context_is_truncated() {
    let (fake, client) = start_fake().await;
    fake.respond(StatusCode::OK, text_answer("[]"));

    let long_text = "ж".repeat(5000);
    client.suggest_questions(&long_text).await.unwrap();

    let prompt = fake.requests()[0].body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(prompt.chars().filter(|c| *c == 'ж').count(), 2000);
}

#[tokio::test]
async fn test_comic_scenes_are_parsed() {
    let (fake, client) = start_fake().await;
    fake.respond(
        StatusCode::OK,
        text_answer(r#"[{"description":"Un dragón vuela","keywords":["dragón","cielo"]}]"#),
    );

    let scenes = client.comic_scenes("El dragón.").await.unwrap();
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].description, "Un dragón vuela");
    assert_eq!(scenes[0].keywords, vec!["dragón", "cielo"]);

    fake.respond(StatusCode::OK, text_answer("no es json"));
    assert!(matches!(
        client.comic_scenes("El dragón.").await,
        Err(SynthesisError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_chat_and_video_prompt_fallbacks() {
    let (fake, client) = start_fake().await;

    fake.respond(StatusCode::OK, text_answer("Porque el gato tenía hambre."));
    let reply = client.chat("Un gato.", "¿Por qué maúlla?").await.unwrap();
    assert_eq!(reply, "Porque el gato tenía hambre.");
    let requests = fake.requests();
    let request = &requests[0];
    let instruction = request.body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(instruction.starts_with("Eres Claramente"));
    assert_eq!(request.body["contents"][0]["parts"][0]["text"], "¿Por qué maúlla?");

    fake.respond(StatusCode::OK, json!({ "candidates": [] }));
    let reply = client.chat("Un gato.", "¿Y ahora?").await.unwrap();
    assert_eq!(reply, "¡Ups! Me distraje. ¿Me lo preguntas otra vez?");

    fake.respond(StatusCode::OK, json!({}));
    let prompt = client.video_prompt("Un gato.").await.unwrap();
    assert_eq!(prompt, "Una aventura mágica animada.");
}
