//! Gemini REST client
//!
//! All calls go through `models/{model}:generateContent`. Speech comes back
//! as inline base64 PCM; structured answers (questions, summaries, comic
//! scenes) are requested as JSON through a response schema.

use crate::audio::types::EncodedAudioPayload;
use crate::config::GeminiConfig;
use crate::narration::segmenter::TextSegment;
use crate::synthesis::{ComicScene, DocumentAssistant, SpeechSynthesizer, SynthesisError, TextExtractor};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT: &str = concat!("claramente/", env!("CARGO_PKG_VERSION"));

/// Shortest transcription accepted as real text
const MIN_EXTRACTED_CHARS: usize = 5;

/// Source text sent for question suggestions is cut to this many characters
const QUESTION_CONTEXT_CHARS: usize = 2000;

/// Source text sent for a video prompt is cut to this many characters
const VIDEO_CONTEXT_CHARS: usize = 1000;

const EXTRACTION_PROMPT: &str = "ACTÚA COMO UN EXPERTO EN TRANSCRIPCIÓN DE ALTA FIDELIDAD.
Tu tarea es extraer TODO el texto visible en este archivo (PDF o Imagen).

REGLAS CRÍTICAS:
1. Transcribe de forma LITERAL cada palabra.
2. Mantén la estructura de párrafos y títulos.
3. No resumas, no expliques y no omitas diálogos.
4. Ignora elementos decorativos o descripciones de imágenes, solo extrae el TEXTO escrito.
5. Si el texto está en columnas o alrededor de imágenes, ordénalo de forma lógica para la lectura.

Responde ÚNICAMENTE con el texto extraído.";

const FALLBACK_QUESTIONS: [&str; 3] = [
    "¿De qué trata la historia?",
    "¿Quiénes son los personajes?",
    "¿Qué pasó al final?",
];

const FALLBACK_SUMMARY: &str = "Estamos preparando tu resumen mágico...";

const FALLBACK_CHAT_REPLY: &str = "¡Ups! Me distraje. ¿Me lo preguntas otra vez?";

const FALLBACK_VIDEO_PROMPT: &str = "Una aventura mágica animada.";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter())
            .into_iter()
            .flatten()
    }

    /// First inline payload of the first candidate
    fn inline_data(&self) -> Option<&str> {
        self.parts()
            .find_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.as_str())
    }

    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn string_array_schema() -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" } })
}

// ============================================================================
// Client
// ============================================================================

/// Gemini API client
pub struct GeminiClient {
    http_client: reqwest::Client,
    config: GeminiConfig,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, api_key: Option<String>) -> Result<Self, SynthesisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| SynthesisError::Network(e.to_string()))?;

        Ok(Self { http_client, config, api_key })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate(&self, model: &str, body: Value) -> Result<GenerateContentResponse, SynthesisError> {
        let api_key = self.api_key.as_deref().ok_or(SynthesisError::MissingApiKey)?;

        tracing::debug!(model = model, "Calling Gemini generateContent");

        let response = self
            .http_client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Quota(error_text));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Service {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| SynthesisError::MalformedResponse(e.to_string()))
    }

    /// Ask for JSON matching `schema`; returns the raw answer text
    async fn generate_json(&self, prompt: String, schema: Value) -> Result<Option<String>, SynthesisError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            }
        });
        let response = self.generate(&self.config.text_model, body).await?;
        Ok(response.text())
    }

    /// Speak one piece of text with the configured voice
    pub async fn speak(&self, text: &str) -> Result<EncodedAudioPayload, SynthesisError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("{}{}", self.config.speech_prompt, text) }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.config.voice }
                    }
                }
            }
        });

        let response = self.generate(&self.config.tts_model, body).await?;
        match response.inline_data() {
            Some(data) if !data.trim().is_empty() => Ok(EncodedAudioPayload::new(data)),
            _ => Err(SynthesisError::EmptyAudio),
        }
    }

    /// Literal transcription of a document image or PDF
    pub async fn transcribe(&self, data: &[u8], mime_type: &str) -> Result<String, SynthesisError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "data": STANDARD.encode(data), "mimeType": mime_type } },
                    { "text": EXTRACTION_PROMPT }
                ]
            }]
        });

        let response = self.generate(&self.config.text_model, body).await?;
        let text = response.text().unwrap_or_default();
        let text = text.trim();
        if text.chars().count() < MIN_EXTRACTED_CHARS {
            return Err(SynthesisError::NoLegibleText);
        }

        tracing::info!(chars = text.chars().count(), mime_type, "Document transcribed");
        Ok(text.to_string())
    }

    /// Three short questions a child might ask about the text
    async fn questions(&self, text: &str) -> Result<Vec<String>, SynthesisError> {
        let prompt = format!(
            "Basándote en este texto, genera 3 preguntas cortas que un niño podría hacer para entender mejor. Responde solo con un array JSON de strings:\n\n{}",
            truncate_chars(text, QUESTION_CONTEXT_CHARS)
        );
        let answer = self.generate_json(prompt, string_array_schema()).await?;
        Ok(parse_string_list(answer.as_deref(), || {
            FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect()
        }))
    }

    /// Three very simple key points
    async fn summary(&self, text: &str) -> Result<Vec<String>, SynthesisError> {
        let prompt = format!(
            "Resume este texto en 3 puntos clave muy sencillos para un niño pequeño. Responde con un array JSON de strings:\n\n{}",
            text
        );
        let answer = self.generate_json(prompt, string_array_schema()).await?;
        Ok(parse_string_list(answer.as_deref(), || vec![FALLBACK_SUMMARY.to_string()]))
    }

    /// Four visual scenes for the comic-strip view
    async fn scenes(&self, text: &str) -> Result<Vec<ComicScene>, SynthesisError> {
        let prompt = format!(
            "Divide este texto en 4 escenas clave para un cómic infantil. Describe cada escena visualmente.\n\nTexto: {}",
            text
        );
        let schema = json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "description": { "type": "STRING" },
                    "keywords": { "type": "ARRAY", "items": { "type": "STRING" } }
                },
                "required": ["description", "keywords"]
            }
        });

        match self.generate_json(prompt, schema).await? {
            None => Ok(Vec::new()),
            Some(answer) => serde_json::from_str(&answer)
                .map_err(|e| SynthesisError::MalformedResponse(format!("comic scenes: {}", e))),
        }
    }

    /// Answer a question about the document as a patient tutor
    async fn tutor_reply(&self, document: &str, message: &str) -> Result<String, SynthesisError> {
        let body = json!({
            "systemInstruction": {
                "parts": [{
                    "text": format!(
                        "Eres Claramente, un tutor experto en explicar textos a niños. Tu estilo es divertido, paciente y usas analogías simples. Texto de referencia: \"{}\"",
                        document
                    )
                }]
            },
            "contents": [{ "role": "user", "parts": [{ "text": message }] }]
        });

        let response = self.generate(&self.config.text_model, body).await?;
        Ok(response.text().unwrap_or_else(|| FALLBACK_CHAT_REPLY.to_string()))
    }

    /// Visual prompt for an animated retelling of the text
    async fn animation_prompt(&self, text: &str) -> Result<String, SynthesisError> {
        let prompt = format!(
            "Crea un prompt visual de animación 3D para un video basado en esta historia: {}",
            truncate_chars(text, VIDEO_CONTEXT_CHARS)
        );
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let response = self.generate(&self.config.text_model, body).await?;
        Ok(response.text().unwrap_or_else(|| FALLBACK_VIDEO_PROMPT.to_string()))
    }
}

fn parse_string_list(answer: Option<&str>, fallback: impl FnOnce() -> Vec<String>) -> Vec<String> {
    match answer.map(serde_json::from_str::<Vec<String>>) {
        Some(Ok(items)) => items,
        None => Vec::new(),
        Some(Err(e)) => {
            tracing::warn!("Model answer was not a JSON string array, using fallback: {}", e);
            fallback()
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, segment: &TextSegment) -> Result<EncodedAudioPayload, SynthesisError> {
        let payload = self.speak(&segment.text).await?;
        tracing::debug!(segment_index = segment.index, bytes = payload.len(), "Segment synthesized");
        Ok(payload)
    }
}

#[async_trait]
impl TextExtractor for GeminiClient {
    async fn extract_text(&self, data: &[u8], mime_type: &str) -> Result<String, SynthesisError> {
        self.transcribe(data, mime_type).await
    }
}

#[async_trait]
impl DocumentAssistant for GeminiClient {
    async fn suggest_questions(&self, text: &str) -> Result<Vec<String>, SynthesisError> {
        self.questions(text).await
    }

    async fn simple_summary(&self, text: &str) -> Result<Vec<String>, SynthesisError> {
        self.summary(text).await
    }

    async fn comic_scenes(&self, text: &str) -> Result<Vec<ComicScene>, SynthesisError> {
        self.scenes(text).await
    }

    async fn chat(&self, document: &str, message: &str) -> Result<String, SynthesisError> {
        self.tutor_reply(document, message).await
    }

    async fn video_prompt(&self, text: &str) -> Result<String, SynthesisError> {
        self.animation_prompt(text).await
    }
}
