use serde_json::Value;

use crate::ai::dto::{
    ChatCompletionRequest, ChatMessage, ContentPart, ImageUrl, MessageContent, ResponseFormat, Role,
};
use crate::ai::{Provider, ProviderSettings};
use crate::error::AppError;
use crate::models::GenerateTodosRequest;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts todo items from the user's input, \
which may be free text or a photo or screenshot of a note.
Extract every actionable todo item, in the order it appears.
Return ONLY a JSON object with a key \"todos\" whose value is an array of strings, one todo title per string.
Keep each title in the original language of the input.
If there is nothing to do, return {\"todos\": []}.
Example: {\"todos\": [\"Buy milk\", \"Walk the dog\"]}
Do not include any markdown formatting or explanation.";

pub const DEFAULT_IMAGE_PROMPT: &str = "Extract the todo items from this image.";

const DEFAULT_INLINE_MIME: &str = "image/jpeg";

/// Image reference handed to the vision model.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    /// `data:` URL carrying the image bytes.
    Inline(String),
    Remote(String),
}

impl ImageSource {
    pub fn url(&self) -> &str {
        match self {
            ImageSource::Inline(url) | ImageSource::Remote(url) => url,
        }
    }
}

/// A validated generate request.
#[derive(Clone, Debug)]
pub struct ExtractionInput {
    pub user_id: String,
    pub text: Option<String>,
    pub image: Option<ImageSource>,
    /// Public URL of the uploaded source image, if the caller stored one.
    pub image_url: Option<String>,
}

impl ExtractionInput {
    pub fn from_request(req: GenerateTodosRequest) -> Result<Self, AppError> {
        let user_id = non_blank(req.user_id);
        let text = non_blank(req.text);
        let image_url = non_blank(req.image_url);
        let base64_image = non_blank(req.base64_image);

        let Some(user_id) = user_id else {
            return Err(AppError::BadRequest("userId is required".to_string()));
        };
        if text.is_none() && image_url.is_none() && base64_image.is_none() {
            return Err(AppError::BadRequest(
                "Text or image is required".to_string(),
            ));
        }

        // Inline data wins so the provider never has to fetch the image itself.
        let image = match (base64_image, &image_url) {
            (Some(data), _) => Some(ImageSource::Inline(as_data_url(data))),
            (None, Some(url)) => Some(ImageSource::Remote(url.clone())),
            (None, None) => None,
        };

        Ok(Self {
            user_id,
            text,
            image,
            image_url,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn as_data_url(data: String) -> String {
    if data.starts_with("data:") {
        data
    } else {
        format!("data:{};base64,{}", DEFAULT_INLINE_MIME, data.trim())
    }
}

impl Provider {
    /// Builds the user turn in the shape this provider accepts.
    pub fn user_turn(&self, input: &ExtractionInput) -> MessageContent {
        match (self, &input.image) {
            (Provider::Vision, Some(image)) => {
                let text = input
                    .text
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_PROMPT.to_string());
                MessageContent::Parts(vec![
                    ContentPart::Text { text },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.url().to_string(),
                        },
                    },
                ])
            }
            _ => MessageContent::Text(input.text.clone().unwrap_or_default()),
        }
    }
}

pub fn build_request(
    provider: Provider,
    settings: &ProviderSettings,
    input: &ExtractionInput,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: settings.model.clone(),
        messages: vec![
            ChatMessage {
                role: Role::System,
                content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: Role::User,
                content: provider.user_turn(input),
            },
        ],
        response_format: ResponseFormat::json_object(),
    }
}

/// Outcome of reading the model's reply.
#[derive(Clone, Debug, PartialEq)]
pub enum Extraction {
    Todos(Vec<String>),
    Nothing,
}

pub fn parse_reply(content: Option<&str>) -> Result<Extraction, AppError> {
    let content = match content.map(str::trim) {
        Some(c) if !c.is_empty() => c,
        _ => return Err(AppError::EmptyAiResponse),
    };

    let parsed: Value = serde_json::from_str(content)
        .map_err(|e| AppError::InvalidAiResponse(e.to_string()))?;

    let titles: Vec<String> = match parsed.get("todos") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    if titles.is_empty() {
        Ok(Extraction::Nothing)
    } else {
        Ok(Extraction::Todos(titles))
    }
}
