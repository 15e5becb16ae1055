//! Typed view of the import document and its embedded card lists.
//!
//! The document envelope keeps every key it does not understand, so posts,
//! metadata and unknown card kinds all round-trip verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("invalid card-list JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("card-list document is not a JSON object")]
    NotAnObject,
    #[error("cards entry is not a JSON array")]
    CardsNotAnArray,
    #[error("card is not a two-element [kind, payload] array")]
    MalformedCard,
}

/// Whole import/export document. Everything outside `data.posts` is
/// passthrough metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub data: DocumentData,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentData {
    pub posts: Vec<Post>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique URL-safe identifier, also a local-cache path component.
    pub slug: String,
    /// Creation timestamp in epoch milliseconds.
    pub created_at: i64,
    /// Embedded card-list document, stored as a JSON string.
    pub mobiledoc: String,
    /// Set by the pipeline when the post has at least one image card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_image: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// One element of a post body's ordered content list.
///
/// Only `Image` cards participate in localization; everything else,
/// including an `image` card whose payload carries no usable `src`, passes
/// through byte-identical.
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    Image(ImageCard),
    Other { kind: String, payload: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageCard {
    pub src: String,
    /// Payload keys other than `src`, preserved verbatim.
    rest: Map<String, Value>,
}

const IMAGE_KIND: &str = "image";
const SRC_KEY: &str = "src";

impl ImageCard {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            rest: Map::new(),
        }
    }

    /// Advisory render width carried by the card, if any.
    pub fn width_hint(&self) -> Option<u64> {
        self.rest.get("width").and_then(Value::as_u64)
    }
}

impl Card {
    pub fn from_value(value: Value) -> Result<Self, CardError> {
        let Value::Array(parts) = value else {
            return Err(CardError::MalformedCard);
        };
        let mut parts = parts.into_iter();
        let (Some(kind_value), Some(payload), None) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CardError::MalformedCard);
        };
        let Value::String(kind) = kind_value else {
            return Err(CardError::MalformedCard);
        };

        if kind != IMAGE_KIND {
            return Ok(Card::Other { kind, payload });
        }
        Ok(match payload {
            Value::Object(mut rest) => match rest.remove(SRC_KEY) {
                Some(Value::String(src)) => Card::Image(ImageCard { src, rest }),
                Some(other) => {
                    // Non-string src: nothing we can localize, keep verbatim.
                    rest.insert(SRC_KEY.to_string(), other);
                    Card::Other {
                        kind,
                        payload: Value::Object(rest),
                    }
                }
                None => Card::Other {
                    kind,
                    payload: Value::Object(rest),
                },
            },
            payload => Card::Other { kind, payload },
        })
    }

    pub fn into_value(self) -> Value {
        match self {
            Card::Image(ImageCard { src, mut rest }) => {
                rest.insert(SRC_KEY.to_string(), Value::String(src));
                Value::Array(vec![
                    Value::String(IMAGE_KIND.to_string()),
                    Value::Object(rest),
                ])
            }
            Card::Other { kind, payload } => {
                Value::Array(vec![Value::String(kind), payload])
            }
        }
    }
}

/// Parsed card-list document: the `cards` array typed, everything else
/// (`version`, `atoms`, `markups`, `sections`, ...) carried verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Mobiledoc {
    pub cards: Vec<Card>,
    /// Whether the source document carried a `cards` array; a document
    /// without one must render without one.
    has_cards_key: bool,
    rest: Map<String, Value>,
}

impl Mobiledoc {
    pub fn parse(raw: &str) -> Result<Self, CardError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut fields) = value else {
            return Err(CardError::NotAnObject);
        };

        let (cards, has_cards_key) = match fields.remove("cards") {
            None => (Vec::new(), false),
            Some(Value::Null) => {
                // An explicit null stays an explicit null.
                fields.insert("cards".to_string(), Value::Null);
                (Vec::new(), false)
            }
            Some(Value::Array(raw_cards)) => (
                raw_cards
                    .into_iter()
                    .map(Card::from_value)
                    .collect::<Result<_, _>>()?,
                true,
            ),
            Some(_) => return Err(CardError::CardsNotAnArray),
        };

        Ok(Self {
            cards,
            has_cards_key,
            rest: fields,
        })
    }

    /// Serializes back to the embedded-document string form.
    pub fn render(&self) -> Result<String, CardError> {
        let mut fields = self.rest.clone();
        if self.has_cards_key || !self.cards.is_empty() {
            fields.insert(
                "cards".to_string(),
                Value::Array(self.cards.iter().cloned().map(Card::into_value).collect()),
            );
        }
        Ok(serde_json::to_string(&Value::Object(fields))?)
    }
}
