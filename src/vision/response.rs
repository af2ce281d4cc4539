//! Decoding text out of a flow run response.
//!
//! A run response nests one result per output component under
//! `outputs[0].outputs[0]`. The text can sit in one of two places, listed
//! in [`ACCEPTED_SHAPES`] in order of preference:
//!
//! | shape        | path (relative to the component)  |
//! |--------------|-----------------------------------|
//! | `ChatOutput` | `outputs.message.message`         |
//! | `ResultTree` | `results.message.text`            |
//!
//! Anything else yields no text.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    ChatOutput,
    ResultTree,
}

pub const ACCEPTED_SHAPES: [ResponseShape; 2] = [ResponseShape::ChatOutput, ResponseShape::ResultTree];

/// Text recovered from a run response, tagged with the shape it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowText {
    pub shape: ResponseShape,
    pub text: String,
}

#[derive(Deserialize)]
struct ChatOutputShape {
    outputs: ChatOutputs,
}

#[derive(Deserialize)]
struct ChatOutputs {
    message: ChatEnvelope,
}

#[derive(Deserialize)]
struct ChatEnvelope {
    message: String,
}

#[derive(Deserialize)]
struct ResultTreeShape {
    results: ResultTree,
}

#[derive(Deserialize)]
struct ResultTree {
    message: ResultMessage,
}

#[derive(Deserialize)]
struct ResultMessage {
    text: String,
}

impl ResponseShape {
    fn decode(self, component: &Value) -> Option<String> {
        let text = match self {
            ResponseShape::ChatOutput => {
                ChatOutputShape::deserialize(component).ok()?.outputs.message.message
            }
            ResponseShape::ResultTree => {
                ResultTreeShape::deserialize(component).ok()?.results.message.text
            }
        };
        Some(text).filter(|t| !t.trim().is_empty())
    }
}

/// First non-empty text found by trying each accepted shape in order.
pub fn extract_text(body: &Value) -> Option<FlowText> {
    let component = body.pointer("/outputs/0/outputs/0")?;
    ACCEPTED_SHAPES.iter().find_map(|&shape| {
        shape
            .decode(component)
            .map(|text| FlowText { shape, text })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(component: Value) -> Value {
        json!({ "session_id": "s1", "outputs": [{ "inputs": {}, "outputs": [component] }] })
    }

    #[test]
    fn test_chat_output_shape() {
        let body = wrap(json!({ "outputs": { "message": { "message": "A snarling goblin." } } }));
        assert_eq!(
            extract_text(&body),
            Some(FlowText {
                shape: ResponseShape::ChatOutput,
                text: "A snarling goblin.".to_string(),
            })
        );
    }

    #[test]
    fn test_result_tree_fallback() {
        let body = wrap(json!({
            "outputs": { "message": { "type": "object" } },
            "results": { "message": { "text": "An owlbear in a forest.", "sender": "Machine" } }
        }));
        let found = extract_text(&body).unwrap();
        assert_eq!(found.shape, ResponseShape::ResultTree);
        assert_eq!(found.text, "An owlbear in a forest.");
    }

    #[test]
    fn test_chat_output_preferred_over_result_tree() {
        let body = wrap(json!({
            "outputs": { "message": { "message": "first" } },
            "results": { "message": { "text": "second" } }
        }));
        assert_eq!(extract_text(&body).unwrap().shape, ResponseShape::ChatOutput);
    }

    #[test]
    fn test_empty_text_falls_through() {
        let body = wrap(json!({
            "outputs": { "message": { "message": "  " } },
            "results": { "message": { "text": "" } }
        }));
        assert_eq!(extract_text(&body), None);
    }

    #[test]
    fn test_unrecognized_shapes() {
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_text(&json!({ "outputs": [] })), None);
        assert_eq!(extract_text(&wrap(json!({ "artifacts": {} }))), None);
        assert_eq!(
            extract_text(&wrap(json!({ "results": { "message": { "text": 42 } } }))),
            None
        );
    }
}
