//! Built-in result transformers.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{context::ToolContext, error::McpResult, pipeline::ResultTransformer};

/// Truncates text longer than `max_chars` characters.
///
/// String fields of the structured result are cut individually and the
/// matching JSON text block is re-rendered, so it stays valid JSON. Other text
/// blocks are cut directly.
#[derive(Debug, Clone, Copy)]
pub struct TextLimitTransformer {
    max_chars: usize,
}

impl TextLimitTransformer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    fn truncate(&self, text: &str) -> Option<String> {
        let total = text.chars().count();
        if total <= self.max_chars {
            return None;
        }
        let kept: String = text.chars().take(self.max_chars).collect();
        Some(format!(
            "{kept}\n... [truncated {} characters]",
            total - self.max_chars
        ))
    }

    /// Truncate every string leaf in place. Returns whether anything changed.
    fn truncate_strings(&self, value: &mut Value) -> bool {
        match value {
            Value::String(text) => match self.truncate(text) {
                Some(cut) => {
                    *text = cut;
                    true
                }
                None => false,
            },
            Value::Array(items) => items
                .iter_mut()
                .fold(false, |changed, item| self.truncate_strings(item) | changed),
            Value::Object(fields) => fields
                .values_mut()
                .fold(false, |changed, item| self.truncate_strings(item) | changed),
            _ => false,
        }
    }
}

#[async_trait]
impl ResultTransformer for TextLimitTransformer {
    fn name(&self) -> &str {
        "text_limit"
    }

    async fn transform(
        &self,
        _ct: &CancellationToken,
        _ctx: &ToolContext,
        mut result: CallToolResult,
    ) -> McpResult<CallToolResult> {
        let rendered = match result.structured_content.as_mut() {
            Some(value) => {
                let original = value.to_string();
                if self.truncate_strings(value) {
                    let rendered = value.to_string();
                    for block in result.content.iter_mut() {
                        if block.as_text().is_some_and(|t| t.text == original) {
                            *block = Content::text(rendered.clone());
                        }
                    }
                    Some(rendered)
                } else {
                    Some(original)
                }
            }
            None => None,
        };

        for block in result.content.iter_mut() {
            let truncated = block
                .as_text()
                .filter(|t| rendered.as_deref() != Some(t.text.as_str()))
                .and_then(|t| self.truncate(&t.text));
            if let Some(text) = truncated {
                *block = Content::text(text);
            }
        }
        Ok(result)
    }
}
