use taskwarden_core::types::ResponseItem;

const TRACE_WIDTH: usize = 30;

/// Shorten `input` to the trace width, or `"none"` when empty.
pub fn truncate(input: &str) -> String {
    if input.is_empty() {
        return "none".to_string();
    }
    if input.chars().count() > TRACE_WIDTH {
        let head: String = input.chars().take(TRACE_WIDTH).collect();
        format!("{}...", head)
    } else {
        input.to_string()
    }
}

/// One line of the agent-thinking trace.
pub fn format_item(item: &ResponseItem) -> String {
    match item {
        ResponseItem::Text { text } => format!("[TextContent] ({})", truncate(text)),
        ResponseItem::OperationCall { name } => format!("[FunctionCallContent] [{}]", name),
        ResponseItem::OperationResult { content, .. } => {
            format!("[FunctionResultContent] ({})", truncate(content))
        }
    }
}

/// Every item on its own line, newline-terminated.
pub fn format_trace(items: &[ResponseItem]) -> String {
    items
        .iter()
        .map(|item| format!("{}\n", format_item(item)))
        .collect()
}
