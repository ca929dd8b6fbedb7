//! Prompt assembly.
//!
//! The payload is always laid out as rules, then corpus context, then the
//! question. Each segment is fenced by a header carrying its byte length and
//! a closing marker, so a segment that happens to contain another segment's
//! marker still has an unambiguous end. Empty rules or context segments are
//! left out; the question segment is always present.

/// The three inputs of one request, before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub rules: String,
    pub context: String,
    pub user_text: String,
}

pub fn assemble(rules: &str, context: &str, user_text: &str) -> PromptPayload {
    PromptPayload {
        rules: rules.to_string(),
        context: context.to_string(),
        user_text: user_text.to_string(),
    }
}

impl PromptPayload {
    /// Render into the single user message sent to the backend.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.rules.len() + self.context.len() + self.user_text.len() + 128,
        );
        if !self.rules.is_empty() {
            push_segment(&mut out, "RULES", &self.rules);
        }
        if !self.context.is_empty() {
            push_segment(&mut out, "CONTEXT", &self.context);
        }
        push_segment(&mut out, "QUESTION", &self.user_text);
        out
    }
}

fn push_segment(out: &mut String, label: &str, body: &str) {
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push('[');
    out.push_str(label);
    out.push(' ');
    out.push_str(&body.len().to_string());
    out.push_str(" bytes]\n");
    out.push_str(body);
    out.push_str("\n[/");
    out.push_str(label);
    out.push(']');
}
