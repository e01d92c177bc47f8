/// Longest excerpt of the inbound text quoted back in a reply.
const EXCERPT_CHARS: usize = 120;

/// Acknowledgement sent on an autonomous verdict, quoting the request.
pub fn acknowledgement(text: &str) -> String {
    format!(
        "Thanks for reaching out! We received your message (\"{}\") and will follow up here shortly.",
        excerpt(text, EXCERPT_CHARS)
    )
}

/// Whitespace-collapsed prefix of `text`, at most `max_chars` characters.
fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str("...");
    cut
}
