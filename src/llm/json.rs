//! Pull JSON out of model output that may be wrapped in markdown or prose.

/// Remove a surrounding fenced code block (```` ```json ... ``` ```` or ```` ``` ... ``` ````).
///
/// Returns the trimmed input unchanged when there is no fence.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip the info string (e.g. `json`) up to the end of the line.
        let body = match after.find('\n') {
            Some(nl) if !after[..nl].trim().contains(['{', '[']) => &after[nl + 1..],
            _ => after,
        };
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    trimmed
}

/// Extract a JSON object from LLM output.
pub fn extract_json_object(text: &str) -> String {
    extract_delimited(text, '{', '}')
}

/// Extract a JSON array from LLM output.
pub fn extract_json_array(text: &str) -> String {
    extract_delimited(text, '[', ']')
}

fn extract_delimited(text: &str, open: char, close: char) -> String {
    let unfenced = strip_code_fence(text);

    if unfenced.starts_with(open) {
        return unfenced.to_string();
    }

    // Try to find bounds
    if let (Some(start), Some(end)) = (unfenced.find(open), unfenced.rfind(close))
        && end > start
    {
        return unfenced[start..=end].to_string();
    }

    unfenced.to_string()
}
