use crate::models::ChatMessage;
use std::collections::HashMap;

/// Counts how many messages in the batch mention each option.
///
/// A message votes for every option whose identifier appears anywhere in its
/// text, and at most once per option. Options nobody mentioned are left out
/// of the result.
pub fn tally(messages: &[ChatMessage], active_options: &[String]) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();

    for msg in messages {
        for option in active_options {
            if msg.text.contains(option.as_str()) {
                *counts.entry(option.clone()).or_insert(0) += 1;
            }
        }
    }

    counts
}
