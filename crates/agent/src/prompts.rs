//! Prompt templates
//!
//! Every prompt the pipeline sends is assembled here, so wording changes
//! stay in one place.

use task_agent_core::{format_transcript, Turn};

/// Prompt for folding old turns into a running summary.
pub fn summary_prompt(prior_summary: Option<&str>, old_turns: &[Turn]) -> String {
    let mut prompt = String::from(
        "Summarize the following conversation between a user and a task-manager \
         assistant. Keep entity names, ids and unfinished requests. \
         Respond with the summary only.\n\n",
    );
    if let Some(prior) = prior_summary {
        prompt.push_str("Summary so far:\n");
        prompt.push_str(prior);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Conversation:\n");
    prompt.push_str(&format_transcript(old_turns));
    prompt
}

/// One-word quick intent probe.
pub fn quick_intent_prompt(query: &str) -> String {
    format!(
        "Classify this message into exactly one word from: greeting, goodbye, thank, none.\n\
         Message: {}\n\
         Answer with the single word only.",
        query
    )
}

/// Typed classification prompt.
pub fn classification_prompt(query: &str, history: &[Turn]) -> String {
    let mut prompt = String::from(
        "You classify requests to a task-manager assistant.\n\
         Types: create, update, delete, question, search, list, statistics, help, requirements.\n\
         Entities: user, task, team, project.\n\
         A command changes data (\"assign the task to Sara\" is update); a question asks about \
         data (\"when was the task created\" is question).\n\
         Include \"user\" in entities whenever a personal name appears.\n\
         Respond with JSON only: {\"type\": \"...\", \"entities\": [\"...\"]}\n\n",
    );
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&format_transcript(history));
        prompt.push('\n');
    }
    prompt.push_str("Request: ");
    prompt.push_str(query);
    prompt
}

/// Query reformulation prompt.
pub fn reformulation_prompt(query: &str, history: &[Turn]) -> String {
    let mut prompt = String::from(
        "Rewrite the request below as up to 4 short search phrases (2-5 words each), \
         one per line. Keep entity names exactly as written, expand abbreviations, \
         no numbering, no explanations.\n\n",
    );
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&format_transcript(history));
        prompt.push('\n');
    }
    prompt.push_str("Request: ");
    prompt.push_str(query);
    prompt
}

/// Answer generation prompt.
pub fn answer_prompt(query: &str, context: &str, history: &[Turn], instruction: &str) -> String {
    let mut prompt = String::from(
        "You are a task-manager assistant. Answer from the provided context; \
         cite sources with their [n] markers; if the context does not contain \
         the answer, say so plainly.\n\n",
    );
    prompt.push_str("Instruction: ");
    prompt.push_str(instruction);
    prompt.push_str("\n\nContext:\n");
    prompt.push_str(context);
    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        prompt.push_str(&format_transcript(history));
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(query);
    prompt.push_str("\nAnswer:");
    prompt
}

/// Minimal prompt for the shortcut path.
pub fn shortcut_prompt(query: &str, context: &str) -> String {
    format!(
        "Answer briefly from this context.\n\nContext:\n{}\nQuestion: {}\nAnswer:",
        context, query
    )
}

/// User-friendly error rendering prompt.
pub fn error_prompt(query: &str, error: &str) -> String {
    format!(
        "The task-manager assistant hit a problem handling a request.\n\
         Request: {}\n\
         Problem: {}\n\
         Write one or two sentences for the user: apologise briefly, say what went wrong in \
         plain words, and suggest what to try next. No technical jargon.",
        query, error
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prompt_includes_prior() {
        let turns = vec![Turn::user("create a task"), Turn::assistant("Done.")];
        let prompt = summary_prompt(Some("User set up a project."), &turns);
        assert!(prompt.contains("Summary so far:"));
        assert!(prompt.contains("User set up a project."));
        assert!(prompt.contains("user: create a task"));
    }

    #[test]
    fn test_classification_prompt_mentions_rules() {
        let prompt = classification_prompt("assign it to Youssef", &[]);
        assert!(prompt.contains("\"type\""));
        assert!(prompt.contains("personal name"));
    }
}
