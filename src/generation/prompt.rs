//! Prompt assembly and reply parsing

use super::TimelineEvent;
use crate::ingest::EvidenceDocument;
use crate::retrieval::EvidenceHit;

/// Evidence blocks, each labelled with the file it came from
pub fn format_context(hits: &[EvidenceHit]) -> String {
    hits.iter()
        .map(|hit| format!("SOURCE: {}\nCONTENT: {}", hit.source, hit.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub fn answer_prompt(question: &str, hits: &[EvidenceHit]) -> String {
    format!(
        "You are a detective assistant working a cold case.\n\
         Answer ONLY using the evidence below. Do not invent information.\n\
         Cite the source file for every fact, e.g. [police_log.txt].\n\
         If the evidence does not answer the question, say \"I don't have enough evidence to answer that.\"\n\
         Use the earlier conversation only to resolve follow-up questions.\n\n\
         EVIDENCE:\n{}\n\n\
         QUESTION: {}",
        format_context(hits),
        question
    )
}

pub fn timeline_prompt(documents: &[EvidenceDocument]) -> String {
    let evidence = documents
        .iter()
        .map(|doc| format!("Source: {}\nContent: {}", doc.source, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "Review the following cold case evidence and extract a chronological timeline of events.\n\
         For each event give the timestamp as written in the text, a brief description, and the source file name.\n\n\
         EVIDENCE:\n{}\n\n\
         Respond with ONLY a JSON list sorted oldest to newest, like:\n\
         [{{\"time\": \"2023-10-14 21:00\", \"event\": \"Man in dark hoodie seen running\", \"source\": \"witness_sarah.txt\"}}]",
        evidence
    )
}

/// Parse a timeline reply, tolerating Markdown code fences around the JSON
pub fn parse_timeline(reply: &str) -> Result<Vec<TimelineEvent>, serde_json::Error> {
    let stripped = reply.replace("```json", "").replace("```", "");
    serde_json::from_str(stripped.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, source: &str) -> EvidenceHit {
        EvidenceHit {
            text: text.to_string(),
            source: source.to_string(),
            distance: 0.0,
        }
    }

    #[test]
    fn test_context_cites_sources() {
        let context = format_context(&[
            hit("  The car was red.\n", "witness_sarah.txt"),
            hit("Red paint on fence.", "forensics.txt"),
        ]);

        assert_eq!(
            context,
            "SOURCE: witness_sarah.txt\nCONTENT: The car was red.\n\n---\n\nSOURCE: forensics.txt\nCONTENT: Red paint on fence."
        );
    }

    #[test]
    fn test_answer_prompt_contains_question_and_evidence() {
        let prompt = answer_prompt("What color was the car?", &[hit("Red.", "a.txt")]);
        assert!(prompt.contains("QUESTION: What color was the car?"));
        assert!(prompt.contains("SOURCE: a.txt"));
    }

    #[test]
    fn test_timeline_prompt_lists_every_document() {
        let prompt = timeline_prompt(&[
            EvidenceDocument::new("Body found at 06:00.", "autopsy.txt"),
            EvidenceDocument::new("Scream at 21:00.", "witness.txt"),
        ]);
        assert!(prompt.contains("Source: autopsy.txt"));
        assert!(prompt.contains("Source: witness.txt"));
    }

    #[test]
    fn test_parse_fenced_timeline() {
        let reply = "```json\n[{\"time\": \"2023-10-14 21:00\", \"event\": \"Scream heard\", \"source\": \"witness.txt\"}]\n```";
        let events = parse_timeline(reply).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, "2023-10-14 21:00");
        assert_eq!(events[0].source, "witness.txt");
    }

    #[test]
    fn test_parse_plain_fenced_timeline() {
        let reply = "```\n[{\"time\": \"06:00\", \"event\": \"Body found\", \"source\": \"autopsy.txt\"}]\n```";
        let events = parse_timeline(reply).unwrap();
        assert_eq!(events[0].event, "Body found");
    }

    #[test]
    fn test_parse_bare_timeline() {
        let events = parse_timeline("[]").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_prose_fails() {
        assert!(parse_timeline("Sorry, I cannot do that.").is_err());
    }
}
