//! Prompt builders for the research loop.
//!
//! The turn protocol mirrors the one the loop actually executes: plan →
//! search → summarize → answer sub-questions → attempt the main question.
//! Every prompt tells the model to rely only on gathered material, never its
//! own prior knowledge — the assistant's value is traceable evidence, not
//! recall.

use crate::memory::ScoredChunk;

/// System prompt for the phase-1 planning call.
pub fn planning_prompt(
    question: &str,
    context: &[String],
    sub_questions: &[String],
    findings: &[String],
    turn: u32,
    max_turns: u32,
    web_search_available: bool,
) -> String {
    let mut p = String::new();
    p.push_str(&format!(
        "You are a research assistant answering the research question: {question}. "
    ));
    p.push_str(
        "You must NOT answer from your own knowledge; only material gathered during this session counts as evidence. ",
    );
    if !context.is_empty() {
        p.push_str(&format!("The user provided additional context: {context:?}. "));
    }
    if !sub_questions.is_empty() {
        p.push_str(&format!("Your current sub-questions: {sub_questions:?}. "));
    }
    if !findings.is_empty() {
        p.push_str(&format!("Findings so far: {findings:?}. "));
    }
    p.push_str(&format!(
        "Research proceeds in turns; you are in turn {turn} of at most {max_turns}. Each turn: \
         1. Refine sub-questions relevant to the research question. \
         2. Decide whether a web search would help you phrase a better academic query"
    ));
    if !web_search_available {
        p.push_str(" (web search is unavailable this session, so set it false)");
    }
    p.push_str(
        ". 3. Write one query for a database of academic papers. \
         Respond with ONLY a JSON object, no prose, in exactly this shape: \
         {\"sub_questions\": [list of strings], \"web_search\": boolean, \
         \"web_query\": string, \"paper_query\": string}.",
    );
    p
}

/// Prompt asking the model to fold the turn's evidence into a summary.
pub fn summarize_prompt(question: &str, evidence: &[ScoredChunk]) -> String {
    let mut p = format!(
        "Summarize what the following material contributes toward answering: {question}. \
         Use only this material. Be concise and cite paper titles where relevant.\n\n"
    );
    push_evidence(&mut p, evidence);
    p
}

/// Prompt asking the model to answer open sub-questions from the evidence.
pub fn sub_questions_prompt(
    question: &str,
    open_sub_questions: &[String],
    evidence: &[ScoredChunk],
) -> String {
    let mut p = format!(
        "The main research question is: {question}. Using ONLY the material below, \
         answer each sub-question you now can; say \"unknown\" for the rest. \
         Answer as a numbered list matching the sub-question order.\n\nSub-questions:\n"
    );
    for (i, sq) in open_sub_questions.iter().enumerate() {
        p.push_str(&format!("{}. {sq}\n", i + 1));
    }
    p.push('\n');
    push_evidence(&mut p, evidence);
    p
}

/// Prompt asking for the main-question verdict as JSON.
pub fn main_answer_prompt(
    question: &str,
    findings: &[String],
    sub_answers: &[(String, String)],
) -> String {
    let mut p = format!(
        "The research question is: {question}. Decide whether the gathered findings \
         are sufficient to answer it. Use ONLY the findings and sub-question answers below.\n\nFindings:\n"
    );
    for f in findings {
        p.push_str(&format!("- {f}\n"));
    }
    if !sub_answers.is_empty() {
        p.push_str("\nSub-question answers:\n");
        for (q, a) in sub_answers {
            p.push_str(&format!("- {q}: {a}\n"));
        }
    }
    p.push_str(
        "\nRespond with ONLY a JSON object, no prose: \
         {\"answered\": boolean, \"answer\": string}. \
         Set answered=false with an empty answer if the evidence is insufficient.",
    );
    p
}

/// Prompt for the closing summary once the loop has stopped.
pub fn final_summary_prompt(question: &str, findings: &[String], answer: Option<&str>) -> String {
    let mut p = format!(
        "Write a short literature-review style summary answering: {question}.\n\nFindings:\n"
    );
    for f in findings {
        p.push_str(&format!("- {f}\n"));
    }
    match answer {
        Some(a) => p.push_str(&format!("\nConcluded answer: {a}\n")),
        None => p.push_str(
            "\nNo conclusive answer was reached; state clearly what remains open.\n",
        ),
    }
    p.push_str("Use only the findings above.");
    p
}

fn push_evidence(out: &mut String, evidence: &[ScoredChunk]) {
    out.push_str("Material:\n");
    for (i, sc) in evidence.iter().enumerate() {
        out.push_str(&format!(
            "[{}] ({} — {})\n{}\n\n",
            i + 1,
            sc.paper.title,
            sc.paper.source,
            sc.chunk.text
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planning_prompt_carries_question_and_contract() {
        let p = planning_prompt("why is the sky blue?", &[], &[], &[], 1, 8, true);
        assert!(p.contains("why is the sky blue?"));
        assert!(p.contains("\"sub_questions\""));
        assert!(p.contains("\"paper_query\""));
        assert!(p.contains("turn 1 of at most 8"));
        assert!(!p.contains("unavailable this session"));
    }

    #[test]
    fn planning_prompt_flags_missing_web_search() {
        let p = planning_prompt("q", &[], &[], &[], 2, 8, false);
        assert!(p.contains("web search is unavailable"));
    }

    #[test]
    fn planning_prompt_includes_state() {
        let ctx = vec!["mass cutoff is ~8 solar masses".to_string()];
        let subs = vec!["what is the accretion timescale?".to_string()];
        let finds = vec!["turn 1: clouds collapse".to_string()];
        let p = planning_prompt("q", &ctx, &subs, &finds, 2, 8, true);
        assert!(p.contains("mass cutoff"));
        assert!(p.contains("accretion timescale"));
        assert!(p.contains("clouds collapse"));
    }

    #[test]
    fn main_answer_prompt_demands_json() {
        let p = main_answer_prompt("q", &["f1".into()], &[("sq".into(), "sa".into())]);
        assert!(p.contains("\"answered\""));
        assert!(p.contains("- f1"));
        assert!(p.contains("- sq: sa"));
    }

    #[test]
    fn final_summary_mentions_open_questions_without_answer() {
        let p = final_summary_prompt("q", &[], None);
        assert!(p.contains("remains open"));
        let p = final_summary_prompt("q", &[], Some("done"));
        assert!(p.contains("Concluded answer: done"));
    }
}
