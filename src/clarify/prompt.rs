//! Prompt text for clarifying questions (PT-BR output)

use super::session::ConversationTurn;

/// Query followed by the answered turns so far
pub fn conversation_text(query: &str, turns: &[ConversationTurn]) -> String {
    let mut out = query.trim().to_string();
    for turn in turns.iter().filter(|t| t.is_answered()) {
        out.push_str("\n\nPergunta clarificadora: ");
        out.push_str(&turn.question);
        out.push_str("\nResposta: ");
        out.push_str(&turn.answer);
    }
    out
}

pub fn pairs_prompt(conversation: &str, case_1: &str, case_2: &str) -> String {
    format!(
        "You are now a knowledgeable judge in law. The current conversation between you and the user\n\
         is as follows: [{conversation}]. Based on the above conversation, what clarifying question can\n\
         you ask to further understand the background information of the case?\n\
         Specifically, there are similar cases with the following circumstances: Case 1: [{case_1}]. \
         Case 2: [{case_2}].\n\
         Identify the differences between Case 1 and Case 2, and generate the clarifying question\n\
         based on the differences in Portuguese Brazil.\n\n\
         Return ONLY a single-line JSON object with the following structure:\n\
         {{\"question\": \"<uma pergunta clara em PT-BR, uma frase>\", \
         \"rationale\": \"<diferença entre o caso 1 e o caso 2 e o racional da pergunta>\"}}.\n\
         Do not include anything else besides the JSON."
    )
}

/// Built from the conversation only; no document text can reach it
pub fn no_pairs_prompt(conversation: &str) -> String {
    format!(
        "You are now a knowledgeable judge in law. The current conversation between you and the user\n\
         is as follows: [{conversation}]. Based only on the above conversation, what clarifying question\n\
         can you ask to further understand the background information of the user's legal question?\n\
         Ask about a single missing detail that would change which precedents are relevant.\n\
         Write the question in Portuguese Brazil and do not repeat questions already asked.\n\n\
         Return ONLY a single-line JSON object with the following structure:\n\
         {{\"question\": \"<uma pergunta clara em PT-BR, uma frase>\", \
         \"rationale\": \"<qual ambiguidade da pergunta original a resposta resolve>\"}}.\n\
         Do not include anything else besides the JSON."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(question: &str, answer: &str) -> ConversationTurn {
        ConversationTurn {
            index: 0,
            question: question.to_string(),
            answer: answer.to_string(),
            rationale: None,
            basis: None,
        }
    }

    #[test]
    fn conversation_skips_unanswered_turns() {
        let text = conversation_text(
            " qual o prazo? ",
            &[turn("Quinze ou trinta?", "30 dias"), turn("Outra?", "")],
        );
        assert_eq!(
            text,
            "qual o prazo?\n\nPergunta clarificadora: Quinze ou trinta?\nResposta: 30 dias"
        );
    }

    #[test]
    fn pairs_prompt_embeds_both_cases() {
        let prompt = pairs_prompt("qual o prazo?", "prazo de 15 dias", "prazo de 30 dias");
        assert!(prompt.contains("Case 1: [prazo de 15 dias]"));
        assert!(prompt.contains("Case 2: [prazo de 30 dias]"));
        assert!(prompt.contains("{\"question\""));
    }

    #[test]
    fn no_pairs_prompt_mentions_no_cases() {
        let prompt = no_pairs_prompt("qual o prazo?");
        assert!(prompt.contains("[qual o prazo?]"));
        assert!(!prompt.contains("Case 1"));
    }
}
