//! Prompt templates for answering and for relevance evaluation.

use crate::recipe::RecipeDocument;

const ANSWER_TEMPLATE: &str = concat!(
    "You're a cooking assistant. Answer the QUESTION based on the CONTEXT from the recipe database.\n",
    "Use only the facts from the CONTEXT when answering the QUESTION.\n",
    "\n",
    "QUESTION: {question}\n",
    "\n",
    "CONTEXT: \n",
    "{context}",
);

const EVALUATION_TEMPLATE: &str = r#"You are an expert evaluator for a RAG system.
Your task is to analyze the relevance of the generated answer to the given question.
Based on the relevance of the generated answer, you will classify it
as "NON_RELEVANT", "PARTLY_RELEVANT", or "RELEVANT".

Here is the data for evaluation:

Question: {question}
Generated Answer: {answer}

Please analyze the content and context of the generated answer in relation to the question
and provide your evaluation in parsable JSON without using code blocks:

{
  "Relevance": "NON_RELEVANT" | "PARTLY_RELEVANT" | "RELEVANT",
  "Explanation": "[Provide a brief explanation for your evaluation]"
}"#;

/// Join the documents' `text` fields in order, each followed by a blank line.
pub fn build_context(results: &[RecipeDocument]) -> String {
    results.iter().fold(String::new(), |mut context, doc| {
        context.push_str(&doc.text);
        context.push_str("\n\n");
        context
    })
}

/// Build the grounding prompt for `question` from retrieved documents.
pub fn build_prompt(question: &str, results: &[RecipeDocument]) -> String {
    fill(
        ANSWER_TEMPLATE,
        &[("question", question), ("context", &build_context(results))],
    )
    .trim()
    .to_string()
}

/// Build the evaluator prompt asking for a JSON relevance verdict.
pub fn build_evaluation_prompt(question: &str, answer: &str) -> String {
    fill(
        EVALUATION_TEMPLATE,
        &[("question", question), ("answer", answer)],
    )
}

/// Substitute `{name}` placeholders in one left-to-right pass, so values that
/// themselves contain braces are inserted verbatim.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'outer: while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        for (name, value) in values {
            if let Some(tail) = after
                .strip_prefix(name)
                .and_then(|t| t.strip_prefix('}'))
            {
                out.push_str(value);
                rest = tail;
                continue 'outer;
            }
        }
        out.push('{');
        rest = after;
    }
    out.push_str(rest);
    out
}
