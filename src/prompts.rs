//! Fixed prompt text: the retrieval QA template, the two contract
//! templates, and the example questions offered on the chat page.

use crate::models::{ContractMode, Passage};

/// Questions rendered as one-click buttons on the chat page.
pub const EXAMPLE_PROMPTS: [&str; 8] = [
    "Arbitrum exists to “scale” Ethereum; why does Ethereum need this help?",
    "Which Common precompiles are present on arbitrum?",
    "Can you guide on how to Launch an Orbit chain",
    "What is the role of Sequencer?",
    "What is ArbOS?",
    "How to deploy a smart contract on Arbitrum?",
    "Which consensus mechanism does Arbitrum use?",
    "What are oracles?",
];

/// Number of columns in the example prompt grid.
pub const EXAMPLE_COLUMNS: usize = 3;

const DEBUG_INSTRUCTION: &str = "Debug the following Solidity smart contract .sol code if it contains any errors and provide insights on potential issues:";
const GENERATE_INSTRUCTION: &str = "Generate code for the following Solidity smart contract .sol code and provide improvements or enhancements:";

/// Instruction line that precedes the pasted code for `mode`.
pub fn contract_instruction(mode: ContractMode) -> &'static str {
    match mode {
        ContractMode::Debug => DEBUG_INSTRUCTION,
        ContractMode::Generate => GENERATE_INSTRUCTION,
    }
}

/// Interpolate pasted source text into the template for `mode`.
///
/// The text is inserted verbatim.
pub fn contract_prompt(mode: ContractMode, code: &str) -> String {
    format!("{}\n\n{}", contract_instruction(mode), code)
}

/// Build the retrieval QA prompt from the matched passages and the question.
pub fn qa_prompt(passages: &[Passage], question: &str) -> String {
    let context = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        context, question
    )
}

/// Split the example prompts into `EXAMPLE_COLUMNS` columns, round-robin.
pub fn example_grid() -> Vec<Vec<&'static str>> {
    let mut cols = vec![Vec::new(); EXAMPLE_COLUMNS];
    for (i, prompt) in EXAMPLE_PROMPTS.iter().enumerate() {
        cols[i % EXAMPLE_COLUMNS].push(*prompt);
    }
    cols
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str) -> Passage {
        Passage {
            id: text.to_string(),
            text: text.to_string(),
            score: 1.0,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_contract_prompts_contain_code_and_differ() {
        let code = "contract A { function f() public {} }";
        let debug = contract_prompt(ContractMode::Debug, code);
        let generate = contract_prompt(ContractMode::Generate, code);

        assert!(debug.contains(code));
        assert!(generate.contains(code));
        assert!(debug.starts_with("Debug the following"));
        assert!(generate.starts_with("Generate code for"));
        assert_ne!(debug, generate);
    }

    #[test]
    fn test_contract_prompt_exact_shape() {
        let prompt = contract_prompt(ContractMode::Generate, "X");
        assert_eq!(prompt, format!("{}\n\nX", GENERATE_INSTRUCTION));
    }

    #[test]
    fn test_qa_prompt_includes_passages_in_order() {
        let prompt = qa_prompt(&[passage("alpha"), passage("beta")], "What is ArbOS?");
        let a = prompt.find("alpha").unwrap();
        let b = prompt.find("beta").unwrap();
        assert!(a < b);
        assert!(prompt.contains("alpha\n\nbeta"));
        assert!(prompt.contains("Query: What is ArbOS?\n"));
        assert!(prompt.ends_with("Answer: "));
    }

    #[test]
    fn test_example_grid_round_robin() {
        let grid = example_grid();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0].len(), 3);
        assert_eq!(grid[1].len(), 3);
        assert_eq!(grid[2].len(), 2);
        assert_eq!(grid[1][1], "What is ArbOS?");
    }
}
