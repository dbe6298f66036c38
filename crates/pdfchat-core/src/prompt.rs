//! Prompt composition.

/// Build the single user message sent to the completion endpoint.
///
/// The context may be empty (no documents indexed yet); the directive still
/// tells the model to say so when the answer is not in the context.
pub fn compose_prompt(query: &str, context: &str) -> String {
    format!(
        "Context from PDFs:\n{context}\n\nUser Question: {query}\n\n\
         Please provide a detailed answer based on the context provided. \
         If the answer cannot be found in the context, say so."
    )
}
