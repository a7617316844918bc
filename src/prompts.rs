//! # Prompts
//!
//! Text sent to the model. The system prompt is fixed for the whole task; the
//! first iteration uses the initial user prompt and later iterations use a
//! correction prompt built from the previous iteration's record.

use crate::models::IterationRecord;

/// Instruction text plus the source image carried with every request
#[derive(Debug, Clone, PartialEq)]
pub struct UserPrompt {
    pub text: String,
    pub image: Option<EncodedImage>,
}

/// Base64 encoded image together with its MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// System prompt describing the extraction task
pub fn system_prompt(output_binding: &str, libraries: &[(&str, &str)]) -> String {
    let library_list = libraries
        .iter()
        .map(|(alias, module)| format!("`{module}` (bound as `{alias}`)"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You analyse an image containing a table and write Python code that rebuilds it.\n\
         \n\
         Input: an image that contains one table, possibly with a header row and \
         surrounding text.\n\
         \n\
         Output: only a single Python code block. The code must build a DataFrame holding \
         every column and row of the table and assign it to a variable named `{output_binding}`.\n\
         \n\
         Rules:\n\
         - Only these libraries are available, already imported: {library_list}. Do not \
         import anything else and do not read or write files.\n\
         - Use column names from the table header; use data types that match the cells \
         (numbers, text, dates).\n\
         - Pad shorter columns with None so every column has the same length.\n\
         - The code must run as-is with no further edits."
    )
}

/// First-iteration request text
pub fn initial_user_prompt(output_binding: &str) -> String {
    format!(
        "Extract the table in the attached image. Reply with Python code that assigns the \
         complete table to `{output_binding}`."
    )
}

/// Build the next request from a previous iteration.
///
/// The error comes first, then user feedback, then any prior output. The closing
/// requirements are always present.
pub fn build_correction_prompt(record: &IterationRecord, output_binding: &str) -> String {
    let mut prompt = format!(
        "Improve the code from iteration {} based on its result.\n",
        record.iteration_number
    );

    if let Some(error) = record.error_message.as_deref() {
        prompt.push_str(&format!(
            "\nExecution error:\n{error}\n\nFix the error above so the code runs correctly.\n"
        ));
    }

    if let Some(feedback) = record.user_feedback.as_deref() {
        prompt.push_str(&format!(
            "\nUser feedback:\n{feedback}\n\nAdjust the code to address this feedback.\n"
        ));
    }

    if let Some(output) = record.execution_output.as_deref() {
        prompt.push_str(&format!("\nPrevious output:\n{output}\n"));
    }

    if record.error_message.is_none() && record.user_feedback.is_none() {
        prompt.push_str("\nRe-check the extraction against the image and produce the table again.\n");
    }

    prompt.push_str(&format!(
        "\nMake sure that:\n\
         1. Every column uses an appropriate data type\n\
         2. The data is cleaned and consistently formatted\n\
         3. The final table is assigned to `{output_binding}`\n\
         4. No rows or columns are truncated\n"
    ));
    prompt
}
