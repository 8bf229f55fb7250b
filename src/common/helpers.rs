use std::error::Error;

pub fn print_error_chain(err: &anyhow::Error) {
    error!("{}", format_error_chain(&**err));
}

/// Renders an error followed by its causes, one per line.
pub fn format_error_chain(err: &(dyn Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // thiserror's transparent wrappers repeat the inner message
        if !message.ends_with(&cause_text) {
            message.push_str(&format!("\n       └> {}", cause_text));
        }
        source = cause.source();
    }

    message
}

/// Bracket-quotes a T-SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}
