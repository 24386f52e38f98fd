use crate::app::error::AppError;

/// Splits a caller-supplied command suffix into arguments with POSIX shell
/// quoting rules. Unbalanced quotes or a trailing backslash are rejected.
pub fn split_command_line(input: &str, trace_id: &str) -> Result<Vec<String>, AppError> {
    shlex::split(input).ok_or_else(|| {
        AppError::validation(format!("Unbalanced quoting in command: {input}"), trace_id)
    })
}

/// Joins arguments into a suffix that [`split_command_line`] turns back into
/// the same arguments.
pub fn join_command_line<S: AsRef<str>>(args: &[S], trace_id: &str) -> Result<String, AppError> {
    shlex::try_join(args.iter().map(AsRef::as_ref))
        .map_err(|err| AppError::validation(format!("Cannot quote argument: {err}"), trace_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error::ERR_VALIDATION;

    #[test]
    fn splits_plain_words() {
        assert_eq!(
            split_command_line(" devices   -l ", "t").expect("split"),
            vec!["devices", "-l"]
        );
        assert!(split_command_line("   ", "t").expect("split").is_empty());
    }

    #[test]
    fn keeps_quoted_shell_command_together() {
        assert_eq!(
            split_command_line("shell \"dumpsys package com.example\"", "t").expect("split"),
            vec!["shell", "dumpsys package com.example"]
        );
        assert_eq!(
            split_command_line("shell 'settings get global hidden_api_policy'", "t")
                .expect("split"),
            vec!["shell", "settings get global hidden_api_policy"]
        );
    }

    #[test]
    fn empty_quotes_produce_an_empty_argument() {
        assert_eq!(
            split_command_line("shell \"\"", "t").expect("split"),
            vec!["shell", ""]
        );
    }

    #[test]
    fn unclosed_quote_is_rejected() {
        let err = split_command_line("shell \"pm list", "trace-quote").expect_err("unbalanced");
        assert_eq!(err.code, ERR_VALIDATION);
        assert_eq!(err.trace_id, "trace-quote");
    }

    #[test]
    fn joined_arguments_split_back_unchanged() {
        let argv = vec![
            "shell".to_string(),
            "echo \"hi there\"".to_string(),
            "it's".to_string(),
            "a\\b".to_string(),
            String::new(),
        ];
        let suffix = join_command_line(&argv, "t").expect("join");
        assert_eq!(split_command_line(&suffix, "t").expect("split"), argv);
    }

    #[test]
    fn nul_byte_cannot_be_quoted() {
        let err = join_command_line(&["shell", "a\0b"], "t").expect_err("nul");
        assert_eq!(err.code, ERR_VALIDATION);
    }
}
