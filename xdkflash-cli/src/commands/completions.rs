//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io;

use crate::Cli;

/// Write the completion script for `shell` to `out`.
fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completions(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bash_completions_name_binary_and_subcommands() {
        let output = completions(Shell::Bash);
        assert!(output.contains("xdkflash"));
        assert!(output.contains("bootloaders"));
        assert!(output.contains("list-ports"));
    }

    #[test]
    fn test_zsh_completions_include_send_commands() {
        let output = completions(Shell::Zsh);
        assert!(output.contains("goto-bootloader"));
    }

    #[test]
    fn test_other_shells_generate_output() {
        for shell in [Shell::Fish, Shell::PowerShell, Shell::Elvish] {
            assert!(!completions(shell).is_empty(), "{shell}");
        }
    }
}
