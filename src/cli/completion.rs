//! Shell completion generation for hawkdb
//!
//! Generates completion scripts for bash, zsh and fish. On top of the
//! clap-generated script, the `--profile` flag completes saved profile names.

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::cli::CliArgs;
use crate::error::{ConfigError, HawkError, Result};

/// Generate shell completion script
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish)
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let shell = parse_shell(shell_name)?;
    print!("{}", completion_script(shell));
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        _ => Err(HawkError::Config(ConfigError::InvalidValue {
            field: "shell".into(),
            value: format!("{} (supported: bash, zsh, fish)", shell_name),
        })),
    }
}

fn completion_script(shell: Shell) -> String {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, "hawkdb", &mut buffer);

    let basic = String::from_utf8_lossy(&buffer);
    let extra = match shell {
        Shell::Bash => BASH_PROFILES,
        Shell::Zsh => ZSH_PROFILES,
        _ => FISH_PROFILES,
    };
    format!("{}\n{}", basic, extra)
}

const BASH_PROFILES: &str = r#"
_hawkdb_list_profiles() {
    hawkdb profile list --names 2>/dev/null
}

_hawkdb_enhanced() {
    local cur prev words cword
    _init_completion || return

    if [[ "$prev" == "-p" || "$prev" == "--profile" ]]; then
        COMPREPLY=($(compgen -W "$(_hawkdb_list_profiles)" -- "$cur"))
        return 0
    fi

    _hawkdb "$@"
}

complete -F _hawkdb_enhanced hawkdb
"#;

const ZSH_PROFILES: &str = r#"
_hawkdb_profiles() {
    local -a profiles
    profiles=($(hawkdb profile list --names 2>/dev/null))
    _describe 'profiles' profiles
}

_hawkdb_enhanced() {
    if [[ ${words[CURRENT-1]} == "-p" || ${words[CURRENT-1]} == "--profile" ]]; then
        _hawkdb_profiles
        return 0
    fi

    _hawkdb "$@"
}

compdef _hawkdb_enhanced hawkdb
"#;

const FISH_PROFILES: &str = r#"
function __hawkdb_list_profiles
    hawkdb profile list --names 2>/dev/null
end

complete -c hawkdb -n "__fish_seen_subcommand_from export" -s p -l profile -f -a "(__hawkdb_list_profiles)" -d "Saved connection profile"
"#;
