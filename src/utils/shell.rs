use crate::constants::remote;

/// Wraps `command` in a heredoc for a login-style bash with a fixed PATH.
/// With `sudo`, the shell runs through non-interactive sudo.
pub fn wrap_login_shell(command: &str, sudo: bool) -> String {
    let shell = if sudo { remote::SUDO_SHELL } else { remote::SHELL };
    format!(
        "{shell} <<{tag}\nexport PATH={path}\n{command}\n{tag}",
        shell = shell,
        tag = remote::HEREDOC_TAG,
        path = remote::LOGIN_PATH,
        command = command,
    )
}

/// Lists the `top` largest readable regular files as `<bytes> <path>` lines.
pub fn largest_files_command(top: usize) -> String {
    format!(
        "find / ! -readable -prune -type f -printf '%s %p\\n' 2> /dev/null | sort -nr | head -n {}",
        top
    )
}

#[cfg(test)]
mod tests {
    use super::{largest_files_command, wrap_login_shell};

    #[test]
    fn wrap_uses_heredoc_and_fixed_path() {
        let wrapped = wrap_login_shell("uptime", false);
        assert_eq!(
            wrapped,
            "/bin/bash <<CMD\nexport PATH=/usr/local/sbin:/usr/local/bin:/sbin:/bin:/usr/sbin:/usr/bin:/root/bin\nuptime\nCMD"
        );
    }

    #[test]
    fn wrap_with_sudo_is_non_interactive() {
        assert!(wrap_login_shell("id", true).starts_with("/usr/bin/sudo -n bash <<CMD\n"));
    }

    #[test]
    fn largest_files_command_limits_rows() {
        let command = largest_files_command(15);
        assert!(command.ends_with("| sort -nr | head -n 15"));
        assert!(command.contains("-printf '%s %p\\n'"));
    }
}
