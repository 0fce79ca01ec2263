pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_CONNECTION_MS: u64 = 10_000;
    pub const TIMEOUT_SSH_EXEC_DEFAULT_MS: u64 = 600_000;
    pub const TIMEOUT_SSH_CLOSE_GRACE_MS: u64 = 2_000;
    pub const READ_POLL_INTERVAL_MS: u64 = 20;
}

pub mod limits {
    pub const DEFAULT_WORKERS: usize = 24;
    pub const DEFAULT_LARGEST_TOP: usize = 15;
    pub const READ_CHUNK_BYTES: usize = 8192;
    pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 16 * 1024 * 1024;
}

pub mod remote {
    pub const LOGIN_PATH: &str =
        "/usr/local/sbin:/usr/local/bin:/sbin:/bin:/usr/sbin:/usr/bin:/root/bin";
    pub const SHELL: &str = "/bin/bash";
    pub const SUDO_SHELL: &str = "/usr/bin/sudo -n bash";
    pub const HEREDOC_TAG: &str = "CMD";
    pub const DEFAULT_KEY_PATH: &str = "~/.ssh/id_rsa";
}

pub mod pty {
    pub const TERM: &str = "xterm";
    pub const COLUMNS: u32 = 80;
    pub const ROWS: u32 = 40;
    pub const BAUD: u32 = 14_400;
}
