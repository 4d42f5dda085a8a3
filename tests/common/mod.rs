use core::time::Duration;
use std::{
    env, fs,
    net::{TcpListener, TcpStream},
    path::{Path, PathBuf},
    process::{Child, Command},
    time::Instant,
};

pub fn get_free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to address")
        .local_addr()
        .expect("local address")
        .port()
}

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

/// Fresh database location for one test run.
pub fn temp_db_path(tag: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("securevault_test_{tag}_{}", get_free_port()));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir.join("vault.db")
}

/// The server binary with every required secret set and no ambient configuration.
pub fn vault_command(db_path: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_securevault"));
    command
        .env_remove("PORT")
        .env("SECUREVAULT_CONFIG", db_path.with_extension("toml"))
        .env("JWT_SECRET", "integration-secret")
        .env("OPENAI_API_KEY", "sk-test")
        .env("PINECONE_API_KEY", "pc-test")
        .env("PINECONE_INDEX", "vault-test")
        .env("PINECONE_HOST", "http://127.0.0.1:9")
        .env("DATABASE_PATH", db_path);
    command
}

/// Spawn `securevault serve` on `port`, bound to loopback.
pub fn spawn_server(port: u16, db_path: &Path) -> Child {
    vault_command(db_path)
        .args(["serve", "--bind", "127.0.0.1"])
        .env("PORT", port.to_string())
        .spawn()
        .expect("failed to start securevault")
}

/// Block until a TCP listener is accepting on `127.0.0.1:port` or timeout.
pub async fn wait_for_listening(port: u16, timeout_secs: u64) {
    let start = Instant::now();
    while TcpStream::connect(("127.0.0.1", port)).is_err() {
        assert!(
            start.elapsed() <= Duration::from_secs(timeout_secs),
            "server did not start within timeout"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
