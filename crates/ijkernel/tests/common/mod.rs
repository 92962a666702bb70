//
// mod.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

#![allow(dead_code)]

pub mod mock_engine;
pub mod test_client;

use std::sync::Arc;

use ijkernel::connection_file::ConnectionFile;
use ijkernel::execution_session::engine::EngineLauncher;
use ijkernel::execution_session::ExecutionSession;
use ijkernel::kernel::Kernel;
use ijkernel::kernel_config::KernelConfig;
use ijkernel::kernel_connection::KernelConnection;
use ijkernel::outbox::{Outbound, Outbox};
use ijkernel::wire_message::WireMessage;
use ijkernel::wire_message_header::WireMessageHeader;
use tempfile::TempDir;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use mock_engine::ScriptedLauncher;
use test_client::TestClient;

pub const TEST_KEY: &str = "a0436f6c-1916-498b-8eb9-e81ab9368e84";

// Cache Python executable discovery to avoid repeated lookups
static PYTHON_EXECUTABLE: OnceCell<Option<String>> = OnceCell::const_new();

/// A connection file naming five free loopback ports.
pub fn test_connection_file(key: &str) -> ConnectionFile {
    let port = || portpicker::pick_unused_port().expect("No available ports");
    ConnectionFile {
        control_port: port(),
        shell_port: port(),
        stdin_port: port(),
        iopub_port: port(),
        hb_port: port(),
        transport: String::from("tcp"),
        signature_scheme: String::from("hmac-sha256"),
        ip: String::from("127.0.0.1"),
        key: key.to_string(),
    }
}

/// A kernel served in the background of a test.
pub struct TestKernel {
    pub connection_file: ConnectionFile,
    pub launcher: Arc<ScriptedLauncher>,
    pub session: ExecutionSession,
    pub serving: JoinHandle<Result<(), anyhow::Error>>,
    _dir: TempDir,
}

impl TestKernel {
    /// Start a kernel around a scripted engine.
    pub async fn start(config: KernelConfig) -> Self {
        Self::start_with(config, ScriptedLauncher::new()).await
    }

    pub async fn start_with(config: KernelConfig, launcher: ScriptedLauncher) -> Self {
        // Round-trip the connection file through disk, the way a frontend
        // hands it to the kernel
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("connection.json");
        test_connection_file(TEST_KEY)
            .to_file(&path)
            .expect("Failed to write connection file");
        let connection_file = ConnectionFile::from_file(&path).expect("Failed to read connection file");

        let launcher = Arc::new(launcher);
        let kernel = Kernel::new(
            &connection_file,
            config,
            launcher.clone() as Arc<dyn EngineLauncher>,
        )
        .await
        .expect("Failed to start kernel");
        let session = kernel.session();
        let serving = tokio::spawn(kernel.serve());

        Self {
            connection_file,
            launcher,
            session,
            serving,
            _dir: dir,
        }
    }

    /// Connect a frontend speaking the given protocol version (stamped on
    /// request headers; `None` for 4.x).
    pub async fn client(&self, version: Option<&str>) -> TestClient {
        TestClient::connect(&self.connection_file, version).await
    }
}

/// An outbox whose messages the test reads directly, for exercising the
/// execution session without sockets.
pub fn test_outbox(protocol_version: &str) -> (Outbox, async_channel::Receiver<Outbound>) {
    let connection =
        KernelConnection::new(&test_connection_file(""), protocol_version).expect("connection");
    Outbox::new(Arc::new(connection))
}

/// A request message to attribute tasks and output to
pub fn parent_message(msg_type: &str) -> Arc<WireMessage> {
    let header = WireMessageHeader::new(msg_type, "test", "test-session", Some(String::from("5.0")));
    Arc::new(WireMessage::new(header, serde_json::json!({})))
}

/// Get a cached Python executable, finding it once per test run
pub async fn get_python_executable() -> Option<String> {
    PYTHON_EXECUTABLE
        .get_or_init(find_python_executable)
        .await
        .clone()
}

async fn find_python_executable() -> Option<String> {
    for candidate in ["python3", "python"] {
        let found = tokio::process::Command::new(candidate)
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);
        if found {
            return Some(candidate.to_string());
        }
    }
    None
}
